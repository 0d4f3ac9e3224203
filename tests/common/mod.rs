#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use chat_stream_service::{
    ServiceError,
    engine::{
        Encoding, GenerationParameters, GenerationReport, InferenceEngine, SpecialTokens,
        StopReason, TokenSink,
    },
};

/// Engine that replays a fixed list of fragments.
pub struct ScriptedEngine {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    panic_after: Option<usize>,
    endless: bool,
    step_delay: Option<Duration>,
    tokenize_error: Option<String>,
    released: AtomicUsize,
    generated: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail_after: None,
            panic_after: None,
            endless: false,
            step_delay: None,
            tokenize_error: None,
            released: AtomicUsize::new(0),
            generated: AtomicUsize::new(0),
        }
    }

    /// Emits `count` fragments, then reports an out-of-memory fault.
    pub fn failing_after(fragments: &[&str], count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::new(fragments)
        }
    }

    pub fn panicking_after(fragments: &[&str], count: usize) -> Self {
        Self {
            panic_after: Some(count),
            ..Self::new(fragments)
        }
    }

    /// Cycles its fragments until the sink closes.
    pub fn endless(fragments: &[&str]) -> Self {
        Self {
            endless: true,
            step_delay: Some(Duration::from_millis(2)),
            ..Self::new(fragments)
        }
    }

    /// Rejects every prompt at tokenization, before any generation starts.
    pub fn failing_tokenize(fragments: &[&str], reason: &str) -> Self {
        Self {
            tokenize_error: Some(reason.to_string()),
            ..Self::new(fragments)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for ScriptedEngine {
    fn tokenize(
        &self,
        text: &str,
        max_length: usize,
        truncation: bool,
    ) -> Result<Encoding, ServiceError> {
        if let Some(reason) = &self.tokenize_error {
            return Err(ServiceError::Tokenizer(reason.clone()));
        }
        let ids: Vec<u32> = text
            .split_whitespace()
            .enumerate()
            .map(|(idx, _)| idx as u32 + 1)
            .collect();
        let mask = vec![1; ids.len()];
        let mut encoding = Encoding::new(ids, mask);
        if truncation {
            encoding.truncate(max_length);
        }
        Ok(encoding)
    }

    fn generate(
        &self,
        _encoding: &Encoding,
        params: &GenerationParameters,
        sink: &mut dyn TokenSink,
    ) -> Result<GenerationReport, ServiceError> {
        let mut step = 0usize;
        loop {
            if !self.endless && (step >= self.fragments.len() || step >= params.max_new_tokens) {
                return Ok(GenerationReport {
                    generated_tokens: step,
                    stop_reason: if step >= params.max_new_tokens {
                        StopReason::MaxTokens
                    } else {
                        StopReason::Eos
                    },
                });
            }
            if self.fail_after == Some(step) {
                return Err(ServiceError::Inference("CUDA out of memory".into()));
            }
            if self.panic_after == Some(step) {
                panic!("kernel launch failed");
            }
            if let Some(delay) = self.step_delay {
                thread::sleep(delay);
            }

            let fragment = self.fragments[step % self.fragments.len()].clone();
            if sink.send(fragment).is_err() {
                return Ok(GenerationReport {
                    generated_tokens: step,
                    stop_reason: StopReason::Cancelled,
                });
            }
            self.generated.fetch_add(1, Ordering::SeqCst);
            step += 1;
        }
    }

    fn detokenize(&self, tokens: &[u32]) -> Result<String, ServiceError> {
        Ok(tokens
            .iter()
            .filter_map(|&id| self.fragments.get(id as usize).cloned())
            .collect())
    }

    fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens {
            eos: Some(0),
            pad: Some(0),
        }
    }

    fn release_device_memory(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn shared(engine: ScriptedEngine) -> (Arc<ScriptedEngine>, Arc<dyn InferenceEngine>) {
    let engine = Arc::new(engine);
    let dynamic: Arc<dyn InferenceEngine> = engine.clone();
    (engine, dynamic)
}

/// Polls until the engine reports `count` releases or the timeout elapses.
pub async fn wait_for_release(engine: &ScriptedEngine, count: usize) -> bool {
    for _ in 0..200 {
        if engine.released() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
