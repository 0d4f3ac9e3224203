use std::{fs, path::Path, time::Instant};

use parking_lot::Mutex;
use tch::{Device, IValue, Kind, Tensor, no_grad};

use crate::{
    config::AppConfig,
    engine::{
        ChatTokenizer, Encoding, GenerationParameters, GenerationReport, IncrementalDecoder,
        InferenceEngine, Sampler, SpecialTokens, StopReason, TokenSink,
    },
    error::ServiceError,
};

/// TorchScript causal LM traced to return logits for the full sequence.
pub struct TorchEngine {
    tokenizer: ChatTokenizer,
    device: Device,
    takes_attention_mask: bool,
    module: Mutex<tch::CModule>,
}

impl TorchEngine {
    pub fn load(config: &AppConfig) -> Result<Self, ServiceError> {
        let tokenizer = ChatTokenizer::from_file(&config.tokenizer_path)?;
        Self::with_tokenizer(
            tokenizer,
            &config.module_path,
            config.device,
            config.module_takes_attention_mask,
        )
    }

    pub fn with_tokenizer(
        tokenizer: ChatTokenizer,
        module_path: &Path,
        device: Device,
        takes_attention_mask: bool,
    ) -> Result<Self, ServiceError> {
        if !module_path.exists() {
            return Err(ServiceError::Other(format!(
                "model artifact missing: {}",
                module_path.display()
            )));
        }
        let size_bytes = fs::metadata(module_path)?.len();
        let mut module = tch::CModule::load_on_device(module_path, device)
            .map_err(|e| ServiceError::Inference(e.to_string()))?;
        module.set_eval();

        tracing::info!(
            path = %module_path.display(),
            size_bytes,
            ?device,
            "TorchScript module loaded"
        );

        Ok(Self {
            tokenizer,
            device,
            takes_attention_mask,
            module: Mutex::new(module),
        })
    }

    fn next_logits(
        &self,
        module: &tch::CModule,
        ids: &[i64],
        mask: &[i64],
    ) -> Result<Vec<f32>, ServiceError> {
        let len = ids.len() as i64;
        let input = Tensor::from_slice(ids).reshape([1, len]).to(self.device);
        let mut inputs = vec![IValue::Tensor(input)];
        if self.takes_attention_mask {
            let mask = Tensor::from_slice(mask).reshape([1, len]).to(self.device);
            inputs.push(IValue::Tensor(mask));
        }

        // Traced modules return either the logits or a (logits, past) tuple.
        let output = module
            .forward_is(&inputs)
            .map_err(|e| ServiceError::Inference(e.to_string()))?;
        let logits = match output {
            IValue::Tensor(t) => t,
            IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                IValue::Tensor(t) => t.shallow_clone(),
                _ => {
                    return Err(ServiceError::Inference(
                        "Expected tensor as first tuple element".into(),
                    ));
                }
            },
            _ => {
                return Err(ServiceError::Inference(
                    "Unexpected model output format".into(),
                ));
            }
        };

        // [1, seq_len, vocab] -> [vocab]
        let last = logits
            .select(1, -1)
            .squeeze()
            .to_kind(Kind::Float)
            .to_device(Device::Cpu);
        Vec::<f32>::try_from(&last).map_err(|e| ServiceError::Inference(e.to_string()))
    }
}

impl InferenceEngine for TorchEngine {
    fn tokenize(
        &self,
        text: &str,
        max_length: usize,
        truncation: bool,
    ) -> Result<Encoding, ServiceError> {
        self.tokenizer.encode(text, max_length, truncation)
    }

    fn generate(
        &self,
        encoding: &Encoding,
        params: &GenerationParameters,
        sink: &mut dyn TokenSink,
    ) -> Result<GenerationReport, ServiceError> {
        let mut ids: Vec<i64> = encoding.input_ids.iter().map(|&id| id as i64).collect();
        let mut mask: Vec<i64> = encoding
            .attention_mask
            .iter()
            .map(|&m| m as i64)
            .collect();
        if ids.is_empty() {
            return Err(ServiceError::BadRequest("prompt produced no tokens".into()));
        }

        let mut sampler = Sampler::new(params);
        let mut decoder = IncrementalDecoder::new();
        let mut context: Vec<u32> = encoding.input_ids.clone();
        let start = Instant::now();

        let report = no_grad(|| {
            let module = self.module.lock();
            let mut report = GenerationReport {
                generated_tokens: params.max_new_tokens,
                stop_reason: StopReason::MaxTokens,
            };

            for step in 0..params.max_new_tokens {
                let mut logits = self.next_logits(&module, &ids, &mask)?;
                let next = sampler.sample(&mut logits, &context)?;

                if params.eos_token_id == Some(next) {
                    report = GenerationReport {
                        generated_tokens: step,
                        stop_reason: StopReason::Eos,
                    };
                    break;
                }

                ids.push(next as i64);
                mask.push(1);
                context.push(next);

                let fragment = decoder.push(next, |tokens| self.tokenizer.decode(tokens))?;
                if let Some(fragment) = fragment {
                    if sink.send(fragment).is_err() {
                        tracing::debug!(step, "consumer gone, stopping generation");
                        return Ok(GenerationReport {
                            generated_tokens: step + 1,
                            stop_reason: StopReason::Cancelled,
                        });
                    }
                }
            }

            // A split character at the stop point is still delivered.
            if let Some(tail) = decoder.finish(|tokens| self.tokenizer.decode(tokens))? {
                if sink.send(tail).is_err() {
                    report.stop_reason = StopReason::Cancelled;
                }
            }
            Ok::<_, ServiceError>(report)
        })?;

        tracing::debug!(
            generated = report.generated_tokens,
            stop = ?report.stop_reason,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generation finished"
        );
        Ok(report)
    }

    fn detokenize(&self, tokens: &[u32]) -> Result<String, ServiceError> {
        self.tokenizer.decode(tokens)
    }

    fn special_tokens(&self) -> SpecialTokens {
        self.tokenizer.special_tokens()
    }

    // Step tensors are freed when `generate` returns; wait for queued kernels.
    // tch has no binding for the caching allocator's empty_cache, so freed
    // blocks stay reserved by libtorch for reuse by the next request.
    fn release_device_memory(&self) {
        if let Device::Cuda(idx) = self.device {
            tch::Cuda::synchronize(idx as i64);
        }
    }
}
