//! Inference engine boundary.
//!
//! The service only talks to the model through [`InferenceEngine`]. Engines
//! are blocking: `generate` runs on a dedicated thread and pushes decoded
//! fragments into a [`TokenSink`] as they are produced.

mod decoder;
mod sampling;
mod tokenizer;
mod types;

#[cfg(feature = "tch-backend")]
pub mod torch;

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::ServiceError;

pub use decoder::IncrementalDecoder;
pub use sampling::Sampler;
pub use tokenizer::ChatTokenizer;
pub use types::{
    Encoding, GenerationParameters, GenerationReport, SpecialTokens, StopReason,
};

/// Returned by a sink whose reading side has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("token sink closed")]
pub struct SinkClosed;

/// Write end of the producer/consumer hand-off.
pub trait TokenSink: Send {
    fn send(&mut self, fragment: String) -> Result<(), SinkClosed>;
}

pub trait InferenceEngine: Send + Sync {
    fn tokenize(
        &self,
        text: &str,
        max_length: usize,
        truncation: bool,
    ) -> Result<Encoding, ServiceError>;

    /// Runs until EOS, `max_new_tokens`, a closed sink, or a fault.
    ///
    /// Only generated text reaches the sink, never the prompt.
    fn generate(
        &self,
        encoding: &Encoding,
        params: &GenerationParameters,
        sink: &mut dyn TokenSink,
    ) -> Result<GenerationReport, ServiceError>;

    fn detokenize(&self, tokens: &[u32]) -> Result<String, ServiceError>;

    fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens::default()
    }

    fn release_device_memory(&self) {}
}

/// Readiness gate around the process-wide engine handle.
#[derive(Clone, Default)]
pub struct EngineSlot {
    inner: Arc<OnceCell<Arc<dyn InferenceEngine>>>,
}

impl EngineSlot {
    pub fn ready(engine: Arc<dyn InferenceEngine>) -> Self {
        let slot = Self::default();
        // A fresh cell is always empty.
        let _ = slot.inner.set(engine);
        slot
    }

    pub fn install(&self, engine: Arc<dyn InferenceEngine>) -> Result<(), ServiceError> {
        self.inner
            .set(engine)
            .map_err(|_| ServiceError::Other("inference engine already installed".into()))
    }

    pub fn get(&self) -> Result<Arc<dyn InferenceEngine>, ServiceError> {
        self.inner.get().cloned().ok_or(ServiceError::ModelLoading)
    }

    pub fn is_ready(&self) -> bool {
        self.inner.get().is_some()
    }
}
