use std::sync::Arc;

use tokio::task::{self, JoinHandle};

use crate::{
    engine::{Encoding, GenerationParameters, GenerationReport, InferenceEngine, TokenSink},
    error::ServiceError,
    stream::channel::FragmentSender,
};

/// Background generation for one request.
///
/// The join handle is the result slot: it is written once, when the engine
/// returns, and read by the consumer after the channel has closed.
pub struct Producer {
    handle: JoinHandle<Result<GenerationReport, ServiceError>>,
}

impl Producer {
    pub fn spawn(
        engine: Arc<dyn InferenceEngine>,
        encoding: Encoding,
        params: GenerationParameters,
        sink: FragmentSender,
    ) -> Self {
        let handle = task::spawn_blocking(move || {
            let _release = ReleaseOnDrop(engine.clone());
            let mut sink = sink;
            let result = engine.generate(&encoding, &params, &mut sink as &mut dyn TokenSink);
            drop(sink);
            result
        });
        Self { handle }
    }

    /// Waits for the worker; a panic inside the engine becomes a generation fault.
    pub async fn join(self) -> Result<GenerationReport, ServiceError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(ServiceError::Inference(
                "generation worker panicked".into(),
            )),
            Err(err) => Err(ServiceError::Inference(format!(
                "generation worker failed: {err}"
            ))),
        }
    }
}

/// Frees device memory when the worker exits, including by unwinding.
struct ReleaseOnDrop(Arc<dyn InferenceEngine>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.release_device_memory();
        tracing::debug!("device memory released");
    }
}
