use std::time::Instant;

use futures::Stream;
use tracing::{info, warn};

use crate::{
    error::ServiceError,
    stream::{
        FaultPolicy, MetricsAccumulator, StreamEvent, channel::FragmentReceiver, producer::Producer,
    },
};

/// Drains the fragment channel into ordered [`StreamEvent`]s.
///
/// Yields `Token` events while fragments arrive, then joins the producer and
/// yields a single `Done` or `Error`. Under [`FaultPolicy::Propagate`] a fault
/// is additionally surfaced as a stream error after the `Error` event.
pub fn consume(
    mut receiver: FragmentReceiver,
    producer: Producer,
    mut metrics: MetricsAccumulator,
    fault_policy: FaultPolicy,
) -> impl Stream<Item = Result<StreamEvent, ServiceError>> + Send + 'static {
    async_stream::stream! {
        let mut guard = DisconnectGuard::armed();

        while let Some(text) = receiver.recv().await {
            if text.is_empty() {
                continue;
            }
            let token_num = metrics.record_token(Instant::now());
            yield Ok(StreamEvent::Token { text, token_num });
        }

        match producer.join().await {
            Ok(report) => {
                let stats = metrics.finish(Instant::now());
                info!(
                    total_time = stats.total_time_seconds,
                    total_tokens = stats.total_tokens,
                    tokens_per_second = stats.tokens_per_second,
                    stop = ?report.stop_reason,
                    "stream completed"
                );
                guard.disarm();
                yield Ok(StreamEvent::Done { stats });
            }
            Err(err) => {
                warn!(error = %err, tokens = metrics.token_count(), "stream error");
                guard.disarm();
                yield Ok(StreamEvent::Error { message: err.to_string() });
                if fault_policy == FaultPolicy::Propagate {
                    yield Err(err);
                }
            }
        }
    }
}

/// Logs when the stream is dropped before its terminal event was reached.
struct DisconnectGuard {
    armed: bool,
}

impl DisconnectGuard {
    fn armed() -> Self {
        Self { armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed {
            info!("client disconnected mid-stream, dropping fragment receiver");
        }
    }
}
