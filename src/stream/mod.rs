//! Token streaming: background generation feeding an ordered event stream.

mod channel;
mod consumer;
mod events;
mod metrics;
mod producer;
pub mod protocol;

use std::{str::FromStr, sync::Arc, time::Instant};

use futures::Stream;

use crate::{
    engine::{Encoding, GenerationParameters, InferenceEngine},
    error::ServiceError,
};

pub use channel::{ChannelCapacity, FragmentReceiver, FragmentSender, fragment_channel};
pub use consumer::consume;
pub use events::{Stats, StreamEvent};
pub use metrics::{MetricsAccumulator, tokens_per_second};
pub use producer::Producer;

/// What happens after a generation fault has been reported in-band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Emit the `error` event and end the stream normally.
    #[default]
    Graceful,
    /// Emit the `error` event, then fail the stream.
    Propagate,
}

impl FromStr for FaultPolicy {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "graceful" => Ok(FaultPolicy::Graceful),
            "propagate" => Ok(FaultPolicy::Propagate),
            other => Err(ServiceError::BadRequest(format!(
                "unknown fault policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    pub capacity: ChannelCapacity,
    pub fault_policy: FaultPolicy,
}

/// Starts generation on a blocking worker and returns the event stream.
///
/// `started_at` is the request entry time used for latency and throughput.
pub fn start(
    engine: Arc<dyn InferenceEngine>,
    encoding: Encoding,
    params: GenerationParameters,
    options: StreamOptions,
    started_at: Instant,
) -> impl Stream<Item = Result<StreamEvent, ServiceError>> + Send + 'static {
    let (sender, receiver) = fragment_channel(options.capacity);
    let producer = Producer::spawn(engine, encoding, params, sender);
    consume(
        receiver,
        producer,
        MetricsAccumulator::new(started_at),
        options.fault_policy,
    )
}
