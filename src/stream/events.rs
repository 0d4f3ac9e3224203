use serde::{Deserialize, Serialize};

/// Summary attached to the terminal `done` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(rename = "total_time")]
    pub total_time_seconds: f64,
    pub total_tokens: usize,
    pub tokens_per_second: f64,
}

/// One unit of the client-visible stream.
///
/// A stream is zero or more `Token` events followed by exactly one `Done`
/// or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token { text: String, token_num: usize },
    Done { stats: Stats },
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Token { .. })
    }
}
