//! Server-sent event framing for [`StreamEvent`]s.
//!
//! Every event becomes exactly one `data: <json>\n\n` frame:
//!
//! ```text
//! data: {"text":"Hi","token_num":1}
//! data: {"text":"","finished":true,"stats":{"total_time":0.4,"total_tokens":1,"tokens_per_second":2.5}}
//! data: {"error":"model execution failed: CUDA out of memory"}
//! ```

use axum::response::sse::Event;
use serde::{Deserialize, Serialize};

use crate::{
    error::ServiceError,
    stream::{Stats, StreamEvent},
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireFrame {
    Error {
        error: String,
    },
    Token {
        text: String,
        token_num: usize,
    },
    Done {
        text: String,
        finished: bool,
        stats: Stats,
    },
}

impl From<&StreamEvent> for WireFrame {
    fn from(event: &StreamEvent) -> Self {
        match event {
            StreamEvent::Token { text, token_num } => WireFrame::Token {
                text: text.clone(),
                token_num: *token_num,
            },
            StreamEvent::Done { stats } => WireFrame::Done {
                text: String::new(),
                finished: true,
                stats: stats.clone(),
            },
            StreamEvent::Error { message } => WireFrame::Error {
                error: message.clone(),
            },
        }
    }
}

pub fn to_json(event: &StreamEvent) -> Result<String, ServiceError> {
    serde_json::to_string(&WireFrame::from(event)).map_err(|e| ServiceError::Protocol(e.to_string()))
}

/// Raw frame text, as written to the response body.
pub fn encode_frame(event: &StreamEvent) -> Result<String, ServiceError> {
    Ok(format!("data: {}\n\n", to_json(event)?))
}

pub fn to_sse_event(event: &StreamEvent) -> Result<Event, ServiceError> {
    Event::default()
        .json_data(WireFrame::from(event))
        .map_err(|e| ServiceError::Protocol(e.to_string()))
}

/// Client-side parser for a single frame.
pub fn parse_frame(frame: &str) -> Result<StreamEvent, ServiceError> {
    let payload = frame
        .trim_end_matches('\n')
        .strip_prefix("data:")
        .ok_or_else(|| ServiceError::Protocol(format!("not a data frame: {frame:?}")))?
        .trim_start_matches(' ');

    let wire: WireFrame =
        serde_json::from_str(payload).map_err(|e| ServiceError::Protocol(e.to_string()))?;

    match wire {
        WireFrame::Error { error } => Ok(StreamEvent::Error { message: error }),
        WireFrame::Token { text, token_num } => Ok(StreamEvent::Token { text, token_num }),
        WireFrame::Done {
            finished: true,
            stats,
            ..
        } => Ok(StreamEvent::Done { stats }),
        WireFrame::Done { .. } => Err(ServiceError::Protocol(
            "stats frame without finished flag".into(),
        )),
    }
}

/// Splits a response body into frames on the blank-line delimiter.
pub fn split_frames(body: &str) -> impl Iterator<Item = &str> {
    body.split("\n\n").filter(|chunk| !chunk.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_frame_matches_wire_format() {
        let frame = encode_frame(&StreamEvent::Token {
            text: "Hello".into(),
            token_num: 1,
        })
        .unwrap();
        assert_eq!(frame, "data: {\"text\":\"Hello\",\"token_num\":1}\n\n");
    }

    #[test]
    fn done_frame_carries_finished_flag_and_stats() {
        let frame = encode_frame(&StreamEvent::Done {
            stats: Stats {
                total_time_seconds: 1.5,
                total_tokens: 3,
                tokens_per_second: 2.0,
            },
        })
        .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(frame.strip_prefix("data: ").unwrap().trim_end()).unwrap();
        assert_eq!(json["text"], "");
        assert_eq!(json["finished"], true);
        assert_eq!(json["stats"]["total_time"], 1.5);
        assert_eq!(json["stats"]["total_tokens"], 3);
        assert_eq!(json["stats"]["tokens_per_second"], 2.0);
    }

    #[test]
    fn error_frame_has_only_error_field() {
        let json = to_json(&StreamEvent::Error {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(json, "{\"error\":\"boom\"}");
    }

    #[test]
    fn frames_parse_back_to_the_same_event() {
        let events = [
            StreamEvent::Token {
                text: "multi\nline \"quoted\" ü".into(),
                token_num: 42,
            },
            StreamEvent::Done {
                stats: Stats {
                    total_time_seconds: 0.123456789,
                    total_tokens: 42,
                    tokens_per_second: 340.2,
                },
            },
            StreamEvent::Error {
                message: "device out of memory".into(),
            },
        ];

        for event in events {
            let frame = encode_frame(&event).unwrap();
            assert_eq!(frame.matches("\n\n").count(), 1, "frame split: {frame:?}");
            assert_eq!(parse_frame(&frame).unwrap(), event);
        }
    }

    #[test]
    fn unfinished_stats_frame_is_rejected() {
        let frame = r#"data: {"text":"","finished":false,"stats":{"total_time":1.0,"total_tokens":0,"tokens_per_second":0.0}}"#;
        assert!(parse_frame(frame).is_err());
        assert!(parse_frame("event: ping").is_err());
    }

    #[test]
    fn body_splits_on_blank_lines() {
        let body = "data: {\"text\":\"a\",\"token_num\":1}\n\ndata: {\"error\":\"x\"}\n\n";
        let frames: Vec<&str> = split_frames(body).collect();
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            parse_frame(frames[1]).unwrap(),
            StreamEvent::Error { .. }
        ));
    }
}
