pub mod config;
pub mod engine;
pub mod error;
pub mod prompt;
pub mod server;
pub mod stream;

pub use config::AppConfig;
pub use engine::{EngineSlot, InferenceEngine};
pub use error::ServiceError;
pub use server::build_router;
pub use stream::{Stats, StreamEvent};
