pub mod config;
pub mod content;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod shutdown;

pub use config::Config;
pub use content::*;
pub use envelope::{
    BuildPayload, CollectPayload, MessageEnvelope, Operation, RenderPayload, TopicPayload,
};
pub use error::ErrorKind;
pub use shutdown::Shutdown;
