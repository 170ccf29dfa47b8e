pub mod drain;
pub mod error;
pub mod handler;
pub mod markdown;
pub mod replica;

/// Producer name stamped on every envelope this stage emits.
pub const SERVICE_NAME: &str = "renderer";

pub use drain::DrainMonitor;
pub use error::RenderError;
pub use handler::{handle_render_message, RenderResult, RenderStatus, RendererContext};
pub use replica::{run_replica, ReplicaConfig};
