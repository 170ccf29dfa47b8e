pub mod build;
pub mod error;
pub mod handler;
pub mod swap;
pub mod testing;
pub mod validate;
pub mod workspace;

/// Producer name stamped on every envelope this stage emits.
pub const SERVICE_NAME: &str = "publisher";

pub use build::{CommandBuilder, SiteBuilder};
pub use error::PublishError;
pub use handler::{
    handle_build_message, DeployStatus, DeploymentResult, Disposition, PublisherContext,
};
pub use validate::{validate_output, ValidationReport};
pub use workspace::Workspace;
