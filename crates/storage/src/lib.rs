pub mod backend;
pub mod blob;
pub mod error;
pub mod lease;

pub use backend::StorageBackend;
pub use blob::{containers, BlobMeta, BlobStore};
pub use error::StorageError;
pub use lease::{AcquireOutcome, Lease, LeaseManager};
