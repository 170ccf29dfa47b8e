pub mod backoff;
pub mod token_bucket;

pub use backoff::BackoffConfig;
pub use token_bucket::{BucketStats, TokenBucket};
