mod types;

pub use types::{ImagesConfig, OperatorConfig, RetryConfig};
