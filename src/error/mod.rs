mod backend;
mod feed;

pub use backend::BackendError;
pub use feed::{ApiErrorBody, ApiErrorObject, FeedError};

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
