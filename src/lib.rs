pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod server;
pub mod utils;

pub use backend::Backend;
pub use error::{BackendError, FeedError};
pub use feed::{ConnectionState, FeedHandle, FeedView};
