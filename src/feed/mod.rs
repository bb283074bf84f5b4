//! Live notification feed for one signed-in user.
//!
//! [`FeedHandle`] fronts an actor that keeps the recent list and unread count in memory,
//! applies pushed row changes, and reconnects the realtime channel with capped backoff.

mod actor;
mod backoff;
mod ledger;
mod ops;
mod status;

pub use actor::{FeedActor, FeedHandle, FeedMessage, FeedSettings, FeedState, FeedView};
pub use backoff::ReconnectBackoff;
pub use ledger::{ApplyOutcome, NotificationLedger};
pub use ops::{FeedOps, FeedSnapshot};
pub use status::ConnectionState;
