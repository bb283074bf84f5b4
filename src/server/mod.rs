pub mod guards;
pub mod router;
pub mod routes;

pub use router::{ClubfeedState, clubfeed_router};
