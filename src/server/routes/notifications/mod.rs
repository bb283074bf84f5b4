use crate::server::router::ClubfeedState;
use axum::{
    Router,
    routing::{delete, get, post},
};

mod handlers;

pub fn router() -> Router<ClubfeedState> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/unread-count",
            get(handlers::unread_count),
        )
        .route("/notifications/refresh", post(handlers::refresh))
        .route("/notifications/read-all", post(handlers::mark_all_read))
        .route("/notifications/{id}/read", post(handlers::mark_read))
        .route("/notifications/{id}", delete(handlers::delete_notification))
}
