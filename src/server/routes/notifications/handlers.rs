use crate::error::FeedError;
use crate::feed::FeedView;
use crate::server::router::ClubfeedState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    limit: Option<usize>,
}

/// With `?limit=` the feed re-fetches at that page size before answering.
pub(super) async fn list_notifications(
    State(state): State<ClubfeedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<FeedView>, FeedError> {
    let view = match query.limit {
        Some(limit) => state.feed.load(limit).await?,
        None => state.feed.view().await?,
    };
    Ok(Json(view))
}

pub(super) async fn unread_count(
    State(state): State<ClubfeedState>,
) -> Result<Json<Value>, FeedError> {
    let unread = state.feed.unread_count().await?;
    Ok(Json(json!({ "unread_count": unread })))
}

pub(super) async fn refresh(State(state): State<ClubfeedState>) -> Result<StatusCode, FeedError> {
    state.feed.request_refresh()?;
    Ok(StatusCode::ACCEPTED)
}

pub(super) async fn mark_read(
    State(state): State<ClubfeedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, FeedError> {
    debug!(%id, "Mark notification read");
    state.feed.mark_as_read(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn mark_all_read(
    State(state): State<ClubfeedState>,
) -> Result<StatusCode, FeedError> {
    state.feed.mark_all_as_read().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn delete_notification(
    State(state): State<ClubfeedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, FeedError> {
    debug!(%id, "Delete notification");
    state.feed.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
