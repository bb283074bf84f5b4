use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use clubfeed::backend::Backend;
use clubfeed::backend::NotificationStore;
use clubfeed::db::LocalAuth;
use clubfeed::feed::{FeedHandle, FeedSettings, ReconnectBackoff};
use clubfeed::server::{ClubfeedState, clubfeed_router};
use clubfeed_schema::NewNotification;
use serde_json::Value;
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;
use uuid::Uuid;

const KEY: &str = "pwd";

fn temp_database_url(tag: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "clubfeed-routes-{tag}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));
    format!("sqlite:{}", temp_path.display())
}

struct App {
    router: Router,
    feed: FeedHandle,
}

async fn app(tag: &str, signed_in: bool, seed: &[(&str, bool)]) -> App {
    let db = clubfeed::db::spawn(&temp_database_url(tag))
        .await
        .expect("db spawns");
    let user_id = Uuid::new_v4();
    for (title, read) in seed {
        let created = db
            .create(NewNotification {
                user_id,
                kind: "quotation_approved".to_string(),
                title: (*title).to_string(),
                message: "Quotation was approved".to_string(),
                related_type: Some("quotation".to_string()),
                related_id: None,
            })
            .await
            .unwrap();
        if *read {
            db.mark_read(user_id, created.id).await.unwrap();
        }
    }

    let auth = if signed_in {
        LocalAuth::signed_in(user_id)
    } else {
        LocalAuth::signed_out()
    };
    let shared = Arc::new(db.clone());
    let backend = Backend::new(shared.clone(), Arc::new(auth), shared);
    let settings = FeedSettings {
        load_limit: 50,
        backoff: ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(1)),
    };
    let feed = FeedHandle::spawn_with(&backend, settings)
        .await
        .expect("feed spawns");
    // Wait for the initial load so responses are deterministic.
    feed.refresh().await.unwrap();

    let state = ClubfeedState::new(feed.clone(), Arc::from(KEY));
    App {
        router: clubfeed_router(state),
        feed,
    }
}

fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).expect("failed to build request")
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn notification_routes_require_a_key() {
    let app = app("auth", true, &[("Kickoff", false)]).await;

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", "/notifications", None))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", "/notifications", Some("wrong")))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Bearer and query-string keys are accepted too.
    let resp = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/notifications/unread-count")
                .header("authorization", format!("Bearer {KEY}"))
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/notifications?key={KEY}"), None))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", "/healthz", None))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "ok");

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", "/nope", None))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    app.feed.stop().await;
}

#[tokio::test]
async fn list_mark_and_delete_round_trip() {
    let app = app(
        "crud",
        true,
        &[("Kickoff", false), ("Venue booked", true), ("Budget", false)],
    )
    .await;

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", "/notifications", Some(KEY)))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["unread_count"], 2);
    assert_eq!(body["loading"], false);
    let items = body["notifications"].as_array().expect("list");
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["title"], "Budget");
    assert_eq!(items[0]["type"], "quotation_approved");
    let newest = items[0]["id"].as_str().unwrap().to_string();

    let resp = app
        .router
        .clone()
        .oneshot(request(
            "POST",
            &format!("/notifications/{newest}/read"),
            Some(KEY),
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", "/notifications/unread-count", Some(KEY)))
        .await
        .expect("request failed");
    assert_eq!(json_body(resp).await["unread_count"], 1);

    let resp = app
        .router
        .clone()
        .oneshot(request("DELETE", &format!("/notifications/{newest}"), Some(KEY)))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.feed.snapshot().await.unwrap().len(), 2);

    let resp = app
        .router
        .clone()
        .oneshot(request("POST", "/notifications/read-all", Some(KEY)))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.feed.unread_count().await.unwrap(), 0);

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", "/notifications?limit=1", Some(KEY)))
        .await
        .expect("request failed");
    let body = json_body(resp).await;
    assert_eq!(body["notifications"].as_array().unwrap().len(), 1);

    let resp = app
        .router
        .clone()
        .oneshot(request("POST", "/notifications/refresh", Some(KEY)))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = app
        .router
        .clone()
        .oneshot(request("POST", "/notifications/not-a-uuid/read", Some(KEY)))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    app.feed.stop().await;
}

#[tokio::test]
async fn signed_out_feed_answers_auth_unresolved() {
    let app = app("signed-out", false, &[("Kickoff", false)]).await;

    let resp = app
        .router
        .clone()
        .oneshot(request("POST", "/notifications/read-all", Some(KEY)))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "AUTH_UNRESOLVED");

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", "/notifications", Some(KEY)))
        .await
        .expect("request failed");
    let body = json_body(resp).await;
    assert_eq!(body["state"], "idle");
    assert_eq!(body["notifications"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn stopped_feed_answers_service_unavailable() {
    let app = app("stopped", true, &[]).await;
    app.feed.stop().await;

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", "/notifications", Some(KEY)))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(resp).await["error"]["code"], "FEED_STOPPED");

    let resp = app
        .router
        .clone()
        .oneshot(request("GET", "/healthz", None))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["feed"], "stopped");
}
