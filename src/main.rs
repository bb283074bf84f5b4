use clubfeed::backend::Backend;
use clubfeed::config::Config;
use clubfeed::feed::FeedHandle;
use clubfeed::server::{ClubfeedState, clubfeed_router};
use clubfeed::utils::logging::{init_tracing, redact};
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::info;
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;
    init_tracing(&cfg.basic.loglevel);

    info!(
        loglevel = %cfg.basic.loglevel,
        dashboard_key = %redact(&cfg.basic.dashboard_key),
        listen_addr = %cfg.basic.listen_addr,
        listen_port = cfg.basic.listen_port,
        load_limit = cfg.feed.load_limit,
        backoff_base_ms = cfg.feed.backoff_base_ms,
        backoff_max_ms = cfg.feed.backoff_max_ms,
        "Basic config (effective)"
    );

    let backend = Backend::from_config(&cfg).await?;
    let feed = FeedHandle::spawn(&backend, &cfg.feed).await?;

    let state = ClubfeedState::new(feed.clone(), Arc::from(cfg.basic.dashboard_key.as_str()));
    let app = clubfeed_router(state);

    let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feed.stop().await;
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
