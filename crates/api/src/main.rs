use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgstudio_api::config::ServerConfig;
use imgstudio_api::router::build_app_router;
use imgstudio_api::state::AppState;
use imgstudio_api::tracker::VideoJobRegistry;
use imgstudio_genmedia::{BackendStatusCheck, GenMediaApi, GenMediaConfig, MediaBackend};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "imgstudio_api=debug,imgstudio_genmedia=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        initial_interval_ms = config.poll.initial_interval.as_millis() as u64,
        max_interval_ms = config.poll.max_interval.as_millis() as u64,
        backoff_factor = config.poll.backoff_factor,
        max_attempts = config.poll.max_attempts,
        "Loaded polling schedule",
    );

    // --- Generative-media backend ---
    let genmedia_config = GenMediaConfig::from_env();
    tracing::info!(
        project = %genmedia_config.project_id,
        location = %genmedia_config.location,
        video_model = %genmedia_config.video_model,
        image_model = %genmedia_config.image_model,
        "Loaded generative-media configuration",
    );
    let backend: Arc<dyn MediaBackend> = Arc::new(
        GenMediaApi::new(genmedia_config).expect("Failed to build generative-media client"),
    );

    // --- Video job registry ---
    let videos = Arc::new(VideoJobRegistry::new(
        Arc::new(BackendStatusCheck::new(Arc::clone(&backend))),
        config.poll.clone(),
        Duration::from_secs(config.job_retention_secs),
    ));

    // --- App state ---
    let state = AppState {
        backend,
        videos: Arc::clone(&videos),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    tokio::select! {
        result = server => result.expect("Server error"),
        () = drain_deadline(drain) => {
            tracing::warn!(timeout_secs = config.shutdown_timeout_secs, "Shutdown drain timed out");
        }
    }

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let running = videos.running_count();
    tracing::info!(running, "Stopping video job pollers");
    videos.shutdown();

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Resolves `timeout` after a shutdown signal, bounding how long in-flight
/// requests may drain.
async fn drain_deadline(timeout: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(timeout).await;
}
