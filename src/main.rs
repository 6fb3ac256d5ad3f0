use std::net::SocketAddr;

use fbdl::{AppContext, build_router, config::Config, error::ApiError, retention};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "fbdl=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = Config::from_env();

    tokio::fs::create_dir_all(&config.downloads_dir)
        .await
        .map_err(|error| {
            ApiError::internal(format!(
                "Could not create the downloads folder {:?}: {error}",
                config.downloads_dir
            ))
        })?;

    if !config.trust_proxy_headers {
        warn!("TRUST_PROXY_HEADERS=false: the socket address identifies requesters.");
    }

    let shutdown = CancellationToken::new();
    let sweeper = retention::spawn_sweeper(
        config.downloads_dir.clone(),
        config.retention,
        config.sweep_period,
        shutdown.clone(),
    );

    let addr = config.bind_addr.clone();
    let ctx = AppContext::with_yt_dlp(config);
    let app = build_router(ctx);

    let listener = TcpListener::bind(&addr).await.map_err(|error| {
        ApiError::internal(format!("Could not listen on {addr}: {error}"))
    })?;

    info!("Server ready at http://{addr}");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
    .await;

    shutdown.cancel();
    if let Err(error) = sweeper.await {
        warn!("Retention sweep task ended abnormally: {error}");
    }

    served.map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}

async fn wait_for_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!("Could not listen for SIGTERM: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => {},
    }

    info!("Shutdown requested");
    token.cancel();
}
