use std::net::SocketAddr;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{
    fmt::layer, layer::SubscriberExt, registry, util::SubscriberInitExt, EnvFilter,
};

mod api;
mod app;
mod config;
mod engine;
mod error;
mod extractor;
mod parsers;
mod presence;
mod priority;
mod projector;
mod queue;
mod roles;
mod track;
mod voice;

use app::App;

#[tokio::main]
async fn main() {
    registry()
        .with(layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = config::load_configuration();

    let bind_addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid bind address {:?}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };

    let app = App::new(config);

    tokio::spawn(sweep_presence(app.clone()));

    let router = api::router(app);

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    info!("tunehall listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {}", e);
        std::process::exit(1);
    }
}

/// Periodically evicts overlay subscribers past their TTL.
async fn sweep_presence(app: App) {
    let mut interval = tokio::time::interval(Duration::from_secs(app.config.presence_sweep_seconds));
    loop {
        interval.tick().await;
        app.presence.sweep();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("shutdown signal received, draining in-flight requests");
}
