//! API server entry point.

use api::config::Config;
use api::error::StartupError;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn build_app(config: &Config, metrics_handle: PrometheusHandle) -> Result<axum::Router, StartupError> {
    match &config.database_url {
        Some(database_url) => {
            tracing::info!("using PostgreSQL basket store and catalog");
            let (basket, catalog) = api::postgres_services(config, database_url).await?;
            Ok(api::create_app(basket, catalog, metrics_handle))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores with the demo catalog");
            let (basket, catalog) = api::in_memory_services(config);
            Ok(api::create_app(basket, catalog, metrics_handle))
        }
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| StartupError::Metrics(e.to_string()))?;
    api::routes::metrics::describe();

    let app = build_app(&config, metrics_handle).await?;

    let addr = config.addr();
    tracing::info!(%addr, basket_ttl = ?config.basket_ttl, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
