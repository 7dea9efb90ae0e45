use std::sync::Arc;

use tracing::info;
use weather_sync::app::App;
use weather_sync::config::AppConfig;
use weather_sync::logging::{LoggingOptions, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    openweather::install_rustls_provider();

    let config = AppConfig::from_env()?;

    // The guard flushes the file appender on drop; hold it for the whole run.
    let (logging, _log_guard) = init_logging(&LoggingOptions {
        json: config.log_json,
        log_dir: config.log_dir.clone(),
    })?;

    let app = App::build(config, Some(Arc::new(logging))).await?;

    let cancellation_token = app.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancellation_token.cancel();
    });

    app.run().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received terminate signal, initiating graceful shutdown"),
    }
}
