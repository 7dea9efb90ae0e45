//! Process wiring.
//!
//! [`App::build`] opens the database and constructs every service;
//! [`App::run`] drives them concurrently until the shared cancellation
//! token fires or the scheduler hits a fatal error.

use std::sync::Arc;
use std::time::Duration;

use openweather::{ClientOptions, OpenWeatherClient};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::{ApiServer, ApiServerConfig, AppState};
use crate::config::AppConfig;
use crate::database::{
    self, AssetRepository, ConfigurationRepository, SqlxAssetRepository,
    SqlxConfigurationRepository,
};
use crate::domain::{StatusHandle, TenantId};
use crate::heartbeat::HeartbeatReporter;
use crate::listener::{BackoffConfig, EventListener, ListenerSupervisor, ReconnectBackoff};
use crate::logging::LoggingHandle;
use crate::platform::{HttpPlatformClient, PlatformApi, PushSource, WebSocketPushSource};
use crate::scheduler::{CollectionRunner, DEFAULT_RELOAD_CAPACITY, ReloadTrigger, SchedulerDriver};
use crate::weather::WeatherProvider;
use crate::{Error, Result};

const PLATFORM_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct App {
    config: AppConfig,
    pool: SqlitePool,
    driver: SchedulerDriver,
    reload_rx: mpsc::Receiver<TenantId>,
    heartbeat: HeartbeatReporter,
    supervisor: ListenerSupervisor,
    api: ApiServer,
    cancellation_token: CancellationToken,
}

impl App {
    pub async fn build(config: AppConfig, logging: Option<Arc<LoggingHandle>>) -> Result<Self> {
        info!("Initializing weather-sync");

        let pool = database::init_pool(&config.database_url).await?;
        database::run_migrations(&pool).await?;

        let configs: Arc<dyn ConfigurationRepository> =
            Arc::new(SqlxConfigurationRepository::new(pool.clone()));
        let assets: Arc<dyn AssetRepository> = Arc::new(SqlxAssetRepository::new(pool.clone()));

        let weather: Arc<dyn WeatherProvider> = Arc::new(OpenWeatherClient::new(ClientOptions {
            geo_url: config.openweather_geo_url.clone(),
            one_call_url: config.openweather_one_call_url.clone(),
            ..ClientOptions::default()
        })?);
        let platform: Arc<dyn PlatformApi> = Arc::new(HttpPlatformClient::new(
            config.api_endpoint.clone(),
            &config.api_token,
            config.client_reference.clone(),
            PLATFORM_REQUEST_TIMEOUT,
        )?);

        let status = StatusHandle::new();
        let cancellation_token = CancellationToken::new();

        let runner = Arc::new(CollectionRunner::new(
            Arc::clone(&assets),
            Arc::clone(&weather),
            Arc::clone(&platform),
        ));
        let driver = SchedulerDriver::new(
            Arc::clone(&configs),
            runner,
            status.clone(),
            cancellation_token.clone(),
        );
        let (reload, reload_rx) = ReloadTrigger::channel(DEFAULT_RELOAD_CAPACITY);

        let heartbeat =
            HeartbeatReporter::new(Arc::clone(&assets), Arc::clone(&platform), status.clone());

        let listener = EventListener::new(
            Arc::clone(&assets),
            Arc::clone(&configs),
            Arc::clone(&platform),
            Arc::clone(&weather),
            reload,
            status.clone(),
            config.client_reference.clone(),
        );
        let source: Arc<dyn PushSource> = Arc::new(WebSocketPushSource::new(
            config.listener_url(),
            config.api_token.clone(),
        ));
        let backoff = ReconnectBackoff::new(BackoffConfig {
            max: config.listener_max_backoff,
            ..BackoffConfig::default()
        });
        let supervisor = ListenerSupervisor::new(listener, source, backoff, status.clone());

        let mut state = AppState::new(configs, weather, status.clone());
        if let Some(logging) = logging {
            state = state.with_logging(logging);
        }
        let api = ApiServer::new(
            ApiServerConfig::from(&config),
            state,
            cancellation_token.clone(),
        );

        info!("weather-sync initialized");
        Ok(Self {
            config,
            pool,
            driver,
            reload_rx,
            heartbeat,
            supervisor,
            api,
            cancellation_token,
        })
    }

    /// Token that stops every service when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Runs until cancelled or until the scheduler fails fatally.
    ///
    /// A fatal scheduler error is published once more to every root asset
    /// before the remaining services are stopped and the error is returned.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            pool,
            driver,
            reload_rx,
            heartbeat,
            supervisor,
            api,
            cancellation_token,
        } = self;

        let heartbeat_task = tokio::spawn(
            heartbeat
                .clone()
                .run(config.heartbeat_interval, cancellation_token.clone()),
        );
        let listener_task = tokio::spawn(supervisor.run(cancellation_token.clone()));
        let api_token = cancellation_token.clone();
        let api_task: JoinHandle<Result<()>> = tokio::spawn(async move {
            let result = api.run().await;
            if let Err(e) = &result {
                error!(error = %e, "API server failed; shutting down");
                api_token.cancel();
            }
            result
        });

        let driver_result = driver.run(config.scheduler_tick, reload_rx).await;
        if let Err(e) = &driver_result {
            error!(error = %e, "Scheduler stopped with a fatal error");
            if let Err(beat_err) = heartbeat.beat().await {
                error!(error = %beat_err, "Failed to publish fatal status");
            }
        }

        cancellation_token.cancel();
        let api_result = join(api_task).await.and_then(|result| result);
        if let Err(e) = join(heartbeat_task).await {
            error!(error = %e, "Heartbeat task failed");
        }
        if let Err(e) = join(listener_task).await {
            error!(error = %e, "Listener task failed");
        }

        info!("Closing database pool...");
        pool.close().await;
        info!("weather-sync stopped");

        driver_result.and(api_result)
    }
}

async fn join<T>(task: JoinHandle<T>) -> Result<T> {
    task.await.map_err(|e| Error::Other(format!("task failed: {e}")))
}
