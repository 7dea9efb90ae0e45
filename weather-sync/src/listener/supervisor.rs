use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::EventListener;
use super::backoff::ReconnectBackoff;
use crate::domain::{ProcessStatus, StatusHandle};
use crate::platform::PushSource;

/// Keeps the [`EventListener`] connected.
///
/// Every connection failure or listener exit reports ERROR and reconnects
/// after a capped exponential delay. The supervisor never gives up; it only
/// stops when cancelled.
pub struct ListenerSupervisor {
    listener: EventListener,
    source: Arc<dyn PushSource>,
    backoff: ReconnectBackoff,
    status: StatusHandle,
}

impl ListenerSupervisor {
    pub fn new(
        listener: EventListener,
        source: Arc<dyn PushSource>,
        backoff: ReconnectBackoff,
        status: StatusHandle,
    ) -> Self {
        Self {
            listener,
            source,
            backoff,
            status,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Listener supervisor started");
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                connected = self.source.connect() => match connected {
                    Ok(stream) => self.listener.run(stream, &cancel).await,
                    Err(e) => Err(e),
                },
            };

            if cancel.is_cancelled() {
                break;
            }

            let error = match result {
                Ok(()) => break,
                Err(e) => e,
            };

            self.status.report(ProcessStatus::Error);
            let delay = self.backoff.record_failure();
            warn!(
                error = %error,
                delay_ms = delay.as_millis() as u64,
                recent_failures = self.backoff.recent_failures(),
                "Change listener stopped; reconnecting"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!(
            total_restarts = self.backoff.total_restarts(),
            "Listener supervisor stopped"
        );
    }
}
