//! Fetch loop: poll the arrivals source and publish into the shared state.

use super::TaskName;
use crate::health::{Component, HealthBoard};
use crate::state::SharedState;
use crate::transit::{ArrivalSource, FetchError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const NAME: TaskName = "fetch";

/// One bounded fetch. On success the snapshot is published; on failure the
/// current snapshot is left alone. Transit health follows the outcome.
pub async fn fetch_once(
    source: &dyn ArrivalSource,
    state: &SharedState,
    health: &HealthBoard,
    timeout: Duration,
) -> Result<(), FetchError> {
    let result = match tokio::time::timeout(timeout, source.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    };

    match result {
        Ok(snapshot) => {
            info!(
                arrivals = snapshot.len(),
                simulated = snapshot.is_simulated(),
                "arrivals updated"
            );
            state.publish(snapshot);
            health.record_attempt(Component::Transit, true);
            Ok(())
        }
        Err(err) => {
            health.record_attempt(Component::Transit, false);
            Err(err)
        }
    }
}

/// Log a failed fetch. An unconfigured source fails every tick, so it only
/// shows up at debug level.
pub fn log_failure(err: &FetchError) {
    match err {
        FetchError::Unavailable => debug!("no transit source configured, keeping current data"),
        err => warn!(%err, "fetch failed, keeping previous arrivals"),
    }
}

pub struct FetchLoop {
    source: Arc<dyn ArrivalSource>,
    state: Arc<SharedState>,
    health: Arc<HealthBoard>,
    interval: Duration,
    timeout: Duration,
}

impl FetchLoop {
    pub fn new(
        source: Arc<dyn ArrivalSource>,
        state: Arc<SharedState>,
        health: Arc<HealthBoard>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            state,
            health,
            interval,
            timeout,
        }
    }

    /// Sleep, fetch, repeat until cancelled. The initial fetch is done by the
    /// controller before this starts, so the first wait comes first.
    pub async fn run(self, cancel: CancellationToken) -> TaskName {
        info!(interval = ?self.interval, "fetch loop started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("in-flight fetch abandoned");
                    break;
                }
                result = fetch_once(self.source.as_ref(), &self.state, &self.health, self.timeout) => {
                    if let Err(err) = result {
                        log_failure(&err);
                    }
                }
            }
        }
        info!("fetch loop stopped");
        NAME
    }
}
