//! Drives reporting cycles: snapshot, transform, send.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::io::InfluxDbWriter;
use crate::io::Sender;
use crate::metrics::SnapshotSource;
use crate::transformer::Transformer;

/// Shortest period [`Reporter::run`] accepts.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Reports the metrics of a [`SnapshotSource`] to InfluxDB.
#[derive(Debug)]
pub struct Reporter<S, W> {
    source: S,
    transformer: Transformer,
    sender: Mutex<Sender<W>>,
}

impl<S: SnapshotSource, W: InfluxDbWriter> Reporter<S, W> {
    pub fn new(source: S, transformer: Transformer, sender: Sender<W>) -> Self {
        Self {
            source,
            transformer,
            sender: Mutex::new(sender),
        }
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// Measurements waiting for the next delivery attempt.
    pub fn queued(&self) -> usize {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queued()
    }

    /// Runs one cycle stamped with `timestamp` (epoch milliseconds).
    ///
    /// Returns whether every queued measurement was delivered.
    pub fn report_at(&self, timestamp: i64) -> bool {
        let metrics = self.source.snapshot();
        let measurements = self.transformer.transform(&metrics, timestamp);

        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(measurements)
    }

    /// Runs one cycle stamped with the current time.
    pub fn report(&self) -> bool {
        self.report_at(epoch_millis())
    }
}

impl<S, W> Reporter<S, W>
where
    S: SnapshotSource + 'static,
    W: InfluxDbWriter + 'static,
{
    /// Reports every `period` until `cancellation_token` fires, then reports
    /// once more so queued measurements get a last delivery attempt.
    ///
    /// The first cycle runs one period after start. Cycles run on the
    /// blocking pool since the writers block. A zero `period` is raised to
    /// [`MIN_PERIOD`].
    pub async fn run(self: Arc<Self>, period: Duration, cancellation_token: CancellationToken) {
        let period = period.max(MIN_PERIOD);
        tracing::info!(period = ?period, "Starting InfluxDB reporter");

        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    tracing::info!("InfluxDB reporter shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    self.report_blocking().await;
                }
            }
        }

        if !self.report_blocking().await {
            tracing::warn!(queued = self.queued(), "Final report left measurements undelivered");
        }
        tracing::info!("InfluxDB reporter stopped");
    }

    async fn report_blocking(self: &Arc<Self>) -> bool {
        let reporter = Arc::clone(self);
        match tokio::task::spawn_blocking(move || reporter.report()).await {
            Ok(sent) => sent,
            Err(e) => {
                tracing::error!(error = %e, "Reporting cycle did not complete");
                false
            }
        }
    }
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
