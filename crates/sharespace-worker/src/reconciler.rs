use sharespace_media::Reconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Runs [`Reconciler::sweep`] on a fixed interval.
#[derive(Clone)]
pub struct ReconcileService {
    reconciler: Arc<Reconciler>,
    period: Duration,
}

impl ReconcileService {
    pub fn new(reconciler: Arc<Reconciler>, period: Duration) -> Self {
        Self { reconciler, period }
    }

    /// Start the background sweep. The first sweep runs immediately.
    /// Returns `None` when the period is zero, which disables the service.
    pub fn start(self: Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if self.period.is_zero() {
            tracing::info!("Periodic reconciliation disabled");
            return None;
        }

        Some(tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        }))
    }

    /// One sweep; failures are logged and the next tick tries again.
    pub async fn run_once(&self) {
        let start = std::time::Instant::now();
        tracing::debug!("Starting scheduled reconciliation sweep");

        match self.reconciler.sweep().await {
            Ok(report) => {
                tracing::info!(
                    republished = report.republished,
                    containers_removed = report.containers_removed,
                    objects_moved = report.objects_moved,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Reconciliation sweep completed"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Reconciliation sweep failed");
            }
        }
    }
}
