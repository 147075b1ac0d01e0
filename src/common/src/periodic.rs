use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A cancellable fixed-period background task. The unit of work runs once
/// immediately on spawn, then once per period. Cancellation is cooperative:
/// the signal is observed between iterations, never mid-work, so shutdown can
/// take up to one period to quiesce.
///
/// The period is re-read before every sleep, so changing it through the
/// shared handle takes effect on the next iteration.
pub struct PeriodicTask {
    name: &'static str,
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Arc<RwLock<Duration>>, mut work: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                work().await;

                let current_period = *period.read().await;
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(task = name, "periodic task cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(current_period) => {}
                }
            }
        });

        PeriodicTask {
            name,
            cancellation_token,
            handle,
        }
    }

    /// Signals cancellation and waits for the task to observe it.
    pub async fn stop(self) {
        self.cancellation_token.cancel();
        if let Err(e) = self.handle.await {
            error!(task = self.name, "periodic task panicked: {e:?}");
        }
    }
}
