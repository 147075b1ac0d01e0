use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::exporters::{AlarmSink, AlarmSinkEnum};
use jobwatch_common::target_process::NamePattern;
use jobwatch_common::types::{LifecycleState, Pid, TransitionRecord};

use jobwatch_watcher::ProcessLifecycleMonitor;

#[derive(Clone, Debug, Default)]
struct PatternLedger {
    alarmed: HashSet<Pid>,
    count: u64,
}

/// Turns finished-process transitions into at-most-once notifications.
///
/// A pid qualifies for an alarm iff its latest recorded state is `Finished`
/// and it has not been alarmed for that pattern before. The ledger entry and
/// counter are committed before the delivery attempt and never rolled back:
/// a failed delivery is logged and dropped, not retried.
pub struct AlarmDispatcher {
    ledgers: Arc<RwLock<HashMap<NamePattern, PatternLedger>>>,
}

impl AlarmDispatcher {
    pub fn new() -> Self {
        AlarmDispatcher {
            ledgers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// One dispatch tick over every monitored pattern. Delivery happens
    /// outside the ledger lock, so a slow sink delays only this loop.
    pub async fn dispatch_once(
        &self,
        monitor: &ProcessLifecycleMonitor,
        sink: Option<&AlarmSinkEnum>,
    ) {
        for pattern in monitor.patterns().await {
            let history = monitor.history_for(&pattern).await;
            let newly_finished = self.claim_newly_finished(&pattern, &history).await;

            for pid in newly_finished {
                let message = format!(
                    "pattern={pattern} | pid={pid} | status={}",
                    LifecycleState::Finished.as_str()
                );
                info!("{message}");

                match sink {
                    Some(sink) => {
                        if let Err(e) = sink.deliver(&message).await {
                            warn!(pattern = %pattern, pid, "alarm delivery failed: {e:#}");
                        }
                    }
                    None => debug!(pattern = %pattern, pid, "no alarm sink configured"),
                }
            }
        }
    }

    /// Marks every newly finished pid as alarmed and bumps the pattern's
    /// counter, returning the claimed pids in ascending order.
    async fn claim_newly_finished(
        &self,
        pattern: &NamePattern,
        history: &HashMap<Pid, Vec<TransitionRecord>>,
    ) -> Vec<Pid> {
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers.entry(pattern.clone()).or_default();

        let mut claimed: Vec<Pid> = history
            .iter()
            .filter(|(pid, records)| {
                records.last().map(|record| record.state) == Some(LifecycleState::Finished)
                    && !ledger.alarmed.contains(*pid)
            })
            .map(|(pid, _)| *pid)
            .collect();
        claimed.sort_unstable();

        for pid in &claimed {
            ledger.alarmed.insert(*pid);
            ledger.count += 1;
        }
        claimed
    }

    /// Thread-safe read of a pattern's alarm count; 0 for unknown patterns.
    pub async fn total_alarms(&self, pattern: &NamePattern) -> u64 {
        self.ledgers
            .read()
            .await
            .get(pattern)
            .map(|ledger| ledger.count)
            .unwrap_or(0)
    }

    /// Snapshot of every pattern's alarm count.
    pub async fn alarm_counts(&self) -> HashMap<NamePattern, u64> {
        self.ledgers
            .read()
            .await
            .iter()
            .map(|(pattern, ledger)| (pattern.clone(), ledger.count))
            .collect()
    }
}

impl Default for AlarmDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
