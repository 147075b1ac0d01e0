use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::process_table::ProcessTableReader;
use jobwatch_common::target_process::NamePattern;
use jobwatch_common::types::{LifecycleState, Pid, ProcessSnapshot, TransitionRecord};

type PatternHistory = HashMap<Pid, Vec<TransitionRecord>>;

/// Turns successive process-table snapshots into lifecycle transitions, one
/// state machine per (pattern, pid).
///
/// A pid with no recorded history is implicitly `NeverStarted`; observing it
/// alive appends `Started`. A pid whose last record is `Started` and which is
/// absent from the current snapshot gets one `Finished` record. `Finished` is
/// terminal for that instance: if the OS reuses the pid for another matching
/// process, a fresh `Started` is appended to the same history. Identity is
/// (pattern, pid) only, so a reused pid cannot be told apart from its
/// predecessor within a single sampling period.
pub struct ProcessLifecycleMonitor {
    histories: Arc<RwLock<HashMap<NamePattern, PatternHistory>>>,
}

impl ProcessLifecycleMonitor {
    pub fn new() -> Self {
        ProcessLifecycleMonitor {
            histories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replaces the monitored pattern set. Existing histories survive for
    /// patterns that remain; removed patterns drop theirs, and newly added
    /// patterns start empty.
    pub async fn set_patterns(&self, patterns: Vec<NamePattern>) {
        let mut histories = self.histories.write().await;
        histories.retain(|pattern, _| patterns.contains(pattern));
        for pattern in patterns {
            histories.entry(pattern).or_default();
        }
    }

    pub async fn patterns(&self) -> Vec<NamePattern> {
        self.histories.read().await.keys().cloned().collect()
    }

    /// Applies one snapshot to every monitored pattern. Both transition rules
    /// are driven purely off the snapshot's aliveness; a pid alive in the
    /// snapshot and already `Started` is a no-op tick.
    pub async fn apply_snapshot(&self, snapshot: &ProcessSnapshot) {
        let mut histories = self.histories.write().await;

        for (pattern, pattern_history) in histories.iter_mut() {
            let alive = snapshot.pids_matching(pattern);

            for pid in &alive {
                let history = pattern_history.entry(*pid).or_default();
                match history.last().map(|record| record.state) {
                    None
                    | Some(LifecycleState::NeverStarted)
                    | Some(LifecycleState::Finished) => {
                        debug!(pattern = %pattern, pid, "process started");
                        history.push(TransitionRecord::new(*pid, LifecycleState::Started));
                    }
                    Some(LifecycleState::Started) => {}
                }
            }

            for (pid, history) in pattern_history.iter_mut() {
                let still_running =
                    history.last().map(|record| record.state) == Some(LifecycleState::Started);
                if still_running && !snapshot.contains(*pid) {
                    debug!(pattern = %pattern, pid, "process finished");
                    history.push(TransitionRecord::new(*pid, LifecycleState::Finished));
                }
            }
        }
    }

    /// One monitoring tick: apply the reader's latest snapshot, if it has
    /// captured one yet.
    pub async fn scan_once(&self, reader: &ProcessTableReader) {
        if let Some(snapshot) = reader.snapshot().await {
            self.apply_snapshot(&snapshot).await;
        }
    }

    /// Defensive copy of a pattern's transition history. Unknown patterns
    /// yield an empty map, never an error.
    pub async fn history_for(&self, pattern: &NamePattern) -> PatternHistory {
        self.histories
            .read()
            .await
            .get(pattern)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for ProcessLifecycleMonitor {
    fn default() -> Self {
        Self::new()
    }
}
