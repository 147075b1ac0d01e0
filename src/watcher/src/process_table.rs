use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use sysinfo::System;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use jobwatch_common::periodic::PeriodicTask;
use jobwatch_common::target_process::NamePattern;
use jobwatch_common::types::{Pid, ProcessRecord, ProcessSnapshot};

pub const DEFAULT_SAMPLING_PERIOD: Duration = Duration::from_millis(250);

/// Narrow seam over the platform process table. Implementations either return
/// the complete table or an error; a partial, silently truncated listing is
/// never produced.
pub trait ProcessTableSource: Send + Sync {
    fn list_processes(&self) -> Result<Vec<ProcessRecord>>;
}

/// Production source backed by sysinfo. Kernel threads have no command line,
/// so the process name stands in for them.
pub struct SysinfoSource {
    system: std::sync::Mutex<System>,
}

impl SysinfoSource {
    pub fn new() -> Self {
        SysinfoSource {
            system: std::sync::Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTableSource for SysinfoSource {
    fn list_processes(&self) -> Result<Vec<ProcessRecord>> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| anyhow!("process table lock poisoned"))?;
        system.refresh_processes();

        let mut records: Vec<ProcessRecord> = system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let command = if process.cmd().is_empty() {
                    process.name().to_string()
                } else {
                    process.cmd().join(" ")
                };
                ProcessRecord::new(pid.as_u32() as Pid, command)
            })
            .collect();

        records.sort_by_key(|record| record.pid);
        Ok(records)
    }
}

/// Maintains the freshest obtainable view of the process table by sampling
/// the source on a fixed period. A failed capture keeps the previous snapshot
/// in place; consumers always read the last good one.
pub struct ProcessTableReader {
    source: Arc<dyn ProcessTableSource>,
    snapshot: Arc<RwLock<Option<ProcessSnapshot>>>,
    period: Arc<RwLock<Duration>>,
    sampler: Mutex<Option<PeriodicTask>>,
}

impl ProcessTableReader {
    pub fn new(source: Arc<dyn ProcessTableSource>) -> Self {
        ProcessTableReader {
            source,
            snapshot: Arc::new(RwLock::new(None)),
            period: Arc::new(RwLock::new(DEFAULT_SAMPLING_PERIOD)),
            sampler: Mutex::new(None),
        }
    }

    /// Begins periodic sampling. Calling on an already running reader is a
    /// no-op; the guard mutex makes concurrent `start` calls race-free.
    pub async fn start(&self) {
        let mut sampler = self.sampler.lock().await;
        if sampler.is_some() {
            debug!("process table reader already running");
            return;
        }

        let source = self.source.clone();
        let snapshot = self.snapshot.clone();
        *sampler = Some(PeriodicTask::spawn(
            "process_table_sampler",
            self.period.clone(),
            move || {
                let source = source.clone();
                let snapshot = snapshot.clone();
                async move {
                    capture_into(&source, &snapshot).await;
                }
            },
        ));
    }

    /// Halts sampling after the in-flight tick, if any. Safe on a reader that
    /// was never started.
    pub async fn stop(&self) {
        let task = self.sampler.lock().await.take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    /// Changes the sampling interval for subsequent ticks.
    pub async fn set_period(&self, period: Duration) {
        *self.period.write().await = period;
    }

    /// Performs one capture outside the periodic schedule.
    pub async fn sample_once(&self) {
        capture_into(&self.source, &self.snapshot).await;
    }

    /// Pids in the latest snapshot whose command line contains `pattern`.
    /// Empty before the first successful capture.
    pub async fn pids_matching(&self, pattern: &NamePattern) -> Vec<Pid> {
        self.snapshot
            .read()
            .await
            .as_ref()
            .map(|snapshot| snapshot.pids_matching(pattern))
            .unwrap_or_default()
    }

    pub async fn is_alive(&self, pid: Pid) -> bool {
        self.snapshot
            .read()
            .await
            .as_ref()
            .map(|snapshot| snapshot.contains(pid))
            .unwrap_or(false)
    }

    /// Defensive copy of the latest capture, if any.
    pub async fn snapshot(&self) -> Option<ProcessSnapshot> {
        self.snapshot.read().await.clone()
    }
}

async fn capture_into(
    source: &Arc<dyn ProcessTableSource>,
    snapshot: &Arc<RwLock<Option<ProcessSnapshot>>>,
) {
    match source.list_processes() {
        Ok(records) => {
            *snapshot.write().await = Some(ProcessSnapshot::new(records));
        }
        Err(e) => {
            warn!("process table capture failed, keeping previous snapshot: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a scripted sequence of capture results, repeating the final
    /// entry once the script is exhausted.
    struct ScriptedSource {
        script: std::sync::Mutex<VecDeque<Result<Vec<ProcessRecord>>>>,
        last: std::sync::Mutex<Option<Vec<ProcessRecord>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<ProcessRecord>>>) -> Arc<Self> {
            Arc::new(ScriptedSource {
                script: std::sync::Mutex::new(script.into()),
                last: std::sync::Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProcessTableSource for ScriptedSource {
        fn list_processes(&self) -> Result<Vec<ProcessRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(records)) => {
                    *self.last.lock().unwrap() = Some(records.clone());
                    Ok(records)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.lock().unwrap().clone().unwrap_or_default()),
            }
        }
    }

    fn table(entries: &[(Pid, &str)]) -> Vec<ProcessRecord> {
        entries
            .iter()
            .map(|(pid, cmd)| ProcessRecord::new(*pid, *cmd))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_before_first_capture() {
        let source = ScriptedSource::new(vec![]);
        let reader = ProcessTableReader::new(source);

        assert!(reader.pids_matching(&NamePattern::new("job")).await.is_empty());
        assert!(!reader.is_alive(42).await);
        assert!(reader.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_capture_publishes_matching_pids() {
        let source = ScriptedSource::new(vec![Ok(table(&[
            (10, "/usr/bin/job-x --fast"),
            (11, "/usr/bin/unrelated"),
        ]))]);
        let reader = ProcessTableReader::new(source);
        reader.sample_once().await;

        assert_eq!(reader.pids_matching(&NamePattern::new("job-x")).await, vec![10]);
        assert!(reader.is_alive(11).await);
        assert!(!reader.is_alive(12).await);
    }

    #[tokio::test]
    async fn test_failed_capture_retains_previous_snapshot() {
        let source = ScriptedSource::new(vec![
            Ok(table(&[(10, "/usr/bin/job-x")])),
            Err(anyhow!("process table unreadable")),
        ]);
        let reader = ProcessTableReader::new(source);

        reader.sample_once().await;
        reader.sample_once().await;

        assert_eq!(reader.pids_matching(&NamePattern::new("job-x")).await, vec![10]);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let source = ScriptedSource::new(vec![]);
        let reader = ProcessTableReader::new(source.clone());
        reader.set_period(Duration::from_secs(60)).await;

        reader.start().await;
        reader.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One sampling task: exactly one immediate capture despite two starts.
        assert_eq!(source.call_count(), 1);
        reader.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let source = ScriptedSource::new(vec![]);
        let reader = ProcessTableReader::new(source);
        reader.stop().await;
    }

    #[tokio::test]
    async fn test_stop_halts_sampling() {
        let source = ScriptedSource::new(vec![]);
        let reader = ProcessTableReader::new(source.clone());
        reader.set_period(Duration::from_millis(10)).await;

        reader.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        reader.stop().await;

        let after_stop = source.call_count();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(source.call_count(), after_stop);
    }

    #[test]
    fn test_sysinfo_source_lists_current_process() {
        let source = SysinfoSource::new();
        let records = source.list_processes().unwrap();

        let own_pid = std::process::id() as Pid;
        assert!(records.iter().any(|record| record.pid == own_pid));
        // Sorted ascending by pid.
        assert!(records.windows(2).all(|w| w[0].pid <= w[1].pid));
    }

    #[rstest]
    #[case::direct_match("job-x", vec![10])]
    #[case::argument_substring("--fast", vec![10])]
    #[case::no_match("job-z", vec![])]
    #[tokio::test]
    async fn test_pids_matching_cases(#[case] pattern: &str, #[case] expected: Vec<Pid>) {
        let source = ScriptedSource::new(vec![Ok(table(&[
            (10, "/usr/bin/job-x --fast"),
            (11, "/usr/bin/unrelated"),
        ]))]);
        let reader = ProcessTableReader::new(source);
        reader.sample_once().await;

        assert_eq!(
            reader.pids_matching(&NamePattern::new(pattern)).await,
            expected
        );
    }
}
