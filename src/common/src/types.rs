use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target_process::NamePattern;

pub type Pid = usize;

/// One entry of a process-table capture: a pid and its full command line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub command: String,
}

impl ProcessRecord {
    pub fn new(pid: Pid, command: impl Into<String>) -> Self {
        ProcessRecord {
            pid,
            command: command.into(),
        }
    }
}

/// Point-in-time capture of the full process table. Published by the reader
/// as an immutable value; consumers only ever see clones.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessSnapshot {
    pub captured_at: DateTime<Utc>,
    pub processes: Vec<ProcessRecord>,
}

impl ProcessSnapshot {
    pub fn new(processes: Vec<ProcessRecord>) -> Self {
        ProcessSnapshot {
            captured_at: Utc::now(),
            processes,
        }
    }

    /// Pids whose command line contains `pattern`, in capture order.
    pub fn pids_matching(&self, pattern: &NamePattern) -> Vec<Pid> {
        self.processes
            .iter()
            .filter(|record| pattern.matches(&record.command))
            .map(|record| record.pid)
            .collect()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.iter().any(|record| record.pid == pid)
    }
}

/// Lifecycle of one monitored process instance under a pattern.
/// `NeverStarted` exists only implicitly: no record has been appended yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NeverStarted,
    Started,
    Finished,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::NeverStarted => "never_started",
            LifecycleState::Started => "started",
            LifecycleState::Finished => "finished",
        }
    }
}

/// One observed state change, appended to the per-(pattern, pid) history.
/// Histories are append-only and monotonically non-decreasing in timestamp;
/// the last record is authoritative for the current state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub pid: Pid,
    pub state: LifecycleState,
    pub timestamp: DateTime<Utc>,
}

impl TransitionRecord {
    pub fn new(pid: Pid, state: LifecycleState) -> Self {
        TransitionRecord {
            pid,
            state,
            timestamp: Utc::now(),
        }
    }
}
