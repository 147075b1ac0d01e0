use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config_manager::ConfigStore;
use crate::dispatcher::AlarmDispatcher;
use crate::exporters::{AlarmSinkEnum, WebhookSink};
use jobwatch_common::periodic::PeriodicTask;
use jobwatch_common::target_process::NamePattern;
use jobwatch_watcher::{
    ProcessLifecycleMonitor, ProcessTableReader, ProcessTableSource, SysinfoSource,
};

pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_millis(250);

/// Wires the four components together: the config store feeds patterns to the
/// lifecycle monitor, the process-table reader feeds it snapshots, and the
/// dispatcher turns its finished transitions into notifications.
///
/// Three independent loops run once started: the table sampler, the config
/// reloader, and the combined monitor/dispatch scan. Each observes stop at
/// its own iteration boundary; none blocks another.
pub struct JobwatchClient {
    config_store: Arc<ConfigStore>,
    reader: Arc<ProcessTableReader>,
    monitor: Arc<ProcessLifecycleMonitor>,
    dispatcher: Arc<AlarmDispatcher>,
    sink_override: Option<Arc<AlarmSinkEnum>>,
    scan_period: Arc<RwLock<Duration>>,
    scan_loop: Mutex<Option<PeriodicTask>>,
}

impl JobwatchClient {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self::with_source(config_path, Arc::new(SysinfoSource::new()))
    }

    pub fn with_source(
        config_path: impl Into<PathBuf>,
        source: Arc<dyn ProcessTableSource>,
    ) -> Self {
        JobwatchClient {
            config_store: Arc::new(ConfigStore::new(config_path)),
            reader: Arc::new(ProcessTableReader::new(source)),
            monitor: Arc::new(ProcessLifecycleMonitor::new()),
            dispatcher: Arc::new(AlarmDispatcher::new()),
            sink_override: None,
            scan_period: Arc::new(RwLock::new(DEFAULT_SCAN_PERIOD)),
            scan_loop: Mutex::new(None),
        }
    }

    /// Routes every alarm through `sink` instead of the webhook built from
    /// the current configuration.
    pub fn with_sink(mut self, sink: AlarmSinkEnum) -> Self {
        self.sink_override = Some(Arc::new(sink));
        self
    }

    /// Starts all three loops. Idempotent: a second call while running is a
    /// no-op for each loop.
    pub async fn start(&self) {
        self.config_store.start().await;
        self.reader.start().await;

        let mut scan_loop = self.scan_loop.lock().await;
        if scan_loop.is_some() {
            debug!("jobwatch client already running");
            return;
        }

        info!("starting alarm scan loop");
        let config_store = self.config_store.clone();
        let reader = self.reader.clone();
        let monitor = self.monitor.clone();
        let dispatcher = self.dispatcher.clone();
        let sink_override = self.sink_override.clone();

        *scan_loop = Some(PeriodicTask::spawn(
            "alarm_scan",
            self.scan_period.clone(),
            move || {
                let config_store = config_store.clone();
                let reader = reader.clone();
                let monitor = monitor.clone();
                let dispatcher = dispatcher.clone();
                let sink_override = sink_override.clone();
                async move {
                    scan_tick(
                        &config_store,
                        &reader,
                        &monitor,
                        &dispatcher,
                        sink_override.as_deref(),
                    )
                    .await;
                }
            },
        ));
    }

    /// Stops the scan loop, the sampler, and the config reloader. In-flight
    /// deliveries complete; shutdown takes at most one tick per loop.
    pub async fn stop(&self) {
        let task = self.scan_loop.lock().await.take();
        if let Some(task) = task {
            task.stop().await;
        }
        self.reader.stop().await;
        self.config_store.stop().await;
    }

    /// Changes the monitor/dispatch cadence for subsequent ticks.
    pub async fn set_period(&self, period: Duration) {
        *self.scan_period.write().await = period;
    }

    pub async fn is_running(&self) -> bool {
        self.scan_loop.lock().await.is_some()
    }

    pub async fn total_alarms(&self, pattern: &NamePattern) -> u64 {
        self.dispatcher.total_alarms(pattern).await
    }

    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config_store
    }

    pub fn reader(&self) -> &Arc<ProcessTableReader> {
        &self.reader
    }

    pub fn monitor(&self) -> &Arc<ProcessLifecycleMonitor> {
        &self.monitor
    }

    pub fn dispatcher(&self) -> &Arc<AlarmDispatcher> {
        &self.dispatcher
    }
}

/// One combined monitor/dispatch tick: sync patterns from the latest config,
/// fold the reader's snapshot into the lifecycle histories, then alarm the
/// newly finished pids through whichever sink applies.
async fn scan_tick(
    config_store: &ConfigStore,
    reader: &ProcessTableReader,
    monitor: &ProcessLifecycleMonitor,
    dispatcher: &AlarmDispatcher,
    sink_override: Option<&AlarmSinkEnum>,
) {
    let config = config_store.current_config().await;
    monitor.set_patterns(config.name_patterns.clone()).await;
    monitor.scan_once(reader).await;

    let built_sink;
    let sink = match (sink_override, &config.alarm_sink) {
        (Some(sink), _) => Some(sink),
        (None, Some(sink_config)) => {
            built_sink = AlarmSinkEnum::Webhook(WebhookSink::from_config(sink_config));
            Some(&built_sink)
        }
        (None, None) => None,
    };

    dispatcher.dispatch_once(monitor, sink).await;
}
