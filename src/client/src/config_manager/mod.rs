use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use jobwatch_common::periodic::PeriodicTask;
use jobwatch_common::target_process::NamePattern;

pub const DEFAULT_RELOAD_PERIOD: Duration = Duration::from_millis(250);
const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 10_000;

/// Delivery settings for the alarm sink.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmSinkConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_DELIVERY_TIMEOUT_MS
}

impl AlarmSinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The monitoring configuration, replaced wholesale on every successful
/// reload. The default value is the valid "nothing configured yet" state.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub name_patterns: Vec<NamePattern>,
    pub alarm_sink: Option<AlarmSinkConfig>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_from_path(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw)
    }

    /// An empty document is a valid empty configuration, not a parse error.
    pub fn parse(raw: &str) -> Result<Config> {
        if raw.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_json::from_str(raw).context("failed to parse config file")
    }
}

/// Hot-reloads the configuration file on a fixed period. A failed reload
/// (missing file, malformed content) keeps the previously held config in
/// force; the store never regresses to an older value and never panics.
pub struct ConfigStore {
    path: PathBuf,
    current: Arc<RwLock<Config>>,
    period: Arc<RwLock<Duration>>,
    reloader: Mutex<Option<PeriodicTask>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigStore {
            path: path.into(),
            current: Arc::new(RwLock::new(Config::default())),
            period: Arc::new(RwLock::new(DEFAULT_RELOAD_PERIOD)),
            reloader: Mutex::new(None),
        }
    }

    /// Begins the periodic reload loop; the first reload happens immediately.
    /// Idempotent under concurrent calls.
    pub async fn start(&self) {
        let mut reloader = self.reloader.lock().await;
        if reloader.is_some() {
            debug!("config store already running");
            return;
        }

        let path = self.path.clone();
        let current = self.current.clone();
        *reloader = Some(PeriodicTask::spawn(
            "config_reloader",
            self.period.clone(),
            move || {
                let path = path.clone();
                let current = current.clone();
                async move {
                    reload_into(&path, &current).await;
                }
            },
        ));
    }

    pub async fn stop(&self) {
        let task = self.reloader.lock().await.take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    pub async fn set_period(&self, period: Duration) {
        *self.period.write().await = period;
    }

    /// Performs one reload outside the periodic schedule.
    pub async fn reload_once(&self) {
        reload_into(&self.path, &self.current).await;
    }

    /// Defensive copy of the latest successfully parsed configuration; the
    /// empty config before the first successful parse.
    pub async fn current_config(&self) -> Config {
        self.current.read().await.clone()
    }
}

async fn reload_into(path: &Path, current: &Arc<RwLock<Config>>) {
    match ConfigLoader::load_from_path(path) {
        Ok(config) => {
            let mut held = current.write().await;
            if *held != config {
                debug!(path = %path.display(), "configuration updated");
            }
            *held = config;
        }
        Err(e) => {
            warn!("config reload failed, keeping previous config: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"{
        "namePatterns": ["job-x", "bash test"],
        "alarmSink": {"url": "http://localhost:9000/hook", "timeoutMs": 500}
    }"#;

    fn patterns(config: &Config) -> Vec<&str> {
        config.name_patterns.iter().map(|p| p.as_str()).collect()
    }

    #[test]
    fn test_parse_valid_config() {
        let config = ConfigLoader::parse(VALID).unwrap();
        assert_eq!(patterns(&config), vec!["job-x", "bash test"]);

        let sink = config.alarm_sink.unwrap();
        assert_eq!(sink.url, "http://localhost:9000/hook");
        assert_eq!(sink.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_empty_document_is_empty_config() {
        assert_eq!(ConfigLoader::parse("").unwrap(), Config::default());
        assert_eq!(ConfigLoader::parse("  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_defaults_timeout_when_omitted() {
        let config =
            ConfigLoader::parse(r#"{"alarmSink": {"url": "http://localhost/hook"}}"#).unwrap();
        assert_eq!(
            config.alarm_sink.unwrap().timeout_ms,
            DEFAULT_DELIVERY_TIMEOUT_MS
        );
    }

    #[test]
    fn test_parse_rejects_malformed_document() {
        assert!(ConfigLoader::parse("{not json").is_err());
    }

    #[tokio::test]
    async fn test_store_is_empty_before_first_load() {
        let store = ConfigStore::new("/no/such/file.json");
        assert_eq!(store.current_config().await, Config::default());

        // A reload against a missing file keeps the empty config.
        store.reload_once().await;
        assert_eq!(store.current_config().await, Config::default());
    }

    #[tokio::test]
    async fn test_reload_picks_up_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{VALID}").unwrap();
        file.flush().unwrap();

        let store = ConfigStore::new(file.path());
        store.reload_once().await;

        assert_eq!(
            patterns(&store.current_config().await),
            vec!["job-x", "bash test"]
        );
    }

    #[tokio::test]
    async fn test_failed_reload_retains_previous_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{VALID}").unwrap();
        file.flush().unwrap();

        let store = ConfigStore::new(file.path());
        store.reload_once().await;

        std::fs::write(file.path(), "{broken").unwrap();
        store.reload_once().await;

        assert_eq!(
            patterns(&store.current_config().await),
            vec!["job-x", "bash test"]
        );
    }

    #[tokio::test]
    async fn test_reload_loop_round_trip() {
        let file = NamedTempFile::new().unwrap();
        let store = ConfigStore::new(file.path());
        store.set_period(Duration::from_millis(10)).await;
        store.start().await;
        store.start().await; // idempotent

        std::fs::write(file.path(), VALID).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            patterns(&store.current_config().await),
            vec!["job-x", "bash test"]
        );
        store.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let store = ConfigStore::new("/no/such/file.json");
        store.stop().await;
    }
}
