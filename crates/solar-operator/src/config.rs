use std::{fs, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use serde::Deserialize;
use tracing::debug;

use crate::convergence::DEFAULT_IMAGE;
use crate::error::{Error, Result};
use crate::queue::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat { #[default] Text, Json }

impl FromStr for LogFormat {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "compact" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Error::Config(format!("unknown log format {other:?}"))),
        }
    }
}

/// Optional TOML file pointed to by `SOLAR_CONFIG`.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub namespace: Option<String>,
    pub workers: Option<usize>,
    pub image: Option<String>,
    pub metrics_addr: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Watch a single namespace; `None` watches the whole cluster.
    pub namespace: Option<String>,
    pub workers: usize,
    pub image: String,
    pub metrics_addr: SocketAddr,
    pub log_level: String,
    pub log_format: LogFormat,
    pub backoff_base_ms: u64,
    pub backoff_max_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            workers: 2,
            image: DEFAULT_IMAGE.to_string(),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            log_level: "info".into(),
            log_format: LogFormat::Text,
            backoff_base_ms: 5,
            backoff_max_secs: 1000,
        }
    }
}

fn env(name: &str) -> Option<String> { std::env::var(name).ok().filter(|v| !v.trim().is_empty()) }

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| Error::Config(format!("invalid {name}: {raw:?}")))
}

impl ControllerConfig {
    /// File (if `SOLAR_CONFIG` is set), then `SOLAR_*` env overrides, then validation.
    pub fn load() -> Result<Self> {
        let file_cfg = match env("SOLAR_CONFIG").map(PathBuf::from) {
            Some(path) => {
                debug!(path=?path, "config.load.attempt");
                let content = fs::read_to_string(&path).map_err(|e| Error::Config(format!("failed to read config {path:?}: {e}")))?;
                toml::from_str(&content).map_err(|e| Error::Config(format!("failed to parse config {path:?}: {e}")))?
            }
            None => FileConfig::default(),
        };
        let mut cfg = Self::default();
        if let Some(v) = file_cfg.namespace { cfg.namespace = Some(v); }
        if let Some(v) = file_cfg.workers { cfg.workers = v; }
        if let Some(v) = file_cfg.image { cfg.image = v; }
        if let Some(v) = file_cfg.metrics_addr { cfg.metrics_addr = parse("metrics_addr", &v)?; }
        if let Some(v) = file_cfg.log_level { cfg.log_level = v; }
        if let Some(v) = file_cfg.log_format { cfg.log_format = v; }
        if let Some(v) = file_cfg.backoff_base_ms { cfg.backoff_base_ms = v; }
        if let Some(v) = file_cfg.backoff_max_secs { cfg.backoff_max_secs = v; }

        if let Some(v) = env("SOLAR_NAMESPACE") { cfg.namespace = Some(v); }
        if let Some(v) = env("SOLAR_WORKERS") { cfg.workers = parse("SOLAR_WORKERS", &v)?; }
        if let Some(v) = env("SOLAR_IMAGE") { cfg.image = v; }
        if let Some(v) = env("SOLAR_METRICS_ADDR") { cfg.metrics_addr = parse("SOLAR_METRICS_ADDR", &v)?; }
        if let Some(v) = env("SOLAR_LOG_LEVEL") { cfg.log_level = v; }
        if let Some(v) = env("SOLAR_LOG_FORMAT") { cfg.log_format = v.parse()?; }

        if cfg.workers == 0 { return Err(Error::Config("workers must be at least 1".into())); }
        if cfg.image.trim().is_empty() { return Err(Error::Config("image must not be empty".into())); }
        debug!(config=?cfg, "config.loaded");
        Ok(cfg)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff { base: Duration::from_millis(self.backoff_base_ms.max(1)), max: Duration::from_secs(self.backoff_max_secs.max(1)) }
    }
}
