use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "flow.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartMode {
    /// Await the stop call, wait the settle delay, then start.
    #[default]
    Sequential,
    /// Issue stop, wait the settle delay without waiting for stop, then start.
    FixedDelay,
}

impl RestartMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sequential" => Some(RestartMode::Sequential),
            "fixed_delay" => Some(RestartMode::FixedDelay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSettings {
    pub radius: f64,
    /// Maximum absolute z offset applied to each arranged process.
    pub jitter: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            radius: 300.0,
            jitter: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero disables retry.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub control_url: Option<String>,
    pub control_timeout: Duration,
    pub settle_delay: Duration,
    pub restart_mode: RestartMode,
    pub layout: LayoutSettings,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            control_url: None,
            control_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(1000),
            restart_mode: RestartMode::default(),
            layout: LayoutSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    control_url: Option<String>,
    control_timeout_ms: Option<u64>,
    settle_delay_ms: Option<u64>,
    restart_mode: Option<RestartMode>,
    layout_radius: Option<f64>,
    layout_jitter: Option<f64>,
    max_retries: Option<u32>,
    retry_initial_delay_ms: Option<u64>,
}

/// Defaults, then `flow.toml` in the working directory, then environment.
pub fn load_settings() -> anyhow::Result<OrchestratorSettings> {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<OrchestratorSettings> {
    let mut settings = OrchestratorSettings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        let file_cfg = toml::from_str::<FileSettings>(&raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?;
        apply_file_settings(&mut settings, file_cfg)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?;
    }

    apply_env_overrides(&mut settings, env);
    Ok(settings)
}

fn apply_file_settings(
    settings: &mut OrchestratorSettings,
    file_cfg: FileSettings,
) -> anyhow::Result<()> {
    if let Some(v) = file_cfg.control_url {
        settings.control_url = Some(v);
    }
    if let Some(v) = file_cfg.control_timeout_ms {
        settings.control_timeout = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.settle_delay_ms {
        settings.settle_delay = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.restart_mode {
        settings.restart_mode = v;
    }
    if let Some(v) = file_cfg.layout_radius {
        anyhow::ensure!(v.is_finite(), "layout_radius must be finite, got {v}");
        settings.layout.radius = v;
    }
    if let Some(v) = file_cfg.layout_jitter {
        anyhow::ensure!(v.is_finite(), "layout_jitter must be finite, got {v}");
        settings.layout.jitter = v.abs();
    }
    if let Some(v) = file_cfg.max_retries {
        settings.retry.max_retries = v;
    }
    if let Some(v) = file_cfg.retry_initial_delay_ms {
        settings.retry.initial_delay = Duration::from_millis(v);
    }
    Ok(())
}

fn apply_env_overrides(settings: &mut OrchestratorSettings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("FLOW_CONTROL_URL") {
        settings.control_url = Some(v);
    }
    if let Some(v) = env("APP__CONTROL_URL") {
        settings.control_url = Some(v);
    }

    if let Some(v) = env("APP__CONTROL_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        settings.control_timeout = Duration::from_millis(v);
    }
    if let Some(v) = env("APP__SETTLE_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
        settings.settle_delay = Duration::from_millis(v);
    }
    if let Some(v) = env("APP__RESTART_MODE").and_then(|v| RestartMode::parse(&v)) {
        settings.restart_mode = v;
    }
    if let Some(v) = env("APP__LAYOUT_RADIUS").and_then(|v| parse_finite(&v)) {
        settings.layout.radius = v;
    }
    if let Some(v) = env("APP__LAYOUT_JITTER").and_then(|v| parse_finite(&v)) {
        settings.layout.jitter = v.abs();
    }
    if let Some(v) = env("APP__MAX_RETRIES").and_then(|v| v.parse::<u32>().ok()) {
        settings.retry.max_retries = v;
    }
    if let Some(v) = env("APP__RETRY_INITIAL_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
        settings.retry.initial_delay = Duration::from_millis(v);
    }
}

/// `inf` and `NaN` parse as f64 but are unusable as layout geometry.
fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
