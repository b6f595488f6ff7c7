use std::{collections::{BTreeSet, HashMap}, fs, path::Path, time::Duration};

use shared::domain::ProcessId;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "control_server.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_addr: String,
    /// Processes whose start/stop requests are answered with a 500.
    pub failing_processes: BTreeSet<ProcessId>,
    pub response_latency: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8700".into(),
            failing_processes: BTreeSet::new(),
            response_latency: Duration::ZERO,
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// File values override defaults, environment values override the file.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("bind_addr") {
                    settings.bind_addr = v.clone();
                }
                if let Some(v) = file_cfg.get("failing_processes") {
                    settings.failing_processes = parse_process_list(v);
                }
                if let Some(v) = file_cfg.get("response_latency_ms") {
                    apply_latency(&mut settings, v);
                }
            }
            Err(error) => warn!(path = %path.display(), %error, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("CONTROL_SERVER_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }
    if let Some(v) = env("APP__FAILING_PROCESSES") {
        settings.failing_processes = parse_process_list(&v);
    }
    if let Some(v) = env("APP__RESPONSE_LATENCY_MS") {
        apply_latency(&mut settings, &v);
    }

    settings
}

fn apply_latency(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<u64>() {
        Ok(ms) => settings.response_latency = Duration::from_millis(ms),
        Err(_) => warn!(value = raw, "response latency must be whole milliseconds"),
    }
}

fn parse_process_list(raw: &str) -> BTreeSet<ProcessId> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ProcessId::from)
        .collect()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
