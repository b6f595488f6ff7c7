use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use shared::{domain::ProcessId, protocol::RemoteProcessSummary};
use tokio::sync::RwLock;

use crate::config::Settings;

pub(crate) struct AppState {
    pub(crate) processes: RwLock<BTreeMap<ProcessId, RemoteProcessSummary>>,
    pub(crate) failing: BTreeSet<ProcessId>,
    pub(crate) latency: Duration,
}

impl AppState {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            processes: RwLock::new(BTreeMap::new()),
            failing: settings.failing_processes.clone(),
            latency: settings.response_latency,
        }
    }
}
