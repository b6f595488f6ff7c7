use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ControlAction, FlowId, FlowPatch, ProcessId, ProcessPatch};

/// Body returned by the process-control API for `POST /processes/{id}/{action}`.
///
/// Only `success` is required; services are free to omit the echoed id and
/// action and to add fields of their own (e.g. a `process_status`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<ProcessId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ControlAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlResponse {
    pub fn ok(process_id: ProcessId, action: ControlAction) -> Self {
        Self {
            success: true,
            process_id: Some(process_id),
            action: Some(action),
            message: None,
        }
    }
}

/// What the control service believes about a process it has been asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteProcessState {
    Started,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProcessSummary {
    pub process_id: ProcessId,
    pub state: RemoteProcessState,
    pub updated_at: DateTime<Utc>,
}

/// One sample from the telemetry feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TelemetryUpdate {
    Flow {
        flow_id: FlowId,
        patch: FlowPatch,
    },
    Process {
        process_id: ProcessId,
        patch: ProcessPatch,
    },
}
