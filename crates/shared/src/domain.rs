use std::{borrow::Cow, collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(ProcessId);
id_newtype!(FlowId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Error,
}

impl ProcessStatus {
    /// Whether the lifecycle state machine permits moving from `self` to `next`.
    ///
    /// Paused is only reachable from Running (or itself); every other move is
    /// allowed.
    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        match (self, next) {
            (ProcessStatus::Idle | ProcessStatus::Error, ProcessStatus::Paused) => false,
            _ => true,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessStatus::Idle => "idle",
            ProcessStatus::Running => "running",
            ProcessStatus::Paused => "paused",
            ProcessStatus::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Stop,
}

impl ControlAction {
    pub fn as_path_segment(self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path_segment())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub direction: PortDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl Port {
    pub fn input(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Input,
            data_type: None,
        }
    }

    pub fn output(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Output,
            data_type: None,
        }
    }
}

/// A failed control call recorded against a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessErrorEntry {
    pub action: ControlAction,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub name: String,
    #[serde(default)]
    pub status: ProcessStatus,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub errors: Vec<ProcessErrorEntry>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Process {
    pub fn new(id: impl Into<ProcessId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ProcessStatus::Idle,
            ports: Vec::new(),
            position: Position::ORIGIN,
            errors: Vec::new(),
            metrics: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_ports(mut self, ports: Vec<Port>) -> Self {
        self.ports = ports;
        self
    }
}

/// Partial update merged into an existing [`Process`].
///
/// `metrics` and `metadata` merge key-wise; every other field replaces the
/// current value when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProcessStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<Port>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

pub const DEFAULT_FLOW_DATA_TYPE: &str = "data";
pub const DEFAULT_FLOW_COLOR: &str = "#4fc3f7";
pub const DEFAULT_FLOW_INTENSITY: f64 = 1.0;

/// The four coordinates identifying a flow edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowEndpoints {
    pub source_process_id: ProcessId,
    pub source_port_id: String,
    pub target_process_id: ProcessId,
    pub target_port_id: String,
}

impl FlowEndpoints {
    pub fn new(
        source: impl Into<ProcessId>,
        source_port: impl Into<String>,
        target: impl Into<ProcessId>,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            source_process_id: source.into(),
            source_port_id: source_port.into(),
            target_process_id: target.into(),
            target_port_id: target_port.into(),
        }
    }

    /// `source:port->target:port`. Backslash, `:` and `>` inside a component
    /// are backslash-escaped, so distinct endpoints never share an id.
    pub fn flow_id(&self) -> FlowId {
        FlowId(format!(
            "{}:{}->{}:{}",
            escape_id_component(self.source_process_id.as_str()),
            escape_id_component(&self.source_port_id),
            escape_id_component(self.target_process_id.as_str()),
            escape_id_component(&self.target_port_id)
        ))
    }

    pub fn touches(&self, process_id: &ProcessId) -> bool {
        self.source_process_id == *process_id || self.target_process_id == *process_id
    }
}

fn escape_id_component(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['\\', ':', '>']) {
        return Cow::Borrowed(raw);
    }
    let mut escaped = String::with_capacity(raw.len() + 4);
    for ch in raw.chars() {
        if matches!(ch, '\\' | ':' | '>') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    Cow::Owned(escaped)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    #[serde(flatten)]
    pub endpoints: FlowEndpoints,
    pub flow_rate: f64,
    /// Milliseconds.
    pub latency: f64,
    pub data_type: String,
    pub color: String,
    pub intensity: f64,
}

impl Flow {
    pub fn new(endpoints: FlowEndpoints) -> Self {
        Self {
            id: endpoints.flow_id(),
            endpoints,
            flow_rate: 0.0,
            latency: 0.0,
            data_type: DEFAULT_FLOW_DATA_TYPE.to_string(),
            color: DEFAULT_FLOW_COLOR.to_string(),
            intensity: DEFAULT_FLOW_INTENSITY,
        }
    }

    pub fn apply(&mut self, patch: &FlowPatch) {
        if let Some(flow_rate) = patch.flow_rate {
            self.flow_rate = flow_rate;
        }
        if let Some(latency) = patch.latency {
            self.latency = latency;
        }
        if let Some(data_type) = &patch.data_type {
            self.data_type = data_type.clone();
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        if let Some(intensity) = patch.intensity {
            self.intensity = intensity;
        }
    }
}

/// Partial update merged into an existing [`Flow`]. Also used as the optional
/// styling supplied on connect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
}
