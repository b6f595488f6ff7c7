//! TOML description of a process graph used to seed a model.
//!
//! ```toml
//! [[process]]
//! id = "ingest"
//! outputs = ["out"]
//!
//! [[process]]
//! id = "store"
//! name = "Storage writer"
//! inputs = ["in"]
//!
//! [[flow]]
//! source = "ingest"
//! source_port = "out"
//! target = "store"
//! target_port = "in"
//! data_type = "records"
//! ```

use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;
use shared::domain::{FlowEndpoints, FlowPatch, Port, Process, ProcessId};

use crate::error::GraphError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDefinition {
    #[serde(default, rename = "process")]
    pub processes: Vec<ProcessDefinition>,
    #[serde(default, rename = "flow")]
    pub flows: Vec<FlowDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessDefinition {
    pub id: ProcessId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ProcessDefinition {
    pub fn to_process(&self) -> Process {
        let ports = self
            .inputs
            .iter()
            .map(Port::input)
            .chain(self.outputs.iter().map(Port::output))
            .collect();
        let mut process = Process::new(
            self.id.clone(),
            self.name.clone().unwrap_or_else(|| self.id.to_string()),
        )
        .with_ports(ports);
        process.metadata = self.metadata.clone();
        process
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowDefinition {
    pub source: ProcessId,
    pub source_port: String,
    pub target: ProcessId,
    pub target_port: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub intensity: Option<f64>,
}

impl FlowDefinition {
    pub fn endpoints(&self) -> FlowEndpoints {
        FlowEndpoints::new(
            self.source.clone(),
            self.source_port.clone(),
            self.target.clone(),
            self.target_port.clone(),
        )
    }

    pub fn style(&self) -> FlowPatch {
        FlowPatch {
            data_type: self.data_type.clone(),
            color: self.color.clone(),
            intensity: self.intensity,
            ..FlowPatch::default()
        }
    }
}

impl GraphDefinition {
    pub fn from_toml_str(raw: &str) -> Result<Self, GraphError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load_file(path: &Path) -> Result<Self, GraphError> {
        let raw = fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}
