use std::{path::PathBuf, time::Duration};

use shared::domain::{ControlAction, ProcessId};
use thiserror::Error;

/// A remote start/stop call that did not succeed.
///
/// Never surfaced to lifecycle callers as an `Err`; it is recorded on the
/// process as status `Error` plus an error entry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControlError {
    #[error("control api transport failure: {0}")]
    Transport(String),
    #[error("control api rejected the call with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("control api reported failure: {message}")]
    Refused { message: String },
    #[error("malformed control api response: {0}")]
    Malformed(String),
    #[error("control call timed out after {0:?}")]
    Timeout(Duration),
    #[error("control api unavailable: {0}")]
    Unavailable(String),
    #[error("invalid control api base url: {0}")]
    InvalidBaseUrl(String),
}

impl ControlError {
    /// Whether a bounded retry may reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ControlError::Transport(_) | ControlError::Timeout(_) => true,
            ControlError::Rejected { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            ControlError::Refused { .. }
            | ControlError::Malformed(_)
            | ControlError::Unavailable(_)
            | ControlError::InvalidBaseUrl(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("process {0} already exists")]
    DuplicateProcess(ProcessId),
    #[error("process {0} does not exist")]
    UnknownProcess(ProcessId),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read graph file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid graph definition: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Formats a control failure the way it is stored on a process error entry.
pub(crate) fn describe_failure(action: ControlAction, process_id: &ProcessId, err: &ControlError) -> String {
    format!("{action} {process_id} failed: {err}")
}
