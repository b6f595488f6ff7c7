//! Canonical process and flow records.
//!
//! Each entity sits behind its own mutex so a read-modify-write on one
//! process or flow never blocks another. The id tables are only write-locked
//! to insert or remove entries. Lock order is always processes table, then
//! flows table, then a single entity.

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use shared::domain::{
    Flow, FlowEndpoints, FlowId, FlowPatch, Position, Process, ProcessErrorEntry, ProcessId,
    ProcessPatch, ProcessStatus,
};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::AbortHandle,
};
use tracing::{debug, warn};

use crate::error::RegistryError;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Change notifications for observers such as a rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    ProcessAdded(Process),
    ProcessUpdated(Process),
    ProcessRemoved {
        process_id: ProcessId,
        removed_flows: Vec<FlowId>,
    },
    FlowUpdated(Flow),
    FlowRemoved {
        flow_id: FlowId,
    },
    LayoutApplied {
        arranged: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSnapshot {
    pub processes: Vec<Process>,
    pub flows: Vec<Flow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Starting,
    Stopping,
}

pub(crate) struct PendingOp {
    pub(crate) seq: u64,
    pub(crate) kind: PendingKind,
    pub(crate) abort: AbortHandle,
}

/// A process record plus the lifecycle bookkeeping that never leaves the crate.
pub(crate) struct ProcessSlot {
    pub(crate) record: Process,
    /// Sequence number of the most recently issued lifecycle operation.
    pub(crate) latest_seq: u64,
    pub(crate) pending: Option<PendingOp>,
    /// Set once the process has been removed; late completions must not apply.
    pub(crate) detached: bool,
}

impl ProcessSlot {
    fn new(record: Process) -> Self {
        Self {
            record,
            latest_seq: 0,
            pending: None,
            detached: false,
        }
    }

    /// Claims the next sequence number, cancelling whatever call it supersedes.
    pub(crate) fn next_seq(&mut self) -> u64 {
        if let Some(previous) = self.pending.take() {
            debug!(
                process_id = %self.record.id,
                seq = previous.seq,
                kind = ?previous.kind,
                "lifecycle: cancelling superseded control call"
            );
            previous.abort.abort();
        }
        self.latest_seq += 1;
        self.latest_seq
    }

    pub(crate) fn record_error(&mut self, entry: ProcessErrorEntry) {
        self.record.status = ProcessStatus::Error;
        self.record.errors.push(entry);
    }

    fn apply_patch(&mut self, patch: &ProcessPatch) {
        let record = &mut self.record;
        if let Some(name) = &patch.name {
            record.name = name.clone();
        }
        if let Some(status) = patch.status {
            if self.pending.is_some() {
                debug!(
                    process_id = %record.id,
                    %status,
                    "registry: ignoring status update while a control call is in flight"
                );
            } else if record.status.can_transition_to(status) {
                record.status = status;
            } else {
                warn!(
                    process_id = %record.id,
                    from = %record.status,
                    to = %status,
                    "registry: ignoring disallowed status transition"
                );
            }
        }
        if let Some(ports) = &patch.ports {
            record.ports = ports.clone();
        }
        if let Some(position) = patch.position {
            record.position = position;
        }
        for (key, value) in &patch.metrics {
            record.metrics.insert(key.clone(), *value);
        }
        for (key, value) in &patch.metadata {
            record.metadata.insert(key.clone(), value.clone());
        }
    }
}

pub(crate) type SharedSlot = Arc<Mutex<ProcessSlot>>;

pub struct Registry {
    processes: RwLock<HashMap<ProcessId, SharedSlot>>,
    flows: RwLock<HashMap<FlowId, Arc<Mutex<Flow>>>>,
    events: broadcast::Sender<ModelEvent>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            processes: RwLock::new(HashMap::new()),
            flows: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ModelEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ModelEvent) {
        let _ = self.events.send(event);
    }

    /// Inserts a new process. Status is forced to Idle and errors are cleared;
    /// an existing id is refused rather than overwritten.
    pub async fn add_process(&self, mut process: Process) -> Result<(), RegistryError> {
        process.status = ProcessStatus::Idle;
        process.errors.clear();

        let mut processes = self.processes.write().await;
        if processes.contains_key(&process.id) {
            return Err(RegistryError::DuplicateProcess(process.id));
        }
        processes.insert(
            process.id.clone(),
            Arc::new(Mutex::new(ProcessSlot::new(process.clone()))),
        );
        drop(processes);

        debug!(process_id = %process.id, "registry: process added");
        self.emit(ModelEvent::ProcessAdded(process));
        Ok(())
    }

    /// Removes the process and every flow touching it. Returns `false` when
    /// the id was already absent.
    pub async fn remove_process(&self, process_id: &ProcessId) -> bool {
        let mut processes = self.processes.write().await;
        let Some(slot) = processes.remove(process_id) else {
            return false;
        };

        let removed_flows = {
            let mut flows = self.flows.write().await;
            let mut doomed = Vec::new();
            for (flow_id, flow) in flows.iter() {
                if flow.lock().await.endpoints.touches(process_id) {
                    doomed.push(flow_id.clone());
                }
            }
            for flow_id in &doomed {
                flows.remove(flow_id);
            }
            doomed.sort();
            doomed
        };
        drop(processes);

        {
            let mut guard = slot.lock().await;
            guard.detached = true;
            if let Some(pending) = guard.pending.take() {
                pending.abort.abort();
            }
        }

        debug!(
            process_id = %process_id,
            removed_flows = removed_flows.len(),
            "registry: process removed"
        );
        self.emit(ModelEvent::ProcessRemoved {
            process_id: process_id.clone(),
            removed_flows,
        });
        true
    }

    /// Merges `patch` into an existing process. Returns `false` when absent.
    pub async fn update_process(&self, process_id: &ProcessId, patch: &ProcessPatch) -> bool {
        self.with_process(process_id, |slot| slot.apply_patch(patch))
            .await
            .is_some()
    }

    pub async fn set_position(&self, process_id: &ProcessId, position: Position) -> bool {
        self.with_process(process_id, |slot| slot.record.position = position)
            .await
            .is_some()
    }

    /// Empties the error list; a process sitting in Error goes back to Idle.
    pub async fn clear_errors(&self, process_id: &ProcessId) -> bool {
        self.with_process(process_id, |slot| {
            slot.record.errors.clear();
            if slot.record.status == ProcessStatus::Error {
                slot.record.status = ProcessStatus::Idle;
            }
        })
        .await
        .is_some()
    }

    /// Runs `f` against one process under its own lock and publishes the
    /// resulting record.
    async fn with_process<F>(&self, process_id: &ProcessId, f: F) -> Option<Process>
    where
        F: FnOnce(&mut ProcessSlot),
    {
        let processes = self.processes.read().await;
        let slot = processes.get(process_id)?;
        let mut guard = slot.lock().await;
        f(&mut guard);
        let snapshot = guard.record.clone();
        drop(guard);
        drop(processes);

        self.emit(ModelEvent::ProcessUpdated(snapshot.clone()));
        Some(snapshot)
    }

    pub(crate) async fn process_slot(&self, process_id: &ProcessId) -> Option<SharedSlot> {
        self.processes.read().await.get(process_id).cloned()
    }

    pub async fn contains_process(&self, process_id: &ProcessId) -> bool {
        self.processes.read().await.contains_key(process_id)
    }

    pub async fn process(&self, process_id: &ProcessId) -> Option<Process> {
        let slot = self.process_slot(process_id).await?;
        let guard = slot.lock().await;
        Some(guard.record.clone())
    }

    pub async fn pending_operation(&self, process_id: &ProcessId) -> Option<PendingKind> {
        let slot = self.process_slot(process_id).await?;
        let guard = slot.lock().await;
        guard.pending.as_ref().map(|pending| pending.kind)
    }

    /// Process ids in ascending order. This is the ordering used by layout
    /// and batch operations.
    pub async fn process_ids(&self) -> Vec<ProcessId> {
        let mut ids: Vec<ProcessId> = self.processes.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn processes(&self) -> Vec<Process> {
        let slots: Vec<SharedSlot> = self.processes.read().await.values().cloned().collect();
        let mut processes = Vec::with_capacity(slots.len());
        for slot in slots {
            processes.push(slot.lock().await.record.clone());
        }
        processes.sort_by(|a, b| a.id.cmp(&b.id));
        processes
    }

    /// Creates the flow for `endpoints`, or updates the existing one in place.
    /// Fields set in `style` are applied in both cases.
    pub async fn connect(
        &self,
        endpoints: FlowEndpoints,
        style: &FlowPatch,
    ) -> Result<FlowId, RegistryError> {
        let processes = self.processes.read().await;
        for process_id in [&endpoints.source_process_id, &endpoints.target_process_id] {
            if !processes.contains_key(process_id) {
                return Err(RegistryError::UnknownProcess(process_id.clone()));
            }
        }

        let flow_id = endpoints.flow_id();
        let mut flows = self.flows.write().await;
        let entry = flows
            .entry(flow_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Flow::new(endpoints))));
        let snapshot = {
            let mut flow = entry.lock().await;
            flow.apply(style);
            flow.clone()
        };
        drop(flows);
        drop(processes);

        debug!(flow_id = %flow_id, "registry: flow connected");
        self.emit(ModelEvent::FlowUpdated(snapshot));
        Ok(flow_id)
    }

    /// Removes one flow. Process records are untouched.
    pub async fn disconnect(&self, flow_id: &FlowId) -> bool {
        let removed = self.flows.write().await.remove(flow_id).is_some();
        if removed {
            debug!(flow_id = %flow_id, "registry: flow disconnected");
            self.emit(ModelEvent::FlowRemoved {
                flow_id: flow_id.clone(),
            });
        }
        removed
    }

    pub async fn update_flow(&self, flow_id: &FlowId, patch: &FlowPatch) -> bool {
        let flows = self.flows.read().await;
        let Some(flow) = flows.get(flow_id) else {
            return false;
        };
        let snapshot = {
            let mut flow = flow.lock().await;
            flow.apply(patch);
            flow.clone()
        };
        drop(flows);

        self.emit(ModelEvent::FlowUpdated(snapshot));
        true
    }

    pub async fn flow(&self, flow_id: &FlowId) -> Option<Flow> {
        let flow = self.flows.read().await.get(flow_id).cloned()?;
        let flow = flow.lock().await;
        Some(flow.clone())
    }

    pub async fn flows(&self) -> Vec<Flow> {
        let entries: Vec<Arc<Mutex<Flow>>> = self.flows.read().await.values().cloned().collect();
        let mut flows = Vec::with_capacity(entries.len());
        for entry in entries {
            flows.push(entry.lock().await.clone());
        }
        flows.sort_by(|a, b| a.id.cmp(&b.id));
        flows
    }

    pub async fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            processes: self.processes().await,
            flows: self.flows().await,
        }
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
