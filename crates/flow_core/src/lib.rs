//! Client-side model of a process-flow graph: registries, lifecycle control
//! against a remote API, batch fan-out, telemetry merges and auto-layout.

use std::sync::Arc;

use futures::Stream;
use shared::{
    domain::{Flow, FlowEndpoints, FlowId, FlowPatch, Position, Process, ProcessId, ProcessPatch},
    protocol::TelemetryUpdate,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info};

pub mod batch;
pub mod config;
pub mod control;
pub mod error;
pub mod graph;
pub mod layout;
pub mod lifecycle;
pub mod registry;
pub mod telemetry;

pub use batch::{BatchCoordinator, BatchReport};
pub use config::{load_settings, LayoutSettings, OrchestratorSettings, RestartMode, RetryPolicy};
pub use control::{ControlApi, HttpControlApi, MissingControlApi};
pub use error::{ControlError, GraphError, RegistryError};
pub use graph::GraphDefinition;
pub use layout::{circular_layout, JitterSource, NoJitter, RandomJitter, ScriptedJitter};
pub use lifecycle::{LifecycleController, LifecycleSettings, OpOutcome};
pub use registry::{ModelEvent, ModelSnapshot, PendingKind, Registry};

/// Service handle owning the process/flow aggregate and every operation on it.
pub struct Orchestrator {
    registry: Arc<Registry>,
    lifecycle: Arc<LifecycleController>,
    batch: BatchCoordinator,
    layout: LayoutSettings,
    jitter: Mutex<Box<dyn JitterSource>>,
}

impl Orchestrator {
    /// Builds against the configured control endpoint, or a
    /// [`MissingControlApi`] when none is set.
    pub fn from_settings(settings: &OrchestratorSettings) -> Result<Arc<Self>, ControlError> {
        let control: Arc<dyn ControlApi> = match settings.control_url.as_deref() {
            Some(url) => Arc::new(HttpControlApi::new(url)?),
            None => Arc::new(MissingControlApi),
        };
        Ok(Self::new(settings, control))
    }

    pub fn new(settings: &OrchestratorSettings, control: Arc<dyn ControlApi>) -> Arc<Self> {
        Self::new_with_dependencies(settings, control, Box::new(RandomJitter::from_entropy()))
    }

    pub fn new_with_dependencies(
        settings: &OrchestratorSettings,
        control: Arc<dyn ControlApi>,
        jitter: Box<dyn JitterSource>,
    ) -> Arc<Self> {
        let registry = Arc::new(Registry::new());
        let lifecycle = Arc::new(LifecycleController::new(
            Arc::clone(&registry),
            control,
            LifecycleSettings::from(settings),
        ));
        let batch = BatchCoordinator::new(Arc::clone(&registry), Arc::clone(&lifecycle));
        Arc::new(Self {
            registry,
            lifecycle,
            batch,
            layout: settings.layout.clone(),
            jitter: Mutex::new(jitter),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ModelEvent> {
        self.registry.subscribe_events()
    }

    pub async fn snapshot(&self) -> ModelSnapshot {
        self.registry.snapshot().await
    }

    pub async fn add_process(&self, process: Process) -> Result<(), RegistryError> {
        self.registry.add_process(process).await
    }

    pub async fn remove_process(&self, process_id: &ProcessId) -> bool {
        self.registry.remove_process(process_id).await
    }

    pub async fn update_process(&self, process_id: &ProcessId, patch: &ProcessPatch) -> bool {
        self.registry.update_process(process_id, patch).await
    }

    pub async fn process(&self, process_id: &ProcessId) -> Option<Process> {
        self.registry.process(process_id).await
    }

    pub async fn pending_operation(&self, process_id: &ProcessId) -> Option<PendingKind> {
        self.registry.pending_operation(process_id).await
    }

    pub async fn connect_processes(
        &self,
        source: &ProcessId,
        source_port: &str,
        target: &ProcessId,
        target_port: &str,
    ) -> Result<FlowId, RegistryError> {
        self.connect_with(
            FlowEndpoints::new(source.clone(), source_port, target.clone(), target_port),
            &FlowPatch::default(),
        )
        .await
    }

    pub async fn connect_with(
        &self,
        endpoints: FlowEndpoints,
        style: &FlowPatch,
    ) -> Result<FlowId, RegistryError> {
        self.registry.connect(endpoints, style).await
    }

    pub async fn disconnect_flow(&self, flow_id: &FlowId) -> bool {
        self.registry.disconnect(flow_id).await
    }

    pub async fn update_flow(&self, flow_id: &FlowId, patch: &FlowPatch) -> bool {
        self.registry.update_flow(flow_id, patch).await
    }

    pub async fn flow(&self, flow_id: &FlowId) -> Option<Flow> {
        self.registry.flow(flow_id).await
    }

    pub async fn start(&self, process_id: &ProcessId) -> OpOutcome {
        self.lifecycle.start(process_id).await
    }

    pub async fn stop(&self, process_id: &ProcessId) -> OpOutcome {
        self.lifecycle.stop(process_id).await
    }

    pub async fn pause(&self, process_id: &ProcessId) -> OpOutcome {
        self.lifecycle.pause(process_id).await
    }

    pub async fn restart(&self, process_id: &ProcessId) -> OpOutcome {
        self.lifecycle.restart(process_id).await
    }

    pub async fn start_all_processes(&self) -> BatchReport {
        self.batch.start_all_processes().await
    }

    pub async fn stop_all_processes(&self) -> BatchReport {
        self.batch.stop_all_processes().await
    }

    pub async fn clear_errors(&self, process_id: Option<&ProcessId>) -> usize {
        self.batch.clear_errors(process_id).await
    }

    /// Places every process on the configured circle, ordered by id.
    pub async fn auto_arrange_processes(&self) -> usize {
        let mut jitter = self.jitter.lock().await;
        self.auto_arrange_with(&mut **jitter).await
    }

    pub async fn auto_arrange_with(&self, jitter: &mut dyn JitterSource) -> usize {
        let ordered = self.registry.process_ids().await;
        let placements =
            circular_layout(&ordered, self.layout.radius, self.layout.jitter, jitter);

        let mut arranged = 0;
        for (process_id, position) in placements {
            if self.registry.set_position(&process_id, position).await {
                arranged += 1;
            }
        }
        debug!(arranged, radius = self.layout.radius, "layout: processes arranged");
        self.registry.emit(ModelEvent::LayoutApplied { arranged });
        arranged
    }

    /// Manual placement; kept until the next auto-arrange.
    pub async fn update_process_position(&self, process_id: &ProcessId, position: Position) -> bool {
        self.registry.set_position(process_id, position).await
    }

    pub async fn apply_telemetry(&self, update: &TelemetryUpdate) -> bool {
        telemetry::apply_update(&self.registry, update).await
    }

    pub fn spawn_telemetry_ingest<S>(&self, feed: S) -> JoinHandle<usize>
    where
        S: Stream<Item = TelemetryUpdate> + Send + 'static,
    {
        telemetry::spawn_ingest(Arc::clone(&self.registry), feed)
    }

    /// Adds every process of `graph`, then connects its flows.
    pub async fn load_graph(&self, graph: &GraphDefinition) -> Result<(), GraphError> {
        for definition in &graph.processes {
            self.registry.add_process(definition.to_process()).await?;
        }
        for definition in &graph.flows {
            self.registry
                .connect(definition.endpoints(), &definition.style())
                .await?;
        }
        info!(
            processes = graph.processes.len(),
            flows = graph.flows.len(),
            "graph loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
