//! Start/stop/pause/restart against the remote control API.
//!
//! Every issued operation takes the next per-process sequence number and
//! aborts the call it supersedes. A completion is written back only while its
//! sequence number is still the latest for that process, so a slow start can
//! never overwrite a newer stop. Operations on different processes share no
//! lock.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use shared::domain::{ControlAction, ProcessErrorEntry, ProcessId, ProcessStatus};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    config::{OrchestratorSettings, RestartMode, RetryPolicy},
    control::{call_control, ControlApi},
    error::{describe_failure, ControlError},
    registry::{ModelEvent, PendingKind, PendingOp, Registry, SharedSlot},
};

/// How a lifecycle operation ended. Failures are reported here and on the
/// process itself, never as an `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutcome {
    /// The operation settled and the process now has this status.
    Applied(ProcessStatus),
    /// The remote call failed; the process was moved to Error.
    Failed(String),
    /// A newer operation on the same process took over before this one settled.
    Superseded,
    /// No process with that id exists (or it was removed mid-flight).
    NotFound,
    /// The state machine does not allow the operation from this status.
    Rejected(ProcessStatus),
}

impl OpOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, OpOutcome::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub call_timeout: Duration,
    pub settle_delay: Duration,
    pub restart_mode: RestartMode,
    pub retry: RetryPolicy,
}

impl From<&OrchestratorSettings> for LifecycleSettings {
    fn from(settings: &OrchestratorSettings) -> Self {
        Self {
            call_timeout: settings.control_timeout,
            settle_delay: settings.settle_delay,
            restart_mode: settings.restart_mode,
            retry: settings.retry.clone(),
        }
    }
}

pub struct LifecycleController {
    registry: Arc<Registry>,
    control: Arc<dyn ControlApi>,
    settings: LifecycleSettings,
}

impl LifecycleController {
    pub fn new(
        registry: Arc<Registry>,
        control: Arc<dyn ControlApi>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            registry,
            control,
            settings,
        }
    }

    /// Optimistically marks the process Running, then confirms remotely.
    pub async fn start(&self, process_id: &ProcessId) -> OpOutcome {
        self.run_remote(process_id, ControlAction::Start, None).await
    }

    /// Leaves the status alone until the remote stop is confirmed.
    pub async fn stop(&self, process_id: &ProcessId) -> OpOutcome {
        self.run_remote(process_id, ControlAction::Stop, None).await
    }

    /// Local-only transition; no control call is made.
    pub async fn pause(&self, process_id: &ProcessId) -> OpOutcome {
        let Some(slot) = self.registry.process_slot(process_id).await else {
            debug!(process_id = %process_id, "lifecycle: pause ignored for unknown process");
            return OpOutcome::NotFound;
        };

        let snapshot = {
            let mut guard = slot.lock().await;
            if guard.detached {
                return OpOutcome::NotFound;
            }
            let current = guard.record.status;
            if !current.can_transition_to(ProcessStatus::Paused) {
                debug!(
                    process_id = %process_id,
                    status = %current,
                    "lifecycle: pause rejected"
                );
                return OpOutcome::Rejected(current);
            }
            guard.next_seq();
            guard.record.status = ProcessStatus::Paused;
            guard.record.clone()
        };

        self.registry.emit(ModelEvent::ProcessUpdated(snapshot));
        OpOutcome::Applied(ProcessStatus::Paused)
    }

    /// Stop followed by start; see [`RestartMode`] for how the two are joined.
    ///
    /// The start is only issued while the restart's own stop is still the
    /// latest operation on the process. Any newer command (a user stop, a
    /// pause, another restart) wins and this call reports `Superseded`.
    pub async fn restart(&self, process_id: &ProcessId) -> OpOutcome {
        let stop = match self.issue(process_id, ControlAction::Stop, None).await {
            Ok(call) => call,
            Err(outcome) => return outcome,
        };
        let stop_seq = stop.seq;

        match self.settings.restart_mode {
            RestartMode::Sequential => {
                let stopped = self.finish(process_id, ControlAction::Stop, stop).await;
                if matches!(stopped, OpOutcome::NotFound | OpOutcome::Superseded) {
                    return stopped;
                }
                debug!(process_id = %process_id, outcome = ?stopped, "lifecycle: restart stop settled");
                tokio::time::sleep(self.settings.settle_delay).await;
                self.run_remote(process_id, ControlAction::Start, Some(stop_seq))
                    .await
            }
            RestartMode::FixedDelay => {
                let delayed_start = async {
                    tokio::time::sleep(self.settings.settle_delay).await;
                    self.run_remote(process_id, ControlAction::Start, Some(stop_seq))
                        .await
                };
                let (_, started) = tokio::join!(
                    self.finish(process_id, ControlAction::Stop, stop),
                    delayed_start
                );
                started
            }
        }
    }

    async fn run_remote(
        &self,
        process_id: &ProcessId,
        action: ControlAction,
        expected_seq: Option<u64>,
    ) -> OpOutcome {
        match self.issue(process_id, action, expected_seq).await {
            Ok(call) => self.finish(process_id, action, call).await,
            Err(outcome) => outcome,
        }
    }

    /// Claims a sequence number and spawns the control call. The spawned task
    /// writes its own completion back, so the result lands even if the caller
    /// stops waiting. With `expected_seq`, nothing is issued unless that is
    /// still the latest sequence number for the process.
    async fn issue(
        &self,
        process_id: &ProcessId,
        action: ControlAction,
        expected_seq: Option<u64>,
    ) -> Result<IssuedCall, OpOutcome> {
        let Some(slot) = self.registry.process_slot(process_id).await else {
            debug!(process_id = %process_id, %action, "lifecycle: ignoring unknown process");
            return Err(OpOutcome::NotFound);
        };

        let (seq, task) = {
            let mut guard = slot.lock().await;
            if guard.detached {
                return Err(OpOutcome::NotFound);
            }
            if let Some(expected) = expected_seq {
                if guard.latest_seq != expected {
                    debug!(
                        process_id = %process_id,
                        %action,
                        expected,
                        latest = guard.latest_seq,
                        "lifecycle: newer operation took over, not issuing"
                    );
                    return Err(OpOutcome::Superseded);
                }
            }
            let seq = guard.next_seq();
            let kind = match action {
                ControlAction::Start => {
                    guard.record.status = ProcessStatus::Running;
                    PendingKind::Starting
                }
                ControlAction::Stop => PendingKind::Stopping,
            };

            let control = Arc::clone(&self.control);
            let registry = Arc::clone(&self.registry);
            let task_slot = Arc::clone(&slot);
            let call_timeout = self.settings.call_timeout;
            let retry = self.settings.retry.clone();
            let target = process_id.clone();
            let task = tokio::spawn(async move {
                let result =
                    call_control(control.as_ref(), &target, action, call_timeout, &retry).await;
                settle(&registry, &task_slot, &target, action, seq, result).await
            });
            guard.pending = Some(PendingOp {
                seq,
                kind,
                abort: task.abort_handle(),
            });

            // Published under the lock so it cannot trail the task's own update.
            if action == ControlAction::Start {
                self.registry
                    .emit(ModelEvent::ProcessUpdated(guard.record.clone()));
            }
            (seq, task)
        };

        debug!(process_id = %process_id, %action, seq, "lifecycle: control call issued");
        Ok(IssuedCall { seq, slot, task })
    }

    /// Waits for an issued call's own write-back.
    async fn finish(
        &self,
        process_id: &ProcessId,
        action: ControlAction,
        call: IssuedCall,
    ) -> OpOutcome {
        let IssuedCall { seq, slot, task } = call;
        match task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => {
                debug!(process_id = %process_id, %action, seq, "lifecycle: control call cancelled");
                OpOutcome::Superseded
            }
            Err(err) => {
                let result = Err(ControlError::Transport(format!("control task failed: {err}")));
                settle(&self.registry, &slot, process_id, action, seq, result).await
            }
        }
    }
}

struct IssuedCall {
    seq: u64,
    slot: SharedSlot,
    task: JoinHandle<OpOutcome>,
}

/// Applies a finished control call to the process, unless the process was
/// removed or a newer operation has been issued since.
async fn settle(
    registry: &Registry,
    slot: &SharedSlot,
    process_id: &ProcessId,
    action: ControlAction,
    seq: u64,
    result: Result<(), ControlError>,
) -> OpOutcome {
    let (outcome, snapshot) = {
        let mut guard = slot.lock().await;
        if guard.detached {
            return OpOutcome::NotFound;
        }
        if guard.latest_seq != seq {
            debug!(
                process_id = %process_id,
                %action,
                seq,
                latest = guard.latest_seq,
                "lifecycle: discarding stale completion"
            );
            return OpOutcome::Superseded;
        }
        guard.pending = None;

        let outcome = match result {
            Ok(()) => {
                let status = match action {
                    ControlAction::Start => ProcessStatus::Running,
                    ControlAction::Stop => ProcessStatus::Idle,
                };
                guard.record.status = status;
                info!(process_id = %process_id, %action, "lifecycle: control call confirmed");
                OpOutcome::Applied(status)
            }
            Err(err) => {
                let message = describe_failure(action, process_id, &err);
                warn!(process_id = %process_id, %action, error = %err, "lifecycle: control call failed");
                guard.record_error(ProcessErrorEntry {
                    action,
                    message: message.clone(),
                    recorded_at: Utc::now(),
                });
                OpOutcome::Failed(message)
            }
        };
        (outcome, guard.record.clone())
    };

    registry.emit(ModelEvent::ProcessUpdated(snapshot));
    outcome
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
