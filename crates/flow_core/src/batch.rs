use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use shared::domain::ProcessId;
use tracing::info;

use crate::{
    lifecycle::{LifecycleController, OpOutcome},
    registry::Registry,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<ProcessId>,
    pub failed: Vec<(ProcessId, String)>,
    /// Superseded, removed or rejected members.
    pub skipped: Vec<ProcessId>,
}

impl BatchReport {
    fn collect(results: impl IntoIterator<Item = (ProcessId, OpOutcome)>) -> Self {
        let mut report = Self::default();
        for (process_id, outcome) in results {
            match outcome {
                OpOutcome::Applied(_) => report.succeeded.push(process_id),
                OpOutcome::Failed(reason) => report.failed.push((process_id, reason)),
                OpOutcome::Superseded | OpOutcome::NotFound | OpOutcome::Rejected(_) => {
                    report.skipped.push(process_id)
                }
            }
        }
        report
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }
}

/// Fans lifecycle operations out over every known process. One member's
/// failure never cancels or skips the others.
pub struct BatchCoordinator {
    registry: Arc<Registry>,
    lifecycle: Arc<LifecycleController>,
}

impl BatchCoordinator {
    pub fn new(registry: Arc<Registry>, lifecycle: Arc<LifecycleController>) -> Self {
        Self {
            registry,
            lifecycle,
        }
    }

    pub async fn start_all_processes(&self) -> BatchReport {
        let ids = self.registry.process_ids().await;
        let outcomes = join_all(ids.iter().map(|id| self.lifecycle.start(id))).await;
        let report = BatchReport::collect(ids.into_iter().zip(outcomes));
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "batch: start all settled"
        );
        report
    }

    pub async fn stop_all_processes(&self) -> BatchReport {
        let ids = self.registry.process_ids().await;
        let outcomes = join_all(ids.iter().map(|id| self.lifecycle.stop(id))).await;
        let report = BatchReport::collect(ids.into_iter().zip(outcomes));
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "batch: stop all settled"
        );
        report
    }

    /// Clears one process's errors, or every process's when `process_id` is
    /// `None`. Returns how many processes were cleared.
    pub async fn clear_errors(&self, process_id: Option<&ProcessId>) -> usize {
        match process_id {
            Some(process_id) => usize::from(self.registry.clear_errors(process_id).await),
            None => {
                let mut cleared = 0;
                for process_id in self.registry.process_ids().await {
                    if self.registry.clear_errors(&process_id).await {
                        cleared += 1;
                    }
                }
                cleared
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/batch_tests.rs"]
mod tests;
