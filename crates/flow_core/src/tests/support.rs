//! Scripted control API shared by the lifecycle, batch and orchestrator tests.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use shared::{
    domain::{ControlAction, ProcessId},
    protocol::ControlResponse,
};
use tokio::sync::Mutex;

use crate::{control::ControlApi, error::ControlError};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Succeed,
    Refuse(String),
    Fail(ControlError),
}

#[derive(Debug, Clone)]
struct Script {
    delay: Duration,
    reply: Reply,
    /// Number of leading calls answered with a transport failure.
    transient_failures: u32,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Reply::Succeed,
            transient_failures: 0,
        }
    }
}

#[derive(Default)]
pub(crate) struct ScriptedControl {
    scripts: Mutex<HashMap<(ProcessId, ControlAction), Script>>,
    calls: Mutex<Vec<(ProcessId, ControlAction)>>,
}

impl ScriptedControl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn reply(&self, process_id: &str, action: ControlAction, reply: Reply) {
        self.scripts
            .lock()
            .await
            .entry((process_id.into(), action))
            .or_default()
            .reply = reply;
    }

    pub(crate) async fn fail(&self, process_id: &str, action: ControlAction) {
        self.reply(
            process_id,
            action,
            Reply::Fail(ControlError::Rejected {
                status: 500,
                message: format!("{process_id} refused to {action}"),
            }),
        )
        .await;
    }

    pub(crate) async fn delay(&self, process_id: &str, action: ControlAction, delay: Duration) {
        self.scripts
            .lock()
            .await
            .entry((process_id.into(), action))
            .or_default()
            .delay = delay;
    }

    pub(crate) async fn fail_transiently(&self, process_id: &str, action: ControlAction, times: u32) {
        self.scripts
            .lock()
            .await
            .entry((process_id.into(), action))
            .or_default()
            .transient_failures = times;
    }

    pub(crate) async fn calls(&self) -> Vec<(ProcessId, ControlAction)> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn calls_for(&self, process_id: &str) -> Vec<ControlAction> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(id, _)| id.as_str() == process_id)
            .map(|(_, action)| *action)
            .collect()
    }
}

#[async_trait]
impl ControlApi for ScriptedControl {
    async fn send(
        &self,
        process_id: &ProcessId,
        action: ControlAction,
    ) -> Result<ControlResponse, ControlError> {
        self.calls.lock().await.push((process_id.clone(), action));

        let (delay, reply) = {
            let mut scripts = self.scripts.lock().await;
            let script = scripts.entry((process_id.clone(), action)).or_default();
            let reply = if script.transient_failures > 0 {
                script.transient_failures -= 1;
                Reply::Fail(ControlError::Transport("connection reset".into()))
            } else {
                script.reply.clone()
            };
            (script.delay, reply)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Reply::Succeed => Ok(ControlResponse::ok(process_id.clone(), action)),
            Reply::Refuse(message) => Ok(ControlResponse {
                success: false,
                process_id: Some(process_id.clone()),
                action: Some(action),
                message: Some(message),
            }),
            Reply::Fail(err) => Err(err),
        }
    }
}
