//! Fixed-interval status polling for a created deployment.
//!
//! [`PollHandle::start`] spawns a task that fetches status and logs right away
//! and then on every tick. The status fetch and the log fetch of a tick are
//! independent tasks: either may fail or hang without affecting the other or
//! the interval. Dropping the handle cancels the interval; fetches already in
//! flight may still complete, but their results are discarded.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::api::DeploymentApi;
use crate::models::{DeploymentId, InstanceStatus, LogEntry};

/// Latest known state of a deployment, as shown by the status step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub status: InstanceStatus,
    pub public_ip: Option<String>,
    pub logs: Vec<LogEntry>,
}

/// Handle to a running poll loop. Dropping it stops polling.
#[derive(Debug)]
pub struct PollHandle {
    deployment_id: DeploymentId,
    token: CancellationToken,
    task: JoinHandle<()>,
    status_rx: watch::Receiver<DeploymentStatus>,
}

impl PollHandle {
    /// Starts polling `id` every `interval`, beginning immediately.
    pub fn start(api: Arc<dyn DeploymentApi>, id: DeploymentId, interval: Duration) -> Self {
        let (tx, status_rx) = watch::channel(DeploymentStatus::default());
        let token = CancellationToken::new();

        let task = tokio::spawn(poll_loop(
            api,
            id.clone(),
            interval,
            Arc::new(tx),
            token.clone(),
        ));

        Self {
            deployment_id: id,
            token,
            task,
            status_rx,
        }
    }

    /// The deployment being polled.
    pub fn deployment_id(&self) -> &DeploymentId {
        &self.deployment_id
    }

    /// Returns a copy of the latest status.
    pub fn current(&self) -> DeploymentStatus {
        self.status_rx.borrow().clone()
    }

    /// Returns a receiver notified whenever a poll lands.
    pub fn subscribe(&self) -> watch::Receiver<DeploymentStatus> {
        self.status_rx.clone()
    }

    /// Stops polling. No fetch is started after this returns.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once polling has been stopped.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
        self.task.abort();
    }
}

async fn poll_loop(
    api: Arc<dyn DeploymentApi>,
    id: DeploymentId,
    interval: Duration,
    tx: Arc<watch::Sender<DeploymentStatus>>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                ticks += 1;
                debug!(deployment_id = %id, tick = ticks, "polling deployment");
                spawn_status_fetch(api.clone(), id.clone(), tx.clone(), token.clone());
                spawn_logs_fetch(api.clone(), id.clone(), tx.clone(), token.clone());
            }
        }
    }

    debug!(deployment_id = %id, ticks, "polling stopped");
}

fn spawn_status_fetch(
    api: Arc<dyn DeploymentApi>,
    id: DeploymentId,
    tx: Arc<watch::Sender<DeploymentStatus>>,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        match api.get_status(&id).await {
            Ok(resp) => {
                if token.is_cancelled() {
                    return;
                }
                debug!(
                    deployment_id = %id,
                    status = resp.instance_status.as_str(),
                    "status fetched"
                );
                tx.send_modify(|s| {
                    s.status = resp.instance_status;
                    s.public_ip = resp.public_ip;
                });
            }
            Err(err) => error!(deployment_id = %id, error = %err, "status fetch failed"),
        }
    });
}

fn spawn_logs_fetch(
    api: Arc<dyn DeploymentApi>,
    id: DeploymentId,
    tx: Arc<watch::Sender<DeploymentStatus>>,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        match api.get_logs(&id).await {
            Ok(resp) => {
                if token.is_cancelled() {
                    return;
                }
                tx.send_modify(|s| s.logs = resp.logs);
            }
            Err(err) => error!(deployment_id = %id, error = %err, "logs fetch failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatusResponse;
    use crate::sim::{Endpoint, SimulatedBackend};

    const TICK: Duration = Duration::from_secs(2);

    fn scripted() -> (Arc<SimulatedBackend>, DeploymentId) {
        let backend = Arc::new(SimulatedBackend::new());
        let id = backend.insert_fixture("shop");
        backend.script_status(
            &id,
            vec![
                StatusResponse {
                    instance_status: InstanceStatus::Deploying,
                    public_ip: None,
                },
                StatusResponse {
                    instance_status: InstanceStatus::Active,
                    public_ip: Some("1.2.3.4".to_string()),
                },
            ],
        );
        (backend, id)
    }

    #[tokio::test(start_paused = true)]
    async fn starts_pending_then_follows_polls() {
        let (backend, id) = scripted();
        let handle = PollHandle::start(backend.clone(), id, TICK);

        assert_eq!(handle.current().status, InstanceStatus::Pending);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let first = handle.current();
        assert_eq!(first.status, InstanceStatus::Deploying);
        assert!(first.public_ip.is_none());

        tokio::time::sleep(TICK).await;
        let second = handle.current();
        assert_eq!(second.status, InstanceStatus::Active);
        assert_eq!(second.public_ip.as_deref(), Some("1.2.3.4"));
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_polling_after_terminal_status() {
        let (backend, id) = scripted();
        let _handle = PollHandle::start(backend.clone(), id, TICK);

        tokio::time::sleep(TICK * 4 + Duration::from_millis(100)).await;
        assert_eq!(backend.calls(Endpoint::Status), 5);
        assert_eq!(backend.calls(Endpoint::Logs), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_polling() {
        let (backend, id) = scripted();
        let handle = PollHandle::start(backend.clone(), id, TICK);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.calls(Endpoint::Status), 1);

        drop(handle);
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(backend.calls(Endpoint::Status), 1);
        assert_eq!(backend.calls(Endpoint::Logs), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling_and_keeps_last_status() {
        let (backend, id) = scripted();
        let handle = PollHandle::start(backend.clone(), id, TICK);

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        assert!(handle.is_cancelled());

        tokio::time::sleep(TICK * 3).await;
        assert_eq!(backend.calls(Endpoint::Status), 1);
        assert_eq!(handle.current().status, InstanceStatus::Deploying);
    }

    #[tokio::test(start_paused = true)]
    async fn status_failure_does_not_stop_logs_or_interval() {
        let backend = Arc::new(SimulatedBackend::new());
        let id = backend.insert_fixture("shop");
        backend.set_failing(Endpoint::Status, true);

        let handle = PollHandle::start(backend.clone(), id, TICK);
        tokio::time::sleep(TICK + Duration::from_millis(100)).await;

        assert_eq!(backend.calls(Endpoint::Status), 2);
        assert_eq!(backend.calls(Endpoint::Logs), 2);
        let current = handle.current();
        assert_eq!(current.status, InstanceStatus::Pending);
        assert!(!current.logs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn logs_failure_keeps_status_updates() {
        let (backend, id) = scripted();
        backend.set_failing(Endpoint::Logs, true);

        let handle = PollHandle::start(backend.clone(), id, TICK);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let current = handle.current();
        assert_eq!(current.status, InstanceStatus::Deploying);
        assert!(current.logs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_after_cancel_is_discarded() {
        let (backend, id) = scripted();
        backend.set_delay(Duration::from_secs(1));

        let handle = PollHandle::start(backend.clone(), id, TICK);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();

        // The in-flight fetch resolves after cancellation.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(backend.calls(Endpoint::Status), 1);
        assert_eq!(handle.current(), DeploymentStatus::default());
    }
}
