//! Step three: deployment status and logs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::api::DeploymentApi;
use crate::models::{DeploymentId, InstanceStatus};
use crate::poller::{DeploymentStatus, PollHandle};
use crate::store::WizardStore;

/// Fixed progress order. `Failed` sits last, so a failed deployment
/// highlights every step.
pub const PROGRESS_ORDER: [(InstanceStatus, &str); 4] = [
    (InstanceStatus::Pending, "Waiting"),
    (InstanceStatus::Deploying, "Deploying"),
    (InstanceStatus::Active, "Active"),
    (InstanceStatus::Failed, "Failed"),
];

/// One entry of the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStep {
    pub status: InstanceStatus,
    pub label: &'static str,
    pub highlighted: bool,
}

/// Derives the progress bar for `current`.
///
/// A step is highlighted when it comes at or before `current` in
/// [`PROGRESS_ORDER`]. An unknown status highlights nothing.
pub fn progress_steps(current: InstanceStatus) -> Vec<ProgressStep> {
    let current_index = PROGRESS_ORDER.iter().position(|(s, _)| *s == current);
    PROGRESS_ORDER
        .iter()
        .enumerate()
        .map(|(index, (status, label))| ProgressStep {
            status: *status,
            label: *label,
            highlighted: current_index.is_some_and(|c| index <= c),
        })
        .collect()
}

/// Text view of a deployment's status.
pub fn render_status(app_name: &str, status: &DeploymentStatus) -> String {
    let mut lines = vec![
        "Deployment Status".to_string(),
        format!("Tracking deployment of {}", app_name),
    ];

    let bar: Vec<String> = progress_steps(status.status)
        .iter()
        .map(|step| {
            if step.highlighted {
                format!("[{}]", step.label)
            } else {
                format!(" {} ", step.label)
            }
        })
        .collect();
    lines.push(bar.join(" > "));

    if let Some(ip) = &status.public_ip {
        lines.push(format!("Live at: {}", ip));
    }

    lines.push("Deployment Logs".to_string());
    for log in &status.logs {
        lines.push(format!("{} - {}", log.timestamp, log.message));
    }
    lines.join("\n")
}

/// Mounted status step. Owns the poller; dropping the step stops polling.
pub struct StatusStep {
    app_name: String,
    api: Arc<dyn DeploymentApi>,
    interval: Duration,
    poller: Option<PollHandle>,
}

impl std::fmt::Debug for StatusStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStep")
            .field("app_name", &self.app_name)
            .field("interval", &self.interval)
            .field("poller", &self.poller)
            .finish()
    }
}

impl StatusStep {
    /// Mounts the step and starts polling if the store holds a deployment id.
    pub fn mount(api: Arc<dyn DeploymentApi>, store: &WizardStore, interval: Duration) -> Self {
        let state = store.snapshot();
        let mut step = Self {
            app_name: state.app_name,
            api,
            interval,
            poller: None,
        };
        step.sync(state.deployment_id);
        step
    }

    /// Follows a change of deployment id: restarts polling for a new id,
    /// stops it when the id is cleared, and does nothing if unchanged.
    pub fn sync(&mut self, id: Option<DeploymentId>) {
        if self.deployment_id() == id.as_ref() {
            return;
        }
        // Drop the old handle before starting a new one.
        self.poller = None;
        if let Some(id) = id {
            info!(
                deployment_id = %id,
                interval_ms = self.interval.as_millis() as u64,
                "status polling started"
            );
            self.poller = Some(PollHandle::start(self.api.clone(), id, self.interval));
        }
    }

    /// Stops polling. The last status stays readable until the step is dropped.
    pub fn stop(&self) {
        if let Some(poller) = &self.poller {
            poller.cancel();
        }
    }

    /// Returns true while a poller is running.
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_cancelled())
    }

    /// The deployment being polled, if any.
    pub fn deployment_id(&self) -> Option<&DeploymentId> {
        self.poller.as_ref().map(PollHandle::deployment_id)
    }

    /// Latest status, or the initial pending status if nothing is polled.
    pub fn current(&self) -> DeploymentStatus {
        self.poller
            .as_ref()
            .map(PollHandle::current)
            .unwrap_or_default()
    }

    /// Receiver for status updates, if polling.
    pub fn subscribe(&self) -> Option<watch::Receiver<DeploymentStatus>> {
        self.poller.as_ref().map(PollHandle::subscribe)
    }

    /// Progress bar for the latest status.
    pub fn progress(&self) -> Vec<ProgressStep> {
        progress_steps(self.current().status)
    }

    /// Text view of the latest status.
    pub fn render(&self) -> String {
        render_status(&self.app_name, &self.current())
    }
}
