//! The three-step deployment wizard.
//!
//! [`Wizard`] owns the shared store, the backend client and whichever step is
//! mounted. [`Wizard::sync`] is the single place that maps the store's
//! current step to a mounted step component.

mod environment;
mod repository;
mod status;

pub use environment::{
    build_request, suggest_port, EnvironmentStep, SubmitError, ENV_INCOMPLETE, PORT_REQUIRED,
    SUGGESTED_PORTS,
};
pub use repository::{
    Field, FieldErrors, RepositoryForm, RepositoryStep, BRANCHES, ORGANIZATIONS, REPOSITORIES,
};
pub use status::{progress_steps, render_status, ProgressStep, StatusStep, PROGRESS_ORDER};

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::api::DeploymentApi;
use crate::store::{Step, WizardStore};

/// The step component currently mounted.
#[derive(Debug)]
pub enum ActiveStep {
    Repository(RepositoryStep),
    Environment(EnvironmentStep),
    Status(StatusStep),
}

impl ActiveStep {
    /// Which step this component renders.
    pub fn step(&self) -> Step {
        match self {
            ActiveStep::Repository(_) => Step::Repository,
            ActiveStep::Environment(_) => Step::Environment,
            ActiveStep::Status(_) => Step::Status,
        }
    }
}

/// Wizard shell: store, backend client and the mounted step.
pub struct Wizard {
    store: WizardStore,
    api: Arc<dyn DeploymentApi>,
    poll_interval: Duration,
    active: ActiveStep,
}

impl std::fmt::Debug for Wizard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wizard")
            .field("poll_interval", &self.poll_interval)
            .field("active", &self.active)
            .finish()
    }
}

impl Wizard {
    /// Mounts the step the store currently points at.
    pub async fn start(
        store: WizardStore,
        api: Arc<dyn DeploymentApi>,
        poll_interval: Duration,
    ) -> Self {
        let active = mount(store.current_step(), &store, &api, poll_interval).await;
        Self {
            store,
            api,
            poll_interval,
            active,
        }
    }

    /// The mounted step.
    pub fn active(&self) -> &ActiveStep {
        &self.active
    }

    /// The mounted step, for editing.
    pub fn active_mut(&mut self) -> &mut ActiveStep {
        &mut self.active
    }

    /// Which step is mounted.
    pub fn current_step(&self) -> Step {
        self.active.step()
    }

    /// Brings the mounted step in line with the store.
    ///
    /// A different step is mounted fresh and replaces the old one. A status
    /// step being left stops polling before the new step starts loading.
    /// When the status step stays mounted it follows changes to the
    /// deployment id.
    pub async fn sync(&mut self) -> Step {
        let wanted = self.store.current_step();
        if wanted != self.active.step() {
            debug!(from = ?self.active.step(), to = ?wanted, "switching wizard step");
            if let ActiveStep::Status(status) = &self.active {
                status.stop();
            }
            self.active = mount(wanted, &self.store, &self.api, self.poll_interval).await;
        } else if let ActiveStep::Status(status) = &mut self.active {
            status.sync(self.store.deployment_id());
        }
        wanted
    }

    /// Clears all state and returns to the first step.
    pub async fn restart(&mut self) {
        self.store.reset_form();
        self.sync().await;
    }

    /// "Step N of 3".
    pub fn header(&self) -> String {
        format!("Step {} of {}", self.current_step().number(), Step::COUNT)
    }

    /// Text view of the mounted step.
    pub fn render(&self) -> String {
        let body = match &self.active {
            ActiveStep::Repository(step) => step.render(&self.store.snapshot()),
            ActiveStep::Environment(step) => step.render(&self.store.snapshot()),
            ActiveStep::Status(step) => step.render(),
        };
        format!("{}\n{}", self.header(), body)
    }
}

/// Builds the component for `step`.
async fn mount(
    step: Step,
    store: &WizardStore,
    api: &Arc<dyn DeploymentApi>,
    poll_interval: Duration,
) -> ActiveStep {
    match step {
        Step::Repository => {
            ActiveStep::Repository(RepositoryStep::mount(api.as_ref(), store).await)
        }
        Step::Environment => ActiveStep::Environment(EnvironmentStep::mount(&store.snapshot())),
        Step::Status => {
            ActiveStep::Status(StatusStep::mount(api.clone(), store, poll_interval))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeploymentId;
    use crate::sim::{Endpoint, SimulatedBackend};

    const TICK: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn starts_on_repository_step() {
        let backend = Arc::new(SimulatedBackend::new());
        let wizard = Wizard::start(WizardStore::new(), backend.clone(), TICK).await;

        assert_eq!(wizard.current_step(), Step::Repository);
        assert_eq!(wizard.header(), "Step 1 of 3");
        assert!(wizard.render().starts_with("Step 1 of 3\nDeploy your app"));
        assert_eq!(backend.calls(Endpoint::Metadata), 1);
    }

    #[tokio::test]
    async fn sync_mounts_matching_step() {
        let backend = Arc::new(SimulatedBackend::new());
        let store = WizardStore::new();
        let mut wizard = Wizard::start(store.clone(), backend, TICK).await;

        store.set_current_step(Step::Environment);
        assert_eq!(wizard.sync().await, Step::Environment);
        assert!(matches!(wizard.active(), ActiveStep::Environment(_)));
        assert_eq!(wizard.header(), "Step 2 of 3");
    }

    #[tokio::test]
    async fn sync_without_change_keeps_mounted_step() {
        let backend = Arc::new(SimulatedBackend::new());
        let mut wizard = Wizard::start(WizardStore::new(), backend.clone(), TICK).await;

        wizard.sync().await;
        wizard.sync().await;
        assert_eq!(backend.calls(Endpoint::Metadata), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_status_step_stops_polling() {
        let backend = Arc::new(SimulatedBackend::new());
        let id = backend.insert_fixture("shop");
        let store = WizardStore::new();
        store.set_deployment_id(Some(id));
        store.set_current_step(Step::Status);

        let mut wizard = Wizard::start(store.clone(), backend.clone(), TICK).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.calls(Endpoint::Status), 1);

        wizard.restart().await;
        assert_eq!(wizard.current_step(), Step::Repository);
        tokio::time::sleep(TICK * 3).await;
        assert_eq!(backend.calls(Endpoint::Status), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_step_one_mount_does_not_keep_old_poller_running() {
        let backend = Arc::new(SimulatedBackend::new());
        let id = backend.insert_fixture("shop");
        let store = WizardStore::new();
        store.set_deployment_id(Some(id));
        store.set_current_step(Step::Status);

        let mut wizard = Wizard::start(store.clone(), backend.clone(), TICK).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.calls(Endpoint::Status), 1);

        // The metadata fetch of the new step spans several poll ticks.
        backend.set_delay(TICK * 5);
        wizard.restart().await;

        assert_eq!(wizard.current_step(), Step::Repository);
        assert_eq!(backend.calls(Endpoint::Metadata), 1);
        assert_eq!(backend.calls(Endpoint::Status), 1);
        assert_eq!(backend.calls(Endpoint::Logs), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn status_step_follows_new_deployment_id() {
        let backend = Arc::new(SimulatedBackend::new());
        let first = backend.insert_fixture("one");
        let second = backend.insert_fixture("two");
        let store = WizardStore::new();
        store.set_deployment_id(Some(first));
        store.set_current_step(Step::Status);

        let mut wizard = Wizard::start(store.clone(), backend.clone(), TICK).await;
        store.set_deployment_id(Some(second.clone()));
        wizard.sync().await;

        let ActiveStep::Status(status) = wizard.active() else {
            panic!("status step should stay mounted");
        };
        assert_eq!(status.deployment_id(), Some(&second));

        store.set_deployment_id(None::<DeploymentId>);
        wizard.sync().await;
        let ActiveStep::Status(status) = wizard.active() else {
            panic!("status step should stay mounted");
        };
        assert!(!status.is_polling());
    }
}
