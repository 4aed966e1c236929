//! Shared wizard state.
//!
//! [`WizardStore`] is the only place cross-step form data lives. Every change
//! goes through a named setter so all mutation sites are enumerable, and every
//! setter notifies subscribers through a `watch` channel.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::{DeploymentId, EnvVar};

/// Port used until the user picks another one.
pub const DEFAULT_PORT: u32 = 3001;

/// The wizard step currently shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Repository and plan selection.
    #[default]
    Repository,
    /// Environment variables, port and submission.
    Environment,
    /// Deployment status polling.
    Status,
}

impl Step {
    /// Returns the 1-based position of the step.
    pub fn number(&self) -> u8 {
        match self {
            Step::Repository => 1,
            Step::Environment => 2,
            Step::Status => 3,
        }
    }

    /// Total number of steps.
    pub const COUNT: u8 = 3;
}

/// All cross-step form data and UI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    pub current_step: Step,

    pub organization: String,
    pub repository: String,
    pub branch: String,
    pub app_name: String,
    pub region: String,
    pub framework: String,
    pub plan_type: String,
    pub database_enabled: bool,
    pub database_type: String,

    /// `None` when the last value given to [`WizardStore::set_port`] was not a number.
    pub port: Option<u32>,
    pub environment_variables: Vec<EnvVar>,

    pub is_loading: bool,
    pub error: Option<String>,
    pub success: bool,
    pub deployment_id: Option<DeploymentId>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            current_step: Step::Repository,
            organization: String::new(),
            repository: String::new(),
            branch: String::new(),
            app_name: String::new(),
            region: "us-east-1".to_string(),
            framework: "react".to_string(),
            plan_type: "starter".to_string(),
            database_enabled: false,
            database_type: "none".to_string(),
            port: Some(DEFAULT_PORT),
            environment_variables: Vec::new(),
            is_loading: false,
            error: None,
            success: false,
            deployment_id: None,
        }
    }
}

/// Parses a port the way a lenient integer parse does.
///
/// Leading whitespace and a `+` sign are skipped and the longest run of
/// leading digits is used, so `"8080abc"` gives 8080. Empty, non-numeric,
/// negative or out-of-range input gives `None`.
pub fn coerce_port(input: &str) -> Option<u32> {
    let trimmed = input.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits: String = unsigned.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Injectable container for [`WizardState`].
///
/// Cloning the store is cheap and every clone shares the same state.
#[derive(Debug, Clone)]
pub struct WizardStore {
    tx: Arc<watch::Sender<WizardState>>,
}

impl Default for WizardStore {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! string_setter {
    ($(#[$doc:meta])* $name:ident, $field:ident) => {
        $(#[$doc])*
        pub fn $name(&self, value: impl Into<String>) {
            let value = value.into();
            self.tx.send_modify(|s| s.$field = value);
        }
    };
}

impl WizardStore {
    /// Creates a store holding the default state.
    pub fn new() -> Self {
        Self::with_state(WizardState::default())
    }

    /// Creates a store holding the given state.
    pub fn with_state(state: WizardState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx: Arc::new(tx) }
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> WizardState {
        self.tx.borrow().clone()
    }

    /// Returns a receiver notified after every setter call.
    pub fn subscribe(&self) -> watch::Receiver<WizardState> {
        self.tx.subscribe()
    }

    /// Returns the step the wizard should show.
    pub fn current_step(&self) -> Step {
        self.tx.borrow().current_step
    }

    /// Returns the id of the deployment created in step two, if any.
    pub fn deployment_id(&self) -> Option<DeploymentId> {
        self.tx.borrow().deployment_id.clone()
    }

    /// Moves the wizard to `step`.
    pub fn set_current_step(&self, step: Step) {
        self.tx.send_modify(|s| s.current_step = step);
    }

    string_setter!(
        /// Sets the Git organization.
        set_organization, organization
    );
    string_setter!(
        /// Sets the repository name.
        set_repository, repository
    );
    string_setter!(
        /// Sets the branch to deploy.
        set_branch, branch
    );
    string_setter!(
        /// Sets the application name.
        set_app_name, app_name
    );
    string_setter!(
        /// Sets the region code.
        set_region, region
    );
    string_setter!(
        /// Sets the framework code.
        set_framework, framework
    );
    string_setter!(
        /// Sets the plan name.
        set_plan_type, plan_type
    );
    string_setter!(
        /// Sets the database type code.
        set_database_type, database_type
    );

    /// Turns the managed database on or off.
    pub fn set_database_enabled(&self, enabled: bool) {
        self.tx.send_modify(|s| s.database_enabled = enabled);
    }

    /// Stores the port after coercing the input with [`coerce_port`].
    pub fn set_port(&self, input: &str) {
        let port = coerce_port(input);
        self.tx.send_modify(|s| s.port = port);
    }

    /// Replaces the committed environment variables.
    pub fn set_environment_variables(&self, variables: Vec<EnvVar>) {
        self.tx.send_modify(|s| s.environment_variables = variables);
    }

    /// Marks a submission as in flight.
    pub fn set_is_loading(&self, loading: bool) {
        self.tx.send_modify(|s| s.is_loading = loading);
    }

    /// Sets or clears the error message.
    pub fn set_error(&self, error: Option<String>) {
        self.tx.send_modify(|s| s.error = error);
    }

    /// Records whether the last submission succeeded.
    pub fn set_success(&self, success: bool) {
        self.tx.send_modify(|s| s.success = success);
    }

    /// Sets or clears the tracked deployment.
    pub fn set_deployment_id(&self, id: Option<DeploymentId>) {
        self.tx.send_modify(|s| s.deployment_id = id);
    }

    /// Restores every field to its default.
    pub fn reset_form(&self) {
        tracing::debug!("resetting wizard state");
        self.tx.send_modify(|s| *s = WizardState::default());
    }
}
