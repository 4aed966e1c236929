//! Step two: port, environment variables and deployment submission.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::DeploymentApi;
use crate::error::ApiError;
use crate::models::{DeploymentId, DeploymentRequest, EnvVar, EnvironmentConfig};
use crate::store::{Step, WizardState, WizardStore, DEFAULT_PORT};

/// Range "suggest a port" draws from.
pub const SUGGESTED_PORTS: RangeInclusive<u32> = 3000..=8999;

/// Alert shown when no port is given.
pub const PORT_REQUIRED: &str = "Please specify a port";

/// Alert shown when an environment variable pair is half filled.
pub const ENV_INCOMPLETE: &str = "Please fill in both key and value for all environment variables";

/// Why a submission did not create a deployment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    /// Input was rejected before any request was made.
    #[error("{0}")]
    Validation(&'static str),

    /// The backend refused or could not be reached.
    #[error("Backend Error: {0}")]
    Api(#[from] ApiError),
}

/// Picks a port uniformly from [`SUGGESTED_PORTS`].
pub fn suggest_port() -> u32 {
    let span = (SUGGESTED_PORTS.end() - SUGGESTED_PORTS.start() + 1) as u128;
    let offset = Uuid::new_v4().as_u128() % span;
    SUGGESTED_PORTS.start() + offset as u32
}

/// Assembles the create request from committed state.
pub fn build_request(state: &WizardState, port: Option<u32>, pairs: &[EnvVar]) -> DeploymentRequest {
    let environment_variables: BTreeMap<String, String> = pairs
        .iter()
        .map(|v| (v.key.clone(), v.value.clone()))
        .collect();

    DeploymentRequest {
        name: state.app_name.clone(),
        region: state.region.clone(),
        template: state.framework.clone(),
        plan: state.plan_type.clone(),
        organization: state.organization.clone(),
        repo: state.repository.clone(),
        branch: state.branch.clone(),
        database_enabled: state.database_enabled,
        database_type: state.database_type.clone(),
        database_config: state.database_enabled.then(serde_json::Map::new),
        environment: EnvironmentConfig {
            port,
            environment_variables,
        },
    }
}

/// Clears the loading flag when dropped, whatever way the request ends.
struct LoadingGuard<'a> {
    store: &'a WizardStore,
}

impl<'a> LoadingGuard<'a> {
    fn begin(store: &'a WizardStore) -> Self {
        store.set_is_loading(true);
        store.set_error(None);
        Self { store }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.set_is_loading(false);
    }
}

/// Mounted environment step: local pair list and port text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentStep {
    pairs: Vec<EnvVar>,
    port: String,
}

impl EnvironmentStep {
    /// Seeds pairs and port from the store; one empty pair if the store has none.
    pub fn mount(state: &WizardState) -> Self {
        let pairs = if state.environment_variables.is_empty() {
            vec![EnvVar::default()]
        } else {
            state.environment_variables.clone()
        };
        let port = match state.port {
            Some(port) if port != 0 => port,
            _ => DEFAULT_PORT,
        };
        Self {
            pairs,
            port: port.to_string(),
        }
    }

    /// Environment variable pairs as currently edited.
    pub fn pairs(&self) -> &[EnvVar] {
        &self.pairs
    }

    /// Port input exactly as typed.
    pub fn port_text(&self) -> &str {
        &self.port
    }

    /// Appends an empty pair.
    pub fn add_pair(&mut self) {
        self.pairs.push(EnvVar::default());
    }

    /// Removes the pair at `index`; out-of-range indices are ignored.
    pub fn remove_pair(&mut self, index: usize) -> Option<EnvVar> {
        (index < self.pairs.len()).then(|| self.pairs.remove(index))
    }

    /// Sets the key of the pair at `index`, if it exists.
    pub fn set_key(&mut self, index: usize, key: impl Into<String>) {
        if let Some(pair) = self.pairs.get_mut(index) {
            pair.key = key.into();
        }
    }

    /// Sets the value of the pair at `index`, if it exists.
    pub fn set_value(&mut self, index: usize, value: impl Into<String>) {
        if let Some(pair) = self.pairs.get_mut(index) {
            pair.value = value.into();
        }
    }

    /// Replaces the port input.
    pub fn set_port_text(&mut self, text: impl Into<String>) {
        self.port = text.into();
    }

    /// Replaces the port with a random suggestion and returns it.
    pub fn suggest_port(&mut self) -> u32 {
        let port = suggest_port();
        self.port = port.to_string();
        port
    }

    fn port_missing(&self) -> bool {
        let text = self.port.trim();
        text.is_empty() || text.parse::<u64>().map(|n| n == 0).unwrap_or(false)
    }

    /// Drops fully empty pairs and rejects half-filled ones.
    pub fn filtered_pairs(&self) -> Result<Vec<EnvVar>, SubmitError> {
        let filtered: Vec<EnvVar> = self
            .pairs
            .iter()
            .filter(|v| !v.is_blank())
            .cloned()
            .collect();

        if filtered.iter().any(|v| !v.is_complete()) {
            return Err(SubmitError::Validation(ENV_INCOMPLETE));
        }
        Ok(filtered)
    }

    /// Validates, commits, and asks the backend to create the deployment.
    ///
    /// Validation failures change nothing. On success the store holds the
    /// new deployment id and points at the status step.
    pub async fn submit(
        &self,
        store: &WizardStore,
        api: &dyn DeploymentApi,
    ) -> Result<DeploymentId, SubmitError> {
        if self.port_missing() {
            return Err(SubmitError::Validation(PORT_REQUIRED));
        }
        let pairs = self.filtered_pairs()?;

        store.set_port(&self.port);
        store.set_environment_variables(pairs.clone());

        let request_port = self.port.trim().parse::<u32>().ok();
        let request = build_request(&store.snapshot(), request_port, &pairs);

        let result = {
            let _loading = LoadingGuard::begin(store);
            api.create_deployment(&request).await
        };

        match result {
            Ok(created) => {
                info!(deployment_id = %created.id, app = %request.name, "deployment created");
                store.set_deployment_id(Some(created.id.clone()));
                store.set_success(true);
                store.set_current_step(Step::Status);
                Ok(created.id)
            }
            Err(err) => {
                warn!(error = %err, "deployment creation failed");
                Err(SubmitError::Api(err))
            }
        }
    }

    /// Returns to the repository step without clearing anything.
    pub fn back(&self, store: &WizardStore) {
        store.set_current_step(Step::Repository);
    }

    /// Text view of the pairs, port and deployment summary.
    pub fn render(&self, state: &WizardState) -> String {
        let mut lines = vec!["Environment & Deploy".to_string()];
        lines.push(format!("  Port: {}", self.port));
        for (index, pair) in self.pairs.iter().enumerate() {
            lines.push(format!("  [{}] {}={}", index, pair.key, pair.value));
        }
        let app = if state.app_name.is_empty() {
            "Your App"
        } else {
            state.app_name.as_str()
        };
        let database = if state.database_enabled {
            state.database_type.as_str()
        } else {
            "No"
        };
        lines.push(format!(
            "  {} | Framework: {} | Region: {} | Plan: {} | Database: {}",
            app, state.framework, state.region, state.plan_type, database
        ));
        if state.is_loading {
            lines.push("  Creating…".to_string());
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Endpoint, SimulatedBackend};
    use serde_json::json;

    fn ready_store() -> WizardStore {
        let store = WizardStore::new();
        store.set_organization("acme-corp");
        store.set_repository("my-app");
        store.set_branch("main");
        store.set_app_name("shop");
        store.set_region("us-east-1");
        store.set_framework("reactjs");
        store.set_current_step(Step::Environment);
        store
    }

    fn step_with(pairs: &[(&str, &str)]) -> EnvironmentStep {
        let mut step = EnvironmentStep::mount(&WizardState::default());
        step.remove_pair(0);
        for (index, (key, value)) in pairs.iter().enumerate() {
            step.add_pair();
            step.set_key(index, *key);
            step.set_value(index, *value);
        }
        step
    }

    #[test]
    fn mount_starts_with_one_empty_pair_and_default_port() {
        let step = EnvironmentStep::mount(&WizardState::default());
        assert_eq!(step.pairs(), &[EnvVar::default()]);
        assert_eq!(step.port_text(), "3001");
    }

    #[test]
    fn mount_uses_stored_pairs_and_port() {
        let mut state = WizardState::default();
        state.environment_variables = vec![EnvVar::new("A", "1")];
        state.port = Some(8080);
        let step = EnvironmentStep::mount(&state);
        assert_eq!(step.pairs(), &[EnvVar::new("A", "1")]);
        assert_eq!(step.port_text(), "8080");
    }

    #[test]
    fn mount_falls_back_when_stored_port_is_not_a_number() {
        let mut state = WizardState::default();
        state.port = None;
        assert_eq!(EnvironmentStep::mount(&state).port_text(), "3001");
    }

    #[test]
    fn pair_editing() {
        let mut step = EnvironmentStep::mount(&WizardState::default());
        step.set_key(0, "A");
        step.set_value(0, "1");
        step.add_pair();
        step.set_key(1, "B");
        assert_eq!(step.pairs().len(), 2);

        assert_eq!(step.remove_pair(0), Some(EnvVar::new("A", "1")));
        assert_eq!(step.remove_pair(5), None);
        assert_eq!(step.pairs(), &[EnvVar::new("B", "")]);

        // Out of range edits are ignored.
        step.set_key(9, "Z");
        assert_eq!(step.pairs().len(), 1);
    }

    #[test]
    fn suggested_ports_stay_in_range() {
        for _ in 0..1000 {
            let port = suggest_port();
            assert!(SUGGESTED_PORTS.contains(&port), "{} out of range", port);
        }
        let mut step = EnvironmentStep::mount(&WizardState::default());
        let port = step.suggest_port();
        assert_eq!(step.port_text(), port.to_string());
    }

    #[test]
    fn request_carries_database_config_only_when_enabled() {
        let mut state = WizardState::default();
        let without = build_request(&state, Some(3001), &[]);
        assert!(without.database_config.is_none());

        state.database_enabled = true;
        state.database_type = "mysql".to_string();
        let with = build_request(&state, Some(3001), &[EnvVar::new("A", "1")]);
        assert_eq!(with.database_config, Some(serde_json::Map::new()));
        assert_eq!(with.environment.environment_variables["A"], "1");
    }

    #[tokio::test]
    async fn empty_port_alerts_without_change() {
        let store = ready_store();
        let before = store.snapshot();
        let backend = SimulatedBackend::new();
        let mut step = step_with(&[("A", "1")]);
        step.set_port_text("");

        let err = step.submit(&store, &backend).await.unwrap_err();
        assert_eq!(err, SubmitError::Validation(PORT_REQUIRED));
        assert_eq!(store.snapshot(), before);
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn zero_port_is_treated_as_missing() {
        let store = ready_store();
        let backend = SimulatedBackend::new();
        let mut step = step_with(&[]);

        for text in ["0", "00"] {
            step.set_port_text(text);
            let err = step.submit(&store, &backend).await.unwrap_err();
            assert_eq!(err, SubmitError::Validation(PORT_REQUIRED));
        }
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn partial_pair_alerts_without_change() {
        let store = ready_store();
        let before = store.snapshot();
        let backend = SimulatedBackend::new();
        let step = step_with(&[("A", "1"), ("", ""), ("B", "")]);

        let err = step.submit(&store, &backend).await.unwrap_err();
        assert_eq!(err, SubmitError::Validation(ENV_INCOMPLETE));
        assert_eq!(err.to_string(), ENV_INCOMPLETE);
        assert_eq!(store.snapshot(), before);
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn blank_pairs_are_dropped_and_submission_succeeds() {
        let store = ready_store();
        let backend = SimulatedBackend::new();
        let step = step_with(&[("A", "1"), ("", "")]);

        let id = step.submit(&store, &backend).await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.environment_variables, vec![EnvVar::new("A", "1")]);
        assert_eq!(state.port, Some(3001));
        assert_eq!(state.deployment_id, Some(id));
        assert!(state.success);
        assert!(!state.is_loading);
        assert_eq!(state.current_step, Step::Status);

        let sent = &backend.requests()[0];
        assert_eq!(sent.environment.port, Some(3001));
        assert_eq!(
            serde_json::to_value(&sent.environment.environment_variables).unwrap(),
            json!({"A": "1"})
        );
        assert!(sent.database_config.is_none());
    }

    #[tokio::test]
    async fn backend_error_is_returned_verbatim_and_loading_cleared() {
        let store = ready_store();
        store.set_framework("react");
        let backend = SimulatedBackend::new();
        let step = step_with(&[]);

        let err = step.submit(&store, &backend).await.unwrap_err();
        let SubmitError::Api(api_err) = &err else {
            panic!("expected backend error, got {:?}", err);
        };
        assert_eq!(api_err.body(), Some(&json!({"template": "Invalid framework"})));
        assert!(err.to_string().starts_with("Backend Error: "));

        let state = store.snapshot();
        assert!(!state.is_loading);
        assert!(!state.success);
        assert_eq!(state.current_step, Step::Environment);
        assert!(state.deployment_id.is_none());
        // Port and pairs were committed before the request.
        assert_eq!(state.port, Some(3001));
        assert_eq!(backend.calls(Endpoint::Create), 1);
    }

    #[tokio::test]
    async fn database_request_sends_empty_config() {
        let store = ready_store();
        store.set_database_enabled(true);
        store.set_database_type("postgresql");
        let backend = SimulatedBackend::new();

        step_with(&[]).submit(&store, &backend).await.unwrap();

        let sent = &backend.requests()[0];
        assert!(sent.database_enabled);
        assert_eq!(sent.database_config, Some(serde_json::Map::new()));
    }

    #[tokio::test]
    async fn non_numeric_port_is_committed_as_not_a_number() {
        let store = ready_store();
        let backend = SimulatedBackend::new();
        let mut step = step_with(&[]);
        step.set_port_text("abc");

        let err = step.submit(&store, &backend).await.unwrap_err();
        assert!(matches!(err, SubmitError::Api(_)));
        assert_eq!(store.snapshot().port, None);
        assert_eq!(backend.requests()[0].environment.port, None);
    }

    #[test]
    fn back_keeps_committed_data() {
        let store = ready_store();
        store.set_environment_variables(vec![EnvVar::new("A", "1")]);
        let step = EnvironmentStep::mount(&store.snapshot());

        step.back(&store);

        let state = store.snapshot();
        assert_eq!(state.current_step, Step::Repository);
        assert_eq!(state.app_name, "shop");
        assert_eq!(state.environment_variables, vec![EnvVar::new("A", "1")]);
    }
}
