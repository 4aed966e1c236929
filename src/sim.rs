//! In-memory deployment backend.
//!
//! Behaves like the real service closely enough to drive the whole wizard
//! offline: it validates create requests the way the backend does, assigns
//! UUID identifiers, and walks each deployment through
//! `pending → deploying → provisioning → active` (or `failed`) one step per
//! status poll, appending log lines as it goes. Statuses are kept as wire
//! strings and decoded like an HTTP response would be, so `provisioning`
//! reaches the wizard as an unknown status. Tests use the failure switches,
//! call counters and scripted statuses to exercise error paths.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::api::{ApiResult, DeploymentApi};
use crate::error::ApiError;
use crate::models::{
    Choice, CreatedDeployment, DeploymentId, DeploymentRecord, DeploymentRequest, InstanceStatus,
    LogEntry, LogsResponse, Metadata, PlanDetails, StatusResponse,
};

/// Backend endpoints, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Create,
    List,
    Get,
    Status,
    Logs,
    Metadata,
}

impl Endpoint {
    const ALL: [Endpoint; 6] = [
        Endpoint::Create,
        Endpoint::List,
        Endpoint::Get,
        Endpoint::Status,
        Endpoint::Logs,
        Endpoint::Metadata,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

const REGIONS: &[(&str, &str)] = &[
    ("us-east-1", "US East (N. Virginia)"),
    ("us-west-2", "US West (Oregon)"),
    ("eu-central-1", "EU (Frankfurt)"),
];

const FRAMEWORKS: &[(&str, &str)] = &[
    ("reactjs", "React.js"),
    ("nextjs", "Next.js"),
    ("vue", "Vue"),
    ("django", "Django"),
    ("node", "Node.js"),
    ("flask", "Flask"),
    ("fastapi", "FastAPI"),
];

const PLANS: &[&str] = &["starter", "pro"];

const DATABASE_TYPES: &[(&str, &str)] = &[
    ("none", "None"),
    ("postgresql", "PostgreSQL"),
    ("mysql", "MySQL"),
];

/// Option lists the simulated backend serves from `/metadata/`.
pub fn default_metadata() -> Metadata {
    let choices = |items: &[(&str, &str)]| {
        items
            .iter()
            .map(|(value, label)| Choice::new(*value, *label))
            .collect::<Vec<_>>()
    };

    Metadata {
        regions: choices(REGIONS),
        frameworks: choices(FRAMEWORKS),
        plan_details: BTreeMap::from([
            (
                "starter".to_string(),
                PlanDetails {
                    cpu: "0.5 vCPU".to_string(),
                    ram: "512MB".to_string(),
                    bandwidth: "10GB/mo".to_string(),
                    price: "$10/mo".to_string(),
                },
            ),
            (
                "pro".to_string(),
                PlanDetails {
                    cpu: "2 vCPU".to_string(),
                    ram: "4GB".to_string(),
                    bandwidth: "Unlimited".to_string(),
                    price: "$50/mo".to_string(),
                },
            ),
        ]),
        database_types: choices(DATABASE_TYPES),
    }
}

#[derive(Debug)]
struct SimDeployment {
    record: DeploymentRecord,
    stage: usize,
    status: &'static str,
    public_ip: Option<String>,
    logs: Vec<LogEntry>,
    script: VecDeque<StatusResponse>,
    last_scripted: Option<StatusResponse>,
}

impl SimDeployment {
    fn log(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            message: message.into(),
        });
    }

    /// Moves one stage along the provisioning pipeline.
    fn advance(&mut self, provisioning_fails: bool) {
        match self.stage {
            0 => {
                self.status = "deploying";
                self.log("[INFO] Deployment started...");
            }
            1 => {
                self.status = "provisioning";
                self.log("[INFO] Provisioning cloud resources...");
            }
            2 if provisioning_fails => {
                self.status = "failed";
                self.log("[ERROR] Deployment failed: instance provisioning was rejected");
            }
            2 => {
                let ip = random_public_ip();
                self.log(format!("[INFO] Instance provisioned. Assigned public IP: {}", ip));
                self.status = "active";
                self.public_ip = Some(ip);
                self.log("[SUCCESS] Deployment completed successfully!");
            }
            _ => return,
        }
        self.stage += 1;
    }

    fn next_status(&mut self, provisioning_fails: bool) -> StatusResponse {
        if let Some(next) = self.script.pop_front() {
            self.last_scripted = Some(next.clone());
            return next;
        }
        if let Some(last) = &self.last_scripted {
            return last.clone();
        }
        self.advance(provisioning_fails);
        StatusResponse {
            instance_status: decode_status(self.status),
            public_ip: self.public_ip.clone(),
        }
    }
}

/// Decodes a wire status string the way a JSON response is decoded.
fn decode_status(wire: &str) -> InstanceStatus {
    serde_json::from_value(json!(wire)).unwrap_or_default()
}

fn random_public_ip() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    format!("54.{}.{}.{}", bytes[0], bytes[1], bytes[2])
}

#[derive(Debug, Default)]
struct SimState {
    deployments: Vec<SimDeployment>,
    failing: HashMap<Endpoint, bool>,
    delay: Option<Duration>,
    provisioning_fails: bool,
    requests: Vec<DeploymentRequest>,
}

/// In-memory implementation of [`DeploymentApi`].
#[derive(Debug)]
pub struct SimulatedBackend {
    state: Mutex<SimState>,
    calls: [AtomicUsize; 6],
    metadata: Metadata,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    /// Creates an empty backend serving [`default_metadata`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            calls: Default::default(),
            metadata: default_metadata(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of calls made to an endpoint so far.
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.calls[endpoint.index()].load(Ordering::SeqCst)
    }

    /// Total calls across all endpoints.
    pub fn total_calls(&self) -> usize {
        Endpoint::ALL.iter().map(|e| self.calls(*e)).sum()
    }

    /// Makes an endpoint answer with a 503 until switched off again.
    pub fn set_failing(&self, endpoint: Endpoint, failing: bool) {
        self.state().failing.insert(endpoint, failing);
    }

    /// Delays every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Makes deployments that reach provisioning end up `failed` instead of `active`.
    pub fn set_provisioning_fails(&self, fails: bool) {
        self.state().provisioning_fails = fails;
    }

    /// Create requests received so far, in order.
    pub fn requests(&self) -> Vec<DeploymentRequest> {
        self.state().requests.clone()
    }

    /// Replaces the pipeline of `id` with fixed status answers.
    ///
    /// The last answer repeats once the script runs out.
    pub fn script_status(&self, id: &DeploymentId, script: Vec<StatusResponse>) {
        let mut state = self.state();
        if let Some(dep) = state.deployments.iter_mut().find(|d| &d.record.id == id) {
            dep.script = script.into();
            dep.last_scripted = None;
        }
    }

    /// Adds a deployment directly, bypassing request validation.
    pub fn insert_fixture(&self, name: &str) -> DeploymentId {
        let request = DeploymentRequest {
            name: name.to_string(),
            region: "us-east-1".to_string(),
            template: "reactjs".to_string(),
            plan: "starter".to_string(),
            organization: "acme-corp".to_string(),
            repo: "my-app".to_string(),
            branch: "main".to_string(),
            database_enabled: false,
            database_type: "none".to_string(),
            database_config: None,
            environment: crate::models::EnvironmentConfig {
                port: Some(3001),
                environment_variables: BTreeMap::new(),
            },
        };
        self.store_deployment(&request)
    }

    fn store_deployment(&self, request: &DeploymentRequest) -> DeploymentId {
        let id = DeploymentId::new(Uuid::new_v4().to_string());
        let record = DeploymentRecord {
            id: id.clone(),
            name: request.name.clone(),
            region: Some(request.region.clone()),
            template: Some(request.template.clone()),
            plan: Some(request.plan.clone()),
            organization: Some(request.organization.clone()),
            repo: Some(request.repo.clone()),
            branch: Some(request.branch.clone()),
            database_enabled: request.database_enabled,
            database_type: Some(request.database_type.clone()),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            extra: serde_json::Map::from_iter([(
                "environment".to_string(),
                json!({
                    "port": request.environment.port,
                    "environment_variables": request.environment.environment_variables,
                }),
            )]),
        };

        let mut deployment = SimDeployment {
            record,
            stage: 0,
            status: "pending",
            public_ip: None,
            logs: Vec::new(),
            script: VecDeque::new(),
            last_scripted: None,
        };
        deployment.log("[INFO] Deployment task received.");

        tracing::info!(deployment_id = %id, name = %request.name, "simulated deployment created");
        self.state().deployments.push(deployment);
        id
    }

    /// Counts the call, applies the configured delay and failure switch.
    async fn enter(&self, endpoint: Endpoint) -> ApiResult<()> {
        self.calls[endpoint.index()].fetch_add(1, Ordering::SeqCst);

        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.state().failing.get(&endpoint).copied().unwrap_or(false);
        if failing {
            return Err(ApiError::Response {
                status: 503,
                body: json!({"detail": "Service temporarily unavailable."}),
            });
        }
        Ok(())
    }

    fn not_found() -> ApiError {
        ApiError::Response {
            status: 404,
            body: json!({"detail": "Not found."}),
        }
    }

    fn with_deployment<T>(
        &self,
        id: &DeploymentId,
        f: impl FnOnce(&mut SimDeployment) -> T,
    ) -> ApiResult<T> {
        let mut state = self.state();
        state
            .deployments
            .iter_mut()
            .find(|d| &d.record.id == id)
            .map(f)
            .ok_or_else(Self::not_found)
    }
}

/// Checks a create request the way the backend does.
pub fn validate_request(request: &DeploymentRequest) -> Result<(), serde_json::Value> {
    let reject = |field: &str, message: String| Err(json!({ field: message }));

    if request.name.is_empty() {
        return reject("name", "App name is required".to_string());
    }
    if !REGIONS.iter().any(|(v, _)| *v == request.region) {
        return reject("region", "Invalid region selected".to_string());
    }
    if !FRAMEWORKS.iter().any(|(v, _)| *v == request.template) {
        return reject("template", "Invalid framework".to_string());
    }
    if !PLANS.contains(&request.plan.as_str()) {
        return reject("plan", "Invalid plan type".to_string());
    }
    if request.repo.is_empty() {
        return reject("repo", "Repository is required".to_string());
    }
    if request.branch.is_empty() {
        return reject("branch", "Branch is required".to_string());
    }
    match request.environment.port {
        Some(port) if (1024..=65535).contains(&port) => {}
        _ => {
            return reject(
                "environment",
                "Port must be between 1024 and 65535".to_string(),
            )
        }
    }
    for (key, value) in &request.environment.environment_variables {
        if key.is_empty() || value.is_empty() {
            return reject(
                "environment",
                format!("Invalid environment variable: {}={}", key, value),
            );
        }
    }
    if request.database_enabled {
        if request.database_type.is_empty() {
            return reject(
                "database_type",
                "Database type required when enabled".to_string(),
            );
        }
        if !DATABASE_TYPES.iter().any(|(v, _)| *v == request.database_type) {
            return reject("database_type", "Invalid database type".to_string());
        }
    }
    Ok(())
}

#[async_trait]
impl DeploymentApi for SimulatedBackend {
    async fn create_deployment(&self, request: &DeploymentRequest) -> ApiResult<CreatedDeployment> {
        self.enter(Endpoint::Create).await?;
        self.state().requests.push(request.clone());

        if let Err(body) = validate_request(request) {
            return Err(ApiError::Response { status: 400, body });
        }

        let id = self.store_deployment(request);
        Ok(CreatedDeployment {
            id,
            message: Some("WebApp created successfully".to_string()),
            status: Some("deployment started".to_string()),
            extra: serde_json::Map::new(),
        })
    }

    async fn list_deployments(&self) -> ApiResult<Vec<DeploymentRecord>> {
        self.enter(Endpoint::List).await?;
        // Newest first, like the backend.
        Ok(self
            .state()
            .deployments
            .iter()
            .rev()
            .map(|d| d.record.clone())
            .collect())
    }

    async fn get_deployment(&self, id: &DeploymentId) -> ApiResult<DeploymentRecord> {
        self.enter(Endpoint::Get).await?;
        self.with_deployment(id, |d| d.record.clone())
    }

    async fn get_status(&self, id: &DeploymentId) -> ApiResult<StatusResponse> {
        self.enter(Endpoint::Status).await?;
        let provisioning_fails = self.state().provisioning_fails;
        self.with_deployment(id, |d| d.next_status(provisioning_fails))
    }

    async fn get_logs(&self, id: &DeploymentId) -> ApiResult<LogsResponse> {
        self.enter(Endpoint::Logs).await?;
        self.with_deployment(id, |d| LogsResponse {
            logs: d.logs.clone(),
        })
    }

    async fn get_metadata(&self) -> ApiResult<Metadata> {
        self.enter(Endpoint::Metadata).await?;
        Ok(self.metadata.clone())
    }
}
