//! Request and response types exchanged with the deployment backend.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier assigned by the backend to a created deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Wraps a backend identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as sent by the backend.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single environment variable pair as edited in the wizard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl EnvVar {
    /// Creates a pair from key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns true if both key and value are empty.
    pub fn is_blank(&self) -> bool {
        self.key.is_empty() && self.value.is_empty()
    }

    /// Returns true if both key and value are filled in.
    pub fn is_complete(&self) -> bool {
        !self.key.is_empty() && !self.value.is_empty()
    }
}

/// Runtime environment attached to a deployment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Port the app listens on. `None` serialises as `null`.
    pub port: Option<u32>,
    pub environment_variables: BTreeMap<String, String>,
}

/// Body of `POST /webapps/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub name: String,
    pub region: String,
    pub template: String,
    pub plan: String,
    pub organization: String,
    pub repo: String,
    pub branch: String,
    pub database_enabled: bool,
    pub database_type: String,
    /// Present (as an empty object) only when a database is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_config: Option<serde_json::Map<String, serde_json::Value>>,
    pub environment: EnvironmentConfig,
}

/// Response of `POST /webapps/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedDeployment {
    pub id: DeploymentId,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A deployment as returned by `GET /webapps/` and `GET /webapps/{id}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub database_enabled: bool,
    #[serde(default)]
    pub database_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Nested environment, instance and database details.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Provisioning state of the deployed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[default]
    Pending,
    Deploying,
    Active,
    Failed,
    /// Any status string the wizard does not know about.
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Deploying => "deploying",
            InstanceStatus::Active => "active",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Unknown => "unknown",
        }
    }
}

/// Response of `GET /webapps/{id}/status/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub instance_status: InstanceStatus,
    #[serde(default)]
    pub public_ip: Option<String>,
}

/// One deployment log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(alias = "log_text")]
    pub message: String,
}

/// Response of `GET /webapps/{id}/logs/`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogsResponse {
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// Resource summary for a plan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanDetails {
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub ram: String,
    #[serde(default)]
    pub bandwidth: String,
    #[serde(default)]
    pub price: String,
}

/// A `[value, label]` choice pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice(pub String, pub String);

impl Choice {
    /// Creates a choice from value and label.
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self(value.into(), label.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn label(&self) -> &str {
        &self.1
    }
}

/// Response of `GET /metadata/`: option lists for step one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub regions: Vec<Choice>,
    #[serde(default)]
    pub frameworks: Vec<Choice>,
    #[serde(default)]
    pub plan_details: BTreeMap<String, PlanDetails>,
    #[serde(default)]
    pub database_types: Vec<Choice>,
}
