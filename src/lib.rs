//! Deploy Wizard - client and terminal wizard for the Kuberns deployment backend
//!
//! This library provides the three-step deployment wizard (repository and plan,
//! environment and submission, status polling), the shared state store it runs
//! on, and the HTTP client for the backend it talks to.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod poller;
pub mod sim;
pub mod store;
pub mod wizard;

pub use api::{ApiResult, DeploymentApi, HttpDeploymentApi};
pub use config::{ClientConfig, Validate, ValidationResult};
pub use error::{ApiError, Error, Result};
pub use models::{
    Choice, CreatedDeployment, DeploymentId, DeploymentRecord, DeploymentRequest, EnvVar,
    EnvironmentConfig, InstanceStatus, LogEntry, LogsResponse, Metadata, PlanDetails,
    StatusResponse,
};
pub use poller::{DeploymentStatus, PollHandle};
pub use sim::{Endpoint, SimulatedBackend};
pub use store::{coerce_port, Step, WizardState, WizardStore, DEFAULT_PORT};
pub use wizard::{
    progress_steps, ActiveStep, EnvironmentStep, Field, FieldErrors, ProgressStep,
    RepositoryForm, RepositoryStep, StatusStep, SubmitError, Wizard,
};
