//! Step one: repository, app and plan selection.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use tracing::{error, info};

use crate::api::DeploymentApi;
use crate::models::{Choice, Metadata, PlanDetails};
use crate::store::{Step, WizardState, WizardStore};

/// Organizations offered until a Git provider integration exists.
pub const ORGANIZATIONS: &[(&str, &str)] = &[
    ("acme-corp", "ACME Corporation"),
    ("tech-startup", "Tech Startup Inc"),
    ("open-source", "Open Source Org"),
];

/// Repositories offered until a Git provider integration exists.
pub const REPOSITORIES: &[(&str, &str)] = &[
    ("my-app", "my-app"),
    ("web-portal", "web-portal"),
    ("api-server", "api-server"),
];

/// Branches offered until a Git provider integration exists.
pub const BRANCHES: &[(&str, &str)] = &[
    ("main", "main"),
    ("develop", "develop"),
    ("staging", "staging"),
];

/// A required input of the repository form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Organization,
    Repository,
    Branch,
    AppName,
    Region,
    Framework,
}

impl Field {
    /// Every required field, in display order.
    pub const ALL: [Field; 6] = [
        Field::Organization,
        Field::Repository,
        Field::Branch,
        Field::AppName,
        Field::Region,
        Field::Framework,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Field::Organization => "Organization",
            Field::Repository => "Repository",
            Field::Branch => "Branch",
            Field::AppName => "App name",
            Field::Region => "Region",
            Field::Framework => "Framework",
        }
    }

    /// Inline message shown when the field is left empty.
    pub fn required_message(&self) -> &'static str {
        match self {
            Field::Organization => "Organization is required",
            Field::Repository => "Repository is required",
            Field::Branch => "Branch is required",
            Field::AppName => "App name is required",
            Field::Region => "Region is required",
            Field::Framework => "Framework is required",
        }
    }
}

/// Field-level validation messages for the repository form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    errors: BTreeMap<Field, &'static str>,
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join(", "))
    }
}

impl std::error::Error for FieldErrors {}

impl FieldErrors {
    /// Returns the message for a field, if it failed.
    pub fn get(&self, field: Field) -> Option<&'static str> {
        self.errors.get(&field).copied()
    }

    /// Returns true when every field passed.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of fields that failed.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// All messages in field order.
    pub fn messages(&self) -> Vec<&'static str> {
        self.errors.values().copied().collect()
    }
}

/// Locally buffered values of the required fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryForm {
    pub organization: String,
    pub repository: String,
    pub branch: String,
    pub app_name: String,
    pub region: String,
    pub framework: String,
}

impl RepositoryForm {
    /// Seeds the form from the store. Region and framework start empty so
    /// the user picks them from the loaded options.
    pub fn from_state(state: &WizardState) -> Self {
        Self {
            organization: state.organization.clone(),
            repository: state.repository.clone(),
            branch: state.branch.clone(),
            app_name: state.app_name.clone(),
            region: String::new(),
            framework: String::new(),
        }
    }

    /// Current value of `field`.
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Organization => &self.organization,
            Field::Repository => &self.repository,
            Field::Branch => &self.branch,
            Field::AppName => &self.app_name,
            Field::Region => &self.region,
            Field::Framework => &self.framework,
        }
    }

    /// Replaces the value of `field`.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        match field {
            Field::Organization => self.organization = value,
            Field::Repository => self.repository = value,
            Field::Branch => self.branch = value,
            Field::AppName => self.app_name = value,
            Field::Region => self.region = value,
            Field::Framework => self.framework = value,
        }
    }

    /// Checks that every required field is non-empty.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        for field in Field::ALL {
            if self.get(field).is_empty() {
                errors.errors.insert(field, field.required_message());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Mounted repository step: local form plus the option lists from the backend.
#[derive(Debug, Clone, Default)]
pub struct RepositoryStep {
    form: RepositoryForm,
    metadata: Metadata,
}

impl RepositoryStep {
    /// Mounts the step: seeds the form and loads option lists.
    ///
    /// A metadata failure is logged and leaves every option list empty.
    pub async fn mount(api: &dyn DeploymentApi, store: &WizardStore) -> Self {
        let form = RepositoryForm::from_state(&store.snapshot());
        let metadata = match api.get_metadata().await {
            Ok(metadata) => metadata,
            Err(err) => {
                error!(error = %err, "metadata load failed");
                Metadata::default()
            }
        };
        Self { form, metadata }
    }

    /// The local form buffer.
    pub fn form(&self) -> &RepositoryForm {
        &self.form
    }

    /// Edits one field of the local form. Nothing reaches the store until submit.
    pub fn set_field(&mut self, field: Field, value: impl Into<String>) {
        self.form.set(field, value);
    }

    /// Region options from metadata.
    pub fn regions(&self) -> &[Choice] {
        &self.metadata.regions
    }

    /// Framework options from metadata.
    pub fn frameworks(&self) -> &[Choice] {
        &self.metadata.frameworks
    }

    /// Database type options from metadata.
    pub fn database_types(&self) -> &[Choice] {
        &self.metadata.database_types
    }

    /// Plan details keyed by plan name.
    pub fn plans(&self) -> &BTreeMap<String, PlanDetails> {
        &self.metadata.plan_details
    }

    /// Plan selection goes straight to the store.
    pub fn select_plan(&self, store: &WizardStore, plan: impl Into<String>) {
        store.set_plan_type(plan);
    }

    /// Database toggle goes straight to the store.
    pub fn set_database_enabled(&self, store: &WizardStore, enabled: bool) {
        store.set_database_enabled(enabled);
    }

    /// Database type selection goes straight to the store.
    pub fn select_database_type(&self, store: &WizardStore, database_type: impl Into<String>) {
        store.set_database_type(database_type);
    }

    /// Validates the form, then commits it and moves to the environment step.
    ///
    /// On failure the store is left untouched.
    pub fn submit(&self, store: &WizardStore) -> Result<(), FieldErrors> {
        self.form.validate()?;

        let form = &self.form;
        store.set_organization(form.organization.clone());
        store.set_repository(form.repository.clone());
        store.set_branch(form.branch.clone());
        store.set_app_name(form.app_name.clone());
        store.set_region(form.region.clone());
        store.set_framework(form.framework.clone());
        store.set_current_step(Step::Environment);

        info!(app = %form.app_name, repo = %form.repository, "repository step committed");
        Ok(())
    }

    /// Text view of the form, option lists and selected plan.
    pub fn render(&self, state: &WizardState) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Deploy your app");
        for field in Field::ALL {
            let value = self.form.get(field);
            let shown = if value.is_empty() { "-" } else { value };
            let _ = writeln!(out, "  {}: {}", field.label(), shown);
        }

        if self.plans().is_empty() {
            let _ = writeln!(out, "  Plan: {}", state.plan_type);
        } else {
            for (name, plan) in self.plans() {
                let marker = if *name == state.plan_type { "*" } else { " " };
                let _ = writeln!(
                    out,
                    "  [{}] {} - {} | CPU: {} | RAM: {} | Bandwidth: {}",
                    marker,
                    name.to_uppercase(),
                    plan.price,
                    plan.cpu,
                    plan.ram,
                    plan.bandwidth
                );
            }
        }

        let database = if state.database_enabled {
            state.database_type.as_str()
        } else {
            "None"
        };
        let _ = writeln!(out, "  Database: {}", database);
        out
    }
}
