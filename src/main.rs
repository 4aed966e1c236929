//! Deploy Wizard CLI
//!
//! Terminal front end for the deployment wizard and the backend's read endpoints.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Select};
use serde::Serialize;

use deploy_wizard::wizard::{BRANCHES, ORGANIZATIONS, REPOSITORIES};
use deploy_wizard::{
    ActiveStep, Choice, ClientConfig, DeploymentApi, DeploymentId, EnvironmentStep, Error, Field,
    HttpDeploymentApi, RepositoryStep, Result, SimulatedBackend, StatusStep, SubmitError,
    Validate, Wizard, WizardStore,
};

#[derive(Parser)]
#[command(name = "deploy-wizard", version, about = "Deploy a web app in three steps")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config and environment)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Seconds between status polls
    #[arg(long, global = true)]
    poll_interval_secs: Option<u64>,

    /// Use the in-memory backend instead of HTTP
    #[arg(long, global = true)]
    simulate: bool,

    /// With --simulate, make provisioning fail so deployments end up failed
    #[arg(long, global = true)]
    simulate_failure: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the interactive wizard (default)
    Wizard,
    /// Follow the status of an existing deployment
    Status { id: String },
    /// List deployments
    List,
    /// Show one deployment
    Show { id: String },
    /// Show regions, frameworks, plans and database types
    Metadata,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let api: Arc<dyn DeploymentApi> = if cli.simulate {
        tracing::info!(failing = cli.simulate_failure, "using simulated backend");
        let backend = SimulatedBackend::new();
        backend.set_provisioning_fails(cli.simulate_failure);
        Arc::new(backend)
    } else {
        tracing::info!(api_url = %config.api_url, "using HTTP backend");
        Arc::new(HttpDeploymentApi::new(&config)?)
    };

    match cli.command.unwrap_or(Command::Wizard) {
        Command::Wizard => run_wizard(api, &config).await,
        Command::Status { id } => {
            let store = WizardStore::new();
            store.set_deployment_id(Some(DeploymentId::new(id)));
            let step = StatusStep::mount(api, &store, config.poll_interval());
            follow_status(&step).await
        }
        Command::List => print_json(&api.list_deployments().await?),
        Command::Show { id } => print_json(&api.get_deployment(&DeploymentId::new(id)).await?),
        Command::Metadata => print_json(&api.get_metadata().await?),
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url.clone());
    }
    if let Some(secs) = cli.poll_interval_secs {
        config = config.with_poll_interval_secs(secs);
    }

    for warning in config.validate().into_result()? {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| Error::Config(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn prompt_error(e: dialoguer::Error) -> Error {
    Error::Prompt(e.to_string())
}

async fn run_wizard(api: Arc<dyn DeploymentApi>, config: &ClientConfig) -> Result<()> {
    let store = WizardStore::new();
    let mut wizard = Wizard::start(store.clone(), api.clone(), config.poll_interval()).await;

    loop {
        println!("\n{}", wizard.render());
        match wizard.active_mut() {
            ActiveStep::Repository(step) => prompt_repository(step, &store)?,
            ActiveStep::Environment(step) => prompt_environment(step, &store, api.as_ref()).await?,
            ActiveStep::Status(step) => return follow_status(step).await,
        }
        wizard.sync().await;
    }
}

/// Picks one of `options` (value, label); free text when there are none.
fn choose(prompt: &str, options: &[(String, String)], current: &str) -> Result<String> {
    if options.is_empty() {
        return Input::new()
            .with_prompt(prompt)
            .with_initial_text(current)
            .allow_empty(true)
            .interact_text()
            .map_err(prompt_error);
    }

    let labels: Vec<&str> = options.iter().map(|(_, label)| label.as_str()).collect();
    let default = options.iter().position(|(value, _)| value == current).unwrap_or(0);
    let index = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(default)
        .interact()
        .map_err(prompt_error)?;
    Ok(options[index].0.clone())
}

fn static_options(list: &[(&str, &str)]) -> Vec<(String, String)> {
    list.iter()
        .map(|(v, l)| (v.to_string(), l.to_string()))
        .collect()
}

fn prompt_repository(step: &mut RepositoryStep, store: &WizardStore) -> Result<()> {
    for field in Field::ALL {
        let options = match field {
            Field::Organization => static_options(ORGANIZATIONS),
            Field::Repository => static_options(REPOSITORIES),
            Field::Branch => static_options(BRANCHES),
            Field::AppName => Vec::new(),
            Field::Region => choice_options(step.regions()),
            Field::Framework => choice_options(step.frameworks()),
        };
        let current = step.form().get(field).to_string();
        let value = choose(field.label(), &options, &current)?;
        step.set_field(field, value);
    }

    let plans: Vec<(String, String)> = step
        .plans()
        .iter()
        .map(|(name, plan)| (name.clone(), format!("{} ({})", name.to_uppercase(), plan.price)))
        .collect();
    if !plans.is_empty() {
        let plan = choose("Plan", &plans, &store.snapshot().plan_type)?;
        step.select_plan(store, plan);
    }

    let enabled = Confirm::new()
        .with_prompt("Enable a database?")
        .default(store.snapshot().database_enabled)
        .interact()
        .map_err(prompt_error)?;
    step.set_database_enabled(store, enabled);
    if enabled {
        let options = choice_options(step.database_types());
        let database_type = choose("Database type", &options, &store.snapshot().database_type)?;
        step.select_database_type(store, database_type);
    }

    if let Err(errors) = step.submit(store) {
        for message in errors.messages() {
            eprintln!("  {}", message);
        }
    }
    Ok(())
}

fn choice_options(choices: &[Choice]) -> Vec<(String, String)> {
    choices
        .iter()
        .map(|c| (c.value().to_string(), c.label().to_string()))
        .collect()
}

async fn prompt_environment(
    step: &mut EnvironmentStep,
    store: &WizardStore,
    api: &dyn DeploymentApi,
) -> Result<()> {
    let actions = [
        "Deploy",
        "Add environment variable",
        "Remove environment variable",
        "Edit environment variable",
        "Set port",
        "Suggest port",
        "Back",
    ];
    let action = Select::new()
        .with_prompt("What next?")
        .items(&actions)
        .default(0)
        .interact()
        .map_err(prompt_error)?;

    match action {
        0 => match step.submit(store, api).await {
            Ok(id) => println!("Deployment {} created", id),
            Err(SubmitError::Validation(message)) => eprintln!("{}", message),
            Err(err @ SubmitError::Api(_)) => eprintln!("{}", err),
        },
        1 => {
            step.add_pair();
            let index = step.pairs().len() - 1;
            edit_pair(step, index)?;
        }
        2 | 3 if step.pairs().is_empty() => eprintln!("No environment variables"),
        2 => {
            let index = pick_pair(step, "Remove which?")?;
            step.remove_pair(index);
        }
        3 => {
            let index = pick_pair(step, "Edit which?")?;
            edit_pair(step, index)?;
        }
        4 => {
            let port: String = Input::new()
                .with_prompt("Port")
                .with_initial_text(step.port_text())
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_error)?;
            step.set_port_text(port);
        }
        5 => {
            let port = step.suggest_port();
            println!("Suggested port {}", port);
        }
        _ => step.back(store),
    }
    Ok(())
}

fn pick_pair(step: &EnvironmentStep, prompt: &str) -> Result<usize> {
    let labels: Vec<String> = step
        .pairs()
        .iter()
        .map(|p| format!("{}={}", p.key, p.value))
        .collect();
    Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(0)
        .interact()
        .map_err(prompt_error)
}

fn edit_pair(step: &mut EnvironmentStep, index: usize) -> Result<()> {
    let Some(pair) = step.pairs().get(index).cloned() else {
        return Ok(());
    };
    let key: String = Input::new()
        .with_prompt("Key")
        .with_initial_text(pair.key)
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_error)?;
    let value: String = Input::new()
        .with_prompt("Value")
        .with_initial_text(pair.value)
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_error)?;
    step.set_key(index, key);
    step.set_value(index, value);
    Ok(())
}

/// Re-renders the status view on every update until Ctrl-C.
async fn follow_status(step: &StatusStep) -> Result<()> {
    println!("\n{}", step.render());
    let Some(mut updates) = step.subscribe() else {
        println!("No deployment to track");
        return Ok(());
    };

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                println!("\n{}", step.render());
            }
            _ = tokio::signal::ctrl_c() => {
                step.stop();
                return Ok(());
            }
        }
    }
}
