//! `template-deployer` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`        start the API server.
//! - `requirements` list what a template file needs from a user.
//! - `webhook-path` print the webhook path of a template/user pair.
//! - `preview`      materialize a template file without touching anything.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engine::mock::{InMemoryCredentialStore, RecordingAutomationService};
use engine::store::{PgCredentialStore, PgDeploymentStore, PgTemplateStore};
use engine::{
    Deployer, EngineConfig, HttpAutomationService, Materializer, ServiceConfig, UserInputs, WorkflowTemplate,
};
use nodes::NodeCatalog;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "template-deployer",
    about = "Materializes workflow templates into per-user automation instances",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
        #[arg(long, default_value_t = 10)]
        max_connections: u32,
        /// Base URL of the automation service, without `/api/v1`.
        #[arg(long, env = "AUTOMATION_BASE_URL")]
        automation_url: String,
        #[arg(long, env = "AUTOMATION_API_KEY", hide_env_values = true)]
        automation_api_key: String,
        /// Request timeout against the automation service, in seconds.
        #[arg(long, default_value_t = 30)]
        automation_timeout: u64,
    },
    /// Print the credential requirements and inputs of a template file.
    Requirements {
        /// Path to the template JSON file.
        path: PathBuf,
    },
    /// Print the deterministic webhook path for a template and user.
    WebhookPath {
        #[arg(long)]
        template_id: String,
        #[arg(long)]
        user_id: String,
    },
    /// Materialize a template file against in-memory stores and print the
    /// instance document. Credential ids in the output are placeholders.
    Preview {
        /// Path to the template JSON file.
        path: PathBuf,
        #[arg(long, default_value = "preview-user")]
        user_id: String,
        /// JSON file holding the user inputs object.
        #[arg(long)]
        inputs: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            database_url,
            max_connections,
            automation_url,
            automation_api_key,
            automation_timeout,
        } => {
            let pool = db::pool::create_pool(&database_url, max_connections)
                .await
                .context("failed to connect to database")?;
            let config = ServiceConfig::new(automation_url, automation_api_key)
                .with_timeout(Duration::from_secs(automation_timeout));
            let service = HttpAutomationService::new(config)?;
            let materializer = Materializer::new(
                Arc::new(PgCredentialStore::new(pool.clone())),
                Arc::new(service),
                EngineConfig::from_env(),
            );
            let deployer = Deployer::new(
                Arc::new(PgTemplateStore::new(pool.clone())),
                Arc::new(PgDeploymentStore::new(pool)),
                materializer,
            );

            info!("Starting API server on {bind}");
            api::serve(&bind, api::AppState::new(deployer)).await?;
        }
        Command::Requirements { path } => {
            let template = load_template(&path)?;
            let report = serde_json::json!({
                "template_id": template.id,
                "credentials": engine::analyze_requirements(&template, &NodeCatalog::builtin())?,
                "inputs": engine::referenced_inputs(&template),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::WebhookPath { template_id, user_id } => {
            println!("{}", engine::webhook_path(&template_id, &user_id));
        }
        Command::Preview { path, user_id, inputs } => {
            let template = load_template(&path)?;
            let inputs = match inputs {
                Some(path) => load_inputs(&path)?,
                None => UserInputs::default(),
            };

            let materializer = Materializer::new(
                Arc::new(InMemoryCredentialStore::new()),
                Arc::new(RecordingAutomationService::new()),
                EngineConfig::from_env(),
            );
            let materialization = materializer.materialize(&template, &inputs, &user_id).await?;

            let report = serde_json::json!({
                "instance": materialization.instance_document,
                "manifest": materialization.manifest,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Read a template file; its stem becomes the template id.
fn load_template(path: &Path) -> Result<WorkflowTemplate> {
    let source = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("template")
        .to_owned();
    Ok(WorkflowTemplate::new(id.clone(), id, source)?)
}

fn load_inputs(path: &Path) -> Result<UserInputs> {
    let source = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&source).with_context(|| format!("{} is not a JSON object of inputs", path.display()))
}
