//! # testing-secrets CLI
//!
//! Development host for the testing-secrets backend. Records live in a JSON
//! store file; the rotation scheduler is in-process, so jobs for stored
//! records are re-registered on every invocation.
//!
//! ## Usage
//!
//! ```bash
//! # Root credential
//! testing-secrets config write --username root --password p0 --low-check 3
//! testing-secrets config read
//!
//! # Static roles
//! testing-secrets role write db1 --username svc --password p0 --rotation-period 1h
//! testing-secrets role list
//! testing-secrets cred read db1
//!
//! # Scheduler callbacks and the initialization hook
//! testing-secrets rotate static-role/db1
//! testing-secrets initialize
//!
//! # Drive scheduled rotations until Ctrl-C
//! testing-secrets run
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use testing_secrets_backend::rotation::{DEFAULT_POLL_INTERVAL, DurationInput};
use testing_secrets_backend::{
    Backend, ConfigUpdate, InMemoryScheduler, Response, RoleUpdate, RotationHandler,
    RotationParamsUpdate, SecretsBackend,
};
use testing_secrets_log::Config as LogConfig;
use testing_secrets_storage::FileStorage;
use tokio_util::sync::CancellationToken;

mod settings;

/// Command-line host for the testing-secrets backend
#[derive(Parser)]
#[command(name = "testing-secrets", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file holding the backend's storage
    #[arg(
        long,
        global = true,
        env = "TESTING_SECRETS_STORE",
        default_value = "testing-secrets.json"
    )]
    store: PathBuf,

    /// TOML file with backend settings (mount_point, rotation_wait, running_version)
    #[arg(long, global = true, env = "TESTING_SECRETS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Root credential
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Static roles
    #[command(subcommand)]
    Role(RoleCommand),

    /// Static credential view
    #[command(subcommand)]
    Cred(CredCommand),

    /// Rotate the record addressed by a trigger path (config or static-role/<name>)
    Rotate {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Run the initialization hook
    Initialize,

    /// Drive scheduled rotations until Ctrl-C
    Run {
        /// How often the scheduler looks for due jobs
        #[arg(long, default_value = "1s")]
        poll_interval: DurationInput,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Create or update the root credential
    Write {
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        low_check: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        high_check: Option<i64>,
        #[command(flatten)]
        rotation: RotationArgs,
    },
    /// Print the root credential
    Read,
}

#[derive(Subcommand)]
enum RoleCommand {
    /// Create or update a static role
    Write {
        name: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[command(flatten)]
        rotation: RotationArgs,
    },
    /// Print a static role
    Read { name: String },
    /// List static role names
    List,
}

#[derive(Subcommand)]
enum CredCommand {
    /// Print a static credential with its ttl
    Read { name: String },
}

#[derive(Args)]
struct RotationArgs {
    /// Cron expression (5 fields, or 6/7 with seconds)
    #[arg(long)]
    rotation_schedule: Option<String>,
    /// How long a scheduled attempt stays valid (seconds or e.g. "10m")
    #[arg(long)]
    rotation_window: Option<DurationInput>,
    /// Fixed rotation interval (seconds or e.g. "1h")
    #[arg(long)]
    rotation_period: Option<DurationInput>,
    /// Turn automated rotation off (or back on with `false`)
    #[arg(long)]
    disable_automated_rotation: Option<bool>,
}

impl From<RotationArgs> for RotationParamsUpdate {
    fn from(args: RotationArgs) -> Self {
        Self {
            rotation_schedule: args.rotation_schedule,
            rotation_window: args.rotation_window,
            rotation_period: args.rotation_period,
            disable_automated_rotation: args.disable_automated_rotation,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_config = match cli.command {
        Commands::Run { .. } => LogConfig::scheduler(),
        _ => LogConfig::command(),
    };
    let _log = testing_secrets_log::init_with(log_config.overlay_env())
        .context("failed to initialize logging")?;

    let settings = settings::load(cli.config.as_deref())?;
    let poll_interval = match &cli.command {
        Commands::Run { poll_interval } => poll_interval.0,
        _ => DEFAULT_POLL_INTERVAL,
    };
    let scheduler = Arc::new(InMemoryScheduler::with_poll_interval(poll_interval));
    let backend = Arc::new(
        Backend::builder()
            .storage(Arc::new(FileStorage::new(&cli.store)))
            .scheduler(scheduler.clone())
            .settings(settings)
            .build()?,
    );
    let jobs = backend
        .register_stored_jobs()
        .await
        .context("failed to register stored rotation jobs")?;

    match cli.command {
        Commands::Config(ConfigCommand::Write {
            message,
            username,
            password,
            low_check,
            high_check,
            rotation,
        }) => {
            let update = ConfigUpdate {
                message,
                username,
                password,
                low_check,
                high_check,
                rotation: rotation.into(),
            };
            finish_write(backend.on_config_write(update).await?)
        }
        Commands::Config(ConfigCommand::Read) => print_response(&backend.on_config_read().await?),
        Commands::Role(RoleCommand::Write {
            name,
            username,
            password,
            rotation,
        }) => {
            let update = RoleUpdate {
                username,
                password,
                rotation: rotation.into(),
            };
            finish_write(backend.on_role_write(&name, update).await?)
        }
        Commands::Role(RoleCommand::Read { name }) => {
            print_response(&backend.on_role_read(&name).await?)
        }
        Commands::Role(RoleCommand::List) => print_response(&backend.on_role_list().await?),
        Commands::Cred(CredCommand::Read { name }) => {
            print_response(&backend.on_cred_read(&name).await?)
        }
        Commands::Rotate { path } => {
            backend.on_rotate(&path).await?;
            print_data(Map::from_iter([("path".to_string(), Value::from(path))]))
        }
        Commands::Initialize => {
            backend.on_initialize().await?;
            Ok(())
        }
        Commands::Run { .. } => {
            tracing::info!(jobs = jobs.len(), "rotation scheduler started");
            run(backend, scheduler).await
        }
    }
}

async fn run(backend: Arc<Backend>, scheduler: Arc<InMemoryScheduler>) -> Result<()> {
    let shutdown = CancellationToken::new();
    let handler: Arc<dyn RotationHandler> = backend;
    let task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { scheduler.run(handler, shutdown).await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    shutdown.cancel();
    task.await.context("scheduler task panicked")?;
    Ok(())
}

/// Writes print nothing on success; a scheduler failure after the write
/// becomes the process error
fn finish_write(response: Option<Response>) -> Result<()> {
    match response {
        Some(Response {
            error: Some(message),
            ..
        }) => bail!("{message}"),
        Some(response) => print_response(&response),
        None => Ok(()),
    }
}

fn print_response(response: &Response) -> Result<()> {
    print_data(response.data.clone())
}

fn print_data(data: Map<String, Value>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&Value::Object(data))?;
    println!("{rendered}");
    Ok(())
}
