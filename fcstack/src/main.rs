//! fcstack - local function invocation
//!
//! Prepares a function container the way the cloud would (code, NAS, layers,
//! image) and reports the resulting container plan.

mod config;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use fcstack_invoke::debug::DebugIde;
use fcstack_invoke::invocation::InvocationType;
use fcstack_invoke::{
    ContainerRuntimeClient, DebugSettings, DockerClient, DryRunDelegate, InvocationContext,
    InvokeRequest, InvokeResponse, InvokeSession, SessionDeps,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fcstack")]
#[command(about = "Local function invocation planner", long_about = None)]
struct Args {
    /// Configuration file (without extension)
    #[arg(short, long, default_value = "fcstack", env = "FCSTACK_CONFIG")]
    config: String,

    /// Service and function definition (JSON)
    #[arg(short, long, env = "FCSTACK_FUNCTION_FILE")]
    function_file: Option<PathBuf>,

    /// Debug port exposed by the function container
    #[arg(long, env = "FCSTACK_DEBUG_PORT")]
    debug_port: Option<u16>,

    /// IDE to generate debug config for (vscode or pycharm)
    #[arg(long, env = "FCSTACK_DEBUG_IDE")]
    debug_ide: Option<String>,

    /// Extra debugger arguments
    #[arg(long)]
    debug_args: Option<String>,

    /// Do not contact the Docker daemon
    #[arg(long, default_value = "false", env = "FCSTACK_OFFLINE")]
    offline: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "FCSTACK_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prepare the container and print its plan for one event
    Plan {
        /// Inline event payload
        #[arg(short, long, conflicts_with = "event_file")]
        event: Option<String>,

        /// File holding the event payload
        #[arg(long)]
        event_file: Option<PathBuf>,

        /// Sync or Async
        #[arg(long, default_value = "Sync")]
        invocation_type: String,
    },
    /// Report which paths the function's ignore rules exclude
    Ignored {
        paths: Vec<PathBuf>,
    },
}

/// Runtime client used with `--offline`
struct OfflineRuntime;

#[async_trait]
impl ContainerRuntimeClient for OfflineRuntime {
    async fn pull_image_if_needed(&self, image: &str) -> fcstack_invoke::Result<()> {
        info!(image = %image, "Offline, skipping image pull");
        Ok(())
    }

    async fn supports_native_bind_mounts(&self) -> fcstack_invoke::Result<bool> {
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "fcstack={level},fcstack_invoke={level}",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config::Config::load(&args.config)?;
    let function_file = args
        .function_file
        .clone()
        .or_else(|| config.function_file.clone())
        .context("no function file given (--function-file or function_file in config)")?;
    let definition = config::FunctionFile::read(&function_file)?;

    let mut context = InvocationContext::new(
        config.region.clone(),
        config.credentials(),
        config.base_dir.clone(),
        definition.service,
        definition.function,
    )
    .with_debug(DebugSettings {
        port: args.debug_port,
        ide: args.debug_ide.as_deref().map(DebugIde::from_str),
        args: args.debug_args.clone(),
    });
    if let Some(trigger) = definition.trigger {
        context = context.with_trigger(trigger);
    }
    if let Some(tmp_dir) = &config.tmp_dir {
        context = context.with_tmp_dir(tmp_dir);
    }
    if let Some(debugger_path) = &config.debugger_path {
        context = context.with_debugger_path(debugger_path);
    }

    let runtime_client: Arc<dyn ContainerRuntimeClient> = if args.offline {
        Arc::new(OfflineRuntime)
    } else {
        Arc::new(DockerClient::connect()?)
    };
    let mut deps = SessionDeps::new(runtime_client, DryRunDelegate);
    deps.image_lookup = Arc::new(config.image_lookup());

    let mut session = InvokeSession::new(context, config.session_options(), deps);

    match args.command {
        Command::Plan {
            event,
            event_file,
            invocation_type,
        } => {
            let payload = match (event, event_file) {
                (Some(event), _) => event.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)
                    .with_context(|| format!("reading event file {}", path.display()))?,
                (None, None) => b"{}".to_vec(),
            };

            let mut request = InvokeRequest::new(payload);
            request.invocation_type =
                InvocationType::from_str(&invocation_type).unwrap_or_else(|| {
                    warn!(
                        "Unknown invocation type '{}', defaulting to Sync",
                        invocation_type
                    );
                    InvocationType::Sync
                });

            let mut response = InvokeResponse::default();
            session.invoke(&request, &mut response).await?;

            if let Some(payload) = response.payload {
                println!("{}", String::from_utf8_lossy(&payload));
            }
        }
        Command::Ignored { paths } => {
            let ignored = session.resolve_ignore_predicate().await?;
            for path in paths {
                let path = if path.is_absolute() {
                    path
                } else {
                    session.context().base_dir().join(path)
                };
                let verdict = if ignored(&path) { "ignored" } else { "kept" };
                println!("{verdict}\t{}", path.display());
            }
        }
    }

    Ok(())
}
