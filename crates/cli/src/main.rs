use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use amo::config::{Paths, UserConfig};
use amo::downloader::{SourceList, WorkflowDownloader};
use amo::policy::CommandWhitelist;
use amo::{Engine, FailureKind, RunOptions, RuntimeVariables};

#[derive(Parser)]
#[command(name = "amo")]
#[command(about = "Run sandboxed amo workflow scripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the base directory (AMO_HOME or ~/.amo) with default config and permission files.
    Init,

    /// Run a workflow by path, installed name, or bundled name.
    Run {
        /// Workflow identifier (e.g. `hello`, `hello.js`, `./scripts/task.js`)
        workflow: String,

        /// Runtime variable `key=value`, readable in the script via getVar (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Sets the `input` variable
        #[arg(long, short, value_name = "PATH")]
        input: Option<String>,

        /// Sets the `output` variable
        #[arg(long, short, value_name = "PATH")]
        output: Option<String>,

        /// Ask the workflow to print its own help (sets `help=true`)
        #[arg(long)]
        workflow_help: bool,

        /// Abort the workflow after this many seconds
        #[arg(long, value_name = "SECS", value_parser = parse_timeout)]
        timeout: Option<Duration>,

        /// Enable debug logging for amo
        #[arg(long)]
        debug: bool,
    },

    /// Manage installed workflows.
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },

    /// Manage the commands workflows may execute.
    Permission {
        #[command(subcommand)]
        command: PermissionCommands,
    },
}

#[derive(Subcommand)]
enum WorkflowCommands {
    /// List installed and bundled workflows
    List,

    /// Download a workflow from an allowed source into the workflows directory
    Get {
        url: String,

        /// Installed file name (default: derived from the URL)
        #[arg(long, short)]
        filename: Option<String>,
    },

    /// Manage allowed download sources
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    List,
    /// Allow a host or host/path prefix
    Add { entry: String },
    #[command(alias = "remove")]
    Rm { entry: String },
}

#[derive(Subcommand)]
enum PermissionCommands {
    List,
    /// Allow a command (by base name)
    Add { command: String },
    #[command(alias = "remove")]
    Rm { command: String },
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("invalid timeout: {}", e))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("timeout must be a positive number of seconds".to_string());
    }
    Ok(Duration::from_secs_f64(secs))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let debug = matches!(cli.command, Some(Commands::Run { debug: true, .. }));
    let filter = if debug { "warn,amo=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match cli.command {
        Some(Commands::Version) => {
            println!("amo {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init) => {
            if let Err(e) = run_init() {
                log::error!("init failed: {:#}", e);
                std::process::exit(FailureKind::Configuration.exit_code());
            }
        }
        Some(Commands::Run {
            workflow,
            vars,
            input,
            output,
            workflow_help,
            timeout,
            debug: _,
        }) => {
            let vars = RuntimeVariables::builder()
                .var_specs(vars)
                .slot("input", input)
                .slot("output", output)
                .slot("help", workflow_help.then_some("true"))
                .environment(std::env::vars())
                .build();
            if let Err(code) = run_workflow(&workflow, vars, timeout).await {
                std::process::exit(code);
            }
        }
        Some(Commands::Workflow { command }) => {
            if let Err(e) = run_workflow_command(command).await {
                log::error!("workflow command failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Permission { command }) => {
            if let Err(e) = run_permission_command(command) {
                log::error!("permission command failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn paths() -> anyhow::Result<Paths> {
    Paths::from_env().ok_or_else(|| {
        anyhow::anyhow!("cannot determine the amo base directory; set AMO_HOME")
    })
}

fn run_init() -> anyhow::Result<()> {
    let dir = amo::init::init_config_dir(&paths()?)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

/// Returns the process exit code on failure.
async fn run_workflow(
    identifier: &str,
    vars: RuntimeVariables,
    timeout: Option<Duration>,
) -> Result<(), i32> {
    let config = paths()
        .and_then(|p| {
            amo::init::init_config_dir(&p)?;
            UserConfig::load(p)
        })
        .map_err(|e| {
            log::error!("configuration failed: {:#}", e);
            FailureKind::Configuration.exit_code()
        })?;
    let engine = Engine::from_user_config(&config);
    log::debug!("runtime variables: {}", vars.keys().join(", "));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, cancelling workflow");
            on_signal.cancel();
        }
    });

    let mut options = RunOptions::default().with_cancel(cancel);
    if let Some(t) = timeout {
        options = options.with_timeout(t);
    }
    engine
        .run_workflow(identifier, vars, options)
        .await
        .map_err(|e| {
            log::error!("{}", e);
            e.failure_kind().exit_code()
        })
}

async fn run_workflow_command(command: WorkflowCommands) -> anyhow::Result<()> {
    let paths = paths()?;
    let config = UserConfig::load(paths.clone())?;
    let sources = SourceList::new(paths.workflow_sources());
    let downloader = WorkflowDownloader::new(Arc::new(config), sources);

    match command {
        WorkflowCommands::List => {
            let installed = downloader.list_user_workflows()?;
            println!("Installed workflows:");
            if installed.is_empty() {
                println!("  (none)");
            }
            for name in installed {
                println!("  {}", name);
            }
            println!("Bundled workflows:");
            for name in downloader.list_embedded_workflows() {
                println!("  {}", name);
            }
        }
        WorkflowCommands::Get { url, filename } => {
            let path = downloader
                .download_workflow(&url, filename.as_deref())
                .await?;
            println!("installed {}", path.display());
        }
        WorkflowCommands::Source { command } => {
            let sources = downloader.sources();
            match command {
                SourceCommands::List => {
                    for entry in sources.list()? {
                        println!("{}", entry);
                    }
                }
                SourceCommands::Add { entry } => {
                    if sources.add(&entry)? {
                        println!("added {}", entry.trim().to_ascii_lowercase());
                    } else {
                        println!("{} is already allowed", entry.trim());
                    }
                }
                SourceCommands::Rm { entry } => {
                    if sources.remove(&entry)? {
                        println!("removed {}", entry.trim().to_ascii_lowercase());
                    } else {
                        anyhow::bail!("{} is not in the allowed sources", entry.trim());
                    }
                }
            }
        }
    }
    Ok(())
}

fn run_permission_command(command: PermissionCommands) -> anyhow::Result<()> {
    let path = paths()?.command_whitelist();
    let mut whitelist = CommandWhitelist::load(&path)?;
    match command {
        PermissionCommands::List => {
            if whitelist.is_empty() {
                println!("no commands allowed ({})", path.display());
            }
            for c in whitelist.entries() {
                println!("{}", c);
            }
        }
        PermissionCommands::Add { command } => {
            whitelist.add(&command)?;
            whitelist.save(&path)?;
            println!("allowed {}", command.trim());
        }
        PermissionCommands::Rm { command } => {
            whitelist.remove(&command)?;
            whitelist.save(&path)?;
            println!("removed {}", command.trim());
        }
    }
    Ok(())
}
