//! Cloud Debugger CLI
//!
//! Command-line interface for snapshot breakpoints: list, set and delete them,
//! watch debuggees for changes, and check local sources against a deployment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clouddebug_core::{
    check_sync_stash_state, default_config_path, render_user_error_message, sort_breakpoints,
    DebuggerConfig, ServerBreakpoint, SessionConfig,
};
use clouddebug_sync::{
    BreakpointListener, ClientCache, CloudBreakpointHandler, DebugSession, DebuggerTransport,
    GlobalPoller, HttpTransportFactory, InMemoryBreakpointModel, ListBreakpointsRequest,
    ManagedBreakpoint, ProcessState, ProjectFileResolver, SerialExecutor, SessionRegistry,
    StateController, StaticCredentials,
};

const TOKEN_ENV: &str = "CLOUDDEBUG_ACCESS_TOKEN";
const CLI_PROJECT: &str = "cli";

#[derive(Parser)]
#[command(name = "clouddebug")]
#[command(about = "Cloud Debugger snapshot breakpoint tool")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/clouddebug/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Account to act as (default: first session in the config)
    #[arg(long, global = true)]
    email: Option<String>,

    /// OAuth access token (default: $CLOUDDEBUG_ACCESS_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List snapshot breakpoints of a debuggee
    List {
        #[arg(short, long)]
        debuggee: String,
    },

    /// Watch debuggees and print every breakpoint change (Ctrl-C to stop)
    Watch {
        /// Debuggee to watch (default: sessions from the config)
        #[arg(short, long)]
        debuggee: Option<String>,

        /// Mirror breakpoints into a local project while watching
        #[arg(long, requires = "debuggee")]
        source_root: Option<PathBuf>,
    },

    /// Create a snapshot breakpoint
    Set {
        #[arg(short, long)]
        debuggee: String,

        /// Server path, e.g. com/example/Foo.java
        #[arg(short, long)]
        path: String,

        /// One-based line number
        #[arg(short, long)]
        line: i32,

        #[arg(short, long)]
        condition: Option<String>,

        /// Watch expression (repeatable)
        #[arg(short = 'e', long = "expression")]
        expressions: Vec<String>,
    },

    /// Delete a breakpoint
    Delete {
        #[arg(short, long)]
        debuggee: String,

        id: String,
    },

    /// Print a breakpoint with its captured data as JSON
    Get {
        #[arg(short, long)]
        debuggee: String,

        id: String,
    },

    /// List debuggees of a project
    Debuggees {
        /// Project number
        #[arg(short, long)]
        project: String,
    },

    /// Check local git repositories against the deployed revision
    Validate {
        #[arg(short, long)]
        debuggee: String,

        /// Project number
        #[arg(short, long)]
        project: String,

        /// Local repository (repeatable, default: current directory)
        #[arg(long = "repo")]
        repos: Vec<PathBuf>,
    },
}

/// Resolved configuration and clients shared by all commands
struct CliContext {
    config: DebuggerConfig,
    config_path: Option<PathBuf>,
    email: String,
    clients: Arc<ClientCache>,
}

impl CliContext {
    fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone().or_else(default_config_path);
        let config = match &config_path {
            Some(path) => DebuggerConfig::load_or_default(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => DebuggerConfig::default(),
        };

        let email = cli
            .email
            .clone()
            .or_else(|| config.sessions.iter().find_map(|s| s.user_email.clone()))
            .context("No account given: pass --email or add a session to the config")?;

        let credentials = StaticCredentials::new();
        if let Some(token) = cli.token.clone().or_else(|| std::env::var(TOKEN_ENV).ok()) {
            credentials.set_token(email.as_str(), token);
        }
        let factory = HttpTransportFactory::new(&config, Arc::new(credentials));

        Ok(Self {
            config,
            config_path,
            clients: Arc::new(ClientCache::new(Arc::new(factory))),
            email,
        })
    }

    fn short_client(&self) -> Result<Arc<dyn DebuggerTransport>> {
        self.clients
            .short_timeout_client(Some(&self.email))
            .with_context(|| format!("No access token for {}: pass --token or set {}", self.email, TOKEN_ENV))
    }

    fn controller(&self, debuggee: &str) -> Arc<StateController> {
        let state = Arc::new(ProcessState::new(self.email.as_str(), debuggee));
        StateController::new(state, self.clients.clone(), &self.config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clouddebug=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let ctx = CliContext::load(&cli)?;

    match cli.command {
        Commands::List { debuggee } => cmd_list(&ctx, &debuggee).await?,
        Commands::Watch {
            debuggee,
            source_root,
        } => match (debuggee, source_root) {
            (Some(debuggee), Some(root)) => cmd_mirror(&ctx, &debuggee, root).await?,
            (debuggee, _) => cmd_watch(ctx, debuggee).await?,
        },
        Commands::Set {
            debuggee,
            path,
            line,
            condition,
            expressions,
        } => {
            let mut request = ServerBreakpoint::at(path, line);
            request.condition = condition;
            request.expressions = expressions;
            cmd_set(&ctx, &debuggee, request).await?;
        }
        Commands::Delete { debuggee, id } => cmd_delete(&ctx, &debuggee, &id).await?,
        Commands::Get { debuggee, id } => cmd_get(&ctx, &debuggee, &id).await?,
        Commands::Debuggees { project } => cmd_debuggees(&ctx, &project).await?,
        Commands::Validate {
            debuggee,
            project,
            repos,
        } => cmd_validate(&ctx, &debuggee, &project, repos).await?,
    }

    Ok(())
}

/// One display line for a breakpoint
fn describe(breakpoint: &ServerBreakpoint) -> String {
    let status = match (breakpoint.is_final(), breakpoint.has_error_status()) {
        (_, true) => "ERROR",
        (true, false) => "CAPTURED",
        (false, false) => "PENDING",
    };
    let location = breakpoint
        .location
        .as_ref()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "<no location>".to_string());

    let mut line = format!("{:<9} {:<48} {}", status, location, breakpoint.id);
    if let Some(message) = render_user_error_message(breakpoint.status.as_ref()) {
        line.push_str(&format!("  ({})", message));
    }
    line
}

fn print_breakpoints(breakpoints: &[ServerBreakpoint]) {
    if breakpoints.is_empty() {
        println!("  (no breakpoints)");
    }
    for breakpoint in breakpoints {
        println!("  {}", describe(breakpoint));
    }
}

/// Prints the list of a session whenever it changes
struct PrintingListener;

impl BreakpointListener for PrintingListener {
    fn on_breakpoint_list_changed(&self, state: &Arc<ProcessState>) {
        println!(
            "Breakpoints changed for {}:",
            state.debuggee_id().unwrap_or("<unknown>")
        );
        print_breakpoints(&state.current_server_breakpoint_list());
    }
}

/// List breakpoints once
async fn cmd_list(ctx: &CliContext, debuggee: &str) -> Result<()> {
    let response = ctx
        .short_client()?
        .list_breakpoints(debuggee, &ListBreakpointsRequest::capture(None))
        .await
        .with_context(|| format!("Failed to list breakpoints of {}", debuggee))?;

    let mut breakpoints = response.breakpoints;
    sort_breakpoints(&mut breakpoints);
    println!("{} breakpoints on {}:", breakpoints.len(), debuggee);
    print_breakpoints(&breakpoints);
    Ok(())
}

/// Background-poll debuggees until Ctrl-C, then persist their wait tokens
async fn cmd_watch(ctx: CliContext, debuggee: Option<String>) -> Result<()> {
    let sessions: Vec<SessionConfig> = match debuggee {
        Some(id) => vec![SessionConfig {
            user_email: Some(ctx.email.clone()),
            debuggee_id: Some(id),
            ..Default::default()
        }],
        None => ctx.config.sessions.clone(),
    };
    anyhow::ensure!(!sessions.is_empty(), "Nothing to watch: pass --debuggee or add sessions to the config");

    let registry = Arc::new(SessionRegistry::new());
    let states: Vec<Arc<ProcessState>> = sessions
        .into_iter()
        .map(|config| SessionConfig {
            user_email: config.user_email.or_else(|| Some(ctx.email.clone())),
            ..config
        })
        .map(|config| Arc::new(ProcessState::from_config(&config)))
        .collect();
    for state in &states {
        state.set_listen_in_background(true);
        registry.register(CLI_PROJECT, state.clone());
    }

    let poller = GlobalPoller::new(
        ctx.clients.clone(),
        registry.clone(),
        Duration::from_secs(ctx.config.poll_interval_secs),
    );
    poller.add_listener(Arc::new(PrintingListener));

    println!("Watching {} debuggee(s). Stop with Ctrl-C.", states.len());
    poller.poll_all().await;
    poller.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    poller.stop();

    if let Some(path) = &ctx.config_path {
        let mut config = ctx.config.clone();
        config.sessions = states.iter().map(|state| state.to_config()).collect();
        config
            .save(path)
            .with_context(|| format!("Failed to save config {}", path.display()))?;
        tracing::info!("Saved session state to {}", path.display());
    }
    Ok(())
}

/// Live session against a local project: pending breakpoints appear locally,
/// captured ones are disabled
async fn cmd_mirror(ctx: &CliContext, debuggee: &str, root: PathBuf) -> Result<()> {
    anyhow::ensure!(root.is_dir(), "{} is not a directory", root.display());

    let controller = ctx.controller(debuggee);
    controller.add_listener(Arc::new(PrintingListener));

    let model = Arc::new(InMemoryBreakpointModel::new());
    let handler = Arc::new(CloudBreakpointHandler::new(
        controller,
        model.clone(),
        Arc::new(ProjectFileResolver::new(&root)),
        Arc::new(SerialExecutor::spawn()),
    ));
    let registry = Arc::new(SessionRegistry::new());
    registry.register(CLI_PROJECT, handler.controller().state().clone());

    let session = DebugSession::attach(handler, Some(registry));
    model.set_observer(session.observer());

    println!("Mirroring {} into {}. Stop with Ctrl-C.", debuggee, root.display());
    session.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    session.stop(false);
    session.wait_for_pending().await;
    model.clear_observer();

    println!("{} local breakpoints:", model.len());
    for local in model.breakpoints() {
        if let Some(position) = local.source_position() {
            let state = if local.is_enabled() { "enabled" } else { "disabled" };
            println!("  {}:{} ({})", position.file.display(), position.line + 1, state);
        }
    }
    Ok(())
}

/// Create a breakpoint, replacing pending ones at the same location
async fn cmd_set(ctx: &CliContext, debuggee: &str, request: ServerBreakpoint) -> Result<()> {
    let controller = ctx.controller(debuggee);
    controller.initialize().await;

    let registration = controller
        .set_breakpoint(request)
        .await
        .context("Failed to set breakpoint")?;
    println!("Created breakpoint {}", registration.id);
    if let Some(error) = registration.error {
        println!("Server reported: {}", error);
    }
    Ok(())
}

async fn cmd_delete(ctx: &CliContext, debuggee: &str, id: &str) -> Result<()> {
    ctx.controller(debuggee)
        .delete_breakpoint(id)
        .await
        .with_context(|| format!("Failed to delete breakpoint {}", id))?;
    println!("Deleted breakpoint {}", id);
    Ok(())
}

async fn cmd_get(ctx: &CliContext, debuggee: &str, id: &str) -> Result<()> {
    let breakpoint = ctx
        .controller(debuggee)
        .resolve_breakpoint(id)
        .await
        .with_context(|| format!("Failed to get breakpoint {}", id))?;
    println!("{}", serde_json::to_string_pretty(&breakpoint)?);
    Ok(())
}

async fn cmd_debuggees(ctx: &CliContext, project: &str) -> Result<()> {
    let debuggees = ctx
        .short_client()?
        .list_debuggees(project)
        .await
        .with_context(|| format!("Failed to list debuggees of {}", project))?;

    println!("{} debuggees in {}:", debuggees.len(), project);
    for debuggee in &debuggees {
        let inactive = if debuggee.is_inactive { " (inactive)" } else { "" };
        println!("  {:<40} {}{}", debuggee.id, debuggee.display_name(), inactive);
    }
    Ok(())
}

async fn cmd_validate(ctx: &CliContext, debuggee: &str, project: &str, repos: Vec<PathBuf>) -> Result<()> {
    let debuggees = ctx
        .short_client()?
        .list_debuggees(project)
        .await
        .with_context(|| format!("Failed to list debuggees of {}", project))?;
    let target = debuggees.iter().find(|d| d.id == debuggee);

    let repos = if repos.is_empty() {
        vec![std::env::current_dir().context("Failed to read current directory")?]
    } else {
        repos
    };

    let result = check_sync_stash_state(target, &repos);
    println!("{}", serde_json::to_string_pretty(&result)?);
    println!("Recommended action: {:?}", result.action());
    Ok(())
}
