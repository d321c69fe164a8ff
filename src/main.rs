//! sgw CLI entrypoint.
//!
//! This is the main entrypoint for the sgw command-line tool.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sgw_alerts::cli::{Cli, Commands, OutputFormatter, StateCommands};
use sgw_alerts::config::{
    expand_stack, find_config_file, ConfigParser, ConfigValidator, StackConfig, ValidationResult,
};
use sgw_alerts::error::{ConfigError, ReconcileError, Result, SgwError};
use sgw_alerts::graph::DependencyGraph;
use sgw_alerts::inventory::{gateways_input, InventoryBuilder, SnapshotCatalog};
use sgw_alerts::model::{render, ResourceAddress, ResourceSpec, Stack};
use sgw_alerts::planner::DeploymentPlan;
use sgw_alerts::provider::{topic_arn, LocalControlPlane, DEFAULT_ACCOUNT_ID, WORLD_FILE};
use sgw_alerts::reconciler::{ReconciliationResult, Reconciler};
use sgw_alerts::state::{generate_holder_id, open_store, StackState, StateStore, STATE_DIR};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over `--verbose`. Logs go to stderr so
/// command output on stdout stays machine-readable.
fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_ref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config, warnings, &formatter),
        Commands::Render { resource } => cmd_render(config, resource.as_deref(), &formatter).await,
        Commands::Graph => cmd_graph(config, &formatter),
        Commands::Plan { detailed } => cmd_plan(config, detailed, &formatter).await,
        Commands::Apply { yes, continue_on_error } => cmd_apply(config, yes, continue_on_error, &formatter).await,
        Commands::Drift => cmd_drift(config, &formatter).await,
        Commands::Destroy { yes, target, cascade } => cmd_destroy(config, yes, &target, cascade, &formatter).await,
        Commands::State { command } => cmd_state(config, command, &formatter).await,
        Commands::Inventory {
            snapshot,
            out,
            emit_gateways,
        } => cmd_inventory(&snapshot, out.as_deref(), emit_gateways, &formatter).await,
    }
}

/// Initialize a new stack.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new stack in: {}", path.display());

    let config_path = path.join("sgw.stack.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Stack file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/sgw.stack.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    let state_entry = format!("{STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", state_entry.as_str()]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# sgw")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_entry}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nStack initialized. Next steps:");
    eprintln!("  1. List your gateways in sgw.stack.yaml (sgw inventory --emit-gateways)");
    eprintln!("  2. Copy .env.example to .env and adjust inputs");
    eprintln!("  3. Run: sgw plan");
    Ok(())
}

/// Validate the stack file.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let (_config, stack, result) = load_stack(&config_file)?;
    println!("{}", formatter.format_validation(&result, &stack, show_warnings));

    if result.is_valid() {
        Ok(())
    } else {
        Err(validation_failed(&result))
    }
}

/// Show rendered documents.
async fn cmd_render(config_path: Option<&PathBuf>, resource: Option<&str>, formatter: &OutputFormatter) -> Result<()> {
    let ctx = StackContext::load(config_path).await?;
    let state = ctx.store.load().await?;
    let identities = predicted_identities(&ctx.stack, state.as_ref());

    let filter = resource
        .map(|r| ResourceAddress::parse(r).map_err(SgwError::internal))
        .transpose()?;
    if let Some(address) = &filter
        && !ctx.stack.contains(address)
    {
        return Err(SgwError::internal(format!("Resource {address} is not declared")));
    }

    let mut rendered = BTreeMap::new();
    for spec in &ctx.stack.resources {
        let address = spec.address();
        if filter.as_ref().is_some_and(|f| *f != address) {
            continue;
        }
        rendered.insert(address, render(spec, &identities)?);
    }

    println!("{}", formatter.format_rendered(&rendered));
    Ok(())
}

/// Show the dependency graph.
fn cmd_graph(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    let (_config, stack, result) = load_stack(&config_file)?;
    if !result.is_valid() {
        return Err(validation_failed(&result));
    }

    let graph = DependencyGraph::from_stack(&stack);
    let order = graph.creation_order()?;
    println!("{}", formatter.format_graph(&graph, &order));
    Ok(())
}

/// Show the plan.
async fn cmd_plan(config_path: Option<&PathBuf>, detailed: bool, formatter: &OutputFormatter) -> Result<()> {
    let ctx = StackContext::load(config_path).await?;
    let holder = generate_holder_id();
    let reconciler = Reconciler::new(&ctx.stack, ctx.store.as_ref(), &ctx.provider, &holder);

    let changes = reconciler.plan().await?;
    println!("{}", formatter.format_plan(&changes.plan));

    if detailed && changes.diff.has_changes() {
        println!("{}", formatter.format_diff(&changes.diff));
    }

    Ok(())
}

/// Apply the plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let ctx = StackContext::load(config_path).await?;
    let holder = generate_holder_id();
    let reconciler = Reconciler::new(&ctx.stack, ctx.store.as_ref(), &ctx.provider, &holder)
        .with_continue_on_error(continue_on_error);

    let changes = reconciler.plan().await?;
    if changes.plan.is_empty() {
        eprintln!("No changes to apply.");
        return Ok(());
    }

    if !formatter.is_json() {
        eprintln!("{}", formatter.format_plan(&changes.plan));
    }

    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    // Planned again under the lock; state may have moved since the preview.
    let result = reconciler.apply().await?;
    println!("{}", formatter.format_reconciliation(&result));
    into_exit(&result)
}

/// Check for drift.
async fn cmd_drift(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let ctx = StackContext::load(config_path).await?;
    let holder = generate_holder_id();
    let reconciler = Reconciler::new(&ctx.stack, ctx.store.as_ref(), &ctx.provider, &holder);

    let report = reconciler.check_drift().await?;
    println!("{}", formatter.format_drift(&report));
    Ok(())
}

/// Destroy applied resources.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    targets: &[String],
    cascade: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let ctx = StackContext::load(config_path).await?;

    let targets = targets
        .iter()
        .map(|t| ResourceAddress::parse(t).map_err(SgwError::internal))
        .collect::<Result<Vec<_>>>()?;

    let Some(state) = ctx.store.load().await? else {
        eprintln!("No state found, nothing to destroy.");
        return Ok(());
    };

    let preview = DeploymentPlan::destroy(&state, &targets, cascade)?;
    if preview.is_empty() {
        eprintln!("Nothing to destroy.");
        return Ok(());
    }

    eprintln!("The following resources will be destroyed:");
    for action in &preview.actions {
        let identity = state.get(&action.address).map_or("", |r| r.identity.as_str());
        eprintln!("  - {} ({identity})", action.address);
    }

    if !auto_approve && !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")? {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    let holder = generate_holder_id();
    let reconciler = Reconciler::new(&ctx.stack, ctx.store.as_ref(), &ctx.provider, &holder);
    let result = reconciler.destroy(&targets, cascade).await?;
    println!("{}", formatter.format_reconciliation(&result));
    into_exit(&result)
}

/// State management commands.
async fn cmd_state(config_path: Option<&PathBuf>, command: StateCommands, formatter: &OutputFormatter) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    let (config, _stack, _result) = load_stack(&config_file)?;
    let store = open_store(&config.state, config_dir(&config_file)).await?;

    match command {
        StateCommands::Show => {
            if let Some(state) = store.load().await? {
                println!("{}", formatter.format_state(&state));
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(generate_holder_id);
            let lock = store.acquire_lock(&holder, "manual").await?;
            eprintln!("State locked: {} (expires {})", lock.lock_id, lock.expires_at);
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                match store.force_unlock().await? {
                    Some(lock) => eprintln!("State forcefully unlocked (was held by {}).", lock.holder),
                    None => eprintln!("State is not locked."),
                }
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

/// Report gateway status and file share access.
async fn cmd_inventory(
    snapshot: &Path,
    out: Option<&Path>,
    emit_gateways: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let catalog = SnapshotCatalog::load(snapshot).await?;
    let builder = InventoryBuilder::new(&catalog);

    let statuses = builder.gateway_status().await?;

    if emit_gateways {
        let input = BTreeMap::from([("gateways", gateways_input(&statuses))]);
        let yaml = serde_yaml::to_string(&input).map_err(|e| SgwError::internal(e.to_string()))?;
        println!("{yaml}");
    } else {
        println!("{}", formatter.format_gateway_status(&statuses));
    }

    if let Some(path) = out {
        let report = builder.share_report().await?;
        report.export(path).await?;
        eprintln!(
            "Wrote {} file shares across {} gateways to {}",
            report.share_count(),
            report.gateways.len(),
            path.display()
        );
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Everything a command needs to talk to state and the control plane.
struct StackContext {
    stack: Stack,
    store: Box<dyn StateStore>,
    provider: LocalControlPlane,
}

impl StackContext {
    /// Loads and validates the stack, then opens state and the control plane.
    async fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let config_file = resolve_config_path(config_path)?;
        let (config, stack, result) = load_stack(&config_file)?;
        if !result.is_valid() {
            return Err(validation_failed(&result));
        }

        let base_dir = config_dir(&config_file);
        let store = open_store(&config.state, base_dir).await?;

        let world = base_dir
            .join(config.state.path.as_deref().unwrap_or(STATE_DIR))
            .join(WORLD_FILE);
        debug!("Using control plane at {}", world.display());
        let provider = LocalControlPlane::open(
            &world,
            &config.project.region,
            config.project.account_id.as_deref(),
        )
        .await?;

        Ok(Self { stack, store, provider })
    }
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Returns the directory containing the stack file.
fn config_dir(config_file: &Path) -> &Path {
    config_file.parent().unwrap_or_else(|| Path::new("."))
}

/// Parses, expands, and validates the stack file.
fn load_stack(config_file: &Path) -> Result<(StackConfig, Stack, ValidationResult)> {
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(config_file));
    parser.load_dotenv()?;

    let config = parser.load_with_env(config_file)?;
    let stack = expand_stack(&config)?;
    let result = ConfigValidator::new().validate(&config, &stack)?;

    Ok((config, stack, result))
}

fn validation_failed(result: &ValidationResult) -> SgwError {
    let messages: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
    SgwError::Config(ConfigError::ValidationError {
        message: messages.join("; "),
        field: result.errors.first().map(|e| e.field.clone()),
    })
}

/// Identities to render with: recorded ones first, predicted ones otherwise.
fn predicted_identities(stack: &Stack, state: Option<&StackState>) -> BTreeMap<ResourceAddress, String> {
    let account = stack.project.account_id.as_deref().unwrap_or(DEFAULT_ACCOUNT_ID);
    let mut identities = BTreeMap::new();

    for spec in &stack.resources {
        let address = spec.address();
        let recorded = state.and_then(|s| s.get(&address)).map(|r| r.identity.clone());
        let identity = recorded.unwrap_or_else(|| match spec {
            ResourceSpec::Topic(topic) => topic_arn(&stack.project.region, account, &topic.name),
            ResourceSpec::Policy(policy) => topic_arn(&stack.project.region, account, &policy.target.name),
            ResourceSpec::Alarm(alarm) => alarm.name.clone(),
        });
        identities.insert(address, identity);
    }

    identities
}

/// Prompts on stderr and compares the answer.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Turns a failed run into an error so the process exits nonzero.
fn into_exit(result: &ReconciliationResult) -> Result<()> {
    if result.success {
        return Ok(());
    }

    let Some(failure) = result.first_failure() else {
        return Err(ReconcileError::Aborted {
            reason: result.errors.join("; "),
        }
        .into());
    };

    let (resource_type, name) = failure
        .address
        .split_once('.')
        .unwrap_or(("resource", failure.address.as_str()));
    Err(ReconcileError::ResourceApplyFailed {
        resource_type: resource_type.to_string(),
        name: name.to_string(),
        reason: failure.error.clone().unwrap_or_default(),
    }
    .into())
}
