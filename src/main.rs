//! armstate CLI entrypoint.
//!
//! This is the main entrypoint for the armstate command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use armstate::arm::{ArmClient, Credential, ResourceProvider};
use armstate::cli::{Cli, Commands, OutputFormatter};
use armstate::config::{
    DEFAULT_AUTHORITY_HOST, InvocationFile, InvocationParser, InvocationValidator, find_config_file,
};
use armstate::error::Result;
use armstate::reconciler::{ReconcileRequest, Reconciler};
use armstate::schema::{ResourceSchema, SchemaCatalog};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

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

/// Initializes the logging system. Logs go to stderr so stdout carries only
/// the result.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Schema { name } => cmd_schema(name.as_deref(), &formatter),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Plan => cmd_plan(cli.config.as_ref(), &formatter).await,
        Commands::Apply { check } => cmd_apply(cli.config.as_ref(), check, &formatter).await,
        Commands::Get => cmd_get(cli.config.as_ref(), &formatter).await,
        Commands::List { next_link } => cmd_list(cli.config.as_ref(), next_link.as_deref(), &formatter).await,
    }
}

/// An invocation loaded and checked against its schema.
struct Loaded {
    invocation: InvocationFile,
    schema: ResourceSchema,
    warnings: Vec<String>,
}

/// Show one schema or the built-in catalog.
fn cmd_schema(name: Option<&str>, formatter: &OutputFormatter) -> Result<()> {
    let catalog = SchemaCatalog::builtin()?;
    let text = match name {
        Some(name) => formatter.format_schema(catalog.get(name)?),
        None => formatter.format_catalog(&catalog),
    };
    emit(&text)
}

/// Validate the invocation file.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let loaded = load(config_path)?;
    let text = formatter.format_validation(&loaded.schema, &loaded.warnings, show_warnings);
    emit(&text)
}

/// Show the plan without executing it.
async fn cmd_plan(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let loaded = load(config_path)?;
    let client = connect(&loaded.invocation).await?;
    let request = ReconcileRequest::from_invocation(&loaded.schema, &loaded.invocation);

    let (plan, _) = reconciler(&client, &loaded.invocation).plan(&request).await?;
    emit(&formatter.format_plan(&plan))
}

/// Reconcile the resource.
async fn cmd_apply(config_path: Option<&PathBuf>, check: bool, formatter: &OutputFormatter) -> Result<()> {
    let loaded = load(config_path)?;
    let client = connect(&loaded.invocation).await?;
    let mut request = ReconcileRequest::from_invocation(&loaded.schema, &loaded.invocation);
    request.check_mode |= check;

    let outcome = reconciler(&client, &loaded.invocation).reconcile(&request).await?;
    info!(
        "{} {} (changed: {})",
        outcome.action, outcome.resource_id, outcome.changed
    );
    emit(&formatter.format_outcome(&outcome, &loaded.schema.output_key))
}

/// Read the resource by identity.
async fn cmd_get(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let loaded = load(config_path)?;
    let client = connect(&loaded.invocation).await?;
    let request = ReconcileRequest::from_invocation(&loaded.schema, &loaded.invocation);

    let result = reconciler(&client, &loaded.invocation).get(&request).await?;
    emit(&formatter.format_query(&result, &loaded.schema.output_key))
}

/// List resources in the schema's scope.
async fn cmd_list(config_path: Option<&PathBuf>, next_link: Option<&str>, formatter: &OutputFormatter) -> Result<()> {
    let loaded = load(config_path)?;
    let client = connect(&loaded.invocation).await?;
    let request = ReconcileRequest::from_invocation(&loaded.schema, &loaded.invocation);

    let result = reconciler(&client, &loaded.invocation)
        .list(&request, next_link)
        .await?;
    emit(&formatter.format_query(&result, &loaded.schema.output_key))
}

/// Loads, resolves and validates the invocation.
fn load(config_path: Option<&PathBuf>) -> Result<Loaded> {
    let config_file = resolve_config_path(config_path)?;
    info!("Using invocation: {}", config_file.display());

    let parser = InvocationParser::for_file(&config_file);
    parser.load_dotenv()?;
    let invocation = parser.load_with_env(&config_file)?;

    let mut catalog = SchemaCatalog::builtin()?;
    let schema_path = parser.schema_path(&invocation);
    let schema = catalog
        .resolve(invocation.resource.resource_type.as_deref(), schema_path.as_deref())?
        .clone();
    debug!("Resolved schema {} ({})", schema.name, schema.resource_type);

    let result = InvocationValidator::new().validate(&invocation, &schema)?;
    Ok(Loaded {
        invocation,
        schema,
        warnings: result.warnings,
    })
}

/// Acquires a token and builds the ARM client.
async fn connect(invocation: &InvocationFile) -> Result<ArmClient> {
    let settings = &invocation.provider;
    let credential = Credential::from_env()?;

    let authority = if settings.authority_host.is_empty() {
        DEFAULT_AUTHORITY_HOST
    } else {
        settings.authority_host.as_str()
    };
    let token = credential
        .token(authority, &settings.endpoint, settings.request_timeout())
        .await?;

    Ok(ArmClient::new(&settings.endpoint, &token, settings.request_timeout())?
        .with_polling(settings.poll_interval(), settings.lro_timeout()))
}

fn reconciler<'a, P: ResourceProvider>(provider: &'a P, invocation: &InvocationFile) -> Reconciler<'a, P> {
    Reconciler::new(provider, invocation.provider.read_policy())
}

/// Writes the result to stdout. Logs stay on stderr.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if text.ends_with('\n') {
        write!(stdout, "{text}")?;
    } else {
        writeln!(stdout, "{text}")?;
    }
    stdout.flush()?;
    Ok(())
}

/// Resolves the invocation file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        return Ok(path.clone());
    }

    let cwd = std::env::current_dir()?;
    find_config_file(Path::new(&cwd))
}
