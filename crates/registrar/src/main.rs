//! ACME Registrar - Main entry point
//!
//! Registers, inspects and deactivates the ACME accounts named in the
//! configuration file.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use acme_registrar::{
    AccountKey, AccountManager, AccountSpec, ApplyOutcome, Deletion, ExternalAccountBinding,
    FileAccountStore, HttpClientFactory,
};
use registrar_config::{AccountConfig, Config};

/// ACME account lifecycle manager
#[derive(Parser, Debug)]
#[command(name = "acme-registrar")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "ACME_REGISTRAR_CONFIG")]
    config: String,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration file and exit
    Test,
    /// Register the account, or confirm it still exists
    Register {
        /// Account name from the configuration
        name: String,
    },
    /// Show the CA-visible state of the account
    Status {
        /// Account name from the configuration
        name: String,
    },
    /// Deactivate the account and forget its record
    Deactivate {
        /// Account name from the configuration
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let config = Config::from_file(&cli.config).context("Failed to load configuration file")?;
    let config = &config;

    match cli.command {
        Commands::Test => test_config(&cli.config, config),
        Commands::Register { name } => run(config, |manager| async move {
            register(&manager, config, &name).await
        }),
        Commands::Status { name } => run(config, |manager| async move {
            status(&manager, &name).await
        }),
        Commands::Deactivate { name } => run(config, |manager| async move {
            deactivate(&manager, &name).await
        }),
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_target(false).init(),
    }
}

type Manager = AccountManager<HttpClientFactory, FileAccountStore>;

/// Build the manager and drive one async command to completion
fn run<F, Fut>(config: &Config, command: F) -> Result<()>
where
    F: FnOnce(Manager) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    config.validate().context("Configuration validation failed")?;

    let factory =
        HttpClientFactory::new(&config.acme).context("Failed to build ACME HTTP client")?;
    let store = FileAccountStore::new(&config.storage.path).with_context(|| {
        format!(
            "Failed to open account storage at {}",
            config.storage.path.display()
        )
    })?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(command(AccountManager::new(factory, store)))
}

/// Test configuration file and exit
fn test_config(path: &str, config: &Config) -> Result<()> {
    let result = config.validate().context("Configuration validation failed")?;

    for warning in &result.warnings {
        warn!("{}", warning.message);
    }

    info!("Configuration test successful:");
    info!("  - directory {}", config.acme.directory_url);
    info!("  - storage {}", config.storage.path.display());
    info!("  - {} account(s)", config.accounts.len());

    println!("acme-registrar: configuration file {} test is successful", path);
    Ok(())
}

async fn register(manager: &Manager, config: &Config, name: &str) -> Result<()> {
    let account = config
        .account(name)
        .with_context(|| format!("No account named '{}' in configuration", name))?;
    let spec = account_spec(account).await?;

    let outcome = manager
        .apply(name, spec)
        .await
        .with_context(|| format!("Failed to register account '{}'", name))?;

    let verb = match &outcome {
        ApplyOutcome::Created(_) => "created",
        ApplyOutcome::Unchanged(_) => "unchanged",
        ApplyOutcome::Replaced { previous_url, .. } => {
            info!(previous_url = %previous_url, "Previous account deactivated");
            "replaced"
        }
    };
    let state = outcome.state();
    println!(
        "{}: {} ({}, status {})",
        name, state.account_url, verb, state.registration.status
    );
    Ok(())
}

async fn status(manager: &Manager, name: &str) -> Result<()> {
    match manager
        .read(name)
        .await
        .with_context(|| format!("Failed to read account '{}'", name))?
    {
        Some(state) => {
            println!("{}: {}", name, state.account_url);
            println!("  status: {}", state.registration.status);
            for contact in &state.registration.contact {
                println!("  contact: {}", contact);
            }
        }
        None => println!("{}: not registered", name),
    }
    Ok(())
}

async fn deactivate(manager: &Manager, name: &str) -> Result<()> {
    let result = manager
        .destroy(name)
        .await
        .with_context(|| format!("Failed to deactivate account '{}'", name))?;

    match result {
        Some(Deletion::Deactivated) => println!("{}: deactivated", name),
        Some(Deletion::AlreadyGone) => println!("{}: already gone at the CA", name),
        None => println!("{}: not registered", name),
    }
    Ok(())
}

/// Build the desired account state from its configuration entry
async fn account_spec(account: &AccountConfig) -> Result<AccountSpec> {
    let pem = read_key_file(&account.key_file).await?;
    let eab = account
        .external_account_binding
        .as_ref()
        .map(|eab| ExternalAccountBinding::new(&eab.key_id, &eab.hmac_base64));

    Ok(AccountSpec::new(
        AccountKey::from_pem(pem),
        &account.email,
        eab,
    ))
}

async fn read_key_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read account key {}", path.display()))
}
