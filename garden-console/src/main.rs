//! garden-console: operator CLI for the botanical garden staff API
//!
//! Thin shell over `garden-sync`:
//! - Resolves the API base URL the same way the web console does
//! - Reads the bearer credential from `--token`, `GARDEN_COOKIES` or the data directory
//! - Degrades sector ↔ species writes to local state when the backend lacks them

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info};

use garden_sync::{
    AvailabilityStore, BlobRegistry, Credential, CredentialResolver, FileStore, GardenApiClient,
    NetworkContext, ReqwestTransport, StaticCookies, SyncConfig,
};

use cli::{Commands, Console};

#[derive(Parser)]
#[command(name = "garden-console")]
#[command(about = "Operator CLI for the botanical garden staff API")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "garden-console.toml")]
    config: String,

    /// Data directory (holds the persisted credential)
    #[arg(short, long, env = "GARDEN_DATA_DIR", default_value = ".garden")]
    data_dir: PathBuf,

    /// API base URL (overrides resolution)
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token for this run
    #[arg(long, env = "GARDEN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Cookie string to read credentials from
    #[arg(long, env = "GARDEN_COOKIES", hide_env_values = true)]
    cookies: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("garden_console=info".parse()?)
                .add_directive("garden_sync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // File first, then GARDEN_* variables on top
    let config = if std::path::Path::new(&cli.config).exists() {
        let content = std::fs::read_to_string(&cli.config)?;
        SyncConfig::from_toml_str(&content)?
    } else {
        debug!("Config file {} not found, using defaults", cli.config);
        SyncConfig::default()
    }
    .with_env_from(|key| std::env::var(key).ok());

    let resolver = config.endpoint_resolver();
    let context = match cli.api_url {
        Some(url) => NetworkContext::detached().with_override(url),
        None => NetworkContext::detached(),
    };
    let base_url = resolver.resolve(&context)?;
    info!("API: {}", base_url);

    let mut credentials = CredentialResolver::new(&config)
        .with_store(Arc::new(FileStore::new(cli.data_dir.join("credentials.json"))));
    if let Some(cookies) = cli.cookies {
        credentials = credentials.with_cookies(Arc::new(StaticCookies::new(cookies)));
    }

    let transport = Arc::new(ReqwestTransport::new(&config)?);
    let api = GardenApiClient::with_credentials(transport, base_url, credentials, config);
    if let Some(token) = cli.token {
        api.set_session_credential(Some(Credential::from_context(token)));
    }

    let console = Console {
        resolver,
        api: Arc::new(api),
        gates: Arc::new(AvailabilityStore::new()),
        registry: BlobRegistry::new(),
    };

    match cli::execute_command(&console, cli.command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", cli::describe_error(&e));
            std::process::exit(1);
        }
    }
}
