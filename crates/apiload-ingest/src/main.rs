//! apiload-ingest - load API endpoints into PostgreSQL

use anyhow::{bail, Result};
use apiload_common::logging::{init_logging, LogConfig, LogLevel};
use apiload_ingest::{
    ApiClient, EndpointCatalog, EndpointDescriptor, Paginator, PgStore, Settings,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "apiload-ingest")]
#[command(author, version, about = "Load paginated API endpoints into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Endpoint catalog (defaults to ENDPOINTS_PATH or endpoints.json)
    #[arg(short, long, global = true)]
    catalog: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and persist endpoints; every catalog entry when no selector is given
    Run {
        /// Only the endpoint with this action
        #[arg(short, long, conflicts_with = "resource")]
        action: Option<String>,

        /// Only the endpoint(s) with this resource path
        #[arg(short, long)]
        resource: Option<String>,
    },

    /// Print the catalog entries
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("apiload-ingest")
        .filter_directives("sqlx=warn,hyper=warn,reqwest=info")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::List => {
            let path = catalog_path(cli.catalog);
            let catalog = EndpointCatalog::load(&path)?;
            for endpoint in catalog.all() {
                println!(
                    "{:<28} {:<40} {}",
                    endpoint.action, endpoint.resource, endpoint.pagination_type
                );
            }
            Ok(())
        },
        Command::Run { action, resource } => {
            let mut settings = Settings::load()?;
            if let Some(path) = cli.catalog {
                settings.ingest.endpoints_path = path;
            }
            run(settings, action.as_deref(), resource.as_deref()).await
        },
    }
}

fn catalog_path(explicit: Option<PathBuf>) -> PathBuf {
    dotenvy::dotenv().ok();
    explicit.unwrap_or_else(|| {
        PathBuf::from(apiload_common::env::string_or(
            "ENDPOINTS_PATH",
            apiload_ingest::config::DEFAULT_ENDPOINTS_PATH,
        ))
    })
}

async fn run(settings: Settings, action: Option<&str>, resource: Option<&str>) -> Result<()> {
    let catalog = EndpointCatalog::load(&settings.ingest.endpoints_path)?;
    let selected: Vec<&EndpointDescriptor> = match (action, resource) {
        (Some(action), _) => vec![catalog.find_by_action(action)?],
        (None, Some(resource)) => catalog.find_by_resource(resource)?,
        (None, None) => catalog.all().iter().collect(),
    };

    let client = ApiClient::new(&settings.api)?;
    let store = PgStore::connect(&settings.database, &settings.ingest.numeric_columns).await?;
    let paginator = Paginator::new(client, store, settings.ingest.clone());

    info!(endpoints = selected.len(), "Starting ingestion");

    let mut failures = Vec::new();
    for endpoint in selected {
        match paginator.run(endpoint).await {
            Ok(summary) if summary.is_clean() => {},
            Ok(summary) => {
                error!(
                    action = %summary.action,
                    failed_batches = summary.batches_failed,
                    "Endpoint finished with failed batches"
                );
                failures.push(summary.action);
            },
            Err(e) => {
                error!(action = %endpoint.action, error = %e, "Endpoint failed");
                failures.push(endpoint.action.clone());
            },
        }
    }

    if !failures.is_empty() {
        bail!("{} endpoint(s) failed: {}", failures.len(), failures.join(", "));
    }

    info!("Ingestion complete");
    Ok(())
}
