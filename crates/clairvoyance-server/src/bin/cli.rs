//! Clairvoyance CLI
//!
//! Maintenance commands for the ontology database and the embedded backend.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use clairvoyance_core::OntologyStore;
use clairvoyance_server::config::AppConfig;
use clairvoyance_server::download::{self, DEFAULT_POCKETBASE_VERSION};
use clairvoyance_server::web::handlers::OntologyPayload;
use clairvoyance_server::{BackendClient, Bootstrapper};

/// Clairvoyance - host maintenance CLI
#[derive(Parser)]
#[command(name = "clairvoyance")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Manage the Clairvoyance ontology store and embedded backend")]
struct Cli {
    /// Ontology database path (overrides ONTOLOGY_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ontology database and apply migrations
    Init,

    /// Inspect or replace the stored ontology
    Ontology {
        #[command(subcommand)]
        command: OntologyCommand,
    },

    /// Talk to the embedded backend
    Backend {
        #[command(subcommand)]
        command: BackendCommand,
    },
}

#[derive(Subcommand)]
enum OntologyCommand {
    /// Print the stored ontology as JSON
    Show,
    /// Replace the stored ontology from a JSON file
    Import {
        /// File holding `{"ontology": {...}}` or the bare ontology
        file: PathBuf,
    },
    /// Show row counts
    Stats,
}

#[derive(Subcommand)]
enum BackendCommand {
    /// Probe the backend health endpoint once
    Health {
        /// Backend base URL (overrides POCKETBASE_URL)
        #[arg(long)]
        url: Option<String>,
    },
    /// Run the admin and schema bootstrap against a running backend
    Bootstrap {
        /// Backend base URL (overrides POCKETBASE_URL)
        #[arg(long)]
        url: Option<String>,
    },
    /// Manage backend backups
    Backup {
        /// Backend base URL (overrides POCKETBASE_URL)
        #[arg(long)]
        url: Option<String>,

        #[command(subcommand)]
        command: BackupCommand,
    },
    /// Download the backend binary for this platform
    Download {
        /// PocketBase release to install
        #[arg(long, default_value = DEFAULT_POCKETBASE_VERSION)]
        version: String,
        /// Install path (overrides POCKETBASE_BIN)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum BackupCommand {
    /// List stored backups, newest first
    List,
    /// Ask the backend to write a new backup
    Create {
        /// Archive name ending in .zip (default: auto-backup-<millis>.zip)
        name: Option<String>,
    },
    /// Restore the backend from a stored backup
    Restore {
        /// Backup key as printed by `list`
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    let config = AppConfig::from_env()?;
    let db = cli.db.unwrap_or_else(|| config.ontology_db.clone());

    match cli.command {
        Commands::Init => run_init(db),
        Commands::Ontology { command } => match command {
            OntologyCommand::Show => run_show(db),
            OntologyCommand::Import { file } => run_import(db, file),
            OntologyCommand::Stats => run_stats(db),
        },
        Commands::Backend { command } => match command {
            BackendCommand::Health { url } => {
                run_health(url.unwrap_or_else(|| config.backend.base_url.clone())).await
            }
            BackendCommand::Bootstrap { url } => {
                let url = url.unwrap_or_else(|| config.backend.base_url.clone());
                run_bootstrap(url, &config).await
            }
            BackendCommand::Backup { url, command } => {
                let url = url.unwrap_or_else(|| config.backend.base_url.clone());
                run_backup(url, command, &config).await
            }
            BackendCommand::Download { version, output } => {
                let output = output.unwrap_or_else(|| config.backend.executable.clone());
                run_download(version, output).await
            }
        },
    }
}

fn open_store(db: &Path) -> anyhow::Result<OntologyStore> {
    OntologyStore::open(db).with_context(|| format!("opening {}", db.display()))
}

fn run_init(db: PathBuf) -> anyhow::Result<()> {
    let store = open_store(&db)?;
    println!("{}", "=== Ontology Database ===".cyan().bold());
    println!("{}: {}", "Path".white().bold(), db.display());
    println!("{}: {}", "Schema Version".white().bold(), store.schema_version()?);
    println!("{}", "Database ready".green().bold());
    Ok(())
}

fn run_show(db: PathBuf) -> anyhow::Result<()> {
    let store = open_store(&db)?;
    let ontology = store.load()?;
    println!("{}", serde_json::to_string_pretty(&ontology)?);
    Ok(())
}

fn run_import(db: PathBuf, file: PathBuf) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;
    let payload: OntologyPayload = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", file.display()))?;

    let store = open_store(&db)?;
    let summary = store.replace(&payload.into_ontology())?;

    println!("{}", "Ontology replaced".green().bold());
    println!("{}: {}", "Superclasses".white(), summary.superclasses);
    println!("{}: {}", "Subclasses".white(), summary.subclasses);
    println!("{}: {}", "Rules".white(), summary.rules);
    Ok(())
}

fn run_stats(db: PathBuf) -> anyhow::Result<()> {
    let store = open_store(&db)?;
    let counts = store.counts()?;

    println!("{}", "=== Ontology Statistics ===".cyan().bold());
    println!();
    println!("{}: {}", "Superclasses".white().bold(), counts.superclasses);
    println!("{}: {}", "Subclasses".white().bold(), counts.subclasses);
    println!("{}: {}", "Rules".white().bold(), counts.rules);
    match store.last_replaced()? {
        Some(at) => {
            let age = chrono::Utc::now().signed_duration_since(at);
            println!(
                "{}: {} ({} hours ago)",
                "Last Replaced".white().bold(),
                at.format("%Y-%m-%d %H:%M:%S"),
                age.num_hours()
            );
        }
        None => println!("{}: {}", "Last Replaced".white().bold(), "never".dimmed()),
    }
    Ok(())
}

async fn run_health(url: String) -> anyhow::Result<()> {
    let client = BackendClient::new(&url)?;
    println!("{}: {}", "Backend".white().bold(), client.base_url());

    match client.health().await {
        Ok(status) if status.is_success() => {
            println!("{}: {}", "Status".white().bold(), "HEALTHY".green().bold());
            Ok(())
        }
        Ok(status) => {
            println!("{}: {}", "Status".white().bold(), "UNHEALTHY".yellow().bold());
            anyhow::bail!("backend answered {}", status)
        }
        Err(e) => {
            println!("{}: {}", "Status".white().bold(), "UNREACHABLE".red().bold());
            Err(e.into())
        }
    }
}

async fn run_bootstrap(url: String, config: &AppConfig) -> anyhow::Result<()> {
    let client = BackendClient::new(&url)?;
    let bootstrap = Bootstrapper::new(client, config.admin.clone());

    println!("Bootstrapping {} as {}...", url, config.admin.email);
    if bootstrap.initialize().await {
        println!("{}", "Backend initialized".green().bold());
        Ok(())
    } else {
        println!("{}", "Backend bootstrap failed".red().bold());
        anyhow::bail!("bootstrap did not complete, see log output")
    }
}

async fn admin_session(url: &str, config: &AppConfig) -> anyhow::Result<(BackendClient, String)> {
    let client = BackendClient::new(url)?;
    let token = Bootstrapper::new(client.clone(), config.admin.clone())
        .authenticate()
        .await
        .with_context(|| format!("authenticating as {}", config.admin.email))?;
    Ok((client, token))
}

async fn run_backup(url: String, command: BackupCommand, config: &AppConfig) -> anyhow::Result<()> {
    let (client, token) = admin_session(&url, config).await?;

    match command {
        BackupCommand::List => {
            let backups = client.list_backups(&token).await?;
            println!("{}", "=== Backups ===".cyan().bold());
            println!();
            if backups.is_empty() {
                println!("{}", "No backups".dimmed());
            }
            for backup in backups {
                println!(
                    "{}  {} bytes  {}",
                    backup.key.as_str().white().bold(),
                    backup.size,
                    backup.modified.as_str().dimmed()
                );
            }
        }
        BackupCommand::Create { name } => {
            let name = client.create_backup(&token, name.as_deref()).await?;
            println!("{}: {}", "Backup created".green().bold(), name);
        }
        BackupCommand::Restore { key } => {
            client.restore_backup(&token, &key).await?;
            println!("{}: {}", "Restore started".green().bold(), key);
            println!("{}", "The backend restarts once the restore is applied".dimmed());
        }
    }
    Ok(())
}

async fn run_download(version: String, output: PathBuf) -> anyhow::Result<()> {
    let target = download::current_target()?;
    let url = download::release_url(download::RELEASES_URL, &version, target);

    println!("Downloading PocketBase {} for {}...", version, target);
    let bytes = download::install_release(&url, &output)
        .await
        .with_context(|| format!("installing {}", url))?;

    println!(
        "{}: {} ({} bytes)",
        "Installed".green().bold(),
        output.display(),
        bytes
    );
    Ok(())
}
