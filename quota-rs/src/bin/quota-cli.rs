//! CLI for checking and consuming download quotas
//!
//! Acts as one browser profile: the anonymous client id and the cached
//! counts live in a local profile file, the counters in SQLite or on a
//! remote quota-rs server.
//!
//! # Usage
//!
//! ```bash
//! # Download song sheet 42 anonymously
//! quota-cli download 42
//!
//! # Download as a signed-in account against a remote server
//! quota-cli --account user-1 --remote http://localhost:8090 download 42
//!
//! # Show remaining downloads this month
//! quota-cli --account user-1 status
//!
//! # Mark an account as donor (local database only)
//! quota-cli mark-donor user-1
//!
//! # List this month's counters (local database only)
//! quota-cli report
//! ```

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use quota_rs::download::{AssetTransfer, DownloadGate, PromptSurface};
use quota_rs::identity::StaticSession;
use quota_rs::quota::{
    open_pool, Decision, DonorDirectory, HttpDonorDirectory, HttpQuotaStore, Period,
    ProfileCache, QuotaStore, QuotaTracker, SqliteDonorDirectory, SqliteQuotaStore,
};
use quota_rs::{logging, Config};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "quota-cli")]
#[command(about = "Check and consume monthly download quotas", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Profile file holding the client id and cached counts
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Signed-in account id; anonymous when omitted
    #[arg(short, long)]
    account: Option<String>,

    /// Base URL of a quota-rs server instead of the local database
    #[arg(short, long)]
    remote: Option<String>,

    /// Print decisions as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a download of a song sheet
    Download {
        /// Numeric asset id
        asset: String,
    },
    /// Show usage for the current month
    Status,
    /// Sync the profile's cached count with the server
    Refresh,
    /// Print the resolved identity
    Whoami,
    /// Mark an account as donor
    MarkDonor {
        /// Account id
        account: String,
    },
    /// List counters for a month
    Report {
        /// Month key (YYYY-MM), defaults to the current month
        #[arg(long)]
        period: Option<String>,
    },
}

/// Prints what the browser would fetch
struct ConsoleTransfer;

#[async_trait]
impl AssetTransfer for ConsoleTransfer {
    async fn trigger(&self, asset_id: u64) -> quota_rs::Result<()> {
        println!("Downloading song sheet #{}", asset_id);
        Ok(())
    }
}

/// Prints the blocking prompt and its remediation route
struct ConsolePrompt;

impl PromptSurface for ConsolePrompt {
    fn show(&self, decision: &Decision) {
        eprintln!("{}", decision.message());
        if let Some(route) = decision.redirect() {
            eprintln!("Continue at: {}", route);
        }
    }
}

enum Backend {
    Local {
        store: SqliteQuotaStore,
        donors: SqliteDonorDirectory,
    },
    Remote {
        store: HttpQuotaStore,
        donors: HttpDonorDirectory,
    },
}

impl Backend {
    async fn open(cli: &Cli, config: &Config) -> anyhow::Result<Self> {
        if let Some(url) = &cli.remote {
            return Ok(Backend::Remote {
                store: HttpQuotaStore::new(url)?,
                donors: HttpDonorDirectory::new(url)?,
            });
        }

        let pool = open_pool(&config.storage.database_url)
            .await
            .with_context(|| format!("opening {}", config.storage.database_url))?;
        let store = SqliteQuotaStore::new(pool.clone());
        store.init_db().await?;
        let donors = SqliteDonorDirectory::new(pool);
        donors.init_db().await?;

        Ok(Backend::Local { store, donors })
    }

    fn store(&self) -> Arc<dyn QuotaStore> {
        match self {
            Backend::Local { store, .. } => Arc::new(store.clone()),
            Backend::Remote { store, .. } => Arc::new(store.clone()),
        }
    }

    fn donors(&self) -> Arc<dyn DonorDirectory> {
        match self {
            Backend::Local { donors, .. } => Arc::new(donors.clone()),
            Backend::Remote { donors, .. } => Arc::new(donors.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.logging)?;

    let profile_path = cli
        .profile
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.storage.profile_path));
    let profile = Arc::new(ProfileCache::open(&profile_path)?);
    let backend = Backend::open(&cli, &config).await?;

    let tracker = Arc::new(
        QuotaTracker::new(backend.store(), profile.clone())
            .with_limits(config.limits.quota_limits())
            .with_reconcile_policy(config.limits.reconcile)
            .with_routes(config.remediation.clone()),
    );

    let session = match &cli.account {
        Some(account) => StaticSession::signed_in(account.clone()),
        None => StaticSession::anonymous(),
    };

    let gate = DownloadGate::new(
        tracker.clone(),
        Arc::new(session),
        profile.clone(),
        backend.donors(),
        Arc::new(ConsoleTransfer),
        Arc::new(ConsolePrompt),
    );

    match cli.command {
        Commands::Download { ref asset } => {
            let decision = gate.request_download(asset).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else if decision.is_allowed() {
                println!("{}", decision.message());
            }
            if !decision.is_allowed() {
                std::process::exit(2);
            }
        }
        Commands::Status => {
            let identity = gate.identity().await?;
            let has_donated = gate.donor_flag(&identity).await;
            let usage = tracker.status(&identity, has_donated).await;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&usage)?);
            } else {
                match (usage.cap, usage.remaining()) {
                    (Some(cap), Some(remaining)) => println!(
                        "{}: {} of {} downloads used in {} ({} remaining)",
                        identity,
                        usage.used,
                        cap,
                        tracker.current_period(),
                        remaining
                    ),
                    _ => println!(
                        "{}: {} downloads in {} (unlimited)",
                        identity,
                        usage.used,
                        tracker.current_period()
                    ),
                }
            }
        }
        Commands::Refresh => {
            let identity = gate.identity().await?;
            let count = tracker.refresh(&identity).await;
            println!("{}: cached count set to {}", identity, count);
        }
        Commands::Whoami => {
            println!("{}", gate.identity().await?);
        }
        Commands::MarkDonor { ref account } => {
            let Backend::Local { donors, .. } = &backend else {
                bail!("mark-donor only works against the local database");
            };
            donors.set_donor(account, true).await?;
            println!("✓ {} marked as donor", account);
        }
        Commands::Report { ref period } => {
            let Backend::Local { store, .. } = &backend else {
                bail!("report only works against the local database");
            };
            let period: Period = match period {
                Some(key) => key.parse()?,
                None => tracker.current_period(),
            };

            let records = store.list_period(&period).await?;
            if records.is_empty() {
                println!("No downloads recorded in {}", period);
            }
            for record in records {
                println!("{:<48} {:>4}", record.owner().to_string(), record.count);
            }
        }
    }

    Ok(())
}
