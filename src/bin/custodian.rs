use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use time::OffsetDateTime;

use custodian::{Confirm, Custodian, CustodianConfig, Error, JsonDirectory};

#[derive(Parser)]
#[command(name = "custodian", version)]
#[command(about = "Archive data of departed accounts and expire old archives")]
struct Cli {
    /// JSON config file (missing keys use defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Overrides {
    /// Directory holding one folder per account
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Archive store for artifacts and manifests
    #[arg(long, global = true)]
    archive_root: Option<PathBuf>,

    /// Folder-sizing worker threads
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Close a batch once it reaches this many MB
    #[arg(long, global = true)]
    max_archive_mb: Option<f64>,

    /// Log progress every N accounts
    #[arg(long, global = true)]
    progress_every: Option<usize>,

    /// Log one line per account
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log run-level messages
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide, size, archive and then expire old archives
    Run {
        /// JSON document of account attributes keyed by account id
        #[arg(long)]
        directory: PathBuf,

        /// Process only the first N accounts
        #[arg(long)]
        limit: Option<usize>,

        /// Evaluate and size but do not archive
        #[arg(long)]
        dry_run: bool,

        /// Ask before moving any data
        #[arg(long, conflicts_with = "yes")]
        confirm: bool,

        /// Never ask, even if the config requests confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Only expire archives past the archive retention window
    Sweep,
}

struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, accounts: usize, size_mb: f64) -> bool {
        print!("About to archive {accounts} accounts ({size_mb:.3} MB). Continue? [yes|no]: ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => answer.trim() == "yes",
            Err(_) => false,
        }
    }
}

fn load_config(cli: &Cli) -> Result<CustodianConfig> {
    let mut config = match &cli.config {
        Some(path) => CustodianConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CustodianConfig::default(),
    };

    let overrides = &cli.overrides;
    if let Some(data_root) = &overrides.data_root {
        config.data_root = data_root.clone();
    }
    if let Some(archive_root) = &overrides.archive_root {
        config.archive_root = archive_root.clone();
    }
    if let Some(workers) = overrides.workers {
        config.worker_threads = workers;
    }
    if let Some(max) = overrides.max_archive_mb {
        config.max_archive_size_mb = max;
    }
    if let Some(every) = overrides.progress_every {
        config.progress_interval = Some(every);
    }
    if overrides.verbose {
        config.verbose = true;
    }
    if overrides.quiet {
        config.verbose = false;
    }

    if let Commands::Run {
        limit,
        dry_run,
        confirm,
        yes,
        ..
    } = &cli.command
    {
        if limit.is_some() {
            config.account_limit = *limit;
        }
        if *dry_run {
            config.disable_archiving = true;
        }
        if *confirm {
            config.confirm_before_archive = true;
        }
        if *yes {
            config.confirm_before_archive = false;
        }
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(config.verbose);

    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());

    match &cli.command {
        Commands::Run { directory, .. } => {
            let lookup = JsonDirectory::open(directory);
            let mut custodian = Custodian::new(config, lookup)?;
            match custodian.run(now, &mut StdinConfirm) {
                Ok(report) => {
                    if report.has_errors() {
                        for error in &report.errors {
                            log::warn!("{error}");
                        }
                    }
                }
                Err(Error::Cancelled) => {
                    log::info!("archive cancelled by operator, nothing was moved");
                }
                Err(err) => return Err(err).context("custodian run aborted"),
            }
        }
        Commands::Sweep => {
            let lookup = JsonDirectory::from_entries(Default::default());
            let custodian = Custodian::new(config, lookup)?;
            let report = custodian.sweep(now.date())?;
            log::info!(
                "scanned {} entries, removed {} expired archives",
                report.scanned,
                report.deleted.len()
            );
        }
    }
    Ok(())
}
