mod config;
mod show;

use std::io::IsTerminal as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory as _, Parser, Subcommand};
use ledger_sync::autorun::{
    AutoRunCoordinator, AutoRunProgress, MemoryAutoRunStore, Navigator, StepOutcome,
};
use ledger_sync::ledger::{LedgerData, MemoryLedger};
use ledger_sync::page::PageSnapshot;
use ledger_sync::present::{DELETE_LABEL, ReconciliationPresenter, STORE_LABEL};
use ledger_sync::session::PageSession;
use ledger_sync::{AutoRunConfig, MatchConfig, ScrapedAccount};

use config::Config;
use show::TerminalSurface;

const DEFAULT_LEDGER_FILE: &str = "ledger.json";

#[derive(Parser)]
#[command(
    name = "ledger-sync",
    about = "Reconcile scraped bank pages against a personal finance ledger"
)]
#[command(disable_help_subcommand = true)]
struct Args {
    /// Config file. Defaults to ledger-sync.toml or .ledger-sync.toml in the
    /// current directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ledger file, overriding the config
    #[arg(short, long)]
    ledger: Option<PathBuf>,

    /// Scrape and report, but never write to the ledger
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the background service (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = ledger_sync_web::DEFAULT_PORT)]
        port: u16,
    },
    /// Compare a captured transactions page with the ledger
    Scan {
        /// Captured page, as JSON
        #[arg(short, long)]
        page: PathBuf,
        /// Store transactions that are only on the page
        #[arg(long)]
        store_missing: bool,
        /// Delete transactions that are only in the ledger
        #[arg(long)]
        delete_extra: bool,
    },
    /// Store every transaction of a captured page in the ledger
    Export {
        #[arg(short, long)]
        page: PathBuf,
    },
    /// Store the accounts of a captured accounts page in the ledger
    Accounts {
        #[arg(short, long)]
        page: PathBuf,
    },
    /// Export all accounts unattended, one page at a time
    #[command(subcommand)]
    AutoRun(AutoRunCommand),
}

#[derive(Subcommand)]
enum AutoRunCommand {
    /// Begin a new run
    Start,
    /// Run the step for one captured page
    Step {
        #[arg(short, long)]
        page: PathBuf,
    },
    /// Show the progress of the current run
    Status,
}

pub async fn run(args: impl IntoIterator<Item = String>) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ledger_sync=info,ledger_sync_cli=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    clap_complete::CompleteEnv::with_factory(Args::command).complete();

    let args = Args::parse_from(args);
    let config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::find_and_load()?.unwrap_or_default(),
    };
    let ledger_file = args
        .ledger
        .clone()
        .or_else(|| config.ledger_file().map(ToOwned::to_owned))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_FILE));
    let mut auto_run = config.auto_run;
    auto_run.dry_run |= args.dry_run;

    let command = args.command.unwrap_or(Commands::Serve {
        port: ledger_sync_web::DEFAULT_PORT,
    });
    match command {
        Commands::Serve { port } => ledger_sync_web::run(ledger_file, auto_run, port).await,
        Commands::Scan {
            page,
            store_missing,
            delete_extra,
        } => {
            if auto_run.dry_run && (store_missing || delete_extra) {
                tracing::warn!("Dry run: leaving the ledger untouched");
            }
            let ledger = LedgerFile::open(ledger_file)?;
            let mut session = PageSession::new(&ledger.ledger, config.matching, auto_run);
            let fix = !auto_run.dry_run;
            scan(&mut session, &page, store_missing && fix, delete_extra && fix).await?;
            ledger.save_if_changed()
        }
        Commands::Export { page } => {
            let ledger = LedgerFile::open(ledger_file)?;
            let mut session = PageSession::new(&ledger.ledger, config.matching, auto_run);
            let page = PageSnapshot::load(&page)?;
            session.on_url_change(&page.url);
            let outcome = session.export_transactions(&page, false).await?;
            match outcome.stored {
                Some(stored) => println!(
                    "{}: stored {} transaction(s), skipped {} duplicate(s)",
                    outcome.account.name,
                    stored.created.len(),
                    stored.duplicates
                ),
                None => {
                    for transaction in &outcome.transactions {
                        println!("{}", transaction.transaction);
                    }
                }
            }
            ledger.save_if_changed()
        }
        Commands::Accounts { page } => {
            let ledger = LedgerFile::open(ledger_file)?;
            let session = PageSession::new(&ledger.ledger, config.matching, auto_run);
            let page = PageSnapshot::load(&page)?;
            for account in session.export_accounts(&page).await? {
                println!("{} ({})", account.name, account.account_number);
            }
            ledger.save_if_changed()
        }
        Commands::AutoRun(command) => {
            let state_file = ledger_file.with_extension("auto-run.json");
            let progress = load_progress(&state_file)?;
            let progress = match command {
                AutoRunCommand::Start => {
                    let mut progress = progress;
                    progress.start(auto_run.single_account_bank);
                    progress
                }
                AutoRunCommand::Status => progress,
                AutoRunCommand::Step { page } => {
                    let ledger = LedgerFile::open(ledger_file)?;
                    let store = MemoryAutoRunStore::new(progress);
                    let page = PageSnapshot::load(&page)?;
                    let outcome =
                        auto_run_step(&store, &ledger.ledger, &page, config.matching, auto_run)
                            .await;
                    println!("{outcome:?}");
                    ledger.save_if_changed()?;
                    store.snapshot()
                }
            };
            println!(
                "Auto run: {:?}, last completed account: {}",
                progress.state,
                progress.last_account_completed.as_deref().unwrap_or("-")
            );
            save_progress(&state_file, &progress)
        }
    }
}

async fn scan(
    session: &mut PageSession<&MemoryLedger>,
    page: &Path,
    store_missing: bool,
    delete_extra: bool,
) -> Result<()> {
    let page = PageSnapshot::load(page)?;
    session.on_url_change(&page.url);
    let scan = session.scan_transactions(&page).await?;
    println!("{}", scan.account.name);

    let mut presenter = ReconciliationPresenter::new(TerminalSurface::for_page(&scan.reconciliation));
    presenter.present(&scan.reconciliation);

    let wanted: Vec<_> = presenter
        .surface()
        .actions()
        .into_iter()
        .filter(|(_, label)| {
            (*label == STORE_LABEL && store_missing) || (*label == DELETE_LABEL && delete_extra)
        })
        .map(|(action, _)| action)
        .collect();
    for action in wanted {
        if let Some(Err(e)) = presenter.activate(action, session.ledger()).await {
            tracing::warn!("{e:#}");
        }
    }

    print!("{}", presenter.surface().render(std::io::stdout().is_terminal()));
    show::print_summary(&scan.reconciliation);
    Ok(())
}

async fn auto_run_step(
    store: &MemoryAutoRunStore,
    ledger: &MemoryLedger,
    page: &PageSnapshot,
    match_config: MatchConfig,
    config: AutoRunConfig,
) -> StepOutcome {
    let mut run = AutoRunCoordinator::new(store, ledger, PrintNavigator, match_config, config);
    run.on_url_change(&page.url);
    if page.accounts.is_empty() {
        run.on_transactions_page(page).await
    } else {
        run.on_accounts_page(page).await
    }
}

/// Tells the user where to go next, since there is no browser to drive.
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn open_account(&mut self, account: &ScrapedAccount) -> Result<()> {
        println!("Next: open the transactions of {}", account.name);
        Ok(())
    }

    fn back_to_accounts(&mut self) -> Result<()> {
        println!("Next: go back to the accounts page");
        Ok(())
    }
}

struct LedgerFile {
    path: PathBuf,
    loaded: LedgerData,
    ledger: MemoryLedger,
}

impl LedgerFile {
    fn open(path: PathBuf) -> Result<Self> {
        let loaded = LedgerData::load(&path)?;
        Ok(LedgerFile {
            path,
            ledger: MemoryLedger::new(loaded.clone()),
            loaded,
        })
    }

    fn save_if_changed(&self) -> Result<()> {
        let data = self.ledger.snapshot();
        if data == self.loaded {
            return Ok(());
        }
        tracing::info!("Writing {}", self.path.display());
        data.save(&self.path)
    }
}

fn load_progress(path: &Path) -> Result<AutoRunProgress> {
    if !path.exists() {
        return Ok(AutoRunProgress::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read auto run state: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse auto run state: {}", path.display()))
}

fn save_progress(path: &Path, progress: &AutoRunProgress) -> Result<()> {
    let contents = serde_json::to_string_pretty(progress)?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write auto run state: {}", path.display()))
}
