use ledger_sync::AutoRunConfig;
use ledger_sync::autorun::{AutoRunProgress, MemoryAutoRunStore};
use ledger_sync::ledger::{LedgerData, MemoryLedger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, broadcast};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateChange {
    /// The ledger file changed, either through the API or on disk.
    Ledger,
    AutoRun(AutoRunProgress),
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<MemoryLedger>,
    pub auto_run: Arc<MemoryAutoRunStore>,
    pub auto_run_config: AutoRunConfig,
    pub state_change_tx: broadcast::Sender<StateChange>,
    ledger_path: Arc<PathBuf>,
    // held from a ledger mutation until it is saved, so a reload never
    // observes the file in between
    write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        ledger_path: PathBuf,
        auto_run_config: AutoRunConfig,
        state_change_tx: broadcast::Sender<StateChange>,
    ) -> anyhow::Result<Self> {
        let data = LedgerData::load(&ledger_path)?;
        tracing::info!(
            "Loaded {} account(s) and {} transaction(s) from {}",
            data.accounts.len(),
            data.transactions.len(),
            ledger_path.display()
        );

        Ok(Self {
            ledger: Arc::new(MemoryLedger::new(data)),
            auto_run: Arc::new(MemoryAutoRunStore::default()),
            auto_run_config,
            state_change_tx,
            ledger_path: Arc::new(ledger_path),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    pub async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Re-read the ledger file, e.g. after it was edited by hand. Blocks, so
    /// it must not be called from async code.
    pub fn reload(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.blocking_lock();
        let data = LedgerData::load(&self.ledger_path)?;
        if data == self.ledger.snapshot() {
            return Ok(());
        }
        self.ledger.replace(data);
        self.notify(StateChange::Ledger);
        Ok(())
    }

    /// Write the ledger back after a mutation.
    pub fn save(&self) -> anyhow::Result<()> {
        self.ledger.snapshot().save(&self.ledger_path)?;
        self.notify(StateChange::Ledger);
        Ok(())
    }

    pub fn notify(&self, change: StateChange) {
        // no subscribers is fine
        let _ = self.state_change_tx.send(change);
    }
}
