use super::{LedgerError, RemoteLedger, StoreOutcome, StoreRequest, TransactionQuery};
use crate::{
    RemoteAccount, RemoteSplit, RemoteTransaction, Result, ScrapedAccount, TransactionView,
};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Everything a [`MemoryLedger`] holds, in the form it is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerData {
    pub accounts: Vec<RemoteAccount>,
    pub transactions: Vec<RemoteTransaction>,
    pub next_id: u64,
}

impl LedgerData {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(LedgerData::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ledger file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse ledger file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write ledger file: {}", path.display()))
    }

    fn allocate_id(&mut self) -> String {
        // ids from a hand-edited file may be ahead of the counter
        let highest = self
            .transactions
            .iter()
            .map(|t| t.id.as_str())
            .chain(self.accounts.iter().map(|a| a.id.as_str()))
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        self.next_id = self.next_id.max(highest) + 1;
        self.next_id.to_string()
    }

    fn contains_identical(&self, view: &TransactionView) -> bool {
        self.transactions.iter().any(|t| t.view() == *view)
    }
}

/// A ledger kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    data: Mutex<LedgerData>,
}

impl MemoryLedger {
    pub fn new(data: LedgerData) -> Self {
        MemoryLedger {
            data: Mutex::new(data),
        }
    }

    pub fn snapshot(&self) -> LedgerData {
        self.lock().clone()
    }

    pub fn replace(&self, data: LedgerData) {
        *self.lock() = data;
    }

    fn lock(&self) -> MutexGuard<'_, LedgerData> {
        // a panic while holding the lock cannot leave the data half-written
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RemoteLedger for MemoryLedger {
    async fn list_accounts(&self) -> Result<Vec<RemoteAccount>> {
        Ok(self.lock().accounts.clone())
    }

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<RemoteTransaction>> {
        let data = self.lock();
        if !data.accounts.iter().any(|a| a.id == query.account_id) {
            return Err(LedgerError::UnknownAccount(query.account_id.clone()).into());
        }
        let account = Some(query.account_id.as_str());
        let mut transactions: Vec<_> = data
            .transactions
            .iter()
            .filter(|t| t.source_id.as_deref() == account || t.destination_id.as_deref() == account)
            .filter(|t| t.date.date() <= query.end_date.date())
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        transactions.truncate(query.page_size);
        Ok(transactions)
    }

    async fn store_transactions(&self, request: StoreRequest) -> Result<StoreOutcome> {
        let mut data = self.lock();
        let mut outcome = StoreOutcome::default();
        for view in request.transactions {
            if request.error_if_duplicate_hash && data.contains_identical(&view) {
                tracing::debug!("Skipping duplicate transaction {view}");
                outcome.duplicates += 1;
                continue;
            }
            let id = data.allocate_id();
            data.transactions.push(RemoteTransaction {
                id: id.clone(),
                description: view.description,
                kind: view.kind,
                date: view.date,
                splits: vec![RemoteSplit {
                    amount: view.amount,
                }],
                source_id: view.source_id,
                destination_id: view.destination_id,
            });
            outcome.created.push(id);
        }
        tracing::info!(
            "Stored {} transaction(s), skipped {} duplicate(s) (auto run: {})",
            outcome.created.len(),
            outcome.duplicates,
            request.is_auto_run
        );
        Ok(outcome)
    }

    async fn delete_transaction(&self, remote_id: &str) -> Result<()> {
        let mut data = self.lock();
        let position = data
            .transactions
            .iter()
            .position(|t| t.id == remote_id)
            .ok_or_else(|| LedgerError::UnknownTransaction(remote_id.to_owned()))?;
        data.transactions.remove(position);
        Ok(())
    }

    async fn store_accounts(&self, accounts: Vec<ScrapedAccount>) -> Result<()> {
        let mut data = self.lock();
        for account in accounts {
            let known = data
                .accounts
                .iter_mut()
                .find(|known| known.matches_number(&account.account_number));
            match known {
                Some(known) => {
                    known.name = account.name;
                    if account.opening_balance.is_some() {
                        known.opening_balance = account.opening_balance;
                    }
                }
                None => {
                    let id = data.allocate_id();
                    tracing::info!("Creating account {} ({})", account.name, id);
                    data.accounts.push(RemoteAccount {
                        id,
                        name: account.name,
                        account_number: Some(account.account_number),
                        opening_balance: account.opening_balance,
                    });
                }
            }
        }
        Ok(())
    }
}
