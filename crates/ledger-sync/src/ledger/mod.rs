//! The remote personal-finance ledger, as seen from a bank page.

mod memory;

pub use memory::{LedgerData, MemoryLedger};

use crate::{DateTime, RemoteAccount, RemoteTransaction, Result, ScrapedAccount, TransactionView};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Selects the newest `page_size` transactions of an account dated on or
/// before `end_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub account_id: String,
    pub end_date: DateTime,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRequest {
    pub transactions: Vec<TransactionView>,
    pub apply_rules: bool,
    pub error_if_duplicate_hash: bool,
    pub is_auto_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub created: Vec<String>,
    /// Transactions rejected because an identical one already exists.
    pub duplicates: usize,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unknown transaction '{0}'")]
    UnknownTransaction(String),
    #[error("unknown account '{0}'")]
    UnknownAccount(String),
}

#[async_trait]
pub trait RemoteLedger: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<RemoteAccount>>;
    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<RemoteTransaction>>;
    async fn store_transactions(&self, request: StoreRequest) -> Result<StoreOutcome>;
    async fn delete_transaction(&self, remote_id: &str) -> Result<()>;
    async fn store_accounts(&self, accounts: Vec<ScrapedAccount>) -> Result<()>;
}

#[async_trait]
impl<T: RemoteLedger + ?Sized> RemoteLedger for &T {
    async fn list_accounts(&self) -> Result<Vec<RemoteAccount>> {
        (**self).list_accounts().await
    }

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<RemoteTransaction>> {
        (**self).list_transactions(query).await
    }

    async fn store_transactions(&self, request: StoreRequest) -> Result<StoreOutcome> {
        (**self).store_transactions(request).await
    }

    async fn delete_transaction(&self, remote_id: &str) -> Result<()> {
        (**self).delete_transaction(remote_id).await
    }

    async fn store_accounts(&self, accounts: Vec<ScrapedAccount>) -> Result<()> {
        (**self).store_accounts(accounts).await
    }
}
