pub mod autorun;
mod config;
mod error;
pub mod ledger;
pub mod page;
pub mod present;
pub mod reconcile;
pub mod session;
mod sorting;
mod transaction;

pub type Decimal = rust_decimal::Decimal;
pub type DateTime = chrono::NaiveDateTime;

pub use anyhow::Result;
pub use config::{AutoRunConfig, MatchConfig};
pub use error::{SyncError, classify};
pub use transaction::{
    OpeningBalance, RemoteAccount, RemoteSplit, RemoteTransaction, ScrapedAccount,
    ScrapedTransaction, TransactionType, TransactionView, date_format,
};
