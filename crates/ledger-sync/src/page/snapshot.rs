use super::{AccountsExtractor, PageExtractor, Readiness};
use crate::transaction::date_format;
use crate::{DateTime, Decimal, Result, ScrapedAccount, SyncError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A row as captured from the page. Missing fields mean the row had not
/// finished rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A captured bank page, usable wherever a live page would be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSnapshot {
    pub url: String,
    pub ready: bool,
    pub account_label: Option<String>,
    pub rows: Vec<SnapshotRow>,
    pub accounts: Vec<ScrapedAccount>,
}

impl Default for PageSnapshot {
    fn default() -> Self {
        PageSnapshot {
            url: String::new(),
            ready: true,
            account_label: None,
            rows: Vec::new(),
            accounts: Vec::new(),
        }
    }
}

impl PageSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page snapshot: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse page snapshot: {}", path.display()))
    }

    fn page_readiness(&self) -> Readiness {
        if self.ready {
            Readiness::Ready
        } else {
            Readiness::Loading(format!("{} is still loading", self.url))
        }
    }
}

fn not_ready(row: usize, field: &str) -> anyhow::Error {
    SyncError::NotReady(format!("row {row} has no {field} yet")).into()
}

impl PageExtractor for PageSnapshot {
    type Row = (usize, SnapshotRow);

    fn readiness(&self) -> Readiness {
        self.page_readiness()
    }

    fn row_elements(&self) -> Vec<Self::Row> {
        self.rows.iter().cloned().enumerate().collect()
    }

    fn row_date(&self, (index, row): &Self::Row) -> Result<DateTime> {
        let raw = row.date.as_deref().ok_or_else(|| not_ready(*index, "date"))?;
        date_format::parse(raw).with_context(|| format!("row {index} has an invalid date '{raw}'"))
    }

    fn row_amount(&self, (index, row): &Self::Row) -> Result<Decimal> {
        row.amount.ok_or_else(|| not_ready(*index, "amount"))
    }

    fn row_description(&self, (index, row): &Self::Row) -> Result<String> {
        row.description
            .clone()
            .ok_or_else(|| not_ready(*index, "description"))
    }

    fn page_account_label(&self) -> Result<String> {
        self.account_label
            .clone()
            .ok_or_else(|| SyncError::NotReady("no account shown on page".into()).into())
    }
}

impl AccountsExtractor for PageSnapshot {
    fn readiness(&self) -> Readiness {
        self.page_readiness()
    }

    fn accounts(&self) -> Result<Vec<ScrapedAccount>> {
        if self.accounts.is_empty() {
            return Err(SyncError::NoAccounts.into());
        }
        Ok(self.accounts.clone())
    }
}
