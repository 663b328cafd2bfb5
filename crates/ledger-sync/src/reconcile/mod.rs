//! Classifying a scraped page of transactions against the remote ledger.

mod matching;

pub use matching::remote_matches_scraped;

use crate::ledger::{RemoteLedger, TransactionQuery};
use crate::sorting::{merge_by_id, sort_dedup_remote};
use crate::{
    DateTime, MatchConfig, RemoteTransaction, Result, ScrapedTransaction, SyncError,
    TransactionView,
};
use anyhow::Context;
use serde::Serialize;

/// How often the remote window is widened when the page shows more
/// transactions than the first fetch returned.
const MAX_WIDENING_PASSES: usize = 2;

/// Where a classified transaction is shown, relative to the page's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "position", content = "row", rename_all = "snake_case")]
pub enum RowAnchor {
    /// The transaction is the row itself.
    Existing(usize),
    /// A synthesized row goes right before this row.
    InsertBefore(usize),
    /// A synthesized row goes right after this row.
    InsertAfter(usize),
}

impl RowAnchor {
    pub fn row(&self) -> usize {
        match *self {
            RowAnchor::Existing(row) | RowAnchor::InsertBefore(row) | RowAnchor::InsertAfter(row) => {
                row
            }
        }
    }

    /// Visual order of anchors: things inserted before a row, the row, things
    /// inserted after it.
    fn sort_key(&self) -> (usize, u8) {
        match *self {
            RowAnchor::InsertBefore(row) => (row, 0),
            RowAnchor::Existing(row) => (row, 1),
            RowAnchor::InsertAfter(row) => (row, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteOnlyReason {
    /// Matched a scraped row that already had a remote counterpart.
    Duplicate { of_row: usize },
    /// Inside the page's date window, but not on the page.
    Missing,
}

/// One classified transaction, positioned for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaTransaction {
    pub transaction: TransactionView,
    /// Set for transactions that exist remotely.
    pub remote_id: Option<String>,
    pub anchor: RowAnchor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_only: Option<RemoteOnlyReason>,
}

impl MetaTransaction {
    fn scraped(scraped: &ScrapedTransaction, remote_id: Option<String>) -> Self {
        MetaTransaction {
            transaction: scraped.transaction.clone(),
            remote_id,
            anchor: RowAnchor::Existing(scraped.row),
            remote_only: None,
        }
    }

    fn remote_only(remote: RemoteTransaction, anchor: RowAnchor, reason: RemoteOnlyReason) -> Self {
        MetaTransaction {
            transaction: remote.view(),
            remote_id: Some(remote.id),
            anchor,
            remote_only: Some(reason),
        }
    }
}

/// The outcome of one scan. Rebuilt from scratch every time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub synced: Vec<MetaTransaction>,
    pub local_only: Vec<MetaTransaction>,
    pub remote_only: Vec<MetaTransaction>,
    /// Fetched remote transactions older than anything on the page.
    pub outside_window: Vec<RemoteTransaction>,
}

impl Reconciliation {
    pub fn is_in_sync(&self) -> bool {
        self.local_only.is_empty() && self.remote_only.is_empty()
    }

    /// Synced, local-only and remote-only entries in display order.
    pub fn rows(&self) -> Vec<&MetaTransaction> {
        let mut rows: Vec<_> = self
            .synced
            .iter()
            .chain(&self.local_only)
            .chain(&self.remote_only)
            .collect();
        rows.sort_by_key(|meta| meta.anchor.sort_key());
        rows
    }
}

pub struct MatchEngine {
    config: MatchConfig,
}

impl MatchEngine {
    pub fn new(config: MatchConfig) -> Self {
        MatchEngine { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Fetch the remote transactions covering the scraped page.
    ///
    /// The first request ends at the newest scraped date. While the page still
    /// shows more rows than were fetched, the window is widened with requests
    /// ending at a row further down the page, merging results by id. Requests
    /// are issued one after another.
    pub async fn fetch_remote_window<L>(
        &self,
        ledger: &L,
        account_id: &str,
        scraped: &[ScrapedTransaction],
    ) -> Result<Vec<RemoteTransaction>>
    where
        L: RemoteLedger + ?Sized,
    {
        let newest = scraped
            .iter()
            .map(|s| s.transaction.date)
            .max()
            .ok_or(SyncError::EmptyPage)?;

        let query = |end_date: DateTime| TransactionQuery {
            account_id: account_id.to_owned(),
            end_date,
            page_size: self.config.transactions_per_page,
        };

        let mut remote = ledger
            .list_transactions(&query(newest))
            .await
            .context("Failed to list remote transactions")?;

        let mut boundary = scraped.len() / 2;
        for pass in 1..=MAX_WIDENING_PASSES {
            if scraped.len() <= remote.len() {
                break;
            }
            let end_date = scraped[boundary].transaction.date;
            let more = ledger
                .list_transactions(&query(end_date))
                .await
                .context("Failed to widen remote transaction window")?;
            let added = merge_by_id(&mut remote, more);
            tracing::debug!(
                "Widening pass {pass} ending {end_date}: {added} new, {} scraped vs {} remote",
                scraped.len(),
                remote.len()
            );
            boundary = (boundary + scraped.len()) / 2;
        }

        Ok(remote)
    }

    /// Classify every scraped and every remote transaction.
    ///
    /// Scraped rows claim matches in display order; a claimed remote
    /// transaction is gone for later rows. Matches beyond the first become
    /// duplicate candidates. Unclaimed remote transactions less than a day
    /// older than the oldest scraped row are remote-only, anything older lies
    /// outside the page's window.
    pub fn reconcile(
        &self,
        scraped: &[ScrapedTransaction],
        mut remote: Vec<RemoteTransaction>,
    ) -> Result<Reconciliation> {
        let oldest = scraped
            .iter()
            .map(|s| s.transaction.date)
            .min()
            .ok_or(SyncError::EmptyPage)?;
        let window_start = oldest - matching::FUZZY_DATE_TOLERANCE;

        sort_dedup_remote(&mut remote);
        let mut result = Reconciliation::default();

        for item in scraped {
            let (matched, rest): (Vec<_>, Vec<_>) = remote.into_iter().partition(|candidate| {
                matching::remote_matches_scraped(candidate, &item.transaction, &self.config)
            });
            remote = rest;

            let mut matched = matched.into_iter();
            match matched.next() {
                Some(first) => {
                    result
                        .synced
                        .push(MetaTransaction::scraped(item, Some(first.id)));
                    for extra in matched {
                        tracing::debug!("Duplicate remote transaction {} for row {}", extra.id, item.row);
                        result.remote_only.push(MetaTransaction::remote_only(
                            extra,
                            RowAnchor::InsertAfter(item.row),
                            RemoteOnlyReason::Duplicate { of_row: item.row },
                        ));
                    }
                }
                None => result.local_only.push(MetaTransaction::scraped(item, None)),
            }
        }

        for leftover in remote {
            if leftover.date <= window_start {
                result.outside_window.push(leftover);
                continue;
            }
            let anchor = insertion_anchor(scraped, leftover.date);
            result.remote_only.push(MetaTransaction::remote_only(
                leftover,
                anchor,
                RemoteOnlyReason::Missing,
            ));
        }
        result.remote_only.sort_by_key(|meta| meta.anchor.sort_key());

        tracing::info!(
            "Reconciled {} scraped transaction(s): {} synced, {} local only, {} remote only",
            scraped.len(),
            result.synced.len(),
            result.local_only.len(),
            result.remote_only.len()
        );
        Ok(result)
    }
}

// Right before the scraped row with the closest date at or after `date`; ties
// go to the row furthest down the page. Without such a row, before the first.
fn insertion_anchor(scraped: &[ScrapedTransaction], date: DateTime) -> RowAnchor {
    let nearest = scraped
        .iter()
        .rev()
        .filter(|s| s.transaction.date >= date)
        .min_by_key(|s| s.transaction.date);
    match (nearest, scraped.first()) {
        (Some(row), _) | (None, Some(row)) => RowAnchor::InsertBefore(row.row),
        (None, None) => RowAnchor::InsertBefore(0),
    }
}
