//! Everything that happens on one loaded bank page: export, scan, and the
//! guard against scraping the same page twice.

use crate::ledger::{RemoteLedger, StoreOutcome, StoreRequest};
use crate::page::{self, AccountsExtractor, PageExtractor};
use crate::reconcile::{MatchEngine, Reconciliation};
use crate::{
    AutoRunConfig, MatchConfig, RemoteAccount, Result, ScrapedAccount, ScrapedTransaction,
    SyncError,
};
use anyhow::Context;

/// Remembers whether the current page load was already exported.
///
/// Only a change of URL (ignoring the query string) re-arms it; page
/// mutations on the same URL do not.
#[derive(Debug, Default)]
pub struct PageGuard {
    url: Option<String>,
    already_scraped: bool,
}

impl PageGuard {
    /// Returns whether the page genuinely changed.
    pub fn observe_url(&mut self, url: &str) -> bool {
        let url = strip_query(url);
        if self.url.as_deref() == Some(url) {
            return false;
        }
        tracing::debug!("Page changed to {url}");
        self.url = Some(url.to_owned());
        self.already_scraped = false;
        true
    }

    pub fn already_scraped(&self) -> bool {
        self.already_scraped
    }

    fn mark_scraped(&mut self) {
        self.already_scraped = true;
    }
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub account: RemoteAccount,
    pub transactions: Vec<ScrapedTransaction>,
    /// `None` in dry-run mode.
    pub stored: Option<StoreOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub account: RemoteAccount,
    pub reconciliation: Reconciliation,
}

pub struct PageSession<L> {
    ledger: L,
    engine: MatchEngine,
    auto_run: AutoRunConfig,
    guard: PageGuard,
}

impl<L: RemoteLedger> PageSession<L> {
    pub fn new(ledger: L, match_config: MatchConfig, auto_run: AutoRunConfig) -> Self {
        PageSession {
            ledger,
            engine: MatchEngine::new(match_config),
            auto_run,
            guard: PageGuard::default(),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn guard(&self) -> &PageGuard {
        &self.guard
    }

    pub fn on_url_change(&mut self, url: &str) -> bool {
        self.guard.observe_url(url)
    }

    async fn page_account<E>(&self, page: &E) -> Result<RemoteAccount>
    where
        E: PageExtractor + ?Sized,
    {
        let accounts = self
            .ledger
            .list_accounts()
            .await
            .context("Failed to list remote accounts")?;
        page::current_page_account(page, &accounts)
    }

    /// Scrape the page and store every row remotely.
    ///
    /// Fails with [`SyncError::AlreadyScraped`] when this page load was
    /// exported before.
    pub async fn export_transactions<E>(&mut self, page: &E, is_auto_run: bool) -> Result<ExportOutcome>
    where
        E: PageExtractor + ?Sized,
    {
        if self.guard.already_scraped() {
            return Err(SyncError::AlreadyScraped.into());
        }

        let account = self.page_account(page).await?;
        let transactions = page::scrape_transactions(page, &account, self.engine.config())?;
        self.guard.mark_scraped();

        if self.auto_run.dry_run {
            tracing::info!(
                "Dry run: not storing {} transaction(s) of {}",
                transactions.len(),
                account.name
            );
            return Ok(ExportOutcome {
                account,
                transactions,
                stored: None,
            });
        }

        let request = StoreRequest {
            transactions: transactions.iter().map(|t| t.transaction.clone()).collect(),
            apply_rules: true,
            error_if_duplicate_hash: true,
            is_auto_run,
        };
        let stored = self
            .ledger
            .store_transactions(request)
            .await
            .with_context(|| format!("Failed to store transactions of {}", account.name))?;
        tracing::info!(
            "Exported {} transaction(s) of {}: {} created, {} duplicate(s)",
            transactions.len(),
            account.name,
            stored.created.len(),
            stored.duplicates
        );

        Ok(ExportOutcome {
            account,
            transactions,
            stored: Some(stored),
        })
    }

    /// Scrape the page, fetch the matching remote window and classify both.
    pub async fn scan_transactions<E>(&self, page: &E) -> Result<ScanOutcome>
    where
        E: PageExtractor + ?Sized,
    {
        let account = self.page_account(page).await?;
        let scraped = page::scrape_transactions(page, &account, self.engine.config())?;
        let remote = self
            .engine
            .fetch_remote_window(&self.ledger, &account.id, &scraped)
            .await?;
        let reconciliation = self.engine.reconcile(&scraped, remote)?;
        Ok(ScanOutcome {
            account,
            reconciliation,
        })
    }

    /// Scrape the accounts listing and store the accounts remotely.
    pub async fn export_accounts<A>(&self, page: &A) -> Result<Vec<ScrapedAccount>>
    where
        A: AccountsExtractor + ?Sized,
    {
        page::ensure_ready(page.readiness())?;
        let accounts = page.accounts()?;
        if self.auto_run.dry_run {
            tracing::info!("Dry run: not storing {} account(s)", accounts.len());
            return Ok(accounts);
        }
        self.ledger
            .store_accounts(accounts.clone())
            .await
            .context("Failed to store accounts")?;
        tracing::info!("Stored {} account(s)", accounts.len());
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerData, MemoryLedger};
    use crate::page::{PageSnapshot, SnapshotRow};
    use crate::{RemoteAccount, TransactionType};

    fn ledger_with_account() -> MemoryLedger {
        MemoryLedger::new(LedgerData {
            accounts: vec![RemoteAccount {
                id: "1".into(),
                name: "Visa ...1234".into(),
                account_number: Some("1234".into()),
                opening_balance: None,
            }],
            ..Default::default()
        })
    }

    fn page(rows: &[(&str, &str, &str)]) -> PageSnapshot {
        PageSnapshot {
            url: "https://bank.example/app/transactions".into(),
            account_label: Some("Visa ...1234".into()),
            rows: rows
                .iter()
                .map(|(date, amount, description)| SnapshotRow {
                    date: Some((*date).into()),
                    amount: Some(amount.parse().unwrap()),
                    description: Some((*description).into()),
                })
                .collect(),
            ..PageSnapshot::default()
        }
    }

    #[test]
    fn guard_ignores_query_changes() {
        let mut guard = PageGuard::default();
        assert!(guard.observe_url("https://bank.example/app/transactions?page=1"));
        guard.mark_scraped();
        assert!(!guard.observe_url("https://bank.example/app/transactions?page=2"));
        assert!(guard.already_scraped());
        assert!(guard.observe_url("https://bank.example/app/accounts"));
        assert!(!guard.already_scraped());
    }

    #[tokio::test]
    async fn export_stores_then_refuses_second_export() {
        let ledger = ledger_with_account();
        let mut session = PageSession::new(&ledger, MatchConfig::default(), AutoRunConfig::default());
        let page = page(&[
            ("2023-01-02", "-12.00", "Coffee"),
            ("2023-01-01", "100.00", "Salary"),
        ]);

        let outcome = session.export_transactions(&page, false).await.unwrap();
        assert_eq!(outcome.account.id, "1");
        assert_eq!(outcome.stored.unwrap().created.len(), 2);

        let stored = ledger.snapshot().transactions;
        assert_eq!(stored[0].kind, TransactionType::Withdrawal);
        assert_eq!(stored[0].source_id.as_deref(), Some("1"));
        assert_eq!(stored[1].kind, TransactionType::Deposit);
        assert_eq!(stored[1].destination_id.as_deref(), Some("1"));

        let error = session.export_transactions(&page, false).await.unwrap_err();
        assert_eq!(
            error.downcast_ref::<SyncError>(),
            Some(&SyncError::AlreadyScraped)
        );
        assert_eq!(ledger.snapshot().transactions.len(), 2);
    }

    #[tokio::test]
    async fn dry_run_stores_nothing() {
        let ledger = ledger_with_account();
        let config = AutoRunConfig {
            dry_run: true,
            ..AutoRunConfig::default()
        };
        let mut session = PageSession::new(&ledger, MatchConfig::default(), config);
        let page = page(&[("2023-01-02", "-12.00", "Coffee")]);

        let outcome = session.export_transactions(&page, true).await.unwrap();
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.stored, None);
        assert!(ledger.snapshot().transactions.is_empty());
        assert!(session.guard().already_scraped());
    }

    #[tokio::test]
    async fn scan_after_export_is_in_sync() {
        let ledger = ledger_with_account();
        let mut session = PageSession::new(&ledger, MatchConfig::default(), AutoRunConfig::default());
        let page = page(&[
            ("2023-01-03", "-4.50", "Bakery"),
            ("2023-01-02", "-12.00", "Coffee"),
            ("2023-01-01", "100.00", "Salary"),
        ]);
        session.export_transactions(&page, false).await.unwrap();

        let scan = session.scan_transactions(&page).await.unwrap();
        assert_eq!(scan.reconciliation.synced.len(), 3);
        assert!(scan.reconciliation.is_in_sync());
    }

    #[tokio::test]
    async fn scan_widens_small_remote_pages() {
        let ledger = ledger_with_account();
        let mut session = PageSession::new(
            &ledger,
            MatchConfig {
                transactions_per_page: 2,
                ..MatchConfig::default()
            },
            AutoRunConfig::default(),
        );
        let page = page(&[
            ("2023-01-04", "-1.00", "D"),
            ("2023-01-03", "-1.00", "C"),
            ("2023-01-02", "-1.00", "B"),
            ("2023-01-01", "-1.00", "A"),
        ]);
        session.export_transactions(&page, false).await.unwrap();

        let scan = session.scan_transactions(&page).await.unwrap();
        assert_eq!(scan.reconciliation.synced.len(), 4);
        assert!(scan.reconciliation.local_only.is_empty());
    }
}
