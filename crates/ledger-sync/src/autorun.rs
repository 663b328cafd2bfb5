//! Unattended export of every account, one page load at a time.
//!
//! The run's progress lives in an [`AutoRunStore`] because pages come and go
//! while it runs. Each page load calls one of the `on_*_page` steps, which
//! reads the progress, does its part and advances it.

use crate::ledger::RemoteLedger;
use crate::page::{self, AccountsExtractor, PageExtractor};
use crate::session::PageSession;
use crate::{AutoRunConfig, MatchConfig, Result, ScrapedAccount, SyncError, error};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoRunState {
    #[default]
    Idle,
    /// Waiting for the accounts listing.
    Accounts,
    /// Waiting for an account's transactions page.
    Transactions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoRunProgress {
    pub state: AutoRunState,
    pub last_account_completed: Option<String>,
}

impl AutoRunProgress {
    pub fn start(&mut self, single_account_bank: bool) {
        self.state = if single_account_bank {
            AutoRunState::Transactions
        } else {
            AutoRunState::Accounts
        };
        self.last_account_completed = None;
    }

    /// Advance past `state`. Ignored unless the run is currently in `state`.
    pub fn complete(&mut self, state: AutoRunState) {
        if self.state != state {
            tracing::debug!("Ignoring completion of {state:?} while in {:?}", self.state);
            return;
        }
        self.state = match state {
            AutoRunState::Accounts => AutoRunState::Transactions,
            AutoRunState::Transactions | AutoRunState::Idle => AutoRunState::Idle,
        };
    }

    /// Record `account` as done and go back to the accounts listing.
    pub fn increment_tx_account(&mut self, account: String) {
        self.last_account_completed = Some(account);
        self.state = AutoRunState::Accounts;
    }

    pub fn finish(&mut self) {
        *self = AutoRunProgress::default();
    }
}

#[async_trait]
pub trait AutoRunStore: Send + Sync {
    async fn progress(&self) -> Result<AutoRunProgress>;
    async fn complete(&self, state: AutoRunState) -> Result<AutoRunProgress>;
    async fn increment_tx_account(&self, account: String) -> Result<AutoRunProgress>;
    async fn finish(&self) -> Result<AutoRunProgress>;
}

#[async_trait]
impl<T: AutoRunStore + ?Sized> AutoRunStore for &T {
    async fn progress(&self) -> Result<AutoRunProgress> {
        (**self).progress().await
    }

    async fn complete(&self, state: AutoRunState) -> Result<AutoRunProgress> {
        (**self).complete(state).await
    }

    async fn increment_tx_account(&self, account: String) -> Result<AutoRunProgress> {
        (**self).increment_tx_account(account).await
    }

    async fn finish(&self) -> Result<AutoRunProgress> {
        (**self).finish().await
    }
}

#[derive(Debug, Default)]
pub struct MemoryAutoRunStore {
    progress: Mutex<AutoRunProgress>,
}

impl MemoryAutoRunStore {
    pub fn new(progress: AutoRunProgress) -> Self {
        MemoryAutoRunStore {
            progress: Mutex::new(progress),
        }
    }

    pub fn start(&self, single_account_bank: bool) -> AutoRunProgress {
        let mut progress = self.lock();
        progress.start(single_account_bank);
        progress.clone()
    }

    pub fn snapshot(&self) -> AutoRunProgress {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, AutoRunProgress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut AutoRunProgress)) -> AutoRunProgress {
        let mut progress = self.lock();
        f(&mut progress);
        progress.clone()
    }
}

#[async_trait]
impl AutoRunStore for MemoryAutoRunStore {
    async fn progress(&self) -> Result<AutoRunProgress> {
        Ok(self.snapshot())
    }

    async fn complete(&self, state: AutoRunState) -> Result<AutoRunProgress> {
        Ok(self.update(|p| p.complete(state)))
    }

    async fn increment_tx_account(&self, account: String) -> Result<AutoRunProgress> {
        Ok(self.update(|p| p.increment_tx_account(account)))
    }

    async fn finish(&self) -> Result<AutoRunProgress> {
        Ok(self.update(AutoRunProgress::finish))
    }
}

/// Moves the browser between the bank's pages.
pub trait Navigator {
    fn open_account(&mut self, account: &ScrapedAccount) -> Result<()>;
    fn back_to_accounts(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// No run is waiting for this kind of page.
    Inactive,
    NotReady,
    AlreadyScraped,
    OpenedAccount(String),
    ReturnedToAccounts { completed: String },
    Finished,
    /// The step failed; the next page change tries again.
    Aborted(String),
}

/// The account after `last_completed` in listing order.
///
/// `None` once every account is done, and also when `last_completed` is no
/// longer listed, so a renamed account ends the run instead of restarting it.
pub fn next_account<'a>(
    accounts: &'a [ScrapedAccount],
    last_completed: Option<&str>,
) -> Option<&'a ScrapedAccount> {
    match last_completed {
        None => accounts.first(),
        Some(name) => {
            let position = accounts.iter().position(|a| a.name == name)?;
            accounts.get(position + 1)
        }
    }
}

pub struct AutoRunCoordinator<S, L, N> {
    store: S,
    session: PageSession<L>,
    navigator: N,
    config: AutoRunConfig,
}

impl<S, L, N> AutoRunCoordinator<S, L, N>
where
    S: AutoRunStore,
    L: RemoteLedger,
    N: Navigator,
{
    pub fn new(store: S, ledger: L, navigator: N, match_config: MatchConfig, config: AutoRunConfig) -> Self {
        AutoRunCoordinator {
            store,
            session: PageSession::new(ledger, match_config, config),
            navigator,
            config,
        }
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn session_mut(&mut self) -> &mut PageSession<L> {
        &mut self.session
    }

    pub fn on_url_change(&mut self, url: &str) -> bool {
        self.session.on_url_change(url)
    }

    /// One step on the accounts listing: export the accounts on the first
    /// visit, then open the next account or end the run.
    pub async fn on_accounts_page<A>(&mut self, page: &A) -> StepOutcome
    where
        A: AccountsExtractor + ?Sized,
    {
        let result = self.accounts_step(page).await;
        settle_step(result)
    }

    async fn accounts_step<A>(&mut self, page: &A) -> Result<StepOutcome>
    where
        A: AccountsExtractor + ?Sized,
    {
        let progress = self.store.progress().await?;
        if progress.state != AutoRunState::Accounts {
            return Ok(StepOutcome::Inactive);
        }

        let accounts = match progress.last_account_completed {
            None => self.session.export_accounts(page).await?,
            Some(_) => {
                page::ensure_ready(page.readiness())?;
                page.accounts()?
            }
        };

        let Some(next) = next_account(&accounts, progress.last_account_completed.as_deref()) else {
            tracing::info!("Auto run exported all {} account(s)", accounts.len());
            self.store.finish().await?;
            return Ok(StepOutcome::Finished);
        };

        self.store.complete(AutoRunState::Accounts).await?;
        tracing::info!("Auto run opening {}", next.name);
        self.navigator.open_account(next)?;
        Ok(StepOutcome::OpenedAccount(next.name.clone()))
    }

    /// One step on a transactions page: export it and move on.
    pub async fn on_transactions_page<E>(&mut self, page: &E) -> StepOutcome
    where
        E: PageExtractor + ?Sized,
    {
        let result = self.transactions_step(page).await;
        settle_step(result)
    }

    async fn transactions_step<E>(&mut self, page: &E) -> Result<StepOutcome>
    where
        E: PageExtractor + ?Sized,
    {
        let progress = self.store.progress().await?;
        if progress.state != AutoRunState::Transactions {
            return Ok(StepOutcome::Inactive);
        }
        page::ensure_ready(page.readiness())?;

        let outcome = self.session.export_transactions(page, true).await?;

        if self.config.single_account_bank {
            self.store.complete(AutoRunState::Transactions).await?;
            tracing::info!("Auto run finished with {}", outcome.account.name);
            return Ok(StepOutcome::Finished);
        }

        let completed = outcome.account.name;
        self.store.increment_tx_account(completed.clone()).await?;
        self.navigator.back_to_accounts()?;
        Ok(StepOutcome::ReturnedToAccounts { completed })
    }
}

fn settle_step(result: Result<StepOutcome>) -> StepOutcome {
    let error = match result {
        Ok(outcome) => return outcome,
        Err(error) => error,
    };
    match error::classify(&error) {
        Some(SyncError::NotReady(reason)) => {
            tracing::debug!("Page is not ready for scraping: {reason}");
            StepOutcome::NotReady
        }
        Some(SyncError::AlreadyScraped) => {
            tracing::debug!("Already scraped. Stopping.");
            StepOutcome::AlreadyScraped
        }
        _ => {
            tracing::warn!("Will try again on next draw: {error:#}");
            StepOutcome::Aborted(format!("{error:#}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerData, MemoryLedger};
    use crate::page::{PageSnapshot, SnapshotRow};

    #[derive(Debug, Default)]
    struct RecordingNavigator {
        visits: Vec<String>,
    }

    impl Navigator for RecordingNavigator {
        fn open_account(&mut self, account: &ScrapedAccount) -> Result<()> {
            self.visits.push(account.name.clone());
            Ok(())
        }

        fn back_to_accounts(&mut self) -> Result<()> {
            self.visits.push("accounts".into());
            Ok(())
        }
    }

    fn scraped_account(name: &str, number: &str) -> ScrapedAccount {
        ScrapedAccount {
            name: name.into(),
            account_number: number.into(),
            opening_balance: None,
        }
    }

    fn accounts_page() -> PageSnapshot {
        PageSnapshot {
            url: "https://bank.example/app/accounts".into(),
            accounts: vec![
                scraped_account("Visa ...1111", "1111"),
                scraped_account("Chequing ...2222", "2222"),
            ],
            ..PageSnapshot::default()
        }
    }

    fn transactions_page(label: &str, description: &str) -> PageSnapshot {
        PageSnapshot {
            url: "https://bank.example/app/transactions".into(),
            account_label: Some(label.into()),
            rows: vec![SnapshotRow {
                date: Some("2023-01-02".into()),
                amount: Some("-3.00".parse().unwrap()),
                description: Some(description.into()),
            }],
            ..PageSnapshot::default()
        }
    }

    fn multi_account() -> AutoRunConfig {
        AutoRunConfig {
            single_account_bank: false,
            ..AutoRunConfig::default()
        }
    }

    #[test]
    fn next_account_walks_listing_once() {
        let accounts = accounts_page().accounts;
        assert_eq!(next_account(&accounts, None).unwrap().name, "Visa ...1111");
        assert_eq!(
            next_account(&accounts, Some("Visa ...1111")).unwrap().name,
            "Chequing ...2222"
        );
        assert_eq!(next_account(&accounts, Some("Chequing ...2222")), None);
        assert_eq!(next_account(&accounts, Some("Closed ...9999")), None);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut progress = AutoRunProgress::default();
        progress.start(false);
        progress.complete(AutoRunState::Transactions);
        assert_eq!(progress.state, AutoRunState::Accounts);
        progress.complete(AutoRunState::Accounts);
        assert_eq!(progress.state, AutoRunState::Transactions);
    }

    #[tokio::test]
    async fn multi_account_run_visits_every_account() {
        let store = MemoryAutoRunStore::default();
        let ledger = MemoryLedger::default();
        store.start(false);
        let mut run = AutoRunCoordinator::new(
            &store,
            &ledger,
            RecordingNavigator::default(),
            MatchConfig::default(),
            multi_account(),
        );

        let accounts = accounts_page();
        let steps = [
            run.on_accounts_page(&accounts).await,
            {
                run.on_url_change("https://bank.example/app/transactions?account=1");
                run.on_transactions_page(&transactions_page("Visa ...1111", "Coffee"))
                    .await
            },
            run.on_accounts_page(&accounts).await,
            {
                run.on_url_change("https://bank.example/app/accounts");
                run.on_url_change("https://bank.example/app/transactions?account=2");
                run.on_transactions_page(&transactions_page("Chequing ...2222", "Rent"))
                    .await
            },
            run.on_accounts_page(&accounts).await,
        ];

        assert_eq!(
            steps,
            [
                StepOutcome::OpenedAccount("Visa ...1111".into()),
                StepOutcome::ReturnedToAccounts {
                    completed: "Visa ...1111".into()
                },
                StepOutcome::OpenedAccount("Chequing ...2222".into()),
                StepOutcome::ReturnedToAccounts {
                    completed: "Chequing ...2222".into()
                },
                StepOutcome::Finished,
            ]
        );
        assert_eq!(
            run.navigator().visits,
            ["Visa ...1111", "accounts", "Chequing ...2222", "accounts"]
        );
        assert_eq!(store.snapshot(), AutoRunProgress::default());

        let data = ledger.snapshot();
        assert_eq!(data.accounts.len(), 2);
        assert_eq!(data.transactions.len(), 2);
    }

    #[tokio::test]
    async fn single_account_run_finishes_after_one_page() {
        let store = MemoryAutoRunStore::default();
        let ledger = MemoryLedger::new(LedgerData {
            accounts: vec![crate::RemoteAccount {
                id: "1".into(),
                name: "Visa ...1111".into(),
                account_number: Some("1111".into()),
                opening_balance: None,
            }],
            ..Default::default()
        });
        store.start(true);
        let mut run = AutoRunCoordinator::new(
            &store,
            &ledger,
            RecordingNavigator::default(),
            MatchConfig::default(),
            AutoRunConfig::default(),
        );
        let page = transactions_page("Visa ...1111", "Coffee");

        assert_eq!(run.on_transactions_page(&page).await, StepOutcome::Finished);
        assert_eq!(run.on_transactions_page(&page).await, StepOutcome::Inactive);
        assert_eq!(store.snapshot().state, AutoRunState::Idle);
        assert!(run.navigator().visits.is_empty());
        assert_eq!(ledger.snapshot().transactions.len(), 1);
    }

    #[tokio::test]
    async fn unready_or_scraped_pages_keep_state() {
        let store = MemoryAutoRunStore::default();
        let ledger = MemoryLedger::new(LedgerData {
            accounts: vec![crate::RemoteAccount {
                id: "1".into(),
                name: "Visa ...1111".into(),
                account_number: Some("1111".into()),
                opening_balance: None,
            }],
            ..Default::default()
        });
        store.start(true);
        let mut run = AutoRunCoordinator::new(
            &store,
            &ledger,
            RecordingNavigator::default(),
            MatchConfig::default(),
            AutoRunConfig::default(),
        );

        let loading = PageSnapshot {
            ready: false,
            ..transactions_page("Visa ...1111", "Coffee")
        };
        assert_eq!(run.on_transactions_page(&loading).await, StepOutcome::NotReady);

        let page = transactions_page("Visa ...1111", "Coffee");
        run.session_mut().export_transactions(&page, false).await.unwrap();
        assert_eq!(
            run.on_transactions_page(&page).await,
            StepOutcome::AlreadyScraped
        );
        assert_eq!(store.snapshot().state, AutoRunState::Transactions);

        let unknown = transactions_page("Savings ...3333", "Coffee");
        run.on_url_change("https://bank.example/app/transactions?account=3");
        assert!(matches!(
            run.on_transactions_page(&unknown).await,
            StepOutcome::Aborted(_)
        ));
        assert_eq!(store.snapshot().state, AutoRunState::Transactions);
    }
}
