use thiserror::Error;

/// Conditions a caller has to tell apart from ordinary failures.
///
/// Everything else travels as a plain [`anyhow::Error`]; these are recovered
/// with `downcast_ref` where the distinction matters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The page (or one of its rows) is still rendering.
    #[error("page is not ready for scraping: {0}")]
    NotReady(String),
    /// The page guard tripped: this page load was already scraped.
    #[error("already scraped this page")]
    AlreadyScraped,
    /// The page is rendered but holds no transactions to work with.
    #[error("page contains no transactions")]
    EmptyPage,
    #[error("no known account matches '{0}'")]
    UnknownAccount(String),
    #[error("page lists no accounts")]
    NoAccounts,
}

/// Look through an [`anyhow::Error`] for a [`SyncError`].
pub fn classify(error: &anyhow::Error) -> Option<&SyncError> {
    error.downcast_ref::<SyncError>()
}
