//! Reading typed records off a bank page.
//!
//! The selectors themselves are page specific and live behind
//! [`PageExtractor`] and [`AccountsExtractor`]. This module turns what they
//! return into transactions in the ledger's sign convention.

mod snapshot;

pub use snapshot::{PageSnapshot, SnapshotRow};

use crate::{
    DateTime, Decimal, MatchConfig, RemoteAccount, Result, ScrapedAccount, ScrapedTransaction,
    SyncError, TransactionType, TransactionView,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Still rendering; the reason is only used for logging.
    Loading(String),
}

/// Access to the transaction rows of an account page.
///
/// Field accessors fail with [`SyncError::NotReady`] when the row is still
/// loading.
pub trait PageExtractor {
    type Row;

    /// Whether the transaction list is fully rendered. A ready page without
    /// rows really has no transactions.
    fn readiness(&self) -> Readiness;

    /// Rows in display order.
    fn row_elements(&self) -> Vec<Self::Row>;
    fn row_date(&self, row: &Self::Row) -> Result<DateTime>;
    /// Signed, as printed by the bank.
    fn row_amount(&self, row: &Self::Row) -> Result<Decimal>;
    fn row_description(&self, row: &Self::Row) -> Result<String>;

    /// The account label shown on the page, e.g. `"Visa ...1234"`.
    fn page_account_label(&self) -> Result<String>;
}

/// Access to the accounts listing page.
pub trait AccountsExtractor {
    fn readiness(&self) -> Readiness;
    fn accounts(&self) -> Result<Vec<ScrapedAccount>>;
}

/// One row as the bank shows it, before sign normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub date: DateTime,
    pub amount: Decimal,
    pub description: String,
}

impl RawRow {
    /// Normalize into the ledger's convention: positive amount, direction in
    /// the type, the page's account on the matching side.
    pub fn into_scraped(self, row: usize, account_id: &str, config: &MatchConfig) -> ScrapedTransaction {
        let negative = self.amount.is_sign_negative() && !self.amount.is_zero();
        let positive = self.amount.is_sign_positive() && !self.amount.is_zero();
        let withdrawal = (negative && config.negative_means_withdrawal)
            || (positive && !config.negative_means_withdrawal);

        let (kind, source_id, destination_id) = if withdrawal {
            (TransactionType::Withdrawal, Some(account_id.to_owned()), None)
        } else {
            (TransactionType::Deposit, None, Some(account_id.to_owned()))
        };

        ScrapedTransaction {
            row,
            transaction: TransactionView {
                kind,
                date: self.date,
                amount: self.amount.abs(),
                description: self.description.trim().to_owned(),
                source_id,
                destination_id,
            },
        }
    }
}

pub fn ensure_ready(readiness: Readiness) -> Result<()> {
    match readiness {
        Readiness::Ready => Ok(()),
        Readiness::Loading(reason) => Err(SyncError::NotReady(reason).into()),
    }
}

/// Read all rows of the page as transactions of `account`.
///
/// Fails as a whole when the page or any row is not ready, and with
/// [`SyncError::EmptyPage`] when a rendered page has no rows.
pub fn scrape_transactions<E>(
    extractor: &E,
    account: &RemoteAccount,
    config: &MatchConfig,
) -> Result<Vec<ScrapedTransaction>>
where
    E: PageExtractor + ?Sized,
{
    ensure_ready(extractor.readiness())?;

    let rows = extractor.row_elements();
    if rows.is_empty() {
        return Err(SyncError::EmptyPage.into());
    }

    let mut scraped = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let raw = read_row(extractor, row).inspect_err(|e| {
            tracing::debug!("Tried to scrape transaction, but encountered error on row {index}: {e:#}");
        })?;
        let transaction = raw.into_scraped(index, &account.id, config);
        tracing::debug!("Scraped row {index}: {}", transaction.transaction);
        scraped.push(transaction);
    }
    Ok(scraped)
}

fn read_row<E>(extractor: &E, row: &E::Row) -> Result<RawRow>
where
    E: PageExtractor + ?Sized,
{
    Ok(RawRow {
        date: extractor.row_date(row)?,
        amount: extractor.row_amount(row)?,
        description: extractor.row_description(row)?,
    })
}

/// The digits identifying an account in a masked label such as
/// `"Visa ...1234"`.
pub fn masked_account_digits(label: &str) -> &str {
    let tail = label.rsplit("...").next().unwrap_or(label).trim();
    let start = tail
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map_or(tail.len(), |(index, _)| index);
    &tail[start..]
}

/// Resolve the account shown on the page to one of the known ledger accounts.
pub fn current_page_account<E>(extractor: &E, accounts: &[RemoteAccount]) -> Result<RemoteAccount>
where
    E: PageExtractor + ?Sized,
{
    let label = extractor.page_account_label()?;
    let digits = masked_account_digits(&label);
    accounts
        .iter()
        .find(|account| account.matches_number(digits))
        .cloned()
        .ok_or_else(|| SyncError::UnknownAccount(label).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::date_format;

    fn raw(amount: &str) -> RawRow {
        RawRow {
            date: date_format::parse("2023-01-01").unwrap(),
            amount: amount.parse().unwrap(),
            description: "  Coffee ".into(),
        }
    }

    fn account(id: &str, number: &str) -> RemoteAccount {
        RemoteAccount {
            id: id.into(),
            name: format!("Account {id}"),
            account_number: Some(number.into()),
            opening_balance: None,
        }
    }

    #[test]
    fn negative_amount_is_withdrawal_by_default() {
        let scraped = raw("-12.00").into_scraped(3, "1", &MatchConfig::default());
        assert_eq!(scraped.row, 3);
        assert_eq!(scraped.transaction.kind, TransactionType::Withdrawal);
        assert_eq!(scraped.transaction.amount.to_string(), "12.00");
        assert_eq!(scraped.transaction.source_id.as_deref(), Some("1"));
        assert_eq!(scraped.transaction.destination_id, None);
        assert_eq!(scraped.transaction.description, "Coffee");
    }

    #[test]
    fn flipped_convention_with_flipped_amounts_is_identical() {
        let flipped = MatchConfig {
            negative_means_withdrawal: false,
            ..MatchConfig::default()
        };
        for amount in ["-12.00", "7.25", "0"] {
            let negated = (-amount.parse::<Decimal>().unwrap()).to_string();
            let normal = raw(amount).into_scraped(0, "1", &MatchConfig::default());
            let inverted = raw(&negated).into_scraped(0, "1", &flipped);
            assert_eq!(normal, inverted, "amount {amount}");
        }
    }

    #[test]
    fn zero_amount_is_deposit() {
        let scraped = raw("0.00").into_scraped(0, "1", &MatchConfig::default());
        assert_eq!(scraped.transaction.kind, TransactionType::Deposit);
        assert_eq!(scraped.transaction.destination_id.as_deref(), Some("1"));
    }

    #[test]
    fn masked_digits() {
        assert_eq!(masked_account_digits("Visa ...1234"), "1234");
        assert_eq!(masked_account_digits("Chequing ...0042 "), "0042");
        assert_eq!(masked_account_digits("Account 5678"), "5678");
        assert_eq!(masked_account_digits("Savings"), "");
    }

    #[test]
    fn resolves_page_account_by_suffix() {
        let page = PageSnapshot {
            account_label: Some("Visa ...1234".into()),
            ..PageSnapshot::default()
        };
        let accounts = [account("1", "9876"), account("2", "4500001234")];
        let found = current_page_account(&page, &accounts).unwrap();
        assert_eq!(found.id, "2");

        let unknown = PageSnapshot {
            account_label: Some("Visa ...1111".into()),
            ..PageSnapshot::default()
        };
        let error = current_page_account(&unknown, &accounts).unwrap_err();
        assert_eq!(
            error.downcast_ref::<SyncError>(),
            Some(&SyncError::UnknownAccount("Visa ...1111".into()))
        );
    }

    #[test]
    fn loading_row_fails_whole_scrape() {
        let page: PageSnapshot = serde_json::from_str(
            r#"{
                "account_label": "Visa ...1234",
                "rows": [
                    {"date": "2023-01-02", "amount": "-5.00", "description": "Parking"},
                    {"date": "2023-01-01", "description": "Coffee"}
                ]
            }"#,
        )
        .unwrap();
        let error = scrape_transactions(&page, &account("1", "1234"), &MatchConfig::default())
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SyncError>(),
            Some(SyncError::NotReady(_))
        ));
    }

    #[test]
    fn ready_page_without_rows_is_empty() {
        let page = PageSnapshot::default();
        let error = scrape_transactions(&page, &account("1", "1234"), &MatchConfig::default())
            .unwrap_err();
        assert_eq!(error.downcast_ref::<SyncError>(), Some(&SyncError::EmptyPage));

        let loading = PageSnapshot {
            ready: false,
            ..PageSnapshot::default()
        };
        let error = scrape_transactions(&loading, &account("1", "1234"), &MatchConfig::default())
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SyncError>(),
            Some(SyncError::NotReady(_))
        ));
    }
}
