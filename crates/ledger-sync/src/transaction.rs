use crate::{DateTime, Decimal};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Deposit => f.write_str("deposit"),
            TransactionType::Withdrawal => f.write_str("withdrawal"),
        }
    }
}

/// The shape shared by scraped and remote transactions.
///
/// `amount` is always positive, the direction lives in `kind`. Exactly one of
/// `source_id`/`destination_id` is set for scraped transactions: the page's
/// account. The counterparty is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionView {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(deserialize_with = "date_format::deserialize")]
    pub date: DateTime,
    pub amount: Decimal,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
}

impl fmt::Display for TransactionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} \"{}\"",
            self.date.format("%Y-%m-%d %H:%M"),
            self.kind,
            self.amount,
            self.description
        )
    }
}

/// One transaction row read off the page, normalized to the ledger's sign
/// convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapedTransaction {
    /// Display index of the row this came from.
    pub row: usize,
    #[serde(flatten)]
    pub transaction: TransactionView,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteSplit {
    pub amount: Decimal,
}

/// A transaction as the remote ledger knows it. May consist of several legs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteTransaction {
    pub id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(deserialize_with = "date_format::deserialize")]
    pub date: DateTime,
    pub splits: Vec<RemoteSplit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
}

impl RemoteTransaction {
    /// Sum of all split legs.
    pub fn amount(&self) -> Decimal {
        self.splits.iter().map(|split| split.amount).sum()
    }

    pub fn view(&self) -> TransactionView {
        TransactionView {
            kind: self.kind,
            date: self.date,
            amount: self.amount(),
            description: self.description.clone(),
            source_id: self.source_id.clone(),
            destination_id: self.destination_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccount {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_balance: Option<OpeningBalance>,
}

impl RemoteAccount {
    /// Whether this account is the one a page shows as `...<digits>`.
    pub fn matches_number(&self, digits: &str) -> bool {
        !digits.is_empty()
            && self
                .account_number
                .as_deref()
                .is_some_and(|number| number == digits || number.ends_with(digits))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningBalance {
    pub balance: Decimal,
    #[serde(deserialize_with = "date_format::deserialize")]
    pub date: DateTime,
}

/// An account as listed on the bank's accounts page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedAccount {
    pub name: String,
    pub account_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_balance: Option<OpeningBalance>,
}

pub mod date_format {
    use crate::DateTime;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, de::Error};

    /// Accepts full timestamps as well as plain dates, which become midnight.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid date '{raw}'")))
    }

    pub fn parse(raw: &str) -> Option<DateTime> {
        let raw = raw.trim();
        if let Ok(datetime) = raw.parse::<DateTime>() {
            return Some(datetime);
        }
        if let Ok(datetime) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Some(datetime);
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_amount_sums_splits() {
        let remote = RemoteTransaction {
            id: "1".into(),
            description: "Coffee".into(),
            kind: TransactionType::Withdrawal,
            date: date_format::parse("2023-01-01").unwrap(),
            splits: vec![
                RemoteSplit {
                    amount: "7.50".parse().unwrap(),
                },
                RemoteSplit {
                    amount: "4.5".parse().unwrap(),
                },
            ],
            source_id: Some("acct".into()),
            destination_id: None,
        };
        assert_eq!(remote.amount(), "12".parse::<Decimal>().unwrap());
        assert_eq!(
            remote.view().to_string(),
            "2023-01-01 00:00 withdrawal 12.00 \"Coffee\""
        );
    }

    #[test]
    fn parses_dates_and_timestamps() {
        let midnight = date_format::parse("2023-01-01").unwrap();
        let timestamp = date_format::parse("2023-01-01T23:00:00").unwrap();
        let spaced = date_format::parse("2023-01-01 23:00:00").unwrap();
        assert_eq!(timestamp, spaced);
        assert_eq!((timestamp - midnight).num_hours(), 23);
        assert!(date_format::parse("yesterday").is_none());
    }

    #[test]
    fn deserializes_remote_transaction_json() {
        let remote: RemoteTransaction = serde_json::from_str(
            r#"{
                "id": "42",
                "description": "Rent",
                "type": "withdrawal",
                "date": "2023-02-01",
                "splits": [{"amount": "900.00"}],
                "source_id": "1"
            }"#,
        )
        .unwrap();
        assert_eq!(remote.kind, TransactionType::Withdrawal);
        assert_eq!(remote.destination_id, None);
        assert_eq!(remote.amount(), "900".parse::<Decimal>().unwrap());
    }
}
