use crate::{DateTime, MatchConfig, RemoteTransaction, TransactionView};
use chrono::TimeDelta;

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Largest date skew, exclusive, accepted by fuzzy matching.
pub(super) const FUZZY_DATE_TOLERANCE: TimeDelta = TimeDelta::hours(24);

fn dates_match(remote: DateTime, scraped: DateTime, allow_fuzzy_dates: bool) -> bool {
    if remote == scraped {
        return true;
    }
    allow_fuzzy_dates && (remote - scraped).abs() < FUZZY_DATE_TOLERANCE
}

/// Whether `remote` is the ledger's record of the scraped transaction.
///
/// Both sides are expected in the ledger's sign convention: positive amounts
/// with the direction in `kind`. Remote legs are summed first.
pub fn remote_matches_scraped(
    remote: &RemoteTransaction,
    scraped: &TransactionView,
    config: &MatchConfig,
) -> bool {
    if collapse_whitespace(&remote.description) != collapse_whitespace(&scraped.description) {
        return false;
    }
    if remote.kind != scraped.kind {
        return false;
    }
    if remote.amount() != scraped.amount {
        return false;
    }

    dates_match(remote.date, scraped.date, config.allow_fuzzy_dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::date_format;
    use crate::{RemoteSplit, TransactionType};

    fn scraped(date: &str, amount: &str, description: &str) -> TransactionView {
        TransactionView {
            kind: TransactionType::Withdrawal,
            date: date_format::parse(date).unwrap(),
            amount: amount.parse().unwrap(),
            description: description.into(),
            source_id: Some("1".into()),
            destination_id: None,
        }
    }

    fn remote(date: &str, amounts: &[&str], description: &str) -> RemoteTransaction {
        RemoteTransaction {
            id: "100".into(),
            description: description.into(),
            kind: TransactionType::Withdrawal,
            date: date_format::parse(date).unwrap(),
            splits: amounts
                .iter()
                .map(|amount| RemoteSplit {
                    amount: amount.parse().unwrap(),
                })
                .collect(),
            source_id: Some("1".into()),
            destination_id: Some("55".into()),
        }
    }

    fn exact() -> MatchConfig {
        MatchConfig::default()
    }

    fn fuzzy() -> MatchConfig {
        MatchConfig {
            allow_fuzzy_dates: true,
            ..MatchConfig::default()
        }
    }

    #[test]
    fn match_simple() {
        let remote = remote("2023-01-01", &["12.00"], "Coffee");
        let scraped = scraped("2023-01-01", "12.00", "Coffee");
        assert!(remote_matches_scraped(&remote, &scraped, &exact()));
    }

    #[test]
    fn match_sums_split_legs() {
        let remote = remote("2023-01-01", &["10.00", "2.00"], "Coffee");
        let scraped = scraped("2023-01-01", "12", "Coffee");
        assert!(remote_matches_scraped(&remote, &scraped, &exact()));
    }

    #[test]
    fn match_collapses_whitespace() {
        let remote = remote("2023-01-01", &["12.00"], "STARBUCKS   #123\n- Coffee");
        let scraped = scraped("2023-01-01", "12.00", "STARBUCKS #123 - Coffee");
        assert!(remote_matches_scraped(&remote, &scraped, &exact()));
    }

    #[test]
    fn match_ignores_counterparty() {
        let remote = remote("2023-01-01", &["12.00"], "Coffee");
        let mut scraped = scraped("2023-01-01", "12.00", "Coffee");
        scraped.destination_id = None;
        scraped.source_id = Some("1".into());
        assert_eq!(remote.destination_id.as_deref(), Some("55"));
        assert!(remote_matches_scraped(&remote, &scraped, &exact()));
    }

    #[test]
    fn dont_match_different_description() {
        let remote = remote("2023-01-01", &["12.00"], "Coffee");
        let scraped = scraped("2023-01-01", "12.00", "Tea");
        assert!(!remote_matches_scraped(&remote, &scraped, &exact()));
    }

    #[test]
    fn dont_match_different_type() {
        let remote = remote("2023-01-01", &["12.00"], "Coffee");
        let mut scraped = scraped("2023-01-01", "12.00", "Coffee");
        scraped.kind = TransactionType::Deposit;
        assert!(!remote_matches_scraped(&remote, &scraped, &exact()));
    }

    #[test]
    fn dont_match_different_amount() {
        let remote = remote("2023-01-01", &["10.00", "1.00"], "Coffee");
        let scraped = scraped("2023-01-01", "12.00", "Coffee");
        assert!(!remote_matches_scraped(&remote, &scraped, &exact()));
    }

    #[test]
    fn dont_match_different_date() {
        let remote = remote("2023-01-01T00:00:00", &["12.00"], "Coffee");
        let scraped = scraped("2023-01-01T23:00:00", "12.00", "Coffee");
        assert!(!remote_matches_scraped(&remote, &scraped, &exact()));
    }

    #[test]
    fn fuzzy_match_within_a_day() {
        let remote = remote("2023-01-01T00:00:00", &["12.00"], "Coffee");
        let later = scraped("2023-01-01T23:00:00", "12.00", "Coffee");
        assert!(remote_matches_scraped(&remote, &later, &fuzzy()));

        let earlier = scraped("2022-12-31T01:00:00", "12.00", "Coffee");
        assert!(remote_matches_scraped(&remote, &earlier, &fuzzy()));
    }

    #[test]
    fn fuzzy_match_rejects_a_full_day() {
        let remote = remote("2023-01-01", &["12.00"], "Coffee");
        let scraped = scraped("2023-01-02", "12.00", "Coffee");
        assert!(!remote_matches_scraped(&remote, &scraped, &fuzzy()));
    }
}
