use serde::Deserialize;

/// Bank-specific knobs for turning a scraped page into comparable transactions.
///
/// `negative_means_withdrawal` has to agree with how the bank prints amounts,
/// otherwise every row silently lands in the wrong bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchConfig {
    /// A negative amount on the page is money leaving the account.
    pub negative_means_withdrawal: bool,
    /// Accept dates that differ by less than 24 hours.
    pub allow_fuzzy_dates: bool,
    /// Page size used when listing remote transactions.
    pub transactions_per_page: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            negative_means_withdrawal: true,
            allow_fuzzy_dates: false,
            transactions_per_page: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoRunConfig {
    /// The bank only has one account, so there is no accounts listing to
    /// return to between steps.
    pub single_account_bank: bool,
    /// Scrape and log, but never store anything remotely.
    pub dry_run: bool,
}

impl Default for AutoRunConfig {
    fn default() -> Self {
        AutoRunConfig {
            single_account_bank: true,
            dry_run: false,
        }
    }
}
