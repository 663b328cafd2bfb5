use crate::RemoteTransaction;

/// Bring remote transactions into a canonical order so matching does not
/// depend on the order the ledger returned them in.
pub fn sort_dedup_remote(transactions: &mut Vec<RemoteTransaction>) {
    transactions.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    transactions.dedup_by(|a, b| is_identical(a, b));
}

/// Append every transaction from `more` whose id is not yet present.
pub fn merge_by_id(into: &mut Vec<RemoteTransaction>, more: Vec<RemoteTransaction>) -> usize {
    let before = into.len();
    for transaction in more {
        if !into.iter().any(|known| known.id == transaction.id) {
            into.push(transaction);
        }
    }
    into.len() - before
}

// Same record fetched twice
fn is_identical(a: &RemoteTransaction, b: &RemoteTransaction) -> bool {
    a.id == b.id
}
