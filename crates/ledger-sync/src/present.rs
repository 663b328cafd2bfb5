//! Turning a [`Reconciliation`] into highlighted rows with remediation
//! actions.
//!
//! The presenter never touches a UI toolkit directly. It drives a
//! [`RowSurface`], which maps row indices to whatever the page shows, and it
//! hands ledger work back to the caller as [`Remediation`]s, so a click never
//! has to wait for the remote side.

use crate::ledger::{RemoteLedger, StoreRequest};
use crate::reconcile::{MetaTransaction, Reconciliation, RemoteOnlyReason, RowAnchor};
use crate::{Result, TransactionView};
use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowStyle {
    Synced,
    LocalOnly,
    RemoteOnly,
    Duplicate,
}

/// Identifies an action of one particular render. Actions of an older render
/// are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId {
    generation: u64,
    index: usize,
}

pub const STORE_LABEL: &str = "Store to remote";
pub const DELETE_LABEL: &str = "Delete from remote";

/// Where reconciliation markup is drawn.
pub trait RowSurface {
    type Handle: Clone;

    /// Remove every row, highlight and action added by earlier renders.
    fn clear_injected(&mut self);
    fn highlight_row(&mut self, row: usize, style: RowStyle);
    fn attach_action(&mut self, row: usize, action: ActionId, label: &str);
    /// Add a synthesized row for a transaction that is not on the page.
    fn insert_row(
        &mut self,
        anchor: RowAnchor,
        transaction: &TransactionView,
        style: RowStyle,
        action: ActionId,
        label: &str,
    ) -> Self::Handle;
    fn hide_row(&mut self, handle: &Self::Handle);
    fn show_row(&mut self, handle: &Self::Handle);
    fn remove_row(&mut self, handle: &Self::Handle);
}

/// Ledger work requested by a click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remediation {
    Store {
        action: ActionId,
        transaction: TransactionView,
    },
    Delete {
        action: ActionId,
        remote_id: String,
    },
}

impl Remediation {
    pub async fn run<L>(&self, ledger: &L) -> Result<()>
    where
        L: RemoteLedger + ?Sized,
    {
        match self {
            Remediation::Store { transaction, .. } => {
                let request = StoreRequest {
                    transactions: vec![transaction.clone()],
                    apply_rules: true,
                    error_if_duplicate_hash: false,
                    is_auto_run: false,
                };
                ledger
                    .store_transactions(request)
                    .await
                    .with_context(|| format!("Failed to store transaction {transaction}"))?;
            }
            Remediation::Delete { remote_id, .. } => {
                ledger
                    .delete_transaction(remote_id)
                    .await
                    .with_context(|| format!("Failed to delete transaction {remote_id}"))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Click {
    /// The page's own handling of the click has to be suppressed.
    pub prevent_default: bool,
    pub remediation: Remediation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeleteState {
    Shown,
    Pending,
    Removed,
}

enum Action<H> {
    Store(TransactionView),
    Delete {
        remote_id: String,
        handle: H,
        state: DeleteState,
    },
}

pub struct ReconciliationPresenter<S: RowSurface> {
    surface: S,
    generation: u64,
    actions: Vec<Action<S::Handle>>,
}

impl<S: RowSurface> ReconciliationPresenter<S> {
    pub fn new(surface: S) -> Self {
        ReconciliationPresenter {
            surface,
            generation: 0,
            actions: Vec::new(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Render `reconciliation`, replacing whatever an earlier call rendered.
    pub fn present(&mut self, reconciliation: &Reconciliation) {
        self.surface.clear_injected();
        self.actions.clear();
        self.generation += 1;

        for meta in &reconciliation.synced {
            self.surface.highlight_row(meta.anchor.row(), RowStyle::Synced);
        }
        for meta in &reconciliation.local_only {
            let row = meta.anchor.row();
            self.surface.highlight_row(row, RowStyle::LocalOnly);
            let action = self.push(Action::Store(meta.transaction.clone()));
            self.surface.attach_action(row, action, STORE_LABEL);
        }
        for meta in &reconciliation.remote_only {
            self.present_remote_only(meta);
        }
    }

    fn present_remote_only(&mut self, meta: &MetaTransaction) {
        let Some(remote_id) = meta.remote_id.clone() else {
            tracing::warn!("Remote only transaction without id: {}", meta.transaction);
            return;
        };
        let style = match meta.remote_only {
            Some(RemoteOnlyReason::Duplicate { .. }) => RowStyle::Duplicate,
            _ => RowStyle::RemoteOnly,
        };
        let action = self.next_action_id();
        let handle =
            self.surface
                .insert_row(meta.anchor, &meta.transaction, style, action, DELETE_LABEL);
        self.push(Action::Delete {
            remote_id,
            handle,
            state: DeleteState::Shown,
        });
    }

    fn next_action_id(&self) -> ActionId {
        ActionId {
            generation: self.generation,
            index: self.actions.len(),
        }
    }

    fn push(&mut self, action: Action<S::Handle>) -> ActionId {
        let id = self.next_action_id();
        self.actions.push(action);
        id
    }

    fn action_mut(&mut self, id: ActionId) -> Option<&mut Action<S::Handle>> {
        if id.generation != self.generation {
            return None;
        }
        self.actions.get_mut(id.index)
    }

    /// Handle a click on an action button.
    ///
    /// A delete hides its row right away; [`Self::settle`] later removes it
    /// for good or brings it back. Returns `None` for stale or in-flight
    /// actions.
    pub fn click(&mut self, id: ActionId) -> Option<Click> {
        let remediation = match self.action_mut(id)? {
            Action::Store(transaction) => Remediation::Store {
                action: id,
                transaction: transaction.clone(),
            },
            Action::Delete {
                remote_id,
                handle,
                state,
            } => {
                if *state != DeleteState::Shown {
                    return None;
                }
                *state = DeleteState::Pending;
                let handle = handle.clone();
                let remediation = Remediation::Delete {
                    action: id,
                    remote_id: remote_id.clone(),
                };
                self.surface.hide_row(&handle);
                remediation
            }
        };
        Some(Click {
            prevent_default: true,
            remediation,
        })
    }

    /// Apply the result of a remediation started by [`Self::click`].
    pub fn settle(&mut self, id: ActionId, result: &Result<()>) {
        let Some(action) = self.action_mut(id) else {
            tracing::debug!("Ignoring result of an action from an earlier render");
            return;
        };
        match action {
            Action::Store(transaction) => {
                if let Err(error) = result {
                    tracing::error!("Failed to store {transaction}: {error:#}");
                }
            }
            Action::Delete { handle, state, .. } => {
                let handle = handle.clone();
                match result {
                    Ok(()) => {
                        *state = DeleteState::Removed;
                        self.surface.remove_row(&handle);
                    }
                    Err(error) => {
                        tracing::error!("Failed to delete transaction: {error:#}");
                        *state = DeleteState::Shown;
                        self.surface.show_row(&handle);
                    }
                }
            }
        }
    }

    /// Click, run the remediation against `ledger` and settle it.
    pub async fn activate<L>(&mut self, id: ActionId, ledger: &L) -> Option<Result<()>>
    where
        L: RemoteLedger + ?Sized,
    {
        let click = self.click(id)?;
        let result = click.remediation.run(ledger).await;
        self.settle(id, &result);
        Some(result)
    }
}
