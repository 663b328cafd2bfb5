use std::collections::HashMap;
use std::fmt::Write as _;

use anstyle::{AnsiColor, Color, Style};
use ledger_sync::TransactionView;
use ledger_sync::present::{ActionId, RowStyle, RowSurface};
use ledger_sync::reconcile::{Reconciliation, RowAnchor};

struct InsertedRow {
    handle: usize,
    anchor: RowAnchor,
    transaction: TransactionView,
    style: RowStyle,
    action: ActionId,
    label: String,
    hidden: bool,
}

/// Renders a reconciled page as text, one line per row.
pub struct TerminalSurface {
    page_rows: Vec<TransactionView>,
    highlights: HashMap<usize, RowStyle>,
    actions: Vec<(usize, ActionId, String)>,
    inserted: Vec<InsertedRow>,
    next_handle: usize,
}

impl TerminalSurface {
    /// The page's rows as they appear in `reconciliation`.
    pub fn for_page(reconciliation: &Reconciliation) -> Self {
        let mut rows: Vec<_> = reconciliation
            .synced
            .iter()
            .chain(&reconciliation.local_only)
            .map(|meta| (meta.anchor.row(), meta.transaction.clone()))
            .collect();
        rows.sort_by_key(|(row, _)| *row);

        TerminalSurface {
            page_rows: rows.into_iter().map(|(_, transaction)| transaction).collect(),
            highlights: HashMap::new(),
            actions: Vec::new(),
            inserted: Vec::new(),
            next_handle: 0,
        }
    }

    /// Actions currently offered, with their labels.
    pub fn actions(&self) -> Vec<(ActionId, &str)> {
        let attached = self
            .actions
            .iter()
            .map(|(_, action, label)| (*action, label.as_str()));
        let inserted = self
            .inserted
            .iter()
            .filter(|row| !row.hidden)
            .map(|row| (row.action, row.label.as_str()));
        attached.chain(inserted).collect()
    }

    pub fn render(&self, color: bool) -> String {
        let mut out = String::new();
        for (index, transaction) in self.page_rows.iter().enumerate() {
            self.render_inserted(&mut out, RowAnchor::InsertBefore(index), color);

            let style = self.highlights.get(&index).copied();
            let label = self
                .actions
                .iter()
                .find(|(row, _, _)| *row == index)
                .map(|(_, _, label)| label.as_str());
            render_line(&mut out, style, transaction, label, color);

            self.render_inserted(&mut out, RowAnchor::InsertAfter(index), color);
        }
        out
    }

    fn render_inserted(&self, out: &mut String, anchor: RowAnchor, color: bool) {
        for row in self.inserted.iter().filter(|row| row.anchor == anchor && !row.hidden) {
            render_line(out, Some(row.style), &row.transaction, Some(&row.label), color);
        }
    }
}

fn marker(style: Option<RowStyle>) -> char {
    match style {
        Some(RowStyle::Synced) => '=',
        Some(RowStyle::LocalOnly) => '+',
        Some(RowStyle::RemoteOnly) => '-',
        Some(RowStyle::Duplicate) => '!',
        None => ' ',
    }
}

fn color_of(style: Option<RowStyle>) -> Style {
    let color = match style {
        Some(RowStyle::Synced) => AnsiColor::Blue,
        Some(RowStyle::LocalOnly) => AnsiColor::Yellow,
        Some(RowStyle::RemoteOnly) => AnsiColor::Magenta,
        Some(RowStyle::Duplicate) => AnsiColor::Red,
        None => return Style::new(),
    };
    Style::new().fg_color(Some(Color::Ansi(color)))
}

fn render_line(
    out: &mut String,
    style: Option<RowStyle>,
    transaction: &TransactionView,
    label: Option<&str>,
    color: bool,
) {
    let ansi = if color { color_of(style) } else { Style::new() };
    let _ = write!(out, "{ansi}{} {transaction}{ansi:#}", marker(style));
    if let Some(label) = label {
        let _ = write!(out, "  [{label}]");
    }
    out.push('\n');
}

impl RowSurface for TerminalSurface {
    type Handle = usize;

    fn clear_injected(&mut self) {
        self.highlights.clear();
        self.actions.clear();
        self.inserted.clear();
    }

    fn highlight_row(&mut self, row: usize, style: RowStyle) {
        self.highlights.insert(row, style);
    }

    fn attach_action(&mut self, row: usize, action: ActionId, label: &str) {
        self.actions.push((row, action, label.to_owned()));
    }

    fn insert_row(
        &mut self,
        anchor: RowAnchor,
        transaction: &TransactionView,
        style: RowStyle,
        action: ActionId,
        label: &str,
    ) -> usize {
        self.next_handle += 1;
        self.inserted.push(InsertedRow {
            handle: self.next_handle,
            anchor,
            transaction: transaction.clone(),
            style,
            action,
            label: label.to_owned(),
            hidden: false,
        });
        self.next_handle
    }

    fn hide_row(&mut self, handle: &usize) {
        if let Some(row) = self.inserted.iter_mut().find(|row| row.handle == *handle) {
            row.hidden = true;
        }
    }

    fn show_row(&mut self, handle: &usize) {
        if let Some(row) = self.inserted.iter_mut().find(|row| row.handle == *handle) {
            row.hidden = false;
        }
    }

    fn remove_row(&mut self, handle: &usize) {
        self.inserted.retain(|row| row.handle != *handle);
    }
}

pub fn print_summary(reconciliation: &Reconciliation) {
    let local_style = color_of(Some(RowStyle::LocalOnly));
    let remote_style = color_of(Some(RowStyle::RemoteOnly));
    let bold = Style::new().bold();

    if reconciliation.is_in_sync() {
        println!("✓ All {} transactions match!", reconciliation.synced.len());
        return;
    }

    println!("{bold}━━━ Summary ━━━{bold:#}");
    println!("  {} transaction(s) in sync", reconciliation.synced.len());
    let local = reconciliation.local_only.len();
    if local > 0 {
        println!("  {local_style}{local}{local_style:#} transaction(s) only on the page");
    }
    let remote = reconciliation.remote_only.len();
    if remote > 0 {
        println!("  {remote_style}{remote}{remote_style:#} transaction(s) only in the ledger");
    }
    if !reconciliation.outside_window.is_empty() {
        println!(
            "  {} older ledger transaction(s) not covered by the page",
            reconciliation.outside_window.len()
        );
    }
}
