use anyhow::{Context, Result};
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{DebouncedEvent, Debouncer, NoCache, new_debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// Calls back whenever the ledger file is written, created or removed.
pub struct LedgerWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher, NoCache>,
}

impl LedgerWatcher {
    pub fn new<F>(ledger_path: &Path, on_change: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        // the file itself may not exist yet, so watch its directory
        let ledger_path = std::path::absolute(ledger_path)?;
        let directory = ledger_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let watched = ledger_path.clone();
        let mut debouncer = new_debouncer(
            Duration::from_millis(100),
            None,
            move |res: Result<Vec<DebouncedEvent>, _>| {
                let mut events = match res {
                    Ok(events) => events,
                    Err(e) => {
                        error!("Watch error: {:?}", e);
                        return;
                    }
                };

                events.retain(|e| {
                    matches!(
                        e.event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) && e.event.paths.iter().any(|path| *path == watched)
                });

                if !events.is_empty() {
                    info!("Ledger file changed: {} events", events.len());
                    on_change();
                }
            },
        )?;

        info!("Watching ledger file {}", ledger_path.display());
        debouncer
            .watch(&directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", directory.display()))?;

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}
