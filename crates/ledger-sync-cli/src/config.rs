use anyhow::{Context, Result};
use ledger_sync::{AutoRunConfig, MatchConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLedger {
    pub file: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub auto_run: AutoRunConfig,
    pub ledger: Option<ConfigLedger>,
}

impl Config {
    /// Load `path`. Relative paths inside are resolved against its directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let base_dir = path.parent().map(ToOwned::to_owned).unwrap_or_default();

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let Some(ledger) = &mut config.ledger {
            ledger.file = base_dir.join(&ledger.file);
        }
        Ok(config)
    }

    pub fn find_and_load() -> Result<Option<Self>> {
        let config_locations = [
            Path::new("ledger-sync.toml"),
            Path::new(".ledger-sync.toml"),
        ];

        for location in &config_locations {
            if location.exists() {
                tracing::debug!("Using config file {}", location.display());
                return Self::load_from_file(location).map(Some);
            }
        }

        Ok(None)
    }

    pub fn ledger_file(&self) -> Option<&Path> {
        self.ledger.as_ref().map(|ledger| ledger.file.as_path())
    }
}
