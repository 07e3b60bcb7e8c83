// raft-core/src/infrastructure/config_store.rs

use crate::domain::config::{ConfigUpdate, GovernorConfig};
use crate::error::RaftError;
use crate::infrastructure::error::InfrastructureError;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

pub const CONFIG_PATH_ENV: &str = "RAFT_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Typed, validated, persisted runtime parameters with hot updates.
///
/// Readers take a copy-on-read snapshot and never block behind writers;
/// updates are serialized by the mutex and persisted atomically before
/// they become visible.
pub struct ConfigStore {
    path: PathBuf,
    current: Mutex<GovernorConfig>,
}

impl ConfigStore {
    /// Open the store at `path`, loading the persisted config (or writing
    /// defaults when the file is absent or invalid).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RaftError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            current: Mutex::new(GovernorConfig::default()),
        };
        store.load()?;
        Ok(store)
    }

    /// Resolve the path from `RAFT_CONFIG_PATH`, falling back to
    /// `config.yaml`.
    pub fn open_from_env() -> Result<Self, RaftError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::open(path)
    }

    /// Snapshot of the current config; never blocks on persistence.
    pub fn get(&self) -> GovernorConfig {
        *self.current.lock()
    }

    /// Apply a partial update. Validation failure leaves both the live
    /// config and the persisted file untouched; on success the new config
    /// is persisted atomically before this returns.
    #[instrument(skip(self))]
    pub fn update(&self, update: ConfigUpdate) -> Result<GovernorConfig, RaftError> {
        let mut guard = self.current.lock();
        let candidate = guard.with_update(&update);
        candidate.check()?;

        self.persist(&candidate)?;
        *guard = candidate;
        info!(
            rho_max = candidate.rho_max,
            energy_multiplier = candidate.energy_multiplier,
            "Config updated"
        );
        Ok(candidate)
    }

    /// (Re)load from the persisted file. Parse or validation failures warn,
    /// reset to defaults and persist those defaults.
    #[instrument(skip(self))]
    pub fn load(&self) -> Result<GovernorConfig, RaftError> {
        let loaded = match self.read_file() {
            Ok(Some(config)) => {
                info!(path = %self.path.display(), "Configuration loaded");
                config
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No config file; writing defaults");
                let defaults = GovernorConfig::default();
                self.persist(&defaults)?;
                defaults
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Invalid config; resetting to defaults");
                let defaults = GovernorConfig::default();
                self.persist(&defaults)?;
                defaults
            }
        };
        *self.current.lock() = loaded;
        Ok(loaded)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<Option<GovernorConfig>, RaftError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| RaftError::Infrastructure(e.into()))?;
        let config: GovernorConfig = serde_yaml::from_str(&content)
            .map_err(|e| RaftError::Infrastructure(e.into()))?;
        config.check().map_err(RaftError::Domain)?;
        Ok(Some(config))
    }

    /// Persist by staging in the config's own directory and renaming over
    /// the target. The rename never crosses a filesystem, so a crash mid
    /// update leaves either the previous config or the new one on disk,
    /// never a torn file the next `load` would reset to defaults.
    fn persist(&self, config: &GovernorConfig) -> Result<(), RaftError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| RaftError::Infrastructure(e.into()))?;

        let yaml = serde_yaml::to_string(config).map_err(|e| RaftError::Infrastructure(e.into()))?;
        let mut staged =
            tempfile::NamedTempFile::new_in(dir).map_err(InfrastructureError::Io)?;
        staged
            .write_all(yaml.as_bytes())
            .map_err(InfrastructureError::Io)?;
        staged
            .persist(&self.path)
            .map_err(|e| InfrastructureError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_open_without_file_persists_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");
        let store = ConfigStore::open(&path)?;

        assert_eq!(store.get(), GovernorConfig::default());
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_update_persists_before_returning() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");
        let store = ConfigStore::open(&path)?;

        let updated = store.update(ConfigUpdate {
            rho_max: Some(0.5),
            energy_multiplier: None,
        })?;
        assert_eq!(updated.rho_max, 0.5);

        let on_disk: GovernorConfig = serde_yaml::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(on_disk, updated);
        Ok(())
    }

    #[test]
    fn test_failing_update_changes_nothing() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");
        let store = ConfigStore::open(&path)?;

        let before = store.get();
        let bytes_before = fs::read(&path)?;

        let result = store.update(ConfigUpdate {
            rho_max: Some(1.5),
            energy_multiplier: Some(2.0),
        });
        assert!(result.is_err());

        assert_eq!(store.get(), before);
        assert_eq!(fs::read(&path)?, bytes_before);
        Ok(())
    }

    #[test]
    fn test_corrupt_file_resets_to_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");
        fs::write(&path, "rho_max: not-a-number\n")?;

        let store = ConfigStore::open(&path)?;
        assert_eq!(store.get(), GovernorConfig::default());

        // Defaults were persisted over the corrupt file.
        let on_disk: GovernorConfig = serde_yaml::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(on_disk, GovernorConfig::default());
        Ok(())
    }

    #[test]
    fn test_out_of_range_file_resets_to_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");
        fs::write(&path, "rho_max: 3.0\nenergy_multiplier: 2.0\n")?;

        let store = ConfigStore::open(&path)?;
        assert_eq!(store.get(), GovernorConfig::default());
        Ok(())
    }

    #[test]
    fn test_persist_leaves_no_staging_residue() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");
        let store = ConfigStore::open(&path)?;

        store.update(ConfigUpdate {
            rho_max: Some(0.6),
            energy_multiplier: Some(3.0),
        })?;

        // Only the config file itself survives the staged rename.
        let entries: Vec<_> = fs::read_dir(dir.path())?.collect();
        assert_eq!(entries.len(), 1);
        let on_disk: GovernorConfig = serde_yaml::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(on_disk.rho_max, 0.6);
        Ok(())
    }
}
