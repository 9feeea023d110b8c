use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};
use crate::table::TableTier;

/// Entry count at which a table of each tier is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableThresholds {
    pub small: usize,
    pub medium: usize,
    pub large: usize,
    pub xl: usize,
}

impl TableThresholds {
    /// Every tier full at `n` entries. Handy in tests.
    pub fn uniform(n: usize) -> Self {
        Self {
            small: n,
            medium: n,
            large: n,
            xl: n,
        }
    }

    pub fn for_tier(&self, tier: TableTier) -> usize {
        match tier {
            TableTier::Small => self.small,
            TableTier::Medium => self.medium,
            TableTier::Large => self.large,
            TableTier::Xl => self.xl,
        }
    }
}

impl Default for TableThresholds {
    fn default() -> Self {
        Self {
            small: 100,
            medium: 400,
            large: 1600,
            xl: 6400,
        }
    }
}

/// Repository configuration. Not persisted: every instance receives it at
/// construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub tables: TableThresholds,
}

impl RepoConfig {
    pub fn from_toml_str(s: &str) -> RepoResult<Self> {
        toml::from_str(s).map_err(|e| RepoError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> RepoResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = RepoConfig::default();
        assert_eq!(c.tables.small, 100);
        assert_eq!(c.tables.medium, 400);
        assert_eq!(c.tables.large, 1600);
        assert_eq!(c.tables.xl, 6400);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = RepoConfig::from_toml_str("[tables]\nsmall = 2\n").unwrap();
        assert_eq!(c.tables.small, 2);
        assert_eq!(c.tables.medium, 400);
        assert_eq!(RepoConfig::from_toml_str("").unwrap(), RepoConfig::default());
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(
            RepoConfig::from_toml_str("[tables]\nsmall = \"many\"\n"),
            Err(RepoError::Config(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plume.toml");
        std::fs::write(&path, "[tables]\nsmall = 7\nxl = 9\n").unwrap();
        let c = RepoConfig::load(&path).unwrap();
        assert_eq!(c.tables.for_tier(TableTier::Small), 7);
        assert_eq!(c.tables.for_tier(TableTier::Xl), 9);
    }
}
