// ⚙️ Configuration - TOML file with defaults for every field
//
// Example superstore.toml:
//
//   database_path = "data/superstore.db"
//   csv_path = "data/Global_Superstore2.csv"
//
//   [pareto]
//   threshold = 80
//   entity = "customer"
//   group = "segment"
//   zero_total_policy = "exclude"

use crate::pareto::{ZeroTotalPolicy, DEFAULT_THRESHOLD};
use crate::source::{EntityDimension, GroupDimension};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE_PATH: &str = "superstore.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub csv_path: Option<PathBuf>,
    pub pareto: ParetoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParetoConfig {
    pub threshold: Decimal,
    pub entity: EntityDimension,
    pub group: GroupDimension,
    pub zero_total_policy: ZeroTotalPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            csv_path: None,
            pareto: ParetoConfig::default(),
        }
    }
}

impl Default for ParetoConfig {
    fn default() -> Self {
        ParetoConfig {
            threshold: DEFAULT_THRESHOLD,
            entity: EntityDimension::Customer,
            group: GroupDimension::City,
            zero_total_policy: ZeroTotalPolicy::Exclude,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("In config file {}", path.display()))
    }

    /// Defaults when no file is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.database_path, PathBuf::from("superstore.db"));
        assert_eq!(config.pareto.threshold, dec!(80));
        assert_eq!(config.pareto.entity, EntityDimension::Customer);
        assert_eq!(config.pareto.group, GroupDimension::City);
        assert_eq!(config.pareto.zero_total_policy, ZeroTotalPolicy::Exclude);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            csv_path = "Global_Superstore2.csv"

            [pareto]
            group = "segment"
            zero_total_policy = "fail"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("superstore.db"));
        assert_eq!(config.csv_path, Some(PathBuf::from("Global_Superstore2.csv")));
        assert_eq!(config.pareto.group, GroupDimension::Segment);
        assert_eq!(config.pareto.zero_total_policy, ZeroTotalPolicy::Fail);
        assert_eq!(config.pareto.threshold, dec!(80));
    }

    #[test]
    fn test_threshold_as_float_or_integer() {
        let config = AppConfig::from_toml_str("[pareto]\nthreshold = 95\n").unwrap();
        assert_eq!(config.pareto.threshold, dec!(95));

        let config = AppConfig::from_toml_str("[pareto]\nthreshold = 72.5\n").unwrap();
        assert_eq!(config.pareto.threshold, dec!(72.5));
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        assert!(AppConfig::from_toml_str("[pareto]\ngroup = \"planet\"\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = \"/tmp/store.db\"").unwrap();

        let config = AppConfig::load_or_default(Some(file.path())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/store.db"));

        assert!(AppConfig::load(Path::new("/nonexistent/superstore.toml")).is_err());
    }
}
