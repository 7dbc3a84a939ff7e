//! Configuration file loading
//!
//! The config is a TOML file at `$XDG_CONFIG_HOME/gainsledger/config.toml`
//! unless `--config` points elsewhere. Relative paths inside it are resolved
//! against the directory holding the file.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Disposal method entry for one year (or `default`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DisposalMethodConfig {
    pub method: String,
    #[serde(default)]
    pub short_term_tax_rate: Option<Decimal>,
    #[serde(default)]
    pub long_term_tax_rate: Option<Decimal>,
}

/// A transaction source imported by `run`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    File { path: PathBuf },
}

/// A daily price CSV imported by `run`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceFileConfig {
    pub currency: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub prices: Vec<PriceFileConfig>,
    #[serde(default = "default_disposal")]
    pub disposal: BTreeMap<String, DisposalMethodConfig>,
}

fn default_disposal() -> BTreeMap<String, DisposalMethodConfig> {
    let mut map = BTreeMap::new();
    map.insert(
        "default".to_string(),
        DisposalMethodConfig {
            method: "FIFO".to_string(),
            short_term_tax_rate: None,
            long_term_tax_rate: None,
        },
    );
    map
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: None,
            sources: Vec::new(),
            prices: Vec::new(),
            disposal: default_disposal(),
        }
    }
}

impl AppConfig {
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dir_spec::config_home()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("gainsledger").join("config.toml"))
    }

    /// Load the config from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file yields the
    /// built-in defaults (FIFO for every year, no sources).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => {
                let default_path = Self::default_config_path()?;
                if default_path.exists() {
                    Self::load_from_path(&default_path)
                } else {
                    debug!("No config at {:?}, using defaults", default_path);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::from_toml(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate_disposal_keys()?;
        Ok(config)
    }

    /// Year keys must be `default` or a year number. The entries themselves
    /// are validated when their year is first looked up.
    fn validate_disposal_keys(&self) -> Result<()> {
        for key in self.disposal.keys() {
            if key != "default" && key.parse::<i32>().is_err() {
                bail!(
                    "Invalid disposal key '{}': expected a year or 'default'",
                    key
                );
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        if let Some(db) = self.database.as_mut() {
            resolve(db);
        }
        for source in &mut self.sources {
            match source {
                SourceConfig::File { path } => resolve(path),
            }
        }
        for price in &mut self.prices {
            resolve(&mut price.path);
        }
    }

    /// Paths of every configured file source
    pub fn file_sources(&self) -> Vec<PathBuf> {
        self.sources
            .iter()
            .map(|s| match s {
                SourceConfig::File { path } => path.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
database = "ledger.db"

[[sources]]
kind = "file"
path = "transactions.csv"

[[prices]]
currency = "BTC"
path = "btc.csv"

[disposal.default]
method = "FIFO"

[disposal.2018]
method = "Estimate"
short_term_tax_rate = "0.4"
long_term_tax_rate = "0.2"
"#;
        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.prices[0].currency, "BTC");
        assert_eq!(config.disposal.len(), 2);

        let estimate = &config.disposal["2018"];
        assert_eq!(estimate.short_term_tax_rate, Some(dec!(0.4)));
        assert_eq!(estimate.long_term_tax_rate, Some(dec!(0.2)));
    }

    #[test]
    fn test_missing_disposal_section_defaults_to_fifo() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.disposal["default"].method, "FIFO");
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_unknown_source_kind_is_rejected() {
        let toml_str = r#"
[[sources]]
kind = "poloniex"
path = "x.csv"
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_bad_disposal_key_is_rejected() {
        let toml_str = r#"
[disposal.someday]
method = "FIFO"
"#;
        let err = AppConfig::from_toml(toml_str).unwrap_err();
        assert!(err.to_string().contains("someday"));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "database = \"ledger.db\"").unwrap();
        writeln!(file, "[[sources]]\nkind = \"file\"\npath = \"/abs/tx.csv\"").unwrap();
        writeln!(file, "[[prices]]\ncurrency = \"ETH\"\npath = \"eth.csv\"").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.database, Some(dir.path().join("ledger.db")));
        assert_eq!(config.file_sources(), vec![PathBuf::from("/abs/tx.csv")]);
        assert_eq!(config.prices[0].path, dir.path().join("eth.csv"));
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = AppConfig::load(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
