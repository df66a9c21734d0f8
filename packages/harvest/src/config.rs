//! Run configuration.
//!
//! Every field has a default, so an empty TOML document (or no file at all)
//! describes the stock run: years 2001 through 2022 into `./data`.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use madzi_api::{ClientConfig, Credentials, DEFAULT_BASE_URL, DEFAULT_TOKEN_VAR};
use madzi_table::TableFormat;
use serde::Deserialize;

use crate::HarvestError;
use crate::paths::{DEFAULT_DATA_DIR, DEFAULT_SUMMARY_FILE};

pub const DEFAULT_FIRST_YEAR: i32 = 2001;
pub const DEFAULT_LAST_YEAR: i32 = 2022;
pub const DEFAULT_PARTITION_CONCURRENCY: usize = 5;
pub const DEFAULT_RECORD_CONCURRENCY: usize = 25;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    /// Root of the partition cache and the summary table.
    pub data_dir: PathBuf,
    pub first_year: i32,
    /// Inclusive.
    pub last_year: i32,
    /// Partitions processed at once.
    pub partition_concurrency: usize,
    /// Records enriched at once within one partition.
    pub record_concurrency: usize,
    /// Summary table path, relative to `data_dir` unless absolute.
    pub summary_file: PathBuf,
    pub table_format: TableFormat,
    pub base_url: String,
    /// Environment variable holding the bearer token.
    pub token_var: String,
    pub request_timeout_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            first_year: DEFAULT_FIRST_YEAR,
            last_year: DEFAULT_LAST_YEAR,
            partition_concurrency: DEFAULT_PARTITION_CONCURRENCY,
            record_concurrency: DEFAULT_RECORD_CONCURRENCY,
            summary_file: PathBuf::from(DEFAULT_SUMMARY_FILE),
            table_format: TableFormat::default(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            token_var: DEFAULT_TOKEN_VAR.to_owned(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl HarvestConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Config`] if the document is malformed or
    /// names an unknown key.
    pub fn from_toml_str(text: &str) -> Result<Self, HarvestError> {
        toml::de::from_str(text).map_err(|e| HarvestError::Config {
            message: e.to_string(),
        })
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, HarvestError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|e| match e {
            HarvestError::Config { message } => HarvestError::Config {
                message: format!("{}: {message}", path.display()),
            },
            other => other,
        })
    }

    /// Checks that the configuration describes at least one partition year.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Config`] if the year range is empty.
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.first_year > self.last_year {
            return Err(HarvestError::Config {
                message: format!(
                    "first_year {} is after last_year {}",
                    self.first_year, self.last_year
                ),
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn years(&self) -> RangeInclusive<i32> {
        self.first_year..=self.last_year
    }

    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.data_dir.join(&self.summary_file)
    }

    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::from_env_var(&self.token_var)
    }
}
