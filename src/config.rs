//! Configuration types for dsmig

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Working directory layout
///
/// Retrieved datasets, dry-run conversion output, control file backups and statistics all
/// live under one working directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Working directory (default: ".")
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Copybook directory (default: "<working_dir>/copybooks")
    #[serde(default)]
    pub copybook_dir: Option<PathBuf>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            copybook_dir: None,
        }
    }
}

impl WorkspaceConfig {
    /// Where retrieved datasets land
    pub fn datasets_dir(&self) -> PathBuf {
        self.working_dir.join("datasets")
    }

    /// Where dry-run conversions write their output
    pub fn conversion_dir(&self) -> PathBuf {
        self.working_dir.join("conversion")
    }

    /// Where control file backups are kept
    pub fn backups_dir(&self) -> PathBuf {
        self.working_dir.join("backups")
    }

    /// Where statistics snapshots are written
    pub fn statistics_dir(&self) -> PathBuf {
        self.working_dir.join("statistics")
    }

    /// Where copybooks are looked up
    pub fn copybook_dir(&self) -> PathBuf {
        self.copybook_dir
            .clone()
            .unwrap_or_else(|| self.working_dir.join("copybooks"))
    }
}

/// Control file handling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Field delimiter (default: ',')
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Copy the control file to the backups directory before a run (default: true)
    #[serde(default = "default_true")]
    pub backup: bool,

    /// Tag appended to backup and statistics file names
    #[serde(default)]
    pub tag: Option<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            backup: true,
            tag: None,
        }
    }
}

/// Retrieval settings for the ftp transfer adapter
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Mainframe host name or IP address
    #[serde(default)]
    pub host: Option<String>,

    /// FTP user
    #[serde(default)]
    pub user: Option<String>,

    /// FTP password
    #[serde(default)]
    pub password: Option<String>,

    /// Prefix of the flat files VSAM clusters were unloaded to (required for VSAM)
    #[serde(default)]
    pub vsam_prefix: Option<String>,

    /// Path to the ftp client (auto-detected if None)
    #[serde(default)]
    pub ftp_path: Option<PathBuf>,

    /// Per-dataset time budget (default: 30 minutes)
    #[serde(default = "default_transfer_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Maximum concurrent retrievals (default: 2)
    #[serde(default = "default_transfer_concurrency")]
    pub max_concurrent: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            password: None,
            vsam_prefix: None,
            ftp_path: None,
            timeout: default_transfer_timeout(),
            max_concurrent: default_transfer_concurrency(),
        }
    }
}

/// Conversion settings for the dsmigin adapter
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// EBCDIC to ASCII encoding code passed to dsmigin (default: "US")
    #[serde(default = "default_encoding_code")]
    pub encoding_code: String,

    /// Path to dsmigin (auto-detected if None)
    #[serde(default)]
    pub dsmigin_path: Option<PathBuf>,

    /// Path to cobgensch (auto-detected if None)
    #[serde(default)]
    pub cobgensch_path: Option<PathBuf>,

    /// Path to idcams (auto-detected if None)
    #[serde(default)]
    pub idcams_path: Option<PathBuf>,

    /// Catalog used for VSAM defines when the row has none (default: "SYS1.MASTER.ICFCAT")
    #[serde(default = "default_catalog")]
    pub default_catalog: String,

    /// Volume used for VSAM defines when the row has none (default: "DEFVOL")
    #[serde(default = "default_volume")]
    pub default_volume: String,

    /// Per-dataset time budget (default: 60 minutes)
    #[serde(default = "default_conversion_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Maximum concurrent conversions (default: 1)
    #[serde(default = "default_conversion_concurrency")]
    pub max_concurrent: usize,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            encoding_code: default_encoding_code(),
            dsmigin_path: None,
            cobgensch_path: None,
            idcams_path: None,
            default_catalog: default_catalog(),
            default_volume: default_volume(),
            timeout: default_conversion_timeout(),
            max_concurrent: default_conversion_concurrency(),
        }
    }
}

/// Retry behavior for transient retrieval failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration
///
/// Every field has a default, so an empty JSON object is a valid configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Working directory layout
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Control file handling
    #[serde(default)]
    pub control: ControlConfig,

    /// Retrieval adapter settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Conversion adapter settings
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Retry behavior for retrieval
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a configuration file (JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.transfer.max_concurrent == 0 {
            return Err(Error::config(
                "transfer.max_concurrent",
                "must allow at least one concurrent retrieval",
            ));
        }
        if self.conversion.max_concurrent == 0 {
            return Err(Error::config(
                "conversion.max_concurrent",
                "must allow at least one concurrent conversion",
            ));
        }
        if !self.control.delimiter.is_ascii() || self.control.delimiter == '"' {
            return Err(Error::config(
                "control.delimiter",
                "must be a single ASCII character other than '\"'",
            ));
        }
        if self.transfer.timeout.is_zero() {
            return Err(Error::config("transfer.timeout", "must be positive"));
        }
        if self.conversion.timeout.is_zero() {
            return Err(Error::config("conversion.timeout", "must be positive"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }

    /// Control file delimiter as a byte for the CSV reader/writer
    pub fn delimiter(&self) -> u8 {
        // validate() guarantees ASCII
        self.control.delimiter as u8
    }
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

fn default_transfer_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_transfer_concurrency() -> usize {
    2
}

fn default_encoding_code() -> String {
    "US".to_string()
}

fn default_catalog() -> String {
    "SYS1.MASTER.ICFCAT".to_string()
}

fn default_volume() -> String {
    "DEFVOL".to_string()
}

fn default_conversion_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_conversion_concurrency() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
