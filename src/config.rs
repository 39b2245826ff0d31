//! Configuration system for imsg.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/imsg/config.toml`
//! 3. **Environment variables** - `IMSG_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! chat_db = "~/Library/Messages/chat.db"
//! message_source = "~/.local/share/imsg/messages.csv"
//! contact_source = "~/Downloads/contacts.vcf"
//! output = "~/.local/share/imsg/labeled.csv"
//!
//! [labeling]
//! owner_label = "Me"
//! on_malformed = "abort"
//!
//! [analysis]
//! bucket_days = 10
//! segment_minutes = 20
//! top_n = 30
//!
//! [output]
//! format = "text"
//! colors = true
//! ```

use crate::analysis::ReportOptions;
use crate::contacts::MalformedPolicy;
use crate::error::{ImsgError, Result};
use crate::label::LabelOptions;
use crate::model::DEFAULT_OWNER_LABEL;
use crate::pipeline::PipelinePaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure for imsg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input and output locations.
    pub paths: PathsConfig,
    /// Contact join behavior.
    pub labeling: LabelingConfig,
    /// Report parameters.
    pub analysis: AnalysisConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// Path configuration. Unset paths fall back to the data directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Messages database.
    /// Environment variable: `IMSG_CHAT_DB`
    pub chat_db: Option<PathBuf>,

    /// Extracted message table.
    /// Environment variable: `IMSG_MESSAGES`
    pub message_source: Option<PathBuf>,

    /// Contact list (`.vcf` or `.csv`).
    /// Environment variable: `IMSG_CONTACTS`
    pub contact_source: Option<PathBuf>,

    /// Labeled message table.
    /// Environment variable: `IMSG_OUTPUT`
    pub output: Option<PathBuf>,
}

/// Labeling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    /// Sender label for the account owner.
    /// Environment variable: `IMSG_OWNER_LABEL`
    pub owner_label: String,

    /// Contact rows without identifier or name: `abort` or `skip`.
    pub on_malformed: MalformedPolicy,
}

/// Report parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Days per activity bucket.
    /// Environment variable: `IMSG_BUCKET_DAYS`
    pub bucket_days: u32,

    /// Minutes per time-of-day segment (1-1440).
    /// Environment variable: `IMSG_SEGMENT_MINUTES`
    pub segment_minutes: u32,

    /// Entries in top-N tables.
    /// Environment variable: `IMSG_TOP`
    pub top_n: usize,
}

/// Output formatting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text, json, json-pretty, csv.
    /// Environment variable: `IMSG_FORMAT`
    pub format: String,

    /// Enable colored output.
    pub colors: bool,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            owner_label: DEFAULT_OWNER_LABEL.to_string(),
            on_malformed: MalformedPolicy::Abort,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let defaults = ReportOptions::default();
        Self {
            bucket_days: defaults.bucket_days,
            segment_minutes: defaults.segment_minutes,
            top_n: defaults.top_n,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/imsg/config.toml)
    /// 3. Compiled defaults
    ///
    /// # Errors
    ///
    /// Returns [`ImsgError::ConfigError`] if the user config file exists but
    /// cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config()? {
            config.merge(user_config);
        }

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns [`ImsgError::ConfigError`] if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ImsgError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = toml::from_str(&content).map_err(|e| ImsgError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Load the user configuration file from the standard location.
    fn load_user_config() -> Result<Option<Self>> {
        let Some(config_path) = Self::user_config_path() else {
            return Ok(None);
        };
        if !config_path.exists() {
            debug!("Config file not found: {}", config_path.display());
            return Ok(None);
        }
        Self::load_from_file(&config_path).map(Some)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("imsg").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `IMSG_*` overrides from a variable lookup. Unparsable numbers are
    /// ignored with a warning.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("IMSG_CHAT_DB") {
            self.paths.chat_db = Some(PathBuf::from(path));
        }
        if let Some(path) = var("IMSG_MESSAGES") {
            self.paths.message_source = Some(PathBuf::from(path));
        }
        if let Some(path) = var("IMSG_CONTACTS") {
            self.paths.contact_source = Some(PathBuf::from(path));
        }
        if let Some(path) = var("IMSG_OUTPUT") {
            self.paths.output = Some(PathBuf::from(path));
        }

        if let Some(label) = var("IMSG_OWNER_LABEL") {
            self.labeling.owner_label = label;
        }

        parse_override(&var, "IMSG_BUCKET_DAYS", &mut self.analysis.bucket_days);
        parse_override(&var, "IMSG_SEGMENT_MINUTES", &mut self.analysis.segment_minutes);
        parse_override(&var, "IMSG_TOP", &mut self.analysis.top_n);

        if let Some(format) = var("IMSG_FORMAT") {
            self.output.format = format;
        }
        if var("IMSG_NO_COLOR").is_some() || var("NO_COLOR").is_some() {
            self.output.colors = false;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        // Paths
        if other.paths.chat_db.is_some() {
            self.paths.chat_db = other.paths.chat_db;
        }
        if other.paths.message_source.is_some() {
            self.paths.message_source = other.paths.message_source;
        }
        if other.paths.contact_source.is_some() {
            self.paths.contact_source = other.paths.contact_source;
        }
        if other.paths.output.is_some() {
            self.paths.output = other.paths.output;
        }

        self.labeling = other.labeling;
        self.analysis = other.analysis;
        self.output = other.output;
    }

    /// Resolved pipeline paths, using defaults for anything unset.
    #[must_use]
    pub fn pipeline_paths(&self) -> PipelinePaths {
        PipelinePaths {
            chat_db: self
                .paths
                .chat_db
                .clone()
                .unwrap_or_else(crate::default_chat_db_path),
            message_source: self
                .paths
                .message_source
                .clone()
                .unwrap_or_else(crate::default_message_table_path),
            contact_source: self
                .paths
                .contact_source
                .clone()
                .unwrap_or_else(crate::default_contacts_path),
            output: self
                .paths
                .output
                .clone()
                .unwrap_or_else(crate::default_labeled_table_path),
        }
    }

    #[must_use]
    pub fn label_options(&self) -> LabelOptions {
        LabelOptions {
            owner_label: self.labeling.owner_label.clone(),
        }
    }

    #[must_use]
    pub const fn report_options(&self) -> ReportOptions {
        ReportOptions {
            bucket_days: self.analysis.bucket_days,
            segment_minutes: self.analysis.segment_minutes,
            top_n: self.analysis.top_n,
        }
    }

    /// Save the current configuration to the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self) -> std::io::Result<PathBuf> {
        let config_path = Self::user_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(config_path)
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_override<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = var(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring {key}={raw}: not a valid number"),
        }
    }
}
