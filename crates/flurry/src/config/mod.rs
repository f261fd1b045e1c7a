//! Configuration for the flurry bucket poller.

mod poller_key;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use flurry_core::config::{
    ConfigPath, GlobalConfig, InterpolationResult, Mergeable, MetricsConfig, Resource,
    interpolate, load_from_paths,
};
pub use poller_key::PollerKey;

use flurry_core::Trigger;
use flurry_core::error::ConfigError;

use crate::event::ReadMode;
use crate::filter::FileEligibilityFilter;

fn default_separator() -> String {
    "/".to_string()
}

fn default_tmp_suffix() -> String {
    ".tmp".to_string()
}

fn default_true() -> bool {
    true
}

fn default_fixed_delay() -> u64 {
    1
}

/// When a poller runs its cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    /// Seconds between the end of one cycle and the start of the next.
    #[serde(default = "default_fixed_delay")]
    pub fixed_delay_secs: u64,
    /// Seconds to wait before the first cycle.
    #[serde(default)]
    pub initial_delay_secs: u64,
    /// Six-field cron expression (`sec min hour dom month dow`).
    /// Takes precedence over the fixed delay when set.
    #[serde(default)]
    pub cron: Option<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            fixed_delay_secs: default_fixed_delay(),
            initial_delay_secs: 0,
            cron: None,
        }
    }
}

impl TriggerConfig {
    pub fn to_trigger(&self, poller: &PollerKey) -> Result<Trigger, ConfigError> {
        match non_empty(&self.cron) {
            Some(expression) => {
                Trigger::cron(expression).map_err(|e| ConfigError::InvalidCron {
                    poller: poller.to_string(),
                    expression: expression.to_string(),
                    message: e.to_string(),
                })
            }
            None => Ok(Trigger::FixedDelay {
                delay: Duration::from_secs(self.fixed_delay_secs),
                initial_delay: Duration::from_secs(self.initial_delay_secs),
            }),
        }
    }
}

/// Where the set of already transferred keys is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeenStateConfig {
    /// Storage URL of the state directory (supports S3, GCS, Azure, local).
    pub uri: String,
    /// Storage options for the state location.
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Configuration for one bucket poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollerConfig {
    /// Remote directory to poll (supports S3, GCS, Azure, local).
    pub remote_dir: String,
    /// Local directory that receives staged files.
    pub local_dir: String,
    /// Separator between key segments on the remote side.
    #[serde(default = "default_separator")]
    pub remote_file_separator: String,
    /// Suffix of in-flight downloads in `local_dir`.
    #[serde(default = "default_tmp_suffix")]
    pub tmp_file_suffix: String,
    /// Delete remote objects once staged.
    #[serde(default)]
    pub delete_remote_files: bool,
    /// Move remote objects under this prefix (relative to `remote_dir`) once staged.
    #[serde(default)]
    pub archive_dir: Option<String>,
    /// Copy the remote last-modified time onto staged files.
    #[serde(default)]
    pub preserve_timestamp: bool,
    /// Create `local_dir` when it does not exist.
    #[serde(default = "default_true")]
    pub auto_create_local_dir: bool,
    /// Glob matched against object base names.
    #[serde(default)]
    pub filename_pattern: Option<String>,
    /// Regex fully matched against object base names. Ignored when
    /// `filename_pattern` is set.
    #[serde(default)]
    pub filename_regex: Option<String>,
    /// Maximum number of objects staged per cycle. Unlimited when absent.
    #[serde(default)]
    pub max_messages_per_poll: Option<usize>,
    /// List the whole tree below `remote_dir` rather than direct children.
    #[serde(default)]
    pub recursive: bool,
    /// What an emitted event carries.
    #[serde(default)]
    pub read_mode: ReadMode,
    /// In `lines` mode, emit one event per line.
    #[serde(default)]
    pub split_lines: bool,
    /// With `split_lines`, bracket each file's lines by start and end markers.
    #[serde(default)]
    pub with_markers: bool,
    /// Poll schedule.
    #[serde(default)]
    pub trigger: TriggerConfig,
    /// Optional persistence for the seen set.
    #[serde(default)]
    pub seen_state: Option<SeenStateConfig>,
    /// Storage options for `remote_dir` (credentials, region, etc.).
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl PollerConfig {
    /// A poller config with every option at its default.
    pub fn new(remote_dir: impl Into<String>, local_dir: impl Into<String>) -> Self {
        Self {
            remote_dir: remote_dir.into(),
            local_dir: local_dir.into(),
            remote_file_separator: default_separator(),
            tmp_file_suffix: default_tmp_suffix(),
            delete_remote_files: false,
            archive_dir: None,
            preserve_timestamp: false,
            auto_create_local_dir: true,
            filename_pattern: None,
            filename_regex: None,
            max_messages_per_poll: None,
            recursive: false,
            read_mode: ReadMode::default(),
            split_lines: false,
            with_markers: false,
            trigger: TriggerConfig::default(),
            seen_state: None,
            storage_options: HashMap::new(),
        }
    }

    /// Exclusive resources used by this poller.
    ///
    /// Staging into a shared local directory would let two writers race on
    /// temp and final names.
    pub fn resources(&self) -> Vec<Resource> {
        vec![Resource::directory(&self.local_dir)]
    }

    /// The archive prefix, if one is set and non-empty.
    pub fn archive_prefix(&self) -> Option<&str> {
        non_empty(&self.archive_dir)
            .map(|p| p.trim_end_matches(self.remote_file_separator.as_str()))
            .filter(|p| !p.is_empty())
    }

    /// Build the eligibility filter. A non-empty pattern wins over the regex.
    pub fn filter(&self, poller: &PollerKey) -> Result<FileEligibilityFilter, ConfigError> {
        if let Some(pattern) = non_empty(&self.filename_pattern) {
            return FileEligibilityFilter::glob(pattern).map_err(|e| ConfigError::InvalidFilter {
                poller: poller.to_string(),
                kind: "filename_pattern",
                pattern: pattern.to_string(),
                message: e.to_string(),
            });
        }
        if let Some(regex) = non_empty(&self.filename_regex) {
            return FileEligibilityFilter::regex(regex).map_err(|e| ConfigError::InvalidFilter {
                poller: poller.to_string(),
                kind: "filename_regex",
                pattern: regex.to_string(),
                message: e.to_string(),
            });
        }
        Ok(FileEligibilityFilter::AcceptAll)
    }

    fn validate(&self, key: &PollerKey) -> Result<(), ConfigError> {
        let poller = key.to_string();
        if self.remote_dir.trim().is_empty() {
            return Err(ConfigError::EmptyRemoteDir { poller });
        }
        if self.local_dir.trim().is_empty() {
            return Err(ConfigError::EmptyLocalDir { poller });
        }
        if self.remote_file_separator.is_empty() {
            return Err(ConfigError::EmptySeparator { poller });
        }
        if self.tmp_file_suffix.is_empty() {
            return Err(ConfigError::EmptyTmpSuffix { poller });
        }
        if self.delete_remote_files && self.archive_prefix().is_some() {
            return Err(ConfigError::ConflictingOptions {
                poller,
                first: "delete_remote_files",
                second: "archive_dir",
            });
        }
        if self.max_messages_per_poll == Some(0) {
            return Err(ConfigError::ZeroLimit {
                poller,
                field: "max_messages_per_poll",
            });
        }
        self.filter(key)?;
        self.trigger.to_trigger(key)?;
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Where emitted events go when running as a binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    /// One JSON object per line on stdout.
    #[default]
    Stdout,
    /// One `info` log record per event.
    Log,
}

/// Main configuration for flurry.
///
/// # Example
///
/// ```yaml
/// pollers:
///   invoices:
///     remote_dir: s3://bucket/incoming
///     local_dir: /var/spool/flurry/invoices
///     filename_pattern: "*.csv"
///     max_messages_per_poll: 100
///   reports:
///     remote_dir: gs://reports/daily
///     local_dir: /var/spool/flurry/reports
///     trigger:
///       cron: "0 */5 * * * *"
///
/// global:
///   poll_jitter_secs: 5
///
/// sink:
///   kind: stdout
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Named poller configurations.
    #[serde(default)]
    pub pollers: IndexMap<PollerKey, PollerConfig>,
    /// Global configuration options.
    #[serde(default)]
    pub global: GlobalConfig,
    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Event sink used by the binary.
    #[serde(default)]
    pub sink: SinkConfig,
}

impl Mergeable for Config {
    type Key = PollerKey;
    type Component = PollerConfig;

    fn components(&self) -> &IndexMap<Self::Key, Self::Component> {
        &self.pollers
    }

    fn components_mut(&mut self) -> &mut IndexMap<Self::Key, Self::Component> {
        &mut self.pollers
    }

    fn global(&self) -> &GlobalConfig {
        &self.global
    }

    fn global_mut(&mut self) -> &mut GlobalConfig {
        &mut self.global
    }

    fn metrics(&self) -> &MetricsConfig {
        &self.metrics
    }

    fn metrics_mut(&mut self) -> &mut MetricsConfig {
        &mut self.metrics
    }

    fn parse_yaml(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })
    }

    fn merge_extra(&mut self, other: &mut Self) {
        if other.sink != SinkConfig::default() {
            self.sink = other.sink;
        }
    }
}

impl Config {
    /// Load configuration from multiple paths (files or directories).
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        let config: Self = load_from_paths(paths)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let config = Self::parse_yaml(&result.text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every poller, then check that no two pollers share a
    /// local directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, poller) in &self.pollers {
            poller.validate(key)?;
        }

        let conflicts = Resource::conflicts(
            self.pollers
                .iter()
                .map(|(key, poller)| (key.clone(), poller.resources())),
        );
        if !conflicts.is_empty() {
            return Err(ConfigError::ResourceConflict {
                message: Resource::describe_conflicts(&conflicts),
            });
        }

        Ok(())
    }

    pub fn pollers(&self) -> impl Iterator<Item = (&PollerKey, &PollerConfig)> {
        self.pollers.iter()
    }

    pub fn poller_count(&self) -> usize {
        self.pollers.len()
    }
}
