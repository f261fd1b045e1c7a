//! Error types shared by the flurry runtime.
//!
//! Storage, configuration, metrics and setup errors live here so the
//! connector crate can wrap them in its own taxonomy.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error: {source}"))]
    GcsConfig { source: object_store::Error },

    /// Azure configuration error.
    #[snafu(display("Azure configuration error: {source}"))]
    AzureConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Remote directory is empty for a poller.
    #[snafu(display("Poller '{poller}' has empty remote_dir"))]
    EmptyRemoteDir { poller: String },

    /// Local directory is empty for a poller.
    #[snafu(display("Poller '{poller}' has empty local_dir"))]
    EmptyLocalDir { poller: String },

    /// Remote separator is empty.
    #[snafu(display("Poller '{poller}' has empty remote_file_separator"))]
    EmptySeparator { poller: String },

    /// Temporary suffix is empty, which would make staging non-atomic.
    #[snafu(display("Poller '{poller}' has empty tmp_file_suffix"))]
    EmptyTmpSuffix { poller: String },

    /// A filename filter could not be compiled.
    #[snafu(display("Poller '{poller}' has invalid {kind} '{pattern}': {message}"))]
    InvalidFilter {
        poller: String,
        kind: &'static str,
        pattern: String,
        message: String,
    },

    /// A cron trigger expression could not be parsed.
    #[snafu(display("Poller '{poller}' has invalid cron expression '{expression}': {message}"))]
    InvalidCron {
        poller: String,
        expression: String,
        message: String,
    },

    /// Two options that exclude each other were both set.
    #[snafu(display("Poller '{poller}' sets both '{first}' and '{second}'"))]
    ConflictingOptions {
        poller: String,
        first: &'static str,
        second: &'static str,
    },

    /// A limit that must be positive was zero.
    #[snafu(display("Poller '{poller}' has {field} = 0"))]
    ZeroLimit {
        poller: String,
        field: &'static str,
    },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },

    /// Resource conflict detected (e.g., two pollers staging into one directory).
    #[snafu(display("Resource conflict: {message}"))]
    ResourceConflict { message: String },

    /// Duplicate component keys found across config files.
    #[snafu(display("Duplicate component keys: {}", keys.join(", ")))]
    DuplicateComponents { keys: Vec<String> },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },

    /// Failed to read configuration directory.
    #[snafu(display("Failed to read directory {}", path.display()))]
    ReadDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Multiple configuration errors occurred.
    #[snafu(display("Multiple config errors:\n{}", errors.join("\n")))]
    MultipleErrors { errors: Vec<String> },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics server already initialized (double-init attempted).
    #[snafu(display("Metrics server already initialized"))]
    AlreadyInitialized,

    /// Metrics server not initialized (controller accessed before init).
    #[snafu(display("Metrics server not initialized"))]
    NotInitialized,
}

// ============ Pipeline Setup Errors ============

/// Errors that can occur during pipeline setup (before running).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineSetupError {
    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Failed to initialize metrics.
    #[snafu(display("Failed to initialize metrics: {source}"))]
    Metrics { source: MetricsError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = StorageError::ObjectStore {
            source: object_store::Error::NotFound {
                path: "missing.json".to_string(),
                source: "gone".into(),
            },
        };
        assert!(err.is_not_found());

        let err = StorageError::InvalidUrl {
            url: "nope://".to_string(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ConflictingOptions {
            poller: "invoices".to_string(),
            first: "delete_remote_files",
            second: "archive_dir",
        };
        assert_eq!(
            err.to_string(),
            "Poller 'invoices' sets both 'delete_remote_files' and 'archive_dir'"
        );
    }
}
