//! Multi-file configuration loading.
//!
//! Every `-c` file and every YAML file inside a `-C` directory is read,
//! interpolated and parsed on its own, then folded into one config. Component
//! keys must be unique across all files.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use snafu::ResultExt;

use crate::config::{ConfigPath, GlobalConfig, MetricsConfig, interpolate, is_yaml_file};
use crate::error::{ConfigError, ReadDirSnafu, ReadFileSnafu};

/// A config made of keyed components plus shared sections, loadable from
/// several files.
pub trait Mergeable: Sized + Default {
    type Key: Eq + std::hash::Hash + Clone + std::fmt::Display;
    type Component;

    fn components(&self) -> &IndexMap<Self::Key, Self::Component>;
    fn components_mut(&mut self) -> &mut IndexMap<Self::Key, Self::Component>;
    fn global(&self) -> &GlobalConfig;
    fn global_mut(&mut self) -> &mut GlobalConfig;
    fn metrics(&self) -> &MetricsConfig;
    fn metrics_mut(&mut self) -> &mut MetricsConfig;
    fn parse_yaml(contents: &str) -> Result<Self, ConfigError>;

    /// Merge sections specific to the implementing config.
    fn merge_extra(&mut self, _other: &mut Self) {}

    fn merge(&mut self, mut other: Self) -> Result<(), ConfigError> {
        let duplicates: Vec<String> = other
            .components()
            .keys()
            .filter(|key| self.components().contains_key(*key))
            .map(|key| key.to_string())
            .collect();

        if !duplicates.is_empty() {
            return Err(ConfigError::DuplicateComponents { keys: duplicates });
        }

        let incoming = std::mem::take(other.components_mut());
        self.components_mut().extend(incoming);

        self.global_mut()
            .merge_from(std::mem::take(other.global_mut()));
        self.metrics_mut()
            .merge_from(std::mem::take(other.metrics_mut()));
        self.merge_extra(&mut other);
        Ok(())
    }
}

/// Load and merge every config source, reporting all failures at once.
pub fn load_from_paths<C: Mergeable>(paths: &[ConfigPath]) -> Result<C, ConfigError> {
    let mut config = C::default();
    let mut errors = Vec::new();

    for file in expand_paths(paths, &mut errors) {
        let merged = load_file::<C>(&file).and_then(|partial| config.merge(partial));
        if let Err(e) = merged {
            errors.push(format!("{}: {e}", file.display()));
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::MultipleErrors { errors });
    }
    Ok(config)
}

/// Resolve config sources to a flat list of files. Directory entries are
/// sorted by name; non-YAML entries in directories are ignored.
fn expand_paths(paths: &[ConfigPath], errors: &mut Vec<String>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        match path {
            ConfigPath::File(file) => files.push(file.clone()),
            ConfigPath::Dir(dir) => match yaml_files_in(dir) {
                Ok(found) => files.extend(found),
                Err(e) => errors.push(format!("{}: {e}", dir.display())),
            },
        }
    }
    files
}

fn yaml_files_in(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .context(ReadDirSnafu { path: dir })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_yaml_file(path))
        .collect();
    files.sort();
    Ok(files)
}

fn load_file<C: Mergeable>(path: &Path) -> Result<C, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;

    let result = interpolate(&contents);
    if !result.is_ok() {
        return Err(ConfigError::EnvInterpolation {
            message: result.errors.join("\n"),
        });
    }

    C::parse_yaml(&result.text)
}
