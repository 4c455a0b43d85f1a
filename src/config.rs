//! Run configuration: an optional `.gocovrs.toml` in the repository root,
//! overridden by command-line flags.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::{GocovError, Result};
use crate::report::ReportFormat;

/// Name of the config file looked up in the repository root.
pub const CONFIG_FILE_NAME: &str = ".gocovrs.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Regexes matched against repository-relative paths.
    pub exclude: Vec<String>,
    /// Minimum coverage percentage.
    pub baseline: Option<f64>,
    pub format: Option<ReportFormat>,
    pub compare_branch: Option<String>,
}

impl Config {
    /// Parse config file contents.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| GocovError::Config(e.to_string()))
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| GocovError::io(path, e))?;
        let config = Self::parse(&contents)
            .map_err(|e| GocovError::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load the explicit config file if given, otherwise `.gocovrs.toml` in
    /// `repo` when present, otherwise defaults.
    pub fn discover(repo: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let candidate = repo.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::from_file(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Layer `overrides` on top of `self`. Scalars are replaced when set,
    /// exclusion lists are concatenated.
    #[must_use]
    pub fn merge(mut self, overrides: Config) -> Self {
        self.exclude.extend(overrides.exclude);
        self.baseline = overrides.baseline.or(self.baseline);
        self.format = overrides.format.or(self.format);
        self.compare_branch = overrides.compare_branch.or(self.compare_branch);
        self
    }

    /// Compile the exclusion patterns and check the baseline. Must run before
    /// any coverage work.
    pub fn validate(&self) -> Result<Vec<Regex>> {
        if let Some(baseline) = self.baseline {
            if !(0.0..=100.0).contains(&baseline) {
                return Err(GocovError::Config(format!(
                    "baseline must be between 0 and 100, got {baseline}"
                )));
            }
        }
        self.exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| GocovError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }
}
