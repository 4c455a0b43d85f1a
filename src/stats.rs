//! Assembly of per-file profiles into run statistics, and the baseline gate.

use regex::Regex;
use serde::Serialize;

use crate::cache::normalize_path;
use crate::model::{percent, CoverageProfile, Statistics};
use crate::tree::CoverageTree;

/// Result of comparing a run against the configured baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum GateOutcome {
    Passed,
    Failed { threshold: f64, actual: f64 },
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, GateOutcome::Passed)
    }
}

impl Statistics {
    /// Fails when the run percentage is strictly below `baseline`.
    pub fn gate(&self, baseline: f64) -> GateOutcome {
        if self.percentage < baseline {
            GateOutcome::Failed {
                threshold: baseline,
                actual: self.percentage,
            }
        } else {
            GateOutcome::Passed
        }
    }
}

/// True when any pattern matches the normalized path.
pub fn is_excluded(path: &str, patterns: &[Regex]) -> bool {
    let path = normalize_path(path);
    patterns.iter().any(|p| p.is_match(&path))
}

/// Drop excluded files, insert the rest into `tree` and collect it once.
///
/// The tree must be fresh: its root becomes the run total.
pub fn assemble(
    profiles: Vec<CoverageProfile>,
    excludes: &[Regex],
    tree: &mut CoverageTree,
    comparison_branch: Option<&str>,
) -> Statistics {
    let (excluded, files): (Vec<_>, Vec<_>) = profiles
        .into_iter()
        .partition(|p| is_excluded(&p.file_name, excludes));

    let mut excluded_files: Vec<String> = excluded.into_iter().map(|p| p.file_name).collect();
    excluded_files.sort();
    for name in &excluded_files {
        tracing::debug!(file = %name, "excluded");
    }

    for profile in &files {
        tree.find_or_create(&profile.file_name).counters = profile.counters;
    }
    let counters = tree.collect_coverage_data();

    Statistics {
        comparison_branch: comparison_branch.map(str::to_string),
        counters,
        percentage: percent(counters.covered_lines, counters.effective_lines),
        files,
        excluded_files,
    }
}
