//! One coverage run: profile in, statistics out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use rayon::prelude::*;
use regex::Regex;

use crate::annotation;
use crate::cache::{normalize_path, SourceCache};
use crate::correlate::correlate_file;
use crate::error::{GocovError, Result};
use crate::model::{CoverageBlock, CoverageProfile, DiffChange, DiffMode, IgnoreProfile, Statistics};
use crate::parsers::{gocover, golang};
use crate::stats;
use crate::tree::CoverageTree;

/// Changes under review in diff mode.
#[derive(Debug, Clone, Default)]
pub struct DiffInput {
    /// Reported as the comparison branch of the statistics.
    pub compare_branch: Option<String>,
    pub changes: Vec<DiffChange>,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub coverprofile: PathBuf,
    pub repo: PathBuf,
    pub excludes: Vec<Regex>,
    /// `None` runs in full mode.
    pub diff: Option<DiffInput>,
}

/// Resolved ignore annotations of one analysed file.
#[derive(Debug, Clone)]
pub struct FileIgnore {
    pub file_name: String,
    pub profile: IgnoreProfile,
}

#[derive(Debug)]
pub struct RunOutput {
    pub statistics: Statistics,
    pub tree: CoverageTree,
    pub ignores: Vec<FileIgnore>,
}

/// One file to analyse.
struct WorkItem<'a> {
    file_name: String,
    blocks: &'a [CoverageBlock],
    change: Option<&'a DiffChange>,
}

/// Only changed, non-test Go sources that still exist are analysed in diff mode.
fn is_reviewable(change: &DiffChange) -> bool {
    change.mode != DiffMode::Delete
        && change.file_name.ends_with(".go")
        && !change.file_name.ends_with("_test.go")
}

fn analyse_file(cache: &SourceCache, item: &WorkItem<'_>) -> Result<(CoverageProfile, FileIgnore)> {
    let content = cache.read(&item.file_name)?;
    let mut functions = golang::extract_functions(&item.file_name, &content)?;
    let ignore = annotation::resolve(&item.file_name, &content, item.blocks)?;
    let profile = correlate_file(
        &item.file_name,
        &content,
        &mut functions,
        item.blocks,
        &ignore,
        item.change,
    );
    tracing::debug!(
        file = %item.file_name,
        functions = functions.len(),
        effective = profile.counters.effective_lines,
        covered = profile.counters.covered_lines,
        "analysed"
    );
    Ok((
        profile,
        FileIgnore {
            file_name: item.file_name.clone(),
            profile: ignore,
        },
    ))
}

/// Run the whole batch. Any I/O, parse or resolution failure aborts it.
pub fn run(opts: &RunOptions) -> Result<RunOutput> {
    let started = Instant::now();

    let input =
        std::fs::read(&opts.coverprofile).map_err(|e| GocovError::io(&opts.coverprofile, e))?;
    let data = gocover::parse(&input)?;
    let cache = SourceCache::open(&opts.repo)?;

    let mut blocks_by_file: HashMap<String, &[CoverageBlock]> = HashMap::new();
    let mut profile_order = Vec::with_capacity(data.files.len());
    for file in &data.files {
        let relative = cache.resolve(&file.path)?;
        blocks_by_file.insert(relative.clone(), file.blocks.as_slice());
        profile_order.push(relative);
    }

    let items: Vec<WorkItem<'_>> = match &opts.diff {
        None => profile_order
            .into_iter()
            .map(|file_name| WorkItem {
                blocks: blocks_by_file.get(&file_name).copied().unwrap_or_default(),
                file_name,
                change: None,
            })
            .collect(),
        Some(diff) => diff
            .changes
            .iter()
            .filter(|c| is_reviewable(c))
            .map(|change| {
                let file_name = normalize_path(&change.file_name);
                WorkItem {
                    blocks: blocks_by_file.get(&file_name).copied().unwrap_or_default(),
                    file_name,
                    change: Some(change),
                }
            })
            .collect(),
    };
    // Excluded files are never read or parsed.
    let (skipped, items): (Vec<_>, Vec<_>) = items
        .into_iter()
        .partition(|item| stats::is_excluded(&item.file_name, &opts.excludes));
    tracing::debug!(
        files = items.len(),
        skipped = skipped.len(),
        mode = ?data.mode,
        "starting analysis"
    );

    let results: Vec<(CoverageProfile, FileIgnore)> = items
        .par_iter()
        .map(|item| analyse_file(&cache, item))
        .collect::<Result<_>>()?;
    let (profiles, ignores): (Vec<_>, Vec<_>) = results.into_iter().unzip();

    let mut tree = CoverageTree::new(cache.module_path());
    let branch = opts.diff.as_ref().and_then(|d| d.compare_branch.as_deref());
    let mut statistics = stats::assemble(profiles, &opts.excludes, &mut tree, branch);
    statistics
        .excluded_files
        .extend(skipped.into_iter().map(|item| item.file_name));
    statistics.excluded_files.sort();
    statistics.excluded_files.dedup();

    tracing::info!(
        files = statistics.files.len(),
        excluded = statistics.excluded_files.len(),
        effective = statistics.counters.effective_lines,
        covered = statistics.counters.covered_lines,
        percentage = statistics.percentage,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "coverage run complete"
    );

    Ok(RunOutput {
        statistics,
        tree,
        ignores,
    })
}
