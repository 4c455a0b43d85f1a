//! Command handler functions for the gocovrs CLI.
//!
//! Each `cmd_*` function returns the rendered report as a `String` together
//! with the gate outcome, making them easy to test without capturing stdout.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use regex::Regex;

use crate::config::Config;
use crate::diff::{self, DiffSource, FileDiff, GitDiff, StdinDiff};
use crate::pipeline::{self, DiffInput, RunOptions, RunOutput};
use crate::report::ReportFormat;
use crate::stats::GateOutcome;
use crate::telemetry::{self, JsonLinesSink};

/// Exit code when coverage is below the baseline.
pub const EXIT_BELOW_BASELINE: u8 = 12;

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Coverage profile written by `go test -coverprofile`.
    #[arg(long, default_value = "coverage.out")]
    pub coverprofile: PathBuf,

    /// Root of the Go module (the directory holding go.mod).
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Regex of repository-relative paths to leave out. Repeatable.
    #[arg(long = "exclude", value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Fail with exit code 12 when coverage is below this percentage.
    #[arg(long)]
    pub baseline: Option<f64>,

    /// Report format.
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Write the report here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Config file (default: .gocovrs.toml in the repository root).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append JSON-lines telemetry for every tree node and ignore profile.
    #[arg(long)]
    pub telemetry: Option<PathBuf>,
}

impl CommonArgs {
    /// Defaults for a repository, as if no flags were given.
    pub fn for_repo(repo: &Path) -> Self {
        Self {
            coverprofile: repo.join("coverage.out"),
            repo: repo.to_path_buf(),
            exclude: Vec::new(),
            baseline: None,
            format: None,
            output: None,
            config: None,
            telemetry: None,
        }
    }
}

/// What a command produced.
pub struct CommandOutput {
    pub report: String,
    pub gate: GateOutcome,
    pub run: RunOutput,
}

/// Merged and validated configuration of one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    /// Compiled `config.exclude`.
    pub excludes: Vec<Regex>,
}

/// Config file values overridden by command-line flags, validated before
/// anything else runs.
pub fn load_config(args: &CommonArgs, compare_branch: Option<String>) -> Result<Settings> {
    let file = Config::discover(&args.repo, args.config.as_deref())?;
    let config = file.merge(Config {
        exclude: args.exclude.clone(),
        baseline: args.baseline,
        format: args.format,
        compare_branch,
    });
    let excludes = config.validate()?;
    Ok(Settings { config, excludes })
}

/// Where the diff comes from: an explicit file, git against the compare
/// branch, or stdin.
pub fn diff_source(
    args: &CommonArgs,
    settings: &Settings,
    diff_file: Option<PathBuf>,
) -> Box<dyn DiffSource> {
    match (diff_file, &settings.config.compare_branch) {
        (Some(path), _) => Box::new(FileDiff { path }),
        (None, Some(branch)) => Box::new(GitDiff {
            repo: args.repo.clone(),
            compare_branch: branch.clone(),
        }),
        (None, None) => Box::new(StdinDiff),
    }
}

fn execute(
    args: &CommonArgs,
    settings: &Settings,
    diff: Option<DiffInput>,
) -> Result<CommandOutput> {
    let config = &settings.config;
    let opts = RunOptions {
        coverprofile: args.coverprofile.clone(),
        repo: args.repo.clone(),
        excludes: settings.excludes.clone(),
        diff,
    };
    let run = pipeline::run(&opts)
        .with_context(|| format!("Coverage run failed for {}", args.repo.display()))?;

    if let Some(path) = &args.telemetry {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => telemetry::publish(&mut JsonLinesSink::new(file), &run),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot open telemetry file"),
        }
    }

    let mut buf = Vec::new();
    config
        .format
        .unwrap_or_default()
        .generate(&run.statistics, &mut buf)?;
    let report = String::from_utf8(buf).context("report is not valid UTF-8")?;

    let gate = config
        .baseline
        .map_or(GateOutcome::Passed, |b| run.statistics.gate(b));

    Ok(CommandOutput { report, gate, run })
}

/// Coverage of every file in the profile.
pub fn cmd_full(args: &CommonArgs, settings: &Settings) -> Result<CommandOutput> {
    execute(args, settings, None)
}

/// Coverage of the statements touched by the diff `source` produces.
pub fn cmd_diff(
    args: &CommonArgs,
    settings: &Settings,
    source: &dyn DiffSource,
) -> Result<CommandOutput> {
    let diff_text = source.fetch_diff()?;
    let changes = diff::parse_changes(&diff_text);
    tracing::debug!(files = changes.len(), "parsed diff");
    let input = DiffInput {
        compare_branch: settings.config.compare_branch.clone(),
        changes,
    };
    execute(args, settings, Some(input))
}
