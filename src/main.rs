use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gocovrs::cli::{self, CommonArgs, EXIT_BELOW_BASELINE};
use gocovrs::stats::GateOutcome;

/// gocovrs — Diff-aware statement coverage for Go repositories.
#[derive(Parser)]
#[command(name = "gocovrs", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report coverage of every file in the coverage profile.
    Full {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Report coverage of the statements changed relative to a branch.
    Diff {
        #[command(flatten)]
        common: CommonArgs,

        /// Branch to diff against, e.g. "origin/main". Uses git in --repo.
        #[arg(long)]
        compare_branch: Option<String>,

        /// Read a unified diff from this file instead of running git.
        /// If neither this nor a compare branch is given, reads stdin.
        #[arg(long, conflicts_with = "compare_branch")]
        diff_file: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn write_report(common: &CommonArgs, report: &str) -> Result<()> {
    match &common.output {
        Some(path) => std::fs::write(path, report)
            .with_context(|| format!("Failed to write report to {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(report.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = Cli::parse();

    let (common, output) = match args.command {
        Commands::Full { common } => {
            let settings = cli::load_config(&common, None)?;
            let output = cli::cmd_full(&common, &settings)?;
            (common, output)
        }
        Commands::Diff {
            common,
            compare_branch,
            diff_file,
        } => {
            let settings = cli::load_config(&common, compare_branch)?;
            let source = cli::diff_source(&common, &settings, diff_file);
            let output = cli::cmd_diff(&common, &settings, source.as_ref())?;
            (common, output)
        }
    };

    write_report(&common, &output.report)?;

    match output.gate {
        GateOutcome::Passed => Ok(ExitCode::SUCCESS),
        GateOutcome::Failed { threshold, actual } => {
            eprintln!("Coverage {actual:.2}% is below the baseline of {threshold:.2}%");
            Ok(ExitCode::from(EXIT_BELOW_BASELINE))
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}
