/// Parse a unified diff into per-file [`DiffChange`]s: which lines of the new
/// version of each file were added, and whether the file is new, modified,
/// renamed or deleted.
///
/// Also provides a [`DiffSource`] trait that abstracts over different ways to
/// obtain the diff (git, stdin, a file on disk). The correlation engine never
/// talks to version control itself.
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

use crate::model::{DiffChange, DiffMode, DiffSection, Operation};

// ---------------------------------------------------------------------------
// Diff sources
// ---------------------------------------------------------------------------

/// A source for obtaining a unified diff.
pub trait DiffSource {
    /// Fetch the diff text.
    fn fetch_diff(&self) -> Result<String>;
}

/// Diff from stdin.
pub struct StdinDiff;

impl DiffSource for StdinDiff {
    fn fetch_diff(&self) -> Result<String> {
        std::io::read_to_string(std::io::stdin()).context("Failed to read diff from stdin")
    }
}

/// Diff stored in a file.
pub struct FileDiff {
    pub path: PathBuf,
}

impl DiffSource for FileDiff {
    fn fetch_diff(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read diff from {}", self.path.display()))
    }
}

/// Working tree diff against the merge base with a comparison branch.
pub struct GitDiff {
    /// Repository to run git in.
    pub repo: PathBuf,
    /// Branch to compare against, e.g. `origin/main`.
    pub compare_branch: String,
}

fn run_git(repo: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git {} failed: {stderr}", args.join(" "));
    }

    String::from_utf8(output.stdout).context("git output not valid UTF-8")
}

impl DiffSource for GitDiff {
    fn fetch_diff(&self) -> Result<String> {
        let base = run_git(&self.repo, &["merge-base", &self.compare_branch, "HEAD"])?;
        let base = base.trim();
        tracing::debug!(branch = %self.compare_branch, %base, "diffing against merge base");
        run_git(
            &self.repo,
            &["diff", "--no-color", "--no-ext-diff", "-M", base],
        )
    }
}

// ---------------------------------------------------------------------------
// Diff parsing
// ---------------------------------------------------------------------------

/// Strip common VCS prefixes: "b/" (default git), "a/" (some tools).
/// Also handles --no-prefix diffs where no prefix is present.
fn strip_prefix(path: &str) -> &str {
    path.strip_prefix("b/")
        .or_else(|| path.strip_prefix("a/"))
        .unwrap_or(path)
}

/// Parse "@@ -old_start[,old_count] +new_start[,new_count] @@" into
/// (new_start, old_count, new_count).
fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32)> {
    let after_at = line.strip_prefix("@@ ")?;
    let mut parts = after_at.split(' ');
    let old_part = parts.next()?.strip_prefix('-')?;
    let new_part = parts.next()?.strip_prefix('+')?;

    let count = |part: &str| -> Option<(u32, u32)> {
        match part.split_once(',') {
            Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
            None => Some((part.parse().ok()?, 1)),
        }
    };
    let (_, old_count) = count(old_part)?;
    let (new_start, new_count) = count(new_part)?;
    Some((new_start, old_count, new_count))
}

/// The file currently being parsed.
struct Pending {
    file: Option<String>,
    mode: DiffMode,
    sections: Vec<DiffSection>,
    new_line: u32,
    old_remaining: u32,
    new_remaining: u32,
}

impl Pending {
    fn new() -> Self {
        Self {
            file: None,
            mode: DiffMode::Modify,
            sections: Vec::new(),
            new_line: 0,
            old_remaining: 0,
            new_remaining: 0,
        }
    }

    fn in_hunk(&self) -> bool {
        self.old_remaining > 0 || self.new_remaining > 0
    }

    fn has_content(&self) -> bool {
        self.file.is_some() || !self.sections.is_empty()
    }

    fn add_line(&mut self, text: &str) {
        let line = self.new_line;
        match self.sections.last_mut() {
            Some(section) if section.end_line + 1 == line => {
                section.end_line = line;
                section.contents.push(text.to_string());
            }
            _ => self.sections.push(DiffSection {
                operation: Operation::Add,
                start_line: line,
                end_line: line,
                contents: vec![text.to_string()],
            }),
        }
    }

    fn finish(self, out: &mut Vec<DiffChange>) {
        let Some(file_name) = self.file else {
            return;
        };
        let sections = if self.mode == DiffMode::Delete {
            Vec::new()
        } else {
            self.sections
        };
        out.push(DiffChange {
            file_name,
            mode: self.mode,
            sections,
        });
    }
}

/// Parse a unified diff (e.g. `git diff`) into one [`DiffChange`] per file,
/// in diff order. Added lines are numbered in the new file and grouped into
/// contiguous `Add` sections.
pub fn parse_changes(diff_text: &str) -> Vec<DiffChange> {
    let mut changes = Vec::new();
    let mut current = Pending::new();

    for line in diff_text.lines() {
        if current.in_hunk() {
            if line.starts_with('\\') {
                // "\ No newline at end of file" is metadata, not a real line.
            } else if let Some(text) = line.strip_prefix('+') {
                current.add_line(text);
                current.new_line += 1;
                current.new_remaining = current.new_remaining.saturating_sub(1);
            } else if line.starts_with('-') {
                current.old_remaining = current.old_remaining.saturating_sub(1);
            } else {
                current.new_line += 1;
                current.new_remaining = current.new_remaining.saturating_sub(1);
                current.old_remaining = current.old_remaining.saturating_sub(1);
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            std::mem::replace(&mut current, Pending::new()).finish(&mut changes);
            current.file = rest.rsplit_once(" b/").map(|(_, new)| new.to_string());
        } else if line.starts_with("new file mode") {
            current.mode = DiffMode::New;
        } else if line.starts_with("deleted file mode") {
            current.mode = DiffMode::Delete;
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            current.mode = DiffMode::Rename;
            current.file = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("--- ") {
            // Plain unified diffs have no "diff --git" line between files.
            if !current.sections.is_empty() {
                std::mem::replace(&mut current, Pending::new()).finish(&mut changes);
            }
            if rest.trim_end() == "/dev/null" {
                current.mode = DiffMode::New;
            }
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            let rest = rest.trim_end();
            if rest == "/dev/null" {
                current.mode = DiffMode::Delete;
            } else {
                // Drop a trailing tab-separated timestamp.
                let path = rest.split('\t').next().unwrap_or(rest);
                current.file = Some(strip_prefix(path).to_string());
            }
        } else if line.starts_with("@@ ") {
            if let Some((new_start, old_count, new_count)) = parse_hunk_header(line) {
                current.new_line = new_start;
                current.old_remaining = old_count;
                current.new_remaining = new_count;
            }
        }
    }

    if current.has_content() {
        current.finish(&mut changes);
    }
    changes
}
