//! Shared data model. Parsers produce statement extents and coverage blocks,
//! the correlator turns them into per-file `CoverageProfile`s, and the
//! assembler rolls those up into `Statistics`.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

/// Coverage percentage, defined as 100.0 when nothing is effective.
#[must_use]
pub fn percent(covered: u64, effective: u64) -> f64 {
    if effective == 0 {
        100.0
    } else {
        covered as f64 / effective as f64 * 100.0
    }
}

/// A 1-based (line, byte column) source position. Ordering is lexicographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Whether a statement counts towards coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Mode {
    #[default]
    Keep,
    Ignore,
}

/// Whether a statement was touched by the diff under review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum State {
    #[default]
    Original,
    Changed,
}

/// The span of one leaf statement inside a function body.
///
/// `end` is exclusive, matching the coverage profile's block ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatement {
    pub start_offset: usize,
    pub end_offset: usize,
    pub start: Position,
    pub end: Position,
    pub reached: u64,
    pub mode: Mode,
    pub state: State,
}

impl SourceStatement {
    pub fn new(start_offset: usize, end_offset: usize, start: Position, end: Position) -> Self {
        Self {
            start_offset,
            end_offset,
            start,
            end,
            reached: 0,
            mode: Mode::Keep,
            state: State::Original,
        }
    }

    /// Upgrade to `Mode::Ignore`. There is no way back.
    pub fn mark_ignored(&mut self) {
        self.mode = Mode::Ignore;
    }

    /// Upgrade to `State::Changed`. There is no way back.
    pub fn mark_changed(&mut self) {
        self.state = State::Changed;
    }

    /// Every source line this statement touches.
    pub fn lines(&self) -> std::ops::RangeInclusive<u32> {
        self.start.line..=self.end.line
    }
}

/// A function declaration, method or literal with its leaf statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFunction {
    pub name: String,
    pub file: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub start_line: u32,
    pub end_line: u32,
    pub statements: Vec<SourceStatement>,
}

/// Structural identity of a coverage block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// One block of a Go coverage profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageBlock {
    pub start: Position,
    pub end: Position,
    pub num_stmt: u32,
    pub count: u64,
}

impl CoverageBlock {
    pub fn key(&self) -> BlockKey {
        BlockKey {
            start_line: self.start.line,
            start_col: self.start.column,
            end_line: self.end.line,
            end_col: self.end.column,
        }
    }
}

/// Counting mode named in the profile header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    Set,
    Count,
    Atomic,
}

impl std::str::FromStr for CountMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "set" => Ok(CountMode::Set),
            "count" => Ok(CountMode::Count),
            "atomic" => Ok(CountMode::Atomic),
            other => Err(format!("unknown coverage mode '{other}'")),
        }
    }
}

/// The blocks of one source file, sorted by start position.
#[derive(Debug, Clone, Default)]
pub struct FileBlocks {
    pub path: String,
    pub blocks: Vec<CoverageBlock>,
}

/// A parsed coverage profile.
#[derive(Debug, Clone)]
pub struct CoverageData {
    pub mode: CountMode,
    pub files: Vec<FileBlocks>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffMode {
    New,
    Modify,
    Delete,
    Rename,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    Equal,
    Add,
    Delete,
}

/// A contiguous run of lines, numbered in the new version of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSection {
    pub operation: Operation,
    pub start_line: u32,
    pub end_line: u32,
    pub contents: Vec<String>,
}

/// All changes to a single file relative to the comparison branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffChange {
    pub file_name: String,
    pub mode: DiffMode,
    pub sections: Vec<DiffSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum IgnoreKind {
    File,
    #[default]
    Block,
}

/// One resolved `+gocover:ignore:block` annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoreBlock {
    pub annotation: String,
    pub lines: Vec<u32>,
    pub contents: Vec<String>,
}

/// Ignore annotations resolved against one file's coverage blocks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IgnoreProfile {
    pub kind: IgnoreKind,
    pub ignored_lines: BTreeSet<u32>,
    #[serde(skip)]
    pub ignored_blocks: HashSet<BlockKey>,
    pub blocks: Vec<IgnoreBlock>,
}

impl IgnoreProfile {
    pub fn whole_file() -> Self {
        Self {
            kind: IgnoreKind::File,
            ..Default::default()
        }
    }

    pub fn ignores_file(&self) -> bool {
        self.kind == IgnoreKind::File
    }

    pub fn ignores_block(&self, key: &BlockKey) -> bool {
        self.ignores_file() || self.ignored_blocks.contains(key)
    }
}

/// Statement counters shared by file profiles, tree nodes and the run total.
/// Every unit is one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counters {
    pub total_lines: u64,
    pub effective_lines: u64,
    pub ignored_lines: u64,
    pub covered_lines: u64,
    pub violation_lines: u64,
    pub covered_but_ignored_lines: u64,
}

impl Counters {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        percent(self.covered_lines, self.effective_lines)
    }

    pub fn is_zero(&self) -> bool {
        *self == Counters::default()
    }
}

impl std::ops::AddAssign for Counters {
    fn add_assign(&mut self, rhs: Self) {
        self.total_lines += rhs.total_lines;
        self.effective_lines += rhs.effective_lines;
        self.ignored_lines += rhs.ignored_lines;
        self.covered_lines += rhs.covered_lines;
        self.violation_lines += rhs.violation_lines;
        self.covered_but_ignored_lines += rhs.covered_but_ignored_lines;
    }
}

impl std::iter::Sum for Counters {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Counters::default(), |mut acc, c| {
            acc += c;
            acc
        })
    }
}

/// A run of uncovered lines with the source they contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationSection {
    pub violation_lines: Vec<u32>,
    pub start_line: u32,
    pub end_line: u32,
    pub contents: Vec<String>,
}

/// Correlated coverage of one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionCoverage {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(flatten)]
    pub counters: Counters,
}

/// Correlated coverage of a single source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageProfile {
    pub file_name: String,
    #[serde(flatten)]
    pub counters: Counters,
    pub functions: Vec<FunctionCoverage>,
    pub violation_sections: Vec<ViolationSection>,
}

impl CoverageProfile {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.counters.percentage()
    }
}

/// Final, report-ready result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_branch: Option<String>,
    #[serde(flatten)]
    pub counters: Counters,
    pub percentage: f64,
    pub files: Vec<CoverageProfile>,
    pub excluded_files: Vec<String>,
}
