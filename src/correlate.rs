//! Correlation of statement extents with coverage blocks, ignore profiles
//! and diff changes.
//!
//! All inputs are sorted by position, so matching is a forward merge-scan:
//! the block cursor never moves back.

use crate::model::{
    Counters, CoverageBlock, CoverageProfile, DiffChange, FunctionCoverage, IgnoreProfile, Mode,
    Operation, SourceFunction, SourceStatement, State, ViolationSection,
};

/// Maximum number of consecutive non-statement lines that can be bridged
/// when grouping violation lines into sections.
const MAX_BRIDGE_GAP: u32 = 2;

/// Which statements take part in the totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every statement.
    Full,
    /// Only statements marked `State::Changed`.
    Diff,
}

impl Scope {
    fn includes(self, stmt: &SourceStatement) -> bool {
        match self {
            Scope::Full => true,
            Scope::Diff => stmt.state == State::Changed,
        }
    }
}

/// Accumulate block counts into `statements` and apply ignore modes.
///
/// A block lies before a statement when `block.end <= stmt.start` and after
/// it when `block.start >= stmt.end`; every other block overlaps and adds its
/// count. A statement becomes ignored when the whole file is ignored or one of
/// its overlapping blocks is in the ignored block set.
///
/// Both slices must be sorted by start position.
pub fn match_blocks(
    statements: &mut [SourceStatement],
    blocks: &[CoverageBlock],
    ignore: &IgnoreProfile,
) {
    let mut cursor = 0;
    for stmt in statements.iter_mut() {
        while cursor < blocks.len() && blocks[cursor].end <= stmt.start {
            cursor += 1;
        }
        let (start, end) = (stmt.start, stmt.end);
        // Nested blocks can end before the statement even past the cursor.
        for block in blocks[cursor..]
            .iter()
            .take_while(|b| b.start < end)
            .filter(|b| b.end > start)
        {
            stmt.reached += block.count;
            if ignore.ignores_block(&block.key()) {
                stmt.mark_ignored();
            }
        }
        if ignore.ignores_file() {
            stmt.mark_ignored();
        }
    }
}

fn is_code_line(text: &str) -> bool {
    let text = text.trim();
    !(text.is_empty()
        || text.starts_with("//")
        || (text.starts_with("/*") && text.ends_with("*/")))
}

/// Mark statements touched by the added lines of `change` as changed.
///
/// Each added code line goes to the statements with the greatest start line
/// at or before it, provided they reach the line. Several statements opening
/// on that same line are all marked. Blank and comment-only lines never mark
/// anything.
pub fn mark_changes(functions: &mut [SourceFunction], change: &DiffChange) {
    // (start, end line, function index, statement index), sorted by start.
    let mut index: Vec<_> = functions
        .iter()
        .enumerate()
        .flat_map(|(fi, f)| {
            f.statements
                .iter()
                .enumerate()
                .map(move |(si, s)| (s.start, s.end.line, fi, si))
        })
        .collect();
    index.sort_by_key(|&(start, ..)| start);

    let added = change
        .sections
        .iter()
        .filter(|s| s.operation == Operation::Add);
    for section in added {
        for (offset, line) in (section.start_line..=section.end_line).enumerate() {
            // Without contents there is no evidence the line is blank.
            if !section.contents.get(offset).map_or(true, |t| is_code_line(t)) {
                continue;
            }
            let upper = index.partition_point(|(start, ..)| start.line <= line);
            let Some(last) = upper.checked_sub(1).map(|i| index[i].0.line) else {
                continue;
            };
            // Every statement opening on that line shares it, e.g. `a := 1; b := 2`.
            for &(_, end_line, fi, si) in index[..upper]
                .iter()
                .rev()
                .take_while(|(start, ..)| start.line == last)
            {
                if end_line >= line {
                    functions[fi].statements[si].mark_changed();
                }
            }
        }
    }
}

/// Counters of one function's statements within `scope`.
pub fn function_counters(function: &SourceFunction, scope: Scope) -> Counters {
    function
        .statements
        .iter()
        .filter(|s| scope.includes(s))
        .fold(Counters::default(), |mut c, s| {
            c.total_lines += 1;
            let reached = s.reached > 0;
            match s.mode {
                Mode::Ignore => {
                    c.ignored_lines += 1;
                    c.covered_but_ignored_lines += u64::from(reached);
                }
                Mode::Keep => {
                    c.effective_lines += 1;
                    if reached {
                        c.covered_lines += 1;
                    } else {
                        c.violation_lines += 1;
                    }
                }
            }
            c
        })
}

/// Group sorted violation lines into `(start, end)` sections.
///
/// Two violations join the same section when the lines between them number
/// at most [`MAX_BRIDGE_GAP`] and none of them holds a statement in
/// `statement_lines`. Both slices are sorted and deduplicated.
#[must_use]
pub fn coalesce_ranges(violations: &[u32], statement_lines: &[u32]) -> Vec<(u32, u32)> {
    let Some((&first, rest)) = violations.split_first() else {
        return Vec::new();
    };
    debug_assert!(violations.windows(2).all(|w| w[0] < w[1]));

    let mut sections = vec![(first, first)];
    for &line in rest {
        let Some(current) = sections.last_mut() else {
            break;
        };
        let between = current.1 + 1..line;
        let bridgeable = between.len() as u32 <= MAX_BRIDGE_GAP
            && between
                .clone()
                .all(|l| statement_lines.binary_search(&l).is_err());
        if bridgeable {
            current.1 = line;
        } else {
            sections.push((line, line));
        }
    }
    sections
}

fn sorted_lines<'s>(statements: impl Iterator<Item = &'s SourceStatement>) -> Vec<u32> {
    let mut lines: Vec<u32> = statements.flat_map(|s| s.lines()).collect();
    lines.sort_unstable();
    lines.dedup();
    lines
}

fn violation_sections(
    content: &str,
    functions: &[SourceFunction],
    scope: Scope,
) -> Vec<ViolationSection> {
    let in_scope = || {
        functions
            .iter()
            .flat_map(|f| f.statements.iter())
            .filter(move |s| scope.includes(s))
    };
    let instrumentable = sorted_lines(in_scope());
    let violations = sorted_lines(in_scope().filter(|s| s.mode == Mode::Keep && s.reached == 0));
    let source: Vec<&str> = content.lines().collect();

    coalesce_ranges(&violations, &instrumentable)
        .into_iter()
        .map(|(start_line, end_line)| ViolationSection {
            violation_lines: violations
                .iter()
                .copied()
                .filter(|l| (start_line..=end_line).contains(l))
                .collect(),
            start_line,
            end_line,
            contents: (start_line..=end_line)
                .filter_map(|l| source.get((l as usize).checked_sub(1)?))
                .map(|l| l.to_string())
                .collect(),
        })
        .collect()
}

/// Run the full correlation for one file and build its profile.
///
/// `change` switches the file to diff scope: only statements reached by its
/// added lines are counted.
pub fn correlate_file(
    file_name: &str,
    content: &str,
    functions: &mut [SourceFunction],
    blocks: &[CoverageBlock],
    ignore: &IgnoreProfile,
    change: Option<&DiffChange>,
) -> CoverageProfile {
    for function in functions.iter_mut() {
        match_blocks(&mut function.statements, blocks, ignore);
    }
    let scope = match change {
        Some(change) => {
            mark_changes(functions, change);
            Scope::Diff
        }
        None => Scope::Full,
    };

    let function_coverage: Vec<FunctionCoverage> = functions
        .iter()
        .map(|f| FunctionCoverage {
            name: f.name.clone(),
            start_line: f.start_line,
            end_line: f.end_line,
            counters: function_counters(f, scope),
        })
        .collect();

    CoverageProfile {
        file_name: file_name.to_string(),
        counters: function_coverage.iter().map(|f| f.counters).sum(),
        functions: function_coverage,
        violation_sections: violation_sections(content, functions, scope),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiffMode, DiffSection, Position};

    fn stmt(sl: u32, sc: u32, el: u32, ec: u32) -> SourceStatement {
        SourceStatement::new(0, 0, Position::new(sl, sc), Position::new(el, ec))
    }

    fn block(sl: u32, sc: u32, el: u32, ec: u32, count: u64) -> CoverageBlock {
        CoverageBlock {
            start: Position::new(sl, sc),
            end: Position::new(el, ec),
            num_stmt: 1,
            count,
        }
    }

    fn function(statements: Vec<SourceStatement>) -> SourceFunction {
        let start_line = statements.first().map_or(1, |s| s.start.line);
        let end_line = statements.last().map_or(1, |s| s.end.line);
        SourceFunction {
            name: "F".to_string(),
            file: "a.go".to_string(),
            start_offset: 0,
            end_offset: 0,
            start_line,
            end_line,
            statements,
        }
    }

    fn add_section(start_line: u32, end_line: u32, contents: &[&str]) -> DiffSection {
        DiffSection {
            operation: Operation::Add,
            start_line,
            end_line,
            contents: contents.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_basic_correlation() {
        let blocks = vec![
            CoverageBlock {
                num_stmt: 2,
                ..block(3, 1, 5, 10, 1)
            },
            block(6, 1, 8, 10, 0),
        ];
        let mut funcs = vec![function(vec![stmt(3, 1, 5, 10), stmt(6, 1, 8, 10)])];
        let profile = correlate_file(
            "a.go",
            "",
            &mut funcs,
            &blocks,
            &IgnoreProfile::default(),
            None,
        );

        let reached: Vec<u64> = funcs[0].statements.iter().map(|s| s.reached).collect();
        assert_eq!(reached, vec![1, 0]);
        assert_eq!(profile.counters.total_lines, 2);
        assert_eq!(profile.counters.covered_lines, 1);
        assert_eq!(profile.counters.violation_lines, 1);
        assert_eq!(profile.percentage(), 50.0);
    }

    #[test]
    fn test_adjacent_blocks_do_not_overlap() {
        // Block ends exactly where the statement starts, next one starts
        // exactly where it ends.
        let blocks = vec![block(1, 1, 2, 5, 7), block(2, 5, 2, 20, 3), block(2, 20, 4, 1, 9)];
        let mut statements = vec![stmt(2, 5, 2, 20)];
        match_blocks(&mut statements, &blocks, &IgnoreProfile::default());
        assert_eq!(statements[0].reached, 3);
    }

    #[test]
    fn test_statement_spanning_several_blocks_sums_them() {
        let blocks = vec![block(1, 10, 3, 4, 2), block(3, 4, 3, 30, 5), block(9, 1, 9, 5, 11)];
        let mut statements = vec![stmt(2, 2, 4, 3), stmt(9, 1, 9, 5)];
        match_blocks(&mut statements, &blocks, &IgnoreProfile::default());
        assert_eq!(statements[0].reached, 7);
        assert_eq!(statements[1].reached, 11);
    }

    #[test]
    fn test_ignored_block_marks_overlapping_statements() {
        let blocks = vec![block(1, 10, 2, 1, 1), block(2, 15, 4, 2, 0)];
        let mut ignore = IgnoreProfile::default();
        ignore.ignored_blocks.insert(blocks[1].key());
        ignore.ignored_lines.extend([2, 3, 4]);

        let mut funcs = vec![function(vec![stmt(1, 12, 1, 20), stmt(3, 2, 3, 12)])];
        let profile = correlate_file("a.go", "", &mut funcs, &blocks, &ignore, None);

        assert_eq!(funcs[0].statements[0].mode, Mode::Keep);
        assert_eq!(funcs[0].statements[1].mode, Mode::Ignore);
        assert_eq!(profile.counters.ignored_lines, 1);
        assert_eq!(profile.counters.effective_lines, 1);
        assert_eq!(profile.counters.covered_lines, 1);
        assert!(profile.violation_sections.is_empty());
    }

    #[test]
    fn test_file_ignore_ignores_everything() {
        let blocks = vec![block(1, 1, 3, 1, 4)];
        let mut funcs = vec![function(vec![stmt(1, 2, 1, 9), stmt(2, 2, 2, 9), stmt(5, 1, 5, 4)])];
        let profile = correlate_file(
            "a.go",
            "",
            &mut funcs,
            &blocks,
            &IgnoreProfile::whole_file(),
            None,
        );

        assert!(funcs[0].statements.iter().all(|s| s.mode == Mode::Ignore));
        assert_eq!(profile.counters.ignored_lines, profile.counters.total_lines);
        assert_eq!(profile.counters.effective_lines, 0);
        assert_eq!(profile.counters.covered_but_ignored_lines, 2);
        assert_eq!(profile.percentage(), 100.0);
    }

    #[test]
    fn test_diff_marks_only_added_statements() {
        let content = "a\nb\nc\nd\ne\nf := 1\ng(f)\nh()\n";
        let change = DiffChange {
            file_name: "a.go".to_string(),
            mode: DiffMode::Modify,
            sections: vec![add_section(6, 8, &["f := 1", "g(f)", "h()"])],
        };
        let mut funcs = vec![function(vec![stmt(1, 1, 5, 2), stmt(6, 1, 8, 4)])];
        let profile = correlate_file(
            "a.go",
            content,
            &mut funcs,
            &[],
            &IgnoreProfile::default(),
            Some(&change),
        );

        assert_eq!(funcs[0].statements[0].state, State::Original);
        assert_eq!(funcs[0].statements[1].state, State::Changed);
        assert_eq!(profile.counters.total_lines, 1);
        assert_eq!(profile.counters.violation_lines, 1);
        assert_eq!(profile.violation_sections.len(), 1);
        assert_eq!(profile.violation_sections[0].start_line, 6);
        assert_eq!(profile.violation_sections[0].end_line, 8);
    }

    #[test]
    fn test_blank_and_comment_lines_do_not_mark() {
        let change = DiffChange {
            file_name: "a.go".to_string(),
            mode: DiffMode::Modify,
            sections: vec![add_section(2, 4, &["", "  // note", "/* block */"])],
        };
        let mut funcs = vec![function(vec![stmt(1, 1, 5, 2)])];
        mark_changes(&mut funcs, &change);
        assert_eq!(funcs[0].statements[0].state, State::Original);
    }

    #[test]
    fn test_added_line_between_statements_matches_nothing() {
        let change = DiffChange {
            file_name: "a.go".to_string(),
            mode: DiffMode::Modify,
            sections: vec![add_section(4, 4, &["x := 1"])],
        };
        let mut funcs = vec![function(vec![stmt(1, 1, 2, 2), stmt(6, 1, 6, 9)])];
        mark_changes(&mut funcs, &change);
        assert!(funcs[0].statements.iter().all(|s| s.state == State::Original));
    }

    #[test]
    fn test_added_line_with_two_statements_marks_both() {
        // `a := 1; b := 2` below an untouched statement.
        let mut funcs = vec![function(vec![
            stmt(2, 2, 2, 9),
            stmt(3, 2, 3, 8),
            stmt(3, 10, 3, 16),
        ])];
        let change = DiffChange {
            file_name: "a.go".to_string(),
            mode: DiffMode::Modify,
            sections: vec![add_section(3, 3, &["\ta := 1; b := 2"])],
        };
        mark_changes(&mut funcs, &change);
        let states: Vec<State> = funcs[0].statements.iter().map(|s| s.state).collect();
        assert_eq!(states, vec![State::Original, State::Changed, State::Changed]);
    }

    #[test]
    fn test_nested_literal_line_goes_to_innermost_start() {
        // Outer statement spans a function literal that owns line 5.
        let mut funcs = vec![
            function(vec![stmt(4, 2, 6, 3)]),
            function(vec![stmt(5, 3, 5, 11)]),
        ];
        let change = DiffChange {
            file_name: "a.go".to_string(),
            mode: DiffMode::Modify,
            sections: vec![add_section(5, 5, &["return 1"])],
        };
        mark_changes(&mut funcs, &change);
        assert_eq!(funcs[0].statements[0].state, State::Original);
        assert_eq!(funcs[1].statements[0].state, State::Changed);
    }

    #[test]
    fn test_violation_sections_bridge_small_gaps() {
        let content = "l1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\nl9\nl10\n";
        let mut funcs = vec![function(vec![
            stmt(1, 1, 1, 3),
            stmt(3, 1, 3, 3),
            stmt(5, 1, 5, 3),
            stmt(10, 1, 10, 4),
        ])];
        let blocks = vec![block(5, 1, 5, 3, 1)];
        let profile = correlate_file(
            "a.go",
            content,
            &mut funcs,
            &blocks,
            &IgnoreProfile::default(),
            None,
        );

        let sections = &profile.violation_sections;
        assert_eq!(sections.len(), 2);
        assert_eq!((sections[0].start_line, sections[0].end_line), (1, 3));
        assert_eq!(sections[0].violation_lines, vec![1, 3]);
        assert_eq!(sections[0].contents, vec!["l1", "l2", "l3"]);
        assert_eq!((sections[1].start_line, sections[1].end_line), (10, 10));
    }

    #[test]
    fn test_function_coverage_is_reported() {
        let blocks = vec![block(1, 1, 2, 1, 1)];
        let mut funcs = vec![function(vec![stmt(1, 2, 1, 9)]), function(vec![stmt(4, 2, 4, 9)])];
        let profile = correlate_file(
            "a.go",
            "",
            &mut funcs,
            &blocks,
            &IgnoreProfile::default(),
            None,
        );
        assert_eq!(profile.functions.len(), 2);
        assert_eq!(profile.functions[0].counters.covered_lines, 1);
        assert_eq!(profile.functions[1].counters.violation_lines, 1);
    }

    #[test]
    fn test_sections_split_on_ignored_statement() {
        // Line 2 holds an ignored statement: it is not a violation, but it is
        // still code, so the two misses around it stay apart.
        let content = "a()\nb()\nc()\n";
        let blocks = vec![block(2, 1, 2, 4, 0)];
        let mut ignore = IgnoreProfile::default();
        ignore.ignored_blocks.insert(blocks[0].key());
        let mut funcs = vec![function(vec![stmt(1, 1, 1, 4), stmt(2, 1, 2, 4), stmt(3, 1, 3, 4)])];

        let profile = correlate_file("a.go", content, &mut funcs, &blocks, &ignore, None);

        let ranges: Vec<(u32, u32)> = profile
            .violation_sections
            .iter()
            .map(|s| (s.start_line, s.end_line))
            .collect();
        assert_eq!(ranges, vec![(1, 1), (3, 3)]);
    }

    #[test]
    fn test_sections_bridge_unchanged_statements_in_diff_scope() {
        // Line 2 is an untouched statement, so in diff scope it does not
        // separate the two changed misses.
        let content = "a()\nb()\nc()\n";
        let change = DiffChange {
            file_name: "a.go".to_string(),
            mode: DiffMode::Modify,
            sections: vec![add_section(1, 1, &["a()"]), add_section(3, 3, &["c()"])],
        };
        let mut funcs = vec![function(vec![stmt(1, 1, 1, 4), stmt(2, 1, 2, 4), stmt(3, 1, 3, 4)])];

        let profile = correlate_file(
            "a.go",
            content,
            &mut funcs,
            &[],
            &IgnoreProfile::default(),
            Some(&change),
        );

        assert_eq!(profile.violation_sections.len(), 1);
        assert_eq!(profile.violation_sections[0].violation_lines, vec![1, 3]);
        assert_eq!(profile.violation_sections[0].contents, vec!["a()", "b()", "c()"]);
    }

    #[test]
    fn test_multi_line_miss_is_one_section() {
        assert_eq!(coalesce_ranges(&[4, 5, 6], &[4, 5, 6, 9]), vec![(4, 6)]);
        assert!(coalesce_ranges(&[], &[1]).is_empty());
    }

    #[test]
    fn test_blank_gap_wider_than_bridge_splits() {
        assert_eq!(coalesce_ranges(&[1, 4], &[1, 4]), vec![(1, 4)]);
        assert_eq!(coalesce_ranges(&[1, 5], &[1, 5]), vec![(1, 1), (5, 5)]);
    }
}
