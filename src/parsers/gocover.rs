/// Parser for Go's `-coverprofile` format.
///
/// Reference: https://go.dev/blog/cover
///
/// Format:
///   mode: set|count|atomic
///   <file>:<startLine>.<startCol>,<endLine>.<endCol> <numStatements> <count>
///
/// Each line describes a basic block with the number of statements in it and
/// how many times it ran. Blocks keep their columns: the correlator needs the
/// exact (line, column) extents to match them against statements.
use std::collections::HashMap;
use std::io::BufRead;

use crate::error::{GocovError, Result};
use crate::model::{CountMode, CoverageBlock, CoverageData, FileBlocks, Position};

/// Parse a Go coverage profile from raw bytes.
pub fn parse(input: &[u8]) -> Result<CoverageData> {
    parse_reader(&mut &*input)
}

fn profile_err(line: usize, message: impl Into<String>) -> GocovError {
    GocovError::Profile {
        line,
        message: message.into(),
    }
}

/// Parse `line.col`. Both are 1-based, so zero is malformed.
fn parse_position(s: &str) -> Option<Position> {
    let (line, col) = s.split_once('.')?;
    let (line, col): (u32, u32) = (line.parse().ok()?, col.parse().ok()?);
    (line > 0 && col > 0).then(|| Position::new(line, col))
}

/// Parse a single block line, returning (file_path, block).
///
/// Format: `<file>:<startLine>.<startCol>,<endLine>.<endCol> <numStmt> <count>`
fn parse_block_line(line: &str) -> Option<(&str, CoverageBlock)> {
    // Anchor on the last ".go:" so paths containing colons still split.
    let colon_pos = line.rfind(".go:")? + 3;

    let file = &line[..colon_pos];
    let rest = &line[colon_pos + 1..];

    let (range, tail) = rest.split_once(' ')?;
    let (start, end) = range.split_once(',')?;
    let start = parse_position(start)?;
    let end = parse_position(end)?;
    if end < start {
        return None;
    }

    let mut parts = tail.split_whitespace();
    let num_stmt: u32 = parts.next()?.parse().ok()?;
    let count: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    Some((
        file,
        CoverageBlock {
            start,
            end,
            num_stmt,
            count,
        },
    ))
}

/// Sort blocks by position and fold exact duplicates together. Profiles
/// merged from several `-coverpkg` runs repeat the same block once per run.
fn normalize_blocks(mode: CountMode, mut blocks: Vec<CoverageBlock>) -> Vec<CoverageBlock> {
    blocks.sort_by_key(|b| (b.start, b.end));
    let mut merged: Vec<CoverageBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match merged.last_mut() {
            Some(prev) if prev.key() == block.key() => {
                prev.count = match mode {
                    CountMode::Set => prev.count.max(block.count),
                    CountMode::Count | CountMode::Atomic => prev.count + block.count,
                };
            }
            _ => merged.push(block),
        }
    }
    merged
}

/// Parse a profile from a buffered reader. Blocks are grouped per source
/// file in first-seen order.
pub fn parse_reader(reader: &mut dyn BufRead) -> Result<CoverageData> {
    let mut mode: Option<CountMode> = None;
    let mut file_order: Vec<String> = Vec::new();
    let mut file_blocks: HashMap<String, Vec<CoverageBlock>> = HashMap::new();

    let mut raw_line = String::new();
    let mut line_no = 0;
    loop {
        raw_line.clear();
        let n = reader
            .read_line(&mut raw_line)
            .map_err(|e| profile_err(line_no + 1, format!("unreadable input: {e}")))?;
        if n == 0 {
            break;
        }
        line_no += 1;

        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("mode:") {
            let parsed: CountMode = rest.trim().parse().map_err(|m| profile_err(line_no, m))?;
            // Concatenated profiles repeat the header; they must agree.
            if let Some(existing) = mode {
                if existing != parsed {
                    return Err(profile_err(line_no, "conflicting coverage modes"));
                }
            }
            mode = Some(parsed);
            continue;
        }
        if mode.is_none() {
            return Err(profile_err(line_no, "missing 'mode:' header"));
        }

        let (file, block) = parse_block_line(line)
            .ok_or_else(|| profile_err(line_no, format!("malformed block '{line}'")))?;
        if !file_blocks.contains_key(file) {
            file_order.push(file.to_string());
        }
        file_blocks.entry(file.to_string()).or_default().push(block);
    }

    let mode = mode.ok_or_else(|| profile_err(line_no.max(1), "missing 'mode:' header"))?;

    let files = file_order
        .into_iter()
        .filter_map(|path| {
            let blocks = file_blocks.remove(&path)?;
            Some(FileBlocks {
                path,
                blocks: normalize_blocks(mode, blocks),
            })
        })
        .collect();

    Ok(CoverageData { mode, files })
}
