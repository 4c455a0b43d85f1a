//! In-source ignore annotations.
//!
//! ```text
//! //+gocover:ignore:file <optional reason>
//! //+gocover:ignore:block <optional reason>
//! ```
//!
//! A marker may follow code on the same line and may have spaces or tabs
//! between `//` and `+`. The reason is optional. Any other kind after the
//! `+gocover:ignore:` prefix is rejected as an invalid annotation.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{GocovError, Result};
use crate::model::{CoverageBlock, IgnoreBlock, IgnoreProfile};

/// Pre-compiled ignore marker: the kind, then everything after it.
static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[ \t]*\+gocover:ignore:(\S*)(.*)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum Marker {
    File,
    /// Carries the marker text from `//` to the end of the line.
    Block(String),
}

fn parse_marker(path: &str, line_no: u32, line: &str) -> Result<Option<Marker>> {
    let Some(caps) = MARKER_RE.captures(line) else {
        return Ok(None);
    };
    let text = caps.get(0).map_or("", |m| m.as_str()).trim_end();
    match caps.get(1).map_or("", |m| m.as_str()) {
        "file" => Ok(Some(Marker::File)),
        "block" => Ok(Some(Marker::Block(text.to_string()))),
        _ => Err(GocovError::Annotation {
            path: path.to_string(),
            line: line_no,
            text: text.to_string(),
        }),
    }
}

/// Scan `content` for markers and resolve them against `blocks`, which must
/// be sorted by start position.
///
/// A file marker ends the scan. A block marker on line `m` ignores the block
/// with `start_line <= m + 1 < end_line`: the block opening on the line after
/// the marker, or the one opened on the marker line itself. Markers without
/// such a block are dropped.
pub fn resolve(path: &str, content: &str, blocks: &[CoverageBlock]) -> Result<IgnoreProfile> {
    let lines: Vec<&str> = content.lines().collect();
    let mut profile = IgnoreProfile::default();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx as u32 + 1;
        match parse_marker(path, line_no, line)? {
            None => {}
            Some(Marker::File) => {
                tracing::debug!(path, line = line_no, "file ignored by annotation");
                return Ok(IgnoreProfile::whole_file());
            }
            Some(Marker::Block(annotation)) => {
                let Some(block) = find_block(blocks, line_no + 1) else {
                    tracing::debug!(path, line = line_no, "ignore marker has no block");
                    continue;
                };
                let covered: Vec<u32> = (block.start.line..=block.end.line).collect();
                let contents = covered
                    .iter()
                    .filter_map(|l| lines.get((*l as usize).checked_sub(1)?))
                    .map(|l| l.to_string())
                    .collect();
                profile.ignored_lines.extend(covered.iter().copied());
                profile.ignored_blocks.insert(block.key());
                profile.blocks.push(IgnoreBlock {
                    annotation,
                    lines: covered,
                    contents,
                });
            }
        }
    }

    Ok(profile)
}

fn find_block(blocks: &[CoverageBlock], probe: u32) -> Option<&CoverageBlock> {
    let upper = blocks.partition_point(|b| b.start.line <= probe);
    blocks[..upper].iter().rev().find(|b| b.end.line > probe)
}
