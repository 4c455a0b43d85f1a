//! Output formatting for run statistics.

use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;
use serde::Deserialize;

use crate::model::{CoverageProfile, Statistics, ViolationSection};

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

impl ReportFormat {
    /// Render `stats` to `out`.
    pub fn generate(&self, stats: &Statistics, out: &mut dyn Write) -> Result<()> {
        match self {
            ReportFormat::Text => write_text(stats, out),
            ReportFormat::Markdown => write_markdown(stats, out),
            ReportFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, stats)?;
                writeln!(out)?;
                Ok(())
            }
        }
    }
}

/// Files with at least one violation, worst coverage first.
fn files_with_violations(stats: &Statistics) -> Vec<&CoverageProfile> {
    let mut files: Vec<&CoverageProfile> = stats
        .files
        .iter()
        .filter(|f| f.counters.violation_lines > 0)
        .collect();
    files.sort_by(|a, b| {
        a.percentage()
            .total_cmp(&b.percentage())
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    files
}

fn title(stats: &Statistics) -> String {
    match &stats.comparison_branch {
        Some(branch) => format!("Diff coverage against {branch}"),
        None => "Coverage".to_string(),
    }
}

fn write_text(stats: &Statistics, out: &mut dyn Write) -> Result<()> {
    if stats.files.is_empty() {
        writeln!(out, "No Go files analysed.")?;
        return Ok(());
    }

    let c = &stats.counters;
    writeln!(
        out,
        "{}: {:.1}% ({}/{} statements covered)",
        title(stats),
        stats.percentage,
        c.covered_lines,
        c.effective_lines
    )?;
    if c.ignored_lines > 0 {
        writeln!(
            out,
            "Ignored: {} statements ({} covered anyway)",
            c.ignored_lines, c.covered_but_ignored_lines
        )?;
    }

    let files = files_with_violations(stats);
    if !files.is_empty() {
        writeln!(out)?;
        for f in files {
            writeln!(
                out,
                "  {}  {}/{} ({:.1}%)  missed: {}",
                f.file_name,
                f.counters.covered_lines,
                f.counters.effective_lines,
                f.percentage(),
                format_line_ranges(&f.violation_sections)
            )?;
        }
    }

    if !stats.excluded_files.is_empty() {
        writeln!(out)?;
        writeln!(out, "Excluded: {}", stats.excluded_files.join(", "))?;
    }
    Ok(())
}

fn write_markdown(stats: &Statistics, out: &mut dyn Write) -> Result<()> {
    let c = &stats.counters;
    writeln!(out, "### {}: {:.1}%\n", title(stats), stats.percentage)?;
    writeln!(
        out,
        "**{}** of **{}** statements covered",
        c.covered_lines, c.effective_lines
    )?;

    let files = files_with_violations(stats);
    if files.is_empty() {
        writeln!(out, "\nAll statements are covered! 🎉")?;
    } else {
        writeln!(out, "\n| File | Missed | Coverage |")?;
        writeln!(out, "|:-----|-------:|---------:|")?;
        for f in &files {
            writeln!(
                out,
                "| `{}` | {} | {:.0}% |",
                f.file_name,
                f.counters.violation_lines,
                f.percentage()
            )?;
        }

        writeln!(out, "\n<details>\n<summary>Missed lines</summary>\n")?;
        for f in &files {
            writeln!(
                out,
                "**`{}`**: {}\n",
                f.file_name,
                format_line_ranges(&f.violation_sections)
            )?;
            writeln!(out, "```go")?;
            for section in &f.violation_sections {
                for (line, text) in (section.start_line..).zip(&section.contents) {
                    writeln!(out, "{line:>5} {text}")?;
                }
            }
            writeln!(out, "```\n")?;
        }
        writeln!(out, "</details>")?;
    }

    writeln!(out)?;
    if c.ignored_lines > 0 {
        writeln!(out, "<sub>Ignored statements: **{}**</sub>", c.ignored_lines)?;
    }
    if !stats.excluded_files.is_empty() {
        writeln!(
            out,
            "<sub>Excluded files: {}</sub>",
            stats.excluded_files.len()
        )?;
    }
    Ok(())
}

/// Format violation sections into compact range notation, e.g. "1, 3-5, 8".
#[must_use]
pub fn format_line_ranges(sections: &[ViolationSection]) -> String {
    sections
        .iter()
        .map(|s| {
            if s.start_line == s.end_line {
                s.start_line.to_string()
            } else {
                format!("{}-{}", s.start_line, s.end_line)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Counters;

    fn section(start_line: u32, end_line: u32) -> ViolationSection {
        ViolationSection {
            violation_lines: vec![start_line, end_line],
            start_line,
            end_line,
            contents: (start_line..=end_line).map(|l| format!("line{l}")).collect(),
        }
    }

    fn counters(effective: u64, covered: u64) -> Counters {
        Counters {
            total_lines: effective,
            effective_lines: effective,
            covered_lines: covered,
            violation_lines: effective - covered,
            ..Default::default()
        }
    }

    fn stats(files: Vec<CoverageProfile>, branch: Option<&str>) -> Statistics {
        let counters: Counters = files.iter().map(|f| f.counters).sum();
        Statistics {
            comparison_branch: branch.map(str::to_string),
            counters,
            percentage: counters.percentage(),
            files,
            excluded_files: vec![],
        }
    }

    fn file(name: &str, effective: u64, covered: u64, sections: Vec<ViolationSection>) -> CoverageProfile {
        CoverageProfile {
            file_name: name.to_string(),
            counters: counters(effective, covered),
            functions: vec![],
            violation_sections: sections,
        }
    }

    fn render(format: ReportFormat, stats: &Statistics) -> String {
        let mut out = Vec::new();
        format.generate(stats, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_format_line_ranges() {
        assert_eq!(format_line_ranges(&[]), "");
        assert_eq!(
            format_line_ranges(&[section(1, 1), section(3, 5), section(10, 10)]),
            "1, 3-5, 10"
        );
    }

    #[test]
    fn test_text_report() {
        let s = stats(
            vec![
                file("pkg/a.go", 10, 5, vec![section(3, 5)]),
                file("pkg/b.go", 4, 4, vec![]),
            ],
            None,
        );
        let text = render(ReportFormat::Text, &s);
        assert!(text.contains("Coverage: 64.3% (9/14 statements covered)"));
        assert!(text.contains("pkg/a.go  5/10 (50.0%)  missed: 3-5"));
        // Fully covered files are not listed.
        assert!(!text.contains("pkg/b.go"));
    }

    #[test]
    fn test_text_report_sorts_worst_first() {
        let s = stats(
            vec![
                file("a.go", 10, 9, vec![section(1, 1)]),
                file("b.go", 10, 1, vec![section(2, 2)]),
            ],
            None,
        );
        let text = render(ReportFormat::Text, &s);
        assert!(text.find("b.go").unwrap() < text.find("a.go").unwrap());
    }

    #[test]
    fn test_text_report_empty() {
        let text = render(ReportFormat::Text, &stats(vec![], None));
        assert!(text.contains("No Go files analysed."));
    }

    #[test]
    fn test_markdown_with_misses() {
        let s = stats(
            vec![file("pkg/a.go", 4, 2, vec![section(5, 6)])],
            Some("origin/main"),
        );
        let md = render(ReportFormat::Markdown, &s);
        assert!(md.contains("### Diff coverage against origin/main: 50.0%"));
        assert!(md.contains("| `pkg/a.go` | 2 | 50% |"));
        assert!(md.contains("**`pkg/a.go`**: 5-6"));
        assert!(md.contains("    5 line5"));
        assert!(md.contains("Missed lines"));
    }

    #[test]
    fn test_markdown_all_covered() {
        let s = stats(vec![file("a.go", 3, 3, vec![])], None);
        let md = render(ReportFormat::Markdown, &s);
        assert!(md.contains("### Coverage: 100.0%"));
        assert!(md.contains("All statements are covered!"));
    }

    #[test]
    fn test_json_report() {
        let s = stats(vec![file("a.go", 4, 3, vec![section(7, 7)])], Some("main"));
        let json: serde_json::Value =
            serde_json::from_str(&render(ReportFormat::Json, &s)).unwrap();
        assert_eq!(json["comparison_branch"], "main");
        assert_eq!(json["effective_lines"], 4);
        assert_eq!(json["percentage"], 75.0);
        assert_eq!(json["files"][0]["file_name"], "a.go");
        assert_eq!(json["files"][0]["violation_sections"][0]["start_line"], 7);
    }

    #[test]
    fn test_format_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: ReportFormat,
        }
        let w: Wrapper = serde_json::from_str(r#"{"format":"markdown"}"#).unwrap();
        assert_eq!(w.format, ReportFormat::Markdown);
    }
}
