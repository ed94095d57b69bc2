#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Line-oriented parsers for the text protocols grading processes print.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use crate::constants::{
    ACTUAL_MARKER, APPENDIX_DELIMITER, EXPECTED_MARKER, MAX_POINTS_PREFIX, TESTCASE_MARKER,
    TOTAL_POINTS_PREFIX,
};

peg::parser! {
    /// Score fragments embedded in the rule-based checker's XML report.
    pub grammar checker() for str {
        /// opening tag of the earned points
        rule points_open() = "<TotalPoints>"

        /// closing tag of the earned points
        rule points_close() = "</TotalPoints>"

        /// opening tag of the available points
        rule max_open() = "<TotalMaxpoints>"

        /// closing tag of the available points
        rule max_close() = "</TotalMaxpoints>"

        /// earned points fragment; flags whether it was closed
        rule points_tag() -> (&'input str, bool)
            = points_open() v:$((!points_close() [_])*) c:$(points_close())? { (v, c.is_some()) }

        /// available points fragment; flags whether it was closed
        rule max_tag() -> (&'input str, bool)
            = max_open() v:$((!max_close() [_])*) c:$(max_close())? { (v, c.is_some()) }

        /// first `<TotalPoints>` fragment anywhere in the report
        pub rule total_points() -> Option<(&'input str, bool)>
            = (!points_open() [_])* v:points_tag()? [_]* { v }

        /// first `<TotalMaxpoints>` fragment anywhere in the report
        pub rule total_max_points() -> Option<(&'input str, bool)>
            = (!max_open() [_])* v:max_tag()? [_]* { v }
    }
}

/// Output with its point lines removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointLines {
    /// Last parsed `TotalPoints:` value.
    pub points:     Option<i64>,
    /// Last parsed `MaxPoints:` value.
    pub max_points: Option<i64>,
    /// Remaining lines, in order.
    pub out:        String,
}

/// Strips `TotalPoints: ` and `MaxPoints: ` lines from `text` and keeps the
/// last value of each that parses as an integer.
pub fn find_point_lines(text: &str) -> PointLines {
    let mut result = PointLines::default();
    let mut lines = Vec::new();

    for line in text.split('\n') {
        if let Some(rest) = line.strip_prefix(TOTAL_POINTS_PREFIX) {
            if let Ok(value) = rest.trim().parse::<i64>() {
                result.points = Some(value);
            }
        } else if let Some(rest) = line.strip_prefix(MAX_POINTS_PREFIX) {
            if let Ok(value) = rest.trim().parse::<i64>() {
                result.max_points = Some(value);
            }
        } else {
            lines.push(line);
        }
    }

    result.out = lines.join("\n");
    result
}

/// Splits `text` at the first `***APPENDIX***` line.
///
/// Returns the main output and the appendix. Later delimiter lines are
/// dropped; without a delimiter the appendix is empty.
pub fn split_appendix(text: &str) -> (String, String) {
    let mut out = Vec::new();
    let mut appendix = Vec::new();
    let mut in_appendix = false;

    for line in text.split('\n') {
        if line == APPENDIX_DELIMITER {
            in_appendix = true;
        } else if in_appendix {
            appendix.push(line);
        } else {
            out.push(line);
        }
    }
    (out.join("\n"), appendix.join("\n"))
}

/// One test case of a diff-style check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffBlock {
    /// Test case description.
    pub description: String,
    /// What the program should have printed.
    pub expected:    String,
    /// What it printed.
    pub actual:      String,
    /// Expected and actual differ.
    pub fail:        bool,
}

impl DiffBlock {
    /// Line diff of expected against actual, one `-`/`+`/` ` tagged line per
    /// change.
    pub fn unified_diff(&self) -> String {
        let diff = TextDiff::from_lines(&self.expected, &self.actual);
        let mut output = String::new();

        for change in diff.iter_all_changes() {
            let prefix = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => " ",
            };
            output.push_str(&format!("{prefix} {change}"));
            if change.missing_newline() {
                output.push('\n');
            }
        }
        output
    }
}

/// Section currently collecting unmarked lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// After a `Testcase:` line.
    Description,
    /// After an `Expected:` line.
    Expected,
    /// After an `Actual:` line, and before any marker.
    Actual,
}

/// Lines accumulated for the record being parsed.
#[derive(Debug, Default)]
struct Pending<'a> {
    /// Description lines.
    description: Vec<&'a str>,
    /// Expected lines.
    expected:    Vec<&'a str>,
    /// Actual lines.
    actual:      Vec<&'a str>,
}

impl<'a> Pending<'a> {
    /// All three sections have content.
    fn is_complete(&self) -> bool {
        !self.description.is_empty() && !self.expected.is_empty() && !self.actual.is_empty()
    }

    /// Finishes the record.
    fn commit(self) -> DiffBlock {
        DiffBlock {
            fail:        self.expected != self.actual,
            description: self.description.join("\n"),
            expected:    self.expected.join("\n"),
            actual:      self.actual.join("\n"),
        }
    }

    /// Adds `line` to `section`.
    fn push(&mut self, section: Section, line: &'a str) {
        match section {
            Section::Description => self.description.push(line),
            Section::Expected => self.expected.push(line),
            Section::Actual => self.actual.push(line),
        }
    }
}

/// Content after a marker and the single separator character following it.
fn marker_content<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(marker)?;
    let mut chars = rest.chars();
    chars.next();
    Some(chars.as_str())
}

/// Segments `text` into test case records by the `Testcase:`, `Expected:`
/// and `Actual:` markers.
///
/// A `Testcase:` line only starts a new record when the current one has all
/// three sections; the last record is always emitted, so empty input yields
/// one empty record.
pub fn parse_diff_blocks(text: &str) -> Vec<DiffBlock> {
    let mut blocks = Vec::new();
    let mut pending = Pending::default();
    let mut section = Section::Actual;

    for line in text.split('\n') {
        if let Some(content) = marker_content(line, TESTCASE_MARKER) {
            if pending.is_complete() {
                blocks.push(std::mem::take(&mut pending).commit());
            }
            section = Section::Description;
            pending.push(section, content);
        } else if let Some(content) = marker_content(line, EXPECTED_MARKER) {
            section = Section::Expected;
            pending.push(section, content);
        } else if let Some(content) = marker_content(line, ACTUAL_MARKER) {
            section = Section::Actual;
            pending.push(section, content);
        } else {
            pending.push(section, line);
        }
    }
    blocks.push(pending.commit());
    blocks
}

/// Parses one score fragment; absent means zero.
fn fragment_value(fragment: Option<(&str, bool)>, tag: &str) -> Result<i64> {
    match fragment {
        None => Ok(0),
        Some((_, false)) => bail!("Unterminated <{tag}> in checker output"),
        Some((value, true)) => value
            .trim()
            .parse::<i64>()
            .with_context(|| format!("<{tag}> holds `{value}`, not an integer")),
    }
}

/// Reads earned and available points from the checker's report.
pub fn checker_totals(report: &str) -> Result<(i64, i64)> {
    let points = checker::total_points(report).context("Could not scan checker output")?;
    let max_points = checker::total_max_points(report).context("Could not scan checker output")?;
    Ok((
        fragment_value(points, "TotalPoints")?,
        fragment_value(max_points, "TotalMaxpoints")?,
    ))
}
