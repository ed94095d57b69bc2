#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde::Serialize;

use super::config::ActionKind;
use crate::{parsers::DiffBlock, process::Invocation};

/// Outcome of one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    /// Points awarded.
    pub points:     i64,
    /// Points available.
    pub max_points: i64,
    /// Feedback text.
    pub out:        String,
    /// Diagnostic text.
    pub err:        String,
    /// Do not run the remaining actions.
    pub stop:       bool,
    /// Secondary output shown after the feedback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appendix:   Option<String>,
    /// Feedback is meant to be rendered as markup.
    pub html:       bool,
    /// Test case records of diff-style checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests:      Option<Vec<DiffBlock>>,
}

impl ActionResult {
    /// Plain exit code check: no points, stop on a non-zero exit.
    pub fn from_exit(invocation: Invocation) -> Self {
        Self {
            stop: !invocation.success(),
            out: invocation.out,
            err: invocation.err,
            ..Self::default()
        }
    }

    /// Zero-point result that halts the pipeline with `err`.
    pub fn halted(err: impl Into<String>) -> Self {
        Self {
            err: err.into(),
            stop: true,
            ..Self::default()
        }
    }
}

/// Result of one executed pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    /// Kind of the action that ran.
    pub kind:   ActionKind,
    /// What it returned.
    pub result: ActionResult,
}

/// Aggregated outcome of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    /// Sum of awarded points.
    pub points:     i64,
    /// Sum of available points.
    pub max_points: i64,
    /// Feedback of every executed action, newline joined.
    pub out:        String,
    /// Diagnostics of every executed action, newline joined.
    pub err:        String,
    /// Appendices of every executed action, newline joined.
    pub appendix:   String,
    /// Some action produced markup.
    pub html:       bool,
    /// An action halted the pipeline.
    pub stopped:    bool,
    /// Executed steps, in order.
    pub steps:      Vec<StepResult>,
}

/// Appends `text` to `acc` on a new line, skipping empty text.
fn append_line(acc: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !acc.is_empty() {
        acc.push('\n');
    }
    acc.push_str(text);
}

impl PipelineResult {
    /// Folds one step into the running totals.
    pub fn merge(&mut self, kind: ActionKind, result: ActionResult) {
        self.points += result.points;
        self.max_points += result.max_points;
        append_line(&mut self.out, &result.out);
        append_line(&mut self.err, &result.err);
        if let Some(appendix) = &result.appendix {
            append_line(&mut self.appendix, appendix);
        }
        self.html |= result.html;
        self.stopped |= result.stop;
        self.steps.push(StepResult { kind, result });
    }

    /// Number of actions that ran.
    pub fn executed(&self) -> usize {
        self.steps.len()
    }
}
