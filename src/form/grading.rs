#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Grades a submission against the fields a selection puts in play.

use itertools::Itertools;
use regex::Regex;
use serde::Serialize;

use super::{
    schema::{ExerciseSchema, FieldKind, FieldOption, TableField, TextField},
    submission::Submission,
    traversal::{Selection, Step, Traversal, option_name},
};
use crate::error::{GraderError, Result};

/// Grade of one field instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldGrade {
    /// Positional name of the graded instance.
    pub name:       String,
    /// Points earned.
    pub points:     i64,
    /// Points available.
    pub max_points: i64,
    /// Space joined feedback, empty when there is none.
    pub hints:      String,
}

/// Outcome of grading a whole submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GradingResult {
    /// Points earned.
    pub points:       i64,
    /// Sum of configured points of every field in play.
    pub max_points:   i64,
    /// Groups holding at least one wrong field, in traversal order.
    pub error_groups: Vec<String>,
    /// Wrong fields of groups that report errors per field.
    pub error_fields: Vec<String>,
    /// Per-instance grades in traversal order.
    pub fields:       Vec<FieldGrade>,
}

impl GradingResult {
    /// True when every graded field was correct.
    pub fn is_correct(&self) -> bool {
        self.error_groups.is_empty()
    }
}

/// Ordered, de-duplicated feedback.
#[derive(Debug, Default)]
struct Hints(Vec<String>);

impl Hints {
    /// Records `hint` unless empty.
    fn push(&mut self, hint: Option<&str>) {
        if let Some(hint) = hint.filter(|h| !h.is_empty()) {
            self.0.push(hint.to_string());
        }
    }

    /// Joins the hints in first occurrence order.
    fn joined(&self) -> String {
        self.0.iter().unique().join(" ")
    }
}

/// Checks one option set against the selected option names, collecting the
/// hints of every mismatched option.
///
/// With no option flagged correct any answer passes.
fn grade_checkbox(options: &[FieldOption], selected: &[&str], hints: &mut Hints) -> bool {
    if !options.iter().any(|o| o.correct) {
        return true;
    }
    let mut ok = true;
    for (i, opt) in options.iter().enumerate() {
        let checked = selected.contains(&option_name(i).as_str());
        if checked != opt.correct {
            ok = false;
            hints.push(opt.hint.as_deref());
        }
    }
    ok
}

/// Checks a single selection; a wrong pick collects its own hint and the
/// hints of the correct options that were passed over.
fn grade_radio(options: &[FieldOption], selected: Option<&str>, hints: &mut Hints) -> bool {
    if !options.iter().any(|o| o.correct) {
        return true;
    }
    let picked = |i: usize| selected == Some(option_name(i).as_str());
    if options.iter().enumerate().any(|(i, o)| o.correct && picked(i)) {
        return true;
    }
    for (i, opt) in options.iter().enumerate() {
        if opt.correct || picked(i) {
            hints.push(opt.hint.as_deref());
        }
    }
    false
}

/// Compares trimmed text against the exact answer or the pattern.
fn grade_text(text: &TextField, value: &str) -> Result<bool> {
    let value = value.trim();
    match (&text.correct, &text.regex) {
        (Some(correct), _) => Ok(correct == value),
        (None, Some(pattern)) => {
            let re = Regex::new(&format!("^(?:{pattern})"))
                .map_err(|e| GraderError::config(format!("Invalid answer pattern `{pattern}`: {e}")))?;
            Ok(re.is_match(value))
        }
        (None, None) => Ok(true),
    }
}

/// The options a table row is graded against: the table's options with the
/// row's correctness flags and hint.
fn row_options(table: &TableField, row: usize) -> Vec<FieldOption> {
    let Some(row) = table.rows.get(row) else {
        return Vec::new();
    };
    (0..table.options.len())
        .map(|i| FieldOption {
            label:   String::new(),
            correct: row.correct_options.get(i).copied().unwrap_or(false),
            hint:    row.hint.clone(),
        })
        .collect()
}

/// Grades one traversal step. Returns whether the field was correct along
/// with one grade per claimed name.
fn grade_step(step: &Step<'_>, submission: &Submission) -> Result<(bool, Vec<FieldGrade>)> {
    let field = step.field;
    let name = step.first_name().to_string();
    let mut hints = Hints::default();

    let ok = match &field.kind {
        FieldKind::Checkbox(c) => grade_checkbox(&c.options, &submission.choices(&name), &mut hints),
        FieldKind::Radio(c) | FieldKind::Dropdown(c) | FieldKind::Select(c) => {
            grade_radio(&c.options, submission.choice(&name), &mut hints)
        }
        FieldKind::Text(t) | FieldKind::Textarea(t) => {
            let ok = grade_text(t, submission.text(&name))?;
            if !ok {
                hints.push(field.hint.as_deref());
            }
            ok
        }
        FieldKind::TableRadio(t) | FieldKind::TableCheckbox(t) => {
            return Ok(grade_table(step, t, submission));
        }
    };

    let grade = FieldGrade {
        name,
        points: if ok { field.points } else { 0 },
        max_points: field.points,
        hints: if ok { String::new() } else { hints.joined() },
    };
    Ok((ok, vec![grade]))
}

/// Grades every row of a table. Each correct row earns its points, the
/// table's own points need every row correct, and all feedback lands on the
/// first row.
fn grade_table(step: &Step<'_>, table: &TableField, submission: &Submission) -> (bool, Vec<FieldGrade>) {
    let multi = step.field.kind.is_multi_choice();
    let mut hints = Hints::default();
    let mut all_ok = true;

    let mut grades: Vec<FieldGrade> = step
        .names
        .iter()
        .enumerate()
        .map(|(r, name)| {
            let options = row_options(table, r);
            let mut row_hints = Hints::default();
            let ok = if multi {
                grade_checkbox(&options, &submission.choices(name), &mut row_hints)
            } else {
                grade_radio(&options, submission.choice(name), &mut row_hints)
            };
            if !ok {
                all_ok = false;
                hints.0.extend(row_hints.0);
            }
            let row_points = table.rows.get(r).map_or(0, |row| row.points);
            FieldGrade {
                name:       name.clone(),
                points:     if ok { row_points } else { 0 },
                max_points: row_points,
                hints:      String::new(),
            }
        })
        .collect();

    if let Some(first) = grades.first_mut() {
        first.max_points += step.field.points;
        if all_ok {
            first.points += step.field.points;
        }
        first.hints = hints.joined();
    }
    (all_ok, grades)
}

/// Grades `submission` over the fields `selection` puts in play.
///
/// Walks the same [`Traversal`] the form builder uses, so names line up with
/// the rendered form.
pub fn grade(schema: &ExerciseSchema, selection: &Selection, submission: &Submission) -> Result<GradingResult> {
    let mut result = GradingResult::default();

    for step in Traversal::new().walk(schema, selection) {
        let (ok, grades) = grade_step(&step, submission)?;
        for g in &grades {
            result.points += g.points;
            result.max_points += g.max_points;
        }
        if !ok {
            let group = step.group_name();
            if !result.error_groups.contains(&group) {
                result.error_groups.push(group);
            }
            if !step.group.group_errors {
                result.error_fields.push(step.first_name().to_string());
            }
        }
        tracing::debug!("Graded {} ({}): {}", step.first_name(), step.field.kind.type_name(), ok);
        result.fields.extend(grades);
    }
    Ok(result)
}
