#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Expands a schema into the ordered field instances a renderer displays.

use std::path::{Path, PathBuf};

use bon::Builder;
use rand::Rng;
use serde::Serialize;

use super::{
    grading::{FieldGrade, GradingResult, grade},
    manifest::SampleManifest,
    schema::{ExerciseSchema, FieldConfig},
    submission::Submission,
    traversal::{Selection, Step, Traversal, option_name},
};
use crate::{
    config::Secret,
    error::{GraderError, Result},
};

/// A positional option name and its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    /// Positional name, `option_<i>`.
    pub name:  String,
    /// Display label.
    pub label: String,
}

/// One rendered input, derived from a field (or a table row) at a stable
/// position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInstance {
    /// Positional name, `field_<i>`.
    pub name:         String,
    /// Configured kind name, e.g. `table-radio`.
    pub kind:         &'static str,
    /// Question text.
    pub label:        String,
    /// Extra instructions, `more` followed by the included file.
    pub more:         Option<String>,
    /// Configured points of the field.
    pub points:       i64,
    /// Whether an answer must be given.
    pub required:     bool,
    /// Rendered read-only, for reconstructed randomized forms.
    pub readonly:     bool,
    /// Options with positional names; empty for text kinds.
    pub choices:      Vec<Choice>,
    /// Options render as a list of buttons rather than a drop-down.
    pub choice_list:  bool,
    /// Heading of a table row.
    pub row_label:    Option<String>,
    /// Group name when this instance opens a group.
    pub open_set:     Option<String>,
    /// Group title shown where the group opens.
    pub set_title:    Option<String>,
    /// This instance closes its group.
    pub close_set:    bool,
    /// This instance opens a table.
    pub open_table:   bool,
    /// This instance closes a table.
    pub close_table:  bool,
    /// The owning group reports errors only at group level.
    pub group_errors: bool,
    /// Grading outcome, filled in by [`Form::annotate`].
    pub grade:        Option<FieldGrade>,
}

/// A built form: field instances plus the manifest that must round-trip with
/// it.
#[derive(Debug, Clone, Serialize)]
pub struct Form {
    /// Ordered instances.
    pub fields:       Vec<FieldInstance>,
    /// Manifest to embed in the rendered form, if fields were picked at
    /// random.
    pub manifest:     Option<SampleManifest>,
    /// All instances are read-only.
    pub readonly:     bool,
    /// Any group reports errors at group level only.
    pub group_errors: bool,
    /// Selection the instances were built from.
    #[serde(skip)]
    selection:        Selection,
}

impl Form {
    /// Selection the form was built from.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Looks up an instance by positional name.
    pub fn field(&self, name: &str) -> Option<&FieldInstance> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of required fields left blank in `submission`.
    pub fn validate(&self, submission: &Submission) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.required && submission.is_blank(&f.name))
            .map(|f| f.name.clone())
            .collect()
    }

    /// Grades `submission` over this form's selection and records each
    /// field's grade on its instance.
    pub fn grade(&mut self, schema: &ExerciseSchema, submission: &Submission) -> Result<GradingResult> {
        let result = grade(schema, &self.selection, submission)?;
        self.annotate(&result);
        Ok(result)
    }

    /// Copies per-field grades from `result` onto the matching instances.
    pub fn annotate(&mut self, result: &GradingResult) {
        for grade in &result.fields {
            if let Some(instance) = self.fields.iter_mut().find(|f| f.name == grade.name) {
                instance.grade = Some(grade.clone());
            }
        }
    }
}

/// Expands an [`ExerciseSchema`] into a [`Form`].
#[derive(Debug, Clone, Builder)]
pub struct FormBuilder<'a> {
    /// Schema to expand.
    schema:      &'a ExerciseSchema,
    /// Key for manifest checksums.
    secret:      &'a Secret,
    /// Directory `include` files resolve against.
    #[builder(into)]
    include_dir: Option<PathBuf>,
}

impl FormBuilder<'_> {
    /// Builds a fresh form, drawing random subsets where groups ask for them.
    pub fn render<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Form> {
        let (manifest, selection) = SampleManifest::generate(self.schema, self.secret, rng)?;
        self.form(selection, manifest, false)
    }

    /// Rebuilds the form a submission was made against.
    ///
    /// A submission carrying a manifest must verify against the secret before
    /// its sample is used; the rebuilt form keeps the manifest and is
    /// read-only. A submission without one is graded over all fields.
    pub fn from_submission(&self, submission: &Submission) -> Result<Form> {
        match SampleManifest::from_submission(submission) {
            Some(manifest) if self.schema.is_randomized() => {
                let selection = manifest.verified_selection(self.schema, self.secret)?;
                self.form(selection, Some(manifest), true)
            }
            _ => self.form(Selection::all(self.schema), None, false),
        }
    }

    /// Assembles a form from an already decided selection.
    fn form(&self, selection: Selection, manifest: Option<SampleManifest>, readonly: bool) -> Result<Form> {
        let mut fields = self.build(&selection)?;
        if readonly {
            fields.iter_mut().for_each(|f| f.readonly = true);
        }
        Ok(Form {
            fields,
            manifest,
            readonly,
            group_errors: self.schema.groups.iter().any(|g| g.group_errors),
            selection,
        })
    }

    /// Expands `selection` into ordered field instances.
    ///
    /// Pure: the same schema and selection always give the same instances.
    pub fn build(&self, selection: &Selection) -> Result<Vec<FieldInstance>> {
        let mut fields = Vec::new();
        for step in Traversal::new().walk(self.schema, selection) {
            let mut instances = self.instances(&step)?;
            if step.first
                && let Some(first) = instances.first_mut()
            {
                first.open_set = Some(step.group_name());
                first.set_title = step.group.title.clone();
            }
            if step.last
                && let Some(last) = instances.last_mut()
            {
                last.close_set = true;
            }
            fields.extend(instances);
        }
        Ok(fields)
    }

    /// Instances for one traversal step: one per claimed name.
    fn instances(&self, step: &Step<'_>) -> Result<Vec<FieldInstance>> {
        let field = step.field;
        let more = self.more(field)?;
        let choices: Vec<Choice> = field
            .kind
            .options()
            .iter()
            .enumerate()
            .map(|(i, opt)| Choice {
                name:  option_name(i),
                label: opt.label.clone(),
            })
            .collect();
        let rows = field.kind.rows();

        let mut instances: Vec<FieldInstance> = step
            .names
            .iter()
            .enumerate()
            .map(|(r, name)| FieldInstance {
                name:         name.clone(),
                kind:         field.kind.type_name(),
                label:        field.title.clone(),
                more:         more.clone(),
                points:       field.points,
                required:     field.required,
                readonly:     false,
                choices:      choices.clone(),
                choice_list:  field.kind.is_choice_list(),
                row_label:    rows.and_then(|rows| rows.get(r)).and_then(|row| row.label.clone()),
                open_set:     None,
                set_title:    None,
                close_set:    false,
                open_table:   false,
                close_table:  false,
                group_errors: step.group.group_errors,
                grade:        None,
            })
            .collect();

        if rows.is_some() {
            if instances.is_empty() {
                return Err(GraderError::config(format!(
                    "Table field \"{}\" has no rows",
                    field.title
                )));
            }
            if let Some(first) = instances.first_mut() {
                first.open_table = true;
            }
            if let Some(last) = instances.last_mut() {
                last.close_table = true;
            }
        }
        Ok(instances)
    }

    /// Joins `more` with the included file's text.
    fn more(&self, field: &FieldConfig) -> Result<Option<String>> {
        let mut more = field.more.clone().unwrap_or_default();
        if let Some(include) = &field.include {
            more.push_str(&self.read_include(include)?);
        }
        Ok(Some(more).filter(|m| !m.is_empty()))
    }

    /// Reads an include file below the include directory.
    fn read_include(&self, include: &str) -> Result<String> {
        let Some(dir) = &self.include_dir else {
            return Ok(String::new());
        };
        let path = resolve_include(dir, include)?;
        std::fs::read_to_string(&path).map_err(|e| {
            GraderError::config(format!("Cannot read include {}: {e}", path.display()))
        })
    }
}

/// Resolves `include` below `dir`, refusing paths that climb out of it.
fn resolve_include(dir: &Path, include: &str) -> Result<PathBuf> {
    let relative = Path::new(include);
    if relative.is_absolute()
        || relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(GraderError::config(format!(
            "Include path \"{include}\" must stay inside the include directory"
        )));
    }
    Ok(dir.join(relative))
}
