#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Typed exercise schema: field groups, fields, options and table rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GraderError, Result};

/// One selectable option of a choice or table field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    /// Text shown next to the option.
    #[serde(default)]
    pub label:   String,
    /// Whether selecting this option is part of a correct answer.
    #[serde(default)]
    pub correct: bool,
    /// Feedback shown when this option is answered wrong.
    #[serde(default)]
    pub hint:    Option<String>,
}

/// One row of a table field. Rows share the table's option list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// Row heading.
    #[serde(default)]
    pub label:           Option<String>,
    /// Per-option correctness flags, positionally aligned with the table's
    /// options. Missing entries count as not correct.
    #[serde(default)]
    pub correct_options: Vec<bool>,
    /// Points for answering this row correctly.
    #[serde(default)]
    pub points:          i64,
    /// Feedback attached when this row is answered wrong.
    #[serde(default)]
    pub hint:            Option<String>,
}

/// Options shared by the choice widgets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceField {
    /// Ordered options.
    #[serde(default)]
    pub options: Vec<FieldOption>,
}

/// Expected answer of a free text field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextField {
    /// Exact expected answer, compared against the trimmed input.
    #[serde(default)]
    pub correct: Option<String>,
    /// Pattern the trimmed input must match from its start.
    #[serde(default)]
    pub regex:   Option<String>,
}

/// Options and rows of a table field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableField {
    /// Options every row chooses from.
    #[serde(default)]
    pub options: Vec<FieldOption>,
    /// Ordered rows, each rendered as its own field.
    #[serde(default)]
    pub rows:    Vec<TableRow>,
}

/// Closed set of field kinds, tagged by the configuration's `type` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FieldKind {
    /// Multiple selectable options.
    Checkbox(ChoiceField),
    /// Exactly one option, shown as radio buttons.
    Radio(ChoiceField),
    /// Exactly one option, shown as a drop-down list.
    Dropdown(ChoiceField),
    /// Same as [`FieldKind::Dropdown`].
    Select(ChoiceField),
    /// Single line text input.
    Text(TextField),
    /// Multi line text input.
    Textarea(TextField),
    /// Table whose rows each take one option.
    TableRadio(TableField),
    /// Table whose rows each take any number of options.
    TableCheckbox(TableField),
}

impl FieldKind {
    /// The configuration name of this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Checkbox(_) => "checkbox",
            Self::Radio(_) => "radio",
            Self::Dropdown(_) => "dropdown",
            Self::Select(_) => "select",
            Self::Text(_) => "text",
            Self::Textarea(_) => "textarea",
            Self::TableRadio(_) => "table-radio",
            Self::TableCheckbox(_) => "table-checkbox",
        }
    }

    /// Options offered by this kind, empty for text kinds.
    pub fn options(&self) -> &[FieldOption] {
        match self {
            Self::Checkbox(c) | Self::Radio(c) | Self::Dropdown(c) | Self::Select(c) => &c.options,
            Self::TableRadio(t) | Self::TableCheckbox(t) => &t.options,
            Self::Text(_) | Self::Textarea(_) => &[],
        }
    }

    /// Rows of a table kind.
    pub fn rows(&self) -> Option<&[TableRow]> {
        match self {
            Self::TableRadio(t) | Self::TableCheckbox(t) => Some(&t.rows),
            _ => None,
        }
    }

    /// True for kinds that hold several selected values.
    pub fn is_multi_choice(&self) -> bool {
        matches!(self, Self::Checkbox(_) | Self::TableCheckbox(_))
    }

    /// True for kinds rendered as a list of buttons rather than a text box or
    /// a drop-down list.
    pub fn is_choice_list(&self) -> bool {
        matches!(
            self,
            Self::Checkbox(_) | Self::Radio(_) | Self::TableRadio(_) | Self::TableCheckbox(_)
        )
    }
}

/// One configured question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Kind and kind-specific answer configuration.
    #[serde(flatten)]
    pub kind:     FieldKind,
    /// Question text.
    pub title:    String,
    /// Whether an answer must be given.
    #[serde(default)]
    pub required: bool,
    /// Points for a fully correct answer.
    #[serde(default)]
    pub points:   i64,
    /// Extra instructions shown with the question.
    #[serde(default)]
    pub more:     Option<String>,
    /// File whose contents are appended to `more`.
    #[serde(default)]
    pub include:  Option<String>,
    /// Feedback attached to a wrong text answer.
    #[serde(default)]
    pub hint:     Option<String>,
}

/// An ordered cluster of questions sharing an error-visibility policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGroup {
    /// Optional identifier used in diagnostics.
    #[serde(default)]
    pub name:          Option<String>,
    /// Heading shown above the group.
    #[serde(default)]
    pub title:         Option<String>,
    /// Report only the group, never the individual field, as erroneous.
    #[serde(default)]
    pub group_errors:  bool,
    /// Number of fields drawn at random for each student.
    #[serde(default)]
    pub pick_randomly: Option<usize>,
    /// Ordered fields of the group.
    pub fields:        Vec<FieldConfig>,
}

/// Ordered field groups of an exercise. Position is the only identity a
/// field has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseSchema {
    /// Ordered groups.
    #[serde(rename = "fieldgroups")]
    pub groups: Vec<FieldGroup>,
}

impl ExerciseSchema {
    /// Parses and validates a schema from already-decoded configuration.
    ///
    /// `config` is the exercise configuration object holding `fieldgroups`.
    pub fn from_value(config: &Value) -> Result<Self> {
        if config.get("fieldgroups").is_none() {
            return Err(GraderError::config(
                "Missing required \"fieldgroups\" in exercise configuration",
            ));
        }
        let schema: ExerciseSchema = serde_json::from_value(config.clone())?;
        schema.validate()?;
        Ok(schema)
    }

    /// Checks invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for (g, group) in self.groups.iter().enumerate() {
            let label = group.name.clone().unwrap_or_else(|| format!("group {g}"));
            if group.pick_randomly == Some(0) {
                return Err(GraderError::config(format!("{label} picks no fields at random")));
            }
            if let Some(k) = group.pick_randomly
                && k > group.fields.len()
            {
                return Err(GraderError::config(format!(
                    "{label} picks {k} fields at random but only has {}",
                    group.fields.len()
                )));
            }
            for field in &group.fields {
                if let Some(rows) = field.kind.rows()
                    && rows.is_empty()
                {
                    return Err(GraderError::config(format!(
                        "Table field \"{}\" in {label} has no rows",
                        field.title
                    )));
                }
            }
        }
        Ok(())
    }

    /// True when any group draws its fields at random.
    pub fn is_randomized(&self) -> bool {
        self.groups.iter().any(|g| g.pick_randomly.is_some())
    }
}
