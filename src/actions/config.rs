#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Typed course, exercise and action configuration.

use std::{fmt, str::FromStr};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    constants::ACTION_TYPE_PREFIX,
    error::{GraderError, Result},
    form::{ExerciseSchema, FieldGroup},
};

/// The fixed set of grading actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Stages submitted files.
    Prepare,
    /// Clones a student repository.
    Gitclone,
    /// Sandboxed check reporting point lines.
    Sandbox,
    /// Sandboxed Python test run; stderr becomes the feedback.
    SandboxPythonTest,
    /// Sandboxed check whose output is split into diff blocks.
    Diffbox,
    /// Older name of [`ActionKind::Diffbox`].
    Johoh,
    /// Third-party rule-based checker.
    Expaca,
    /// Debug action that blocks for a long time.
    Timeout,
    /// Repository visibility and fork check against a GitLab API.
    Gitlabquery,
}

impl ActionKind {
    /// Every kind, in declaration order.
    pub const ALL: [ActionKind; 9] = [
        Self::Prepare,
        Self::Gitclone,
        Self::Sandbox,
        Self::SandboxPythonTest,
        Self::Diffbox,
        Self::Johoh,
        Self::Expaca,
        Self::Timeout,
        Self::Gitlabquery,
    ];

    /// Configuration name of this kind, without the module prefix.
    pub fn name(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Gitclone => "gitclone",
            Self::Sandbox => "sandbox",
            Self::SandboxPythonTest => "sandbox_python_test",
            Self::Diffbox => "diffbox",
            Self::Johoh => "johoh",
            Self::Expaca => "expaca",
            Self::Timeout => "timeout",
            Self::Gitlabquery => "gitlabquery",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionKind {
    type Err = GraderError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.strip_prefix(ACTION_TYPE_PREFIX).unwrap_or(s);
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| GraderError::config(format!("Unknown action type \"{s}\"")))
    }
}

/// One configured action: its kind and the kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct ActionConfig {
    /// Which action runs.
    kind:   ActionKind,
    /// Remaining keys of the configuration object.
    params: Map<String, Value>,
}

impl TryFrom<Map<String, Value>> for ActionConfig {
    type Error = GraderError;

    fn try_from(mut params: Map<String, Value>) -> Result<Self> {
        let kind = match params.remove("type") {
            Some(Value::String(name)) => name.parse()?,
            Some(other) => {
                return Err(GraderError::config(format!(
                    "Action \"type\" must be a string, found {other}"
                )));
            }
            None => return Err(GraderError::config("Action is missing its \"type\"")),
        };
        Ok(Self { kind, params })
    }
}

impl From<ActionConfig> for Map<String, Value> {
    fn from(action: ActionConfig) -> Self {
        let mut map = action.params;
        map.insert("type".to_string(), Value::String(action.kind.name().to_string()));
        map
    }
}

/// Renders one parameter value as a command line argument.
fn arg_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(items.iter().filter_map(arg_value).join(" ")),
        Value::Object(_) => Some(value.to_string()),
    }
}

impl ActionConfig {
    /// Creates an action of `kind` with no parameters.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            params: Map::new(),
        }
    }

    /// Sets a parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Parses an action from its configuration object.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Kind of this action.
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Raw parameter value.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Parameter as a string, if it is one.
    pub fn str_param(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(Value::as_str)
    }

    /// Parameter as a flag. Absent or non-boolean values read as false.
    pub fn flag(&self, name: &str) -> bool {
        self.param(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// `--<name> <value>` pairs for every listed parameter this action sets,
    /// in the listed order.
    pub fn collect_args(&self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| {
                let value = arg_value(self.param(name)?)?;
                Some([format!("--{name}"), value])
            })
            .flatten()
            .collect()
    }

    /// Command the sandbox runs: `cmd` as a list, or a whitespace separated
    /// string.
    pub fn command(&self) -> Vec<String> {
        match self.param("cmd") {
            Some(Value::Array(items)) => items.iter().filter_map(arg_value).collect(),
            Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

/// Course owning an exercise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Course key passed to scripts and the sandbox.
    pub key: String,
}

/// Exercise configuration the pipeline and the form engine read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    /// Exercise key.
    #[serde(default)]
    pub key:            String,
    /// Exercise specific manifest secret.
    #[serde(default)]
    pub secret:         Option<String>,
    /// GitLab host repository checks query.
    #[serde(default)]
    pub require_gitlab: Option<String>,
    /// Question groups of a form exercise.
    #[serde(default)]
    pub fieldgroups:    Option<Vec<FieldGroup>>,
    /// Ordered grading actions.
    #[serde(default)]
    pub actions:        Vec<ActionConfig>,
}

impl Exercise {
    /// Parses an exercise from its configuration object.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Validated form schema of this exercise.
    pub fn schema(&self) -> Result<ExerciseSchema> {
        let groups = self.fieldgroups.clone().ok_or_else(|| {
            GraderError::config(format!(
                "Missing required \"fieldgroups\" in exercise \"{}\"",
                self.key
            ))
        })?;
        let schema = ExerciseSchema { groups };
        schema.validate()?;
        Ok(schema)
    }
}
