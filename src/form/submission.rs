#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Submitted answers keyed by positional field name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single submitted value: one string, or several for multi-choice fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmittedValue {
    /// Text or a single option name.
    Single(String),
    /// Several option names.
    Many(Vec<String>),
}

/// Answers posted for one form, including the manifest keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Submission {
    /// Values by name.
    values: HashMap<String, SubmittedValue>,
}

impl Submission {
    /// Creates an empty submission.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values
            .insert(name.into(), SubmittedValue::Single(value.into()));
        self
    }

    /// Adds a list of values.
    pub fn with_many<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values.insert(
            name.into(),
            SubmittedValue::Many(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Text submitted under `name`; empty when absent. For lists, the first
    /// entry.
    pub fn text(&self, name: &str) -> &str {
        match self.values.get(name) {
            Some(SubmittedValue::Single(s)) => s,
            Some(SubmittedValue::Many(v)) => v.first().map(String::as_str).unwrap_or_default(),
            None => "",
        }
    }

    /// The single option selected under `name`, if any.
    pub fn choice(&self, name: &str) -> Option<&str> {
        Some(self.text(name)).filter(|s| !s.is_empty())
    }

    /// All options selected under `name`.
    pub fn choices(&self, name: &str) -> Vec<&str> {
        match self.values.get(name) {
            Some(SubmittedValue::Single(s)) if !s.is_empty() => vec![s.as_str()],
            Some(SubmittedValue::Many(v)) => v.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// True when nothing usable was submitted under `name`.
    pub fn is_blank(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(SubmittedValue::Single(s)) => s.trim().is_empty(),
            Some(SubmittedValue::Many(v)) => v.is_empty(),
            None => true,
        }
    }
}
