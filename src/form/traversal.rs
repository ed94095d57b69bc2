#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The positional naming algorithm shared by form building and grading.
//!
//! Fields have no identity beyond their position, so the builder and the
//! grader must hand out names in exactly the same order. Both walk a
//! [`Selection`] through a [`Traversal`]; neither keeps its own counter.

use serde::{Deserialize, Serialize};

use super::schema::{ExerciseSchema, FieldConfig, FieldGroup};

/// Positional name of the `i`-th field instance.
pub fn field_name(i: usize) -> String {
    format!("field_{i}")
}

/// Positional name of the `i`-th option of a choice list.
pub fn option_name(i: usize) -> String {
    format!("option_{i}")
}

/// Positional name of the `g`-th group.
pub fn group_name(g: usize) -> String {
    format!("group_{g}")
}

/// Field indices in use per group, in rendering order.
///
/// Groups that do not pick randomly list all their fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// One index list per schema group.
    groups: Vec<Vec<usize>>,
}

impl Selection {
    /// Selects every field of every group.
    pub fn all(schema: &ExerciseSchema) -> Self {
        Self {
            groups: schema
                .groups
                .iter()
                .map(|g| (0..g.fields.len()).collect())
                .collect(),
        }
    }

    /// Wraps explicit per-group index lists. Callers guarantee the indices
    /// are in range for the schema they walk.
    pub(crate) fn from_groups(groups: Vec<Vec<usize>>) -> Self {
        Self { groups }
    }

    /// Index list of group `g`.
    pub fn group(&self, g: usize) -> &[usize] {
        self.groups.get(g).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All per-group index lists.
    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }
}

/// One selected field reached by a [`Traversal`].
#[derive(Debug, Clone)]
pub struct Step<'a> {
    /// Index of the owning group.
    pub group_index: usize,
    /// Owning group.
    pub group:       &'a FieldGroup,
    /// Field configuration.
    pub field:       &'a FieldConfig,
    /// First selected field of the group.
    pub first:       bool,
    /// Last selected field of the group.
    pub last:        bool,
    /// Names claimed by this field: one for simple kinds, one per row for
    /// tables.
    pub names:       Vec<String>,
}

impl Step<'_> {
    /// Name of the first instance of this field.
    pub fn first_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }

    /// Positional name of the owning group.
    pub fn group_name(&self) -> String {
        group_name(self.group_index)
    }
}

/// The shared positional counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Traversal {
    /// Index the next claimed field receives.
    next: usize,
}

impl Traversal {
    /// Starts a traversal at `field_0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of names handed out so far.
    pub fn position(&self) -> usize {
        self.next
    }

    /// Claims the next positional field name.
    pub fn claim(&mut self) -> String {
        let name = field_name(self.next);
        self.next += 1;
        name
    }

    /// Claims the names `field` occupies.
    fn claim_field(&mut self, field: &FieldConfig) -> Vec<String> {
        let count = field.kind.rows().map_or(1, <[_]>::len);
        (0..count).map(|_| self.claim()).collect()
    }

    /// Walks `selection` over `schema`, claiming names in group then field
    /// order.
    ///
    /// Indices outside the schema are skipped; selections built by this
    /// crate never contain any.
    pub fn walk<'a>(mut self, schema: &'a ExerciseSchema, selection: &Selection) -> Vec<Step<'a>> {
        let mut steps = Vec::new();
        for (g, group) in schema.groups.iter().enumerate() {
            let picked: Vec<&FieldConfig> = selection
                .group(g)
                .iter()
                .filter_map(|&i| group.fields.get(i))
                .collect();
            let last = picked.len().saturating_sub(1);
            for (j, field) in picked.into_iter().enumerate() {
                let names = self.claim_field(field);
                steps.push(Step {
                    group_index: g,
                    group,
                    field,
                    first: j == 0,
                    last: j == last,
                    names,
                });
            }
        }
        steps
    }
}
