#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Randomized question forms: schema, sampling, building and grading.

/// Expansion of a schema into rendered field instances
pub mod builder;
/// Grading of submitted answers
pub mod grading;
/// Tamper-evident record of randomly picked fields
pub mod manifest;
/// Typed exercise schema
pub mod schema;
/// Submitted answers
pub mod submission;
/// Positional naming shared by building and grading
pub mod traversal;

pub use builder::{Choice, FieldInstance, Form, FormBuilder};
pub use grading::{FieldGrade, GradingResult, grade};
pub use manifest::SampleManifest;
pub use schema::{ExerciseSchema, FieldConfig, FieldGroup, FieldKind, FieldOption, TableRow};
pub use submission::{Submission, SubmittedValue};
pub use traversal::{Selection, Step, Traversal};
