//! # grader
//!
//! Grades exercise submissions: randomized question forms checked against a
//! declarative schema, and pipelines of external grading actions whose text
//! output is parsed into points and feedback.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Grading actions and the pipeline running them
pub mod actions;
/// Process-wide configuration
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Error kinds
pub mod error;
/// Question forms
pub mod form;
/// Parsers for grader output protocols
pub mod parsers;
/// Running external programs
pub mod process;

pub use config::{GraderConfig, Secret};
pub use error::{GraderError, Result};
