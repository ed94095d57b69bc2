#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Ordered external grading actions and their aggregation.

/// Course, exercise and action configuration
pub mod config;
/// Repository checks against GitLab
pub mod gitlab;
/// Behaviour of each action kind
pub mod kinds;
/// Sequential runner
pub mod pipeline;
/// Action and pipeline results
pub mod result;

pub use config::{ActionConfig, ActionKind, Course, Exercise};
pub use gitlab::{GitlabClient, ProjectInfo, RepositoryCheck, RepositoryLookup};
pub use pipeline::ActionPipeline;
pub use result::{ActionResult, PipelineResult, StepResult};
