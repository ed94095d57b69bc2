#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::Path;

use bon::Builder;

use super::{
    config::{ActionConfig, Course, Exercise},
    gitlab::{GitlabClient, RepositoryLookup},
    kinds::{ActionContext, run_action},
    result::{ActionResult, PipelineResult},
};
use crate::{
    config::GraderConfig,
    error::Result,
    process::{Invoker, ScriptInvoker},
};

/// Runs an exercise's actions one after another and folds their results.
#[derive(Debug, Builder)]
pub struct ActionPipeline<'a, I, L> {
    /// Process-wide configuration.
    config:  &'a GraderConfig,
    /// Starts external programs.
    invoker: I,
    /// Answers repository checks.
    lookup:  L,
}

impl<'a> ActionPipeline<'a, ScriptInvoker, GitlabClient> {
    /// Pipeline running real scripts and querying GitLab over HTTPS.
    pub fn from_config(config: &'a GraderConfig) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            invoker: ScriptInvoker::new(config),
            lookup: GitlabClient::new()?,
        })
    }
}

impl<I: Invoker, L: RepositoryLookup> ActionPipeline<'_, I, L> {
    /// Process boundary the actions run through.
    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Repository metadata source.
    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Runs `actions` in order against `submission_dir`.
    ///
    /// Stops after the first action whose result asks to stop. An action
    /// failing with a contained error counts as a stopping, zero-point step;
    /// fatal errors abort the run.
    pub async fn run(
        &self,
        course: &Course,
        exercise: &Exercise,
        actions: &[ActionConfig],
        submission_dir: &Path,
    ) -> Result<PipelineResult> {
        let ctx = ActionContext {
            config: self.config,
            invoker: &self.invoker,
            lookup: &self.lookup,
            course,
            exercise,
            submission_dir,
        };

        let mut total = PipelineResult::default();
        for action in actions {
            tracing::debug!("Running {} for {}/{}", action.kind(), course.key, exercise.key);
            let result = match run_action(&ctx, action).await {
                Ok(result) => result,
                Err(e) if !e.is_fatal() => {
                    tracing::error!("Action {} failed: {e:#}", action.kind());
                    ActionResult::halted(format!("Action {} failed.", action.kind()))
                }
                Err(e) => return Err(e),
            };

            let stop = result.stop;
            total.merge(action.kind(), result);
            if stop {
                tracing::warn!("Action {} stopped the pipeline", action.kind());
                break;
            }
        }

        tracing::info!(
            "Graded {}/{}: {}/{} points after {} of {} actions",
            course.key,
            exercise.key,
            total.points,
            total.max_points,
            total.executed(),
            actions.len()
        );
        Ok(total)
    }

    /// Runs the exercise's own configured actions.
    pub async fn run_exercise(
        &self,
        course: &Course,
        exercise: &Exercise,
        submission_dir: &Path,
    ) -> Result<PipelineResult> {
        self.run(course, exercise, &exercise.actions, submission_dir)
            .await
    }
}
