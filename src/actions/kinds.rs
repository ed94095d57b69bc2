#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! What each action kind does with its invocation.

use std::{io::Write, path::Path};

use anyhow::Context;
use tempfile::NamedTempFile;

use super::{
    config::{ActionConfig, ActionKind, Course, Exercise},
    gitlab::{RepositoryCheck, RepositoryLookup, check_repository},
    result::ActionResult,
};
use crate::{
    config::GraderConfig,
    error::{GraderError, Result},
    parsers::{checker_totals, find_point_lines, parse_diff_blocks, split_appendix},
    process::{Invocation, Invoker},
};

/// Parameters the prepare script accepts.
const PREPARE_ARGS: [&str; 7] = [
    "attachment_pull",
    "attachment_unzip",
    "unzip",
    "charset",
    "cp_exercises",
    "cp",
    "mv",
];

/// Parameters the clone script accepts.
const GITCLONE_ARGS: [&str; 3] = ["repo_dir", "read", "files"];

/// Parameters the rule-based checker accepts.
const EXPACA_ARGS: [&str; 3] = ["rule_file", "model_dir", "user_dir"];

/// Everything an action may touch while it runs.
#[derive(Debug)]
pub struct ActionContext<'a, I, L> {
    /// Process-wide configuration.
    pub config:         &'a GraderConfig,
    /// Process boundary.
    pub invoker:        &'a I,
    /// Repository metadata source.
    pub lookup:         &'a L,
    /// Course being graded.
    pub course:         &'a Course,
    /// Exercise being graded.
    pub exercise:       &'a Exercise,
    /// Directory holding the submitted files.
    pub submission_dir: &'a Path,
}

impl<I: Invoker, L: RepositoryLookup> ActionContext<'_, I, L> {
    /// Runs `script` with `args` followed by the submission directory.
    async fn script(&self, script: &Path, mut args: Vec<String>) -> Result<Invocation> {
        args.push(self.submission_dir.display().to_string());
        Ok(self.invoker.invoke(script, &args, self.submission_dir).await?)
    }

    /// Runs the sandboxed command of `action`.
    async fn sandboxed(&self, action: &ActionConfig) -> Result<Invocation> {
        Ok(self
            .invoker
            .invoke_sandbox(&self.course.key, action, self.submission_dir)
            .await?)
    }
}

/// Applies the point-line protocol to an invocation.
fn with_point_lines(invocation: Invocation) -> ActionResult {
    let parsed = find_point_lines(&invocation.out);
    ActionResult {
        points: parsed.points.unwrap_or(0),
        max_points: parsed.max_points.unwrap_or(0),
        out: parsed.out,
        err: invocation.err,
        stop: invocation.code != 0,
        ..ActionResult::default()
    }
}

/// Runs one action.
///
/// Errors other than [`GraderError::Action`] are fatal to the whole run.
pub async fn run_action<I: Invoker, L: RepositoryLookup>(
    ctx: &ActionContext<'_, I, L>,
    action: &ActionConfig,
) -> Result<ActionResult> {
    match action.kind() {
        ActionKind::Prepare => prepare(ctx, action).await,
        ActionKind::Gitclone => gitclone(ctx, action).await,
        ActionKind::Sandbox => sandbox(ctx, action).await,
        ActionKind::SandboxPythonTest => sandbox_python_test(ctx, action).await,
        ActionKind::Diffbox | ActionKind::Johoh => diffbox(ctx, action).await,
        ActionKind::Expaca => expaca(ctx, action).await,
        ActionKind::Timeout => timeout(ctx).await,
        ActionKind::Gitlabquery => gitlabquery(ctx, action).await,
    }
}

/// Stages the submitted files.
async fn prepare<I: Invoker, L: RepositoryLookup>(
    ctx: &ActionContext<'_, I, L>,
    action: &ActionConfig,
) -> Result<ActionResult> {
    let mut args = vec!["--course_key".to_string(), ctx.course.key.clone()];
    args.extend(action.collect_args(&PREPARE_ARGS));
    let invocation = ctx.script(ctx.config.prepare_script(), args).await?;
    Ok(ActionResult::from_exit(invocation))
}

/// Clones the student's repository; its output may carry an appendix.
async fn gitclone<I: Invoker, L: RepositoryLookup>(
    ctx: &ActionContext<'_, I, L>,
    action: &ActionConfig,
) -> Result<ActionResult> {
    let invocation = ctx
        .script(ctx.config.gitclone_script(), action.collect_args(&GITCLONE_ARGS))
        .await?;
    let mut result = ActionResult::from_exit(invocation);
    let (out, appendix) = split_appendix(&result.out);
    result.out = out;
    result.appendix = Some(appendix);
    Ok(result)
}

/// Sandboxed check reporting point lines.
async fn sandbox<I: Invoker, L: RepositoryLookup>(
    ctx: &ActionContext<'_, I, L>,
    action: &ActionConfig,
) -> Result<ActionResult> {
    Ok(with_point_lines(ctx.sandboxed(action).await?))
}

/// Sandboxed Python tests; the test runner reports on stderr.
async fn sandbox_python_test<I: Invoker, L: RepositoryLookup>(
    ctx: &ActionContext<'_, I, L>,
    action: &ActionConfig,
) -> Result<ActionResult> {
    let result = sandbox(ctx, action).await?;
    Ok(ActionResult {
        points: result.points,
        max_points: result.max_points,
        out: result.err,
        err: String::new(),
        stop: result.stop,
        ..ActionResult::default()
    })
}

/// Sandboxed check whose output is segmented into diff blocks.
async fn diffbox<I: Invoker, L: RepositoryLookup>(
    ctx: &ActionContext<'_, I, L>,
    action: &ActionConfig,
) -> Result<ActionResult> {
    let mut result = sandbox(ctx, action).await?;
    result.tests = Some(parse_diff_blocks(&result.out));
    result.html = true;
    Ok(result)
}

/// Third-party rule-based checker; must always exit zero.
async fn expaca<I: Invoker, L: RepositoryLookup>(
    ctx: &ActionContext<'_, I, L>,
    action: &ActionConfig,
) -> Result<ActionResult> {
    let invocation = ctx
        .script(ctx.config.expaca_script(), action.collect_args(&EXPACA_ARGS))
        .await?;
    if invocation.code != 0 {
        return Err(GraderError::HardExternal(format!(
            "Expaca return code not zero!\nMore information: {invocation:?}"
        )));
    }

    let (points, max_points) = checker_totals(&invocation.out)?;
    let out = match action.str_param("xslt_transform") {
        Some(stylesheet) => transform(ctx, &invocation.out, stylesheet).await?,
        None => invocation.out,
    };

    Ok(ActionResult {
        points,
        max_points,
        out,
        err: invocation.err,
        stop: false,
        ..ActionResult::default()
    })
}

/// Runs the XSLT processor over `report` with a stylesheet below the base
/// directory.
async fn transform<I: Invoker, L: RepositoryLookup>(
    ctx: &ActionContext<'_, I, L>,
    report: &str,
    stylesheet: &str,
) -> Result<String> {
    let mut staged = NamedTempFile::new().context("Could not create a file for the checker report")?;
    staged
        .write_all(report.as_bytes())
        .context("Could not stage the checker report")?;

    let args = vec![
        ctx.config.base_dir().join(stylesheet).display().to_string(),
        staged.path().display().to_string(),
    ];
    let invocation = ctx
        .invoker
        .invoke(ctx.config.xslt_command(), &args, ctx.submission_dir)
        .await?;
    if !invocation.success() {
        return Err(anyhow::anyhow!(
            "XSLT transform with {stylesheet} failed: {}",
            invocation.err
        )
        .into());
    }
    Ok(invocation.out)
}

/// Blocks for the configured debug delay.
async fn timeout<I: Invoker, L: RepositoryLookup>(ctx: &ActionContext<'_, I, L>) -> Result<ActionResult> {
    tracing::warn!("Timeout action sleeping for {:?}", ctx.config.debug_sleep());
    tokio::time::sleep(ctx.config.debug_sleep()).await;
    Ok(ActionResult {
        points: 10,
        out: "Did not reach timeout, should not happen.".to_string(),
        stop: true,
        ..ActionResult::default()
    })
}

/// Checks the submitted repository's visibility and fork lineage.
async fn gitlabquery<I: Invoker, L: RepositoryLookup>(
    ctx: &ActionContext<'_, I, L>,
    action: &ActionConfig,
) -> Result<ActionResult> {
    let Some(host) = ctx.exercise.require_gitlab.as_deref() else {
        return Err(GraderError::config("This action needs require_gitlab in exercise."));
    };
    let Some(token) = action.str_param("token") else {
        return Err(GraderError::config(
            "Token missing from configuration for gitlab privacy check.",
        ));
    };

    let check = check_repository(ctx.lookup, host, token, action, ctx.submission_dir).await;
    if let RepositoryCheck::Failed(e) = &check {
        tracing::error!("Failed to check gitlab repository on {host}: {e:#}");
    }
    Ok(match check {
        RepositoryCheck::Passed => ActionResult::default(),
        other => ActionResult::halted(other.message()),
    })
}
