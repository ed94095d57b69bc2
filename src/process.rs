#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::{OsStr, OsString},
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::{
    io::{AsyncReadExt, BufReader},
    process::{Child, Command},
    time::timeout,
};

use crate::{actions::ActionConfig, config::GraderConfig, constants::TIMEOUT_EXIT_CODE};

/// Drop guard that terminates a spawned child process if callers forget to
/// await it, or give up on it when a deadline passes.
struct ChildDropGuard(Option<Child>);

impl ChildDropGuard {
    /// Wraps the provided child process with the drop guard.
    fn new(child: Child) -> Self {
        Self(Some(child))
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> Result<&mut Child> {
        self.0
            .as_mut()
            .context("child process already taken from guard")
    }

    /// Prevents the guard from killing the process on drop.
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.0.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct Collected {
    /// Exit status returned by the process.
    pub status: std::process::ExitStatus,
    /// Contents written to stdout.
    pub stdout: Vec<u8>,
    /// Contents written to stderr.
    pub stderr: Vec<u8>,
}

/// Spawns a command with a closed stdin and collects stdout/stderr.
///
/// Returns `Ok(None)` when `deadline` elapses first; the child is killed when
/// its guard drops.
pub async fn run_collect(
    program: impl AsRef<OsStr>,
    args: &[OsString],
    cwd: Option<&Path>,
    deadline: Option<Duration>,
) -> Result<Option<Collected>> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut guard = ChildDropGuard::new(cmd.spawn().context("failed to spawn process")?);

    let stdout = guard
        .child_mut()?
        .stdout
        .take()
        .context("missing stdout pipe")?;
    let stderr = guard
        .child_mut()?
        .stderr
        .take()
        .context("missing stderr pipe")?;

    let out_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .context("failed to read stdout")?;
        Ok::<Vec<u8>, anyhow::Error>(buf)
    });

    let err_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .context("failed to read stderr")?;
        Ok::<Vec<u8>, anyhow::Error>(buf)
    });

    let wait_future = async move {
        let mut guard = guard;
        let status = guard
            .child_mut()?
            .wait()
            .await
            .context("failed to wait on process")?;
        let stdout = out_task.await.context("stdout task join error")??;
        let stderr = err_task.await.context("stderr task join error")??;
        guard.disarm();
        Ok(Collected {
            status,
            stdout,
            stderr,
        })
    };

    match deadline {
        Some(limit) => match timeout(limit, wait_future).await {
            Ok(collected) => collected.map(Some),
            Err(_) => Ok(None),
        },
        None => wait_future.await.map(Some),
    }
}

/// Exit code and captured text of one external invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Invocation {
    /// Process exit code; `-1` when the process was killed by a signal.
    pub code: i32,
    /// Captured standard output.
    pub out:  String,
    /// Captured standard error.
    pub err:  String,
}

impl Invocation {
    /// Creates an invocation record from its parts.
    pub fn new(code: i32, out: impl Into<String>, err: impl Into<String>) -> Self {
        Self {
            code,
            out: out.into(),
            err: err.into(),
        }
    }

    /// True when the process exited with status zero.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Converts collected process output, or a missed deadline, into an
    /// invocation record.
    fn from_collected(collected: Option<Collected>, limit: Duration) -> Self {
        match collected {
            Some(c) => Self {
                code: c.status.code().unwrap_or(-1),
                out:  String::from_utf8_lossy(&c.stdout).into_owned(),
                err:  String::from_utf8_lossy(&c.stderr).into_owned(),
            },
            None => Self {
                code: TIMEOUT_EXIT_CODE,
                out:  String::new(),
                err:  format!("Command timed out after {} seconds.", limit.as_secs()),
            },
        }
    }
}

/// Boundary through which grading actions start external programs.
///
/// Implementations own how programs and sandboxes are actually run; the
/// pipeline only interprets the returned [`Invocation`].
pub trait Invoker: Send + Sync {
    /// Runs `program` with `args` inside `workdir`.
    fn invoke(
        &self,
        program: &Path,
        args: &[String],
        workdir: &Path,
    ) -> impl Future<Output = Result<Invocation>> + Send;

    /// Runs the sandboxed command described by `action` for `course_key`
    /// inside `workdir`.
    fn invoke_sandbox(
        &self,
        course_key: &str,
        action: &ActionConfig,
        workdir: &Path,
    ) -> impl Future<Output = Result<Invocation>> + Send;
}

/// Sandbox limits forwarded to the sandbox script when an action sets them.
const SANDBOX_ARGS: [&str; 5] = ["net", "time", "memory", "files", "disk"];

/// [`Invoker`] that runs the scripts named in a [`GraderConfig`] as child
/// processes.
#[derive(Debug, Clone)]
pub struct ScriptInvoker {
    /// Sandbox launcher.
    sandbox_script:  PathBuf,
    /// Deadline for plain scripts.
    script_timeout:  Duration,
    /// Deadline for sandboxed runs.
    sandbox_timeout: Duration,
}

impl ScriptInvoker {
    /// Creates an invoker using the scripts and deadlines in `config`.
    pub fn new(config: &GraderConfig) -> Self {
        Self {
            sandbox_script:  config.sandbox_script().clone(),
            script_timeout:  config.script_timeout(),
            sandbox_timeout: config.sandbox_timeout(),
        }
    }

    /// Builds the sandbox script's argument list for `action`.
    fn sandbox_args(course_key: &str, action: &ActionConfig, workdir: &Path) -> Vec<String> {
        let mut args = vec!["--course_key".to_string(), course_key.to_string()];
        args.extend(action.collect_args(&SANDBOX_ARGS));
        args.push(workdir.display().to_string());
        args.push("--".to_string());
        args.extend(action.command());
        args
    }
}

impl Invoker for ScriptInvoker {
    async fn invoke(&self, program: &Path, args: &[String], workdir: &Path) -> Result<Invocation> {
        tracing::debug!("Invoking {} {:?}", program.display(), args);
        let args: Vec<OsString> = args.iter().map(OsString::from).collect();
        let collected = run_collect(program, &args, Some(workdir), Some(self.script_timeout))
            .await
            .with_context(|| format!("Could not run {}", program.display()))?;
        Ok(Invocation::from_collected(collected, self.script_timeout))
    }

    async fn invoke_sandbox(
        &self,
        course_key: &str,
        action: &ActionConfig,
        workdir: &Path,
    ) -> Result<Invocation> {
        let args = Self::sandbox_args(course_key, action, workdir);
        tracing::debug!("Invoking sandbox {} {:?}", self.sandbox_script.display(), args);
        let args: Vec<OsString> = args.iter().map(OsString::from).collect();
        let collected =
            run_collect(&self.sandbox_script, &args, Some(workdir), Some(self.sandbox_timeout))
                .await
                .with_context(|| {
                    format!("Could not run sandbox {}", self.sandbox_script.display())
                })?;
        Ok(Invocation::from_collected(collected, self.sandbox_timeout))
    }
}
