#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt, path::PathBuf, time::Duration};

use bon::Builder;

/// Default secret used when neither the environment nor the exercise
/// provides one.
const DEFAULT_SECRET: &str = "grader-default-secret";

/// Default deadline for helper scripts, in seconds.
const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 300;

/// Default deadline for sandboxed runs, in seconds.
const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 600;

/// Default delay of the debug `timeout` action, in seconds.
const DEFAULT_DEBUG_SLEEP_SECS: u64 = 15 * 60;

/// Key material for manifest checksums. `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wraps raw key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Process-wide, read-only grader configuration.
///
/// Built once at startup and shared by reference with the form builder and
/// the action pipeline.
#[derive(Debug, Clone, Builder)]
#[builder(on(PathBuf, into))]
pub struct GraderConfig {
    /// Fallback key for manifest checksums.
    #[builder(default = Secret::new(DEFAULT_SECRET))]
    secret:          Secret,
    /// Directory that relative stylesheet paths resolve against.
    #[builder(default = PathBuf::from("."))]
    base_dir:        PathBuf,
    /// Directory that field `include` files resolve against.
    include_dir:     Option<PathBuf>,
    /// Script staging submitted files.
    #[builder(default = PathBuf::from("scripts/prepare.sh"))]
    prepare_script:  PathBuf,
    /// Script cloning a student repository.
    #[builder(default = PathBuf::from("scripts/gitclone.sh"))]
    gitclone_script: PathBuf,
    /// Script running a command inside the sandbox.
    #[builder(default = PathBuf::from("scripts/sandbox.sh"))]
    sandbox_script:  PathBuf,
    /// Launcher of the third-party rule-based checker.
    #[builder(default = PathBuf::from("scripts/expaca.sh"))]
    expaca_script:   PathBuf,
    /// XSLT processor used to transform checker output.
    #[builder(default = PathBuf::from("xsltproc"))]
    xslt_command:    PathBuf,
    /// Deadline for helper scripts.
    #[builder(default = Duration::from_secs(DEFAULT_SCRIPT_TIMEOUT_SECS))]
    script_timeout:  Duration,
    /// Deadline for sandboxed runs.
    #[builder(default = Duration::from_secs(DEFAULT_SANDBOX_TIMEOUT_SECS))]
    sandbox_timeout: Duration,
    /// How long the debug `timeout` action blocks.
    #[builder(default = Duration::from_secs(DEFAULT_DEBUG_SLEEP_SECS))]
    debug_sleep:     Duration,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Reads a duration in whole seconds from `key`, falling back to `default`.
fn read_timeout_secs(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

/// Reads a non-empty path from `key`.
fn read_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

impl GraderConfig {
    /// Builds a configuration from `GRADER_*` environment variables.
    ///
    /// Callers are expected to have loaded `.env` already.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secret = std::env::var("GRADER_SECRET")
            .ok()
            .filter(|value| !value.is_empty())
            .map(Secret::new)
            .unwrap_or(defaults.secret);

        Self {
            secret,
            base_dir: read_path("GRADER_BASE_DIR").unwrap_or(defaults.base_dir),
            include_dir: read_path("GRADER_INCLUDE_DIR"),
            prepare_script: read_path("GRADER_PREPARE_SCRIPT").unwrap_or(defaults.prepare_script),
            gitclone_script: read_path("GRADER_GITCLONE_SCRIPT")
                .unwrap_or(defaults.gitclone_script),
            sandbox_script: read_path("GRADER_SANDBOX_SCRIPT").unwrap_or(defaults.sandbox_script),
            expaca_script: read_path("GRADER_EXPACA_SCRIPT").unwrap_or(defaults.expaca_script),
            xslt_command: read_path("GRADER_XSLT_COMMAND").unwrap_or(defaults.xslt_command),
            script_timeout: read_timeout_secs(
                "GRADER_SCRIPT_TIMEOUT_SECS",
                DEFAULT_SCRIPT_TIMEOUT_SECS,
            ),
            sandbox_timeout: read_timeout_secs(
                "GRADER_SANDBOX_TIMEOUT_SECS",
                DEFAULT_SANDBOX_TIMEOUT_SECS,
            ),
            debug_sleep: read_timeout_secs("GRADER_DEBUG_SLEEP_SECS", DEFAULT_DEBUG_SLEEP_SECS),
        }
    }

    /// Returns the checksum key for an exercise: its own secret when it
    /// defines a non-empty one, the process-wide default otherwise.
    pub fn secret_for(&self, exercise_secret: Option<&str>) -> Secret {
        match exercise_secret {
            Some(secret) if !secret.is_empty() => Secret::new(secret),
            _ => self.secret.clone(),
        }
    }

    /// Returns the process-wide default secret.
    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// Returns the base directory for stylesheet lookups.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Returns the include directory, if configured.
    pub fn include_dir(&self) -> Option<&PathBuf> {
        self.include_dir.as_ref()
    }

    /// Returns the prepare script path.
    pub fn prepare_script(&self) -> &PathBuf {
        &self.prepare_script
    }

    /// Returns the git clone script path.
    pub fn gitclone_script(&self) -> &PathBuf {
        &self.gitclone_script
    }

    /// Returns the sandbox script path.
    pub fn sandbox_script(&self) -> &PathBuf {
        &self.sandbox_script
    }

    /// Returns the rule-based checker launcher path.
    pub fn expaca_script(&self) -> &PathBuf {
        &self.expaca_script
    }

    /// Returns the XSLT processor command.
    pub fn xslt_command(&self) -> &PathBuf {
        &self.xslt_command
    }

    /// Returns the helper script deadline.
    pub fn script_timeout(&self) -> Duration {
        self.script_timeout
    }

    /// Returns the sandbox deadline.
    pub fn sandbox_timeout(&self) -> Duration {
        self.sandbox_timeout
    }

    /// Returns the delay of the debug `timeout` action.
    pub fn debug_sleep(&self) -> Duration {
        self.debug_sleep
    }
}
