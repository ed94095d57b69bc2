#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Repository visibility and fork lineage checks against a GitLab API.

use std::{future::Future, path::Path, time::Duration};

use anyhow::{Context, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;
use serde::Deserialize;

use super::config::ActionConfig;
use crate::constants::GITSOURCE_PATH;

/// Characters escaped in a project path: everything but unreserved ones.
const PROJECT_ID: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Upper bound for one API request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Student-facing message when the check could not be carried out.
pub const REPOSITORY_CHECK_FAILED: &str =
    "Could not check the repository. Please contact course staff.";

/// Header carrying the API token.
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// Project this repository was forked from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ForkParent {
    /// `namespace/project` of the parent.
    pub path_with_namespace: String,
}

/// Fields of the project API response the check reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectInfo {
    /// Project is publicly readable.
    #[serde(default)]
    pub public:              bool,
    /// Browser URL of the project.
    #[serde(default)]
    pub web_url:             String,
    /// Parent project, when forked.
    #[serde(default)]
    pub forked_from_project: Option<ForkParent>,
}

/// Source of repository metadata.
pub trait RepositoryLookup: Send + Sync {
    /// Fetches the project `project_id` from `host` using `token`.
    fn project(
        &self,
        host: &str,
        project_id: &str,
        token: &str,
    ) -> impl Future<Output = Result<ProjectInfo>> + Send;
}

/// [`RepositoryLookup`] querying the GitLab v3 projects endpoint over HTTPS.
#[derive(Debug, Clone)]
pub struct GitlabClient {
    /// Shared HTTP client.
    client: Client,
}

impl GitlabClient {
    /// Creates a client with a bounded request timeout.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Could not build HTTP client")?;
        Ok(Self { client })
    }

    /// Wraps an existing HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Endpoint URL for `project_id` on `host`. The token travels in a header.
pub fn project_url(host: &str, project_id: &str) -> String {
    format!("https://{host}/api/v3/projects/{project_id}")
}

impl RepositoryLookup for GitlabClient {
    async fn project(&self, host: &str, project_id: &str, token: &str) -> Result<ProjectInfo> {
        let url = project_url(host, project_id);
        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Could not reach {host}"))?
            .error_for_status()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{host} refused project {project_id}"))?;
        response
            .json::<ProjectInfo>()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Could not parse project {project_id} from {host}"))
    }
}

/// Outcome of a repository check.
#[derive(Debug)]
pub enum RepositoryCheck {
    /// Repository satisfies the configured policy.
    Passed,
    /// Repository breaks the policy; the message explains how.
    Violation(String),
    /// The check could not be carried out. The error is for the log only.
    Failed(anyhow::Error),
}

impl RepositoryCheck {
    /// Message shown to the student, empty when the check passed.
    pub fn message(&self) -> String {
        match self {
            Self::Passed => String::new(),
            Self::Violation(msg) => msg.clone(),
            Self::Failed(_) => REPOSITORY_CHECK_FAILED.to_string(),
        }
    }
}

/// Project id encoded from the contents of `user/gitsource`: the part after
/// the first `:` of an SSH style remote.
pub fn project_id(gitsource: &str) -> Result<String> {
    let source = gitsource.trim();
    let (_, path) = source
        .split_once(':')
        .with_context(|| format!("Repository source `{source}` has no `:`"))?;
    Ok(utf8_percent_encode(path, PROJECT_ID).to_string())
}

/// Compares project metadata against the policy in `action`.
pub fn evaluate(info: &ProjectInfo, action: &ActionConfig) -> RepositoryCheck {
    let mut violation = None;
    if action.flag("private") && info.public {
        violation = Some(format!(
            "{} has public access in settings! Remove it to grade exercises.",
            info.web_url
        ));
    }
    if let Some(forks) = action.str_param("forks") {
        let parent = info
            .forked_from_project
            .as_ref()
            .map(|p| p.path_with_namespace.as_str());
        if parent != Some(forks) {
            violation = Some(format!("{} is not forked from {forks}.", info.web_url));
        }
    }
    violation.map_or(RepositoryCheck::Passed, RepositoryCheck::Violation)
}

/// Reads the submitted repository source and checks it against `action`.
///
/// Never fails: every error is reported as [`RepositoryCheck::Failed`].
pub async fn check_repository<L: RepositoryLookup>(
    lookup: &L,
    host: &str,
    token: &str,
    action: &ActionConfig,
    submission_dir: &Path,
) -> RepositoryCheck {
    let path = submission_dir.join(GITSOURCE_PATH);
    let source = match tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Could not read {}", path.display()))
    {
        Ok(source) => source,
        Err(e) => return RepositoryCheck::Failed(e),
    };
    let rid = match project_id(&source) {
        Ok(rid) => rid,
        Err(e) => return RepositoryCheck::Failed(e),
    };
    match lookup.project(host, &rid, token).await {
        Ok(info) => evaluate(&info, action),
        Err(e) => RepositoryCheck::Failed(e),
    }
}
