use std::{
    collections::HashMap,
    path::Path,
    sync::Mutex,
    time::Duration,
};

use grader::{
    GraderConfig, GraderError,
    actions::{
        ActionConfig, ActionKind, ActionPipeline, Course, Exercise, ProjectInfo,
        GitlabClient, RepositoryCheck, RepositoryLookup,
        gitlab::{ForkParent, REPOSITORY_CHECK_FAILED, check_repository, project_url},
    },
    process::{Invocation, Invoker},
};
use serde_json::json;

/// Answers invocations from a table and records every call.
#[derive(Default)]
struct FakeInvoker {
    responses: HashMap<String, Invocation>,
    calls:     Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeInvoker {
    fn respond(mut self, key: &str, invocation: Invocation) -> Self {
        self.responses.insert(key.to_string(), invocation);
        self
    }

    fn answer(&self, key: String, args: Vec<String>) -> anyhow::Result<Invocation> {
        self.calls.lock().unwrap().push((key.clone(), args));
        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no response for {key}"))
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
    }

    fn args_of(&self, key: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, a)| a.clone())
            .unwrap_or_default()
    }
}

impl Invoker for FakeInvoker {
    async fn invoke(&self, program: &Path, args: &[String], _workdir: &Path) -> anyhow::Result<Invocation> {
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.answer(name, args.to_vec())
    }

    async fn invoke_sandbox(
        &self,
        course_key: &str,
        action: &ActionConfig,
        _workdir: &Path,
    ) -> anyhow::Result<Invocation> {
        let key = format!("sandbox {}", action.command().join(" "));
        self.answer(key, vec![course_key.to_string()])
    }
}

/// Serves one project and records the ids it was asked for.
#[derive(Default)]
struct FakeLookup {
    project: Option<ProjectInfo>,
    asked:   Mutex<Vec<String>>,
}

impl RepositoryLookup for FakeLookup {
    async fn project(&self, _host: &str, project_id: &str, _token: &str) -> anyhow::Result<ProjectInfo> {
        self.asked.lock().unwrap().push(project_id.to_string());
        self.project
            .clone()
            .ok_or_else(|| anyhow::anyhow!("project {project_id} not found"))
    }
}

fn sandbox(cmd: &str) -> ActionConfig {
    ActionConfig::new(ActionKind::Sandbox).with("cmd", json!([cmd]))
}

fn config() -> GraderConfig {
    GraderConfig::builder()
        .base_dir("/course")
        .debug_sleep(Duration::ZERO)
        .build()
}

fn course() -> Course {
    Course { key: "c1".to_string() }
}

#[tokio::test]
async fn stopping_action_halts_the_pipeline() {
    let config = config();
    let invoker = FakeInvoker::default()
        .respond("sandbox a", Invocation::new(1, "TotalPoints: 3", "failed"))
        .respond("sandbox b", Invocation::new(0, "TotalPoints: 5", ""));
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(invoker)
        .lookup(FakeLookup::default())
        .build();

    let dir = tempfile::tempdir().unwrap();
    let result = pipeline
        .run(&course(), &Exercise::default(), &[sandbox("a"), sandbox("b")], dir.path())
        .await
        .unwrap();

    assert_eq!(result.points, 3);
    assert!(result.stopped);
    assert_eq!(result.executed(), 1);
    assert_eq!(result.err, "failed");
}

#[tokio::test]
async fn results_merge_across_actions() {
    let config = config();
    let invoker = FakeInvoker::default()
        .respond("sandbox a", Invocation::new(0, "TotalPoints: 2\nMaxPoints: 4\nnice", ""))
        .respond("gitclone.sh", Invocation::new(0, "cloned\n***APPENDIX***\nlog", ""))
        .respond("sandbox b", Invocation::new(0, "TotalPoints: 1\nMaxPoints: 1", "warn"));
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(invoker)
        .lookup(FakeLookup::default())
        .build();

    let actions = [
        sandbox("a"),
        ActionConfig::new(ActionKind::Gitclone).with("repo_dir", "repo"),
        sandbox("b"),
    ];
    let dir = tempfile::tempdir().unwrap();
    let result = pipeline
        .run(&course(), &Exercise::default(), &actions, dir.path())
        .await
        .unwrap();

    assert_eq!((result.points, result.max_points), (3, 5));
    assert_eq!(result.out, "nice\ncloned");
    assert_eq!(result.appendix, "log");
    assert_eq!(result.err, "warn");
    assert!(!result.stopped);
    assert_eq!(result.executed(), 3);
}

#[tokio::test]
async fn prepare_passes_named_arguments_then_the_directory() {
    let config = config();
    let invoker = FakeInvoker::default().respond("prepare.sh", Invocation::new(0, "", ""));
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(invoker)
        .lookup(FakeLookup::default())
        .build();

    let action = ActionConfig::new(ActionKind::Prepare)
        .with("unzip", true)
        .with("cp", json!(["a.py", "b.py"]))
        .with("ignored", "x");
    let dir = tempfile::tempdir().unwrap();
    let result = pipeline
        .run(&course(), &Exercise::default(), &[action], dir.path())
        .await
        .unwrap();
    assert!(!result.stopped);

    let args = pipeline_args(&pipeline, "prepare.sh");
    assert_eq!(
        args,
        [
            "--course_key".to_string(),
            "c1".to_string(),
            "--unzip".to_string(),
            "true".to_string(),
            "--cp".to_string(),
            "a.py b.py".to_string(),
            dir.path().display().to_string(),
        ]
    );
}

fn pipeline_args(pipeline: &ActionPipeline<'_, FakeInvoker, FakeLookup>, key: &str) -> Vec<String> {
    pipeline.invoker().args_of(key)
}

#[tokio::test]
async fn failed_prepare_stops_before_the_sandbox() {
    let config = config();
    let invoker = FakeInvoker::default()
        .respond("prepare.sh", Invocation::new(2, "", "unzip failed"))
        .respond("sandbox a", Invocation::new(0, "TotalPoints: 5", ""));
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(invoker)
        .lookup(FakeLookup::default())
        .build();

    let dir = tempfile::tempdir().unwrap();
    let result = pipeline
        .run(
            &course(),
            &Exercise::default(),
            &[ActionConfig::new(ActionKind::Prepare), sandbox("a")],
            dir.path(),
        )
        .await
        .unwrap();

    assert_eq!(result.points, 0);
    assert_eq!(pipeline.invoker().calls(), ["prepare.sh"]);
}

#[tokio::test]
async fn python_tests_report_stderr_as_feedback() {
    let config = config();
    let invoker = FakeInvoker::default().respond(
        "sandbox pytest",
        Invocation::new(0, "TotalPoints: 2\nMaxPoints: 2\nnoise", "2 passed"),
    );
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(invoker)
        .lookup(FakeLookup::default())
        .build();

    let action = ActionConfig::new(ActionKind::SandboxPythonTest).with("cmd", "pytest");
    let dir = tempfile::tempdir().unwrap();
    let result = pipeline
        .run(&course(), &Exercise::default(), &[action], dir.path())
        .await
        .unwrap();

    let step = &result.steps[0].result;
    assert_eq!(step.points, 2);
    assert_eq!(step.out, "2 passed");
    assert_eq!(step.err, "");
}

#[tokio::test]
async fn diffbox_segments_output_into_tests() {
    let config = config();
    let invoker = FakeInvoker::default().respond(
        "sandbox run",
        Invocation::new(
            0,
            "TotalPoints: 1\nTestcase: t1\nExpected: x\nActual: x\nTestcase: t2\nExpected: y\nActual: z",
            "",
        ),
    );
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(invoker)
        .lookup(FakeLookup::default())
        .build();

    let action = ActionConfig::from_value(&json!({ "type": "grader.actions.johoh", "cmd": ["run"] })).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let result = pipeline
        .run(&course(), &Exercise::default(), &[action], dir.path())
        .await
        .unwrap();

    assert!(result.html);
    let tests = result.steps[0].result.tests.clone().unwrap();
    assert_eq!(tests.len(), 2);
    assert!(!tests[0].fail && tests[1].fail);
    assert_eq!(result.points, 1);
}

#[tokio::test]
async fn expaca_reads_xml_totals_and_transforms_output() {
    let config = config();
    let invoker = FakeInvoker::default()
        .respond(
            "expaca.sh",
            Invocation::new(0, "<r><TotalPoints>6</TotalPoints><TotalMaxpoints>9</TotalMaxpoints></r>", ""),
        )
        .respond("xsltproc", Invocation::new(0, "<p>6 of 9</p>", ""));
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(invoker)
        .lookup(FakeLookup::default())
        .build();

    let action = ActionConfig::new(ActionKind::Expaca)
        .with("rule_file", "rules.xml")
        .with("xslt_transform", "style.xsl");
    let dir = tempfile::tempdir().unwrap();
    let result = pipeline
        .run(&course(), &Exercise::default(), &[action], dir.path())
        .await
        .unwrap();

    assert_eq!((result.points, result.max_points), (6, 9));
    assert_eq!(result.out, "<p>6 of 9</p>");
    assert!(!result.stopped);
    let xslt_args = pipeline_args(&pipeline, "xsltproc");
    assert_eq!(xslt_args[0], "/course/style.xsl");
}

#[tokio::test]
async fn expaca_nonzero_exit_is_fatal() {
    let config = config();
    let invoker = FakeInvoker::default().respond("expaca.sh", Invocation::new(3, "", "crash"));
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(invoker)
        .lookup(FakeLookup::default())
        .build();

    let dir = tempfile::tempdir().unwrap();
    let err = pipeline
        .run(&course(), &Exercise::default(), &[ActionConfig::new(ActionKind::Expaca)], dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, GraderError::HardExternal(_)));
    assert!(err.to_string().contains("Expaca return code not zero!"));
}

#[tokio::test]
async fn invoker_failures_are_contained() {
    let config = config();
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(FakeInvoker::default())
        .lookup(FakeLookup::default())
        .build();

    let dir = tempfile::tempdir().unwrap();
    let result = pipeline
        .run(&course(), &Exercise::default(), &[sandbox("missing"), sandbox("b")], dir.path())
        .await
        .unwrap();

    assert!(result.stopped);
    assert_eq!((result.points, result.max_points), (0, 0));
    assert_eq!(result.executed(), 1);
}

#[tokio::test]
async fn timeout_action_reports_and_stops() {
    let config = config();
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(FakeInvoker::default())
        .lookup(FakeLookup::default())
        .build();

    let dir = tempfile::tempdir().unwrap();
    let result = pipeline
        .run(&course(), &Exercise::default(), &[ActionConfig::new(ActionKind::Timeout)], dir.path())
        .await
        .unwrap();

    assert_eq!(result.points, 10);
    assert!(result.stopped);
    assert_eq!(result.out, "Did not reach timeout, should not happen.");
}

fn gitlab_exercise() -> Exercise {
    Exercise {
        key: "repo".to_string(),
        require_gitlab: Some("gitlab.example.org".to_string()),
        ..Exercise::default()
    }
}

fn write_gitsource(dir: &Path, source: &str) {
    std::fs::create_dir_all(dir.join("user")).unwrap();
    std::fs::write(dir.join("user/gitsource"), source).unwrap();
}

#[tokio::test]
async fn gitlab_public_repository_violates_privacy() {
    let config = config();
    let lookup = FakeLookup {
        project: Some(ProjectInfo {
            public:              true,
            web_url:             "https://gitlab.example.org/student/proj".to_string(),
            forked_from_project: Some(ForkParent {
                path_with_namespace: "course/proj".to_string(),
            }),
        }),
        ..FakeLookup::default()
    };
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(FakeInvoker::default())
        .lookup(lookup)
        .build();

    let dir = tempfile::tempdir().unwrap();
    write_gitsource(dir.path(), "git@gitlab.example.org:student/proj.git\n");
    let action = ActionConfig::new(ActionKind::Gitlabquery)
        .with("token", "t0k")
        .with("private", true)
        .with("forks", "course/proj");
    let result = pipeline
        .run(&course(), &gitlab_exercise(), &[action], dir.path())
        .await
        .unwrap();

    assert!(result.stopped);
    assert_eq!(
        result.err,
        "https://gitlab.example.org/student/proj has public access in settings! Remove it to grade exercises."
    );
    assert_eq!(*pipeline.lookup().asked.lock().unwrap(), ["student%2Fproj.git"]);
}

#[tokio::test]
async fn gitlab_matching_fork_passes() {
    let config = config();
    let lookup = FakeLookup {
        project: Some(ProjectInfo {
            public:              false,
            web_url:             "https://gitlab.example.org/student/proj".to_string(),
            forked_from_project: Some(ForkParent {
                path_with_namespace: "course/proj".to_string(),
            }),
        }),
        ..FakeLookup::default()
    };
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(FakeInvoker::default())
        .lookup(lookup)
        .build();

    let dir = tempfile::tempdir().unwrap();
    write_gitsource(dir.path(), "git@gitlab.example.org:student/proj.git");
    let action = ActionConfig::new(ActionKind::Gitlabquery)
        .with("token", "t0k")
        .with("private", true)
        .with("forks", "course/proj");
    let result = pipeline
        .run(&course(), &gitlab_exercise(), &[action], dir.path())
        .await
        .unwrap();

    assert!(!result.stopped);
    assert_eq!(result.err, "");
}

#[tokio::test]
async fn gitlab_lookup_failure_stops_without_raising() {
    let config = config();
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(FakeInvoker::default())
        .lookup(FakeLookup::default())
        .build();

    let dir = tempfile::tempdir().unwrap();
    let action = ActionConfig::new(ActionKind::Gitlabquery).with("token", "t0k");
    let result = pipeline
        .run(&course(), &gitlab_exercise(), &[action], dir.path())
        .await
        .unwrap();

    assert!(result.stopped);
    assert_eq!(result.err, REPOSITORY_CHECK_FAILED);
}

/// Fails the way an HTTP client does, echoing the request in its error.
struct EchoingLookup;

impl RepositoryLookup for EchoingLookup {
    async fn project(&self, host: &str, project_id: &str, token: &str) -> anyhow::Result<ProjectInfo> {
        anyhow::bail!("error sending request for https://{host}/{project_id}?private_token={token}")
    }
}

#[tokio::test]
async fn gitlab_failures_never_show_the_token() {
    let config = config();
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(FakeInvoker::default())
        .lookup(EchoingLookup)
        .build();

    let dir = tempfile::tempdir().unwrap();
    write_gitsource(dir.path(), "git@gitlab.example.org:student/proj.git");
    let action = ActionConfig::new(ActionKind::Gitlabquery).with("token", "SECRET_TOKEN_XYZ");
    let result = pipeline
        .run(&course(), &gitlab_exercise(), &[action], dir.path())
        .await
        .unwrap();

    assert!(result.stopped);
    assert!(!result.err.contains("SECRET_TOKEN_XYZ"));
    assert!(!result.out.contains("SECRET_TOKEN_XYZ"));
}

#[tokio::test]
async fn unreachable_gitlab_keeps_the_token_out_of_errors() {
    let dir = tempfile::tempdir().unwrap();
    write_gitsource(dir.path(), "git@127.0.0.1:ns/proj.git");
    let action = ActionConfig::new(ActionKind::Gitlabquery).with("private", true);

    let check = check_repository(
        &GitlabClient::new().unwrap(),
        "127.0.0.1:1",
        "SECRET_TOKEN_XYZ",
        &action,
        dir.path(),
    )
    .await;

    assert!(!check.message().contains("SECRET_TOKEN_XYZ"));
    match check {
        RepositoryCheck::Failed(e) => {
            assert!(!format!("{e:#}").contains("SECRET_TOKEN_XYZ"));
        }
        other => panic!("expected a failed check, got {other:?}"),
    }
}

#[test]
fn project_urls_carry_no_token() {
    assert_eq!(
        project_url("gitlab.example.org", "ns%2Fproj.git"),
        "https://gitlab.example.org/api/v3/projects/ns%2Fproj.git"
    );
}

#[tokio::test]
async fn gitlab_without_configuration_is_a_configuration_error() {
    let config = config();
    let pipeline = ActionPipeline::builder()
        .config(&config)
        .invoker(FakeInvoker::default())
        .lookup(FakeLookup::default())
        .build();

    let dir = tempfile::tempdir().unwrap();
    let no_host = pipeline
        .run(
            &course(),
            &Exercise::default(),
            &[ActionConfig::new(ActionKind::Gitlabquery).with("token", "t")],
            dir.path(),
        )
        .await;
    assert!(matches!(no_host, Err(GraderError::Configuration(_))));

    let no_token = pipeline
        .run(&course(), &gitlab_exercise(), &[ActionConfig::new(ActionKind::Gitlabquery)], dir.path())
        .await;
    assert!(matches!(no_token, Err(GraderError::Configuration(_))));
}

#[test]
fn action_types_accept_the_module_prefix() {
    let plain = ActionConfig::from_value(&json!({ "type": "sandbox" })).unwrap();
    let prefixed = ActionConfig::from_value(&json!({ "type": "grader.actions.sandbox" })).unwrap();
    assert_eq!(plain.kind(), ActionKind::Sandbox);
    assert_eq!(prefixed.kind(), ActionKind::Sandbox);

    let unknown = ActionConfig::from_value(&json!({ "type": "grader.actions.compile" }));
    assert!(matches!(unknown, Err(GraderError::Configuration(_))));
    let untyped = ActionConfig::from_value(&json!({ "cmd": ["x"] }));
    assert!(matches!(untyped, Err(GraderError::Configuration(_))));
}

#[test]
fn exercises_parse_their_action_lists() {
    let exercise = Exercise::from_value(&json!({
        "key": "ex1",
        "actions": [
            { "type": "grader.actions.prepare", "unzip": true },
            { "type": "grader.actions.sandbox", "cmd": ["python3", "test.py"], "time": 60 }
        ]
    }))
    .unwrap();

    assert_eq!(exercise.actions.len(), 2);
    assert_eq!(exercise.actions[1].command(), ["python3", "test.py"]);
    assert_eq!(exercise.actions[1].collect_args(&["net", "time"]), ["--time", "60"]);
}
