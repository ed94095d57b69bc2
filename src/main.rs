#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # grader
//!
//! Operator command line for exercise grading: renders and grades question
//! forms, runs action pipelines against a submission directory, and exposes
//! the output protocol parsers for debugging grader scripts.
//!
//! Configuration comes from `GRADER_*` environment variables, optionally
//! loaded from a `.env` file. `GRADER_LOG` sets the log level.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use grader::{
    GraderConfig,
    actions::{ActionPipeline, Course, Exercise, PipelineResult},
    form::{FormBuilder, Submission},
    parsers::{find_point_lines, parse_diff_blocks, split_appendix},
};
use serde_json::{Value, json};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, object::Rows},
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Form subcommands.
#[derive(Debug, Clone)]
enum FormCmd {
    /// Render a fresh form
    Render(PathBuf),
    /// Grade a submission
    Grade(PathBuf, PathBuf),
}

/// Output parser subcommands.
#[derive(Debug, Clone)]
enum ParseCmd {
    /// Point lines
    Points(PathBuf),
    /// Appendix split
    Appendix(PathBuf),
    /// Diff blocks
    Diff(PathBuf),
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Form operations
    Form(FormCmd),
    /// Run the exercise's actions on a submission directory
    Actions {
        /// Exercise configuration file
        exercise: PathBuf,
        /// Submission directory
        dir:      PathBuf,
        /// Course key
        course:   String,
    },
    /// Parser operations
    Parse(ParseCmd),
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the exercise configuration path
    fn e() -> impl Parser<PathBuf> {
        positional("EXERCISE").help("Exercise configuration (JSON)")
    }

    /// parses a text file path
    fn f() -> impl Parser<PathBuf> {
        positional("FILE").help("File holding captured grader output")
    }

    let form_render = construct!(FormCmd::Render(e()))
        .to_options()
        .command("render")
        .help("Render a fresh form, drawing random fields where configured");

    let submission = positional::<PathBuf>("SUBMISSION").help("Submitted answers (JSON)");
    let form_grade = construct!(FormCmd::Grade(e(), submission))
        .to_options()
        .command("grade")
        .help("Grade a submission against the form it was rendered from");

    let form = construct!([form_render, form_grade])
        .to_options()
        .command("form")
        .help("Question form commands")
        .map(Cmd::Form);

    let course = long("course")
        .help("Course key passed to scripts and the sandbox")
        .argument::<String>("KEY")
        .fallback("default".to_string());
    let exercise = e();
    let dir = positional::<PathBuf>("DIR").help("Submission directory");
    let actions = construct!(Cmd::Actions {
        course,
        exercise,
        dir
    })
    .to_options()
    .command("actions")
    .help("Run the exercise's grading actions");

    let parse_points = construct!(ParseCmd::Points(f()))
        .to_options()
        .command("points")
        .help("Extract TotalPoints/MaxPoints lines");

    let parse_appendix = construct!(ParseCmd::Appendix(f()))
        .to_options()
        .command("appendix")
        .help("Split output at the appendix delimiter");

    let parse_diff = construct!(ParseCmd::Diff(f()))
        .to_options()
        .command("diff")
        .help("Segment output into test case diff blocks");

    let parse = construct!([parse_points, parse_appendix, parse_diff])
        .to_options()
        .command("parse")
        .help("Run an output parser on a file")
        .map(Cmd::Parse);

    let cmd = construct!([form, actions, parse]);

    cmd.to_options()
        .descr("Exercise grader: forms and action pipelines")
        .run()
}

/// Reads and decodes a JSON file.
fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Reads an exercise configuration.
fn read_exercise(path: &Path) -> Result<Exercise> {
    Exercise::from_value(&read_json(path)?)
        .with_context(|| format!("Invalid exercise configuration in {}", path.display()))
}

/// One row of the pipeline summary table.
#[derive(Tabled)]
struct StepRow {
    /// Position in the pipeline
    #[tabled(rename = "#")]
    index:  usize,
    /// Action kind
    #[tabled(rename = "Action")]
    action: String,
    /// Points awarded out of available
    #[tabled(rename = "Points")]
    points: String,
    /// Whether it halted the pipeline
    #[tabled(rename = "Status")]
    status: String,
}

/// Prints a summary table of a pipeline run to stderr.
fn show_summary(result: &PipelineResult) {
    let rows: Vec<StepRow> = result
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| StepRow {
            index:  i + 1,
            action: step.kind.to_string(),
            points: format!("{}/{}", step.result.points, step.result.max_points),
            status: if step.result.stop {
                "stopped".red().to_string()
            } else {
                "ok".green().to_string()
            },
        })
        .collect();

    eprintln!(
        "{}",
        Table::new(&rows)
            .with(Panel::header("Grading Actions"))
            .with(Panel::footer(format!(
                "Total: {}/{}",
                result.points, result.max_points
            )))
            .with(
                Modify::new(Rows::first())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(
                Modify::new(Rows::last())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(Style::modern())
    );
}

/// Log level from `GRADER_LOG`, INFO when unset or unrecognized.
fn log_level() -> Level {
    std::env::var("GRADER_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(Level::INFO)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let filter_layer = LevelFilter::from_level(log_level());
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let config = GraderConfig::from_env();
    let cmd = options();

    match cmd {
        Cmd::Form(form_cmd) => match form_cmd {
            FormCmd::Render(path) => {
                let exercise = read_exercise(&path)?;
                let schema = exercise.schema()?;
                let secret = config.secret_for(exercise.secret.as_deref());
                let form = FormBuilder::builder()
                    .schema(&schema)
                    .secret(&secret)
                    .maybe_include_dir(config.include_dir().cloned())
                    .build()
                    .render(&mut rand::rng())?;
                println!("{}", serde_json::to_string_pretty(&form)?);
            }
            FormCmd::Grade(path, submission_path) => {
                let exercise = read_exercise(&path)?;
                let schema = exercise.schema()?;
                let secret = config.secret_for(exercise.secret.as_deref());
                let submission: Submission = serde_json::from_value(read_json(&submission_path)?)
                    .context("Submission must map field names to strings or lists")?;

                let mut form = FormBuilder::builder()
                    .schema(&schema)
                    .secret(&secret)
                    .maybe_include_dir(config.include_dir().cloned())
                    .build()
                    .from_submission(&submission)?;

                let missing = form.validate(&submission);
                if !missing.is_empty() {
                    println!("{}", serde_json::to_string_pretty(&json!({ "missing": missing }))?);
                    return Ok(());
                }

                let result = form.grade(&schema, &submission)?;
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "result": result, "form": form }))?
                );
            }
        },
        Cmd::Actions {
            exercise,
            dir,
            course,
        } => {
            let exercise = read_exercise(&exercise)?;
            let course = Course { key: course };
            let pipeline = ActionPipeline::from_config(&config)?;
            let result = pipeline.run_exercise(&course, &exercise, &dir).await?;
            show_summary(&result);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Cmd::Parse(parse_cmd) => match parse_cmd {
            ParseCmd::Points(path) => {
                let parsed = find_point_lines(&read_text(&path)?);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "points": parsed.points,
                        "max_points": parsed.max_points,
                        "out": parsed.out,
                    }))?
                );
            }
            ParseCmd::Appendix(path) => {
                let (out, appendix) = split_appendix(&read_text(&path)?);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "out": out, "appendix": appendix }))?
                );
            }
            ParseCmd::Diff(path) => {
                for block in parse_diff_blocks(&read_text(&path)?) {
                    let marker = if block.fail { "FAIL".red() } else { "PASS".green() };
                    println!("{marker} {}", block.description);
                    if block.fail {
                        print!("{}", block.unified_diff());
                    }
                }
            }
        },
    };

    Ok(())
}

/// Reads a text file.
fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))
}
