#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # pygrade
//! ## Introduction
//!
//! Runs Python submissions in a throwaway interpreter and grades them against
//! checks described in JSON.
//!
//! ## Configuration
//!
//! Limits are read from `PYGRADE_*` environment variables (a `.env` file in
//! the working directory is honoured). `PYGRADE_LOG` sets the log level.

use std::process::ExitCode;

use anyhow::{Context, Result};
use bpaf::*;
use dotenvy::dotenv;
use pygrade::{
    CodeSubmission, Executor, Harness, Roster, config,
    grade::{BatchRequest, GradeRequest},
    python::util::python_version,
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Run a file
    Run {
        /// File fed to standard input
        stdin: Option<String>,
        /// Python file
        file:  String,
    },
    /// Check a file for syntax errors
    Check(String),
    /// Grade a submission described by a request file
    Grade {
        /// Print the report as JSON
        json:    bool,
        /// Request file
        request: String,
    },
    /// Grade many submissions against the same checks
    Batch(String),
    /// Print the configuration in effect
    Info,
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses file name
    fn f() -> impl Parser<String> {
        positional("FILENAME").help("Name of python file")
    }

    let stdin = long("stdin")
        .help("File whose contents are fed to standard input")
        .argument::<String>("PATH")
        .optional();
    let file = f();
    let run = construct!(Cmd::Run { stdin, file })
        .to_options()
        .command("run")
        .help("Run a python file and print its output");

    let check = construct!(Cmd::Check(f()))
        .to_options()
        .command("check")
        .help("Check for syntax errors");

    let json = long("json").help("Print the report as JSON").switch();
    let request = positional::<String>("REQUEST").help("JSON file with source and test cases");
    let grade = construct!(Cmd::Grade { json, request })
        .to_options()
        .command("grade")
        .help("Grade a submission");

    let batch_file =
        positional::<String>("BATCH").help("JSON file with test cases and named submissions");
    let batch = construct!(Cmd::Batch(batch_file))
        .to_options()
        .command("batch")
        .help("Grade several submissions and print a roster");

    let info = pure(Cmd::Info)
        .to_options()
        .command("info")
        .help("Prints a JSON description of the harness configuration");

    let cmd = construct!([run, check, grade, batch, info]);

    cmd.to_options()
        .descr("Grading harness for Python submissions")
        .run()
}

/// Reads a whole file, naming it on failure.
async fn read(path: &str) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Could not read {path}"))
}

/// Log level from `PYGRADE_LOG`, `info` when unset or unrecognised.
fn log_level() -> Level {
    std::env::var("PYGRADE_LOG")
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(Level::INFO)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
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

    let cmd = options();

    let code = match cmd {
        Cmd::Run { stdin, file } => {
            let submission = CodeSubmission::new(read(&file).await?);
            let stdin = match stdin {
                Some(path) => read(&path).await?,
                None => String::new(),
            };
            let result = Executor::from_env()?.execute(&submission, &stdin).await;
            match result.stdout() {
                Some(out) => {
                    print!("{out}");
                    ExitCode::SUCCESS
                }
                None => {
                    eprintln!("{result}");
                    ExitCode::FAILURE
                }
            }
        }
        Cmd::Check(file) => {
            let submission = CodeSubmission::new(read(&file).await?);
            let result = Executor::from_env()?.check(&submission).await;
            if result.is_success() {
                println!("No syntax errors.");
                ExitCode::SUCCESS
            } else {
                eprintln!("{result}");
                ExitCode::FAILURE
            }
        }
        Cmd::Grade { json, request } => {
            let parsed: GradeRequest = serde_json::from_str(&read(&request).await?)
                .with_context(|| format!("{request} is not a valid grade request"))?;
            let (submission, cases) = parsed.into_parts();
            let report = Harness::from_env()?.run(&submission, &cases).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.table());
            }
            if report.passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Cmd::Batch(path) => {
            let batch: BatchRequest = serde_json::from_str(&read(&path).await?)
                .with_context(|| format!("{path} is not a valid batch request"))?;
            let cases = batch.cases();
            let harness = Harness::from_env()?;
            let mut roster = Roster::new();

            for entry in &batch.submissions {
                let report = harness.run(&entry.submission(), &cases).await;
                println!("{}: {report}", entry.name);
                roster.record(&entry.name, &report);
            }
            println!("{}", roster.table());
            ExitCode::SUCCESS
        }
        Cmd::Info => {
            let cfg = config::ensure_initialized()?;
            let version = python_version(cfg.python())?;
            let info = serde_json::json!({
                "python_version": version,
                "config": &*cfg,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}
