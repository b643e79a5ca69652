#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! JSON messages exchanged with the embedded driver script.

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::value::{CallOutcome, Value};

/// A function invocation to perform after the submission ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeCall {
    /// Top-level name of the callable.
    pub name:     String,
    /// Positional arguments.
    pub args:     Vec<Value>,
    /// Return value the caller will accept. The driver stops making calls
    /// after the first one that raises or returns anything else.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
}

impl ProbeCall {
    /// Creates a probe call.
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
            expected: None,
        }
    }

    /// Attaches the return value the call has to produce.
    pub fn expecting(mut self, expected: Value) -> Self {
        self.expected = Some(expected);
        self
    }
}

/// Limits the driver enforces on itself.
#[derive(Debug, Clone, Serialize)]
pub struct DriverLimits {
    /// `RLIMIT_AS` in bytes.
    pub memory_bytes: Option<u64>,
    /// `RLIMIT_CPU` in seconds.
    pub cpu_secs:     u64,
    /// Nesting depth rendered into values.
    pub max_depth:    usize,
    /// Container length rendered into values.
    pub max_len:      usize,
}

/// Everything the driver needs for one run; written to a file in the scratch
/// directory and deleted by the driver once read.
#[derive(Debug, Clone, Serialize)]
pub struct DriverRequest<'a> {
    /// Submitted source text.
    pub source:       &'a str,
    /// Token the driver echoes in its report, unknown to the submission.
    pub nonce:        &'a str,
    /// Absolute path the driver writes its report to.
    pub result_path:  PathBuf,
    /// Probe calls, in order.
    pub calls:        &'a [ProbeCall],
    /// Stop after compiling; nothing is executed.
    pub compile_only: bool,
    /// Self-imposed limits.
    pub limits:       DriverLimits,
}

/// A probe call as the driver reports it back.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeRecord {
    /// Name that was looked up.
    pub name:    String,
    /// Arguments echoed back.
    pub args:    Vec<Value>,
    /// What happened.
    pub outcome: CallOutcome,
}

/// The driver's verdict on a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DriverReport {
    /// Ran to completion.
    Success {
        /// Top-level bindings after the run.
        bindings: BTreeMap<String, Value>,
        /// Probe call results.
        #[serde(default)]
        calls:    Vec<ProbeRecord>,
    },
    /// `compile()` rejected the source.
    SyntaxError {
        /// `"<ErrorType>: <msg>"`.
        message: String,
        /// 1-based line, if Python reported one.
        line:    Option<usize>,
    },
    /// The code raised.
    RuntimeError {
        /// `"<ExceptionType>: <str(exc)>"`.
        message: String,
        /// Deepest submission line in the traceback.
        line:    Option<usize>,
    },
    /// The driver itself failed.
    HarnessError {
        /// Description of the failure.
        message: String,
    },
}

/// A report as written by the driver, carrying the request's nonce.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedReport {
    /// Echo of [`DriverRequest::nonce`].
    pub nonce:  String,
    /// The verdict itself.
    #[serde(flatten)]
    pub report: DriverReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_with_calls() {
        let raw = r#"{"status": "success",
            "bindings": {"add": {"type": "function", "value": {"name": "add"}}},
            "calls": [{"name": "add", "args": [{"type": "int", "value": 2}],
                       "outcome": {"raised": "TypeError: missing b"}}]}"#;
        let report: DriverReport = serde_json::from_str(raw).expect("parse");
        let DriverReport::Success { bindings, calls } = report else {
            panic!("expected success");
        };
        assert!(bindings.contains_key("add"));
        assert!(matches!(&calls[0].outcome, CallOutcome::Raised(msg) if msg.starts_with("TypeError")));
    }

    #[test]
    fn parses_syntax_error_without_line() {
        let raw = r#"{"status": "syntax_error", "message": "SyntaxError: null bytes", "line": null}"#;
        let report: DriverReport = serde_json::from_str(raw).expect("parse");
        assert!(matches!(report, DriverReport::SyntaxError { line: None, .. }));
    }

    #[test]
    fn signed_report_keeps_nonce_beside_status() {
        let raw = r#"{"nonce": "abc", "status": "runtime_error", "message": "ValueError: x", "line": 2}"#;
        let signed: SignedReport = serde_json::from_str(raw).expect("parse");
        assert_eq!(signed.nonce, "abc");
        assert!(matches!(signed.report, DriverReport::RuntimeError { line: Some(2), .. }));
    }

    #[test]
    fn expected_value_is_only_sent_when_set() {
        let plain = serde_json::to_value(ProbeCall::new("f", vec![])).expect("encode");
        assert!(plain.get("expected").is_none());

        let strict = serde_json::to_value(ProbeCall::new("f", vec![]).expecting(Value::Int(1)))
            .expect("encode");
        assert_eq!(strict["expected"]["type"], "int");
    }
}
