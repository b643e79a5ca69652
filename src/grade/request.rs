#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! JSON forms of submissions and test cases, as accepted by the CLI.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::case::{Predicate, TestCase};
use crate::{
    harness::CodeSubmission,
    python::{Value, ValueKind},
};

/// Serialisable predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateSpec {
    /// `== value`.
    Equals(Json),
    /// A list of exactly this many elements.
    ListLen(usize),
    /// `len(...) == n`.
    Len(usize),
    /// Value of this shape.
    Kind(ValueKind),
    /// Non-empty container or string.
    NonEmpty,
    /// Truthy value.
    Truthy,
    /// Only existence matters.
    Exists,
}

impl From<PredicateSpec> for Predicate {
    fn from(spec: PredicateSpec) -> Self {
        match spec {
            PredicateSpec::Equals(json) => Predicate::equals(json_to_value(&json)),
            PredicateSpec::ListLen(n) => Predicate::is_list_of_len(n),
            PredicateSpec::Len(n) => Predicate::has_len(n),
            PredicateSpec::Kind(kind) => Predicate::is_kind(kind),
            PredicateSpec::NonEmpty => Predicate::non_empty(),
            PredicateSpec::Truthy => Predicate::truthy(),
            PredicateSpec::Exists => Predicate::exists(),
        }
    }
}

/// One call of a function case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSpec {
    /// Positional arguments.
    #[serde(default)]
    pub args:     Vec<Json>,
    /// Expected return value.
    pub expected: Json,
}

/// Serialisable test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestCaseSpec {
    /// See [`TestCase::OutputEquals`].
    OutputEquals {
        /// Expected output.
        expected: String,
    },
    /// See [`TestCase::VariableEquals`].
    VariableEquals {
        /// Variable name.
        name:      String,
        /// Test applied to its value.
        predicate: PredicateSpec,
    },
    /// See [`TestCase::FunctionBehavior`].
    FunctionBehavior {
        /// Function name.
        name:  String,
        /// Calls and their expected returns.
        cases: Vec<CallSpec>,
    },
    /// See [`TestCase::ListContentEquals`].
    ListContentEquals {
        /// Variable name.
        name:     String,
        /// Expected numbers.
        expected: Vec<f64>,
    },
}

impl From<TestCaseSpec> for TestCase {
    fn from(spec: TestCaseSpec) -> Self {
        match spec {
            TestCaseSpec::OutputEquals { expected } => TestCase::output_equals(expected),
            TestCaseSpec::VariableEquals { name, predicate } => {
                TestCase::variable_equals(name, predicate.into())
            }
            TestCaseSpec::FunctionBehavior { name, cases } => TestCase::function_behavior(
                name,
                cases.iter().map(|call| {
                    (
                        call.args.iter().map(json_to_value).collect(),
                        json_to_value(&call.expected),
                    )
                }),
            ),
            TestCaseSpec::ListContentEquals { name, expected } => {
                TestCase::list_content_equals(name, expected)
            }
        }
    }
}

/// Converts plain JSON into a Python value.
///
/// Arrays become lists and objects become string-keyed dicts. An object with
/// the single key `$tuple` or `$set` holding an array becomes a tuple or set.
pub fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::None,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        Json::Object(map) => {
            if map.len() == 1
                && let Some((key, Json::Array(items))) = map.iter().next()
            {
                let items = items.iter().map(json_to_value).collect();
                match key.as_str() {
                    "$tuple" => return Value::Tuple(items),
                    "$set" => return Value::Set(items),
                    _ => {}
                }
            }
            Value::Dict(
                map.iter()
                    .map(|(k, v)| (Value::Str(k.clone()), json_to_value(v)))
                    .collect(),
            )
        }
    }
}

/// One submission plus the checks it must pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    /// Source text.
    pub source:     String,
    /// Canned standard input.
    #[serde(default)]
    pub stdin:      Option<String>,
    /// Checks, in order.
    #[serde(default)]
    pub test_cases: Vec<TestCaseSpec>,
}

impl GradeRequest {
    /// Splits the request into a submission and its test cases.
    pub fn into_parts(self) -> (CodeSubmission, Vec<TestCase>) {
        let mut submission = CodeSubmission::new(self.source);
        if let Some(stdin) = self.stdin {
            submission = submission.with_stdin(stdin);
        }
        (submission, self.test_cases.into_iter().map(Into::into).collect())
    }
}

/// A named submission inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedSubmission {
    /// Student name used on the roster.
    pub name:   String,
    /// Source text.
    pub source: String,
    /// Canned standard input.
    #[serde(default)]
    pub stdin:  Option<String>,
}

impl NamedSubmission {
    /// The submission without its name.
    pub fn submission(&self) -> CodeSubmission {
        let submission = CodeSubmission::new(self.source.clone());
        match &self.stdin {
            Some(stdin) => submission.with_stdin(stdin.clone()),
            None => submission,
        }
    }
}

/// Several submissions graded against the same checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Checks shared by every submission.
    #[serde(default)]
    pub test_cases:  Vec<TestCaseSpec>,
    /// Submissions, graded in order.
    pub submissions: Vec<NamedSubmission>,
}

impl BatchRequest {
    /// The shared checks as test cases.
    pub fn cases(&self) -> Vec<TestCase> {
        self.test_cases.iter().cloned().map(Into::into).collect()
    }
}
