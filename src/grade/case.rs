#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Declarative checks against a finished run.

use std::{collections::BTreeMap, fmt, sync::Arc};

use itertools::Itertools;
use thiserror::Error;

use super::diff::format_diff;
use crate::python::{CallOutcome, ProbeCall, Value, ValueKind};

/// A described test on a single value.
#[derive(Clone)]
pub struct Predicate {
    /// Shown to the student when the test fails.
    description: String,
    /// The test itself.
    check:       Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Predicate {
    /// Wraps an arbitrary check.
    pub fn new(
        description: impl Into<String>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            check:       Arc::new(check),
        }
    }

    /// Applies the check.
    pub fn test(&self, value: &Value) -> bool {
        (self.check)(value)
    }

    /// What the check requires.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Value must equal `expected` under Python `==`.
    pub fn equals(expected: impl Into<Value>) -> Self {
        let expected = expected.into();
        Self::new(format!("== {expected}"), move |value| value.py_eq(&expected))
    }

    /// Value must be a `list` of exactly `len` elements.
    pub fn is_list_of_len(len: usize) -> Self {
        Self::new(format!("a list of {len} elements"), move |value| {
            matches!(value, Value::List(items) if items.len() == len)
        })
    }

    /// `len(value)` must be `len`.
    pub fn has_len(len: usize) -> Self {
        Self::new(format!("len(...) == {len}"), move |value| value.len() == Some(len))
    }

    /// Value must have the given shape.
    pub fn is_kind(kind: ValueKind) -> Self {
        Self::new(format!("of type {kind}"), move |value| value.kind() == kind)
    }

    /// Value must be a non-empty container or string.
    pub fn non_empty() -> Self {
        Self::new("non-empty", |value| value.len().is_some_and(|n| n > 0))
    }

    /// Value must be truthy.
    pub fn truthy() -> Self {
        Self::new("truthy", Value::is_truthy)
    }

    /// Any bound value passes; only existence is checked.
    pub fn exists() -> Self {
        Self::new("defined", |_| true)
    }
}

/// One rule a run must satisfy.
#[derive(Debug, Clone)]
pub enum TestCase {
    /// Trimmed stdout must equal the trimmed expectation.
    OutputEquals {
        /// Expected output.
        expected: String,
    },
    /// A top-level variable must exist and satisfy a predicate.
    VariableEquals {
        /// Variable name.
        name:      String,
        /// Test applied to its value.
        predicate: Predicate,
    },
    /// A top-level function must return the expected value for each input.
    FunctionBehavior {
        /// Function name.
        name:  String,
        /// `(args, expected return)` pairs, checked in order.
        cases: Vec<(Vec<Value>, Value)>,
    },
    /// A top-level list or tuple must hold exactly these numbers.
    ListContentEquals {
        /// Variable name.
        name:     String,
        /// Expected elements, in order.
        expected: Vec<f64>,
    },
}

impl TestCase {
    /// Builds an [`TestCase::OutputEquals`].
    pub fn output_equals(expected: impl Into<String>) -> Self {
        TestCase::OutputEquals {
            expected: expected.into(),
        }
    }

    /// Builds a [`TestCase::VariableEquals`].
    pub fn variable_equals(name: impl Into<String>, predicate: Predicate) -> Self {
        TestCase::VariableEquals {
            name: name.into(),
            predicate,
        }
    }

    /// Builds a [`TestCase::FunctionBehavior`].
    pub fn function_behavior<I>(name: impl Into<String>, cases: I) -> Self
    where
        I: IntoIterator<Item = (Vec<Value>, Value)>,
    {
        TestCase::FunctionBehavior {
            name:  name.into(),
            cases: cases.into_iter().collect(),
        }
    }

    /// Builds a [`TestCase::ListContentEquals`].
    pub fn list_content_equals<I, T>(name: impl Into<String>, expected: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<f64>,
    {
        TestCase::ListContentEquals {
            name:     name.into(),
            expected: expected.into_iter().map(Into::into).collect(),
        }
    }

    /// Short label used in report messages.
    pub fn label(&self) -> String {
        match self {
            TestCase::OutputEquals { .. } => "output".to_string(),
            TestCase::VariableEquals { name, .. } => format!("variable `{name}`"),
            TestCase::FunctionBehavior { name, .. } => format!("function `{name}`"),
            TestCase::ListContentEquals { name, .. } => format!("list `{name}`"),
        }
    }

    /// Calls that have to be made inside the run for this case to be
    /// checkable.
    pub fn probe_calls(&self) -> Vec<ProbeCall> {
        match self {
            TestCase::FunctionBehavior { name, cases } => cases
                .iter()
                .map(|(args, expected)| {
                    ProbeCall::new(name.clone(), args.clone()).expecting(expected.clone())
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Name of the function this case calls and how many calls it needs.
    pub fn function_calls(&self) -> Option<(&str, usize)> {
        match self {
            TestCase::FunctionBehavior { name, cases } => Some((name.as_str(), cases.len())),
            _ => None,
        }
    }

    /// Checks this case against a successful run's stdout and bindings,
    /// assuming it was the first case to call its function.
    pub fn evaluate(
        &self,
        stdout: &str,
        bindings: &BTreeMap<String, Value>,
    ) -> Result<(), CaseFailure> {
        self.evaluate_from(stdout, bindings, 0)
    }

    /// Like [`TestCase::evaluate`], with this case's calls starting at
    /// position `first_call` among the calls recorded for its function.
    pub fn evaluate_from(
        &self,
        stdout: &str,
        bindings: &BTreeMap<String, Value>,
        first_call: usize,
    ) -> Result<(), CaseFailure> {
        match self {
            TestCase::OutputEquals { expected } => {
                let (want, got) = (expected.trim(), stdout.trim());
                if want == got {
                    Ok(())
                } else {
                    Err(CaseFailure::OutputMismatch {
                        diff: format_diff(want, got),
                    })
                }
            }
            TestCase::VariableEquals { name, predicate } => {
                let value = bindings
                    .get(name)
                    .ok_or_else(|| CaseFailure::VariableNotFound(name.clone()))?;
                if predicate.test(value) {
                    Ok(())
                } else {
                    Err(CaseFailure::PredicateFailed {
                        name:      name.clone(),
                        value:     value.to_string(),
                        predicate: predicate.description().to_string(),
                    })
                }
            }
            TestCase::FunctionBehavior { name, cases } => {
                let func = match bindings.get(name) {
                    None => return Err(CaseFailure::FunctionNotFound(name.clone())),
                    Some(value) => value.as_function().ok_or_else(|| CaseFailure::NotCallable {
                        name:      name.clone(),
                        type_name: value.type_name(),
                    })?,
                };

                for (offset, (args, expected)) in cases.iter().enumerate() {
                    let call = format!("{name}({})", args.iter().join(", "));
                    match func.outcome_at(first_call + offset, args) {
                        None => return Err(CaseFailure::NotEvaluated(call)),
                        Some(CallOutcome::Raised(error)) => {
                            return Err(CaseFailure::FunctionError {
                                call,
                                error: error.clone(),
                            });
                        }
                        Some(CallOutcome::Returned(actual)) if !actual.py_eq(expected) => {
                            return Err(CaseFailure::WrongReturn {
                                call,
                                expected: expected.to_string(),
                                actual: actual.to_string(),
                            });
                        }
                        Some(CallOutcome::Returned(_)) => {}
                    }
                }
                Ok(())
            }
            TestCase::ListContentEquals { name, expected } => {
                let value = bindings
                    .get(name)
                    .ok_or_else(|| CaseFailure::VariableNotFound(name.clone()))?;
                let items = value.as_sequence().ok_or_else(|| CaseFailure::NotSequence {
                    name:      name.clone(),
                    type_name: value.type_name(),
                })?;

                if items.len() != expected.len() {
                    return Err(CaseFailure::LengthMismatch {
                        name:     name.clone(),
                        expected: expected.len(),
                        actual:   items.len(),
                    });
                }

                for (index, (item, want)) in items.iter().zip(expected).enumerate() {
                    if item.as_number() != Some(*want) {
                        return Err(CaseFailure::ElementMismatch {
                            name: name.clone(),
                            index,
                            expected: Value::Float(*want).to_string(),
                            actual: item.to_string(),
                        });
                    }
                }
                Ok(())
            }
        }
    }
}

/// Why a single case did not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaseFailure {
    /// Output differed after trimming.
    #[error("output does not match\n{diff}")]
    OutputMismatch {
        /// Line diff, `-` expected and `+` actual.
        diff: String,
    },
    /// No binding by that name.
    #[error("variable not found: `{0}`")]
    VariableNotFound(String),
    /// The predicate rejected the value.
    #[error("`{name}` is {value}, expected {predicate}")]
    PredicateFailed {
        /// Variable name.
        name:      String,
        /// Rendered value.
        value:     String,
        /// Predicate description.
        predicate: String,
    },
    /// No binding by that name.
    #[error("function not found: `{0}`")]
    FunctionNotFound(String),
    /// Bound, but not a callable.
    #[error("`{name}` is a {type_name}, not a function")]
    NotCallable {
        /// Binding name.
        name:      String,
        /// Its Python type.
        type_name: String,
    },
    /// The call was never performed.
    #[error("{0} was not evaluated")]
    NotEvaluated(String),
    /// The function raised.
    #[error("function error in {call}: {error}")]
    FunctionError {
        /// Rendered call.
        call:  String,
        /// `"<Type>: <msg>"`.
        error: String,
    },
    /// The function returned something else.
    #[error("{call} returned {actual}, expected {expected}")]
    WrongReturn {
        /// Rendered call.
        call:     String,
        /// Rendered expected value.
        expected: String,
        /// Rendered actual value.
        actual:   String,
    },
    /// Bound, but not a list or tuple.
    #[error("`{name}` is a {type_name}, not a list")]
    NotSequence {
        /// Binding name.
        name:      String,
        /// Its Python type.
        type_name: String,
    },
    /// Wrong number of elements.
    #[error("`{name}` has {actual} elements, expected {expected}")]
    LengthMismatch {
        /// Binding name.
        name:     String,
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual:   usize,
    },
    /// An element differed.
    #[error("`{name}[{index}]` is {actual}, expected {expected}")]
    ElementMismatch {
        /// Binding name.
        name:     String,
        /// Zero-based position.
        index:    usize,
        /// Rendered expected element.
        expected: String,
        /// Rendered actual element.
        actual:   String,
    },
}
