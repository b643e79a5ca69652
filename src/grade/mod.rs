#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turns an [`ExecutionResult`] and an ordered list of [`TestCase`]s into a
//! single pass/fail [`GradeReport`].

/// Test case definitions and evaluation.
pub mod case;
/// Line diffs for output mismatches.
pub mod diff;
/// Grading verdicts.
pub mod report;
/// JSON request formats.
pub mod request;

pub use case::{CaseFailure, Predicate, TestCase};
pub use report::GradeReport;
pub use request::{BatchRequest, GradeRequest, NamedSubmission, PredicateSpec, TestCaseSpec};

use std::collections::HashMap;

use crate::harness::ExecutionResult;

/// Grades a finished run.
///
/// A run that did not succeed fails immediately with its error as the message
/// and no output. Otherwise cases are checked in order and the first one that
/// does not hold decides the verdict; later cases are not looked at.
///
/// Function cases read the calls recorded for their function in order, so
/// two cases on the same function see consecutive calls, as laid out by
/// [`TestCase::probe_calls`].
pub fn grade(result: &ExecutionResult, cases: &[TestCase]) -> GradeReport {
    let ExecutionResult::Success { stdout, bindings } = result else {
        return GradeReport::fail(result.to_string(), "");
    };

    if cases.is_empty() {
        return GradeReport::pass("Ran successfully; no checks supplied", stdout.as_str());
    }

    let mut calls_used: HashMap<&str, usize> = HashMap::new();
    for (idx, case) in cases.iter().enumerate() {
        let first_call = match case.function_calls() {
            Some((name, count)) => {
                let used = calls_used.entry(name).or_default();
                let first = *used;
                *used += count;
                first
            }
            None => 0,
        };

        if let Err(failure) = case.evaluate_from(stdout, bindings, first_call) {
            tracing::debug!("case {} ({}) failed", idx + 1, case.label());
            return GradeReport::fail(
                format!("Case {} ({}) failed: {failure}", idx + 1, case.label()),
                stdout.as_str(),
            );
        }
    }

    GradeReport::pass(format!("All {} checks passed", cases.len()), stdout.as_str())
}
