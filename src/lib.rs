//! # pygrade
//!
//! Runs untrusted Python submissions in a throwaway interpreter and grades
//! them against declarative checks.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Harness limits and interpreter settings
pub mod config;
/// For all things related to grading
pub mod grade;
/// Running submissions and classifying the outcome
pub mod harness;
/// Subprocess plumbing with deadlines and output caps
pub mod process;
/// Python interpreter integration
pub mod python;
/// Per-student score tally
pub mod roster;

pub use config::HarnessConfig;
pub use grade::{GradeReport, Predicate, TestCase, grade};
pub use harness::{CodeSubmission, ExecutionResult, Executor, Harness, RuntimeErrorKind};
pub use python::{Value, ValueKind};
pub use roster::{Roster, RosterEntry};
