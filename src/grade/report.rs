#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{
    Table, Tabled,
    settings::{Modify, Style, Width, object::Columns},
};

#[derive(Tabled, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
/// The verdict of one grading pass
pub struct GradeReport {
    #[tabled(rename = "Passed")]
    /// * `passed`: whether every check held
    pub passed:     bool,
    #[tabled(rename = "Message")]
    /// * `message`: why it failed, or a short success note
    pub message:    String,
    #[tabled(rename = "Output")]
    /// * `raw_output`: captured stdout, empty when the run failed
    pub raw_output: String,
}

impl GradeReport {
    /// A passing report.
    pub fn pass(message: impl Into<String>, raw_output: impl Into<String>) -> Self {
        Self {
            passed:     true,
            message:    message.into(),
            raw_output: raw_output.into(),
        }
    }

    /// A failing report.
    pub fn fail(message: impl Into<String>, raw_output: impl Into<String>) -> Self {
        Self {
            passed:     false,
            message:    message.into(),
            raw_output: raw_output.into(),
        }
    }

    /// Renders the report as a boxed table, wrapping long columns.
    pub fn table(&self) -> String {
        Table::new([self])
            .with(Style::modern())
            .with(Modify::new(Columns::new(1..)).with(Width::wrap(60)))
            .to_string()
    }
}

impl Display for GradeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verdict = if self.passed {
            "PASSED".green().bold()
        } else {
            "FAILED".red().bold()
        };
        write!(f, "{verdict}: {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_headers() {
        let table = GradeReport::pass("All 1 checks passed", "4\n").table();
        assert!(table.contains("Passed"));
        assert!(table.contains("Message"));
        assert!(table.contains("true"));
    }

    #[test]
    fn display_shows_verdict() {
        colored::control::set_override(false);
        assert_eq!(GradeReport::fail("nope", "").to_string(), "FAILED: nope");
    }
}
