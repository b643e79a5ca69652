#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Per-student tally of graded submissions.
//!
//! A [`Roster`] is an ordinary value owned by whoever is grading; nothing in
//! the crate keeps one globally.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crate::grade::GradeReport;

#[derive(Tabled, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
/// One student's record
pub struct RosterEntry {
    #[tabled(rename = "Student")]
    /// * `name`: student name
    pub name:     String,
    #[tabled(rename = "Passed")]
    /// * `score`: number of passing submissions
    pub score:    u32,
    #[tabled(rename = "Attempts")]
    /// * `attempts`: number of graded submissions
    pub attempts: u32,
}

/// Scores keyed by student name.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Roster {
    /// Entries in name order.
    entries: BTreeMap<String, RosterEntry>,
}

impl Roster {
    /// An empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one graded submission for `name` and returns the updated entry.
    pub fn record(&mut self, name: &str, report: &GradeReport) -> &RosterEntry {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| RosterEntry {
                name: name.to_string(),
                ..RosterEntry::default()
            });
        entry.attempts += 1;
        if report.passed {
            entry.score += 1;
        }
        entry
    }

    /// Looks up a student.
    pub fn get(&self, name: &str) -> Option<&RosterEntry> {
        self.entries.get(name)
    }

    /// Forgets everyone.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Number of students.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody has been graded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.values()
    }

    /// Renders the roster as a table.
    pub fn table(&self) -> String {
        Table::new(self.iter())
            .with(Style::modern())
            .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
            .to_string()
    }
}
