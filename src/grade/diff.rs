#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Line diffs for output mismatches.

use similar::{ChangeTag, TextDiff};

/// Formats a line diff between expected and actual output. Deleted lines are
/// what was expected, inserted lines what the program printed.
pub fn format_diff(expected: &str, actual: &str) -> String {
    let diff = TextDiff::from_lines(expected, actual);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let prefix = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        output.push_str(prefix);
        output.push(' ');
        output.push_str(change.value().trim_end_matches('\n'));
        output.push('\n');
    }

    output.truncate(output.trim_end().len());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_changed_lines() {
        let diff = format_diff("a\nb\nc", "a\nx\nc");
        assert_eq!(diff, "  a\n- b\n+ x\n  c");
    }

    #[test]
    fn handles_empty_actual() {
        assert_eq!(format_diff("4", ""), "- 4");
    }
}
