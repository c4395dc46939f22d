use colored::Colorize;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use crate::error::Result;

/// YAML dump of a resource, as written by export and shown by plan.
pub fn to_yaml<T: Serialize>(resource: &T) -> Result<String> {
    Ok(serde_yaml::to_string(resource)?)
}

/// Line diff between two YAML dumps, `-` for actual and `+` for desired.
pub fn format_yaml_diff(actual: &str, desired: &str) -> String {
    let diff = TextDiff::from_lines(actual, desired);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let line = change.to_string();
        let formatted = match change.tag() {
            ChangeTag::Delete => format!("    - {}", line.trim_end()).red().to_string(),
            ChangeTag::Insert => format!("    + {}", line.trim_end()).green().to_string(),
            ChangeTag::Equal => format!("      {}", line.trim_end()),
        };
        output.push_str(&formatted);
        output.push('\n');
    }

    output
}

/// Indent every line of a dump under a `+ id` header.
pub fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}\n", prefix, line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dataset;

    #[test]
    fn test_format_diff_shows_changes() {
        colored::control::set_override(false);
        let mut old = Dataset::new("ds");
        old.description = Some("before".into());
        let mut new = old.clone();
        new.description = Some("after".into());
        let diff = format_yaml_diff(&to_yaml(&old).unwrap(), &to_yaml(&new).unwrap());
        assert!(diff.contains("    - description: before"));
        assert!(diff.contains("    + description: after"));
        assert!(diff.contains("      dataset_id: ds"));
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\nb\n", "    "), "    a\n    b\n");
    }
}
