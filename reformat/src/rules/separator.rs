//! Separator rules: how prompt sections (lines) are joined.

use serde::Serialize;

/// Joins the trimmed lines of a prompt with `separator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SeparatorRule {
    pub name: &'static str,
    pub description: &'static str,
    pub separator: &'static str,
}

const fn rule(name: &'static str, description: &'static str, separator: &'static str) -> SeparatorRule {
    SeparatorRule {
        name,
        description,
        separator,
    }
}

/// Section separators first, then connectors.
const DEFAULT_RULES: [SeparatorRule; 16] = [
    rule("Empty", "No separator", ""),
    rule("Space", "Single space", " "),
    rule("Double Space", "Double space", "  "),
    rule("Newline", "Single newline", "\n"),
    rule("Double Newline", "Double newline", "\n\n"),
    rule("Double Dash", "Double dash", " -- "),
    rule("Semicolon", "Semicolon", " ; "),
    rule("Pipe", "Double pipe", " || "),
    rule("Sep", "Special separator", " <sep> "),
    rule("Comma", "Comma", ", "),
    rule("Period", "Period", ". "),
    rule("Double Colon", "Double colon", ":: "),
    rule("Single Colon", "Single colon", ": "),
    rule("Tab", "Tab", "\t"),
    rule("Newline Tab", "Newline with tab", "\n\t"),
    rule("Triple Period", "Triple period", "..."),
];

impl SeparatorRule {
    /// All separator rules, expert default first.
    pub fn defaults() -> Vec<SeparatorRule> {
        DEFAULT_RULES.to_vec()
    }

    pub fn apply(&self, prompt: &str) -> String {
        prompt
            .split('\n')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(self.separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_name(name: &str) -> SeparatorRule {
        SeparatorRule::defaults()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap()
    }

    #[test]
    fn single_line_is_only_trimmed() {
        assert_eq!(by_name("Pipe").apply("  hello world  "), "hello world");
    }

    #[test]
    fn lines_are_trimmed_and_joined() {
        let text = "Task: add\n  Input: 2+3 \nOutput:";
        assert_eq!(by_name("Pipe").apply(text), "Task: add || Input: 2+3 || Output:");
        assert_eq!(by_name("Empty").apply(text), "Task: addInput: 2+3Output:");
        assert_eq!(
            by_name("Double Newline").apply(text),
            "Task: add\n\nInput: 2+3\n\nOutput:"
        );
    }

    #[test]
    fn default_rule_names_are_unique() {
        let rules = SeparatorRule::defaults();
        let mut names: Vec<_> = rules.iter().map(|r| r.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), rules.len());
    }
}
