//! Item-formatting rules: the shape of list markers.

use serde::Serialize;

use super::marker::map_markers;

/// Rewrites every list marker into `template`, where `{}` stands for the item number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ItemFormattingRule {
    pub name: &'static str,
    pub description: &'static str,
    pub template: &'static str,
}

const DEFAULT_RULES: [ItemFormattingRule; 6] = [
    ItemFormattingRule {
        name: "Parentheses",
        description: "Use parentheses",
        template: "({})",
    },
    ItemFormattingRule {
        name: "Dot",
        description: "Use dot suffix",
        template: "{}.",
    },
    ItemFormattingRule {
        name: "Paren",
        description: "Use right parenthesis",
        template: "{})",
    },
    ItemFormattingRule {
        name: "Underscore",
        description: "Use underscore suffix",
        template: "{}_",
    },
    ItemFormattingRule {
        name: "Brackets",
        description: "Use square brackets",
        template: "[{}]",
    },
    ItemFormattingRule {
        name: "Angle",
        description: "Use angle brackets",
        template: "<{}>",
    },
];

impl ItemFormattingRule {
    pub fn defaults() -> Vec<ItemFormattingRule> {
        DEFAULT_RULES.to_vec()
    }

    /// Formats a single item label (e.g. an example number or an already enumerated "iv").
    pub fn format_label(&self, label: &str) -> String {
        self.template.replacen("{}", label, 1)
    }

    pub fn apply(&self, text: &str) -> String {
        map_markers(text, |token, number| Some(self.format_label(&token[number])))
    }
}
