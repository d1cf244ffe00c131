//! Casing rules.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Casing {
    NoChange,
    /// First letter of every alphabetic run upper-cased, the rest lower-cased.
    Title,
    Lower,
    Upper,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CasingRule {
    pub name: &'static str,
    pub description: &'static str,
    pub casing: Casing,
}

const DEFAULT_RULES: [CasingRule; 4] = [
    CasingRule {
        name: "No Change",
        description: "Keep original casing",
        casing: Casing::NoChange,
    },
    CasingRule {
        name: "Title",
        description: "Use title case",
        casing: Casing::Title,
    },
    CasingRule {
        name: "Lower",
        description: "Use lowercase",
        casing: Casing::Lower,
    },
    CasingRule {
        name: "Upper",
        description: "Use uppercase",
        casing: Casing::Upper,
    },
];

impl CasingRule {
    pub fn defaults() -> Vec<CasingRule> {
        DEFAULT_RULES.to_vec()
    }

    /// Returns the default rule for `casing`.
    pub fn for_casing(casing: Casing) -> CasingRule {
        match casing {
            Casing::NoChange => DEFAULT_RULES[0],
            Casing::Title => DEFAULT_RULES[1],
            Casing::Lower => DEFAULT_RULES[2],
            Casing::Upper => DEFAULT_RULES[3],
        }
    }

    pub fn apply(&self, text: &str) -> String {
        match self.casing {
            Casing::NoChange => text.to_string(),
            Casing::Title => title_case(text),
            Casing::Lower => text.to_lowercase(),
            Casing::Upper => text.to_uppercase(),
        }
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
