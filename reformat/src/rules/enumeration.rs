//! Enumeration rules: the numbering system used inside list markers.

use serde::Serialize;

use super::marker::map_markers;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Enumeration {
    Numeric,
    RomanUpper,
    RomanLower,
    AlphaUpper,
    AlphaLower,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct EnumerationRule {
    pub name: &'static str,
    pub description: &'static str,
    pub style: Enumeration,
}

const DEFAULT_RULES: [EnumerationRule; 5] = [
    EnumerationRule {
        name: "Numeric",
        description: "Use numeric enumeration",
        style: Enumeration::Numeric,
    },
    EnumerationRule {
        name: "Roman Upper",
        description: "Use uppercase roman numerals",
        style: Enumeration::RomanUpper,
    },
    EnumerationRule {
        name: "Roman Lower",
        description: "Use lowercase roman numerals",
        style: Enumeration::RomanLower,
    },
    EnumerationRule {
        name: "Alpha Upper",
        description: "Use uppercase letters",
        style: Enumeration::AlphaUpper,
    },
    EnumerationRule {
        name: "Alpha Lower",
        description: "Use lowercase letters",
        style: Enumeration::AlphaLower,
    },
];

impl EnumerationRule {
    pub fn defaults() -> Vec<EnumerationRule> {
        DEFAULT_RULES.to_vec()
    }

    /// Label for item `n`; falls back to the decimal number when the style has no symbol.
    pub fn label(&self, n: u32) -> String {
        let converted = match self.style {
            Enumeration::Numeric => None,
            Enumeration::RomanUpper => roman(n),
            Enumeration::RomanLower => roman(n).map(|s| s.to_lowercase()),
            Enumeration::AlphaUpper => alpha(n, b'A'),
            Enumeration::AlphaLower => alpha(n, b'a'),
        };
        converted.unwrap_or_else(|| n.to_string())
    }

    pub fn apply(&self, text: &str) -> String {
        if self.style == Enumeration::Numeric {
            return text.to_string();
        }
        map_markers(text, |token, number| {
            let n: u32 = token[number.clone()].parse().ok()?;
            let mut out = String::with_capacity(token.len() + 4);
            out.push_str(&token[..number.start]);
            out.push_str(&self.label(n));
            out.push_str(&token[number.end..]);
            Some(out)
        })
    }
}

/// Roman numeral for 1..=39.
fn roman(n: u32) -> Option<String> {
    if n == 0 || n >= 40 {
        return None;
    }
    const TABLE: [(u32, &str); 5] = [(10, "X"), (9, "IX"), (5, "V"), (4, "IV"), (1, "I")];
    let mut rest = n;
    let mut out = String::new();
    for (value, symbol) in TABLE {
        while rest >= value {
            out.push_str(symbol);
            rest -= value;
        }
    }
    Some(out)
}

/// Letter for 1..=26.
fn alpha(n: u32, base: u8) -> Option<String> {
    if n == 0 || n > 26 {
        return None;
    }
    Some(char::from(base + (n - 1) as u8).to_string())
}
