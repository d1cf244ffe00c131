//! Formatting rules: the four rule classes and the one-rule-per-class [`RuleSelection`].
//!
//! Rules are immutable values owned by the [`catalog`](crate::catalog). A selection always
//! applies its rules in [`RuleClass::ORDER`] (separator → casing → item formatting →
//! enumeration), whatever order they were picked in.

mod casing;
mod enumeration;
mod item;
mod marker;
mod separator;

pub use casing::{Casing, CasingRule};
pub use enumeration::{Enumeration, EnumerationRule};
pub use item::ItemFormattingRule;
pub use marker::contains_marker;
pub use separator::SeparatorRule;

use std::fmt;

use serde::Serialize;

use crate::error::ConfigurationError;

/// Class of a formatting rule. A [`RuleSelection`] holds exactly one rule per class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleClass {
    Separator,
    Casing,
    ItemFormatting,
    Enumeration,
}

impl RuleClass {
    /// Fixed application order.
    pub const ORDER: [RuleClass; 4] = [
        RuleClass::Separator,
        RuleClass::Casing,
        RuleClass::ItemFormatting,
        RuleClass::Enumeration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleClass::Separator => "separator",
            RuleClass::Casing => "casing",
            RuleClass::ItemFormatting => "item_formatting",
            RuleClass::Enumeration => "enumeration",
        }
    }
}

impl fmt::Display for RuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One formatting rule of any class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatRule {
    Separator(SeparatorRule),
    Casing(CasingRule),
    ItemFormatting(ItemFormattingRule),
    Enumeration(EnumerationRule),
}

impl FormatRule {
    pub fn class(&self) -> RuleClass {
        match self {
            FormatRule::Separator(_) => RuleClass::Separator,
            FormatRule::Casing(_) => RuleClass::Casing,
            FormatRule::ItemFormatting(_) => RuleClass::ItemFormatting,
            FormatRule::Enumeration(_) => RuleClass::Enumeration,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FormatRule::Separator(r) => r.name,
            FormatRule::Casing(r) => r.name,
            FormatRule::ItemFormatting(r) => r.name,
            FormatRule::Enumeration(r) => r.name,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FormatRule::Separator(r) => r.description,
            FormatRule::Casing(r) => r.description,
            FormatRule::ItemFormatting(r) => r.description,
            FormatRule::Enumeration(r) => r.description,
        }
    }

    /// Applies the rule's transformation to `text`.
    pub fn apply(&self, text: &str) -> String {
        match self {
            FormatRule::Separator(r) => r.apply(text),
            FormatRule::Casing(r) => r.apply(text),
            FormatRule::ItemFormatting(r) => r.apply(text),
            FormatRule::Enumeration(r) => r.apply(text),
        }
    }
}

/// Exactly one rule per class; the unit the search explores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RuleSelection {
    pub separator: SeparatorRule,
    pub casing: CasingRule,
    pub item_formatting: ItemFormattingRule,
    pub enumeration: EnumerationRule,
}

/// Rule names of a selection, for reports and verbose output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectionSummary {
    pub separator: String,
    pub casing: String,
    pub item_formatting: String,
    pub enumeration: String,
}

impl RuleSelection {
    pub fn new(
        separator: SeparatorRule,
        casing: CasingRule,
        item_formatting: ItemFormattingRule,
        enumeration: EnumerationRule,
    ) -> Self {
        Self {
            separator,
            casing,
            item_formatting,
            enumeration,
        }
    }

    /// Builds a selection from loose rules in any order.
    ///
    /// Fails with [`ConfigurationError::MissingRule`] when a class has no rule and
    /// [`ConfigurationError::DuplicateRule`] when a class has two.
    pub fn from_rules(
        rules: impl IntoIterator<Item = FormatRule>,
    ) -> Result<Self, ConfigurationError> {
        let mut separator = None;
        let mut casing = None;
        let mut item_formatting = None;
        let mut enumeration = None;

        for rule in rules {
            let class = rule.class();
            let taken = match rule {
                FormatRule::Separator(r) => separator.replace(r).is_some(),
                FormatRule::Casing(r) => casing.replace(r).is_some(),
                FormatRule::ItemFormatting(r) => item_formatting.replace(r).is_some(),
                FormatRule::Enumeration(r) => enumeration.replace(r).is_some(),
            };
            if taken {
                return Err(ConfigurationError::DuplicateRule(class));
            }
        }

        Ok(Self {
            separator: separator.ok_or(ConfigurationError::MissingRule(RuleClass::Separator))?,
            casing: casing.ok_or(ConfigurationError::MissingRule(RuleClass::Casing))?,
            item_formatting: item_formatting
                .ok_or(ConfigurationError::MissingRule(RuleClass::ItemFormatting))?,
            enumeration: enumeration
                .ok_or(ConfigurationError::MissingRule(RuleClass::Enumeration))?,
        })
    }

    /// The four rules in application order.
    pub fn rules(&self) -> [FormatRule; 4] {
        [
            FormatRule::Separator(self.separator),
            FormatRule::Casing(self.casing),
            FormatRule::ItemFormatting(self.item_formatting),
            FormatRule::Enumeration(self.enumeration),
        ]
    }

    /// The rule chosen for `class`.
    pub fn rule(&self, class: RuleClass) -> FormatRule {
        match class {
            RuleClass::Separator => FormatRule::Separator(self.separator),
            RuleClass::Casing => FormatRule::Casing(self.casing),
            RuleClass::ItemFormatting => FormatRule::ItemFormatting(self.item_formatting),
            RuleClass::Enumeration => FormatRule::Enumeration(self.enumeration),
        }
    }

    /// Returns a copy with the rule for `rule.class()` replaced.
    pub fn with_rule(mut self, rule: FormatRule) -> Self {
        match rule {
            FormatRule::Separator(r) => self.separator = r,
            FormatRule::Casing(r) => self.casing = r,
            FormatRule::ItemFormatting(r) => self.item_formatting = r,
            FormatRule::Enumeration(r) => self.enumeration = r,
        }
        self
    }

    pub fn summary(&self) -> SelectionSummary {
        SelectionSummary {
            separator: self.separator.name.to_string(),
            casing: self.casing.name.to_string(),
            item_formatting: self.item_formatting.name.to_string(),
            enumeration: self.enumeration.name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any_selection_rules() -> Vec<FormatRule> {
        vec![
            FormatRule::Enumeration(EnumerationRule::defaults()[1]),
            FormatRule::Casing(CasingRule::defaults()[2]),
            FormatRule::Separator(SeparatorRule::defaults()[3]),
            FormatRule::ItemFormatting(ItemFormattingRule::defaults()[0]),
        ]
    }

    #[test]
    fn from_rules_accepts_any_order() {
        let sel = RuleSelection::from_rules(any_selection_rules()).unwrap();
        assert_eq!(sel.separator.name, "Newline");
        assert_eq!(sel.casing.name, "Lower");
        assert_eq!(sel.item_formatting.name, "Parentheses");
        assert_eq!(sel.enumeration.name, "Roman Upper");
        let classes: Vec<RuleClass> = sel.rules().iter().map(FormatRule::class).collect();
        assert_eq!(classes, RuleClass::ORDER.to_vec());
    }

    #[test]
    fn from_rules_missing_class_is_configuration_error() {
        let mut rules = any_selection_rules();
        rules.retain(|r| r.class() != RuleClass::Casing);
        assert_eq!(
            RuleSelection::from_rules(rules),
            Err(ConfigurationError::MissingRule(RuleClass::Casing))
        );
    }

    #[test]
    fn from_rules_duplicate_class_is_rejected() {
        let mut rules = any_selection_rules();
        rules.push(FormatRule::Casing(CasingRule::defaults()[0]));
        assert_eq!(
            RuleSelection::from_rules(rules),
            Err(ConfigurationError::DuplicateRule(RuleClass::Casing))
        );
    }

    #[test]
    fn with_rule_replaces_only_that_class() {
        let sel = RuleSelection::from_rules(any_selection_rules()).unwrap();
        let upper = CasingRule::defaults()[3];
        let next = sel.with_rule(FormatRule::Casing(upper));
        assert_eq!(next.casing, upper);
        assert_eq!(next.separator, sel.separator);
        assert_eq!(next.rule(RuleClass::Casing).name(), "Upper");
    }
}
