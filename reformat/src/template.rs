//! Structured prompt templates.
//!
//! A [`PromptTemplate`] lists its fields in output order and which of them are required.
//! [`render_template`] lays the fields out with a [`RuleSelection`]: casing applies to the
//! field labels, the separator sits between label and value, and item formatting plus
//! enumeration shape the example and option numbers. Sections are joined with a blank line.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::rules::RuleSelection;

const EXAMPLES_FIELD: &str = "Examples";
const OPTIONS_FIELD: &str = "Options";
const OPTIONS_SEPARATOR: &str = " -- ";
const SECTION_SEPARATOR: &str = "\n\n";

/// One input/output demonstration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Example {
    pub input: String,
    pub output: String,
}

/// Value of one template field, as read from a JSON fields file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Examples(Vec<Example>),
    List(Vec<String>),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

/// Field name → value.
pub type TemplateFields = BTreeMap<String, FieldValue>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: &'static [&'static str],
    pub required_fields: &'static [&'static str],
}

pub const GENERAL_TEMPLATE: PromptTemplate = PromptTemplate {
    name: "general",
    description: "Few-shot task with a description and input-output examples",
    fields: &["Task", "Examples", "Input"],
    required_fields: &["Task", "Input"],
};

pub const MULTIPLE_CHOICE_TEMPLATE: PromptTemplate = PromptTemplate {
    name: "multiple_choice",
    description: "Multiple choice question with examples",
    fields: &["Task", "Examples", "Question", "Options"],
    required_fields: &["Task", "Question", "Options"],
};

impl PromptTemplate {
    pub fn builtin() -> [PromptTemplate; 2] {
        [GENERAL_TEMPLATE, MULTIPLE_CHOICE_TEMPLATE]
    }

    /// Looks up a built-in template by name.
    pub fn by_name(name: &str) -> Result<PromptTemplate, ConfigurationError> {
        Self::builtin()
            .into_iter()
            .find(|t| t.name == name.trim())
            .ok_or_else(|| ConfigurationError::UnknownTemplate(name.to_string()))
    }

    fn missing_fields(&self, values: &TemplateFields) -> Vec<String> {
        self.required_fields
            .iter()
            .filter(|f| !values.contains_key(**f))
            .map(|f| f.to_string())
            .collect()
    }
}

/// Renders `values` through `template` with the rules of `selection`.
pub fn render_template(
    template: &PromptTemplate,
    values: &TemplateFields,
    selection: &RuleSelection,
) -> Result<String, ConfigurationError> {
    let missing = template.missing_fields(values);
    if !missing.is_empty() {
        return Err(ConfigurationError::MissingFields(missing));
    }

    let label = |text: &str| selection.casing.apply(text);
    let number = |n: usize| {
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        selection
            .item_formatting
            .format_label(&selection.enumeration.label(n))
    };
    let sep = selection.separator.separator;

    let mut sections = Vec::new();
    for field in template.fields {
        let Some(value) = values.get(*field) else {
            continue;
        };
        let heading = label(field);
        let body = match (*field, value) {
            (EXAMPLES_FIELD, FieldValue::Examples(examples)) => {
                if examples.is_empty() {
                    continue;
                }
                examples
                    .iter()
                    .enumerate()
                    .map(|(i, ex)| {
                        format!(
                            "{} {}{sep}{}: {}{sep}{}: {}",
                            label("Example"),
                            number(i + 1),
                            label("Input"),
                            ex.input,
                            label("Output"),
                            ex.output,
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(SECTION_SEPARATOR)
            }
            (OPTIONS_FIELD, FieldValue::List(options)) => options
                .iter()
                .enumerate()
                .map(|(i, opt)| format!("{}{sep}{}", number(i + 1), opt))
                .collect::<Vec<_>>()
                .join(OPTIONS_SEPARATOR),
            (_, FieldValue::Text(text)) => text.clone(),
            (_, FieldValue::List(items)) => items.join(", "),
            (_, FieldValue::Examples(examples)) => examples
                .iter()
                .map(|ex| format!("Input: {}\nOutput: {}", ex.input, ex.output))
                .collect::<Vec<_>>()
                .join(SECTION_SEPARATOR),
        };
        sections.push(format!("{heading}{sep}{body}"));
    }
    Ok(sections.join(SECTION_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModelId, RuleCatalog};
    use crate::rules::{Casing, CasingRule, EnumerationRule, FormatRule, ItemFormattingRule};

    fn general_selection() -> RuleSelection {
        RuleCatalog::builtin()
            .pipeline(ModelId::General)
            .default_selection()
            .unwrap()
    }

    #[test]
    fn unknown_template_is_rejected() {
        assert_eq!(
            PromptTemplate::by_name("essay"),
            Err(ConfigurationError::UnknownTemplate("essay".into()))
        );
        assert_eq!(PromptTemplate::by_name("general").unwrap().name, "general");
    }

    #[test]
    fn missing_required_fields_are_listed() {
        let mut values = TemplateFields::new();
        values.insert("Task".into(), "Add numbers".into());
        let err = render_template(&MULTIPLE_CHOICE_TEMPLATE, &values, &general_selection())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingFields(vec!["Question".into(), "Options".into()])
        );
    }

    #[test]
    fn general_template_with_examples() {
        let sel = general_selection()
            .with_rule(FormatRule::Separator(
                crate::rules::SeparatorRule::defaults()[3],
            ))
            .with_rule(FormatRule::Casing(CasingRule::for_casing(Casing::Upper)));
        let mut values = TemplateFields::new();
        values.insert("Task".into(), "Add the numbers".into());
        values.insert(
            "Examples".into(),
            FieldValue::Examples(vec![Example {
                input: "2 3".into(),
                output: "5".into(),
            }]),
        );
        values.insert("Input".into(), "4 4".into());
        let out = render_template(&GENERAL_TEMPLATE, &values, &sel).unwrap();
        assert_eq!(
            out,
            "TASK\nAdd the numbers\n\nEXAMPLES\nEXAMPLE (1)\nINPUT: 2 3\nOUTPUT: 5\n\nINPUT\n4 4"
        );
    }

    #[test]
    fn options_use_item_format_and_enumeration() {
        let sel = general_selection()
            .with_rule(FormatRule::Separator(
                crate::rules::SeparatorRule::defaults()[1],
            ))
            .with_rule(FormatRule::ItemFormatting(ItemFormattingRule::defaults()[4]))
            .with_rule(FormatRule::Enumeration(EnumerationRule::defaults()[3]));
        let values: TemplateFields = serde_json::from_str(
            r#"{"Task": "Pick one", "Question": "Largest planet?", "Options": ["Mars", "Jupiter"]}"#,
        )
        .unwrap();
        let out = render_template(&MULTIPLE_CHOICE_TEMPLATE, &values, &sel).unwrap();
        assert_eq!(
            out,
            "Task Pick one\n\nQuestion Largest planet?\n\nOptions [A] Mars -- [B] Jupiter"
        );
    }

    #[test]
    fn fields_file_parses_examples() {
        let values: TemplateFields = serde_json::from_str(
            r#"{"Task": "t", "Examples": [{"input": "a", "output": "b"}], "Input": "c"}"#,
        )
        .unwrap();
        assert!(matches!(values["Examples"], FieldValue::Examples(ref e) if e.len() == 1));
        assert_eq!(values["Input"], FieldValue::Text("c".into()));
    }
}
