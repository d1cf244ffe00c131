//! Per-model rule catalogs.
//!
//! [`ModelId`] is the closed set of supported targets; [`RuleCatalog`] maps each one to a
//! [`RulePipeline`] through an exhaustive `match`, so adding a model without a pipeline
//! does not compile. The catalog is built once and passed by reference to the
//! reformatter and the candidate generator.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::rules::{
    Casing, CasingRule, EnumerationRule, FormatRule, ItemFormattingRule, RuleClass,
    RuleSelection, SeparatorRule,
};

/// Supported target models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "general")]
    General,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "llama-3.3-70b-versatile")]
    Llama33_70bVersatile,
    #[serde(rename = "llama-3.1-8b-instant")]
    Llama31_8bInstant,
    #[serde(rename = "mixtral-8x7b-32768")]
    Mixtral8x7b,
    #[serde(rename = "gemma2-9b-it")]
    Gemma2_9bIt,
}

/// Hosted API that serves a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenAi,
    Groq,
}

impl Provider {
    /// Environment variable holding the API key for this provider.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
        }
    }
}

impl ModelId {
    pub const ALL: [ModelId; 7] = [
        ModelId::General,
        ModelId::Gpt4o,
        ModelId::Gpt4oMini,
        ModelId::Llama33_70bVersatile,
        ModelId::Llama31_8bInstant,
        ModelId::Mixtral8x7b,
        ModelId::Gemma2_9bIt,
    ];

    /// Model used when `general` is the improve target, and the fixed judge model.
    pub const DEFAULT_REMOTE: ModelId = ModelId::Llama33_70bVersatile;

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::General => "general",
            ModelId::Gpt4o => "gpt-4o",
            ModelId::Gpt4oMini => "gpt-4o-mini",
            ModelId::Llama33_70bVersatile => "llama-3.3-70b-versatile",
            ModelId::Llama31_8bInstant => "llama-3.1-8b-instant",
            ModelId::Mixtral8x7b => "mixtral-8x7b-32768",
            ModelId::Gemma2_9bIt => "gemma2-9b-it",
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ModelId::Gpt4o | ModelId::Gpt4oMini => Provider::OpenAi,
            ModelId::General
            | ModelId::Llama33_70bVersatile
            | ModelId::Llama31_8bInstant
            | ModelId::Mixtral8x7b
            | ModelId::Gemma2_9bIt => Provider::Groq,
        }
    }

    /// Model name sent to the provider API.
    pub fn api_model(&self) -> &'static str {
        match self {
            ModelId::General => ModelId::DEFAULT_REMOTE.as_str(),
            other => other.as_str(),
        }
    }

    fn available() -> String {
        ModelId::ALL
            .iter()
            .map(ModelId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| ConfigurationError::UnknownModel {
                model: s.to_string(),
                available: ModelId::available(),
            })
    }
}

/// Ordered rule options per class for one model. The first rule of each class is the
/// expert default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RulePipeline {
    pub separators: Vec<SeparatorRule>,
    pub casings: Vec<CasingRule>,
    pub item_formats: Vec<ItemFormattingRule>,
    pub enumerations: Vec<EnumerationRule>,
}

impl RulePipeline {
    /// Every rule of every class.
    pub fn standard() -> Self {
        Self {
            separators: SeparatorRule::defaults(),
            casings: CasingRule::defaults(),
            item_formats: ItemFormattingRule::defaults(),
            enumerations: EnumerationRule::defaults(),
        }
    }

    /// The expert-default selection: first rule of each class.
    ///
    /// Fails with [`ConfigurationError::MissingRule`] when a class has no options.
    pub fn default_selection(&self) -> Result<RuleSelection, ConfigurationError> {
        RuleSelection::from_rules(
            RuleClass::ORDER
                .iter()
                .filter_map(|class| self.options(*class).into_iter().next()),
        )
    }

    /// Rule options for `class`, in catalog order.
    pub fn options(&self, class: RuleClass) -> Vec<FormatRule> {
        match class {
            RuleClass::Separator => self.separators.iter().copied().map(FormatRule::Separator).collect(),
            RuleClass::Casing => self.casings.iter().copied().map(FormatRule::Casing).collect(),
            RuleClass::ItemFormatting => self
                .item_formats
                .iter()
                .copied()
                .map(FormatRule::ItemFormatting)
                .collect(),
            RuleClass::Enumeration => self
                .enumerations
                .iter()
                .copied()
                .map(FormatRule::Enumeration)
                .collect(),
        }
    }
}

fn builtin_pipeline(model: ModelId) -> RulePipeline {
    match model {
        ModelId::Llama31_8bInstant => RulePipeline {
            casings: vec![CasingRule::for_casing(Casing::Upper)],
            ..RulePipeline::standard()
        },
        ModelId::General
        | ModelId::Gpt4o
        | ModelId::Gpt4oMini
        | ModelId::Llama33_70bVersatile
        | ModelId::Mixtral8x7b
        | ModelId::Gemma2_9bIt => RulePipeline::standard(),
    }
}

/// Immutable model → pipeline table.
#[derive(Clone, Debug)]
pub struct RuleCatalog {
    pipelines: BTreeMap<ModelId, RulePipeline>,
}

impl RuleCatalog {
    /// The built-in catalog for every [`ModelId`].
    pub fn builtin() -> Self {
        Self {
            pipelines: ModelId::ALL
                .iter()
                .map(|m| (*m, builtin_pipeline(*m)))
                .collect(),
        }
    }

    pub fn pipeline(&self, model: ModelId) -> &RulePipeline {
        // Every ModelId is inserted by `builtin`.
        &self.pipelines[&model]
    }

    /// Looks up a pipeline by model id string.
    pub fn get_pipeline(&self, model: &str) -> Result<&RulePipeline, ConfigurationError> {
        let id: ModelId = model.parse()?;
        Ok(self.pipeline(id))
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
