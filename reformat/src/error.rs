//! Error types shared across the reformatter and the improver.
//!
//! Each concern has its own enum: [`ConfigurationError`] for catalog/template/key problems,
//! [`ExternalServiceError`] for model calls, [`JudgeParseError`] for unusable judge output.
//! [`ImproveError`](crate::improver::ImproveError) wraps them at the orchestration boundary.

use std::time::Duration;

use thiserror::Error;

use crate::rules::RuleClass;

/// Static configuration is wrong. Never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Model id string is not one of the supported catalog keys.
    #[error("unknown model: {model} (available: {available})")]
    UnknownModel { model: String, available: String },

    /// A rule selection was built without a rule for this class.
    #[error("missing rule for class {0}")]
    MissingRule(RuleClass),

    /// A rule selection was given two rules of the same class.
    #[error("duplicate rule for class {0}")]
    DuplicateRule(RuleClass),

    /// No API key on the command line or in the environment.
    #[error("missing API key: pass --api-key or set {env_var}")]
    MissingApiKey { env_var: &'static str },

    /// Template name is not one of the built-in templates.
    #[error("unknown template: {0} (use general or multiple_choice)")]
    UnknownTemplate(String),

    /// A template was rendered without one of its required fields.
    #[error("missing required template fields: {0:?}")]
    MissingFields(Vec<String>),

    /// A parameter is outside its accepted range (e.g. temperature > 1).
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// A call to a hosted model failed.
///
/// [`is_transient`](ExternalServiceError::is_transient) decides whether the retry policy
/// gets another attempt; authentication failures are final.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExternalServiceError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Any other API-level failure (bad request, empty choices, server error).
    #[error("api error: {0}")]
    Api(String),
}

impl ExternalServiceError {
    /// True when another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ExternalServiceError::Auth(_))
    }
}

/// The judge replied with something that is not a single number in [0, 1].
#[derive(Debug, Error, Clone, PartialEq)]
#[error("judge output is not a score in [0, 1]: {raw:?}")]
pub struct JudgeParseError {
    /// Raw judge reply, trimmed.
    pub raw: String,
}

/// Failure of one [`Judge::compare`](crate::judge::Judge::compare) call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JudgeError {
    #[error(transparent)]
    Service(#[from] ExternalServiceError),

    #[error(transparent)]
    Parse(#[from] JudgeParseError),
}

/// Synonym store failure (I/O, SQLite, JSON).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_is_not_transient() {
        assert!(!ExternalServiceError::Auth("bad key".into()).is_transient());
        assert!(ExternalServiceError::RateLimited("429".into()).is_transient());
        assert!(ExternalServiceError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ExternalServiceError::Network("reset".into()).is_transient());
    }

    #[test]
    fn unknown_model_display_lists_available() {
        let err = ConfigurationError::UnknownModel {
            model: "gpt-5".into(),
            available: "general, gpt-4o".into(),
        };
        let s = err.to_string();
        assert!(s.contains("gpt-5"), "{}", s);
        assert!(s.contains("general, gpt-4o"), "{}", s);
    }

    #[test]
    fn judge_error_wraps_parse_error_transparently() {
        let err: JudgeError = JudgeParseError {
            raw: "not a number".into(),
        }
        .into();
        assert!(err.to_string().contains("not a number"));
        assert!(matches!(err, JudgeError::Parse(_)));
    }
}
