//! Access to the engine's rule schema and registry rules.

use serde_json::Value;
use thiserror::Error;

/// A schema or rule document could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SchemaUnavailable {
    /// What went wrong.
    pub reason: String,
}

impl SchemaUnavailable {
    /// Creates an error with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Source of rule-authoring reference documents.
pub trait SchemaFetcher: Send + Sync {
    /// Returns the JSON schema describing rule files.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaUnavailable`] when the schema cannot be obtained.
    fn rule_schema(&self) -> Result<Value, SchemaUnavailable>;

    /// Returns the YAML text of the registry rule `rule_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaUnavailable`] when the rule cannot be obtained.
    fn rule_yaml(&self, rule_id: &str) -> Result<String, SchemaUnavailable>;
}

/// Fetcher used when no schema source is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSchemaSource;

impl SchemaFetcher for NoSchemaSource {
    fn rule_schema(&self) -> Result<Value, SchemaUnavailable> {
        Err(SchemaUnavailable::new("no rule schema source is configured"))
    }

    fn rule_yaml(&self, rule_id: &str) -> Result<String, SchemaUnavailable> {
        Err(SchemaUnavailable::new(format!(
            "no rule source is configured for '{rule_id}'"
        )))
    }
}
