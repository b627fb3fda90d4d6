//! Invariants referenced by `obeys` rules
//!
//! ```fsh
//! Invariant: inv-1
//! Description: "Name must be present if active"
//! Severity: #error
//! Expression: "active.not() or name.exists()"
//! ```

use crate::fhir::ElementDefinitionConstraint;
use std::fmt;

/// Severity of an invariant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSeverity {
    Error,
    Warning,
}

impl ConstraintSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintSeverity::Error => "error",
            ConstraintSeverity::Warning => "warning",
        }
    }
}

impl fmt::Display for ConstraintSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invariant (constraint) defined in the project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invariant {
    /// Key written to `constraint.key` (e.g. "inv-1")
    pub name: String,
    pub description: Option<String>,
    pub severity: ConstraintSeverity,
    /// FHIRPath expression
    pub expression: Option<String>,
    pub xpath: Option<String>,
    pub requirements: Option<String>,
}

impl Invariant {
    pub fn new(name: impl Into<String>, severity: ConstraintSeverity) -> Self {
        Self {
            name: name.into(),
            description: None,
            severity,
            expression: None,
            xpath: None,
            requirements: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = Some(xpath.into());
        self
    }

    /// Build the ElementDefinition.constraint entry, sourced at `source_url`
    pub fn to_constraint(&self, source_url: &str) -> ElementDefinitionConstraint {
        ElementDefinitionConstraint {
            key: self.name.clone(),
            requirements: self.requirements.clone(),
            severity: Some(self.severity.as_str().to_string()),
            human: self.description.clone().unwrap_or_default(),
            expression: self.expression.clone(),
            xpath: self.xpath.clone(),
            source: Some(source_url.to_string()),
            extension: None,
        }
    }
}
