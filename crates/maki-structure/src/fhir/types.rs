//! Complex datatypes nested inside ElementDefinition

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Data type for an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionType {
    /// Data type or Resource (reference target)
    pub code: String,

    /// Profile (StructureDefinition or IG) on type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Vec<String>>,

    /// Primitive extensions on `profile` entries (profile-element pointers)
    #[serde(rename = "_profile", skip_serializing_if = "Option::is_none")]
    pub profile_ext: Option<Vec<Value>>,

    /// Profile (StructureDefinition or IG) for target resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_profile: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<Vec<Value>>,
}

impl ElementDefinitionType {
    /// Create a simple type with just a code
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_profile(code: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            profile: Some(vec![profile.into()]),
            ..Default::default()
        }
    }

    pub fn with_targets(code: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            code: code.into(),
            target_profile: if targets.is_empty() {
                None
            } else {
                Some(targets)
            },
            ..Default::default()
        }
    }

    pub fn profiles(&self) -> &[String] {
        self.profile.as_deref().unwrap_or(&[])
    }

    pub fn target_profiles(&self) -> &[String] {
        self.target_profile.as_deref().unwrap_or(&[])
    }

    /// Reference-like types carry their constraint in `targetProfile`
    pub fn is_reference_like(&self) -> bool {
        matches!(
            self.code.as_str(),
            "Reference" | "canonical" | "CodeableReference"
        )
    }

    /// Element path named by a `profile-element` extension on this type, if any
    pub fn profile_element(&self) -> Option<&str> {
        self.profile_ext
            .as_ref()?
            .iter()
            .filter_map(|entry| entry.get("extension")?.as_array())
            .flatten()
            .find(|ext| {
                ext.get("url").and_then(Value::as_str) == Some(PROFILE_ELEMENT_EXTENSION)
            })
            .and_then(|ext| ext.get("valueString")?.as_str())
    }
}

pub const PROFILE_ELEMENT_EXTENSION: &str =
    "http://hl7.org/fhir/StructureDefinition/elementdefinition-profile-element";

/// Binding strength, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    Example,
    Preferred,
    Extensible,
    Required,
}

impl BindingStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingStrength::Example => "example",
            BindingStrength::Preferred => "preferred",
            BindingStrength::Extensible => "extensible",
            BindingStrength::Required => "required",
        }
    }
}

impl fmt::Display for BindingStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindingStrength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('#').to_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "extensible" => Ok(Self::Extensible),
            "preferred" => Ok(Self::Preferred),
            "example" => Ok(Self::Example),
            other => Err(format!("unknown binding strength '{other}'")),
        }
    }
}

/// ValueSet binding for an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionBinding {
    /// required | extensible | preferred | example
    pub strength: BindingStrength,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Source of value set (canonical URL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<Vec<Value>>,
}

/// Constraint on an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionConstraint {
    pub key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,

    /// error | warning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    pub human: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,

    /// Canonical of the definition that introduced the constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<Vec<Value>>,
}

/// open | closed | openAtEnd
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlicingRules {
    Closed,
    /// Assumed while a slicing is being declared one caret rule at a time
    #[default]
    Open,
    OpenAtEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlicingDiscriminator {
    /// value | exists | pattern | type | profile | position
    #[serde(rename = "type", default)]
    pub type_: String,
    /// Empty while a caret rule sets the type before the path
    #[serde(default)]
    pub path: String,
}

impl SlicingDiscriminator {
    pub fn new(type_: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            path: path.into(),
        }
    }
}

/// Slicing descriptor declared on an array element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionSlicing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<Vec<SlicingDiscriminator>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,

    #[serde(default)]
    pub rules: SlicingRules,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ElementDefinitionSlicing {
    pub fn new(discriminator: SlicingDiscriminator, rules: SlicingRules) -> Self {
        Self {
            discriminator: Some(vec![discriminator]),
            description: None,
            ordered: Some(false),
            rules,
            extra: Map::new(),
        }
    }
}

/// Base definition information for tools
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementDefinitionBase {
    pub path: String,
    pub min: u32,
    pub max: String,
}

/// Mapping to another standard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionMapping {
    pub identity: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    pub map: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Maximum cardinality, either bounded or `*`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxCardinality {
    Bounded(u32),
    Unbounded,
}

impl MaxCardinality {
    pub fn parse(value: &str) -> Result<Self, std::num::ParseIntError> {
        if value == "*" {
            Ok(MaxCardinality::Unbounded)
        } else {
            value.parse().map(MaxCardinality::Bounded)
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, MaxCardinality::Bounded(0))
    }

    pub fn allows(&self, n: u32) -> bool {
        match self {
            MaxCardinality::Bounded(max) => n <= *max,
            MaxCardinality::Unbounded => true,
        }
    }
}

impl PartialOrd for MaxCardinality {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MaxCardinality {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (MaxCardinality::Unbounded, MaxCardinality::Unbounded) => Ordering::Equal,
            (MaxCardinality::Unbounded, _) => Ordering::Greater,
            (_, MaxCardinality::Unbounded) => Ordering::Less,
            (MaxCardinality::Bounded(a), MaxCardinality::Bounded(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for MaxCardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxCardinality::Bounded(n) => write!(f, "{n}"),
            MaxCardinality::Unbounded => f.write_str("*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_binding_strength_ordering() {
        assert!(BindingStrength::Example < BindingStrength::Preferred);
        assert!(BindingStrength::Preferred < BindingStrength::Extensible);
        assert!(BindingStrength::Extensible < BindingStrength::Required);
        assert_eq!(
            "#extensible".parse::<BindingStrength>(),
            Ok(BindingStrength::Extensible)
        );
        assert!("strong".parse::<BindingStrength>().is_err());
    }

    #[test]
    fn test_max_cardinality_ordering() {
        let star = MaxCardinality::parse("*").unwrap();
        let one = MaxCardinality::parse("1").unwrap();
        assert!(star > one);
        assert!(one.allows(1));
        assert!(!one.allows(2));
        assert!(MaxCardinality::parse("0").unwrap().is_zero());
        assert!(MaxCardinality::parse("many").is_err());
    }

    #[test]
    fn test_profile_element_pointer() {
        let ty: ElementDefinitionType = serde_json::from_value(json!({
            "code": "Extension",
            "profile": ["http://example.org/StructureDefinition/foo"],
            "_profile": [{
                "extension": [{
                    "url": PROFILE_ELEMENT_EXTENSION,
                    "valueString": "Extension.extension:bar"
                }]
            }]
        }))
        .unwrap();
        assert_eq!(ty.profile_element(), Some("Extension.extension:bar"));
    }

    #[test]
    fn test_slicing_rules_serde() {
        let slicing = ElementDefinitionSlicing::new(
            SlicingDiscriminator::new("value", "url"),
            SlicingRules::OpenAtEnd,
        );
        let json = serde_json::to_value(&slicing).unwrap();
        assert_eq!(json["rules"], "openAtEnd");
        assert_eq!(json["discriminator"][0]["type"], "value");
    }
}
