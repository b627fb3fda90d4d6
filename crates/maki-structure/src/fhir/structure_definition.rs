//! StructureDefinition model

use super::element::ElementDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// FHIR StructureDefinition resource
///
/// Represents a profile, extension, logical model or resource definition.
/// Fields the compiler never inspects are kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinition {
    /// Resource type (always "StructureDefinition")
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<Vec<Value>>,

    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// draft | active | retired | unknown
    #[serde(default = "default_status")]
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fhir_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Vec<StructureDefinitionMapping>>,

    /// primitive-type | complex-type | resource | logical
    pub kind: StructureDefinitionKind,

    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,

    /// Extension context (extensions only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<StructureDefinitionContext>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_invariant: Option<Vec<String>>,

    /// Type defined or constrained by this structure
    #[serde(rename = "type")]
    pub type_field: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_definition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<Derivation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<StructureDefinitionSnapshot>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub differential: Option<StructureDefinitionDifferential>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_status() -> String {
    "draft".to_string()
}

/// Kind of structure definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureDefinitionKind {
    PrimitiveType,
    ComplexType,
    Resource,
    Logical,
}

/// specialization | constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Derivation {
    Specialization,
    Constraint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StructureDefinitionSnapshot {
    pub element: Vec<ElementDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StructureDefinitionDifferential {
    pub element: Vec<ElementDefinition>,
}

/// Declared mapping to another specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructureDefinitionMapping {
    pub identity: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Context where an extension can be used
///
/// See: <https://www.hl7.org/fhir/extensibility.html#context>
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinitionContext {
    /// element | extension | fhirpath
    #[serde(rename = "type")]
    pub type_: String,

    pub expression: String,
}

impl StructureDefinitionContext {
    pub fn new(type_: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            expression: expression.into(),
        }
    }

    pub fn element(expression: impl Into<String>) -> Self {
        Self::new("element", expression)
    }

    pub fn extension(expression: impl Into<String>) -> Self {
        Self::new("extension", expression)
    }

    pub fn fhirpath(expression: impl Into<String>) -> Self {
        Self::new("fhirpath", expression)
    }
}

impl StructureDefinition {
    /// Create a new StructureDefinition with required fields
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        type_field: impl Into<String>,
        kind: StructureDefinitionKind,
    ) -> Self {
        Self {
            resource_type: "StructureDefinition".to_string(),
            id: None,
            extension: None,
            url: url.into(),
            version: None,
            name: name.into(),
            title: None,
            status: default_status(),
            publisher: None,
            description: None,
            fhir_version: None,
            mapping: None,
            kind,
            is_abstract: false,
            context: None,
            context_invariant: None,
            type_field: type_field.into(),
            base_definition: None,
            derivation: None,
            snapshot: None,
            differential: None,
            extra: Map::new(),
        }
    }

    /// Deserialize from JSON, filling in missing element ids from their paths
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        let mut sd: StructureDefinition = serde_json::from_value(value)?;
        for view in [
            sd.snapshot.as_mut().map(|s| &mut s.element),
            sd.differential.as_mut().map(|d| &mut d.element),
        ]
        .into_iter()
        .flatten()
        {
            for element in view.iter_mut() {
                if element.id.is_empty() {
                    element.id = element.path.clone();
                }
            }
        }
        Ok(sd)
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn snapshot_elements(&self) -> &[ElementDefinition] {
        self.snapshot
            .as_ref()
            .map(|s| s.element.as_slice())
            .unwrap_or(&[])
    }

    pub fn differential_elements(&self) -> &[ElementDefinition] {
        self.differential
            .as_ref()
            .map(|d| d.element.as_slice())
            .unwrap_or(&[])
    }

    /// Find a snapshot element by id
    pub fn find_element(&self, id: &str) -> Option<&ElementDefinition> {
        self.snapshot_elements().iter().find(|e| e.id == id)
    }

    /// Find a differential element by id
    pub fn find_differential(&self, id: &str) -> Option<&ElementDefinition> {
        self.differential_elements().iter().find(|e| e.id == id)
    }

    pub fn root_element(&self) -> Option<&ElementDefinition> {
        self.snapshot_elements().first()
    }

    pub fn is_constraint(&self) -> bool {
        self.derivation == Some(Derivation::Constraint)
    }

    /// The id, falling back to the name for definitions without one
    pub fn id_or_name(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    pub fn extension_values(&self, url: &str) -> impl Iterator<Item = &Value> {
        self.extension
            .iter()
            .flatten()
            .filter(move |ext| ext.get("url").and_then(Value::as_str) == Some(url))
    }
}
