//! ElementDefinition model
//!
//! Only the fields the compiler reasons about are typed. Everything else
//! (fixed[x], pattern[x], example, alias, condition, ...) is carried in
//! `extra` so that definitions round-trip without loss.

use super::types::{
    ElementDefinitionBase, ElementDefinitionBinding, ElementDefinitionConstraint,
    ElementDefinitionMapping, ElementDefinitionSlicing, ElementDefinitionType, MaxCardinality,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Definition of an element in a resource or data type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    /// Unique id within the StructureDefinition (filled from path when absent)
    #[serde(default)]
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<Vec<Value>>,

    #[serde(default)]
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slicing: Option<ElementDefinitionSlicing>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,

    /// Maximum cardinality ("*" for unbounded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<ElementDefinitionBase>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_reference: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Vec<ElementDefinitionType>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Vec<ElementDefinitionConstraint>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub must_support: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_modifier: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_modifier_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_summary: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<ElementDefinitionBinding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Vec<ElementDefinitionMapping>>,

    /// fixed[x], pattern[x] and every other untyped field
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Whether a value is assigned exactly (`fixed[x]`) or as a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentKind {
    Fixed,
    Pattern,
}

impl AssignmentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            AssignmentKind::Fixed => "fixed",
            AssignmentKind::Pattern => "pattern",
        }
    }
}

fn is_choice_key(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// `dateTime` -> `DateTime`, used to build fixed[x]/value[x] keys
pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

impl ElementDefinition {
    /// Create a new ElementDefinition whose id equals its path
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: path.clone(),
            path,
            ..Default::default()
        }
    }

    /// Last segment of the path, e.g. `value[x]` for `Observation.value[x]`
    pub fn name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    pub fn types(&self) -> &[ElementDefinitionType] {
        self.type_.as_deref().unwrap_or(&[])
    }

    pub fn type_codes(&self) -> Vec<&str> {
        self.types().iter().map(|t| t.code.as_str()).collect()
    }

    pub fn is_choice(&self) -> bool {
        self.path.ends_with("[x]")
    }

    pub fn is_slice(&self) -> bool {
        self.slice_name.is_some()
    }

    pub fn max_cardinality(&self) -> Option<MaxCardinality> {
        self.max
            .as_deref()
            .and_then(|max| MaxCardinality::parse(max).ok())
    }

    /// Max > 1 or unbounded
    pub fn is_array(&self) -> bool {
        matches!(
            self.max_cardinality(),
            Some(MaxCardinality::Unbounded) | Some(MaxCardinality::Bounded(2..))
        ) || self
            .base
            .as_ref()
            .is_some_and(|base| base.max == "*" || base.max.parse::<u32>().is_ok_and(|m| m > 1))
    }

    pub fn is_extension_array(&self) -> bool {
        matches!(self.name(), "extension" | "modifierExtension")
    }

    pub fn cardinality_display(&self) -> String {
        format!(
            "{}..{}",
            self.min.map(|m| m.to_string()).unwrap_or_default(),
            self.max.clone().unwrap_or_default()
        )
    }

    /// The assigned `fixed[x]`/`pattern[x]` entry, if any
    pub fn assigned_value(&self) -> Option<(AssignmentKind, &str, &Value)> {
        self.extra.iter().find_map(|(key, value)| {
            if is_choice_key(key, "fixed") {
                Some((AssignmentKind::Fixed, key.as_str(), value))
            } else if is_choice_key(key, "pattern") {
                Some((AssignmentKind::Pattern, key.as_str(), value))
            } else {
                None
            }
        })
    }

    /// Set `fixed<Type>` or `pattern<Type>`, replacing any earlier assignment
    pub fn set_assigned_value(&mut self, kind: AssignmentKind, type_code: &str, value: Value) {
        self.clear_assigned_value();
        let key = format!("{}{}", kind.prefix(), upper_first(type_code));
        self.extra.insert(key, value);
    }

    pub fn clear_assigned_value(&mut self) {
        self.extra
            .retain(|key, _| !is_choice_key(key, "fixed") && !is_choice_key(key, "pattern"));
    }

    /// Suffix of the fixed/pattern key, e.g. `Quantity` for `patternQuantity`
    pub fn assigned_type_suffix(&self) -> Option<String> {
        self.assigned_value()
            .map(|(kind, key, _)| key[kind.prefix().len()..].to_string())
    }

    pub fn has_constraint(&self, key: &str) -> bool {
        self.constraint
            .as_ref()
            .is_some_and(|constraints| constraints.iter().any(|c| c.key == key))
    }

    /// Clone of this element as if nothing about it had been authored yet
    pub fn blank_copy(&self) -> Self {
        Self {
            id: self.id.clone(),
            path: self.path.clone(),
            ..Default::default()
        }
    }
}
