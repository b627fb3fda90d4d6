//! Fishing - FHIR definition lookup
//!
//! Definitions are found in three tiers, in priority order:
//! 1. **Package** - StructureDefinitions already compiled in this run
//! 2. **Tank** - FSH entities not yet compiled (compiled on demand by the exporter)
//! 3. **External** - core and dependency definitions behind the [`Fishable`] trait
//!
//! The exporter coordinates the tiers; this module provides the building blocks.

use crate::fhir::{Derivation, StructureDefinition, StructureDefinitionKind};
use crate::fsh::EntityCategory;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use tracing::trace;

/// FHIR definition filter for fishing operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FhirType {
    /// StructureDefinition (any kind)
    StructureDefinition,
    /// Resource definition (kind=resource, not a constraint)
    Resource,
    /// Primitive or complex datatype (not a constraint)
    Type,
    /// Constraint on anything other than Extension
    Profile,
    /// Constraint on Extension
    Extension,
    /// Logical model
    Logical,
    ValueSet,
    CodeSystem,
    /// Any resource instance that is not a definition
    Instance,
    Any,
}

impl FhirType {
    /// Check if a definition matches this filter
    pub fn matches(&self, meta: &FishMetadata) -> bool {
        let is_sd = meta.resource_type == "StructureDefinition";
        let constraint = meta.derivation.as_deref() == Some("constraint");
        match self {
            FhirType::Any => true,
            FhirType::StructureDefinition => is_sd,
            FhirType::Resource => is_sd && meta.kind.as_deref() == Some("resource") && !constraint,
            FhirType::Type => {
                is_sd
                    && matches!(
                        meta.kind.as_deref(),
                        Some("primitive-type") | Some("complex-type")
                    )
                    && !constraint
            }
            FhirType::Profile => {
                is_sd && constraint && meta.sd_type.as_deref() != Some("Extension")
            }
            FhirType::Extension => {
                is_sd && constraint && meta.sd_type.as_deref() == Some("Extension")
            }
            FhirType::Logical => is_sd && meta.kind.as_deref() == Some("logical"),
            FhirType::ValueSet => meta.resource_type == "ValueSet",
            FhirType::CodeSystem => meta.resource_type == "CodeSystem",
            FhirType::Instance => !matches!(
                meta.resource_type.as_str(),
                "StructureDefinition" | "ValueSet" | "CodeSystem"
            ),
        }
    }

    /// Types a locally authored entity of this category can satisfy
    pub fn for_category(category: EntityCategory) -> FhirType {
        match category {
            EntityCategory::Profile => FhirType::Profile,
            EntityCategory::Extension => FhirType::Extension,
            EntityCategory::Logical => FhirType::Logical,
            EntityCategory::Resource => FhirType::Resource,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FhirType::StructureDefinition => "StructureDefinition",
            FhirType::Resource => "Resource",
            FhirType::Type => "Type",
            FhirType::Profile => "Profile",
            FhirType::Extension => "Extension",
            FhirType::Logical => "Logical",
            FhirType::ValueSet => "ValueSet",
            FhirType::CodeSystem => "CodeSystem",
            FhirType::Instance => "Instance",
            FhirType::Any => "Any",
        }
    }
}

/// Matches when the filter list is empty or any filter matches
pub fn matches_any(types: &[FhirType], meta: &FishMetadata) -> bool {
    types.is_empty() || types.iter().any(|t| t.matches(meta))
}

/// Lightweight metadata for lookups without loading full definitions
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FishMetadata {
    pub id: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub version: Option<String>,
    /// resourceType of the definition (StructureDefinition, ValueSet, ...)
    pub resource_type: String,
    /// StructureDefinition.type
    pub sd_type: Option<String>,
    pub kind: Option<String>,
    pub derivation: Option<String>,
    /// baseDefinition URL, or the declared parent for uncompiled entities
    pub parent: Option<String>,
    pub is_abstract: bool,
    /// Logical model declared as a valid reference target
    pub can_be_target: bool,
    /// Instance usage (Example, Definition, Inline)
    pub instance_usage: Option<String>,
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn declares_can_be_target(extensions: &[Value]) -> bool {
    extensions.iter().any(|ext| {
        let url = ext.get("url").and_then(Value::as_str);
        (url == Some(crate::fhir::TYPE_CHARACTERISTICS_EXTENSION)
            && ext.get("valueCode").and_then(Value::as_str) == Some("can-be-target"))
            || (url == Some(crate::fhir::LOGICAL_TARGET_EXTENSION)
                && ext.get("valueBoolean").and_then(Value::as_bool) == Some(true))
    })
}

impl FishMetadata {
    pub fn from_json(value: &Value) -> Self {
        let extensions = value
            .get("extension")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Self {
            id: str_field(value, "id"),
            name: str_field(value, "name"),
            url: str_field(value, "url"),
            version: str_field(value, "version"),
            resource_type: str_field(value, "resourceType").unwrap_or_default(),
            sd_type: str_field(value, "type"),
            kind: str_field(value, "kind"),
            derivation: str_field(value, "derivation"),
            parent: str_field(value, "baseDefinition"),
            is_abstract: value
                .get("abstract")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            can_be_target: declares_can_be_target(extensions),
            instance_usage: None,
        }
    }

    pub fn from_structure_definition(sd: &StructureDefinition) -> Self {
        let kind = match sd.kind {
            StructureDefinitionKind::PrimitiveType => "primitive-type",
            StructureDefinitionKind::ComplexType => "complex-type",
            StructureDefinitionKind::Resource => "resource",
            StructureDefinitionKind::Logical => "logical",
        };
        let derivation = sd.derivation.map(|d| match d {
            Derivation::Constraint => "constraint".to_string(),
            Derivation::Specialization => "specialization".to_string(),
        });
        Self {
            id: sd.id.clone(),
            name: Some(sd.name.clone()),
            url: Some(sd.url.clone()),
            version: sd.version.clone(),
            resource_type: "StructureDefinition".to_string(),
            sd_type: Some(sd.type_field.clone()),
            kind: Some(kind.to_string()),
            derivation,
            parent: sd.base_definition.clone(),
            is_abstract: sd.is_abstract,
            can_be_target: declares_can_be_target(sd.extension.as_deref().unwrap_or(&[])),
            instance_usage: None,
        }
    }

    /// Whether `item` names this definition by URL, id or name
    pub fn is_named(&self, item: &str) -> bool {
        let item = strip_version(item);
        self.url.as_deref() == Some(item)
            || self.id.as_deref() == Some(item)
            || self.name.as_deref() == Some(item)
    }
}

/// `http://x/StructureDefinition/y|1.0` -> `http://x/StructureDefinition/y`
pub fn strip_version(item: &str) -> &str {
    item.split('|').next().unwrap_or(item)
}

/// Lookup interface for definitions the compiler does not produce itself
pub trait Fishable: Send + Sync {
    /// Find a definition by URL, id or name
    fn fish_for_fhir(&self, item: &str, types: &[FhirType]) -> Option<Value>;

    /// Find only the metadata of a definition
    fn fish_for_metadata(&self, item: &str, types: &[FhirType]) -> Option<FishMetadata> {
        self.fish_for_fhir(item, types)
            .map(|json| FishMetadata::from_json(&json))
    }
}

/// In-memory index of external FHIR definitions (core plus dependencies)
#[derive(Debug, Default, Clone)]
pub struct DefinitionIndex {
    resources: Vec<(FishMetadata, Value)>,
    by_url: HashMap<String, Vec<usize>>,
    by_id: HashMap<String, Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
}

impl DefinitionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_resources(resources: impl IntoIterator<Item = Value>) -> Self {
        let mut index = Self::new();
        for resource in resources {
            index.add(resource);
        }
        index
    }

    pub fn add(&mut self, resource: Value) {
        let meta = FishMetadata::from_json(&resource);
        let position = self.resources.len();
        if let Some(url) = &meta.url {
            self.by_url.entry(url.clone()).or_default().push(position);
        }
        if let Some(id) = &meta.id {
            self.by_id.entry(id.clone()).or_default().push(position);
        }
        if let Some(name) = &meta.name {
            self.by_name.entry(name.clone()).or_default().push(position);
        }
        self.resources.push((meta, resource));
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn find(&self, item: &str, types: &[FhirType]) -> Option<&(FishMetadata, Value)> {
        let item = strip_version(item);
        [&self.by_url, &self.by_id, &self.by_name]
            .into_iter()
            .filter_map(|index| index.get(item))
            .flatten()
            .map(|&position| &self.resources[position])
            .find(|(meta, _)| matches_any(types, meta))
    }
}

impl Fishable for DefinitionIndex {
    fn fish_for_fhir(&self, item: &str, types: &[FhirType]) -> Option<Value> {
        trace!("Fishing external definitions for {} ({:?})", item, types);
        self.find(item, types).map(|(_, json)| json.clone())
    }

    fn fish_for_metadata(&self, item: &str, types: &[FhirType]) -> Option<FishMetadata> {
        self.find(item, types).map(|(meta, _)| meta.clone())
    }
}

/// Package - StructureDefinitions produced by this run
///
/// Also holds read-only partial views of entities whose compilation is
/// still in progress, so that entities in a dependency cycle can see each
/// other.
#[derive(Debug, Default, Clone)]
pub struct Package {
    pub profiles: Vec<StructureDefinition>,
    pub extensions: Vec<StructureDefinition>,
    pub logicals: Vec<StructureDefinition>,
    pub resources: Vec<StructureDefinition>,
    partials: IndexMap<String, StructureDefinition>,
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, category: EntityCategory, sd: StructureDefinition) {
        match category {
            EntityCategory::Profile => self.profiles.push(sd),
            EntityCategory::Extension => self.extensions.push(sd),
            EntityCategory::Logical => self.logicals.push(sd),
            EntityCategory::Resource => self.resources.push(sd),
        }
    }

    /// All compiled definitions, profiles first
    pub fn structure_definitions(&self) -> impl Iterator<Item = &StructureDefinition> {
        self.profiles
            .iter()
            .chain(self.extensions.iter())
            .chain(self.logicals.iter())
            .chain(self.resources.iter())
    }

    pub fn len(&self) -> usize {
        self.structure_definitions().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a compiled definition by URL, id or name
    pub fn fish(&self, item: &str, types: &[FhirType]) -> Option<&StructureDefinition> {
        let item = strip_version(item);
        self.structure_definitions().find(|sd| {
            (sd.url == item || sd.id.as_deref() == Some(item) || sd.name == item)
                && matches_any(types, &FishMetadata::from_structure_definition(sd))
        })
    }

    pub fn find_by_name(&self, name: &str) -> Option<&StructureDefinition> {
        self.structure_definitions().find(|sd| sd.name == name)
    }

    pub fn count_with_id(&self, id: &str) -> usize {
        self.structure_definitions()
            .filter(|sd| sd.id.as_deref() == Some(id))
            .count()
    }

    pub fn publish_partial(&mut self, entity_name: &str, sd: StructureDefinition) {
        self.partials.insert(entity_name.to_string(), sd);
    }

    pub fn partial(&self, entity_name: &str) -> Option<&StructureDefinition> {
        self.partials.get(entity_name)
    }

    pub fn remove_partial(&mut self, entity_name: &str) {
        self.partials.shift_remove(entity_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient_sd() -> Value {
        json!({
            "resourceType": "StructureDefinition",
            "id": "Patient",
            "url": "http://hl7.org/fhir/StructureDefinition/Patient",
            "name": "Patient",
            "kind": "resource",
            "abstract": false,
            "type": "Patient",
            "baseDefinition": "http://hl7.org/fhir/StructureDefinition/DomainResource",
            "derivation": "specialization"
        })
    }

    #[test]
    fn test_type_filters() {
        let meta = FishMetadata::from_json(&patient_sd());
        assert!(FhirType::Resource.matches(&meta));
        assert!(!FhirType::Profile.matches(&meta));
        assert!(!FhirType::Type.matches(&meta));
        assert!(FhirType::StructureDefinition.matches(&meta));
        assert!(!FhirType::Instance.matches(&meta));
    }

    #[test]
    fn test_index_lookup_by_url_id_and_name() {
        let index = DefinitionIndex::from_resources([patient_sd()]);
        assert!(
            index
                .fish_for_fhir("http://hl7.org/fhir/StructureDefinition/Patient|4.0.1", &[])
                .is_some()
        );
        assert!(index.fish_for_fhir("Patient", &[FhirType::Resource]).is_some());
        assert!(index.fish_for_fhir("Patient", &[FhirType::Profile]).is_none());
        assert_eq!(
            index
                .fish_for_metadata("Patient", &[])
                .and_then(|m| m.parent),
            Some("http://hl7.org/fhir/StructureDefinition/DomainResource".to_string())
        );
    }

    #[test]
    fn test_can_be_target_detection() {
        let meta = FishMetadata::from_json(&json!({
            "resourceType": "StructureDefinition",
            "kind": "logical",
            "extension": [{
                "url": crate::fhir::TYPE_CHARACTERISTICS_EXTENSION,
                "valueCode": "can-be-target"
            }]
        }));
        assert!(meta.can_be_target);
        assert!(FhirType::Logical.matches(&meta));
    }

    #[test]
    fn test_package_partials() {
        let mut package = Package::new();
        let sd = StructureDefinition::from_json(patient_sd()).unwrap();
        package.publish_partial("Foo", sd.clone());
        assert!(package.partial("Foo").is_some());
        assert!(package.fish("Patient", &[]).is_none());

        package.remove_partial("Foo");
        package.add(EntityCategory::Resource, sd);
        assert!(package.partial("Foo").is_none());
        assert_eq!(package.count_with_id("Patient"), 1);
        assert!(package.fish("Patient", &[FhirType::Resource]).is_some());
    }
}
