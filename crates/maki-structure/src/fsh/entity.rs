//! FSH entities and the tank that holds them
//!
//! The tank is the in-memory collection of every definition authored in the
//! project. Structure entities are compiled into StructureDefinitions; value
//! sets, code systems, instances and invariants are only looked up.

use super::invariant::Invariant;
use super::rules::Rule;
use super::value::FshValue;
use crate::diagnostics::SourceLocation;
use crate::fhir::naming::machine_id;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// Which kind of StructureDefinition an entity compiles into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    Profile,
    Extension,
    Logical,
    Resource,
}

impl EntityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Profile => "Profile",
            EntityCategory::Extension => "Extension",
            EntityCategory::Logical => "Logical",
            EntityCategory::Resource => "Resource",
        }
    }

    /// Logical models and resources define new elements
    pub fn defines_elements(&self) -> bool {
        matches!(self, EntityCategory::Logical | EntityCategory::Resource)
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule together with where it was written
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedRule {
    pub rule: Rule,
    pub location: Option<SourceLocation>,
}

/// A Profile, Extension, Logical or Resource declaration
#[derive(Debug, Clone, PartialEq)]
pub struct StructureEntity {
    pub category: EntityCategory,
    pub name: String,
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Declared parent (name, id or URL); None uses the category default
    pub parent: Option<String>,
    /// Extension contexts as written (`Observation.code`, `"%resource"`, ...)
    pub contexts: Vec<String>,
    /// Logical model characteristics (`can-be-target`, ...)
    pub characteristics: Vec<String>,
    pub rules: Vec<SourcedRule>,
    pub location: Option<SourceLocation>,
}

impl StructureEntity {
    pub fn new(category: EntityCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            id: None,
            title: None,
            description: None,
            parent: None,
            contexts: Vec::new(),
            characteristics: Vec::new(),
            rules: Vec::new(),
            location: None,
        }
    }

    pub fn profile(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::new(EntityCategory::Profile, name).with_parent(parent)
    }

    pub fn extension(name: impl Into<String>) -> Self {
        Self::new(EntityCategory::Extension, name)
    }

    pub fn logical(name: impl Into<String>) -> Self {
        Self::new(EntityCategory::Logical, name)
    }

    pub fn resource(name: impl Into<String>) -> Self {
        Self::new(EntityCategory::Resource, name)
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.contexts.push(context.into());
        self
    }

    pub fn with_characteristic(mut self, characteristic: impl Into<String>) -> Self {
        self.characteristics.push(characteristic.into());
        self
    }

    pub fn located(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(SourcedRule {
            rule,
            location: None,
        });
        self
    }

    pub fn rule_at(mut self, rule: Rule, location: SourceLocation) -> Self {
        self.rules.push(SourcedRule {
            rule,
            location: Some(location),
        });
        self
    }

    /// The declared id, or the name made safe for use as an id
    pub fn effective_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => machine_id(&self.name),
        }
    }

    /// URL the compiled definition will have, honoring a `^url` caret rule
    pub fn declared_url(&self, canonical_base: &str) -> String {
        let overridden = self.rules.iter().rev().find_map(|sourced| match &sourced.rule {
            Rule::CaretValue(caret) if caret.path.is_none() && caret.caret_path == "url" => {
                match &caret.value {
                    FshValue::String(url) => Some(url.clone()),
                    _ => None,
                }
            }
            _ => None,
        });
        overridden.unwrap_or_else(|| {
            format!(
                "{}/StructureDefinition/{}",
                canonical_base,
                self.effective_id()
            )
        })
    }
}

/// A value set authored in the project (only its identity matters here)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FshValueSet {
    pub name: String,
    pub id: Option<String>,
    /// Author-overridden canonical URL
    pub url: Option<String>,
}

impl FshValueSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn canonical_url(&self, canonical_base: &str) -> String {
        self.url.clone().unwrap_or_else(|| {
            format!(
                "{}/ValueSet/{}",
                canonical_base,
                self.id.clone().unwrap_or_else(|| machine_id(&self.name))
            )
        })
    }
}

/// A code system authored in the project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FshCodeSystem {
    pub name: String,
    pub id: Option<String>,
    pub url: Option<String>,
    /// Codes defined by the system
    pub concepts: Vec<String>,
    /// `CodeSystem.content`; None means complete
    pub content: Option<String>,
}

impl FshCodeSystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            url: None,
            concepts: Vec::new(),
            content: None,
        }
    }

    pub fn with_concepts(mut self, codes: &[&str]) -> Self {
        self.concepts = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Only complete code systems are checked for code membership
    pub fn is_complete(&self) -> bool {
        self.content.as_deref().is_none_or(|content| content == "complete")
    }

    pub fn canonical_url(&self, canonical_base: &str) -> String {
        self.url.clone().unwrap_or_else(|| {
            format!(
                "{}/CodeSystem/{}",
                canonical_base,
                self.id.clone().unwrap_or_else(|| machine_id(&self.name))
            )
        })
    }
}

/// An instance authored in the project
#[derive(Debug, Clone, PartialEq)]
pub struct FshInstance {
    pub name: String,
    pub id: Option<String>,
    /// Resource type, profile name or URL the instance conforms to
    pub instance_of: String,
    /// Example | Definition | Inline
    pub usage: Option<String>,
    /// Exported JSON body, used when the instance itself is assigned
    pub content: Option<Value>,
}

impl FshInstance {
    pub fn new(name: impl Into<String>, instance_of: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            instance_of: instance_of.into(),
            usage: None,
            content: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn effective_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| machine_id(&self.name))
    }

    pub fn is_inline(&self) -> bool {
        self.usage.as_deref() == Some("Inline")
    }
}

/// FSH Tank - in-memory collection of authored definitions
#[derive(Debug, Clone, Default)]
pub struct FshTank {
    structures: IndexMap<String, StructureEntity>,
    value_sets: IndexMap<String, FshValueSet>,
    code_systems: IndexMap<String, FshCodeSystem>,
    instances: IndexMap<String, FshInstance>,
    invariants: IndexMap<String, Invariant>,
    aliases: IndexMap<String, String>,
}

impl FshTank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_structure(&mut self, entity: StructureEntity) {
        self.structures.insert(entity.name.clone(), entity);
    }

    pub fn add_value_set(&mut self, value_set: FshValueSet) {
        self.value_sets.insert(value_set.name.clone(), value_set);
    }

    pub fn add_code_system(&mut self, code_system: FshCodeSystem) {
        self.code_systems
            .insert(code_system.name.clone(), code_system);
    }

    pub fn add_instance(&mut self, instance: FshInstance) {
        self.instances.insert(instance.name.clone(), instance);
    }

    pub fn add_invariant(&mut self, invariant: Invariant) {
        self.invariants.insert(invariant.name.clone(), invariant);
    }

    pub fn add_alias(&mut self, alias: impl Into<String>, url: impl Into<String>) {
        self.aliases.insert(alias.into(), url.into());
    }

    /// Structure entities in authored order
    pub fn structures(&self) -> impl Iterator<Item = &StructureEntity> {
        self.structures.values()
    }

    pub fn structure(&self, name: &str) -> Option<&StructureEntity> {
        self.structures.get(name)
    }

    /// Find a structure entity by name, id or canonical URL
    pub fn find_structure(&self, item: &str, canonical_base: &str) -> Option<&StructureEntity> {
        self.structures.get(item).or_else(|| {
            self.structures.values().find(|entity| {
                entity.id.as_deref() == Some(item)
                    || entity.effective_id() == item
                    || entity.declared_url(canonical_base) == item
            })
        })
    }

    pub fn find_value_set(&self, item: &str, canonical_base: &str) -> Option<&FshValueSet> {
        self.value_sets.get(item).or_else(|| {
            self.value_sets.values().find(|vs| {
                vs.id.as_deref() == Some(item) || vs.canonical_url(canonical_base) == item
            })
        })
    }

    pub fn find_code_system(&self, item: &str, canonical_base: &str) -> Option<&FshCodeSystem> {
        self.code_systems.get(item).or_else(|| {
            self.code_systems.values().find(|cs| {
                cs.id.as_deref() == Some(item) || cs.canonical_url(canonical_base) == item
            })
        })
    }

    pub fn find_instance(&self, item: &str) -> Option<&FshInstance> {
        self.instances
            .get(item)
            .or_else(|| self.instances.values().find(|i| i.effective_id() == item))
    }

    pub fn invariant(&self, name: &str) -> Option<&Invariant> {
        self.invariants.get(name)
    }

    pub fn resolve_alias(&self, item: &str) -> Option<&str> {
        self.aliases.get(item).map(String::as_str)
    }

    /// Kind of a non-StructureDefinition entity declared under `name`
    pub fn non_structure_kind(&self, name: &str) -> Option<&'static str> {
        if self.structures.contains_key(name) {
            None
        } else if self.value_sets.contains_key(name) {
            Some("ValueSet")
        } else if self.code_systems.contains_key(name) {
            Some("CodeSystem")
        } else if self.instances.contains_key(name) {
            Some("Instance")
        } else if self.invariants.contains_key(name) {
            Some("Invariant")
        } else {
            None
        }
    }
}
