//! Parent resolution and StructureDefinition metadata
//!
//! # Algorithm
//!
//! 1. **Resolve the parent**: declared parent or the category default, checked
//!    against self-reference, name conflicts and category compatibility
//! 2. **Clone**: the parent's snapshot becomes the starting element tree
//! 3. **Metadata**: strip what must not be inherited, then set name, id, url,
//!    derivation, kind and type for the entity's category

use super::exporter::{Compilation, StructureDefinitionExporter};
use super::resolve::default_parent;
use crate::error::{ExportError, ExportResult};
use crate::fhir::{
    Derivation, LOGICAL_TARGET_EXTENSION, StructureDefinition, StructureDefinitionKind,
    TYPE_CHARACTERISTICS_EXTENSION,
};
use crate::fsh::{EntityCategory, StructureEntity};
use crate::tree::ElementTree;
use serde_json::json;
use tracing::debug;

/// Extensions that should not be inherited from the parent StructureDefinition
const UNINHERITED_EXTENSIONS: &[&str] = &[
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-fmm",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-fmm-no-warnings",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-hierarchy",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-interface",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-normative-version",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-applicable-version",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-category",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-codegen-super",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-security-category",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-standards-status",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-summary",
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-wg",
    "http://hl7.org/fhir/StructureDefinition/replaces",
    "http://hl7.org/fhir/StructureDefinition/resource-approvalDate",
    "http://hl7.org/fhir/StructureDefinition/resource-effectivePeriod",
    "http://hl7.org/fhir/StructureDefinition/resource-lastReviewDate",
];

/// Top-level fields describing the parent itself rather than its structure
const UNINHERITED_FIELDS: &[&str] = &[
    "meta",
    "text",
    "contained",
    "implicitRules",
    "language",
    "contact",
    "useContext",
    "jurisdiction",
    "purpose",
    "copyright",
    "keyword",
    "date",
    "experimental",
    "identifier",
];

fn strip_inherited(sd: &mut StructureDefinition) {
    if let Some(extensions) = sd.extension.as_mut() {
        extensions.retain(|ext| {
            ext.get("url")
                .and_then(|u| u.as_str())
                .is_none_or(|url| !UNINHERITED_EXTENSIONS.contains(&url))
        });
        if extensions.is_empty() {
            sd.extension = None;
        }
    }
    sd.extra
        .retain(|key, _| !key.starts_with('_') && !UNINHERITED_FIELDS.contains(&key.as_str()));
    sd.version = None;
    sd.title = None;
    sd.description = None;
    sd.publisher = None;
    sd.context = None;
    sd.context_invariant = None;
    sd.snapshot = None;
    sd.differential = None;
}

impl StructureDefinitionExporter {
    /// Resolve the parent of `entity` and set up its compilation
    pub(crate) fn start_compilation(&mut self, entity: &StructureEntity) -> ExportResult<Compilation> {
        let parent_name = self.declared_parent(entity)?;
        let parent = self.resolve_parent(entity, &parent_name)?;
        self.check_parent_category(entity, &parent)?;
        debug!("Parent of {} resolved to {}", entity.name, parent.url);

        let elements = parent.snapshot_elements().to_vec();
        if elements.is_empty() {
            self.diagnostics.warning(
                format!("Parent {} of {} has no snapshot elements", parent_name, entity.name),
                entity.location.as_ref(),
            );
        }
        let sd = self.initial_metadata(entity, &parent);
        let mut comp = Compilation::new(entity, sd, ElementTree::from_elements(elements));

        match entity.category {
            EntityCategory::Logical | EntityCategory::Resource => self.set_up_definition_root(entity, &mut comp),
            EntityCategory::Extension => self.set_up_extension(entity, &mut comp),
            EntityCategory::Profile => {}
        }
        Ok(comp)
    }

    fn declared_parent(&self, entity: &StructureEntity) -> ExportResult<String> {
        match entity.parent.as_deref().map(str::trim) {
            Some("") => Err(ExportError::ParentNotProvided {
                name: entity.name.clone(),
            }),
            Some(parent) => Ok(parent.to_string()),
            None => default_parent(entity.category)
                .map(str::to_string)
                .ok_or_else(|| ExportError::ParentNotProvided {
                    name: entity.name.clone(),
                }),
        }
    }

    fn resolve_parent(
        &mut self,
        entity: &StructureEntity,
        parent_name: &str,
    ) -> ExportResult<StructureDefinition> {
        if parent_name == entity.name {
            return Err(ExportError::ParentDeclaredAsSelf {
                name: entity.name.clone(),
                hint: self.core_definition_hint(parent_name),
            });
        }
        if entity.id.as_deref() == Some(parent_name) {
            return Err(ExportError::ParentDeclaredAsId {
                name: entity.name.clone(),
                id: parent_name.to_string(),
                hint: self.core_definition_hint(parent_name),
            });
        }

        match self.fish_structure(parent_name, &[], None) {
            Some(parent) => Ok(parent),
            None => match self.tank.non_structure_kind(parent_name) {
                Some(kind) => Err(ExportError::ParentNameConflict {
                    name: entity.name.clone(),
                    parent: parent_name.to_string(),
                    kind: kind.to_string(),
                }),
                None => Err(ExportError::ParentNotDefined {
                    name: entity.name.clone(),
                    parent: parent_name.to_string(),
                }),
            },
        }
    }

    fn check_parent_category(
        &mut self,
        entity: &StructureEntity,
        parent: &StructureDefinition,
    ) -> ExportResult<()> {
        let expected = match entity.category {
            EntityCategory::Profile => None,
            EntityCategory::Extension => (parent.type_field != "Extension")
                .then_some("The parent must be Extension or a profile of Extension."),
            EntityCategory::Logical => (parent.is_constraint()
                && parent.kind != StructureDefinitionKind::Logical)
                .then_some(
                    "The parent must be Element, Base, a logical model, a resource or a type.",
                ),
            EntityCategory::Resource => {
                (!matches!(parent.type_field.as_str(), "Resource" | "DomainResource")
                    || parent.is_constraint())
                .then_some("The parent must be Resource or DomainResource.")
            }
        };
        match expected {
            Some(expected) => Err(ExportError::InvalidParentCategory {
                name: entity.name.clone(),
                category: entity.category.to_string(),
                parent: parent.name.clone(),
                expected: expected.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn initial_metadata(
        &mut self,
        entity: &StructureEntity,
        parent: &StructureDefinition,
    ) -> StructureDefinition {
        let mut sd = parent.clone();
        strip_inherited(&mut sd);

        let id = entity.effective_id();
        if entity.id.is_none() && id != entity.name {
            self.diagnostics.warning(
                format!(
                    "The string \"{}\" is not a valid id, using the machine-friendly id \"{}\" instead",
                    entity.name, id
                ),
                entity.location.as_ref(),
            );
        }
        for (field, value) in [("Title", &entity.title), ("Description", &entity.description)] {
            if value.as_deref() == Some("") {
                self.diagnostics.warning(
                    format!("{field} of {} is an empty string", entity.name),
                    entity.location.as_ref(),
                );
            }
        }

        let canonical = self.config.canonical_base().to_string();
        sd.name = entity.name.clone();
        sd.id = Some(id);
        sd.url = entity.declared_url(&canonical);
        sd.title = entity.title.clone().filter(|t| !t.is_empty());
        sd.description = entity.description.clone().filter(|d| !d.is_empty());
        sd.version = self.config.version.clone();
        sd.publisher = self.config.publisher.clone();
        sd.status = self.config.status_or_default().to_string();
        sd.fhir_version = Some(self.config.primary_fhir_version().to_string());
        sd.base_definition = Some(parent.url.clone());
        sd.is_abstract = false;

        match entity.category {
            EntityCategory::Profile => {
                sd.derivation = Some(Derivation::Constraint);
            }
            EntityCategory::Extension => {
                sd.derivation = Some(Derivation::Constraint);
                sd.kind = StructureDefinitionKind::ComplexType;
                sd.type_field = "Extension".to_string();
            }
            EntityCategory::Logical => {
                sd.derivation = Some(if parent.kind == StructureDefinitionKind::Logical {
                    Derivation::Constraint
                } else {
                    Derivation::Specialization
                });
                sd.kind = StructureDefinitionKind::Logical;
                sd.type_field = sd.url.clone();
                self.add_characteristics(entity, &mut sd);
            }
            EntityCategory::Resource => {
                sd.derivation = Some(Derivation::Specialization);
                sd.kind = StructureDefinitionKind::Resource;
                sd.type_field = entity.name.clone();
            }
        }
        sd
    }

    fn add_characteristics(&self, entity: &StructureEntity, sd: &mut StructureDefinition) {
        if entity.characteristics.is_empty() {
            return;
        }
        let extensions = sd.extension.get_or_insert_with(Vec::new);
        for characteristic in &entity.characteristics {
            extensions.push(json!({
                "url": TYPE_CHARACTERISTICS_EXTENSION,
                "valueCode": characteristic,
            }));
            if characteristic == "can-be-target" && self.config.fhir_major() < 5 {
                extensions.push(json!({
                    "url": LOGICAL_TARGET_EXTENSION,
                    "valueBoolean": true,
                }));
            }
        }
    }

    /// Logical models and resources own their element paths
    fn set_up_definition_root(&mut self, entity: &StructureEntity, comp: &mut Compilation) {
        let Some(root) = comp.tree.root() else {
            return;
        };
        let parent_root = comp.tree.get(root).path.clone();
        if parent_root != entity.name {
            comp.tree.rename_root(&parent_root, &entity.name);
        }
        if entity.title.is_none() && entity.description.is_none() {
            return;
        }
        let element = comp.tree.get_mut(root);
        if let Some(title) = entity.title.as_ref().filter(|t| !t.is_empty()) {
            element.short = Some(title.clone());
        }
        if let Some(description) = entity.description.as_ref().filter(|d| !d.is_empty()) {
            element.definition = Some(description.clone());
        }
    }
}
