//! Three-tier fishing for the exporter
//!
//! Lookups go to the package first, then to the tank (compiling the entity on
//! demand), then to the external definitions. Tank entities block external
//! lookup of the same name: a local `Observation` profile named like a core
//! resource shadows the core resource.

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::fhir::{StructureDefinition, core_url};
use crate::fishing::{FhirType, FishMetadata, matches_any, strip_version};
use crate::fsh::{EntityCategory, StructureEntity};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Common FSH code system aliases mapped to canonical URLs
const CODE_SYSTEM_ALIASES: &[(&str, &str)] = &[
    ("LNC", "http://loinc.org"),
    ("LOINC", "http://loinc.org"),
    ("SCT", "http://snomed.info/sct"),
    ("SNOMED", "http://snomed.info/sct"),
    ("ICD10CM", "http://hl7.org/fhir/sid/icd-10-cm"),
    ("ICD10", "http://hl7.org/fhir/sid/icd-10"),
    ("UCUM", "http://unitsofmeasure.org"),
    ("RXNORM", "http://www.nlm.nih.gov/research/umls/rxnorm"),
    ("CPT", "http://www.ama-assn.org/go/cpt"),
    ("CVX", "http://hl7.org/fhir/sid/cvx"),
    ("HGNC", "http://www.genenames.org"),
    ("HGVS", "http://varnomen.hgvs.org"),
    ("ISO3166", "urn:iso:std:iso:3166"),
    ("NUCC", "http://nucc.org/provider-taxonomy"),
    ("NDC", "http://hl7.org/fhir/sid/ndc"),
];

fn resolve_code_system_alias(alias: &str) -> Option<&'static str> {
    CODE_SYSTEM_ALIASES
        .iter()
        .find(|(name, _)| *name == alias)
        .map(|(_, url)| *url)
}

/// Looks like an absolute URI (`http://...`, `urn:...`)
pub(crate) fn is_uri(item: &str) -> bool {
    item.contains("://") || item.starts_with("urn:")
}

/// Parent used when an entity declares none
pub(crate) fn default_parent(category: EntityCategory) -> Option<&'static str> {
    match category {
        EntityCategory::Profile => None,
        EntityCategory::Extension => Some("Extension"),
        EntityCategory::Logical => Some("Base"),
        EntityCategory::Resource => Some("DomainResource"),
    }
}

fn category_matches(category: EntityCategory, types: &[FhirType]) -> bool {
    types.is_empty()
        || types.iter().any(|t| {
            matches!(t, FhirType::Any | FhirType::StructureDefinition)
                || *t == FhirType::for_category(category)
        })
}

/// A code system resolved for a coded value
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedSystem {
    pub url: String,
    /// Codes of a complete code system; None when membership cannot be checked
    pub concepts: Option<Vec<String>>,
}

fn concept_codes(concepts: &[Value], out: &mut Vec<String>) {
    for concept in concepts {
        if let Some(code) = concept.get("code").and_then(Value::as_str) {
            out.push(code.to_string());
        }
        if let Some(nested) = concept.get("concept").and_then(Value::as_array) {
            concept_codes(nested, out);
        }
    }
}

impl StructureDefinitionExporter {
    /// Resolve an alias to its URL, leaving other items untouched
    pub(crate) fn dealias(&self, item: &str) -> String {
        self.tank.resolve_alias(item).unwrap_or(item).to_string()
    }

    /// Find a full StructureDefinition, compiling tank entities on demand
    ///
    /// `from` is the compilation asking. A request for an entity that is
    /// still being compiled returns its partial view; when there is none
    /// yet the requester is warned that it may be incomplete.
    pub(crate) fn fish_structure(
        &mut self,
        item: &str,
        types: &[FhirType],
        from: Option<&Compilation>,
    ) -> Option<StructureDefinition> {
        let item = self.dealias(item);
        let item = strip_version(&item);
        trace!("Fishing for StructureDefinition {} ({:?})", item, types);

        if let Some(sd) = self.package.fish(item, types) {
            return Some(sd.clone());
        }

        if let Some(from) = from
            && (from.name == item || from.sd.url == item || from.sd.id.as_deref() == Some(item))
        {
            return Some(from.view());
        }

        let tank = Arc::clone(&self.tank);
        if let Some(entity) = tank.find_structure(item, self.config.canonical_base())
            && category_matches(entity.category, types)
        {
            return self.fish_tank_structure(entity, from);
        }

        self.fish_external_structure(item, types)
    }

    fn fish_tank_structure(
        &mut self,
        entity: &StructureEntity,
        from: Option<&Compilation>,
    ) -> Option<StructureDefinition> {
        if let Some(from) = from {
            self.cycles.record(&from.name, &entity.name);
        }

        if self.cycles.is_in_progress(&entity.name) {
            let partial = self.package.partial(&entity.name).cloned();
            if let Some(from) = from {
                self.diagnostics.debug(
                    format!(
                        "Circular dependency: {} requires {}, which is still being compiled",
                        from.name, entity.name
                    ),
                    from.location.as_ref(),
                );
                if partial.is_none() {
                    self.warn_incomplete(from, &entity.name);
                }
            }
            return partial;
        }

        if let Some(from) = from {
            self.package.publish_partial(&from.name, from.view());
        }
        self.export_entity(&entity.name);
        self.package.find_by_name(&entity.name).cloned()
    }

    fn fish_external_structure(
        &mut self,
        item: &str,
        types: &[FhirType],
    ) -> Option<StructureDefinition> {
        let json = self.definitions.fish_for_fhir(item, types)?;
        if json.get("resourceType").and_then(Value::as_str) != Some("StructureDefinition") {
            return None;
        }
        match StructureDefinition::from_json(json) {
            Ok(sd) => Some(sd),
            Err(source) => {
                debug!("Failed to read definition {}: {}", item, source);
                self.diagnostics.debug(
                    crate::error::ExportError::MalformedDefinition {
                        name: item.to_string(),
                        source,
                    }
                    .to_string(),
                    None,
                );
                None
            }
        }
    }

    /// Metadata of a tank entity that has not been compiled
    pub(crate) fn entity_metadata(&self, entity: &StructureEntity) -> FishMetadata {
        let url = entity.declared_url(self.config.canonical_base());
        let (sd_type, kind, derivation) = match entity.category {
            EntityCategory::Profile => (None, None, "constraint"),
            EntityCategory::Extension => {
                (Some("Extension".to_string()), Some("complex-type"), "constraint")
            }
            EntityCategory::Logical => (Some(url.clone()), Some("logical"), "specialization"),
            EntityCategory::Resource => {
                (Some(entity.name.clone()), Some("resource"), "specialization")
            }
        };
        FishMetadata {
            id: Some(entity.effective_id()),
            name: Some(entity.name.clone()),
            url: Some(url),
            version: self.config.version.clone(),
            resource_type: "StructureDefinition".to_string(),
            sd_type,
            kind: kind.map(str::to_string),
            derivation: Some(derivation.to_string()),
            parent: entity
                .parent
                .clone()
                .or_else(|| default_parent(entity.category).map(str::to_string)),
            is_abstract: false,
            can_be_target: entity.characteristics.iter().any(|c| c == "can-be-target"),
            instance_usage: None,
        }
    }

    /// Find metadata without compiling anything
    pub(crate) fn fish_metadata(&mut self, item: &str, types: &[FhirType]) -> Option<FishMetadata> {
        let item = self.dealias(item);
        let item = strip_version(&item);

        if let Some(sd) = self.package.fish(item, types) {
            return Some(FishMetadata::from_structure_definition(sd));
        }

        let canonical = self.config.canonical_base().to_string();
        let tank = Arc::clone(&self.tank);
        if let Some(entity) = tank.find_structure(item, &canonical) {
            if let Some(sd) = self.package.partial(&entity.name) {
                let meta = FishMetadata::from_structure_definition(sd);
                if matches_any(types, &meta) {
                    return Some(meta);
                }
            }
            let meta = self.entity_metadata(entity);
            if matches_any(types, &meta) {
                return Some(meta);
            }
        }
        if let Some(vs) = tank.find_value_set(item, &canonical) {
            let meta = FishMetadata {
                id: vs.id.clone(),
                name: Some(vs.name.clone()),
                url: Some(vs.canonical_url(&canonical)),
                resource_type: "ValueSet".to_string(),
                ..Default::default()
            };
            if matches_any(types, &meta) {
                return Some(meta);
            }
        }
        if let Some(cs) = tank.find_code_system(item, &canonical) {
            let meta = FishMetadata {
                id: cs.id.clone(),
                name: Some(cs.name.clone()),
                url: Some(cs.canonical_url(&canonical)),
                resource_type: "CodeSystem".to_string(),
                ..Default::default()
            };
            if matches_any(types, &meta) {
                return Some(meta);
            }
        }
        if let Some(instance) = tank.find_instance(item) {
            let resource_type = self
                .instance_resource_type(&instance.instance_of)
                .unwrap_or_else(|| instance.instance_of.clone());
            let meta = FishMetadata {
                id: Some(instance.effective_id()),
                name: Some(instance.name.clone()),
                url: instance
                    .content
                    .as_ref()
                    .and_then(|c| c.get("url"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                resource_type,
                instance_usage: instance.usage.clone(),
                ..Default::default()
            };
            if matches_any(types, &meta) {
                return Some(meta);
            }
        }

        self.definitions.fish_for_metadata(item, types)
    }

    /// The metadata chain from `meta` up through its ancestors
    pub(crate) fn ancestry(&mut self, meta: &FishMetadata) -> Vec<FishMetadata> {
        let mut chain = vec![meta.clone()];
        let mut seen: HashSet<String> = meta.url.iter().cloned().collect();
        let mut current = meta.clone();
        while let Some(parent) = current.parent.clone() {
            let Some(next) = self.fish_metadata(&parent, &[]) else {
                break;
            };
            if !seen.insert(next.url.clone().unwrap_or_default()) {
                break;
            }
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    /// The type a definition ultimately specializes (profiles resolve to their base type)
    pub(crate) fn base_type(&mut self, meta: &FishMetadata) -> Option<String> {
        self.ancestry(meta)
            .into_iter()
            .find(|m| m.derivation.as_deref() != Some("constraint") && m.sd_type.is_some())
            .and_then(|m| m.sd_type)
    }

    /// Resource type produced by instances of `instance_of`
    pub(crate) fn instance_resource_type(&mut self, instance_of: &str) -> Option<String> {
        let meta = self.fish_metadata(
            instance_of,
            &[
                FhirType::Resource,
                FhirType::Profile,
                FhirType::Logical,
                FhirType::Type,
            ],
        )?;
        if meta.kind.as_deref() == Some("logical") {
            return meta.sd_type.or(meta.url);
        }
        self.base_type(&meta)
    }

    /// Canonical URL of a value set named by name, id, alias or URL
    pub(crate) fn resolve_value_set(&self, item: &str) -> Option<String> {
        let item = self.dealias(item);
        if let Some(vs) = self.tank.find_value_set(&item, self.config.canonical_base()) {
            return Some(vs.canonical_url(self.config.canonical_base()));
        }
        if let Some(url) = self
            .definitions
            .fish_for_metadata(&item, &[FhirType::ValueSet])
            .and_then(|meta| meta.url)
        {
            return Some(url);
        }
        is_uri(&item).then_some(item)
    }

    /// Resolve a code system by alias, tank name/id/URL, external definition or well-known alias
    pub(crate) fn resolve_code_system(&self, system: &str) -> ResolvedSystem {
        let canonical = self.config.canonical_base();
        let system = self.dealias(system);
        if let Some(cs) = self.tank.find_code_system(&system, canonical) {
            return ResolvedSystem {
                url: cs.canonical_url(canonical),
                concepts: cs.is_complete().then(|| cs.concepts.clone()),
            };
        }
        if let Some(json) = self
            .definitions
            .fish_for_fhir(&system, &[FhirType::CodeSystem])
        {
            let url = json
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or(&system)
                .to_string();
            let complete = json.get("content").and_then(Value::as_str) == Some("complete");
            let concepts = complete.then(|| {
                let mut codes = Vec::new();
                if let Some(concepts) = json.get("concept").and_then(Value::as_array) {
                    concept_codes(concepts, &mut codes);
                }
                codes
            });
            return ResolvedSystem { url, concepts };
        }
        let url = resolve_code_system_alias(&system)
            .map(str::to_string)
            .unwrap_or(system);
        ResolvedSystem {
            url,
            concepts: None,
        }
    }

    /// Whether `item` names a tank entity that is still being compiled
    pub(crate) fn is_in_progress(&self, item: &str) -> Option<String> {
        let item = self.dealias(item);
        self.tank
            .find_structure(strip_version(&item), self.config.canonical_base())
            .filter(|entity| self.cycles.is_in_progress(&entity.name))
            .map(|entity| entity.name.clone())
    }

    pub(crate) fn warn_incomplete(&mut self, comp: &Compilation, entity: &str) {
        self.warn(
            comp,
            format!(
                "The definition of {} may be incomplete because there is a circular dependency with {}",
                comp.name, entity
            ),
        );
    }

    /// Help text appended to self-parent errors when the name is also a core definition
    pub(crate) fn core_definition_hint(&self, name: &str) -> String {
        match self
            .definitions
            .fish_for_metadata(name, &[FhirType::Resource, FhirType::Type])
        {
            Some(meta) => format!(
                " If you are attempting to constrain the FHIR definition {name}, use its URL ({}) as the Parent.",
                meta.url.unwrap_or_else(|| core_url(name))
            ),
            None => String::new(),
        }
    }
}
