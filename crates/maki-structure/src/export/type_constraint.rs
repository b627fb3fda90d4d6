//! Type rules (`* value[x] only Quantity or string`, `* subject only Reference(Patient)`)
//!
//! Every listed type must narrow one of the element's current types:
//!
//! - a plain type must be, or descend from, a current type code or profile
//! - `Reference(X)`, `Canonical(X)` and `CodeableReference(X)` keep the
//!   wrapper type and narrow its target profiles; X must descend from one of
//!   the current targets unless the targets are open (`Resource`)
//!
//! Types that fail are reported one by one; the rest still apply.

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::{ExportError, ExportResult};
use crate::fhir::{ElementDefinitionType, core_url, upper_first};
use crate::fishing::{FhirType, FishMetadata};
use crate::fsh::{TypeRefKind, TypeReference, TypeRule};
use indexmap::IndexMap;
use tracing::debug;

const TYPE_TARGETS: &[FhirType] = &[
    FhirType::Resource,
    FhirType::Type,
    FhirType::Profile,
    FhirType::Extension,
    FhirType::Logical,
];

/// Union of profile lists, where an unconstrained entry (None) wins
fn union_profiles(a: Option<Vec<String>>, b: Option<Vec<String>>) -> Option<Vec<String>> {
    let (mut a, b) = (a?, b?);
    for profile in b {
        if !a.contains(&profile) {
            a.push(profile);
        }
    }
    Some(a)
}

/// Collapse entries sharing a code into one type
pub(crate) fn merge_types(types: Vec<ElementDefinitionType>) -> Vec<ElementDefinitionType> {
    let mut merged: IndexMap<String, ElementDefinitionType> = IndexMap::new();
    for type_ in types {
        match merged.get_mut(&type_.code) {
            Some(existing) => {
                existing.profile = union_profiles(existing.profile.take(), type_.profile);
                existing.target_profile =
                    union_profiles(existing.target_profile.take(), type_.target_profile);
            }
            None => {
                merged.insert(type_.code.clone(), type_);
            }
        }
    }
    merged.into_values().collect()
}

impl StructureDefinitionExporter {
    pub(crate) fn apply_type_rule(&mut self, comp: &mut Compilation, rule: &TypeRule) -> ExportResult<()> {
        let idx = self.find_element(comp, &rule.path)?;
        let element = comp.tree.get(idx);
        let path = element.id.clone();
        let current = element.types().to_vec();

        let mut constrained = Vec::new();
        for type_ref in &rule.types {
            match self.constrain_type(comp, &path, &current, type_ref) {
                Ok(type_) => constrained.push(type_),
                Err(err) => self.report(comp, err),
            }
        }
        if constrained.is_empty() {
            return Ok(());
        }
        let types = merge_types(constrained);

        self.cascade_types(comp, idx, &types)?;

        let element = comp.tree.get(idx);
        let removed_value = element.assigned_value().and_then(|(_, key, _)| {
            let suffix = element.assigned_type_suffix()?;
            let kept = types.iter().any(|t| upper_first(&t.code) == suffix);
            (!kept).then(|| key.to_string())
        });

        debug!(
            "Constraining {} to {}",
            path,
            types.iter().map(|t| t.code.as_str()).collect::<Vec<_>>().join(", ")
        );
        comp.tree.get_mut(idx).type_ = Some(types);

        if let Some(value_key) = removed_value {
            return Err(ExportError::AssignedValueTypeRemoved { path, value_key });
        }
        Ok(())
    }

    fn constrain_type(
        &mut self,
        comp: &Compilation,
        path: &str,
        current: &[ElementDefinitionType],
        type_ref: &TypeReference,
    ) -> ExportResult<ElementDefinitionType> {
        match type_ref.kind {
            TypeRefKind::Plain => self.constrain_plain_type(comp, path, current, type_ref),
            _ => self.constrain_reference_type(comp, path, current, type_ref),
        }
    }

    /// Full metadata of a type, compiling it first when it is authored locally
    pub(crate) fn type_metadata(&mut self, comp: &Compilation, name: &str) -> Option<FishMetadata> {
        if let Some(sd) = self.fish_structure(name, TYPE_TARGETS, Some(comp)) {
            return Some(FishMetadata::from_structure_definition(&sd));
        }
        self.fish_metadata(name, TYPE_TARGETS)
    }

    fn constrain_plain_type(
        &mut self,
        comp: &Compilation,
        path: &str,
        current: &[ElementDefinitionType],
        type_ref: &TypeReference,
    ) -> ExportResult<ElementDefinitionType> {
        let name = self.dealias(&type_ref.type_name);
        let meta = self
            .type_metadata(comp, &name)
            .ok_or_else(|| ExportError::TypeNotFound {
                path: path.to_string(),
                type_name: type_ref.type_name.clone(),
            })?;
        let ancestry = self.ancestry(&meta);

        let matching = current.iter().find(|type_| {
            let code_url = core_url(&type_.code);
            ancestry.iter().any(|m| {
                m.url.as_deref() == Some(code_url.as_str())
                    || m.url.as_deref() == Some(type_.code.as_str())
                    || (m.derivation.as_deref() != Some("constraint")
                        && m.sd_type.as_deref() == Some(type_.code.as_str()))
                    || m.url.as_ref().is_some_and(|url| type_.profiles().contains(url))
            })
        });
        let Some(matching) = matching else {
            if let Some(entity) = self.is_in_progress(&name) {
                self.warn_incomplete(comp, &entity);
            }
            return Err(ExportError::InvalidTypeConstraint {
                path: path.to_string(),
                type_name: type_ref.type_name.clone(),
                allowed: current
                    .iter()
                    .map(|t| t.code.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        };

        let url = meta.url.clone().unwrap_or_else(|| name.clone());
        if meta.derivation.as_deref() == Some("constraint") {
            let code = self.base_type(&meta).unwrap_or_else(|| matching.code.clone());
            return Ok(ElementDefinitionType::with_profile(code, url));
        }
        let code = meta.sd_type.clone().unwrap_or(name);
        let mut type_ = ElementDefinitionType::new(code);
        if type_.code == matching.code {
            type_.extension = matching.extension.clone();
        }
        Ok(type_)
    }

    fn constrain_reference_type(
        &mut self,
        comp: &Compilation,
        path: &str,
        current: &[ElementDefinitionType],
        type_ref: &TypeReference,
    ) -> ExportResult<ElementDefinitionType> {
        let wrapper = type_ref.wrapper_code().unwrap_or("Reference");
        if type_ref.kind == TypeRefKind::CodeableReference && self.config.fhir_major() < 5 {
            return Err(ExportError::CodeableReferenceUnsupported {
                path: path.to_string(),
            });
        }
        let invalid = || ExportError::InvalidTypeConstraint {
            path: path.to_string(),
            type_name: type_ref.to_string(),
            allowed: current
                .iter()
                .map(|t| t.code.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        };
        let matching = current
            .iter()
            .find(|t| t.code == wrapper)
            .ok_or_else(invalid)?;

        let name = self.dealias(&type_ref.type_name);
        let meta = self
            .fish_metadata(&name, &[])
            .filter(|m| m.resource_type == "StructureDefinition")
            .ok_or_else(|| ExportError::TypeNotFound {
                path: path.to_string(),
                type_name: type_ref.type_name.clone(),
            })?;
        let url = meta.url.clone().unwrap_or_else(|| name.clone());

        let allowed = matching.target_profiles();
        let open = allowed.is_empty() || allowed.contains(&core_url("Resource"));
        if !open {
            let ancestry = self.ancestry(&meta);
            let fits = ancestry
                .iter()
                .any(|m| m.url.as_ref().is_some_and(|u| allowed.contains(u)));
            if !fits {
                match self.is_in_progress(&name) {
                    Some(entity) => self.warn_incomplete(comp, &entity),
                    None => {
                        return Err(ExportError::InvalidReferenceTarget {
                            path: path.to_string(),
                            target: type_ref.type_name.clone(),
                            allowed: allowed.join(", "),
                        });
                    }
                }
            }
        }

        if meta.kind.as_deref() == Some("logical") && !meta.can_be_target {
            self.warn(
                comp,
                format!(
                    "The logical model {} is used as a reference target on {} but does not declare the can-be-target characteristic",
                    type_ref.type_name, path
                ),
            );
        }

        let mut type_ = ElementDefinitionType::with_targets(wrapper, vec![url]);
        type_.aggregation = matching.aggregation.clone();
        type_.versioning = matching.versioning.clone();
        Ok(type_)
    }
}
