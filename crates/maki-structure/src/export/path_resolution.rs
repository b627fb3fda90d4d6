//! FSH path resolution against the element tree
//!
//! Resolving `component[systolic].value[x].code` walks the tree one segment
//! at a time. Children that are only implied by an element's type are
//! unfolded on demand:
//!
//! - a `profile-element` pointer copies the children of the pointed element
//! - a `contentReference` copies the children of the referenced element
//! - a slice copies the children of the element it was cut from
//! - otherwise the children come from the element's type (profile first,
//!   then its ancestors, then the type code)
//!
//! Type-choice shortcuts (`valueQuantity`) address `value[x]` directly when
//! it only allows that type, or a type slice of it otherwise.

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::{ExportError, ExportResult};
use crate::fhir::{
    ElementDefinition, ElementDefinitionSlicing, ElementDefinitionType, StructureDefinition,
    SlicingDiscriminator, SlicingRules, upper_first,
};
use crate::fishing::FhirType;
use crate::tree::{Bracket, ElementIdx, parse_path, slice_id};
use std::collections::HashSet;
use tracing::{debug, trace};

/// Copy the descendants of `from_id` so they hang below `to_id`/`to_path`
fn rebase(
    elements: &[ElementDefinition],
    from_id: &str,
    from_path: &str,
    to_id: &str,
    to_path: &str,
) -> Vec<ElementDefinition> {
    elements
        .iter()
        .filter_map(|element| {
            let id_rest = element.id.strip_prefix(from_id)?;
            if !id_rest.starts_with('.') {
                return None;
            }
            let path_rest = element.path.strip_prefix(from_path)?;
            let mut copy = element.clone();
            copy.id = format!("{to_id}{id_rest}");
            copy.path = format!("{to_path}{path_rest}");
            Some(copy)
        })
        .collect()
}

/// Whether an element with children of `sd` has a child matching `name`
fn defines_child(sd: &StructureDefinition, name: &str) -> bool {
    let Some(root) = sd.root_element() else {
        return false;
    };
    sd.snapshot_elements().iter().any(|element| {
        let Some(rest) = element.id.strip_prefix(&root.id).and_then(|r| r.strip_prefix('.')) else {
            return false;
        };
        if rest.contains('.') || rest.contains(':') {
            return false;
        }
        rest == name
            || rest
                .strip_suffix("[x]")
                .is_some_and(|stem| name.starts_with(stem) && name.len() > stem.len())
    })
}

impl StructureDefinitionExporter {
    /// Resolve a FSH path to an element, unfolding and creating type slices as needed
    pub(crate) fn find_element(&mut self, comp: &mut Compilation, path: &str) -> ExportResult<ElementIdx> {
        if path.is_empty() || path == "." {
            return comp.tree.root().ok_or_else(|| ExportError::path_not_found(path, &comp.name));
        }
        let not_found = || ExportError::path_not_found(path, &comp.name);
        let segments = parse_path(path).map_err(|_| not_found())?;
        let mut current = comp.tree.root().ok_or_else(not_found)?;

        for segment in &segments {
            current = self
                .find_child(comp, current, &segment.base)
                .ok_or_else(|| ExportError::path_not_found(path, &comp.name))?;
            for bracket in &segment.brackets {
                if let Bracket::Slice(name) = bracket {
                    current = self
                        .find_slice(comp, current, name)
                        .ok_or_else(|| ExportError::path_not_found(path, &comp.name))?;
                }
            }
        }

        let id = comp.tree.get(current).id.clone();
        trace!("Resolved {} to {}", path, id);
        comp.rule_targets.insert(id);
        Ok(current)
    }

    fn find_child(&mut self, comp: &mut Compilation, parent: ElementIdx, name: &str) -> Option<ElementIdx> {
        let child_id = format!("{}.{}", comp.tree.get(parent).id, name);
        if let Some(child) = comp.tree.find(&child_id) {
            return Some(child);
        }
        if !comp.tree.has_children(parent) && self.unfold(comp, parent, name) {
            if let Some(child) = comp.tree.find(&child_id) {
                return Some(child);
            }
        }
        self.find_choice_shortcut(comp, parent, name)
    }

    /// `valueQuantity` -> `value[x]` (single type) or `value[x]:valueQuantity`
    fn find_choice_shortcut(
        &mut self,
        comp: &mut Compilation,
        parent: ElementIdx,
        name: &str,
    ) -> Option<ElementIdx> {
        for child in comp.tree.children(parent) {
            let element = comp.tree.get(child);
            let Some(stem) = element.name().strip_suffix("[x]") else {
                continue;
            };
            let Some(suffix) = name.strip_prefix(stem).filter(|s| !s.is_empty()) else {
                continue;
            };
            let Some(matching) = element
                .types()
                .iter()
                .find(|t| upper_first(&t.code) == suffix)
                .cloned()
            else {
                continue;
            };

            if element.types().len() == 1 {
                return Some(child);
            }
            let existing = slice_id(&element.id, name);
            if let Some(slice) = comp.tree.find(&existing) {
                return Some(slice);
            }
            return Some(self.create_type_slice(comp, child, name, matching));
        }
        None
    }

    fn create_type_slice(
        &mut self,
        comp: &mut Compilation,
        choice: ElementIdx,
        name: &str,
        type_: ElementDefinitionType,
    ) -> ElementIdx {
        if comp.tree.get(choice).slicing.is_none() {
            comp.tree.get_mut(choice).slicing = Some(ElementDefinitionSlicing::new(
                SlicingDiscriminator::new("type", "$this"),
                SlicingRules::Open,
            ));
        }

        let base = comp.tree.get(choice).clone();
        let mut slice = base.clone();
        slice.id = slice_id(&base.id, name);
        slice.slice_name = Some(name.to_string());
        slice.slicing = None;
        slice.min = Some(0);
        slice.type_ = Some(vec![type_]);
        slice.clear_assigned_value();

        let mut shell = slice.clone();
        shell.type_ = base.type_.clone();
        shell.slice_name = None;
        shell.min = None;
        shell.max = None;

        debug!("Creating type slice {}", slice.id);
        let anchor = comp.tree.subtree_end(choice);
        comp.tree.insert_created(anchor, slice, shell)
    }

    fn find_slice(&mut self, comp: &mut Compilation, element: ElementIdx, name: &str) -> Option<ElementIdx> {
        let id = slice_id(&comp.tree.get(element).id, name);
        if let Some(slice) = comp.tree.find(&id) {
            return Some(slice);
        }
        if !comp.tree.get(element).is_extension_array() {
            return None;
        }

        let target = self.dealias(name);
        let meta = self.fish_metadata(&target, &[FhirType::Extension])?;
        let url = meta.url.clone()?;
        let existing = comp.tree.slices(element).into_iter().find(|&slice| {
            comp.tree
                .get(slice)
                .types()
                .iter()
                .any(|t| t.profiles().iter().any(|p| p == &url))
        });
        if existing.is_some() {
            return existing;
        }

        let slice_name = if target != name || target.contains("://") {
            meta.id.clone().unwrap_or_else(|| name.to_string())
        } else {
            name.to_string()
        };
        debug!("Creating implied extension slice {} for {}", slice_name, url);
        self.create_extension_slice(comp, element, &slice_name, &url).ok()
    }

    /// Materialize the implied children of `idx`; true when anything was added
    pub(crate) fn unfold(&mut self, comp: &mut Compilation, idx: ElementIdx, hint: &str) -> bool {
        if comp.tree.has_children(idx) {
            return false;
        }
        let element = comp.tree.get(idx).clone();
        let children = self.implied_children(comp, idx, &element, hint);
        if children.is_empty() {
            return false;
        }
        trace!("Unfolded {} children under {}", children.len(), element.id);
        comp.tree.insert_all_after(idx, children);
        true
    }

    fn implied_children(
        &mut self,
        comp: &Compilation,
        idx: ElementIdx,
        element: &ElementDefinition,
        hint: &str,
    ) -> Vec<ElementDefinition> {
        if let [type_] = element.types()
            && let Some(target) = type_.profile_element()
            && let Some(profile) = type_.profiles().first()
            && let Some(sd) = self.fish_structure(profile, &[], Some(comp))
            && let Some(source) = sd.find_element(target)
        {
            return rebase(
                sd.snapshot_elements(),
                &source.id,
                &source.path,
                &element.id,
                &element.path,
            );
        }

        if let Some(reference) = element.content_reference.as_deref() {
            let target = reference
                .rsplit_once('#')
                .map(|(_, path)| path)
                .unwrap_or(reference);
            let Some(source) = comp.tree.find(target) else {
                return Vec::new();
            };
            let source_element = comp.tree.get(source);
            let descendants: Vec<ElementDefinition> = comp
                .tree
                .descendants(source)
                .into_iter()
                .map(|d| comp.tree.get(d).clone())
                .filter(|d| !d.id[source_element.id.len()..].contains(':'))
                .collect();
            return rebase(
                &descendants,
                &source_element.id,
                &source_element.path,
                &element.id,
                &element.path,
            );
        }

        if let Some(base) = comp.tree.sliced_element(idx)
            && comp.tree.has_children(base)
            && comp.tree.get(base).type_ == element.type_
        {
            let base_element = comp.tree.get(base);
            let descendants: Vec<ElementDefinition> = comp
                .tree
                .descendants(base)
                .into_iter()
                .map(|d| comp.tree.get(d).clone())
                .collect();
            return rebase(
                &descendants,
                &base_element.id,
                &base_element.path,
                &element.id,
                &element.path,
            );
        }

        for type_ in element.types() {
            let Some(sd) = self.structure_for_type(comp, type_) else {
                continue;
            };
            if element.types().len() > 1 && !defines_child(&sd, hint) {
                continue;
            }
            let Some(root) = sd.root_element() else {
                continue;
            };
            return rebase(
                sd.snapshot_elements(),
                &root.id,
                &root.path,
                &element.id,
                &element.path,
            );
        }
        Vec::new()
    }

    /// Definition whose snapshot describes the shape of `type_`
    fn structure_for_type(
        &mut self,
        comp: &Compilation,
        type_: &ElementDefinitionType,
    ) -> Option<StructureDefinition> {
        let mut candidates: Vec<String> = Vec::new();
        if let [profile] = type_.profiles() {
            candidates.push(profile.clone());
        }
        candidates.push(type_.code.clone());

        let mut seen = HashSet::new();
        for candidate in candidates {
            let mut next = Some(candidate);
            while let Some(item) = next.take() {
                if !seen.insert(item.clone()) {
                    break;
                }
                let Some(sd) = self.fish_structure(&item, &[], Some(comp)) else {
                    break;
                };
                if sd.snapshot_elements().len() > 1 {
                    return Some(sd);
                }
                next = sd.base_definition.clone();
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rebase_moves_ids_and_paths() {
        let mut value = ElementDefinition::new("Quantity.value");
        value.min = Some(0);
        let elements = vec![
            ElementDefinition::new("Quantity"),
            value,
            ElementDefinition::new("Quantity.code"),
        ];
        let rebased = rebase(
            &elements,
            "Quantity",
            "Quantity",
            "Observation.value[x]:valueQuantity",
            "Observation.value[x]",
        );
        assert_eq!(rebased.len(), 2);
        assert_eq!(rebased[0].id, "Observation.value[x]:valueQuantity.value");
        assert_eq!(rebased[0].path, "Observation.value[x].value");
        assert_eq!(rebased[0].min, Some(0));
    }

    #[test]
    fn test_defines_child_handles_choices() {
        let sd = StructureDefinition::from_json(json!({
            "resourceType": "StructureDefinition",
            "url": "http://hl7.org/fhir/StructureDefinition/Extension",
            "name": "Extension",
            "kind": "complex-type",
            "type": "Extension",
            "snapshot": {"element": [
                {"path": "Extension"},
                {"path": "Extension.url"},
                {"path": "Extension.value[x]"}
            ]}
        }))
        .unwrap();
        assert!(defines_child(&sd, "url"));
        assert!(defines_child(&sd, "valueString"));
        assert!(!defines_child(&sd, "code"));
    }
}
