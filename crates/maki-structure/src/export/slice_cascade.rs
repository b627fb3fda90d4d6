//! Cascading constraints from a sliced element into its existing slices
//!
//! Type narrowing on the sliced element is intersected into every slice.
//! A choice type slice left without types is dropped when nothing authored
//! touched it; any other empty intersection rejects the rule. Cascades only
//! go down: slices never push constraints back to the sliced element or to
//! their siblings.

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::{ExportError, ExportResult};
use crate::fhir::ElementDefinitionType;
use crate::tree::ElementIdx;
use tracing::debug;

/// Slice types that survive narrowing to `allowed`
fn intersect_types(
    slice_types: &[ElementDefinitionType],
    allowed: &[ElementDefinitionType],
) -> Vec<ElementDefinitionType> {
    slice_types
        .iter()
        .filter_map(|slice_type| {
            let narrowed = allowed.iter().find(|t| t.code == slice_type.code)?;
            let mut kept = slice_type.clone();
            if kept.profile.is_none() {
                kept.profile = narrowed.profile.clone();
            }
            if kept.target_profile.is_none() {
                kept.target_profile = narrowed.target_profile.clone();
            }
            Some(kept)
        })
        .collect()
}

fn codes(types: &[ElementDefinitionType]) -> String {
    types
        .iter()
        .map(|t| t.code.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

enum SliceUpdate {
    Narrow(ElementIdx, Vec<ElementDefinitionType>),
    Remove(ElementIdx),
}

impl StructureDefinitionExporter {
    /// Push a new type list of `idx` into its slices; nothing changes on conflict
    pub(crate) fn cascade_types(
        &mut self,
        comp: &mut Compilation,
        idx: ElementIdx,
        types: &[ElementDefinitionType],
    ) -> ExportResult<()> {
        let is_choice = comp.tree.get(idx).is_choice();
        let mut updates = Vec::new();

        for slice in comp.tree.slices(idx) {
            let element = comp.tree.get(slice);
            if element.types().is_empty() {
                continue;
            }
            let narrowed = intersect_types(element.types(), types);
            if narrowed.is_empty() {
                if is_choice && !comp.has_rules_at_or_below(&element.id) {
                    updates.push(SliceUpdate::Remove(slice));
                    continue;
                }
                return Err(ExportError::SliceTypeConflict {
                    path: comp.tree.get(idx).id.clone(),
                    types: codes(types),
                    slice: element.slice_name.clone().unwrap_or_else(|| element.id.clone()),
                    slice_types: codes(element.types()),
                });
            }
            if narrowed.as_slice() != element.types() {
                updates.push(SliceUpdate::Narrow(slice, narrowed));
            }
        }

        for update in updates {
            match update {
                SliceUpdate::Narrow(slice, narrowed) => {
                    comp.tree.get_mut(slice).type_ = Some(narrowed);
                }
                SliceUpdate::Remove(slice) => {
                    debug!("Removing type slice {}", comp.tree.get(slice).id);
                    comp.tree.remove_subtree(slice);
                }
            }
        }
        Ok(())
    }
}
