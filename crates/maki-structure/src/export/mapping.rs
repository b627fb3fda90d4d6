//! Mapping rules (`* status -> "FiveWs.status"`)
//!
//! Each rule adds an element mapping under its identity and makes sure the
//! identity is declared once on the StructureDefinition.

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::ExportResult;
use crate::fhir::{ElementDefinitionMapping, StructureDefinitionMapping};
use crate::fsh::MappingRule;
use tracing::trace;

impl StructureDefinitionExporter {
    pub(crate) fn apply_mapping(&mut self, comp: &mut Compilation, rule: &MappingRule) -> ExportResult<()> {
        let idx = self.find_element(comp, rule.path.as_deref().unwrap_or("."))?;

        let mapping = ElementDefinitionMapping {
            identity: rule.identity.clone(),
            language: rule.language.clone(),
            map: rule.map.clone(),
            comment: rule.comment.clone(),
        };
        let element = comp.tree.get_mut(idx);
        let mappings = element.mapping.get_or_insert_with(Vec::new);
        if !mappings.contains(&mapping) {
            trace!("Mapping {} to {} ({})", element.id, rule.map, rule.identity);
            mappings.push(mapping);
        }

        let declared = comp.sd.mapping.get_or_insert_with(Vec::new);
        match declared.iter_mut().find(|m| m.identity == rule.identity) {
            Some(existing) => {
                if existing.uri.is_none() {
                    existing.uri = rule.uri.clone();
                }
                if existing.name.is_none() {
                    existing.name = rule.name.clone();
                }
            }
            None => declared.push(StructureDefinitionMapping {
                identity: rule.identity.clone(),
                uri: rule.uri.clone(),
                name: rule.name.clone(),
                comment: None,
            }),
        }
        Ok(())
    }
}
