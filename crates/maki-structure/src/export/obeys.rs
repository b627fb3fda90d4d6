//! Obeys rules (`* obeys inv-1`, `* name obeys inv-2`)

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::{ExportError, ExportResult};
use crate::fsh::ObeysRule;
use std::sync::Arc;
use tracing::debug;

impl StructureDefinitionExporter {
    pub(crate) fn apply_obeys(&mut self, comp: &mut Compilation, rule: &ObeysRule) -> ExportResult<()> {
        let tank = Arc::clone(&self.tank);
        let path = rule.path.as_deref().unwrap_or(".");
        let invariant = tank
            .invariant(&rule.invariant)
            .ok_or_else(|| ExportError::InvariantNotFound {
                path: path.to_string(),
                name: rule.invariant.clone(),
            })?;
        let idx = self.find_element(comp, path)?;

        if comp.tree.get(idx).has_constraint(&invariant.name) {
            debug!("{} already obeys {}", comp.tree.get(idx).id, invariant.name);
            return Ok(());
        }
        let constraint = invariant.to_constraint(&comp.sd.url);
        comp.tree
            .get_mut(idx)
            .constraint
            .get_or_insert_with(Vec::new)
            .push(constraint);
        Ok(())
    }
}
