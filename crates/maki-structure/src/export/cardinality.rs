//! Cardinality rules (`* subject 1..1`)

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::{ExportError, ExportResult};
use crate::fhir::MaxCardinality;
use crate::fsh::CardinalityRule;
use crate::tree::ElementIdx;
use tracing::trace;

fn display(min: u32, max: MaxCardinality) -> String {
    format!("{min}..{max}")
}

impl StructureDefinitionExporter {
    pub(crate) fn apply_cardinality(&mut self, comp: &mut Compilation, rule: &CardinalityRule) -> ExportResult<()> {
        let idx = self.find_element(comp, &rule.path)?;
        self.constrain_cardinality(comp, idx, rule.min, rule.max.as_deref())
    }

    /// Narrow the cardinality of an element; either bound may be left unchanged
    pub(crate) fn constrain_cardinality(
        &mut self,
        comp: &mut Compilation,
        idx: ElementIdx,
        min: Option<u32>,
        max: Option<&str>,
    ) -> ExportResult<()> {
        let element = comp.tree.get(idx);
        let path = element.id.clone();

        let current_min = element.min.unwrap_or(0);
        let current_max = element.max_cardinality().unwrap_or(MaxCardinality::Unbounded);
        let new_max = match max {
            Some(value) => MaxCardinality::parse(value).map_err(|source| {
                ExportError::InvalidMaxCardinality {
                    path: path.clone(),
                    value: value.to_string(),
                    source,
                }
            })?,
            None => current_max,
        };
        let new_min = min.unwrap_or(current_min);
        let requested = display(new_min, new_max);

        if !new_max.allows(new_min) {
            return Err(ExportError::InvalidCardinality { path, requested });
        }
        if new_min < current_min || new_max > current_max {
            return Err(ExportError::NarrowedCardinality {
                path,
                current: display(current_min, current_max),
                requested,
            });
        }

        if element.is_slice() {
            if let Some(root) = comp.tree.sliced_element(idx) {
                let root_element = comp.tree.get(root);
                let root_max = root_element
                    .max_cardinality()
                    .unwrap_or(MaxCardinality::Unbounded);
                if new_max > root_max {
                    return Err(ExportError::SliceCardinalityOutOfBounds {
                        path,
                        requested,
                        root_card: root_element.cardinality_display(),
                    });
                }
            }
        } else if max.is_some() {
            self.check_slices_fit(comp, idx, &path, &requested, new_max)?;
        }

        trace!("Setting cardinality of {} to {}", path, requested);
        let element = comp.tree.get_mut(idx);
        if min.is_some() {
            element.min = Some(new_min);
        }
        if max.is_some() {
            element.max = Some(new_max.to_string());
        }
        Ok(())
    }

    /// A sliced element's max must leave room for its slices
    fn check_slices_fit(
        &self,
        comp: &Compilation,
        idx: ElementIdx,
        path: &str,
        requested: &str,
        new_max: MaxCardinality,
    ) -> ExportResult<()> {
        let slices = comp.tree.slices(idx);
        let mut required = 0u32;
        for slice in slices {
            let element = comp.tree.get(slice);
            let slice_max = element.max_cardinality().unwrap_or(MaxCardinality::Unbounded);
            if slice_max > new_max {
                return Err(ExportError::SlicedCardinalityConflict {
                    path: path.to_string(),
                    requested: requested.to_string(),
                    slice: element.slice_name.clone().unwrap_or_default(),
                    slice_card: element.cardinality_display(),
                });
            }
            required = required.saturating_add(element.min.unwrap_or(0));
            if !new_max.allows(required) {
                return Err(ExportError::SlicedCardinalityConflict {
                    path: path.to_string(),
                    requested: requested.to_string(),
                    slice: element.slice_name.clone().unwrap_or_default(),
                    slice_card: format!("{required} required repetitions"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(display(0, MaxCardinality::Unbounded), "0..*");
        assert_eq!(display(1, MaxCardinality::Bounded(1)), "1..1");
    }
}
