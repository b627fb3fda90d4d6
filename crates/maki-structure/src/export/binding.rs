//! Binding rules (`* code from MyValueSet (extensible)`)

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::{ExportError, ExportResult};
use crate::fhir::{BINDABLE_TYPES, BindingStrength, ElementDefinitionBinding};
use crate::fsh::BindingRule;
use crate::tree::ElementIdx;
use tracing::debug;

/// Whether an element with these type codes can carry a binding
fn is_bindable(codes: &[&str]) -> bool {
    codes.iter().any(|code| BINDABLE_TYPES.contains(code))
}

impl StructureDefinitionExporter {
    pub(crate) fn apply_binding(&mut self, comp: &mut Compilation, rule: &BindingRule) -> ExportResult<()> {
        let idx = self.find_element(comp, &rule.path)?;
        let element = comp.tree.get(idx);
        let path = element.id.clone();

        let codes = element.type_codes();
        if !codes.is_empty() && !is_bindable(&codes) {
            return Err(ExportError::CodedTypeNotFound {
                path,
                value_set: rule.value_set.clone(),
                types: codes.join(", "),
            });
        }

        let value_set = self
            .resolve_value_set(&rule.value_set)
            .ok_or_else(|| ExportError::ValueSetNotFound {
                path: path.clone(),
                value_set: rule.value_set.clone(),
            })?;

        if let Some(current) = element.binding.as_ref()
            && current.strength > rule.strength
        {
            return Err(ExportError::InvalidBindingStrength {
                path,
                current: current.strength.to_string(),
                requested: rule.strength.to_string(),
                value_set: rule.value_set.clone(),
            });
        }

        debug!("Binding {} to {} ({})", path, value_set, rule.strength);
        set_binding(comp, idx, &value_set, rule.strength);

        for slice in comp.tree.slices(idx) {
            let slice_element = comp.tree.get(slice);
            let slice_codes = slice_element.type_codes();
            if !slice_codes.is_empty() && !is_bindable(&slice_codes) {
                continue;
            }
            match slice_element.binding.as_ref() {
                Some(existing) if existing.strength > rule.strength => {
                    let message = format!(
                        "Slice {} keeps its {} binding; the {} binding from {} is weaker",
                        slice_element.id, existing.strength, rule.strength, path
                    );
                    self.warn(comp, message);
                }
                _ => set_binding(comp, slice, &value_set, rule.strength),
            }
        }
        Ok(())
    }
}

fn set_binding(comp: &mut Compilation, idx: ElementIdx, value_set: &str, strength: BindingStrength) {
    let element = comp.tree.get_mut(idx);
    let (description, extension) = element
        .binding
        .take()
        .map(|b| (b.description, b.extension))
        .unwrap_or_default();
    element.binding = Some(ElementDefinitionBinding {
        strength,
        description,
        value_set: Some(value_set.to_string()),
        extension,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindable_types() {
        assert!(is_bindable(&["CodeableConcept"]));
        assert!(is_bindable(&["string", "boolean"]));
        assert!(!is_bindable(&["boolean", "integer"]));
    }
}
