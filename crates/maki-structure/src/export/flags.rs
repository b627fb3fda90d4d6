//! Flag rules: MS, SU, ?!, TU, N, D

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::{ExportError, ExportResult};
use crate::fhir::STANDARDS_STATUS_EXTENSION;
use crate::fsh::{EntityCategory, FlagRule};
use crate::tree::ElementIdx;
use serde_json::json;
use tracing::trace;

fn standards_status(rule: &FlagRule) -> Result<Option<&'static str>, ()> {
    let statuses: Vec<&'static str> = [
        (rule.trial_use, "trial-use"),
        (rule.normative, "normative"),
        (rule.draft, "draft"),
    ]
    .into_iter()
    .filter_map(|(set, code)| set.then_some(code))
    .collect();
    match statuses.as_slice() {
        [] => Ok(None),
        [status] => Ok(Some(*status)),
        _ => Err(()),
    }
}

impl StructureDefinitionExporter {
    pub(crate) fn apply_flags(&mut self, comp: &mut Compilation, rule: &FlagRule) -> ExportResult<()> {
        let idx = self.find_element(comp, &rule.path)?;
        self.set_flags(comp, idx, rule, false);
        Ok(())
    }

    /// Apply every flag of `rule` to one element, reporting each failure on its own
    pub(crate) fn set_flags(
        &mut self,
        comp: &mut Compilation,
        idx: ElementIdx,
        rule: &FlagRule,
        from_add_element: bool,
    ) {
        let path = comp.tree.get(idx).id.clone();

        if let Some(must_support) = rule.must_support {
            let defines_elements = matches!(comp.category, EntityCategory::Logical | EntityCategory::Resource);
            if must_support && defines_elements && !from_add_element {
                let err = ExportError::InvalidMustSupport {
                    path: path.clone(),
                    category: comp.category.to_string(),
                };
                self.report(comp, err);
            } else if !must_support && comp.tree.get(idx).must_support == Some(true) {
                let err = ExportError::DisableFlag {
                    path: path.clone(),
                    flag: "mustSupport".to_string(),
                };
                self.report(comp, err);
            } else {
                comp.tree.get_mut(idx).must_support = Some(must_support);
            }
        }

        if rule.summary == Some(true) {
            comp.tree.get_mut(idx).is_summary = Some(true);
        }

        if let Some(modifier) = rule.modifier {
            if !modifier && comp.tree.get(idx).is_modifier == Some(true) {
                let err = ExportError::DisableFlag {
                    path: path.clone(),
                    flag: "isModifier".to_string(),
                };
                self.report(comp, err);
            } else {
                comp.tree.get_mut(idx).is_modifier = Some(modifier);
                if modifier {
                    self.cascade_modifier(comp, idx);
                }
            }
        }

        match standards_status(rule) {
            Ok(Some(status)) => set_standards_status(comp, idx, status),
            Ok(None) => {}
            Err(()) => self.report(comp, ExportError::MultipleStandardsStatus { path }),
        }
    }

    /// isModifier reaches the existing slices of a sliced element
    fn cascade_modifier(&mut self, comp: &mut Compilation, idx: ElementIdx) {
        for slice in comp.tree.slices(idx) {
            if comp.tree.get(slice).is_modifier != Some(true) {
                trace!("Cascading isModifier to {}", comp.tree.get(slice).id);
                comp.tree.get_mut(slice).is_modifier = Some(true);
            }
        }
    }
}

/// Replace (or add) the single standards-status extension of an element
fn set_standards_status(comp: &mut Compilation, idx: ElementIdx, status: &str) {
    let entry = json!({"url": STANDARDS_STATUS_EXTENSION, "valueCode": status});
    let extensions = comp.tree.get_mut(idx).extension.get_or_insert_with(Vec::new);
    let existing = extensions
        .iter()
        .position(|ext| ext.get("url").and_then(|u| u.as_str()) == Some(STANDARDS_STATUS_EXTENSION));
    match existing {
        Some(pos) => extensions[pos] = entry,
        None => extensions.push(entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsh::Flag;

    #[test]
    fn test_single_standards_status() {
        let rule = FlagRule::new("code", &[Flag::TrialUse, Flag::MustSupport]);
        assert_eq!(standards_status(&rule), Ok(Some("trial-use")));
    }

    #[test]
    fn test_conflicting_standards_status() {
        let rule = FlagRule::new("code", &[Flag::Normative, Flag::Draft]);
        assert!(standards_status(&rule).is_err());
        assert_eq!(standards_status(&FlagRule::new("code", &[])), Ok(None));
    }
}
