//! Contains rules: slice creation
//!
//! ```fsh
//! * component contains systolic 1..1 and diastolic 1..1
//! * extension contains PatientBirthPlace named birthPlace 0..1 MS
//! ```

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::{ExportError, ExportResult};
use crate::fhir::{
    AssignmentKind, ElementDefinitionSlicing, ElementDefinitionType, SlicingDiscriminator,
    SlicingRules,
};
use crate::fishing::FhirType;
use crate::fsh::{ContainsItem, ContainsRule, EntityCategory, FlagRule};
use crate::tree::{ElementIdx, slice_id};
use serde_json::Value;
use tracing::debug;

impl StructureDefinitionExporter {
    pub(crate) fn apply_contains(&mut self, comp: &mut Compilation, rule: &ContainsRule) -> ExportResult<()> {
        let idx = self.find_element(comp, &rule.path)?;
        let element = comp.tree.get(idx);
        let is_extension_array = element.is_extension_array();

        if element.slicing.is_none() {
            if is_extension_array {
                self.ensure_extension_slicing(comp, idx);
            } else {
                return Err(ExportError::SlicingNotDefined {
                    path: element.id.clone(),
                    slice: rule
                        .items
                        .first()
                        .map(|item| item.name.clone())
                        .unwrap_or_default(),
                });
            }
        }

        for item in &rule.items {
            if let Err(err) = self.add_contains_item(comp, idx, item, is_extension_array) {
                self.report(comp, err);
            }
        }
        Ok(())
    }

    /// Default slicing for extension arrays: by `url` value, open
    pub(crate) fn ensure_extension_slicing(&mut self, comp: &mut Compilation, idx: ElementIdx) {
        if comp.tree.get(idx).slicing.is_some() {
            return;
        }
        debug!("Adding default url slicing to {}", comp.tree.get(idx).id);
        comp.tree.get_mut(idx).slicing = Some(ElementDefinitionSlicing::new(
            SlicingDiscriminator::new("value", "url"),
            SlicingRules::Open,
        ));
    }

    fn add_contains_item(
        &mut self,
        comp: &mut Compilation,
        idx: ElementIdx,
        item: &ContainsItem,
        is_extension_array: bool,
    ) -> ExportResult<()> {
        let root_id = comp.tree.get(idx).id.clone();

        let extension_url = if is_extension_array {
            self.resolve_slice_extension(comp, idx, item)?
        } else if let Some(type_name) = &item.type_name {
            return Err(ExportError::InvalidExtensionSlice {
                path: root_id,
                slice: item.name.clone(),
                reason: format!(
                    "{type_name} can only be used to slice extension or modifierExtension"
                ),
            });
        } else {
            None
        };

        if let Some(existing) = comp.tree.find(&slice_id(&root_id, &item.name)) {
            let existing_url = comp
                .tree
                .get(existing)
                .types()
                .first()
                .and_then(|t| t.profiles().first().cloned());
            if extension_url.is_some() && existing_url == extension_url {
                self.warn(
                    comp,
                    format!(
                        "Slice {} on {} already exists for the same extension; ignoring the duplicate declaration",
                        item.name, root_id
                    ),
                );
                return Ok(());
            }
            return Err(ExportError::DuplicateSliceName {
                path: root_id,
                slice: item.name.clone(),
            });
        }

        let types = extension_url
            .as_ref()
            .map(|url| vec![ElementDefinitionType::with_profile("Extension", url.clone())]);
        let slice = self.create_slice(comp, idx, &item.name, types);

        if is_extension_array && extension_url.is_none() {
            self.fix_inline_extension_url(comp, slice, &item.name);
        }

        if item.min.is_some() || item.max.is_some() {
            if let Err(err) = self.constrain_cardinality(comp, slice, item.min, item.max.as_deref()) {
                self.report(comp, err);
            }
        }
        if !item.flags.is_empty() {
            let flags = FlagRule::new(comp.tree.get(slice).id.clone(), &item.flags);
            self.set_flags(comp, slice, &flags, false);
        }
        Ok(())
    }

    /// URL of the extension a slice is typed with; None for inline extensions
    fn resolve_slice_extension(
        &mut self,
        comp: &mut Compilation,
        idx: ElementIdx,
        item: &ContainsItem,
    ) -> ExportResult<Option<String>> {
        let root_id = comp.tree.get(idx).id.clone();
        let lookup = item.type_name.as_deref().unwrap_or(&item.name);
        let target = self.dealias(lookup);

        let Some(meta) = self.fish_metadata(&target, &[FhirType::Extension]) else {
            if item.type_name.is_some() || comp.category != EntityCategory::Extension {
                return Err(ExportError::ExtensionNotFound {
                    path: root_id,
                    slice: item.name.clone(),
                    extension: lookup.to_string(),
                });
            }
            return Ok(None);
        };
        let url = meta.url.clone().unwrap_or(target);

        let on_modifier_path = comp.tree.get(idx).name() == "modifierExtension";
        if let Some(sd) = self.fish_structure(&url, &[FhirType::Extension], Some(comp))
            && let Some(root) = sd.root_element()
        {
            let is_modifier = root.is_modifier == Some(true);
            if is_modifier != on_modifier_path {
                let reason = if is_modifier {
                    format!("{} is a modifier extension and must be used on modifierExtension", url)
                } else {
                    format!("{} is not a modifier extension and cannot be used on modifierExtension", url)
                };
                let err = ExportError::InvalidExtensionSlice {
                    path: root_id,
                    slice: item.name.clone(),
                    reason,
                };
                self.report(comp, err);
            }
        }
        Ok(Some(url))
    }

    /// Cut a new slice from `root`
    pub(crate) fn create_slice(
        &mut self,
        comp: &mut Compilation,
        root: ElementIdx,
        name: &str,
        types: Option<Vec<ElementDefinitionType>>,
    ) -> ElementIdx {
        let base = comp.tree.get(root).clone();
        let mut slice = base.clone();
        slice.id = slice_id(&base.id, name);
        slice.slice_name = Some(name.to_string());
        slice.slicing = None;
        slice.min = Some(0);
        if let Some(types) = types {
            slice.type_ = Some(types);
        }

        let mut shell = base;
        shell.id = slice.id.clone();
        shell.slicing = None;
        shell.min = None;
        shell.max = None;

        debug!("Creating slice {}", slice.id);
        let anchor = comp.tree.subtree_end(root);
        comp.tree.insert_created(anchor, slice, shell)
    }

    /// Slice an extension array for the extension at `url`
    pub(crate) fn create_extension_slice(
        &mut self,
        comp: &mut Compilation,
        element: ElementIdx,
        name: &str,
        url: &str,
    ) -> ExportResult<ElementIdx> {
        let root_id = comp.tree.get(element).id.clone();
        if comp.tree.find(&slice_id(&root_id, name)).is_some() {
            return Err(ExportError::DuplicateSliceName {
                path: root_id,
                slice: name.to_string(),
            });
        }
        self.ensure_extension_slicing(comp, element);
        Ok(self.create_slice(
            comp,
            element,
            name,
            Some(vec![ElementDefinitionType::with_profile("Extension", url)]),
        ))
    }

    /// Inline sub-extensions are identified by their slice name
    fn fix_inline_extension_url(&mut self, comp: &mut Compilation, slice: ElementIdx, name: &str) {
        self.unfold(comp, slice, "url");
        let url_id = format!("{}.url", comp.tree.get(slice).id);
        if let Some(url) = comp.tree.find(&url_id) {
            comp.tree.get_mut(url).set_assigned_value(
                AssignmentKind::Fixed,
                "uri",
                Value::String(name.to_string()),
            );
        }
    }
}
