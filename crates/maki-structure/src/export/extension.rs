//! Extension-specific steps
//!
//! Contexts, root metadata, the fixed `Extension.url` and the rule that an
//! extension carries either a value or sub-extensions, never both.

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::ExportError;
use crate::fhir::{AssignmentKind, MaxCardinality, StructureDefinitionContext};
use crate::fishing::FhirType;
use crate::fsh::StructureEntity;
use crate::tree::ElementIdx;
use tracing::debug;

impl StructureDefinitionExporter {
    pub(crate) fn set_up_extension(&mut self, entity: &StructureEntity, comp: &mut Compilation) {
        let contexts: Vec<StructureDefinitionContext> = entity
            .contexts
            .iter()
            .filter_map(|context| self.extension_context(entity, context))
            .collect();
        if !contexts.is_empty() {
            comp.sd.context = Some(contexts);
        }

        if !self.config.apply_extension_metadata_to_root {
            return;
        }
        let Some(root) = comp.tree.root() else {
            return;
        };
        let title = entity.title.clone().filter(|t| !t.is_empty());
        let description = entity.description.clone().filter(|d| !d.is_empty());
        if title.is_none() && description.is_none() {
            return;
        }
        let element = comp.tree.get_mut(root);
        if let Some(title) = title {
            element.short = Some(title);
        }
        if let Some(description) = description {
            element.definition = Some(description);
        }
    }

    /// Translate a declared context into a StructureDefinition.context entry
    fn extension_context(
        &mut self,
        entity: &StructureEntity,
        context: &str,
    ) -> Option<StructureDefinitionContext> {
        let context = context.trim();
        if let Some(expression) = context
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            return Some(StructureDefinitionContext::fhirpath(expression));
        }

        if context != entity.name
            && let Some(meta) = self.fish_metadata(context, &[FhirType::Extension])
            && let Some(url) = meta.url
        {
            return Some(StructureDefinitionContext::extension(url));
        }

        let (head, rest) = match context.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (context, None),
        };
        let meta = self.fish_metadata(
            head,
            &[
                FhirType::Resource,
                FhirType::Type,
                FhirType::Profile,
                FhirType::Logical,
            ],
        );
        match meta {
            Some(meta) if meta.derivation.as_deref() == Some("constraint") => {
                let base = self.base_type(&meta).unwrap_or_else(|| head.to_string());
                let url = meta.url.unwrap_or_else(|| head.to_string());
                let expression = match rest {
                    Some(rest) => format!("{url}#{base}.{rest}"),
                    None => url,
                };
                Some(StructureDefinitionContext::element(expression))
            }
            Some(meta) => {
                let base = meta.sd_type.unwrap_or_else(|| head.to_string());
                let expression = match rest {
                    Some(rest) => format!("{base}.{rest}"),
                    None => base,
                };
                Some(StructureDefinitionContext::element(expression))
            }
            None => {
                self.diagnostics.error(
                    format!(
                        "Could not find a definition for context {} of extension {}",
                        context, entity.name
                    ),
                    entity.location.as_ref(),
                );
                None
            }
        }
    }

    /// Post-rule steps for Extension entities
    pub(crate) fn finish_extension(&mut self, comp: &mut Compilation) {
        if comp.sd.context.as_ref().is_none_or(Vec::is_empty) {
            comp.sd.context = Some(vec![StructureDefinitionContext::element("Element")]);
        }

        let extension_roots: Vec<ElementIdx> = comp
            .tree
            .iter()
            .filter(|(idx, element)| {
                Some(*idx) == comp.tree.root()
                    || (element.is_slice() && element.is_extension_array())
            })
            .map(|(idx, _)| idx)
            .collect();
        for idx in extension_roots {
            self.enforce_value_or_extensions(comp, idx);
        }

        self.fix_extension_url(comp);
    }

    /// An extension (or sub-extension) has either value[x] or extension slices
    fn enforce_value_or_extensions(&mut self, comp: &mut Compilation, idx: ElementIdx) {
        let id = comp.tree.get(idx).id.clone();
        let (Some(value), Some(extension)) = (
            comp.tree.find(&format!("{id}.value[x]")),
            comp.tree.find(&format!("{id}.extension")),
        ) else {
            return;
        };

        let is_zeroed = |comp: &Compilation, idx: ElementIdx| {
            comp.tree
                .get(idx)
                .max_cardinality()
                .is_some_and(|max| max.is_zero())
        };
        let has_sub_extensions = comp
            .tree
            .slices(extension)
            .into_iter()
            .any(|slice| !is_zeroed(comp, slice));
        let value_id = comp.tree.get(value).id.clone();
        let value_used = comp.has_rules_at_or_below(&value_id) && !is_zeroed(comp, value);

        match (has_sub_extensions, value_used) {
            (true, true) => {
                let err = ExportError::ExtensionValueAndExtension {
                    path: id.clone(),
                    extension: comp.name.clone(),
                };
                self.report(comp, err);
            }
            (true, false) if !is_zeroed(comp, value) => {
                debug!("Constraining {} to 0..0, {} has sub-extensions", value_id, id);
                let element = comp.tree.get_mut(value);
                element.min = Some(0);
                element.max = Some(MaxCardinality::Bounded(0).to_string());
            }
            (false, true) if !is_zeroed(comp, extension) => {
                let element = comp.tree.get_mut(extension);
                element.max = Some(MaxCardinality::Bounded(0).to_string());
            }
            _ => {}
        }
    }

    /// `Extension.url` is fixed to the extension's canonical URL unless already fixed
    fn fix_extension_url(&mut self, comp: &mut Compilation) {
        let Some(root) = comp.tree.root() else {
            return;
        };
        let url_id = format!("{}.url", comp.tree.get(root).id);
        let Some(url) = comp.tree.find(&url_id) else {
            return;
        };
        let current = comp
            .tree
            .get(url)
            .assigned_value()
            .and_then(|(_, _, value)| value.as_str().map(str::to_string));
        if let Some(existing) = current {
            debug!("Extension.url already fixed to {}", existing);
            return;
        }
        let sd_url = comp.sd.url.clone();
        comp.tree.get_mut(url).set_assigned_value(
            AssignmentKind::Fixed,
            "uri",
            serde_json::Value::String(sd_url),
        );
    }
}
