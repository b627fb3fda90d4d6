//! Add-element rules for logical models and custom resources
//!
//! ```fsh
//! Logical: Shipment
//! * item 1..* BackboneElement "An item in the shipment"
//! * item.weight 0..1 Quantity "Weight of the item"
//! * item.parts 0..* contentReference #Shipment.item "Nested items"
//! ```
//!
//! New elements go after the last descendant of their parent, which must be
//! the root or a backbone-like element. Their differential baseline is an
//! empty shell, so everything authored on them shows up in the differential.

use super::exporter::{Compilation, StructureDefinitionExporter};
use crate::error::{ExportError, ExportResult};
use crate::fhir::naming::{ElementNameCheck, check_element_name};
use crate::fhir::{ElementDefinition, ElementDefinitionBase, ElementDefinitionType, MaxCardinality};
use crate::fsh::{AddElementRule, EntityCategory, FlagRule, TypeRefKind, TypeReference};
use tracing::debug;

/// Types whose elements may own newly added children
const CONTAINER_TYPES: &[&str] = &["BackboneElement", "Element", "Base"];

fn split_parent(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('.') {
        Some((parent, name)) => (Some(parent), name),
        None => (None, path),
    }
}

impl StructureDefinitionExporter {
    pub(crate) fn apply_add_element(&mut self, comp: &mut Compilation, rule: &AddElementRule) -> ExportResult<()> {
        if !matches!(comp.category, EntityCategory::Logical | EntityCategory::Resource) {
            return Err(ExportError::RuleNotAllowed {
                rule: "AddElement".to_string(),
                entity: comp.category.to_string(),
            });
        }
        let invalid = |reason: &str| ExportError::InvalidAddElement {
            path: rule.path.clone(),
            reason: reason.to_string(),
        };
        if rule.types.is_empty() && rule.content_reference.is_none() {
            return Err(invalid("a type or a contentReference is required"));
        }
        if !rule.types.is_empty() && rule.content_reference.is_some() {
            return Err(invalid("an element cannot have both types and a contentReference"));
        }
        if rule.short.as_deref().is_none_or(str::is_empty) {
            return Err(invalid("a short description is required"));
        }
        let max = MaxCardinality::parse(&rule.max).map_err(|source| ExportError::InvalidMaxCardinality {
            path: rule.path.clone(),
            value: rule.max.clone(),
            source,
        })?;
        if !max.allows(rule.min) {
            return Err(ExportError::InvalidCardinality {
                path: rule.path.clone(),
                requested: format!("{}..{}", rule.min, rule.max),
            });
        }

        let (parent_path, name) = split_parent(&rule.path);
        let name_check = check_element_name(name);
        let parent = match parent_path {
            Some(parent_path) => self.find_element(comp, parent_path)?,
            None => comp
                .tree
                .root()
                .ok_or_else(|| ExportError::path_not_found(&rule.path, &comp.name))?,
        };
        let parent_element = comp.tree.get(parent);
        let is_root = comp.tree.root() == Some(parent);
        if !is_root
            && !parent_element
                .type_codes()
                .iter()
                .any(|code| CONTAINER_TYPES.contains(code))
        {
            return Err(invalid(&format!(
                "{} cannot have child elements",
                parent_element.id
            )));
        }
        let id = format!("{}.{}", parent_element.id, name);
        let path = format!("{}.{}", parent_element.path, name);
        if comp.tree.find(&id).is_some() {
            return Err(invalid("an element with this path already exists"));
        }

        let types = rule
            .types
            .iter()
            .map(|type_ref| self.added_element_type(comp, &id, type_ref))
            .collect::<ExportResult<Vec<_>>>()?;
        let content_reference = match rule.content_reference.as_deref() {
            Some(reference) => Some(self.content_reference(comp, &id, reference)?),
            None => None,
        };

        let mut element = ElementDefinition::new(path.clone());
        element.id = id.clone();
        element.short = rule.short.clone();
        element.definition = rule.definition.clone().or_else(|| rule.short.clone());
        element.min = Some(rule.min);
        element.max = Some(rule.max.clone());
        element.base = Some(ElementDefinitionBase {
            path,
            min: rule.min,
            max: rule.max.clone(),
        });
        element.type_ = (!types.is_empty()).then_some(types);
        element.content_reference = content_reference;

        let anchor = comp.tree.subtree_end(parent);
        let shell = element.blank_copy();
        let idx = comp.tree.insert_created(anchor, element, shell);
        comp.rule_targets.insert(id.clone());
        debug!("Added element {} to {}", id, comp.name);

        if !rule.flags.is_empty() {
            self.set_flags(comp, idx, &FlagRule::new(id.clone(), &rule.flags), true);
        }

        match name_check {
            // Invalid names are still added
            ElementNameCheck::Invalid(reason) => self.report(
                comp,
                ExportError::InvalidElementName {
                    name: name.to_string(),
                    reason,
                },
            ),
            ElementNameCheck::Unconventional(reason) => {
                self.warn(comp, format!("Element name {name} on {id} is unconventional: {reason}"));
            }
            ElementNameCheck::Valid => {}
        }
        Ok(())
    }

    fn added_element_type(
        &mut self,
        comp: &Compilation,
        path: &str,
        type_ref: &TypeReference,
    ) -> ExportResult<ElementDefinitionType> {
        let name = self.dealias(&type_ref.type_name);
        let not_found = || ExportError::TypeNotFound {
            path: path.to_string(),
            type_name: type_ref.type_name.clone(),
        };
        if type_ref.kind != TypeRefKind::Plain {
            let wrapper = type_ref.wrapper_code().unwrap_or("Reference");
            let url = self
                .fish_metadata(&name, &[])
                .filter(|m| m.resource_type == "StructureDefinition")
                .and_then(|m| m.url)
                .ok_or_else(not_found)?;
            return Ok(ElementDefinitionType::with_targets(wrapper, vec![url]));
        }
        let meta = self.type_metadata(comp, &name).ok_or_else(not_found)?;
        if meta.derivation.as_deref() == Some("constraint") {
            let code = self.base_type(&meta).ok_or_else(not_found)?;
            let url = meta.url.clone().ok_or_else(not_found)?;
            return Ok(ElementDefinitionType::with_profile(code, url));
        }
        match meta.kind.as_deref() {
            // Logical models are typed by their canonical URL
            Some("logical") => Ok(ElementDefinitionType::new(
                meta.url.clone().or(meta.sd_type.clone()).ok_or_else(not_found)?,
            )),
            _ => Ok(ElementDefinitionType::new(meta.sd_type.clone().unwrap_or(name))),
        }
    }

    /// `#Model.path` on this definition becomes `url#Model.path`
    fn content_reference(&self, comp: &Compilation, path: &str, reference: &str) -> ExportResult<String> {
        let Some(local) = reference.strip_prefix('#') else {
            return Ok(reference.to_string());
        };
        if comp.tree.find(local).is_none() {
            return Err(ExportError::InvalidAddElement {
                path: path.to_string(),
                reason: format!("contentReference target {local} does not exist"),
            });
        }
        Ok(format!("{}#{}", comp.sd.url, local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("item.weight"), (Some("item"), "weight"));
        assert_eq!(split_parent("item"), (None, "item"));
    }
}
