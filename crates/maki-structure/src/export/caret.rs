//! Caret value rules (`* ^publisher = "Example"`, `* code ^short = "Kind"`)
//!
//! Caret paths address raw FHIR fields, so they are applied to the JSON form
//! of the StructureDefinition or of the element and read back afterwards.
//! Soft indices resolve through the compilation's cursor; extensions are
//! addressed by URL, alias or name and reuse an existing entry with the same
//! URL before appending a new one.

use super::exporter::{Compilation, StructureDefinitionExporter};
use super::resolve::is_uri;
use crate::error::{ExportError, ExportResult};
use crate::fhir::{ElementDefinition, StructureDefinition};
use crate::fishing::FhirType;
use crate::fsh::{CaretValueRule, FshCode, FshValue};
use crate::tree::{Bracket, PathSegment, parse_path};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

/// One resolved step of a caret path
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Field(String),
    Index(String, usize),
    Extension(String, String),
}

impl Step {
    fn key(&self) -> &str {
        match self {
            Step::Field(key) | Step::Index(key, _) | Step::Extension(key, _) => key,
        }
    }
}

/// Repeating FHIR fields that an unindexed caret path enters at index 0
const LIST_FIELDS: &[&str] = &[
    "discriminator",
    "contact",
    "telecom",
    "jurisdiction",
    "useContext",
    "keyword",
    "coding",
    "mapping",
    "constraint",
    "alias",
    "example",
    "identifier",
];

/// Write `value` at `steps` inside `root`, creating objects and arrays on the way
fn set_at(root: &mut Value, steps: &[Step], value: Value) -> Result<(), String> {
    let Some((last, parents)) = steps.split_last() else {
        return Err("empty caret path".to_string());
    };
    let mut current = root;
    for step in parents {
        current = step_into(current, step)?;
    }
    let object = as_object(current, last.key())?;
    match last {
        Step::Field(key) => {
            object.insert(key.clone(), value);
        }
        Step::Index(key, index) => {
            let items = array_entry(object, key)?;
            while items.len() <= *index {
                items.push(Value::Null);
            }
            items[*index] = value;
        }
        Step::Extension(_, url) => {
            return Err(format!("cannot assign a value directly to extension {url}"));
        }
    }
    Ok(())
}

fn as_object<'a>(value: &'a mut Value, key: &str) -> Result<&'a mut Map<String, Value>, String> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .ok_or_else(|| format!("{key} cannot be set on a primitive value"))
}

fn array_entry<'a>(object: &'a mut Map<String, Value>, key: &str) -> Result<&'a mut Vec<Value>, String> {
    object
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| format!("{key} is not a list"))
}

fn step_into<'a>(current: &'a mut Value, step: &Step) -> Result<&'a mut Value, String> {
    let object = as_object(current, step.key())?;
    match step {
        Step::Field(key) => {
            let child = object.entry(key.clone()).or_insert(Value::Null);
            if child.is_null() && LIST_FIELDS.contains(&key.as_str()) {
                *child = Value::Array(Vec::new());
            }
            match child {
                Value::Array(items) => {
                    if items.is_empty() {
                        items.push(Value::Null);
                    }
                    Ok(&mut items[0])
                }
                other => Ok(other),
            }
        }
        Step::Index(key, index) => {
            let items = array_entry(object, key)?;
            while items.len() <= *index {
                items.push(Value::Null);
            }
            Ok(&mut items[*index])
        }
        Step::Extension(key, url) => {
            let items = array_entry(object, key)?;
            let position = items
                .iter()
                .position(|ext| ext.get("url").and_then(Value::as_str) == Some(url.as_str()));
            let position = match position {
                Some(position) => position,
                None => {
                    items.push(json!({"url": url}));
                    items.len() - 1
                }
            };
            Ok(&mut items[position])
        }
    }
}

/// Representation of a code for the field it is assigned to
fn code_json(field: &str, code: &FshCode, system: Option<String>) -> Value {
    if system.is_none() || field.ends_with("Code") {
        return json!(code.code);
    }
    let mut coding = Map::new();
    if let Some(system) = system {
        coding.insert("system".into(), json!(system));
    }
    if let Some(version) = &code.version {
        coding.insert("version".into(), json!(version));
    }
    coding.insert("code".into(), json!(code.code));
    if let Some(display) = &code.display {
        coding.insert("display".into(), json!(display));
    }
    if field.ends_with("CodeableConcept") || field == "jurisdiction" {
        json!({"coding": [Value::Object(coding)]})
    } else {
        Value::Object(coding)
    }
}

impl StructureDefinitionExporter {
    pub(crate) fn apply_caret_value(&mut self, comp: &mut Compilation, rule: &CaretValueRule) -> ExportResult<()> {
        let target = match rule.path.as_deref() {
            Some(path) => Some(self.find_element(comp, path)?),
            None => None,
        };
        let subject = rule.path.clone().unwrap_or_else(|| comp.name.clone());
        let invalid = |reason: String| ExportError::InvalidCaretPath {
            path: subject.clone(),
            caret_path: rule.caret_path.clone(),
            value: rule.value.to_string(),
            reason,
        };

        let mut segments = parse_path(&rule.caret_path).map_err(|e| invalid(e.to_string()))?;
        let scope = match target {
            Some(idx) => comp.tree.get(idx).id.clone(),
            None => "sd".to_string(),
        };
        comp.soft_index
            .resolve(&scope, &mut segments)
            .map_err(&invalid)?;
        let steps = self.caret_steps(&segments).map_err(&invalid)?;
        let field = steps.last().map(|s| s.key().to_string()).unwrap_or_default();
        let value = self.caret_value_json(comp, &field, &rule.value)?;

        debug!("Setting ^{} on {}", rule.caret_path, scope);
        match target {
            None => {
                let mut json = comp.sd.to_json().map_err(|e| invalid(e.to_string()))?;
                set_at(&mut json, &steps, value).map_err(&invalid)?;
                let mut sd = StructureDefinition::from_json(json).map_err(|e| invalid(e.to_string()))?;
                if sd.url.is_empty() {
                    return Err(invalid("url cannot be empty".to_string()));
                }
                sd.snapshot = None;
                sd.differential = None;
                comp.sd = sd;
            }
            Some(idx) => {
                let element = comp.tree.get(idx);
                let mut json = serde_json::to_value(element).map_err(|e| invalid(e.to_string()))?;
                set_at(&mut json, &steps, value).map_err(&invalid)?;
                let updated: ElementDefinition =
                    serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
                if updated.id != element.id || updated.path != element.path {
                    return Err(invalid("the id and path of an element cannot be changed".to_string()));
                }
                *comp.tree.get_mut(idx) = updated;
            }
        }
        Ok(())
    }

    fn caret_steps(&mut self, segments: &[PathSegment]) -> Result<Vec<Step>, String> {
        let mut steps = Vec::new();
        for segment in segments {
            let key = segment.base.clone();
            if segment.brackets.is_empty() {
                steps.push(Step::Field(key));
                continue;
            }
            for (i, bracket) in segment.brackets.iter().enumerate() {
                let step = match bracket {
                    Bracket::Index(index) => Step::Index(key.clone(), *index),
                    Bracket::Slice(name)
                        if i == 0 && matches!(key.as_str(), "extension" | "modifierExtension") =>
                    {
                        Step::Extension(key.clone(), self.extension_url(name)?)
                    }
                    Bracket::Slice(name) => {
                        return Err(format!("{key}[{name}] does not address an extension"));
                    }
                    Bracket::Soft(_) => return Err(format!("unresolved soft index on {key}")),
                };
                steps.push(step);
            }
        }
        Ok(steps)
    }

    fn extension_url(&mut self, name: &str) -> Result<String, String> {
        let target = self.dealias(name);
        if let Some(url) = self
            .fish_metadata(&target, &[FhirType::Extension])
            .and_then(|meta| meta.url)
        {
            return Ok(url);
        }
        if is_uri(&target) {
            return Ok(target);
        }
        Err(format!("cannot find extension {name}"))
    }

    fn caret_value_json(&mut self, comp: &Compilation, field: &str, value: &FshValue) -> ExportResult<Value> {
        let path = comp.name.clone();
        Ok(match value {
            FshValue::Boolean(b) => json!(b),
            FshValue::Integer(i) => json!(i),
            FshValue::Decimal(d) => json!(d),
            FshValue::String(s) => json!(s),
            FshValue::Code(code) => {
                let system = code
                    .system
                    .as_ref()
                    .map(|system| self.resolve_code_system(system).url);
                code_json(field, code, system)
            }
            FshValue::Quantity(quantity) => self.quantity_json(quantity),
            FshValue::Reference(reference) => {
                let tank = Arc::clone(&self.tank);
                let literal = match tank.find_instance(&reference.target) {
                    Some(instance) => {
                        let resource_type = self
                            .instance_resource_type(&instance.instance_of)
                            .unwrap_or_else(|| instance.instance_of.clone());
                        format!("{}/{}", resource_type, instance.effective_id())
                    }
                    None => reference.target.clone(),
                };
                let mut json = json!({"reference": literal});
                if let Some(display) = &reference.display {
                    json["display"] = json!(display);
                }
                json
            }
            FshValue::Canonical(canonical) => {
                let url = self.canonical_url(comp, &path, canonical)?;
                json!(url)
            }
            FshValue::Instance(name) => {
                let tank = Arc::clone(&self.tank);
                tank.find_instance(name)
                    .and_then(|instance| instance.content.clone())
                    .ok_or_else(|| ExportError::InstanceNotFound {
                        path,
                        name: name.clone(),
                    })?
            }
        })
    }
}
