//! Assignment rules (`* status = #final`, `* code = LNC#1234-5 (exactly)`)
//!
//! A FSH value is converted to FHIR JSON for one of the element's types and
//! stored as `pattern[x]` (or `fixed[x]` with `(exactly)`). Values already
//! assigned on an ancestor or a descendant must agree with the new one.

use super::exporter::{Compilation, StructureDefinitionExporter};
use super::resolve::is_uri;
use crate::error::{ExportError, ExportResult};
use crate::fhir::{AssignmentKind, ElementDefinition, core_url, upper_first};
use crate::fsh::{AssignmentRule, FshCanonical, FshCode, FshQuantity, FshReference, FshValue};
use crate::tree::ElementIdx;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

const UCUM: &str = "http://unitsofmeasure.org";

const STRING_TYPES: &[&str] = &[
    "string",
    "markdown",
    "uri",
    "url",
    "canonical",
    "id",
    "oid",
    "uuid",
    "dateTime",
    "date",
    "time",
    "instant",
    "base64Binary",
    "xhtml",
];

const QUANTITY_TYPES: &[&str] = &[
    "Quantity",
    "SimpleQuantity",
    "Age",
    "Count",
    "Distance",
    "Duration",
    "MoneyQuantity",
];

/// A FSH value converted for one element type
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assignable {
    pub type_code: String,
    pub json: Value,
}

impl Assignable {
    fn new(type_code: impl Into<String>, json: Value) -> Self {
        Self {
            type_code: type_code.into(),
            json,
        }
    }
}

fn first_of<'a>(codes: &[String], candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|candidate| codes.iter().any(|code| code == candidate))
}

fn coding_json(code: &FshCode, system: Option<&str>) -> Value {
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
    Value::Object(coding)
}

/// Child of a JSON value for an element name, `value[x]` matching any `valueFoo`
fn child_values<'a>(value: &'a Value, name: &str) -> Vec<&'a Value> {
    let Value::Object(map) = value else {
        return Vec::new();
    };
    let found = match name.strip_suffix("[x]") {
        Some(stem) => map.iter().find_map(|(key, v)| {
            key.strip_prefix(stem)
                .and_then(|rest| rest.chars().next())
                .filter(char::is_ascii_uppercase)
                .map(|_| v)
        }),
        None => map.get(name),
    };
    match found {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    }
}

/// Every value reached from `value` by following `segments`
fn navigate<'a>(value: &'a Value, segments: &[&str]) -> Vec<&'a Value> {
    let mut current = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for segment in segments {
        current = current
            .into_iter()
            .flat_map(|v| child_values(v, segment))
            .collect();
    }
    current
}

/// Whether two assigned values can both hold (patterns match on shared content)
fn compatible(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => a
            .iter()
            .all(|(key, value)| b.get(key).is_none_or(|other| compatible(value, other))),
        (Value::Array(a), Value::Array(b)) => {
            b.iter().all(|item| a.iter().any(|existing| compatible(existing, item)))
        }
        (Value::Array(a), other) | (other, Value::Array(a)) => {
            a.iter().any(|item| compatible(item, other))
        }
        (a, b) => a == b,
    }
}

/// `Observation.code.coding` relative to `Observation.code` -> `["coding"]`
fn relative_segments<'a>(ancestor: &ElementDefinition, descendant: &'a ElementDefinition) -> Vec<&'a str> {
    descendant
        .path
        .strip_prefix(ancestor.path.as_str())
        .and_then(|rest| rest.strip_prefix('.'))
        .map(|rest| rest.split('.').collect())
        .unwrap_or_default()
}

impl StructureDefinitionExporter {
    pub(crate) fn apply_assignment(&mut self, comp: &mut Compilation, rule: &AssignmentRule) -> ExportResult<()> {
        let idx = self.find_element(comp, &rule.path)?;
        let assignable = self.assignable_value(comp, idx, &rule.value)?;
        let kind = if rule.exactly {
            AssignmentKind::Fixed
        } else {
            AssignmentKind::Pattern
        };
        self.assign(comp, idx, assignable, kind)
    }

    pub(crate) fn assign(
        &mut self,
        comp: &mut Compilation,
        idx: ElementIdx,
        assignable: Assignable,
        kind: AssignmentKind,
    ) -> ExportResult<()> {
        let element = comp.tree.get(idx);
        let path = element.id.clone();

        if let Some((existing_kind, key, existing)) = element.assigned_value() {
            let same_type = key[existing_kind.prefix().len()..] == upper_first(&assignable.type_code);
            if same_type && *existing == assignable.json {
                if existing_kind == AssignmentKind::Pattern && kind == AssignmentKind::Fixed {
                    debug!("Upgrading pattern on {} to fixed", path);
                    comp.tree
                        .get_mut(idx)
                        .set_assigned_value(kind, &assignable.type_code, assignable.json);
                }
                return Ok(());
            }
            return Err(ExportError::ValueAlreadyAssigned {
                path,
                existing: existing.to_string(),
                new_value: assignable.json.to_string(),
            });
        }

        self.check_assignment_conflicts(comp, idx, &assignable.json)?;
        debug!("Assigning {}{} on {}", kind.prefix(), upper_first(&assignable.type_code), path);
        comp.tree
            .get_mut(idx)
            .set_assigned_value(kind, &assignable.type_code, assignable.json);
        Ok(())
    }

    /// Values on ancestors and descendants must agree with `value`
    fn check_assignment_conflicts(&self, comp: &Compilation, idx: ElementIdx, value: &Value) -> ExportResult<()> {
        let element = comp.tree.get(idx);

        let mut ancestor = comp.tree.parent(idx);
        while let Some(current) = ancestor {
            let ancestor_element = comp.tree.get(current);
            if let Some((_, _, assigned)) = ancestor_element.assigned_value() {
                let reached = navigate(assigned, &relative_segments(ancestor_element, element));
                if !reached.is_empty() && !reached.iter().any(|v| compatible(v, value)) {
                    return Err(ExportError::ConflictingAssignment {
                        path: element.id.clone(),
                        value: value.to_string(),
                        other: ancestor_element.id.clone(),
                        existing: assigned.to_string(),
                    });
                }
            }
            ancestor = comp.tree.parent(current);
        }

        for descendant in comp.tree.descendants(idx) {
            let descendant_element = comp.tree.get(descendant);
            let Some((_, _, assigned)) = descendant_element.assigned_value() else {
                continue;
            };
            let reached = navigate(value, &relative_segments(element, descendant_element));
            if !reached.is_empty() && !reached.iter().any(|v| compatible(v, assigned)) {
                return Err(ExportError::ConflictingAssignment {
                    path: element.id.clone(),
                    value: value.to_string(),
                    other: descendant_element.id.clone(),
                    existing: assigned.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Convert a FSH value to JSON for one of the element's types
    pub(crate) fn assignable_value(
        &mut self,
        comp: &Compilation,
        idx: ElementIdx,
        value: &FshValue,
    ) -> ExportResult<Assignable> {
        let element = comp.tree.get(idx);
        let path = element.id.clone();
        let codes: Vec<String> = element.types().iter().map(|t| t.code.clone()).collect();
        let mismatch = || ExportError::MismatchedType {
            path: path.clone(),
            value_kind: value.kind().to_string(),
            value: value.to_string(),
            types: codes.join(", "),
        };

        match value {
            FshValue::Boolean(b) => first_of(&codes, &["boolean"])
                .map(|code| Assignable::new(code, json!(b)))
                .ok_or_else(mismatch),
            FshValue::Integer(i) => {
                let code = first_of(
                    &codes,
                    &["integer", "positiveInt", "unsignedInt", "integer64", "decimal"],
                )
                .ok_or_else(mismatch)?;
                match code {
                    "positiveInt" if *i <= 0 => Err(mismatch()),
                    "unsignedInt" if *i < 0 => Err(mismatch()),
                    "integer" if i32::try_from(*i).is_err() => Err(mismatch()),
                    "integer64" => Ok(Assignable::new(code, json!(i.to_string()))),
                    _ => Ok(Assignable::new(code, json!(i))),
                }
            }
            FshValue::Decimal(d) => first_of(&codes, &["decimal"])
                .map(|code| Assignable::new(code, json!(d)))
                .ok_or_else(mismatch),
            FshValue::String(s) => first_of(&codes, STRING_TYPES)
                .map(|code| Assignable::new(code, json!(s)))
                .ok_or_else(mismatch),
            FshValue::Code(code) => self.code_value(&codes, code).and_then(|v| v.ok_or_else(mismatch)),
            FshValue::Quantity(quantity) => {
                let code = first_of(&codes, QUANTITY_TYPES).ok_or_else(mismatch)?;
                Ok(Assignable::new(code, self.quantity_json(quantity)))
            }
            FshValue::Reference(reference) => {
                let code = first_of(&codes, &["Reference"]).ok_or_else(mismatch)?;
                let json = self.reference_json(comp, element, reference)?;
                Ok(Assignable::new(code, json))
            }
            FshValue::Canonical(canonical) => {
                let code = first_of(&codes, &["canonical", "uri", "url"]).ok_or_else(mismatch)?;
                let url = self.canonical_url(comp, &path, canonical)?;
                Ok(Assignable::new(code, json!(url)))
            }
            FshValue::Instance(name) => {
                let tank = Arc::clone(&self.tank);
                let instance = tank
                    .find_instance(name)
                    .ok_or_else(|| ExportError::InstanceNotFound {
                        path: path.clone(),
                        name: name.clone(),
                    })?;
                let resource_type = self
                    .instance_resource_type(&instance.instance_of)
                    .unwrap_or_else(|| instance.instance_of.clone());
                let code = codes
                    .iter()
                    .find(|code| **code == resource_type || **code == instance.instance_of)
                    .or_else(|| (codes.len() == 1).then(|| &codes[0]))
                    .cloned()
                    .ok_or_else(mismatch)?;
                let json = instance.content.clone().unwrap_or_else(|| json!({}));
                Ok(Assignable::new(code, json))
            }
        }
    }

    /// Coded value for `code`, `Coding`, `CodeableConcept`, `CodeableReference` or a Quantity unit
    fn code_value(&self, codes: &[String], code: &FshCode) -> ExportResult<Option<Assignable>> {
        let system = match &code.system {
            Some(system) => {
                let resolved = self.resolve_code_system(system);
                if let Some(concepts) = &resolved.concepts
                    && !concepts.contains(&code.code)
                {
                    return Err(ExportError::CodeNotInSystem {
                        code: code.code.clone(),
                        system: system.clone(),
                    });
                }
                Some(resolved.url)
            }
            None => None,
        };
        let coding = coding_json(code, system.as_deref());

        let Some(target) = first_of(
            codes,
            &["code", "Coding", "CodeableConcept", "CodeableReference", "Quantity"],
        ) else {
            return Ok(None);
        };
        let json = match target {
            "code" => json!(code.code),
            "Coding" => coding,
            "CodeableConcept" => json!({"coding": [coding]}),
            "CodeableReference" => json!({"concept": {"coding": [coding]}}),
            _ => {
                let mut unit = Map::new();
                if let Some(system) = system {
                    unit.insert("system".into(), json!(system));
                }
                unit.insert("code".into(), json!(code.code));
                Value::Object(unit)
            }
        };
        Ok(Some(Assignable::new(target, json)))
    }

    pub(crate) fn quantity_json(&self, quantity: &FshQuantity) -> Value {
        let mut json = Map::new();
        if let Some(value) = quantity.value {
            json.insert("value".into(), json!(value));
        }
        if let Some(unit) = &quantity.unit {
            if let Some(display) = &unit.display {
                json.insert("unit".into(), json!(display));
            }
            let system = match &unit.system {
                Some(system) => self.resolve_code_system(system).url,
                None => UCUM.to_string(),
            };
            json.insert("system".into(), json!(system));
            json.insert("code".into(), json!(unit.code));
        }
        Value::Object(json)
    }

    /// `Reference(instance)` -> `{"reference": "Type/id"}`, checked against the allowed targets
    fn reference_json(
        &mut self,
        comp: &Compilation,
        element: &ElementDefinition,
        reference: &FshReference,
    ) -> ExportResult<Value> {
        let path = element.id.clone();
        let tank = Arc::clone(&self.tank);
        let literal = match tank.find_instance(&reference.target) {
            Some(instance) => {
                let resource_type = self
                    .instance_resource_type(&instance.instance_of)
                    .unwrap_or_else(|| instance.instance_of.clone());
                let allowed: Vec<String> = element
                    .types()
                    .iter()
                    .filter(|t| t.code == "Reference")
                    .flat_map(|t| t.target_profiles().iter().cloned())
                    .collect();
                if !allowed.is_empty() && !allowed.contains(&core_url("Resource")) {
                    let meta = self.fish_metadata(&instance.instance_of, &[]);
                    let fits = match &meta {
                        Some(meta) => self
                            .ancestry(meta)
                            .iter()
                            .any(|m| m.url.as_ref().is_some_and(|u| allowed.contains(u))),
                        None => false,
                    };
                    if !fits {
                        return Err(ExportError::InvalidReferenceTarget {
                            path,
                            target: resource_type,
                            allowed: allowed.join(", "),
                        });
                    }
                    if let Some(meta) = meta
                        && meta.kind.as_deref() == Some("logical")
                        && !meta.can_be_target
                    {
                        self.warn(
                            comp,
                            format!(
                                "{} is referenced on {} but its logical model does not declare the can-be-target characteristic",
                                reference.target, path
                            ),
                        );
                    }
                }
                format!("{}/{}", resource_type, instance.effective_id())
            }
            None if reference.target.contains('/')
                || reference.target.starts_with('#')
                || is_uri(&reference.target) =>
            {
                reference.target.clone()
            }
            None => {
                return Err(ExportError::InstanceNotFound {
                    path,
                    name: reference.target.clone(),
                });
            }
        };

        let mut json = Map::new();
        json.insert("reference".into(), json!(literal));
        if let Some(display) = &reference.display {
            json.insert("display".into(), json!(display));
        }
        Ok(Value::Object(json))
    }

    /// Canonical URL of a named definition, `#local` instance or URL, with `|version`
    pub(crate) fn canonical_url(&mut self, comp: &Compilation, path: &str, canonical: &FshCanonical) -> ExportResult<String> {
        let entity = self.dealias(&canonical.entity);
        let url = if entity.starts_with('#') || is_uri(&entity) {
            entity
        } else if entity == comp.name || comp.sd.id.as_deref() == Some(entity.as_str()) {
            comp.sd.url.clone()
        } else {
            let tank = Arc::clone(&self.tank);
            match self.fish_metadata(&entity, &[]) {
                Some(meta) => match meta.url {
                    Some(url) => url,
                    None => format!(
                        "{}/{}/{}",
                        self.config.canonical_base(),
                        meta.resource_type,
                        meta.id.unwrap_or_else(|| entity.clone())
                    ),
                },
                None => match tank.find_instance(&entity) {
                    Some(instance) => format!("#{}", instance.effective_id()),
                    None => {
                        return Err(ExportError::CanonicalNotFound {
                            path: path.to_string(),
                            name: canonical.entity.clone(),
                        });
                    }
                },
            }
        };
        Ok(match &canonical.version {
            Some(version) => format!("{url}|{version}"),
            None => url,
        })
    }
}
