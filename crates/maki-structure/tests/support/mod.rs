//! Shared fixtures: a small in-memory FHIR core and export helpers

#![allow(dead_code)]

use maki_structure::fhir::ElementDefinition;
use maki_structure::{
    DefinitionIndex, ExportConfig, ExportOutput, FshTank, StructureDefinition,
    StructureDefinitionExporter,
};
use serde_json::{Value, json};
use std::sync::Arc;

pub const CANONICAL: &str = "http://example.org/fhir";

pub fn core_url(name: &str) -> String {
    format!("http://hl7.org/fhir/StructureDefinition/{name}")
}

/// Snapshot element with id = path, base = own cardinality
fn el(path: &str, min: u32, max: &str, types: Value) -> Value {
    let mut element = json!({
        "id": path,
        "path": path,
        "short": format!("{} element", path.rsplit('.').next().unwrap_or(path)),
        "min": min,
        "max": max,
        "base": {"path": path, "min": min, "max": max},
    });
    if !types.is_null() {
        element["type"] = types;
    }
    element
}

fn t(code: &str) -> Value {
    json!([{"code": code}])
}

fn refs(targets: &[&str]) -> Value {
    json!([{
        "code": "Reference",
        "targetProfile": targets.iter().map(|t| core_url(t)).collect::<Vec<_>>()
    }])
}

fn sd(name: &str, kind: &str, base: Option<&str>, is_abstract: bool, elements: Vec<Value>) -> Value {
    let mut sd = json!({
        "resourceType": "StructureDefinition",
        "id": name,
        "url": core_url(name),
        "name": name,
        "status": "active",
        "fhirVersion": "4.0.1",
        "kind": kind,
        "abstract": is_abstract,
        "type": name,
        "snapshot": {"element": elements},
    });
    if let Some(base) = base {
        sd["baseDefinition"] = json!(core_url(base));
        sd["derivation"] = json!("specialization");
    }
    sd
}

/// Elements shared by every datatype: `<type>`, `.id`, `.extension`
fn datatype(name: &str, base: &str, kind: &str, children: Vec<Value>) -> Value {
    let mut elements = vec![
        el(name, 0, "*", Value::Null),
        el(&format!("{name}.id"), 0, "1", t("string")),
        el(&format!("{name}.extension"), 0, "*", t("Extension")),
    ];
    elements.extend(children);
    sd(name, kind, Some(base), false, elements)
}

fn primitive(name: &str, base: &str) -> Value {
    datatype(name, base, "primitive-type", vec![])
}

/// Root, id, extension and modifierExtension of a resource
fn resource(name: &str, children: Vec<Value>) -> Value {
    let mut elements = vec![
        el(name, 0, "*", Value::Null),
        el(&format!("{name}.id"), 0, "1", t("id")),
        el(&format!("{name}.extension"), 0, "*", t("Extension")),
        el(&format!("{name}.modifierExtension"), 0, "*", t("Extension")),
    ];
    elements.extend(children);
    sd(name, "resource", Some("DomainResource"), false, elements)
}

fn backbone(path: &str) -> Vec<Value> {
    vec![
        el(&format!("{path}.id"), 0, "1", t("string")),
        el(&format!("{path}.extension"), 0, "*", t("Extension")),
        el(&format!("{path}.modifierExtension"), 0, "*", t("Extension")),
    ]
}

fn extension_elements(value_types: Value) -> Vec<Value> {
    vec![
        el("Extension", 0, "*", Value::Null),
        el("Extension.id", 0, "1", t("string")),
        el("Extension.extension", 0, "*", t("Extension")),
        el("Extension.url", 1, "1", t("uri")),
        el("Extension.value[x]", 0, "1", value_types),
    ]
}

fn observation() -> Value {
    let mut status = el("Observation.status", 1, "1", t("code"));
    status["isModifier"] = json!(true);
    status["isSummary"] = json!(true);
    status["binding"] = json!({
        "strength": "required",
        "valueSet": "http://hl7.org/fhir/ValueSet/observation-status|4.0.1"
    });
    let mut code = el("Observation.code", 1, "1", t("CodeableConcept"));
    code["binding"] = json!({
        "strength": "example",
        "valueSet": "http://hl7.org/fhir/ValueSet/observation-codes"
    });
    let value_types = json!([
        {"code": "Quantity"},
        {"code": "CodeableConcept"},
        {"code": "string"},
        {"code": "boolean"},
        {"code": "integer"},
        {"code": "Period"}
    ]);
    let mut children = vec![
        el("Observation.identifier", 0, "*", t("Identifier")),
        status,
        el("Observation.category", 0, "*", t("CodeableConcept")),
        code,
        el("Observation.subject", 0, "1", refs(&["Patient", "Group", "Device", "Location"])),
        el("Observation.focus", 0, "*", refs(&["Resource"])),
        el(
            "Observation.effective[x]",
            0,
            "1",
            json!([{"code": "dateTime"}, {"code": "Period"}]),
        ),
        el("Observation.value[x]", 0, "1", value_types.clone()),
        el("Observation.note", 0, "*", t("string")),
        el("Observation.component", 0, "*", t("BackboneElement")),
    ];
    children.extend(backbone("Observation.component"));
    children.push(el("Observation.component.code", 1, "1", t("CodeableConcept")));
    children.push(el("Observation.component.value[x]", 0, "1", value_types));
    resource("Observation", children)
}

fn patient() -> Value {
    let mut children = vec![
        el("Patient.identifier", 0, "*", t("Identifier")),
        el("Patient.active", 0, "1", t("boolean")),
        el("Patient.name", 0, "*", t("HumanName")),
        el("Patient.gender", 0, "1", t("code")),
        el("Patient.birthDate", 0, "1", t("date")),
        el(
            "Patient.deceased[x]",
            0,
            "1",
            json!([{"code": "boolean"}, {"code": "dateTime"}]),
        ),
        el("Patient.generalPractitioner", 0, "*", refs(&["Organization", "Practitioner"])),
        el("Patient.contact", 0, "*", t("BackboneElement")),
    ];
    children.extend(backbone("Patient.contact"));
    children.push(el("Patient.contact.name", 0, "1", t("HumanName")));
    children.push(el("Patient.contact.gender", 0, "1", t("code")));
    resource("Patient", children)
}

/// Core definitions used throughout the integration tests
pub fn core_definitions() -> Vec<Value> {
    let mut definitions = vec![
        sd("Base", "complex-type", None, true, vec![el("Base", 0, "*", Value::Null)]),
        sd(
            "Element",
            "complex-type",
            Some("Base"),
            true,
            vec![
                el("Element", 0, "*", Value::Null),
                el("Element.id", 0, "1", t("string")),
                el("Element.extension", 0, "*", t("Extension")),
            ],
        ),
        sd(
            "BackboneElement",
            "complex-type",
            Some("Element"),
            true,
            vec![
                el("BackboneElement", 0, "*", Value::Null),
                el("BackboneElement.id", 0, "1", t("string")),
                el("BackboneElement.extension", 0, "*", t("Extension")),
                el("BackboneElement.modifierExtension", 0, "*", t("Extension")),
            ],
        ),
        sd(
            "Resource",
            "resource",
            Some("Base"),
            true,
            vec![
                el("Resource", 0, "*", Value::Null),
                el("Resource.id", 0, "1", t("id")),
                el("Resource.language", 0, "1", t("code")),
            ],
        ),
        sd(
            "DomainResource",
            "resource",
            Some("Resource"),
            true,
            vec![
                el("DomainResource", 0, "*", Value::Null),
                el("DomainResource.id", 0, "1", t("id")),
                el("DomainResource.language", 0, "1", t("code")),
                el("DomainResource.extension", 0, "*", t("Extension")),
                el("DomainResource.modifierExtension", 0, "*", t("Extension")),
            ],
        ),
        sd(
            "Extension",
            "complex-type",
            Some("Element"),
            false,
            extension_elements(json!([
                {"code": "string"},
                {"code": "boolean"},
                {"code": "integer"},
                {"code": "code"},
                {"code": "Coding"},
                {"code": "CodeableConcept"},
                {"code": "Quantity"},
                {"code": "Reference"},
                {"code": "dateTime"}
            ])),
        ),
        observation(),
        patient(),
        resource("Group", vec![]),
        resource("Device", vec![]),
        resource("Location", vec![]),
        resource("Organization", vec![]),
        resource("Practitioner", vec![]),
        datatype(
            "CodeableConcept",
            "Element",
            "complex-type",
            vec![
                el("CodeableConcept.coding", 0, "*", t("Coding")),
                el("CodeableConcept.text", 0, "1", t("string")),
            ],
        ),
        datatype(
            "Coding",
            "Element",
            "complex-type",
            vec![
                el("Coding.system", 0, "1", t("uri")),
                el("Coding.version", 0, "1", t("string")),
                el("Coding.code", 0, "1", t("code")),
                el("Coding.display", 0, "1", t("string")),
            ],
        ),
        datatype(
            "Quantity",
            "Element",
            "complex-type",
            vec![
                el("Quantity.value", 0, "1", t("decimal")),
                el("Quantity.unit", 0, "1", t("string")),
                el("Quantity.system", 0, "1", t("uri")),
                el("Quantity.code", 0, "1", t("code")),
            ],
        ),
        datatype(
            "Reference",
            "Element",
            "complex-type",
            vec![
                el("Reference.reference", 0, "1", t("string")),
                el("Reference.display", 0, "1", t("string")),
            ],
        ),
        datatype(
            "Identifier",
            "Element",
            "complex-type",
            vec![
                el("Identifier.system", 0, "1", t("uri")),
                el("Identifier.value", 0, "1", t("string")),
            ],
        ),
        datatype(
            "HumanName",
            "Element",
            "complex-type",
            vec![
                el("HumanName.family", 0, "1", t("string")),
                el("HumanName.given", 0, "*", t("string")),
            ],
        ),
        datatype(
            "Period",
            "Element",
            "complex-type",
            vec![
                el("Period.start", 0, "1", t("dateTime")),
                el("Period.end", 0, "1", t("dateTime")),
            ],
        ),
        primitive("string", "Element"),
        primitive("boolean", "Element"),
        primitive("integer", "Element"),
        primitive("decimal", "Element"),
        primitive("uri", "Element"),
        primitive("dateTime", "Element"),
        primitive("date", "Element"),
        primitive("code", "string"),
        primitive("id", "string"),
    ];

    let mut simple_quantity = sd(
        "SimpleQuantity",
        "complex-type",
        Some("Quantity"),
        false,
        vec![
            el("Quantity", 0, "*", Value::Null),
            el("Quantity.id", 0, "1", t("string")),
            el("Quantity.extension", 0, "*", t("Extension")),
            el("Quantity.value", 0, "1", t("decimal")),
            el("Quantity.unit", 0, "1", t("string")),
            el("Quantity.system", 0, "1", t("uri")),
            el("Quantity.code", 0, "1", t("code")),
        ],
    );
    simple_quantity["type"] = json!("Quantity");
    simple_quantity["derivation"] = json!("constraint");
    definitions.push(simple_quantity);

    let mut birth_place = sd(
        "patient-birthPlace",
        "complex-type",
        Some("Extension"),
        false,
        extension_elements(t("string")),
    );
    birth_place["name"] = json!("BirthPlace");
    birth_place["type"] = json!("Extension");
    birth_place["derivation"] = json!("constraint");
    definitions.push(birth_place);

    definitions.push(json!({
        "resourceType": "ValueSet",
        "id": "observation-status",
        "url": "http://hl7.org/fhir/ValueSet/observation-status",
        "name": "ObservationStatus",
        "status": "active"
    }));
    definitions.push(json!({
        "resourceType": "CodeSystem",
        "id": "observation-category",
        "url": "http://terminology.hl7.org/CodeSystem/observation-category",
        "name": "ObservationCategoryCodes",
        "status": "active",
        "content": "complete",
        "concept": [
            {"code": "vital-signs", "display": "Vital Signs"},
            {"code": "laboratory", "display": "Laboratory"}
        ]
    }));
    definitions
}

pub fn core() -> Arc<DefinitionIndex> {
    Arc::new(DefinitionIndex::from_resources(core_definitions()))
}

pub fn config() -> ExportConfig {
    ExportConfig::new(CANONICAL)
}

pub fn export(tank: FshTank) -> ExportOutput {
    StructureDefinitionExporter::new(config(), Arc::new(tank), core()).export()
}

pub fn exported<'a>(output: &'a ExportOutput, name: &str) -> &'a StructureDefinition {
    output
        .package
        .find_by_name(name)
        .unwrap_or_else(|| panic!("{name} was not exported"))
}

pub fn snapshot<'a>(sd: &'a StructureDefinition, id: &str) -> &'a ElementDefinition {
    sd.find_element(id)
        .unwrap_or_else(|| panic!("{id} missing from the snapshot of {}", sd.name))
}

pub fn differential_ids(sd: &StructureDefinition) -> Vec<&str> {
    sd.differential_elements().iter().map(|e| e.id.as_str()).collect()
}

pub fn error_messages(output: &ExportOutput) -> Vec<String> {
    output.diagnostics.errors().map(|d| d.message.clone()).collect()
}

pub fn warning_messages(output: &ExportOutput) -> Vec<String> {
    output.diagnostics.warnings().map(|d| d.message.clone()).collect()
}

pub fn assert_no_errors(output: &ExportOutput) {
    let errors = error_messages(output);
    assert!(errors.is_empty(), "unexpected errors: {errors:#?}");
}

pub fn type_codes(element: &ElementDefinition) -> Vec<&str> {
    element.type_codes()
}
