//! Integration tests for Profile export

mod support;

use maki_structure::fhir::{BindingStrength, Derivation, StructureDefinitionKind};
use maki_structure::fsh::{
    AssignmentRule, BindingRule, CardinalityRule, CaretValueRule, ConstraintSeverity, Flag,
    FlagRule, FshCode, FshCodeSystem, FshValue, FshValueSet, Invariant, MappingRule, ObeysRule,
    TypeReference, TypeRule,
};
use maki_structure::{FshTank, Rule, StructureEntity};
use serde_json::json;
use support::*;

fn card(path: &str, min: Option<u32>, max: Option<&str>) -> Rule {
    Rule::Cardinality(CardinalityRule::new(path, min, max))
}

fn only(path: &str, types: Vec<TypeReference>) -> Rule {
    Rule::Type(TypeRule::new(path, types))
}

fn assign(path: &str, value: FshValue) -> Rule {
    Rule::Assignment(AssignmentRule::new(path, value))
}

fn tank_with(entities: Vec<StructureEntity>) -> FshTank {
    let mut tank = FshTank::new();
    for entity in entities {
        tank.add_structure(entity);
    }
    tank
}

// ============================================================================
// Metadata
// ============================================================================

#[test]
fn test_profile_metadata() {
    let tank = tank_with(vec![
        StructureEntity::profile("FooProfile", "Observation")
            .with_id("foo")
            .with_title("Foo Observation")
            .with_description("An observation about foo"),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "FooProfile");
    assert_eq!(sd.id.as_deref(), Some("foo"));
    assert_eq!(sd.url, "http://example.org/fhir/StructureDefinition/foo");
    assert_eq!(sd.type_field, "Observation");
    assert_eq!(sd.kind, StructureDefinitionKind::Resource);
    assert_eq!(sd.derivation, Some(Derivation::Constraint));
    assert_eq!(sd.base_definition.as_deref(), Some(core_url("Observation").as_str()));
    assert_eq!(sd.title.as_deref(), Some("Foo Observation"));
    assert_eq!(sd.description.as_deref(), Some("An observation about foo"));
    assert_eq!(sd.status, "draft");
    assert_eq!(sd.fhir_version.as_deref(), Some("4.0.1"));
    assert!(!sd.is_abstract);

    // Snapshot starts as a copy of the parent
    assert_eq!(sd.snapshot_elements()[0].id, "Observation");
    assert!(sd.find_element("Observation.component.value[x]").is_some());
    assert!(sd.differential_elements().is_empty());
}

#[test]
fn test_invalid_name_gets_machine_id() {
    let tank = tank_with(vec![StructureEntity::profile("My Observation", "Observation")]);
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "My Observation");
    assert_eq!(sd.id.as_deref(), Some("My-Observation"));
    assert!(
        warning_messages(&output)
            .iter()
            .any(|m| m.contains("machine-friendly id \"My-Observation\""))
    );
}

// ============================================================================
// Cardinality
// ============================================================================

#[test]
fn test_cardinality_produces_minimal_differential() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation").rule(card("subject", Some(1), Some("1"))),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "Foo");
    let subject = snapshot(sd, "Observation.subject");
    assert_eq!(subject.min, Some(1));
    assert_eq!(subject.max.as_deref(), Some("1"));

    let differential = serde_json::to_value(sd.differential_elements()).unwrap();
    assert_eq!(
        differential,
        json!([{"id": "Observation.subject", "path": "Observation.subject", "min": 1}])
    );
}

#[test]
fn test_cardinality_can_only_narrow() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(card("subject", Some(0), Some("*")))
            .rule(card("status", Some(0), Some("1")))
            .rule(card("identifier", Some(2), Some("1"))),
    ]);
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 3, "{errors:#?}");
    assert!(errors[0].contains("Cannot narrow cardinality of Observation.subject from 0..1 to 0..*"));
    assert!(errors[1].contains("Cannot narrow cardinality of Observation.status from 1..1 to 0..1"));
    assert!(errors[2].contains("min cannot exceed max"));

    // Failed rules leave the definition untouched
    let sd = exported(&output, "Foo");
    assert!(sd.differential_elements().is_empty());
    assert_eq!(snapshot(sd, "Observation.status").min, Some(1));
}

#[test]
fn test_cardinality_on_unfolded_child() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation").rule(card("code.coding", Some(1), None)),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "Foo");
    let coding = snapshot(sd, "Observation.code.coding");
    assert_eq!(coding.min, Some(1));
    assert_eq!(coding.max.as_deref(), Some("*"));
    assert!(sd.find_element("Observation.code.text").is_some());
    assert_eq!(differential_ids(sd), vec!["Observation.code.coding"]);
}

#[test]
fn test_unknown_path_is_reported_and_skipped() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(card("nope", Some(1), None))
            .rule(card("subject", Some(1), None)),
    ]);
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("No element found at path nope for Foo"));
    assert_eq!(differential_ids(exported(&output, "Foo")), vec!["Observation.subject"]);
}

// ============================================================================
// Bindings
// ============================================================================

#[test]
fn test_binding_to_local_value_set() {
    let mut tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation").rule(Rule::Binding(BindingRule::new(
            "category",
            "MyCategories",
            BindingStrength::Extensible,
        ))),
    ]);
    tank.add_value_set(FshValueSet::new("MyCategories"));
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "Foo");
    let binding = snapshot(sd, "Observation.category").binding.as_ref().unwrap();
    assert_eq!(binding.strength, BindingStrength::Extensible);
    assert_eq!(
        binding.value_set.as_deref(),
        Some("http://example.org/fhir/ValueSet/MyCategories")
    );
    assert_eq!(differential_ids(sd), vec!["Observation.category"]);
}

#[test]
fn test_binding_strength_cannot_weaken() {
    let mut tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(Rule::Binding(BindingRule::new(
                "status",
                "MyStatuses",
                BindingStrength::Extensible,
            )))
            .rule(Rule::Binding(BindingRule::new(
                "code",
                "MyStatuses",
                BindingStrength::Preferred,
            ))),
    ]);
    tank.add_value_set(FshValueSet::new("MyStatuses"));
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 1, "{errors:#?}");
    assert!(errors[0].contains("Cannot override required binding on Observation.status"));

    // example -> preferred strengthens the binding
    let sd = exported(&output, "Foo");
    let code = snapshot(sd, "Observation.code").binding.as_ref().unwrap();
    assert_eq!(code.strength, BindingStrength::Preferred);
    let status = snapshot(sd, "Observation.status").binding.as_ref().unwrap();
    assert_eq!(status.strength, BindingStrength::Required);
}

#[test]
fn test_binding_requires_coded_type_and_known_value_set() {
    let mut tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(Rule::Binding(BindingRule::new(
                "subject",
                "MyCategories",
                BindingStrength::Required,
            )))
            .rule(Rule::Binding(BindingRule::new(
                "category",
                "NoSuchValueSet",
                BindingStrength::Required,
            )))
            .rule(Rule::Binding(BindingRule::new(
                "code",
                "http://example.org/ValueSet/external",
                BindingStrength::Required,
            ))),
    ]);
    tank.add_value_set(FshValueSet::new("MyCategories"));
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 2, "{errors:#?}");
    assert!(errors[0].contains("element has no coded type (Reference)"));
    assert!(errors[1].contains("Cannot find value set NoSuchValueSet"));

    // Unknown value sets written as URLs are taken as-is
    let sd = exported(&output, "Foo");
    assert_eq!(
        snapshot(sd, "Observation.code").binding.as_ref().unwrap().value_set.as_deref(),
        Some("http://example.org/ValueSet/external")
    );
}

// ============================================================================
// Types
// ============================================================================

#[test]
fn test_type_rule_narrows_choices() {
    let tank = tank_with(vec![StructureEntity::profile("Foo", "Observation").rule(only(
        "value[x]",
        vec![TypeReference::plain("Quantity"), TypeReference::plain("string")],
    ))]);
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "Foo");
    assert_eq!(type_codes(snapshot(sd, "Observation.value[x]")), vec!["Quantity", "string"]);
    let diff = sd.find_differential("Observation.value[x]").unwrap();
    assert_eq!(diff.type_codes(), vec!["Quantity", "string"]);
}

#[test]
fn test_type_rule_with_profile() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(only("value[x]", vec![TypeReference::plain("SimpleQuantity")])),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let value = snapshot(exported(&output, "Foo"), "Observation.value[x]");
    let types = value.types();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].code, "Quantity");
    assert_eq!(types[0].profiles(), &[core_url("SimpleQuantity")]);
}

#[test]
fn test_reference_targets_narrow() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(only("subject", vec![TypeReference::reference("Patient")]))
            .rule(only("focus", vec![TypeReference::reference("Organization")])),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "Foo");
    let subject = snapshot(sd, "Observation.subject");
    assert_eq!(subject.types()[0].code, "Reference");
    assert_eq!(subject.types()[0].target_profiles(), &[core_url("Patient")]);

    // Reference(Resource) accepts any resource
    let focus = snapshot(sd, "Observation.focus");
    assert_eq!(focus.types()[0].target_profiles(), &[core_url("Organization")]);
}

#[test]
fn test_invalid_type_constraints() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(only("value[x]", vec![TypeReference::plain("Coding")]))
            .rule(only("subject", vec![TypeReference::reference("Organization")]))
            .rule(only("note", vec![TypeReference::plain("NoSuchType")])),
    ]);
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 3, "{errors:#?}");
    assert!(errors[0].contains("The type Coding does not match any of the allowed types"));
    assert!(errors[1].contains("The type Organization is not valid for Observation.subject"));
    assert!(errors[2].contains("Cannot find definition for type NoSuchType"));

    let sd = exported(&output, "Foo");
    assert_eq!(type_codes(snapshot(sd, "Observation.value[x]")).len(), 6);
    assert!(sd.differential_elements().is_empty());
}

// ============================================================================
// Assignments
// ============================================================================

#[test]
fn test_assign_code_as_pattern_and_fixed() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(assign("status", FshValue::Code(FshCode::new("final"))))
            .rule(Rule::Assignment(
                AssignmentRule::new("note", FshValue::String("fixed note".into())).exactly(),
            )),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "Foo");
    let status = snapshot(sd, "Observation.status");
    assert_eq!(status.extra.get("patternCode"), Some(&json!("final")));
    let note = snapshot(sd, "Observation.note");
    assert_eq!(note.extra.get("fixedString"), Some(&json!("fixed note")));

    let diff = serde_json::to_value(sd.find_differential("Observation.status").unwrap()).unwrap();
    assert_eq!(
        diff,
        json!({"id": "Observation.status", "path": "Observation.status", "patternCode": "final"})
    );
}

#[test]
fn test_assign_coding_from_core_code_system() {
    let tank = tank_with(vec![StructureEntity::profile("Foo", "Observation").rule(assign(
        "category",
        FshValue::Code(FshCode::with_system("ObservationCategoryCodes", "vital-signs")),
    ))]);
    let output = export(tank);
    assert_no_errors(&output);

    let category = snapshot(exported(&output, "Foo"), "Observation.category");
    assert_eq!(
        category.extra.get("patternCodeableConcept"),
        Some(&json!({"coding": [{
            "system": "http://terminology.hl7.org/CodeSystem/observation-category",
            "code": "vital-signs"
        }]}))
    );
}

#[test]
fn test_assignment_errors() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(assign("status", FshValue::Code(FshCode::new("final"))))
            .rule(assign("status", FshValue::Code(FshCode::new("amended"))))
            .rule(assign("subject", FshValue::Boolean(true)))
            .rule(assign(
                "category",
                FshValue::Code(FshCode::with_system("ObservationCategoryCodes", "nope")),
            )),
    ]);
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 3, "{errors:#?}");
    assert!(errors[0].contains("It is already assigned the value \"final\""));
    assert!(errors[1].contains("Cannot assign boolean value true to Observation.subject"));
    assert!(errors[2].contains("Code nope is not defined in local code system"));

    let status = snapshot(exported(&output, "Foo"), "Observation.status");
    assert_eq!(status.extra.get("patternCode"), Some(&json!("final")));
}

#[test]
fn test_same_value_can_be_assigned_twice() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(assign("status", FshValue::Code(FshCode::new("final"))))
            .rule(Rule::Assignment(
                AssignmentRule::new("status", FshValue::Code(FshCode::new("final"))).exactly(),
            )),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let status = snapshot(exported(&output, "Foo"), "Observation.status");
    assert_eq!(status.extra.get("fixedCode"), Some(&json!("final")));
    assert!(status.extra.get("patternCode").is_none());
}

#[test]
fn test_assignment_conflicts_with_ancestor_and_descendant() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(assign(
                "code",
                FshValue::Code(FshCode::with_system("http://loinc.org", "1234-5")),
            ))
            .rule(assign("code.coding.code", FshValue::Code(FshCode::new("9999-9"))))
            .rule(assign(
                "category.coding.system",
                FshValue::String("http://snomed.info/sct".into()),
            ))
            .rule(assign(
                "category",
                FshValue::Code(FshCode::with_system("http://loinc.org", "1234-5")),
            )),
    ]);
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 2, "{errors:#?}");
    assert!(errors[0].contains("Cannot assign \"9999-9\" to Observation.code.coding.code"));
    assert!(errors[0].contains("already assigned on Observation.code"));
    assert!(errors[1].contains("Cannot assign"));
    assert!(errors[1].contains("already assigned on Observation.category.coding.system"));

    // The earlier, more specific values win
    let sd = exported(&output, "Foo");
    assert!(snapshot(sd, "Observation.code").extra.contains_key("patternCodeableConcept"));
    assert!(snapshot(sd, "Observation.code.coding.code").extra.get("patternCode").is_none());
    assert_eq!(
        snapshot(sd, "Observation.category.coding.system").extra.get("patternUri"),
        Some(&json!("http://snomed.info/sct"))
    );
    assert!(snapshot(sd, "Observation.category").extra.get("patternCodeableConcept").is_none());
}

#[test]
fn test_local_code_system_membership() {
    let mut tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(assign("category", FshValue::Code(FshCode::with_system("MyCodes", "c"))))
            .rule(assign("code", FshValue::Code(FshCode::with_system("PartialCodes", "z")))),
    ]);
    tank.add_code_system(FshCodeSystem::new("MyCodes").with_concepts(&["a", "b"]));
    tank.add_code_system(
        FshCodeSystem::new("PartialCodes")
            .with_concepts(&["a"])
            .with_content("fragment"),
    );
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 1, "{errors:#?}");
    assert!(errors[0].contains("Code c is not defined in local code system MyCodes"));

    // Fragments are not checked for membership
    let sd = exported(&output, "Foo");
    assert!(snapshot(sd, "Observation.category").extra.get("patternCodeableConcept").is_none());
    assert_eq!(
        snapshot(sd, "Observation.code").extra.get("patternCodeableConcept"),
        Some(&json!({"coding": [{
            "system": "http://example.org/fhir/CodeSystem/PartialCodes",
            "code": "z"
        }]}))
    );
}

// ============================================================================
// Flags
// ============================================================================

#[test]
fn test_flags() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(Rule::Flag(FlagRule::new("code", &[Flag::MustSupport, Flag::Summary])))
            .rule(Rule::Flag(FlagRule::new("note", &[Flag::TrialUse]))),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "Foo");
    let code = snapshot(sd, "Observation.code");
    assert_eq!(code.must_support, Some(true));
    assert_eq!(code.is_summary, Some(true));

    let note = snapshot(sd, "Observation.note");
    let status = note.extension.as_ref().unwrap();
    assert_eq!(status[0]["valueCode"], "trial-use");
    assert_eq!(differential_ids(sd), vec!["Observation.code", "Observation.note"]);
}

#[test]
fn test_conflicting_standards_status() {
    let tank = tank_with(vec![StructureEntity::profile("Foo", "Observation").rule(Rule::Flag(
        FlagRule::new("code", &[Flag::Normative, Flag::Draft, Flag::MustSupport]),
    ))]);
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("more than one standards status flag"));
    // Other flags of the rule still apply
    assert_eq!(snapshot(exported(&output, "Foo"), "Observation.code").must_support, Some(true));
}

#[test]
fn test_inherited_flags_cannot_be_removed() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(Rule::Flag(FlagRule::new("code", &[Flag::MustSupport])))
            .rule(Rule::Flag(FlagRule {
                must_support: Some(false),
                ..FlagRule::new("code", &[])
            }))
            .rule(Rule::Flag(FlagRule {
                modifier: Some(false),
                ..FlagRule::new("status", &[])
            })),
    ]);
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 2, "{errors:#?}");
    assert!(errors[0].contains("Cannot remove mustSupport from Observation.code"));
    assert!(errors[1].contains("Cannot remove isModifier from Observation.status"));

    let sd = exported(&output, "Foo");
    assert_eq!(snapshot(sd, "Observation.code").must_support, Some(true));
    assert_eq!(snapshot(sd, "Observation.status").is_modifier, Some(true));
    assert_eq!(differential_ids(sd), vec!["Observation.code"]);
}

#[test]
fn test_standards_status_is_replaced_in_place() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(Rule::Flag(FlagRule::new("note", &[Flag::TrialUse])))
            .rule(Rule::Flag(FlagRule::new("note", &[Flag::Normative]))),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let note = snapshot(exported(&output, "Foo"), "Observation.note");
    let extensions = note.extension.as_ref().unwrap();
    assert_eq!(extensions.len(), 1);
    assert_eq!(extensions[0]["valueCode"], "normative");
}

// ============================================================================
// Caret rules
// ============================================================================

#[test]
fn test_caret_rules_on_definition_and_element() {
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(Rule::CaretValue(CaretValueRule::on_definition(
                "publisher",
                FshValue::String("Example Publisher".into()),
            )))
            .rule(Rule::CaretValue(CaretValueRule::on_definition(
                "experimental",
                FshValue::Boolean(true),
            )))
            .rule(Rule::CaretValue(CaretValueRule::on_element(
                "status",
                "short",
                FshValue::String("Status of the result".into()),
            ))),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "Foo");
    assert_eq!(sd.publisher.as_deref(), Some("Example Publisher"));
    assert_eq!(sd.extra.get("experimental"), Some(&json!(true)));
    assert_eq!(snapshot(sd, "Observation.status").short.as_deref(), Some("Status of the result"));
    assert_eq!(differential_ids(sd), vec!["Observation.status"]);
}

#[test]
fn test_caret_url_override() {
    let tank = tank_with(vec![StructureEntity::profile("Foo", "Observation").rule(
        Rule::CaretValue(CaretValueRule::on_definition(
            "url",
            FshValue::String("http://other.org/StructureDefinition/foo".into()),
        )),
    )]);
    let output = export(tank);
    assert_no_errors(&output);
    assert_eq!(exported(&output, "Foo").url, "http://other.org/StructureDefinition/foo");
}

// ============================================================================
// Invariants and mappings
// ============================================================================

#[test]
fn test_obeys() {
    let mut tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(Rule::Obeys(ObeysRule::new(Some("value[x]"), "foo-1")))
            .rule(Rule::Obeys(ObeysRule::new(None, "foo-1")))
            .rule(Rule::Obeys(ObeysRule::new(Some("value[x]"), "foo-1")))
            .rule(Rule::Obeys(ObeysRule::new(Some("note"), "missing-1"))),
    ]);
    tank.add_invariant(
        Invariant::new("foo-1", ConstraintSeverity::Error)
            .with_description("Value must be present")
            .with_expression("value.exists()"),
    );
    let output = export(tank);

    let errors = error_messages(&output);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Cannot find invariant missing-1"));

    let sd = exported(&output, "Foo");
    let constraints = snapshot(sd, "Observation.value[x]").constraint.as_ref().unwrap();
    assert_eq!(constraints.len(), 1);
    assert_eq!(constraints[0].key, "foo-1");
    assert_eq!(constraints[0].severity.as_deref(), Some("error"));
    assert_eq!(constraints[0].human, "Value must be present");
    assert_eq!(constraints[0].expression.as_deref(), Some("value.exists()"));
    assert_eq!(constraints[0].source.as_deref(), Some(sd.url.as_str()));
    assert!(snapshot(sd, "Observation").has_constraint("foo-1"));
}

#[test]
fn test_mapping() {
    let mut status_map = MappingRule::new(Some("status"), "fivews", "FiveWs.status");
    status_map.uri = Some("http://hl7.org/fhir/fivews".into());
    status_map.name = Some("FiveWs Pattern".into());
    let root_map = MappingRule::new(None, "fivews", "FiveWs.Event");
    let tank = tank_with(vec![
        StructureEntity::profile("Foo", "Observation")
            .rule(Rule::Mapping(status_map))
            .rule(Rule::Mapping(root_map)),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let sd = exported(&output, "Foo");
    let mappings = snapshot(sd, "Observation.status").mapping.as_ref().unwrap();
    assert_eq!(mappings[0].identity, "fivews");
    assert_eq!(mappings[0].map, "FiveWs.status");
    assert_eq!(snapshot(sd, "Observation").mapping.as_ref().unwrap()[0].map, "FiveWs.Event");

    let declared = sd.mapping.as_ref().unwrap();
    assert_eq!(declared.len(), 1);
    assert_eq!(declared[0].uri.as_deref(), Some("http://hl7.org/fhir/fivews"));
    assert_eq!(declared[0].name.as_deref(), Some("FiveWs Pattern"));
}

// ============================================================================
// Parents
// ============================================================================

#[test]
fn test_parent_errors_skip_the_entity() {
    let mut tank = tank_with(vec![
        StructureEntity::profile("NoParent", ""),
        StructureEntity::profile("Orphan", "NoSuchParent"),
        StructureEntity::profile("Observation", "Observation"),
        StructureEntity::profile("WrongKind", "SomeCodes"),
    ]);
    tank.add_value_set(FshValueSet::new("SomeCodes"));
    let output = export(tank);

    assert!(output.package.is_empty());
    let errors = error_messages(&output);
    assert_eq!(errors.len(), 4, "{errors:#?}");
    assert!(errors[0].contains("NoParent does not include a Parent"));
    assert!(errors[1].contains("Parent NoSuchParent not found for Orphan"));
    assert!(errors[2].contains("Observation cannot declare itself as its own Parent"));
    assert!(errors[2].contains(&core_url("Observation")));
    assert!(errors[3].contains("refers to a ValueSet in this project"));
}

#[test]
fn test_local_parent_is_compiled_first() {
    let tank = tank_with(vec![
        StructureEntity::profile("Child", "Parent").rule(card("note", Some(1), None)),
        StructureEntity::profile("Parent", "Observation").rule(card("subject", Some(1), None)),
    ]);
    let output = export(tank);
    assert_no_errors(&output);

    let child = exported(&output, "Child");
    assert_eq!(
        child.base_definition.as_deref(),
        Some("http://example.org/fhir/StructureDefinition/Parent")
    );
    assert_eq!(snapshot(child, "Observation.subject").min, Some(1));
    assert_eq!(differential_ids(child), vec!["Observation.note"]);
    assert_eq!(differential_ids(exported(&output, "Parent")), vec!["Observation.subject"]);
    assert_eq!(output.package.len(), 2);
}

// ============================================================================
// Ids
// ============================================================================

#[test]
fn test_duplicate_and_invalid_ids() {
    let tank = tank_with(vec![
        StructureEntity::profile("First", "Observation").with_id("dup"),
        StructureEntity::profile("Second", "Patient").with_id("dup"),
        StructureEntity::profile("Third", "Patient").with_id("not valid!"),
    ]);
    let output = export(tank);

    // Definitions are still produced
    assert_eq!(output.package.len(), 3);
    let errors = error_messages(&output);
    assert_eq!(errors.len(), 2, "{errors:#?}");
    assert!(errors[0].starts_with("Multiple structure definitions with id dup"));
    assert!(errors[1].contains("\"not valid!\" does not represent a valid FHIR id"));
}

#[test]
fn test_compilation_is_deterministic() {
    let build = || {
        let mut tank = tank_with(vec![
            StructureEntity::profile("Foo", "Observation")
                .rule(card("subject", Some(1), None))
                .rule(only(
                    "value[x]",
                    vec![TypeReference::plain("Quantity"), TypeReference::plain("string")],
                ))
                .rule(Rule::Binding(BindingRule::new(
                    "code",
                    "MyCodes",
                    BindingStrength::Extensible,
                )))
                .rule(assign("status", FshValue::Code(FshCode::new("final"))))
                .rule(Rule::Flag(FlagRule::new("valueQuantity", &[Flag::MustSupport]))),
        ]);
        tank.add_value_set(FshValueSet::new("MyCodes"));
        tank
    };

    let first = export(build());
    let second = export(build());
    assert_no_errors(&first);

    let first_sd = serde_json::to_value(exported(&first, "Foo")).unwrap();
    let second_sd = serde_json::to_value(exported(&second, "Foo")).unwrap();
    assert_eq!(first_sd["snapshot"], second_sd["snapshot"]);
    assert_eq!(first_sd["differential"], second_sd["differential"]);
}
