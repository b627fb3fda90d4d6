//! FHIR StructureDefinition and ElementDefinition models
//!
//! Simplified, serde-backed definitions focused on the fields compilation
//! touches. Unknown fields are preserved through flattened maps.

pub mod element;
pub mod naming;
pub mod structure_definition;
pub mod types;

pub use element::{AssignmentKind, ElementDefinition, upper_first};
pub use structure_definition::{
    Derivation, StructureDefinition, StructureDefinitionContext, StructureDefinitionDifferential,
    StructureDefinitionKind, StructureDefinitionMapping, StructureDefinitionSnapshot,
};
pub use types::{
    BindingStrength, ElementDefinitionBase, ElementDefinitionBinding, ElementDefinitionConstraint,
    ElementDefinitionMapping, ElementDefinitionSlicing, ElementDefinitionType, MaxCardinality,
    SlicingDiscriminator, SlicingRules,
};

/// Canonical base for FHIR core definitions
pub const FHIR_CORE_BASE: &str = "http://hl7.org/fhir/StructureDefinition/";

/// Canonical URL of a FHIR core StructureDefinition
pub fn core_url(type_name: &str) -> String {
    format!("{FHIR_CORE_BASE}{type_name}")
}

/// Standards status extension written by trial-use/normative/draft flags
pub const STANDARDS_STATUS_EXTENSION: &str =
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-standards-status";

/// Type characteristics extension (R5 style) used by logical models
pub const TYPE_CHARACTERISTICS_EXTENSION: &str =
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-type-characteristics";

/// Tooling extension marking a logical model as a reference target
pub const LOGICAL_TARGET_EXTENSION: &str =
    "http://hl7.org/fhir/tools/StructureDefinition/logical-target";

/// Primitive and complex types that may carry a terminology binding
pub const BINDABLE_TYPES: &[&str] = &[
    "code",
    "Coding",
    "CodeableConcept",
    "CodeableReference",
    "Quantity",
    "string",
    "uri",
];
