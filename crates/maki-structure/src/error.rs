//! Error types for StructureDefinition compilation
//!
//! Every failure a rule can produce is a variant of [`ExportError`]. Errors are
//! never propagated out of a run: the exporter converts them into diagnostics
//! and moves on to the next rule or entity.

use thiserror::Error;

/// Errors raised while compiling a single FSH entity into a StructureDefinition
#[derive(Debug, Error)]
pub enum ExportError {
    // Parent resolution (entity-fatal)
    #[error("The definition for {name} does not include a Parent")]
    ParentNotProvided { name: String },

    #[error("Parent {parent} not found for {name}")]
    ParentNotDefined { name: String, parent: String },

    #[error(
        "The parent of {category} {name} ({parent}) is not a valid parent for {category} definitions. {expected}"
    )]
    InvalidParentCategory {
        name: String,
        category: String,
        parent: String,
        expected: String,
    },

    #[error("{name} cannot declare itself as its own Parent.{hint}")]
    ParentDeclaredAsSelf { name: String, hint: String },

    #[error("{name} cannot declare its own id ({id}) as its Parent.{hint}")]
    ParentDeclaredAsId {
        name: String,
        id: String,
        hint: String,
    },

    #[error(
        "Parent {parent} of {name} refers to a {kind} in this project, not to a StructureDefinition"
    )]
    ParentNameConflict {
        name: String,
        parent: String,
        kind: String,
    },

    // Path resolution
    #[error("No element found at path {path} for {entity}, skipping rule")]
    PathNotFound { path: String, entity: String },

    // Cardinality
    #[error(
        "Cannot narrow cardinality of {path} from {current} to {requested}: cardinality may only be narrowed"
    )]
    NarrowedCardinality {
        path: String,
        current: String,
        requested: String,
    },

    #[error("Invalid cardinality {requested} on {path}: min cannot exceed max")]
    InvalidCardinality { path: String, requested: String },

    #[error(
        "Cannot set cardinality of {path} to {requested}: existing slice {slice} allows {slice_card}"
    )]
    SlicedCardinalityConflict {
        path: String,
        requested: String,
        slice: String,
        slice_card: String,
    },

    #[error(
        "Cardinality {requested} of slice {path} does not fit inside the cardinality {root_card} of the sliced element"
    )]
    SliceCardinalityOutOfBounds {
        path: String,
        requested: String,
        root_card: String,
    },

    #[error("Invalid max cardinality '{value}' on {path}")]
    InvalidMaxCardinality {
        path: String,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    // Bindings
    #[error(
        "Cannot override {current} binding on {path} with weaker {requested} binding to {value_set}"
    )]
    InvalidBindingStrength {
        path: String,
        current: String,
        requested: String,
        value_set: String,
    },

    #[error("Cannot bind value set {value_set} to {path}: element has no coded type ({types})")]
    CodedTypeNotFound {
        path: String,
        value_set: String,
        types: String,
    },

    #[error("Cannot find value set {value_set} to bind on {path}")]
    ValueSetNotFound { path: String, value_set: String },

    // Types
    #[error("The type {type_name} does not match any of the allowed types of {path}: {allowed}")]
    InvalidTypeConstraint {
        path: String,
        type_name: String,
        allowed: String,
    },

    #[error("Cannot find definition for type {type_name} used on {path}")]
    TypeNotFound { path: String, type_name: String },

    #[error(
        "Cannot constrain {path} to {types}: existing slice {slice} only allows {slice_types}"
    )]
    SliceTypeConflict {
        path: String,
        types: String,
        slice: String,
        slice_types: String,
    },

    #[error(
        "Constraining types of {path} removes the type of its assigned value {value_key}; the value is no longer valid"
    )]
    AssignedValueTypeRemoved { path: String, value_key: String },

    #[error("CodeableReference(...) is only supported for FHIR R5 and later, used on {path}")]
    CodeableReferenceUnsupported { path: String },

    // Assignments
    #[error("Cannot assign {new_value} to {path}. It is already assigned the value {existing}")]
    ValueAlreadyAssigned {
        path: String,
        existing: String,
        new_value: String,
    },

    #[error("Cannot assign {value_kind} value {value} to {path}: allowed types are {types}")]
    MismatchedType {
        path: String,
        value_kind: String,
        value: String,
        types: String,
    },

    #[error("Cannot assign {value} to {path}: it conflicts with {existing} already assigned on {other}")]
    ConflictingAssignment {
        path: String,
        value: String,
        other: String,
        existing: String,
    },

    #[error(
        "The type {target} is not valid for {path}. Allowed reference targets are: {allowed}"
    )]
    InvalidReferenceTarget {
        path: String,
        target: String,
        allowed: String,
    },

    #[error("Cannot find instance {name} to assign on {path}")]
    InstanceNotFound { path: String, name: String },

    #[error("Cannot find definition for {name} to assign on {path}")]
    CanonicalNotFound { path: String, name: String },

    #[error("Code {code} is not defined in local code system {system}")]
    CodeNotInSystem { code: String, system: String },

    // Slicing
    #[error(
        "Cannot create slice {slice} on {path}: slicing is not defined. Define it with ^slicing rules first"
    )]
    SlicingNotDefined { path: String, slice: String },

    #[error("Slice named {slice} already exists on {path}")]
    DuplicateSliceName { path: String, slice: String },

    #[error("Cannot create extension slice {slice} on {path}: {reason}")]
    InvalidExtensionSlice {
        path: String,
        slice: String,
        reason: String,
    },

    #[error("Cannot find definition for extension {extension} used in slice {slice} on {path}")]
    ExtensionNotFound {
        path: String,
        slice: String,
        extension: String,
    },

    #[error(
        "Extension {extension} on {path} cannot use both value[x] and extension; one of them must be 0..0"
    )]
    ExtensionValueAndExtension { path: String, extension: String },

    // Flags
    #[error("MustSupport cannot be set on {path}: {category} elements may not be authored as must support")]
    InvalidMustSupport { path: String, category: String },

    #[error("Cannot remove {flag} from {path}: it is already set to true")]
    DisableFlag { path: String, flag: String },

    #[error(
        "Cannot apply more than one standards status flag (trial use, normative, draft) to {path}"
    )]
    MultipleStandardsStatus { path: String },

    // Invariants, caret paths, add-element
    #[error("Cannot find invariant {name} for {path}")]
    InvariantNotFound { path: String, name: String },

    #[error("Cannot assign {value} to caret path {caret_path} on {path}: {reason}")]
    InvalidCaretPath {
        path: String,
        caret_path: String,
        value: String,
        reason: String,
    },

    #[error("The element name {name} is not valid: {reason}")]
    InvalidElementName { name: String, reason: String },

    #[error("Cannot add element {path}: {reason}")]
    InvalidAddElement { path: String, reason: String },

    #[error("{rule} rules can only be used on Logical and Resource definitions, not on {entity}")]
    RuleNotAllowed { rule: String, entity: String },

    // Metadata
    #[error(
        "The string \"{id}\" does not represent a valid FHIR id. FHIR ids only allow ASCII letters (A-Z, a-z), numbers (0-9), hyphens (-), and dots (.), with a length limit of 64 characters"
    )]
    InvalidId { id: String },

    #[error(
        "Multiple structure definitions with id {id}. Each structure definition must have a unique id."
    )]
    DuplicateId { id: String },

    #[error("Failed to read definition {name}: {source}")]
    MalformedDefinition {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ExportError {
    /// Whether this error prevents the entity from being produced at all
    pub fn is_entity_fatal(&self) -> bool {
        matches!(
            self,
            ExportError::ParentNotProvided { .. }
                | ExportError::ParentNotDefined { .. }
                | ExportError::InvalidParentCategory { .. }
                | ExportError::ParentDeclaredAsSelf { .. }
                | ExportError::ParentDeclaredAsId { .. }
                | ExportError::ParentNameConflict { .. }
        )
    }

    pub fn path_not_found(path: impl Into<String>, entity: impl Into<String>) -> Self {
        ExportError::PathNotFound {
            path: path.into(),
            entity: entity.into(),
        }
    }
}

/// Result type for rule application
pub type ExportResult<T> = std::result::Result<T, ExportError>;
