//! FSH input model: entities, rules, values and the tank

pub mod entity;
pub mod invariant;
pub mod rules;
pub mod value;

pub use entity::{
    EntityCategory, FshCodeSystem, FshInstance, FshTank, FshValueSet, SourcedRule,
    StructureEntity,
};
pub use invariant::{ConstraintSeverity, Invariant};
pub use rules::{
    AddElementRule, AssignmentRule, BindingRule, CardinalityRule, CaretValueRule, ContainsItem,
    ContainsRule, Flag, FlagRule, MappingRule, ObeysRule, Rule, TypeRefKind, TypeReference,
    TypeRule,
};
pub use value::{FshCanonical, FshCode, FshQuantity, FshReference, FshValue};
