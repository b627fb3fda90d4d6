//! StructureDefinition export
//!
//! [`StructureDefinitionExporter`] compiles Profile, Extension, Logical and
//! Resource entities from a [`crate::fsh::FshTank`]. Rule appliers live in
//! one module per rule kind and all operate on the in-progress
//! compilation of one entity.

mod add_element;
mod assignment;
mod binding;
mod cardinality;
mod caret;
mod contains;
mod cycle;
mod differential;
mod exporter;
mod extension;
mod flags;
mod mapping;
mod obeys;
mod parent;
mod path_resolution;
mod resolve;
mod slice_cascade;
mod type_constraint;

pub use exporter::{ExportOutput, StructureDefinitionExporter};
