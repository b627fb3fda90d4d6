//! Maki Structure
//!
//! StructureDefinition compilation engine for FHIR Shorthand. Profiles,
//! extensions, logical models and custom resources are compiled from their
//! authored rules into StructureDefinitions carrying a full snapshot and a
//! minimal differential.
//!
//! ```no_run
//! use maki_structure::{DefinitionIndex, ExportConfig, FshTank, StructureDefinitionExporter};
//! use std::sync::Arc;
//!
//! let config = ExportConfig::new("http://example.org/fhir");
//! let tank = Arc::new(FshTank::new());
//! let core = Arc::new(DefinitionIndex::new());
//! let output = StructureDefinitionExporter::new(config, tank, core).export();
//! println!("{} definitions", output.package.len());
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod fhir;
pub mod fishing;
pub mod fsh;
pub mod tree;

// Re-export commonly used types
pub use config::{ConfigError, ExportConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity, SourceLocation};
pub use error::{ExportError, ExportResult};
pub use export::{ExportOutput, StructureDefinitionExporter};
pub use fhir::{ElementDefinition, StructureDefinition};
pub use fishing::{DefinitionIndex, FhirType, FishMetadata, Fishable, Package};
pub use fsh::{EntityCategory, FshTank, Rule, StructureEntity};
pub use tree::ElementTree;

/// Initialize the tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("maki_structure=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
