//! StructureDefinition exporter
//!
//! Drives compilation of every structure entity in the tank. Each entity is
//! compiled at most once: its parent is resolved and cloned, its rules are
//! applied in order against an [`ElementTree`], and the result is published
//! into the [`Package`] with a snapshot and a minimal differential.
//!
//! Entities may be compiled out of order when another entity needs them
//! (as a parent, a type or a reference target). Mutual dependencies are
//! broken with read-only partial views, see [`super::cycle`].

use super::cycle::CycleTracker;
use super::differential::compute_differential;
use crate::config::ExportConfig;
use crate::diagnostics::{Diagnostics, SourceLocation};
use crate::error::{ExportError, ExportResult};
use crate::fhir::naming::is_valid_id;
use crate::fhir::{StructureDefinition, StructureDefinitionDifferential, StructureDefinitionSnapshot};
use crate::fishing::{Fishable, Package};
use crate::fsh::{EntityCategory, FshTank, Rule, StructureEntity};
use crate::tree::{ElementTree, SoftIndexCursor};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

/// Everything produced by one export run
#[derive(Debug)]
pub struct ExportOutput {
    pub package: Package,
    pub diagnostics: Diagnostics,
}

/// State of one entity while its rules are being applied
#[derive(Debug)]
pub(crate) struct Compilation {
    pub name: String,
    pub category: EntityCategory,
    /// Metadata of the definition; snapshot and differential stay empty until finalized
    pub sd: StructureDefinition,
    pub tree: ElementTree,
    pub soft_index: SoftIndexCursor,
    /// Element ids addressed by at least one rule
    pub rule_targets: HashSet<String>,
    /// Location of the rule currently being applied
    pub location: Option<SourceLocation>,
    pub entity_location: Option<SourceLocation>,
}

impl Compilation {
    pub fn new(
        entity: &StructureEntity,
        sd: StructureDefinition,
        tree: ElementTree,
    ) -> Self {
        Self {
            name: entity.name.clone(),
            category: entity.category,
            sd,
            tree,
            soft_index: SoftIndexCursor::new(),
            rule_targets: HashSet::new(),
            location: entity.location.clone(),
            entity_location: entity.location.clone(),
        }
    }

    /// Read-only snapshot of the definition as it stands now
    pub fn view(&self) -> StructureDefinition {
        let mut sd = self.sd.clone();
        sd.snapshot = Some(StructureDefinitionSnapshot {
            element: self.tree.elements(),
        });
        sd.differential = None;
        sd
    }

    /// Whether any rule addressed `id` or an element below it
    pub fn has_rules_at_or_below(&self, id: &str) -> bool {
        self.rule_targets.iter().any(|target| {
            target == id
                || target
                    .strip_prefix(id)
                    .is_some_and(|rest| rest.starts_with(['.', ':', '/']))
        })
    }
}

/// Compiles FSH structure entities into StructureDefinitions
pub struct StructureDefinitionExporter {
    pub(crate) config: ExportConfig,
    pub(crate) tank: Arc<FshTank>,
    pub(crate) definitions: Arc<dyn Fishable>,
    pub(crate) package: Package,
    pub(crate) cycles: CycleTracker,
    pub(crate) attempted: HashSet<String>,
    pub(crate) diagnostics: Diagnostics,
}

impl StructureDefinitionExporter {
    pub fn new(config: ExportConfig, tank: Arc<FshTank>, definitions: Arc<dyn Fishable>) -> Self {
        Self {
            config,
            tank,
            definitions,
            package: Package::new(),
            cycles: CycleTracker::new(),
            attempted: HashSet::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Compile every structure entity in the tank, in authored order
    pub fn export(mut self) -> ExportOutput {
        let tank = Arc::clone(&self.tank);
        let names: Vec<String> = tank.structures().map(|e| e.name.clone()).collect();
        info!("Exporting {} structure definitions", names.len());

        for name in &names {
            self.export_entity(name);
        }

        for cycle in self.cycles.cycles() {
            self.diagnostics.debug(
                format!("Circular dependency between {}", cycle.join(" -> ")),
                None,
            );
        }

        info!(
            "Exported {} structure definitions ({} errors, {} warnings)",
            self.package.len(),
            self.diagnostics.error_count(),
            self.diagnostics.warning_count()
        );
        ExportOutput {
            package: self.package,
            diagnostics: self.diagnostics,
        }
    }

    /// Compile a single entity (once); returns the URL of the result
    #[instrument(skip(self))]
    pub fn export_entity(&mut self, name: &str) -> Option<String> {
        if let Some(done) = self.package.find_by_name(name) {
            return Some(done.url.clone());
        }
        if !self.attempted.insert(name.to_string()) {
            return None;
        }
        let tank = Arc::clone(&self.tank);
        let entity = tank.structure(name)?;

        self.cycles.begin(name);
        trace!(
            "Compiling {} (in progress: {})",
            name,
            self.cycles.stack().collect::<Vec<_>>().join(", ")
        );
        let url = match self.start_compilation(entity) {
            Ok(mut comp) => {
                for sourced in &entity.rules {
                    comp.location = sourced.location.clone().or_else(|| comp.entity_location.clone());
                    if let Err(err) = self.apply_rule(&mut comp, &sourced.rule) {
                        self.report(&comp, err);
                    }
                }
                comp.location = comp.entity_location.clone();
                Some(self.finish_compilation(entity, comp))
            }
            Err(err) => {
                self.diagnostics
                    .error(err.to_string(), entity.location.as_ref());
                None
            }
        };
        self.package.remove_partial(name);
        self.cycles.finish(name);
        url
    }

    pub(crate) fn apply_rule(&mut self, comp: &mut Compilation, rule: &Rule) -> ExportResult<()> {
        debug!("{}: applying {} at {}", comp.name, rule.rule_type(), rule.path());
        match rule {
            Rule::Cardinality(r) => self.apply_cardinality(comp, r),
            Rule::Flag(r) => self.apply_flags(comp, r),
            Rule::Binding(r) => self.apply_binding(comp, r),
            Rule::Type(r) => self.apply_type_rule(comp, r),
            Rule::Assignment(r) => self.apply_assignment(comp, r),
            Rule::Contains(r) => self.apply_contains(comp, r),
            Rule::CaretValue(r) => self.apply_caret_value(comp, r),
            Rule::Obeys(r) => self.apply_obeys(comp, r),
            Rule::AddElement(r) => self.apply_add_element(comp, r),
            Rule::Mapping(r) => self.apply_mapping(comp, r),
        }
    }

    fn finish_compilation(&mut self, entity: &StructureEntity, mut comp: Compilation) -> String {
        if entity.category == EntityCategory::Extension {
            self.finish_extension(&mut comp);
        }

        let id = comp.sd.id.clone().unwrap_or_default();
        if !is_valid_id(&id) {
            self.diagnostics.error(
                ExportError::InvalidId { id: id.clone() }.to_string(),
                comp.entity_location.as_ref(),
            );
        }
        if self.package.count_with_id(&id) > 0 {
            self.diagnostics.error(
                ExportError::DuplicateId { id: id.clone() }.to_string(),
                comp.entity_location.as_ref(),
            );
        }

        let differential = compute_differential(&comp.tree);
        let mut sd = comp.sd;
        sd.snapshot = Some(StructureDefinitionSnapshot {
            element: comp.tree.elements(),
        });
        sd.differential = Some(StructureDefinitionDifferential {
            element: differential,
        });
        let url = sd.url.clone();
        debug!("Finished {} ({} snapshot elements)", entity.name, sd.snapshot_elements().len());
        self.package.add(entity.category, sd);
        url
    }

    /// Log a rule error (and its cause chain at debug level)
    pub(crate) fn report(&mut self, comp: &Compilation, err: ExportError) {
        if let Some(source) = std::error::Error::source(&err) {
            self.diagnostics
                .debug(format!("Caused by: {source}"), comp.location.as_ref());
        }
        self.diagnostics
            .error(err.to_string(), comp.location.as_ref());
    }

    pub(crate) fn warn(&mut self, comp: &Compilation, message: impl Into<String>) {
        self.diagnostics.warning(message, comp.location.as_ref());
    }
}
