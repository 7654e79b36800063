//! rust-schemaupgrade: a staged schema upgrade planner
//!
//! This library diffs an extracted physical catalog against the storage
//! model implied by the current domain model and plans a staged, safe
//! upgrade: reconcile user hints, compare the two storage models, then
//! translate the resulting actions into provider-level operations,
//! emulating whatever the provider cannot do natively.

pub mod builder;
pub mod compare;
pub mod domain;
pub mod error;
pub mod hints;
pub mod model;
pub mod provider;
pub mod reconcile;
pub mod translate;

pub use error::UpgradeError;

use crate::builder::{NodeMapping, PhysicalCatalog};
use crate::compare::ActionSequence;
use crate::domain::DomainModel;
use crate::hints::HintSet;
use crate::model::StorageModel;
use crate::provider::{ProviderCapabilities, WildcardMatcher};
use crate::reconcile::{ReconcileOptions, ReconcileResult};
use crate::translate::{UpgradeActionSequence, UpgradeMode};

/// Options for planning an upgrade
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    /// Reconciliation behaviour (hint auto-detection etc.)
    pub reconcile: ReconcileOptions,
    /// Physical-to-logical name mapping and ignore rules
    pub mapping: NodeMapping,
    /// Capabilities of the target provider
    pub capabilities: ProviderCapabilities,
    /// Whether unsafe actions abort the plan or are carried through
    pub mode: UpgradeMode,
    /// Enable verbose output
    pub verbose: bool,
}

/// Everything a planned upgrade produces, kept for inspection.
#[derive(Debug)]
pub struct UpgradePlan {
    pub source: StorageModel,
    pub target: StorageModel,
    pub reconciled: ReconcileResult,
    pub actions: ActionSequence,
    pub operations: UpgradeActionSequence,
}

/// Plan an upgrade from an extracted catalog to the current domain model.
pub fn plan_upgrade(
    catalog: &PhysicalCatalog,
    old_domain: &DomainModel,
    new_domain: &DomainModel,
    input_hints: &HintSet,
    options: &UpgradeOptions,
) -> Result<UpgradePlan, UpgradeError> {
    if options.verbose {
        println!(
            "Planning upgrade of catalog '{}' ({} hints)",
            catalog.name,
            input_hints.hints.len()
        );
    }

    // Step 1: reconcile the two domain models under the given hints
    let reconciled = reconcile::process(old_domain, new_domain, input_hints, &options.reconcile)?;

    if options.verbose {
        println!(
            "Reconciled {} type pairs, {} synthesized data hints",
            reconciled.mapping.type_pairs().count(),
            reconciled.schema_hints.len()
        );
    }

    // Step 2: build the two storage models
    let mut matcher = WildcardMatcher::default();
    let source = builder::build_extracted_model(catalog, &options.mapping, &mut matcher)?;
    let target = builder::build_domain_model(new_domain, &options.capabilities)?;

    if options.verbose {
        println!(
            "Source model has {} tables, target model has {}",
            source.tables().count(),
            target.tables().count()
        );
    }

    // Step 3: diff the models into staged actions
    let actions = compare::compare(&source, &target, &reconciled.schema_hints)?;

    if options.verbose {
        println!("Compared models: {} actions", actions.len());
    }

    // Step 4: translate actions into provider operations
    let operations = translate::translate(
        &source,
        &target,
        &actions,
        &reconciled,
        &options.capabilities,
        options.mode,
    )?;

    if options.verbose {
        println!(
            "Translated into {} operations ({} flagged unsafe)",
            operations.operation_count(),
            operations.unsafe_operations.len()
        );
    }

    Ok(UpgradePlan {
        source,
        target,
        reconciled,
        actions,
        operations,
    })
}
