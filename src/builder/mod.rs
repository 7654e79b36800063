//! Catalog/model builders
//!
//! Conversions between the three schema representations: the extracted
//! physical catalog graph, the storage model used by the comparer, and the
//! domain model's idealized storage model. Also hosts the pure catalog
//! clone used for multi-tenant node deployments.

mod clone;
mod domain_builder;
mod physical;

pub use clone::clone_catalog;
pub use domain_builder::{build_domain_model, TYPE_ID_COLUMN};
pub use physical::{
    build_extracted_model, NodeMapping, PartitionFunction, PartitionScheme, PhysicalCatalog,
    PhysicalColumn, PhysicalDomain, PhysicalForeignKey, PhysicalFullTextIndex, PhysicalIndex,
    PhysicalPrimaryKey, PhysicalSchema, PhysicalSequence, PhysicalTable, PhysicalView,
};
