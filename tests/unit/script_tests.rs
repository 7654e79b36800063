//! Tests for the collaborator seams: script rendering and extraction

use rust_schemaupgrade::builder::{PhysicalCatalog, PhysicalSchema};
use rust_schemaupgrade::provider::{
    ExtractionTask, RecordingCompiler, SchemaExtractor, ScriptExecutor, StatementCompiler,
    StatementExecutor,
};
use rust_schemaupgrade::translate::StructuralOperation;
use rust_schemaupgrade::UpgradeError;

#[test]
fn recording_compiler_renders_diagnostic_lines() {
    let compiler = RecordingCompiler;
    let line = compiler.compile(&StructuralOperation::RemoveTable {
        table: "Person".into(),
    });
    assert_eq!(line, "-- remove table Person");
}

#[test]
fn script_executor_keeps_the_batches_apart() {
    let mut executor = ScriptExecutor::default();
    executor
        .execute_many(&["a".to_string(), "b".to_string()])
        .unwrap();
    executor
        .execute_non_transactional(&["c".to_string()])
        .unwrap();
    assert_eq!(executor.transactional, vec!["a", "b"]);
    assert_eq!(executor.non_transactional, vec!["c"]);
}

/// An extractor over a fixed in-memory catalog, returning only the
/// schemas the tasks ask for.
struct FixtureExtractor {
    catalog: PhysicalCatalog,
}

impl SchemaExtractor for FixtureExtractor {
    fn extract(&mut self, tasks: &[ExtractionTask]) -> Result<PhysicalCatalog, UpgradeError> {
        let mut out = self.catalog.clone();
        out.schemas.retain(|s| {
            tasks
                .iter()
                .any(|t| t.catalog == self.catalog.name && t.schema == s.name)
        });
        if out.schemas.is_empty() {
            return Err(UpgradeError::PathNotFound {
                path: format!("{}/Schemas", self.catalog.name),
                model: "source",
            });
        }
        Ok(out)
    }
}

#[test]
fn extraction_tasks_select_the_schemas_to_read() {
    let schema = |name: &str| PhysicalSchema {
        name: name.to_string(),
        domains: vec![],
        sequences: vec![],
        tables: vec![],
        views: vec![],
    };
    let mut extractor = FixtureExtractor {
        catalog: PhysicalCatalog {
            name: "app".into(),
            collation: None,
            partition_functions: vec![],
            partition_schemes: vec![],
            schemas: vec![schema("public"), schema("audit")],
        },
    };

    let extracted = extractor
        .extract(&[ExtractionTask {
            catalog: "app".into(),
            schema: "audit".into(),
        }])
        .unwrap();
    assert_eq!(extracted.schemas.len(), 1);
    assert_eq!(extracted.schemas[0].name, "audit");

    let missing = extractor.extract(&[ExtractionTask {
        catalog: "other".into(),
        schema: "public".into(),
    }]);
    assert!(missing.is_err());
}
