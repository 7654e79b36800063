use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use rust_schemaupgrade::builder::{NodeMapping, PhysicalCatalog};
use rust_schemaupgrade::compare::report;
use rust_schemaupgrade::domain::DomainModel;
use rust_schemaupgrade::error::UpgradeError;
use rust_schemaupgrade::hints::HintSet;
use rust_schemaupgrade::provider::{
    ProviderCapabilities, RecordingCompiler, ScriptExecutor, StatementCompiler, StatementExecutor,
};
use rust_schemaupgrade::translate::UpgradeMode;
use rust_schemaupgrade::{plan_upgrade, UpgradeOptions};

#[derive(Parser)]
#[command(name = "rust-schemaupgrade")]
#[command(author, version, about = "Staged schema upgrade planner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan the upgrade from an extracted catalog to the current model
    Plan {
        /// Path to the extracted physical catalog (JSON)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Path to the old domain model (JSON)
        #[arg(long)]
        old_model: PathBuf,

        /// Path to the new domain model (JSON)
        #[arg(long)]
        new_model: PathBuf,

        /// Path to the upgrade hints (JSON); omit for no hints
        #[arg(long)]
        hints: Option<PathBuf>,

        /// Path to the physical-to-logical node mapping (JSON)
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Path to the provider capability flags (JSON); defaults to a
        /// fully capable provider
        #[arg(long)]
        capabilities: Option<PathBuf>,

        /// Carry unsafe actions through instead of aborting
        #[arg(long)]
        allow_unsafe: bool,

        /// Print the operations as a pseudo-SQL script
        #[arg(long)]
        script: bool,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            catalog,
            old_model,
            new_model,
            hints,
            mapping,
            capabilities,
            allow_unsafe,
            script,
            verbose,
        } => {
            let catalog: PhysicalCatalog = read_json(&catalog)?;
            let old_domain: DomainModel = read_json(&old_model)?;
            let new_domain: DomainModel = read_json(&new_model)?;
            let input_hints: HintSet = match &hints {
                Some(path) => read_json(path)?,
                None => HintSet::default(),
            };

            let options = UpgradeOptions {
                mapping: match &mapping {
                    Some(path) => read_json(path)?,
                    None => NodeMapping::default(),
                },
                capabilities: match &capabilities {
                    Some(path) => read_json(path)?,
                    None => ProviderCapabilities::full(),
                },
                mode: if allow_unsafe {
                    UpgradeMode::AllowUnsafe
                } else {
                    UpgradeMode::RejectUnsafe
                },
                verbose,
                ..UpgradeOptions::default()
            };

            let plan = plan_upgrade(&catalog, &old_domain, &new_domain, &input_hints, &options)?;

            if script {
                print_script(&plan.operations)?;
            } else {
                report::print_plan(&plan.actions);
                println!();
                report::print_operations(&plan.operations);
            }
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, UpgradeError> {
    let text = fs::read_to_string(path).map_err(|source| UpgradeError::ModelReadError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| UpgradeError::ModelParseError {
        path: path.to_path_buf(),
        source,
    })
}

/// Render every operation through the recording compiler and replay the
/// batches the way an executor would see them.
fn print_script(
    operations: &rust_schemaupgrade::translate::UpgradeActionSequence,
) -> Result<()> {
    let compiler = RecordingCompiler;
    let mut executor = ScriptExecutor::default();

    let prologue: Vec<String> = operations
        .non_transactional_prologue
        .iter()
        .map(|op| compiler.compile(op))
        .collect();
    executor.execute_non_transactional(&prologue)?;

    for (_, stage_ops) in operations.stages() {
        let batch: Vec<String> = stage_ops.iter().map(|op| compiler.compile(op)).collect();
        executor.execute_many(&batch)?;
    }

    let epilogue: Vec<String> = operations
        .non_transactional_epilogue
        .iter()
        .map(|op| compiler.compile(op))
        .collect();
    executor.execute_non_transactional(&epilogue)?;

    if !executor.non_transactional.is_empty() {
        println!("-- non-transactional batch");
        for line in &executor.non_transactional {
            println!("{}", line);
        }
        println!();
    }
    println!("-- main batch");
    for line in &executor.transactional {
        println!("{}", line);
    }
    Ok(())
}
