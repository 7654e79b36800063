//! Human-readable upgrade plan printer

use crate::compare::{ActionSequence, UpgradeStage};
use crate::translate::UpgradeActionSequence;

/// Print the staged action plan to stdout.
pub fn print_plan(sequence: &ActionSequence) {
    println!("=== Schema Upgrade Plan ===");
    println!();
    if sequence.is_empty() {
        println!("Nothing to do: models are identical.");
        return;
    }
    for stage in UpgradeStage::ALL {
        let actions = sequence.stage(stage);
        if actions.is_empty() {
            continue;
        }
        println!("--- {} ({}) ---", stage, actions.len());
        for action in actions {
            println!("  {}", action);
        }
        println!();
    }
    println!("Summary: {} actions", sequence.len());
}

/// Print the translated operations, stage by stage, plus the
/// non-transactional buckets.
pub fn print_operations(sequence: &UpgradeActionSequence) {
    println!("=== Translated Operations ===");
    println!();
    if !sequence.non_transactional_prologue.is_empty() {
        println!(
            "--- non-transactional prologue ({}) ---",
            sequence.non_transactional_prologue.len()
        );
        for op in &sequence.non_transactional_prologue {
            println!("  {}", op);
        }
        println!();
    }
    for (stage, operations) in sequence.stages() {
        if operations.is_empty() {
            continue;
        }
        println!("--- {} ({}) ---", stage, operations.len());
        for op in operations {
            println!("  {}", op);
        }
        println!();
    }
    if !sequence.non_transactional_epilogue.is_empty() {
        println!(
            "--- non-transactional epilogue ({}) ---",
            sequence.non_transactional_epilogue.len()
        );
        for op in &sequence.non_transactional_epilogue {
            println!("  {}", op);
        }
        println!();
    }
    let unsafe_count = sequence.unsafe_operations.len();
    if unsafe_count > 0 {
        println!("Unsafe operations ({}):", unsafe_count);
        for detail in &sequence.unsafe_operations {
            println!("  {}", detail);
        }
        println!();
    }
    println!(
        "Summary: {} operations, {} unsafe",
        sequence.operation_count(),
        unsafe_count
    );
}
