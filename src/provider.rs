//! Provider capabilities and collaborator contracts
//!
//! The engine consults a capability oracle to choose native vs. emulated
//! strategies, and talks to the outside world through three narrow traits:
//! schema extraction, statement execution and statement compilation.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::builder::PhysicalCatalog;
use crate::error::UpgradeError;
use crate::translate::StructuralOperation;

/// Named capability flags of a storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub column_drop: bool,
    pub column_rename: bool,
    pub table_rename: bool,
    pub sequences: bool,
    pub deferrable_constraints: bool,
    pub clustered_indexes: bool,
    pub full_text: bool,
    /// Whether full-text DDL may run inside the main transaction.
    pub transactional_full_text_ddl: bool,
    pub partial_indexes: bool,
    pub transactional_ddl: bool,
    /// Identifier quoting style used when rendering filter expressions.
    pub quote_style: QuoteStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuoteStyle {
    #[default]
    DoubleQuote,
    Bracket,
    Backtick,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

impl ProviderCapabilities {
    /// A provider supporting everything natively.
    pub fn full() -> Self {
        ProviderCapabilities {
            column_drop: true,
            column_rename: true,
            table_rename: true,
            sequences: true,
            deferrable_constraints: true,
            clustered_indexes: true,
            full_text: true,
            transactional_full_text_ddl: false,
            partial_indexes: true,
            transactional_ddl: true,
            quote_style: QuoteStyle::DoubleQuote,
        }
    }

    /// A deliberately poor provider: no column drop/rename, no sequences,
    /// no full text. Used by tests to exercise every emulation path.
    pub fn minimal() -> Self {
        ProviderCapabilities {
            column_drop: false,
            column_rename: false,
            table_rename: true,
            sequences: false,
            deferrable_constraints: false,
            clustered_indexes: false,
            full_text: false,
            transactional_full_text_ddl: false,
            partial_indexes: false,
            transactional_ddl: false,
            quote_style: QuoteStyle::DoubleQuote,
        }
    }

    pub fn quote_identifier(&self, ident: &str) -> String {
        match self.quote_style {
            QuoteStyle::DoubleQuote => format!("\"{}\"", ident),
            QuoteStyle::Bracket => format!("[{}]", ident),
            QuoteStyle::Backtick => format!("`{}`", ident),
        }
    }
}

/// One extraction task: a (catalog, schema) pair to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionTask {
    pub catalog: String,
    pub schema: String,
}

/// Reads the physical schema from the live store.
pub trait SchemaExtractor {
    fn extract(&mut self, tasks: &[ExtractionTask]) -> Result<PhysicalCatalog, UpgradeError>;
}

/// Executes batches of compiled statements. Transactional boundaries are
/// the caller's concern; the engine only distinguishes the main batch from
/// statements that must run outside a transaction.
pub trait StatementExecutor {
    fn execute_many(&mut self, statements: &[String]) -> anyhow::Result<()>;
    fn execute_non_transactional(&mut self, statements: &[String]) -> anyhow::Result<()>;
    fn execute_scalar(&mut self, statement: &str) -> anyhow::Result<String>;
}

/// Renders one structural operation as dialect statement text.
pub trait StatementCompiler {
    fn compile(&self, operation: &StructuralOperation) -> String;
}

/// A compiler that renders operations as diagnostic pseudo-SQL lines.
/// Not a dialect; used by tests and the CLI `--script` output.
#[derive(Debug, Default)]
pub struct RecordingCompiler;

impl StatementCompiler for RecordingCompiler {
    fn compile(&self, operation: &StructuralOperation) -> String {
        format!("-- {}", operation)
    }
}

/// An executor that records everything it is asked to run.
#[derive(Debug, Default)]
pub struct ScriptExecutor {
    pub transactional: Vec<String>,
    pub non_transactional: Vec<String>,
}

impl StatementExecutor for ScriptExecutor {
    fn execute_many(&mut self, statements: &[String]) -> anyhow::Result<()> {
        self.transactional.extend_from_slice(statements);
        Ok(())
    }

    fn execute_non_transactional(&mut self, statements: &[String]) -> anyhow::Result<()> {
        self.non_transactional.extend_from_slice(statements);
        Ok(())
    }

    fn execute_scalar(&mut self, _statement: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

/// Tokenizer for wildcard patterns: runs of literal text, `*`, `?`.
static WILDCARD_TOKEN: Lazy<Regex> = Lazy::new(|| {
    // The pattern is a constant; compilation cannot fail.
    Regex::new(r"\*|\?|[^*?]+").unwrap()
});

/// Compiled-wildcard cache with an explicit size bound.
///
/// Passed by reference wherever ignore rules are evaluated; when the cache
/// fills up it is reset wholesale, which is cheap and keeps the policy
/// obvious.
#[derive(Debug)]
pub struct WildcardMatcher {
    cache: HashMap<String, Option<Regex>>,
    capacity: usize,
}

impl Default for WildcardMatcher {
    fn default() -> Self {
        WildcardMatcher::new(256)
    }
}

impl WildcardMatcher {
    pub fn new(capacity: usize) -> Self {
        WildcardMatcher {
            cache: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Case-insensitive match of `name` against a `*`/`?` wildcard pattern.
    pub fn matches(&mut self, pattern: &str, name: &str) -> bool {
        if !self.cache.contains_key(pattern) {
            if self.cache.len() >= self.capacity {
                self.cache.clear();
            }
            let compiled = Self::compile(pattern);
            self.cache.insert(pattern.to_string(), compiled);
        }
        match self.cache.get(pattern) {
            Some(Some(re)) => re.is_match(name),
            // Unparseable pattern degrades to literal comparison.
            _ => pattern.eq_ignore_ascii_case(name),
        }
    }

    fn compile(pattern: &str) -> Option<Regex> {
        let mut source = String::from("(?i)^");
        for token in WILDCARD_TOKEN.find_iter(pattern) {
            match token.as_str() {
                "*" => source.push_str(".*"),
                "?" => source.push('.'),
                literal => source.push_str(&regex::escape(literal)),
            }
        }
        source.push('$');
        Regex::new(&source).ok()
    }
}
