//! Move reports
//!
//! Summarizes what happened to one unit: which imports were unused, which
//! moved where, and which stayed at module scope. Serializable for `--json`
//! output and renderable as the plain-text log format.

use serde::{Deserialize, Serialize};

/// An import name that had no references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnusedImport {
    pub name: String,
}

/// Imports injected into one function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionRelocation {
    /// Dotted qualified function name, e.g. `timing_decorator.wrapper`.
    pub function: String,
    /// Injected declaration texts, in injection order.
    pub imports: Vec<String>,
}

/// Full summary for one compilation unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveReport {
    /// Unit identifier, typically the input path.
    pub unit: String,
    pub unused_imports: Vec<UnusedImport>,
    pub relocations: Vec<FunctionRelocation>,
    /// Canonical texts of declarations kept at module scope.
    pub kept_global: Vec<String>,
}

impl MoveReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unused_imports.is_empty() && self.relocations.is_empty()
    }

    /// Pretty-printed JSON; falls back to an empty object if serialization
    /// fails, which cannot happen for this shape.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Plain-text rendering used for `--log` output.
    #[must_use]
    pub fn to_log(&self) -> String {
        let mut out = String::new();
        for unused in &self.unused_imports {
            out.push_str(&format!("Unused import: {}\n", unused.name));
        }
        for relocation in &self.relocations {
            out.push_str(&format!(
                "Imports moved to function {}:\n",
                relocation.function
            ));
            for import in &relocation.imports {
                out.push_str(&format!("    {import}\n"));
            }
        }
        out
    }
}
