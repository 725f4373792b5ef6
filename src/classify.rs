//! Partitioning of module-level imports into keep / unused / relocate
//!
//! Consumes the resolved [`ScopeGraph`] and decides, for every import
//! declaration, whether it stays at module scope, gets commented away, or
//! moves into the functions that reference it. Precedence is keep-list first:
//! a binding that qualifies for keeping never lands in another partition.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::scopes::{BindingId, BodyAnchor, ScopeGraph, ScopeId};

/// Result of classifying one unit's import declarations.
#[derive(Debug, Default)]
pub struct Classification {
    /// Bindings that must remain at module scope.
    pub keep_global: BTreeSet<BindingId>,
    /// Bindings with no references, with the alias names that went unused.
    pub unused: BTreeMap<BindingId, Vec<String>>,
    /// Relocated bindings with their destination function scopes, in
    /// declaration order. The per-binding unused alias names (for mixed
    /// statements) live in `partial_unused`.
    pub relocate: Vec<(BindingId, BTreeSet<ScopeId>)>,
    /// For relocated bindings: alias names of the statement that themselves
    /// had no references and should be stripped when re-rendering.
    pub partial_unused: BTreeMap<BindingId, Vec<String>>,
}

impl Classification {
    /// Dotted names reported as unused, across fully-unused statements and
    /// the unused portion of mixed statements.
    pub fn unused_names(&self) -> impl Iterator<Item = &str> {
        self.unused
            .values()
            .chain(self.partial_unused.values())
            .flatten()
            .map(String::as_str)
    }
}

/// Classify every import binding of the graph.
///
/// `whitelist` entries are matched as substrings of the canonical statement
/// text, mirroring how users pin imports with side effects.
#[must_use]
pub fn classify(graph: &ScopeGraph, whitelist: &HashSet<String>) -> Classification {
    let mut result = Classification::default();

    for (idx, binding) in graph.bindings().iter().enumerate() {
        let id = BindingId(idx);

        if whitelist.iter().any(|entry| binding.text.contains(entry)) {
            tracing::debug!(text = %binding.text, "kept: whitelist match");
            result.keep_global.insert(id);
            continue;
        }

        if binding.is_wildcard {
            tracing::warn!(text = %binding.text, "kept: wildcard import cannot be tracked");
            result.keep_global.insert(id);
            continue;
        }

        if graph.is_forced_keep(id) {
            tracing::warn!(text = %binding.text, "kept: name rebound at module scope");
            result.keep_global.insert(id);
            continue;
        }

        let refs: Vec<_> = graph.references_of(id).collect();

        if refs.iter().any(|r| r.keep_forcing) {
            tracing::debug!(text = %binding.text, "kept: class base or decorator use");
            result.keep_global.insert(id);
            continue;
        }

        // A reference with no enclosing function has no legal injection site.
        let destinations: Option<BTreeSet<ScopeId>> = refs
            .iter()
            .map(|r| graph.nearest_function(r.scope))
            .collect();
        let Some(destinations) = destinations else {
            tracing::debug!(text = %binding.text, "kept: referenced at module scope");
            result.keep_global.insert(id);
            continue;
        };

        if refs.is_empty() {
            let names: Vec<String> =
                binding.names.iter().map(|n| n.name.clone()).collect();
            tracing::debug!(text = %binding.text, "unused");
            result.unused.insert(id, names);
            continue;
        }

        if destinations
            .iter()
            .any(|scope| matches!(graph.scope(*scope).anchor, Some(BodyAnchor::Inline) | None))
        {
            tracing::warn!(
                text = %binding.text,
                "kept: destination body cannot receive an import line"
            );
            result.keep_global.insert(id);
            continue;
        }

        // Mixed statements: names of this declaration nobody referenced.
        let used: HashSet<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        let stripped: Vec<String> = binding
            .names
            .iter()
            .filter(|n| !used.contains(n.binding.as_str()))
            .map(|n| n.name.clone())
            .collect();
        if !stripped.is_empty() {
            result.partial_unused.insert(id, stripped);
        }

        result.relocate.push((id, destinations));
    }

    result
}
