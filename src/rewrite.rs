//! Span-keyed rewriting of the source text
//!
//! All edits are collected as byte-range replacements against the original
//! source and applied back-to-front, so earlier edits never invalidate later
//! offsets. Two kinds of edits exist: stripping unused declarations (whole
//! statements commented or deleted, mixed statements split) and injecting
//! relocated declarations at function body anchors.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::classify::Classification;
use crate::scopes::{BindingId, BodyAnchor, ImportBinding, ImportKind, ImportedName, ScopeGraph};

#[derive(Debug)]
struct Replacement {
    start: usize,
    end: usize,
    text: String,
}

fn apply_replacements(source: &str, mut replacements: Vec<Replacement>) -> String {
    replacements.sort_by(|a, b| b.start.cmp(&a.start));
    let mut result = source.to_string();
    for replacement in replacements {
        result.replace_range(replacement.start..replacement.end, &replacement.text);
    }
    result
}

/// Options controlling how unused declarations are stripped.
#[derive(Debug, Clone, Copy)]
pub struct RewriteOptions {
    pub remove_unused: bool,
    pub keep_unused_as_comment: bool,
}

/// Produce the rewritten unit: unused declarations stripped per the options,
/// relocated declarations injected at their destination functions.
#[must_use]
pub fn rewrite_unit(
    source: &str,
    graph: &ScopeGraph,
    classification: &Classification,
    options: RewriteOptions,
) -> String {
    let mut replacements = Vec::new();
    if options.remove_unused {
        unused_edits(source, graph, classification, options, &mut replacements);
    }
    relocation_edits(source, graph, classification, &mut replacements);
    apply_replacements(source, replacements)
}

fn render_names(names: &[&ImportedName]) -> String {
    names
        .iter()
        .map(|n| match &n.alias {
            Some(alias) => format!("{} as {}", n.name, alias),
            None => n.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a declaration containing only the given subset of the statement's
/// names.
fn render_decl(binding: &ImportBinding, names: &[&ImportedName]) -> String {
    match &binding.kind {
        ImportKind::Plain => format!("import {}", render_names(names)),
        ImportKind::From { module, level } => format!(
            "from {}{} import {}",
            ".".repeat(*level as usize),
            module.as_deref().unwrap_or(""),
            render_names(names)
        ),
    }
}

/// Split a statement's names into referenced and unreferenced halves.
fn partition_names<'a>(
    graph: &ScopeGraph,
    binding: &'a ImportBinding,
    id: BindingId,
) -> (Vec<&'a ImportedName>, Vec<&'a ImportedName>) {
    let referenced: HashSet<&str> = graph
        .references_of(id)
        .map(|r| r.name.as_str())
        .collect();
    binding
        .names
        .iter()
        .partition(|n| referenced.contains(n.binding.as_str()))
}

fn full_line_span(source: &str, start: usize, end: usize) -> (usize, usize) {
    let line_start = source[..start].rfind('\n').map_or(0, |idx| idx + 1);
    let line_end = source[end..]
        .find('\n')
        .map_or(source.len(), |idx| end + idx + 1);
    (line_start, line_end)
}

fn comment_lines(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 8);
    for line in text.split_inclusive('\n') {
        result.push_str("# ");
        result.push_str(line);
    }
    result
}

fn unused_edits(
    source: &str,
    graph: &ScopeGraph,
    classification: &Classification,
    options: RewriteOptions,
    replacements: &mut Vec<Replacement>,
) {
    // Statements sharing a physical line are stripped with a single edit per
    // line span, never two overlapping replacements. A span that also carries
    // a kept or relocated statement is left untouched; the unused import
    // stays in place rather than risking the live one.
    let mut spans: BTreeSet<(usize, usize)> = BTreeSet::new();
    for id in classification.unused.keys() {
        let binding = graph.binding(*id);
        spans.insert(full_line_span(source, binding.start, binding.end));
    }
    for (start, end) in spans {
        let shares_line_with_live = graph.bindings().iter().enumerate().any(|(idx, other)| {
            !classification.unused.contains_key(&BindingId(idx))
                && other.start < end
                && other.end > start
        });
        if shares_line_with_live {
            tracing::warn!("unused import shares a line with a live import, leaving it in place");
            continue;
        }
        let text = if options.keep_unused_as_comment {
            comment_lines(&source[start..end])
        } else {
            String::new()
        };
        replacements.push(Replacement { start, end, text });
    }

    // Mixed statements: re-render with only the referenced names, keeping the
    // unused remainder as a trailing comment when requested. The retained
    // declaration stays first so line-keyed commenting still sees an import
    // on the range's first line.
    for (id, _) in &classification.relocate {
        if !classification.partial_unused.contains_key(id) {
            continue;
        }
        let binding = graph.binding(*id);
        let (used, stripped) = partition_names(graph, binding, *id);
        if used.is_empty() || stripped.is_empty() {
            continue;
        }
        let mut text = render_decl(binding, &used);
        if options.keep_unused_as_comment {
            text.push_str("\n# ");
            text.push_str(&render_decl(binding, &stripped));
        }
        replacements.push(Replacement {
            start: binding.start,
            end: binding.end,
            text,
        });
    }
}

/// Destination functions with the declaration texts queued for injection,
/// deduplicated by text, in first-discovery order.
#[must_use]
pub fn relocation_plan(
    graph: &ScopeGraph,
    classification: &Classification,
) -> Vec<(crate::scopes::ScopeId, Vec<String>)> {
    let mut queued: HashMap<usize, (Vec<String>, HashSet<String>)> = HashMap::new();
    let mut order = Vec::new();

    for (id, destinations) in &classification.relocate {
        let binding = graph.binding(*id);
        let text = if classification.partial_unused.contains_key(id) {
            let (used, _) = partition_names(graph, binding, *id);
            render_decl(binding, &used)
        } else {
            binding.text.clone()
        };
        for dest in destinations {
            let entry = queued.entry(dest.0).or_insert_with(|| {
                order.push(*dest);
                (Vec::new(), HashSet::new())
            });
            if entry.1.insert(text.clone()) {
                entry.0.push(text.clone());
            }
        }
    }

    order
        .into_iter()
        .filter_map(|dest| queued.remove(&dest.0).map(|(texts, _)| (dest, texts)))
        .collect()
}

fn relocation_edits(
    source: &str,
    graph: &ScopeGraph,
    classification: &Classification,
    replacements: &mut Vec<Replacement>,
) {
    for (dest, texts) in relocation_plan(graph, classification) {
        let Some(anchor) = graph.scope(dest).anchor.clone() else {
            continue;
        };
        match anchor {
            BodyAnchor::Stmt { line_start, indent } => {
                let mut block = String::new();
                for text in &texts {
                    block.push_str(&indent);
                    block.push_str(text);
                    block.push('\n');
                }
                replacements.push(Replacement {
                    start: line_start,
                    end: line_start,
                    text: block,
                });
            }
            BodyAnchor::AfterDocstring { doc_end, indent } => {
                let mut block = String::new();
                for text in &texts {
                    block.push_str(&indent);
                    block.push_str(text);
                    block.push('\n');
                }
                let (start, text) = match source[doc_end..].find('\n') {
                    Some(idx) => (doc_end + idx + 1, block),
                    None => (source.len(), format!("\n{block}")),
                };
                replacements.push(Replacement {
                    start,
                    end: start,
                    text,
                });
            }
            // The classifier keeps bindings destined for inline bodies.
            BodyAnchor::Inline => {}
        }
    }
}
