//! Line-keyed commenting of the original module-scope import lines
//!
//! After rewriting, the original declaration lines of every non-kept import
//! are prefixed with `# `, keyed by their 1-based line numbers in the
//! original source. The pass is best-effort and fails closed: a range whose
//! first line no longer looks like an import statement is left untouched, as
//! are blank lines, existing comments, and lines carrying a kept import's
//! text.

use std::collections::BTreeSet;

use crate::classify::Classification;
use crate::scopes::ScopeGraph;

/// Comment out the original module-level import lines that are not kept.
#[must_use]
pub fn comment_out_module_imports(
    rendered: &str,
    graph: &ScopeGraph,
    classification: &Classification,
) -> String {
    let kept_texts: Vec<&str> = classification
        .keep_global
        .iter()
        .map(|id| graph.binding(*id).text.as_str())
        .filter_map(|text| text.lines().next())
        .collect();

    let mut target_lines: BTreeSet<usize> = BTreeSet::new();
    let mut range_heads: BTreeSet<usize> = BTreeSet::new();
    for (idx, binding) in graph.bindings().iter().enumerate() {
        if classification
            .keep_global
            .contains(&crate::scopes::BindingId(idx))
        {
            continue;
        }
        let (first, last) = binding.line_range;
        range_heads.insert(first);
        for line in first..=last {
            target_lines.insert(line);
        }
    }

    let mut lines: Vec<String> = rendered.split('\n').map(ToString::to_string).collect();
    let mut skipped_ranges: BTreeSet<usize> = BTreeSet::new();

    for (idx, binding) in graph.bindings().iter().enumerate() {
        if classification
            .keep_global
            .contains(&crate::scopes::BindingId(idx))
        {
            continue;
        }
        let (first, _) = binding.line_range;
        let Some(head) = lines.get(first - 1) else {
            skipped_ranges.insert(first);
            continue;
        };
        let head = head.trim_start();
        if head.starts_with('#') {
            // Already commented by the unused-stripping pass.
            skipped_ranges.insert(first);
            continue;
        }
        // Fail closed when earlier edits shifted the line numbering.
        if !head.starts_with("import ") && !head.starts_with("from ") {
            tracing::warn!(line = first, "skipping drifted import range");
            skipped_ranges.insert(first);
        }
    }

    for number in &target_lines {
        let idx = number - 1;
        let Some(line) = lines.get_mut(idx) else {
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if kept_texts.iter().any(|text| line.contains(text)) {
            continue;
        }
        // Member of a range whose head failed the import check.
        if range_containing(&range_heads, &skipped_ranges, *number) {
            continue;
        }
        *line = format!("# {line}");
    }

    lines.join("\n")
}

/// Whether `line` belongs to a range whose head line was skipped.
fn range_containing(
    range_heads: &BTreeSet<usize>,
    skipped: &BTreeSet<usize>,
    line: usize,
) -> bool {
    match range_heads.range(..=line).next_back() {
        Some(head) => skipped.contains(head),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::rewrite::{rewrite_unit, RewriteOptions};
    use rustpython_parser::{ast, Parse};
    use std::collections::HashSet;

    fn process(source: &str) -> String {
        let suite = ast::Suite::parse(source, "<test>").expect("parse should succeed");
        let graph = ScopeGraph::build(&suite, source).expect("scope analysis should succeed");
        let classification = classify(&graph, &HashSet::new());
        let rendered = rewrite_unit(
            source,
            &graph,
            &classification,
            RewriteOptions {
                remove_unused: true,
                keep_unused_as_comment: true,
            },
        );
        comment_out_module_imports(&rendered, &graph, &classification)
    }

    #[test]
    fn relocated_import_line_is_commented() {
        let out = process("import random\n\ndef f():\n    return random.random()\n");
        assert!(out.starts_with("# import random\n"));
        assert!(out.contains("    import random\n"));
    }

    #[test]
    fn kept_import_line_stays_uncommented() {
        let out = process("import os\n\nROOT = os.getcwd()\n");
        assert!(out.starts_with("import os\n"));
    }

    #[test]
    fn already_commented_line_is_not_double_commented() {
        let out = process("import os\n\ndef f():\n    return 1\n");
        assert!(out.starts_with("# import os\n"));
        assert!(!out.contains("# # import os"));
    }

    #[test]
    fn multi_line_from_import_is_commented_whole() {
        let source = concat!(
            "from collections import (\n",
            "    defaultdict,\n",
            ")\n",
            "\n",
            "def f():\n",
            "    return defaultdict(list)\n",
        );
        let out = process(source);
        assert!(out.contains("# from collections import (\n#     defaultdict,\n# )\n"));
    }

    #[test]
    fn drifted_range_is_left_untouched() {
        let source = "import random\n\ndef f():\n    return random.random()\n";
        let suite = ast::Suite::parse(source, "<test>").expect("parse should succeed");
        let graph = ScopeGraph::build(&suite, source).expect("scope analysis should succeed");
        let classification = classify(&graph, &HashSet::new());
        // Simulate drift: hand the post-processor a text whose first line is
        // no longer the import statement.
        let drifted = "x = 1\n\ndef f():\n    return random.random()\n";
        let out = comment_out_module_imports(drifted, &graph, &classification);
        assert!(out.starts_with("x = 1\n"));
    }
}
