//! Pipeline orchestration
//!
//! Ties the stages together for one compilation unit: parse, resolve scopes,
//! classify, rewrite, comment original lines, report. File output goes
//! through a temporary file in the destination directory and an atomic
//! rename, so a crash mid-write never leaves a truncated script behind.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use rustpython_parser::{ast, Parse};

use crate::classify::classify;
use crate::error::{LocalimpError, Result};
use crate::lines::comment_out_module_imports;
use crate::report::{FunctionRelocation, MoveReport, UnusedImport};
use crate::rewrite::{relocation_plan, rewrite_unit, RewriteOptions};
use crate::scopes::ScopeGraph;

/// Options for one move run.
#[derive(Debug, Clone)]
pub struct MoveConfig {
    /// Keep stripped unused imports as `# import ...` comments.
    pub keep_unused_as_comment: bool,
    /// Strip unused imports at all.
    pub remove_unused: bool,
    /// Substrings of statement text that pin an import at module scope.
    pub whitelist: HashSet<String>,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            keep_unused_as_comment: true,
            remove_unused: true,
            whitelist: HashSet::new(),
        }
    }
}

/// Result of moving imports in one unit.
#[derive(Debug)]
pub struct MoveOutcome {
    /// The transformed source text.
    pub code: String,
    /// Whether the text differs from the input.
    pub changed: bool,
    pub report: MoveReport,
}

/// The import relocation engine.
pub struct ImportMover;

impl ImportMover {
    /// Transform one unit of Python source.
    ///
    /// # Errors
    ///
    /// Fails when the source does not parse or scope analysis rejects the
    /// tree; no partial result is produced.
    pub fn rewrite_source(unit: &str, source: &str, config: &MoveConfig) -> Result<MoveOutcome> {
        let suite = ast::Suite::parse(source, unit)
            .map_err(|err| LocalimpError::ParseError(format!("{unit}: {err}")))?;
        let graph = ScopeGraph::build(&suite, source)?;
        let classification = classify(&graph, &config.whitelist);

        tracing::debug!(
            unit,
            bindings = graph.bindings().len(),
            kept = classification.keep_global.len(),
            unused = classification.unused.len(),
            relocated = classification.relocate.len(),
            "classified module imports"
        );

        let rendered = rewrite_unit(
            source,
            &graph,
            &classification,
            RewriteOptions {
                remove_unused: config.remove_unused,
                keep_unused_as_comment: config.keep_unused_as_comment,
            },
        );
        let code = comment_out_module_imports(&rendered, &graph, &classification);

        let report = MoveReport {
            unit: unit.to_string(),
            unused_imports: classification
                .unused_names()
                .map(|name| UnusedImport {
                    name: name.to_string(),
                })
                .collect(),
            relocations: relocation_plan(&graph, &classification)
                .into_iter()
                .map(|(scope, imports)| FunctionRelocation {
                    function: graph.scope(scope).qualified_name.clone(),
                    imports,
                })
                .collect(),
            kept_global: classification
                .keep_global
                .iter()
                .map(|id| graph.binding(*id).text.clone())
                .collect(),
        };

        let changed = code != source;
        Ok(MoveOutcome {
            code,
            changed,
            report,
        })
    }

    /// Transform a file on disk, writing the result atomically.
    ///
    /// # Errors
    ///
    /// Fails on IO errors or when `rewrite_source` fails; the output path is
    /// never left half-written.
    pub fn process_file(input: &Path, output: &Path, config: &MoveConfig) -> Result<MoveOutcome> {
        let source = std::fs::read_to_string(input)?;
        let unit = input.display().to_string();
        let outcome = Self::rewrite_source(&unit, &source, config)?;
        write_atomic(output, outcome.code.as_bytes())?;
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            changed = outcome.changed,
            "processed file"
        );
        Ok(outcome)
    }
}

/// Write through a sibling temporary file and an atomic rename. The
/// temporary file is removed on every failure path.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|err| LocalimpError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_source_produces_report_and_code() {
        let source = concat!(
            "import os\n",
            "import random\n",
            "\n",
            "def f():\n",
            "    return random.random()\n",
        );
        let outcome = ImportMover::rewrite_source("unit.py", source, &MoveConfig::default())
            .expect("rewrite should succeed");
        assert!(outcome.changed);
        assert!(outcome.code.contains("# import os"));
        assert!(outcome.code.contains("# import random"));
        assert!(outcome.code.contains("    import random\n"));
        assert_eq!(outcome.report.unused_imports.len(), 1);
        assert_eq!(outcome.report.relocations.len(), 1);
        assert_eq!(outcome.report.relocations[0].function, "f");
    }

    #[test]
    fn unparseable_source_is_rejected() {
        let err = ImportMover::rewrite_source("bad.py", "def f(:\n", &MoveConfig::default());
        assert!(matches!(err, Err(LocalimpError::ParseError(_))));
    }

    #[test]
    fn untouched_source_reports_unchanged() {
        let source = "x = 1\n";
        let outcome = ImportMover::rewrite_source("unit.py", source, &MoveConfig::default())
            .expect("rewrite should succeed");
        assert!(!outcome.changed);
        assert!(outcome.report.is_empty());
    }

    #[test]
    fn whitelist_pins_import() {
        let mut config = MoveConfig::default();
        config.whitelist.insert("logging".to_string());
        let source = "import logging\n\ndef f():\n    logging.info(\"x\")\n";
        let outcome = ImportMover::rewrite_source("unit.py", source, &config)
            .expect("rewrite should succeed");
        assert!(outcome.code.starts_with("import logging\n"));
        assert_eq!(outcome.report.kept_global, vec!["import logging"]);
    }

    #[test]
    fn unused_import_on_a_kept_import_line_survives_intact() {
        let source = concat!(
            "import os; import logging\n",
            "\n",
            "logging.basicConfig()\n",
            "\n",
            "def f():\n",
            "    return 1\n",
        );
        let outcome = ImportMover::rewrite_source("unit.py", source, &MoveConfig::default())
            .expect("rewrite should succeed");
        assert!(outcome.code.contains("import os; import logging\n"));
        assert!(!outcome.code.contains('#'));
        assert!(!outcome.changed);
    }

    #[test]
    fn idempotent_on_its_own_output() {
        let source = concat!(
            "import random\n",
            "\n",
            "def f():\n",
            "    return random.random()\n",
        );
        let config = MoveConfig::default();
        let first = ImportMover::rewrite_source("unit.py", source, &config)
            .expect("first pass should succeed");
        let second = ImportMover::rewrite_source("unit.py", &first.code, &config)
            .expect("second pass should succeed");
        assert_eq!(first.code, second.code);
        assert!(!second.changed);
    }

    #[test]
    fn process_file_writes_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("script.py");
        let output = dir.path().join("script_im.py");
        std::fs::write(&input, "import random\n\ndef f():\n    return random.random()\n")
            .expect("write input");
        let outcome = ImportMover::process_file(&input, &output, &MoveConfig::default())
            .expect("process should succeed");
        let written = std::fs::read_to_string(&output).expect("read output");
        assert_eq!(written, outcome.code);
        assert!(written.contains("    import random\n"));
    }
}
