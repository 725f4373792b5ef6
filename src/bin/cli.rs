//! CLI for moving module-level imports into functions
#![allow(
    clippy::too_many_lines,
    clippy::too_many_arguments,
    clippy::fn_params_excessive_bools,
    clippy::uninlined_format_args,
    clippy::module_name_repetitions
)]

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use dunce::canonicalize as dunce_canonicalize;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use regex::Regex;
use serde::Deserialize;
use similar::TextDiff;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;

use localimp::mover::write_atomic;
use localimp::naive::move_imports_naive;
use localimp::{ImportMover, MoveConfig};

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/__pycache__/**", "**/.venv/**"];
const DEFAULT_OUTPUT_SUFFIX: &str = "_im";

#[derive(Parser)]
#[command(name = "localimp")]
#[command(about = "Move module-level Python imports into the functions that use them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Reduce logging to warnings and errors
    #[arg(global = true, short = 'q', long = "quiet")]
    quiet: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Move imports in a single Python file
    Move {
        /// Path to the Python source file
        #[arg(value_name = "PYTHON_FILE")]
        python_file: PathBuf,

        /// Output path (default: <stem>_im.py next to the input)
        #[arg(short, long, value_name = "OUTPUT_PATH")]
        output: Option<PathBuf>,

        /// What to do with imports nothing references
        #[arg(long, value_enum, default_value = "comment")]
        unused: UnusedMode,

        /// Comma-separated substrings pinning imports at module scope
        #[arg(long, value_name = "A,B")]
        whitelist: Option<String>,

        /// TOML config file (whitelist, unused mode, output suffix)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Write the plain-text move report to this file
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,

        /// Print the move report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Print a unified diff instead of the report
        #[arg(long)]
        diff: bool,

        /// Analyze and report without writing any file
        #[arg(long)]
        dry_run: bool,

        /// Write the transformed source to stdout instead of a file
        #[arg(long)]
        stdout: bool,

        /// Use the naive single-pass strategy (no scope resolution)
        #[arg(long)]
        naive: bool,
    },

    /// Move imports in every Python file under a directory
    MoveDir {
        /// Directory containing Python sources
        #[arg(value_name = "INPUT_DIR")]
        input_dir: PathBuf,

        /// Glob pattern to include (repeatable). Defaults to "**/*.py"
        #[arg(long, value_name = "GLOB")]
        include: Vec<String>,

        /// Glob pattern to exclude (repeatable)
        #[arg(long, value_name = "GLOB")]
        exclude: Vec<String>,

        /// Skip files whose name matches this regex
        #[arg(long, value_name = "REGEX")]
        ignore_files: Option<String>,

        /// Also process __init__.py files
        #[arg(long)]
        include_init: bool,

        /// Limit parallel workers
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,

        /// Include hidden files and directories
        #[arg(long)]
        include_hidden: bool,

        /// Follow symbolic links while walking
        #[arg(long)]
        follow_symlinks: bool,

        /// Maximum directory depth to walk
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,

        /// Honor .gitignore and related ignore files
        #[arg(long)]
        respect_gitignore: bool,

        /// What to do with imports nothing references
        #[arg(long, value_enum, default_value = "comment")]
        unused: UnusedMode,

        /// Comma-separated substrings pinning imports at module scope
        #[arg(long, value_name = "A,B")]
        whitelist: Option<String>,

        /// TOML config file (whitelist, unused mode, output suffix)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Analyze everything without writing any file
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UnusedMode {
    /// Replace unused imports with `# import ...` comments
    Comment,
    /// Delete unused imports outright
    Remove,
    /// Leave unused imports where they are
    Keep,
}

impl UnusedMode {
    fn apply(self, config: &mut MoveConfig) {
        match self {
            UnusedMode::Comment => {
                config.remove_unused = true;
                config.keep_unused_as_comment = true;
            }
            UnusedMode::Remove => {
                config.remove_unused = true;
                config.keep_unused_as_comment = false;
            }
            UnusedMode::Keep => {
                config.remove_unused = false;
            }
        }
    }
}

/// Optional TOML configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    whitelist: Vec<String>,
    unused: Option<UnusedMode>,
    output_suffix: Option<String>,
}

impl FileConfig {
    fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.quiet {
        "warn"
    } else if cli.verbose >= 2 {
        "debug"
    } else {
        "info"
    };
    let env_filter = EnvFilter::new(level);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Move {
            python_file,
            output,
            unused,
            whitelist,
            config,
            log,
            json,
            diff,
            dry_run,
            stdout,
            naive,
        } => {
            move_file(
                &python_file,
                output.as_deref(),
                unused,
                whitelist.as_deref(),
                config.as_deref(),
                log.as_deref(),
                json,
                diff,
                dry_run,
                stdout,
                naive,
                cli.quiet,
            )?;
        }
        Commands::MoveDir {
            input_dir,
            include,
            exclude,
            ignore_files,
            include_init,
            jobs,
            include_hidden,
            follow_symlinks,
            max_depth,
            respect_gitignore,
            unused,
            whitelist,
            config,
            dry_run,
        } => {
            let stats = move_dir(
                &input_dir,
                &include,
                &exclude,
                ignore_files.as_deref(),
                include_init,
                jobs,
                include_hidden,
                follow_symlinks,
                max_depth,
                respect_gitignore,
                unused,
                whitelist.as_deref(),
                config.as_deref(),
                dry_run,
                cli.quiet,
            )?;
            if stats.errors > 0 {
                process::exit(1);
            }
        }
    }

    Ok(())
}

fn build_move_config(
    unused: UnusedMode,
    whitelist: Option<&str>,
    file_config: &FileConfig,
) -> MoveConfig {
    let mut config = MoveConfig::default();
    file_config.unused.unwrap_or(unused).apply(&mut config);
    let mut entries: HashSet<String> = file_config.whitelist.iter().cloned().collect();
    if let Some(list) = whitelist {
        entries.extend(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string),
        );
    }
    config.whitelist = entries;
    config
}

fn default_output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());
    let extension = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{suffix}{extension}"))
}

fn move_file(
    python_file: &Path,
    output: Option<&Path>,
    unused: UnusedMode,
    whitelist: Option<&str>,
    config_path: Option<&Path>,
    log: Option<&Path>,
    json: bool,
    diff: bool,
    dry_run: bool,
    stdout: bool,
    naive: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let file_config = FileConfig::load(config_path)?;
    let config = build_move_config(unused, whitelist, &file_config);
    let suffix = file_config
        .output_suffix
        .as_deref()
        .unwrap_or(DEFAULT_OUTPUT_SUFFIX);

    let (source, metadata) = read_python(python_file)?;
    let unit = python_file.display().to_string();

    let (code, report) = if naive {
        let code = move_imports_naive(&source).with_context(|| format!("failed on {unit}"))?;
        (code, None)
    } else {
        let outcome = ImportMover::rewrite_source(&unit, &source, &config)
            .with_context(|| format!("failed on {unit}"))?;
        (outcome.code, Some(outcome.report))
    };

    if diff {
        print!("{}", make_unified_diff(&unit, &source, &code, 3));
    } else if let Some(report) = &report {
        if json {
            println!("{}", report.to_json());
        } else if !quiet && !report.is_empty() {
            print!("{}", report.to_log());
        }
    }

    if let (Some(log_path), Some(report)) = (log, &report) {
        fs::write(log_path, report.to_log())
            .with_context(|| format!("failed to write log {}", log_path.display()))?;
    }

    if dry_run {
        info!("dry run, not writing output");
        return Ok(());
    }

    if stdout {
        print!("{code}");
        return Ok(());
    }

    let output_path = match output {
        Some(path) => path.to_path_buf(),
        None => default_output_path(python_file, suffix),
    };
    let bytes = encode_python(&code, &metadata, &output_path.display().to_string())?;
    write_atomic(&output_path, &bytes)?;
    info!(output = %output_path.display(), "wrote transformed file");
    Ok(())
}

#[derive(Debug, Default)]
struct DirStats {
    processed: usize,
    rewritten: usize,
    skipped_no_change: usize,
    errors: usize,
}

struct FileResult {
    rel: String,
    outcome: FileOutcome,
}

enum FileOutcome {
    Moved,
    NoChange,
    Error { message: String },
}

fn move_dir(
    input_dir: &Path,
    include: &[String],
    exclude: &[String],
    ignore_files: Option<&str>,
    include_init: bool,
    jobs: Option<usize>,
    include_hidden: bool,
    follow_symlinks: bool,
    max_depth: Option<usize>,
    respect_gitignore: bool,
    unused: UnusedMode,
    whitelist: Option<&str>,
    config_path: Option<&Path>,
    dry_run: bool,
    quiet: bool,
) -> anyhow::Result<DirStats> {
    let file_config = FileConfig::load(config_path)?;
    let config = build_move_config(unused, whitelist, &file_config);
    let suffix = file_config
        .output_suffix
        .clone()
        .unwrap_or_else(|| DEFAULT_OUTPUT_SUFFIX.to_string());

    let root = dunce_canonicalize(input_dir)
        .with_context(|| format!("failed to resolve {}", input_dir.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let include_patterns: Vec<String> = if include.is_empty() {
        vec!["**/*.py".to_string()]
    } else {
        include.to_vec()
    };
    let include_set = build_globset(&include_patterns)?;
    let exclude_set = build_globset(&merged_exclude_patterns(exclude))?;
    let ignore_regex = ignore_files
        .map(Regex::new)
        .transpose()
        .context("invalid --ignore-files regex")?;

    let mut candidates: Vec<(PathBuf, String)> = Vec::new();
    for entry in build_walker(
        &root,
        include_hidden,
        follow_symlinks,
        max_depth,
        respect_gitignore,
    ) {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !include_init && file_name == "__init__.py" {
            continue;
        }
        if file_name.ends_with(&format!("{suffix}.py")) {
            // Skip our own previous outputs.
            continue;
        }
        if let Some(regex) = &ignore_regex {
            if regex.is_match(&file_name) {
                continue;
            }
        }
        let rel = path.strip_prefix(&root).unwrap_or(path);
        let rel_norm = normalize_rel_path(rel);
        if !include_set.is_match(&rel_norm) || exclude_set.is_match(&rel_norm) {
            continue;
        }
        candidates.push((path.to_path_buf(), rel_norm));
    }
    candidates.sort_by(|a, b| a.1.cmp(&b.1));

    let jobs = resolve_jobs(jobs)?;
    let processor = |path: &Path, rel: &str| -> FileResult {
        let outcome = process_candidate(path, &config, &suffix, dry_run);
        FileResult {
            rel: rel.to_string(),
            outcome,
        }
    };

    let results: Vec<FileResult> = if jobs <= 1 || candidates.len() <= 1 {
        candidates
            .iter()
            .map(|(path, rel)| processor(path, rel))
            .collect()
    } else {
        let pool = ThreadPoolBuilder::new().num_threads(jobs).build()?;
        pool.install(|| {
            candidates
                .par_iter()
                .map(|(path, rel)| processor(path, rel))
                .collect()
        })
    };

    let mut stats = DirStats::default();
    for result in results {
        stats.processed += 1;
        match result.outcome {
            FileOutcome::Moved => {
                stats.rewritten += 1;
                if !quiet {
                    println!("• {} → moved", result.rel);
                }
            }
            FileOutcome::NoChange => {
                stats.skipped_no_change += 1;
                if !quiet {
                    println!("• {} → unchanged", result.rel);
                }
            }
            FileOutcome::Error { message } => {
                stats.errors += 1;
                warn!("{}: {}", result.rel, message);
                if !quiet {
                    println!("• {} → error", result.rel);
                }
            }
        }
    }

    let message = format!(
        "Processed {} files: {} moved, {} unchanged, {} errors{}",
        stats.processed,
        stats.rewritten,
        stats.skipped_no_change,
        stats.errors,
        if dry_run { " (dry run)" } else { "" },
    );
    println!("{}", message);
    info!("{}", message);
    Ok(stats)
}

fn process_candidate(path: &Path, config: &MoveConfig, suffix: &str, dry_run: bool) -> FileOutcome {
    let unit = path.display().to_string();
    let (source, metadata) = match read_python(path) {
        Ok(pair) => pair,
        Err(err) => {
            return FileOutcome::Error {
                message: err.to_string(),
            }
        }
    };
    let outcome = match ImportMover::rewrite_source(&unit, &source, config) {
        Ok(outcome) => outcome,
        Err(err) => {
            return FileOutcome::Error {
                message: err.to_string(),
            }
        }
    };
    if !outcome.changed {
        return FileOutcome::NoChange;
    }
    if dry_run {
        return FileOutcome::Moved;
    }
    let output_path = default_output_path(path, suffix);
    let write = encode_python(&outcome.code, &metadata, &unit)
        .and_then(|bytes| write_atomic(&output_path, &bytes).map_err(anyhow::Error::from));
    match write {
        Ok(()) => FileOutcome::Moved,
        Err(err) => FileOutcome::Error {
            message: err.to_string(),
        },
    }
}

fn resolve_jobs(jobs: Option<usize>) -> anyhow::Result<usize> {
    match jobs {
        Some(0) => bail!("--jobs must be at least 1"),
        Some(value) => Ok(value),
        None => Ok(std::cmp::max(1, num_cpus::get())),
    }
}

fn merged_exclude_patterns(extras: &[String]) -> Vec<String> {
    let mut patterns: Vec<String> = DEFAULT_EXCLUDES
        .iter()
        .map(|pattern| (*pattern).to_string())
        .collect();
    patterns.extend(extras.iter().cloned());
    patterns
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .build()
            .with_context(|| format!("invalid glob {pattern}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn normalize_rel_path(rel_path: &Path) -> String {
    rel_path
        .iter()
        .map(|component| component.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_walker(
    root: &Path,
    include_hidden: bool,
    follow_symlinks: bool,
    max_depth: Option<usize>,
    respect_gitignore: bool,
) -> ignore::Walk {
    let mut builder = WalkBuilder::new(root);
    builder.follow_links(follow_symlinks);
    builder.standard_filters(false);
    builder.hidden(!include_hidden);
    builder.max_depth(max_depth);
    builder.require_git(false);

    if respect_gitignore {
        builder
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .ignore(true);
    } else {
        builder
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .ignore(false);
    }

    builder.build()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LineEnding {
    Lf,
    Crlf,
}

#[derive(Clone, Copy, Debug)]
struct TextMetadata {
    encoding: Option<&'static Encoding>,
    line_ending: LineEnding,
    had_trailing_newline: bool,
    had_bom: bool,
}

/// PEP 263 cookie in one of the first two lines.
fn detect_cookie_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let cookie = Regex::new(r"^[ \t\x0c]*#.*?coding[:=][ \t]*([-_.a-zA-Z0-9]+)").ok()?;
    for line_bytes in bytes.split(|&b| b == b'\n').take(2) {
        let Ok(line) = std::str::from_utf8(line_bytes) else {
            continue;
        };
        if let Some(captures) = cookie.captures(line) {
            let label = &captures[1];
            if let Some(enc) = Encoding::for_label(label.as_bytes()) {
                return Some(enc);
            }
        }
    }
    None
}

fn decode_python_bytes(bytes: &[u8], label: &str) -> anyhow::Result<(String, TextMetadata)> {
    let (encoding, had_bom) = if bytes.starts_with(b"\xEF\xBB\xBF") {
        (Some(UTF_8), true)
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        (Some(UTF_16LE), true)
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        (Some(UTF_16BE), true)
    } else {
        (detect_cookie_encoding(bytes), false)
    };

    let effective = encoding.unwrap_or(UTF_8);
    let (decoded, had_errors) = if had_bom {
        effective.decode_with_bom_removal(bytes)
    } else {
        effective.decode_without_bom_handling(bytes)
    };
    if had_errors {
        bail!("failed to decode {} using {}", label, effective.name());
    }
    let mut content = decoded.into_owned();

    let line_ending = if content.contains("\r\n") {
        LineEnding::Crlf
    } else {
        LineEnding::Lf
    };
    if line_ending == LineEnding::Crlf {
        content = content.replace("\r\n", "\n");
    }
    let had_trailing_newline = content.ends_with('\n');

    Ok((
        content,
        TextMetadata {
            encoding,
            line_ending,
            had_trailing_newline,
            had_bom,
        },
    ))
}

fn read_python(path: &Path) -> anyhow::Result<(String, TextMetadata)> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    decode_python_bytes(&bytes, &path.display().to_string())
}

fn encode_python(content: &str, metadata: &TextMetadata, label: &str) -> anyhow::Result<Vec<u8>> {
    let mut adjusted = content.to_string();
    if metadata.line_ending == LineEnding::Crlf {
        adjusted = adjusted.replace('\n', "\r\n");
    }
    if !metadata.had_trailing_newline {
        while adjusted.ends_with('\n') || adjusted.ends_with('\r') {
            adjusted.pop();
        }
    }

    let encoder = metadata.encoding.unwrap_or(UTF_8);
    let mut output: Vec<u8> = Vec::new();

    if std::ptr::eq(encoder, UTF_16LE) || std::ptr::eq(encoder, UTF_16BE) {
        if metadata.had_bom {
            output.extend_from_slice(if std::ptr::eq(encoder, UTF_16LE) {
                &[0xFF, 0xFE]
            } else {
                &[0xFE, 0xFF]
            });
        }
        for unit in adjusted.encode_utf16() {
            output.extend_from_slice(&if std::ptr::eq(encoder, UTF_16LE) {
                unit.to_le_bytes()
            } else {
                unit.to_be_bytes()
            });
        }
        return Ok(output);
    }

    if metadata.had_bom && std::ptr::eq(encoder, UTF_8) {
        output.extend_from_slice(b"\xEF\xBB\xBF");
    }
    let (encoded, output_encoding, had_errors) = encoder.encode(&adjusted);
    if had_errors || !std::ptr::eq(output_encoding, encoder) {
        bail!("failed to encode {} using {}", label, encoder.name());
    }
    match encoded {
        Cow::Borrowed(bytes) => output.extend_from_slice(bytes),
        Cow::Owned(buffer) => output.extend_from_slice(&buffer),
    }
    Ok(output)
}

fn make_unified_diff(path: &str, original: &str, rewritten: &str, context: usize) -> String {
    let diff = TextDiff::from_lines(original, rewritten);
    diff.unified_diff()
        .header(&format!("a/{}", path), &format!("b/{}", path))
        .context_radius(context)
        .to_string()
}
