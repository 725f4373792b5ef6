//! localimp: move module-level Python imports into the functions using them
//!
//! The pipeline parses one compilation unit, resolves every name load to a
//! scope, classifies each module-level import as kept / unused / relocatable,
//! and rewrites the text: relocated declarations are injected at the top of
//! their destination function bodies, the originals are commented out, and
//! unused declarations are stripped or kept as comments.
//!
//! ```no_run
//! use localimp::{ImportMover, MoveConfig};
//!
//! let source = "import random\n\ndef roll():\n    return random.random()\n";
//! let outcome = ImportMover::rewrite_source("roll.py", source, &MoveConfig::default())?;
//! assert!(outcome.code.contains("    import random"));
//! # Ok::<(), localimp::LocalimpError>(())
//! ```

pub mod classify;
pub mod error;
pub mod lines;
pub mod mover;
pub mod naive;
pub mod report;
pub mod rewrite;
pub mod scopes;

pub use classify::{classify, Classification};
pub use error::{LocalimpError, Result};
pub use mover::{ImportMover, MoveConfig, MoveOutcome};
pub use report::{FunctionRelocation, MoveReport, UnusedImport};
pub use scopes::{BindingId, ImportBinding, ScopeGraph, ScopeId, ScopeKind};
