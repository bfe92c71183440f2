//! Fragment Patcher: fuzzy search-and-replace engine for AI-assisted file
//! editing.
//!
//! Language models propose edits as an "old fragment" and a "new fragment",
//! and the old fragment frequently fails to match the file byte-for-byte:
//! wrong indentation, collapsed whitespace, stray escape sequences, partial
//! context. This crate locates the unique region the model intended,
//! applies the replacement, and produces a reviewable diff.
//!
//! # Architecture
//!
//! A layered pipeline of nine candidate matchers (exact first, fuzzier
//! fallbacks after) feeds a resolver that only ever accepts an unambiguous
//! occurrence. Around the matching core, [`EditEngine`] enforces the editing
//! discipline: a per-path FIFO lock so two writers never race one file, and
//! a read ledger so a session can only overwrite content it has actually
//! seen in its current on-disk state.
//!
//! # Safety
//!
//! - An edit that matches nowhere, or in more than one place, fails instead
//!   of guessing
//! - Atomic file writes (tempfile + fsync + rename)
//! - Read-before-write and staleness detection per session
//! - At most one in-flight mutation per path, in arrival order
//!
//! # Example
//!
//! ```no_run
//! use fragment_patcher::{EditEngine, EditRequest};
//!
//! let engine = EditEngine::new("/path/to/project");
//! engine.read_file("session-1", "src/main.rs")?;
//!
//! let request = EditRequest::new("src/main.rs", "fn old()", "fn renamed()");
//! let outcome = engine.apply_edit("session-1", &request)?;
//! println!("{}", outcome.diff);
//! # Ok::<(), fragment_patcher::EditError>(())
//! ```

pub mod access;
pub mod diff;
pub mod engine;
pub mod hooks;
pub mod replace;

// Re-exports
pub use access::{AccessError, AccessGuard};
pub use diff::{build_unified, count_changes, trim_diff, FileDiff};
pub use engine::{EditEngine, EditError, EditOutcome, EditRequest};
pub use hooks::{
    AllowAll, AskKind, Decision, Diagnostic, DiagnosticsProvider, EventSink, Gate, Severity,
};
pub use replace::{replace, ReplaceError};
