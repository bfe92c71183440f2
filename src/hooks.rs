//! Interfaces to the engine's external collaborators.
//!
//! The engine never decides policy itself: approval comes from a [`Gate`],
//! change announcements go to [`EventSink`]s, and post-write issues come from
//! an optional [`DiagnosticsProvider`]. All three are consumed at trait
//! boundaries so hosts can wire in their own implementations.

use serde::Serialize;
use std::path::Path;

/// Outcome of an authorization ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// What the engine is asking permission for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskKind {
    /// Apply the rendered diff to the target file.
    Edit,
    /// Touch a file outside the engine's project root.
    ExternalDirectory,
}

/// Approval gate consulted after the match is resolved and before the write.
///
/// The ask may block indefinitely on a human or policy decision; a denial
/// aborts the operation with no file mutation performed.
pub trait Gate: Send + Sync {
    fn ask(&self, kind: AskKind, targets: &[&Path], rendered_diff: &str) -> Decision;
}

/// Gate that approves everything. The default when no policy is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Gate for AllowAll {
    fn ask(&self, _kind: AskKind, _targets: &[&Path], _rendered_diff: &str) -> Decision {
        Decision::Allow
    }
}

/// Receiver for "file edited" notifications, emitted after a successful
/// write. Fire-and-forget: sinks cannot fail or veto the edit.
pub trait EventSink: Send + Sync {
    fn file_edited(&self, path: &Path);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

/// A single issue reported for a file after an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
    pub message: String,
}

/// Read-only feed of issues for a just-written file, typically backed by a
/// language-server integration. Results are attached to the edit outcome and
/// never affect its success.
pub trait DiagnosticsProvider: Send + Sync {
    fn diagnostics_for(&self, path: &Path) -> Vec<Diagnostic>;
}
