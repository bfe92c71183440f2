//! The edit orchestrator: validation, locking, staleness checks, matching,
//! authorization, atomic write, and diff reporting for a single edit call.

use crate::access::{AccessError, AccessGuard};
use crate::diff::{self, FileDiff};
use crate::hooks::{AllowAll, AskKind, Decision, Diagnostic, DiagnosticsProvider, EventSink, Gate};
use crate::replace::{self, ReplaceError};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// A proposed fragment replacement against one file.
///
/// An empty `old_fragment` means "create the file with `new_fragment` as its
/// full content". The two fragments must differ.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditRequest does nothing until applied with EditEngine::apply_edit"]
pub struct EditRequest {
    /// Target file; relative paths resolve against the engine root.
    pub file: PathBuf,
    /// The text believed to be present in the file.
    pub old_fragment: String,
    /// The text to put in its place.
    pub new_fragment: String,
    /// Replace every occurrence instead of requiring a unique match.
    pub replace_all: bool,
}

impl EditRequest {
    pub fn new(
        file: impl Into<PathBuf>,
        old_fragment: impl Into<String>,
        new_fragment: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            old_fragment: old_fragment.into(),
            new_fragment: new_fragment.into(),
            replace_all: false,
        }
    }

    pub fn replace_all(mut self) -> Self {
        self.replace_all = true;
        self
    }
}

/// Result of a successful edit: the rendered diff, the before/after record
/// with change counts, and any diagnostics reported for the touched file.
#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub diff: String,
    pub file_diff: FileDiff,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error(transparent)]
    Replace(#[from] ReplaceError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("edit to {path} was denied")]
    AuthorizationDenied { path: PathBuf },

    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("path is a directory, not a file: {path}")]
    IsDirectory { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Applies model-proposed edits to files in one project context.
///
/// All mutable engine state (the read ledger and the lock arena) lives on the
/// instance, so several projects can run in one process without sharing edit
/// state. The engine performs no background work; everything happens inside
/// the caller's [`EditEngine::apply_edit`] call.
pub struct EditEngine {
    root: PathBuf,
    access: AccessGuard,
    gate: Arc<dyn Gate>,
    sinks: Vec<Arc<dyn EventSink>>,
    diagnostics: Option<Arc<dyn DiagnosticsProvider>>,
}

impl EditEngine {
    /// Engine rooted at a project directory, approving everything and
    /// reporting to nobody until collaborators are wired in.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            access: AccessGuard::new(),
            gate: Arc::new(AllowAll),
            sinks: Vec::new(),
            diagnostics: None,
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_diagnostics(mut self, provider: Arc<dyn DiagnosticsProvider>) -> Self {
        self.diagnostics = Some(provider);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The guard owning this engine's read ledger and lock arena.
    pub fn access(&self) -> &AccessGuard {
        &self.access
    }

    /// Read a file and record the read for the session. This is what arms the
    /// staleness check: a session may only overwrite files it has read.
    pub fn read_file(&self, session: &str, file: impl AsRef<Path>) -> Result<String, EditError> {
        let path = self.resolve(file.as_ref());
        let content = fs::read_to_string(&path)?;
        self.access.record_read(session, &path);
        Ok(content)
    }

    /// Apply one edit: locate the old fragment, replace it, write the file
    /// atomically, and return the rendered diff plus change statistics.
    pub fn apply_edit(&self, session: &str, request: &EditRequest) -> Result<EditOutcome, EditError> {
        if request.old_fragment == request.new_fragment {
            return Err(ReplaceError::IdenticalFragments.into());
        }

        let path = self.resolve(&request.file);
        if !path.starts_with(&self.root) {
            let parent = path.parent().unwrap_or(&path);
            if self.gate.ask(AskKind::ExternalDirectory, &[parent], "") == Decision::Deny {
                return Err(EditError::AuthorizationDenied { path });
            }
        }

        let (diff, file_diff) = self
            .access
            .with_exclusive(&path, || self.apply_locked(session, &path, request))?;

        let diagnostics = self
            .diagnostics
            .as_ref()
            .map(|provider| provider.diagnostics_for(&path))
            .unwrap_or_default();

        Ok(EditOutcome {
            diff,
            file_diff,
            diagnostics,
        })
    }

    /// The body of an edit, run while holding the path's exclusive slot.
    fn apply_locked(
        &self,
        session: &str,
        path: &Path,
        request: &EditRequest,
    ) -> Result<(String, FileDiff), EditError> {
        let creating = request.old_fragment.is_empty();
        let before = if creating {
            String::new()
        } else {
            let metadata = fs::metadata(path).map_err(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    EditError::FileNotFound {
                        path: path.to_path_buf(),
                    }
                } else {
                    EditError::Io(err)
                }
            })?;
            if metadata.is_dir() {
                return Err(EditError::IsDirectory {
                    path: path.to_path_buf(),
                });
            }
            self.access.assert_fresh(session, path)?;
            fs::read_to_string(path)?
        };

        let planned = if creating {
            request.new_fragment.clone()
        } else {
            replace::replace(
                &before,
                &request.old_fragment,
                &request.new_fragment,
                request.replace_all,
            )?
        };

        // The gate sees the diff exactly as a reviewer would.
        let rendered = diff::trim_diff(&diff::build_unified(path, &before, &planned));
        if self.gate.ask(AskKind::Edit, &[path], &rendered) == Decision::Deny {
            debug!(path = %path.display(), "edit denied by authorization gate");
            return Err(EditError::AuthorizationDenied {
                path: path.to_path_buf(),
            });
        }

        if creating {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        atomic_write(path, planned.as_bytes())?;
        filetime::set_file_mtime(path, filetime::FileTime::now())?;
        debug!(path = %path.display(), bytes = planned.len(), "wrote new content");

        for sink in &self.sinks {
            sink.file_edited(path);
        }

        // Diff against the exact bytes now on disk, then count the write as a
        // read so the session can keep editing without an explicit re-read.
        let after = fs::read_to_string(path)?;
        let diff = diff::trim_diff(&diff::build_unified(path, &before, &after));
        let (additions, deletions) = diff::count_changes(&before, &after);
        self.access.record_read(session, path);

        Ok((
            diff,
            FileDiff {
                path: path.to_path_buf(),
                before,
                after,
                additions,
                deletions,
            },
        ))
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        }
    }
}

/// Atomic file write: tempfile in the target directory + fsync + rename.
/// Either the full write lands or the previous content survives untouched.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = path.parent().ok_or_else(|| {
        EditError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;

    Ok(())
}
