//! End-to-end tests for the edit workflow: read ledger, locking, matching,
//! authorization, atomic writes, and diff reporting against real files.

use fragment_patcher::{
    AccessError, AskKind, Decision, Diagnostic, DiagnosticsProvider, EditEngine, EditError,
    EditRequest, EventSink, Gate, ReplaceError, Severity,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const SESSION: &str = "test-session";

/// Engine rooted in a fresh temp dir with one seeded file.
fn setup(content: &str) -> (TempDir, EditEngine) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("target.txt"), content).unwrap();
    let engine = EditEngine::new(dir.path());
    (dir, engine)
}

/// Gate that refuses every ask.
struct DenyAll;

impl Gate for DenyAll {
    fn ask(&self, _kind: AskKind, _targets: &[&Path], _rendered_diff: &str) -> Decision {
        Decision::Deny
    }
}

/// Gate that records every ask and answers with a fixed decision.
struct RecordingGate {
    asks: Mutex<Vec<(AskKind, String)>>,
    decision: Decision,
}

impl RecordingGate {
    fn allowing() -> Self {
        Self {
            asks: Mutex::new(Vec::new()),
            decision: Decision::Allow,
        }
    }
}

impl Gate for RecordingGate {
    fn ask(&self, kind: AskKind, _targets: &[&Path], rendered_diff: &str) -> Decision {
        self.asks
            .lock()
            .unwrap()
            .push((kind, rendered_diff.to_owned()));
        self.decision
    }
}

#[derive(Default)]
struct RecordingSink {
    edited: Mutex<Vec<PathBuf>>,
}

impl EventSink for RecordingSink {
    fn file_edited(&self, path: &Path) {
        self.edited.lock().unwrap().push(path.to_path_buf());
    }
}

struct OneWarning;

impl DiagnosticsProvider for OneWarning {
    fn diagnostics_for(&self, _path: &Path) -> Vec<Diagnostic> {
        vec![Diagnostic {
            line: 1,
            column: 1,
            severity: Severity::Warning,
            message: "unused variable".to_owned(),
        }]
    }
}

#[test]
fn single_line_replacement_reports_one_addition_one_deletion() {
    let (dir, engine) = setup("  foo\n  bar\n  baz\n");
    engine.read_file(SESSION, "target.txt").unwrap();

    let outcome = engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "bar", "qux"))
        .unwrap();

    let written = fs::read_to_string(dir.path().join("target.txt")).unwrap();
    assert_eq!(written, "  foo\n  qux\n  baz\n");
    assert_eq!(outcome.file_diff.additions, 1);
    assert_eq!(outcome.file_diff.deletions, 1);
    assert_eq!(outcome.file_diff.before, "  foo\n  bar\n  baz\n");
    assert_eq!(outcome.file_diff.after, written);
    // The rendered diff is trimmed to the change's own indentation.
    assert!(outcome.diff.contains("-bar"));
    assert!(outcome.diff.contains("+qux"));
}

#[test]
fn fragment_with_different_indentation_still_matches() {
    let (dir, engine) = setup("fn outer() {\n    if ready {\n        launch();\n    }\n}\n");
    engine.read_file(SESSION, "target.txt").unwrap();

    let request = EditRequest::new(
        "target.txt",
        "  if ready {\n      launch();\n  }",
        "    if ready {\n        abort();\n    }",
    );
    engine.apply_edit(SESSION, &request).unwrap();

    let written = fs::read_to_string(dir.path().join("target.txt")).unwrap();
    assert_eq!(
        written,
        "fn outer() {\n    if ready {\n        abort();\n    }\n}\n"
    );
}

#[test]
fn replace_all_rewrites_every_occurrence() {
    let (dir, engine) = setup("a = old;\nb = old;\nc = other;\n");
    engine.read_file(SESSION, "target.txt").unwrap();

    let request = EditRequest::new("target.txt", "old", "new").replace_all();
    engine.apply_edit(SESSION, &request).unwrap();

    let written = fs::read_to_string(dir.path().join("target.txt")).unwrap();
    assert_eq!(written, "a = new;\nb = new;\nc = other;\n");
}

#[test]
fn duplicate_fragment_without_replace_all_is_ambiguous() {
    let (dir, engine) = setup("a = old;\nb = old;\n");
    engine.read_file(SESSION, "target.txt").unwrap();

    let err = engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "old", "new"))
        .unwrap_err();
    assert!(matches!(
        err,
        EditError::Replace(ReplaceError::AmbiguousMatch)
    ));
    // Nothing was written.
    assert_eq!(
        fs::read_to_string(dir.path().join("target.txt")).unwrap(),
        "a = old;\nb = old;\n"
    );
}

#[test]
fn missing_fragment_is_not_found() {
    let (_dir, engine) = setup("some content\n");
    engine.read_file(SESSION, "target.txt").unwrap();

    let err = engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "absent", "new"))
        .unwrap_err();
    assert!(matches!(err, EditError::Replace(ReplaceError::NotFound)));
}

#[test]
fn editing_without_reading_is_refused() {
    let (_dir, engine) = setup("content\n");

    let err = engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "content", "new"))
        .unwrap_err();
    assert!(matches!(err, EditError::Access(AccessError::NotRead { .. })));
}

#[test]
fn external_modification_requires_reread() {
    let (dir, engine) = setup("original\n");
    let path = dir.path().join("target.txt");
    engine.read_file(SESSION, "target.txt").unwrap();

    // Another writer touches the file after our read.
    thread::sleep(Duration::from_millis(50));
    fs::write(&path, "original plus external change\n").unwrap();
    filetime::set_file_mtime(&path, filetime::FileTime::now()).unwrap();

    let request = EditRequest::new("target.txt", "original", "updated");
    let err = engine.apply_edit(SESSION, &request).unwrap_err();
    assert!(matches!(err, EditError::Access(AccessError::Stale { .. })));

    // Re-reading clears the staleness and the edit goes through.
    engine.read_file(SESSION, "target.txt").unwrap();
    engine.apply_edit(SESSION, &request).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "updated plus external change\n"
    );
}

#[test]
fn write_counts_as_read_for_follow_up_edits() {
    let (dir, engine) = setup("step zero\n");
    engine.read_file(SESSION, "target.txt").unwrap();

    engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "zero", "one"))
        .unwrap();
    // No explicit re-read between the two edits.
    engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "one", "two"))
        .unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("target.txt")).unwrap(),
        "step two\n"
    );
}

#[test]
fn empty_old_fragment_creates_the_file() {
    let dir = TempDir::new().unwrap();
    let engine = EditEngine::new(dir.path());

    let request = EditRequest::new("nested/dir/created.txt", "", "fresh content\n");
    let outcome = engine.apply_edit(SESSION, &request).unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("nested/dir/created.txt")).unwrap(),
        "fresh content\n"
    );
    assert_eq!(outcome.file_diff.before, "");
    assert_eq!(outcome.file_diff.additions, 1);
    assert_eq!(outcome.file_diff.deletions, 0);
}

#[test]
fn denied_gate_leaves_file_untouched() {
    let (dir, engine) = setup("precious\n");
    let engine = engine.with_gate(Arc::new(DenyAll));
    engine.read_file(SESSION, "target.txt").unwrap();

    let err = engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "precious", "gone"))
        .unwrap_err();
    assert!(matches!(err, EditError::AuthorizationDenied { .. }));
    assert_eq!(
        fs::read_to_string(dir.path().join("target.txt")).unwrap(),
        "precious\n"
    );
}

#[test]
fn gate_sees_the_trimmed_diff_before_the_write() {
    let (_dir, engine) = setup("    alpha\n    beta\n");
    let gate = Arc::new(RecordingGate::allowing());
    let engine = engine.with_gate(gate.clone());
    engine.read_file(SESSION, "target.txt").unwrap();

    engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "beta", "gamma"))
        .unwrap();

    let asks = gate.asks.lock().unwrap();
    assert_eq!(asks.len(), 1);
    let (kind, rendered) = &asks[0];
    assert_eq!(*kind, AskKind::Edit);
    // Common indentation is stripped for review display.
    assert!(rendered.contains("\n-beta"));
    assert!(rendered.contains("\n+gamma"));
}

#[test]
fn edit_outside_root_asks_the_gate() {
    let root = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let target = outside.path().join("external.txt");
    fs::write(&target, "external\n").unwrap();

    let engine = EditEngine::new(root.path()).with_gate(Arc::new(DenyAll));
    let err = engine
        .apply_edit(SESSION, &EditRequest::new(&target, "external", "changed"))
        .unwrap_err();
    assert!(matches!(err, EditError::AuthorizationDenied { .. }));
    assert_eq!(fs::read_to_string(&target).unwrap(), "external\n");
}

#[test]
fn successful_edit_notifies_event_sinks() {
    let (dir, engine) = setup("signal\n");
    let sink = Arc::new(RecordingSink::default());
    let engine = engine.with_event_sink(sink.clone());
    engine.read_file(SESSION, "target.txt").unwrap();

    engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "signal", "noise"))
        .unwrap();

    let edited = sink.edited.lock().unwrap();
    assert_eq!(edited.as_slice(), [dir.path().join("target.txt")]);
}

#[test]
fn failed_edit_does_not_notify_event_sinks() {
    let (_dir, engine) = setup("signal\n");
    let sink = Arc::new(RecordingSink::default());
    let engine = engine
        .with_event_sink(sink.clone())
        .with_gate(Arc::new(DenyAll));
    engine.read_file(SESSION, "target.txt").unwrap();

    engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "signal", "noise"))
        .unwrap_err();
    assert!(sink.edited.lock().unwrap().is_empty());
}

#[test]
fn diagnostics_are_attached_to_the_outcome() {
    let (_dir, engine) = setup("let x = 1;\n");
    let engine = engine.with_diagnostics(Arc::new(OneWarning));
    engine.read_file(SESSION, "target.txt").unwrap();

    let outcome = engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "x", "y"))
        .unwrap();
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].severity, Severity::Warning);
}

#[test]
fn concurrent_edits_of_one_file_both_land() {
    let (dir, engine) = setup("items:\n");
    let engine = Arc::new(engine);
    let path = dir.path().join("target.txt");

    let mut workers = Vec::new();
    for name in ["first", "second"] {
        let engine = Arc::clone(&engine);
        workers.push(thread::spawn(move || {
            let session = format!("session-{name}");
            // Reads can go stale while queued behind the other writer;
            // re-read and retry exactly as an agent would.
            loop {
                engine.read_file(&session, "target.txt").unwrap();
                let request =
                    EditRequest::new("target.txt", "items:", format!("items:\nitem-{name}"));
                match engine.apply_edit(&session, &request) {
                    Ok(_) => break,
                    Err(EditError::Access(AccessError::Stale { .. })) => continue,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("item-first"));
    assert!(written.contains("item-second"));
    assert_eq!(engine.access().active_locks(), 0);
}

#[test]
fn outcome_serializes_to_json() {
    let (_dir, engine) = setup("serial\n");
    engine.read_file(SESSION, "target.txt").unwrap();

    let outcome = engine
        .apply_edit(SESSION, &EditRequest::new("target.txt", "serial", "parallel"))
        .unwrap();
    let json = serde_json::to_string(&outcome).unwrap();
    assert!(json.contains("\"additions\":1"));
    assert!(json.contains("\"deletions\":1"));
}
