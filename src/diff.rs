//! Unified diff construction, trimming, and change statistics.
//!
//! The rendered diff serves two callers: the authorization gate, which shows
//! it to a human before the write happens, and the edit outcome, where it is
//! the reviewable change record. Line endings are normalized (`\r\n` → `\n`)
//! for comparison only; written file content is never altered here.

use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};

/// Before/after snapshot of an edited file plus line-level change counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub before: String,
    pub after: String,
    pub additions: usize,
    pub deletions: usize,
}

/// Build a unified diff of the whole file (context radius spans every line).
pub fn build_unified(path: &Path, before: &str, after: &str) -> String {
    let before = normalize_line_endings(before);
    let after = normalize_line_endings(after);
    let radius = before.lines().count().max(after.lines().count());
    let header = path.display().to_string();

    let diff = TextDiff::from_lines(before.as_str(), after.as_str());
    let mut unified = diff.unified_diff();
    unified.context_radius(radius).header(&header, &header);
    unified.to_string()
}

/// Strip the common leading whitespace from every changed/context line of a
/// rendered diff. Header lines (`---`/`+++`) and hunk markers are left
/// untouched. Purely cosmetic and idempotent.
pub fn trim_diff(diff: &str) -> String {
    let lines: Vec<&str> = diff.split('\n').collect();

    let mut min_indent: Option<usize> = None;
    for line in &lines {
        if !is_content_line(line) {
            continue;
        }
        let body = &line[1..];
        if body.trim().is_empty() {
            continue;
        }
        let indent = body.chars().take_while(|c| c.is_whitespace()).count();
        min_indent = Some(min_indent.map_or(indent, |min| min.min(indent)));
    }

    let Some(min_indent) = min_indent else {
        return diff.to_owned();
    };
    if min_indent == 0 {
        return diff.to_owned();
    }

    lines
        .iter()
        .map(|line| {
            if is_content_line(line) {
                let (prefix, body) = line.split_at(1);
                let stripped: String = body.chars().skip(min_indent).collect();
                format!("{prefix}{stripped}")
            } else {
                (*line).to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Count added and deleted lines between two versions of a file.
pub fn count_changes(before: &str, after: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(before, after);
    let mut additions = 0usize;
    let mut deletions = 0usize;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }
    (additions, deletions)
}

fn is_content_line(line: &str) -> bool {
    (line.starts_with('+') || line.starts_with('-') || line.starts_with(' '))
        && !line.starts_with("---")
        && !line.starts_with("+++")
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
}
