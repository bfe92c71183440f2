//! Layered fuzzy matching: turning an imprecise "old fragment" into an
//! unambiguous replacement in file content.
//!
//! The resolver walks the matchers in a fixed priority order and accepts the
//! first candidate it can pin to a unique location. Cheap, precise strategies
//! run first, so a byte-exact match is never overridden by a looser
//! heuristic. A fragment that matches nowhere fails with
//! [`ReplaceError::NotFound`]; one that matches in several places (without
//! `replace_all`) fails with [`ReplaceError::AmbiguousMatch`] instead of
//! guessing.

mod matchers;

use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReplaceError {
    #[error("old and new fragments are identical")]
    IdenticalFragments,

    #[error("old fragment not found in file content")]
    NotFound,

    #[error(
        "old fragment matches multiple locations; provide more surrounding lines to identify the correct one"
    )]
    AmbiguousMatch,
}

/// Replace `old_fragment` with `new_fragment` inside `content`.
///
/// Matchers are consulted in priority order; each yielded candidate is pinned
/// down with an exact substring search. With `replace_all`, the first found
/// candidate replaces every literal occurrence. Otherwise the candidate must
/// occur exactly once; ambiguous candidates are skipped in favor of later
/// ones rather than resolved arbitrarily.
pub fn replace(
    content: &str,
    old_fragment: &str,
    new_fragment: &str,
    replace_all: bool,
) -> Result<String, ReplaceError> {
    if old_fragment == new_fragment {
        return Err(ReplaceError::IdenticalFragments);
    }
    if old_fragment.is_empty() {
        // Whole-file creation is handled before matching; an empty fragment
        // reaching this point can only match everywhere at once.
        return Err(ReplaceError::NotFound);
    }

    let mut found = false;
    for (strategy, matcher) in matchers::MATCHERS {
        for candidate in matcher(content, old_fragment) {
            let Some(index) = content.find(&candidate) else {
                continue;
            };
            found = true;

            if replace_all {
                trace!(strategy, "fragment matched; replacing all occurrences");
                return Ok(content.replace(&candidate, new_fragment));
            }

            if content.rfind(&candidate) != Some(index) {
                continue;
            }
            trace!(strategy, "fragment matched a unique occurrence");
            let mut updated =
                String::with_capacity(content.len() - candidate.len() + new_fragment.len());
            updated.push_str(&content[..index]);
            updated.push_str(new_fragment);
            updated.push_str(&content[index + candidate.len()..]);
            return Ok(updated);
        }
    }

    if found {
        Err(ReplaceError::AmbiguousMatch)
    } else {
        Err(ReplaceError::NotFound)
    }
}
