//! Candidate matchers for locating an imprecise fragment in file content.
//!
//! Each matcher consumes `(content, fragment)` and lazily yields candidate
//! substrings of `content` that plausibly correspond to the fragment. Matchers
//! never report offsets; the resolver in the parent module recovers them with
//! an exact substring search, so every yielded candidate must be literal text
//! taken from (or present in) `content`.

use regex::Regex;
use std::iter;

/// A finite, non-restartable sequence of candidate strings.
pub(super) type CandidateIter<'a> = Box<dyn Iterator<Item = String> + 'a>;

/// A matching strategy, paired with a short name for trace output.
pub(super) type Matcher = for<'a> fn(&'a str, &'a str) -> CandidateIter<'a>;

/// All strategies in resolution priority order. Cheaper and more precise
/// matchers come first so an exact match is never overridden by a looser
/// heuristic.
pub(super) const MATCHERS: [(&str, Matcher); 9] = [
    ("exact", exact),
    ("line-trimmed", line_trimmed),
    ("block-anchor", block_anchor),
    ("whitespace-normalized", whitespace_normalized),
    ("indentation-flexible", indentation_flexible),
    ("escape-normalized", escape_normalized),
    ("trimmed-boundary", trimmed_boundary),
    ("context-aware", context_aware),
    ("multi-occurrence", multi_occurrence),
];

// Similarity thresholds for block anchor fallback matching.
const SINGLE_CANDIDATE_SIMILARITY_THRESHOLD: f64 = 0.0;
const MULTIPLE_CANDIDATES_SIMILARITY_THRESHOLD: f64 = 0.3;

/// Per-line similarity score in `[0, 1]`: `1 - distance / max_len`.
///
/// Callers skip the comparison entirely when both lines are empty, so this
/// never divides by zero.
fn line_similarity(a: &str, b: &str, max_len: usize) -> f64 {
    1.0 - strsim::levenshtein(a, b) as f64 / max_len as f64
}

/// Fast path: yields the fragment unchanged for byte-exact matches.
fn exact<'a>(_content: &'a str, fragment: &'a str) -> CandidateIter<'a> {
    Box::new(iter::once(fragment.to_owned()))
}

/// Matches a contiguous block whose lines equal the fragment's lines after
/// trimming each line. Handles indentation drift; yields the original
/// (untrimmed) text from content.
fn line_trimmed<'a>(content: &'a str, fragment: &'a str) -> CandidateIter<'a> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut search: Vec<&str> = fragment.split('\n').collect();

    if search.last() == Some(&"") {
        search.pop();
    }
    if search.is_empty() || search.len() > lines.len() {
        return Box::new(iter::empty());
    }

    let last_start = lines.len() - search.len();
    Box::new((0..=last_start).filter_map(move |i| {
        let matches = search
            .iter()
            .enumerate()
            .all(|(j, s)| lines[i + j].trim() == s.trim());
        matches.then(|| extract_block(content, &lines, i, i + search.len() - 1))
    }))
}

/// Anchors on the fragment's first and last trimmed lines, then scores the
/// interior lines by Levenshtein similarity. A sole anchor pair is accepted
/// outright; among several, the best must clear a 0.3 mean similarity.
fn block_anchor<'a>(content: &'a str, fragment: &'a str) -> CandidateIter<'a> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut search: Vec<&str> = fragment.split('\n').collect();

    if search.len() < 3 {
        return Box::new(iter::empty());
    }
    if search.last() == Some(&"") {
        search.pop();
    }

    let first_search = search[0].trim();
    let last_search = search[search.len() - 1].trim();
    let search_block_size = search.len();

    // Candidate (start, end) line ranges where both anchors match. For each
    // first-line hit only the nearest last-line hit is considered.
    let mut candidates: Vec<(usize, usize)> = Vec::new();
    for i in 0..lines.len() {
        if lines[i].trim() != first_search {
            continue;
        }
        if let Some(j) = ((i + 2)..lines.len()).find(|&j| lines[j].trim() == last_search) {
            candidates.push((i, j));
        }
    }

    if candidates.is_empty() {
        return Box::new(iter::empty());
    }

    if candidates.len() == 1 {
        let (start, end) = candidates[0];
        let actual_block_size = end - start + 1;
        let lines_to_check = search_block_size
            .saturating_sub(2)
            .min(actual_block_size.saturating_sub(2));

        let mut similarity = if lines_to_check > 0 { 0.0 } else { 1.0 };
        for j in 1..search_block_size.min(actual_block_size).saturating_sub(1) {
            let original_line = lines[start + j].trim();
            let search_line = search[j].trim();
            let max_len = original_line.chars().count().max(search_line.chars().count());
            if max_len == 0 {
                continue;
            }
            similarity +=
                line_similarity(original_line, search_line, max_len) / lines_to_check as f64;
            if similarity >= SINGLE_CANDIDATE_SIMILARITY_THRESHOLD {
                break;
            }
        }

        let block = (similarity >= SINGLE_CANDIDATE_SIMILARITY_THRESHOLD)
            .then(|| extract_block(content, &lines, start, end));
        return Box::new(block.into_iter());
    }

    // Multiple anchor pairs: pick the best-scoring one, subject to threshold.
    let mut best: Option<(usize, usize)> = None;
    let mut max_similarity = -1.0f64;
    for &(start, end) in &candidates {
        let actual_block_size = end - start + 1;
        let lines_to_check = search_block_size
            .saturating_sub(2)
            .min(actual_block_size.saturating_sub(2));

        let similarity = if lines_to_check > 0 {
            let mut sum = 0.0;
            for j in 1..search_block_size.min(actual_block_size).saturating_sub(1) {
                let original_line = lines[start + j].trim();
                let search_line = search[j].trim();
                let max_len = original_line.chars().count().max(search_line.chars().count());
                if max_len == 0 {
                    continue;
                }
                sum += line_similarity(original_line, search_line, max_len);
            }
            sum / lines_to_check as f64
        } else {
            1.0
        };

        if similarity > max_similarity {
            max_similarity = similarity;
            best = Some((start, end));
        }
    }

    let block = (max_similarity >= MULTIPLE_CANDIDATES_SIMILARITY_THRESHOLD)
        .then(|| best)
        .flatten()
        .map(|(start, end)| extract_block(content, &lines, start, end));
    Box::new(block.into_iter())
}

/// Matches after collapsing whitespace runs to a single space and trimming.
/// For a partial single-line match, reconstructs the exact substring with a
/// whitespace-flexible regular expression built from the fragment's words.
fn whitespace_normalized<'a>(content: &'a str, fragment: &'a str) -> CandidateIter<'a> {
    let normalized_find = normalize_whitespace(fragment);
    let pattern = word_pattern(fragment);

    let single_find = normalized_find.clone();
    let singles = content.split('\n').filter_map(move |line| {
        let normalized_line = normalize_whitespace(line);
        if normalized_line == single_find {
            Some(line.to_owned())
        } else if normalized_line.contains(&single_find) {
            pattern
                .as_ref()
                .and_then(|re| re.find(line))
                .map(|m| m.as_str().to_owned())
        } else {
            None
        }
    });

    let find_line_count = fragment.split('\n').count();
    let lines: Vec<&str> = content.split('\n').collect();
    let multis: CandidateIter<'a> = if find_line_count > 1 && find_line_count <= lines.len() {
        let last_start = lines.len() - find_line_count;
        Box::new((0..=last_start).filter_map(move |i| {
            let block = lines[i..i + find_line_count].join("\n");
            (normalize_whitespace(&block) == normalized_find).then_some(block)
        }))
    } else {
        Box::new(iter::empty())
    };

    Box::new(singles.chain(multis))
}

/// Matches after removing the minimum common leading indentation from every
/// non-blank line of both sides. Yields the original (indented) block.
fn indentation_flexible<'a>(content: &'a str, fragment: &'a str) -> CandidateIter<'a> {
    let dedented_find = remove_indentation(fragment);
    let lines: Vec<&str> = content.split('\n').collect();
    let find_line_count = fragment.split('\n').count();

    if find_line_count > lines.len() {
        return Box::new(iter::empty());
    }

    let last_start = lines.len() - find_line_count;
    Box::new((0..=last_start).filter_map(move |i| {
        let block = lines[i..i + find_line_count].join("\n");
        (remove_indentation(&block) == dedented_find).then_some(block)
    }))
}

/// Matches after undoing common backslash escape sequences in the fragment,
/// and also finds content blocks whose own unescaped form agrees.
fn escape_normalized<'a>(content: &'a str, fragment: &'a str) -> CandidateIter<'a> {
    let unescaped_find = unescape(fragment);

    let direct = content
        .contains(&unescaped_find)
        .then(|| unescaped_find.clone());

    let lines: Vec<&str> = content.split('\n').collect();
    let find_line_count = unescaped_find.split('\n').count();
    let blocks: CandidateIter<'a> = if find_line_count <= lines.len() {
        let last_start = lines.len() - find_line_count;
        Box::new((0..=last_start).filter_map(move |i| {
            let block = lines[i..i + find_line_count].join("\n");
            (unescape(&block) == unescaped_find).then_some(block)
        }))
    } else {
        Box::new(iter::empty())
    };

    Box::new(direct.into_iter().chain(blocks))
}

/// If the fragment carries leading/trailing whitespace of its own, tries the
/// trimmed fragment directly and looks for blocks whose trim equals it.
fn trimmed_boundary<'a>(content: &'a str, fragment: &'a str) -> CandidateIter<'a> {
    let trimmed_find = fragment.trim().to_owned();

    if trimmed_find == fragment {
        // Already trimmed, nothing new to try.
        return Box::new(iter::empty());
    }

    let direct = content.contains(&trimmed_find).then(|| trimmed_find.clone());

    let lines: Vec<&str> = content.split('\n').collect();
    let find_line_count = fragment.split('\n').count();
    let blocks: CandidateIter<'a> = if find_line_count <= lines.len() {
        let last_start = lines.len() - find_line_count;
        Box::new((0..=last_start).filter_map(move |i| {
            let block = lines[i..i + find_line_count].join("\n");
            (block.trim() == trimmed_find).then_some(block)
        }))
    } else {
        Box::new(iter::empty())
    };

    Box::new(direct.into_iter().chain(blocks))
}

/// Anchors on first/last trimmed lines like the block-anchor strategy, but
/// only accepts a block of identical line count where at least half of the
/// interior non-blank lines match exactly when trimmed.
fn context_aware<'a>(content: &'a str, fragment: &'a str) -> CandidateIter<'a> {
    let mut search: Vec<&str> = fragment.split('\n').collect();

    if search.len() < 3 {
        // Need at least 3 lines to have meaningful context.
        return Box::new(iter::empty());
    }
    if search.last() == Some(&"") {
        search.pop();
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let first_search = search[0].trim().to_owned();
    let last_search = search[search.len() - 1].trim().to_owned();

    Box::new((0..lines.len()).filter_map(move |i| {
        if lines[i].trim() != first_search {
            return None;
        }
        // Only the nearest last-line occurrence bounds this block.
        let j = ((i + 2)..lines.len()).find(|&j| lines[j].trim() == last_search)?;
        let block_lines = &lines[i..=j];
        if block_lines.len() != search.len() {
            return None;
        }

        let mut matching = 0usize;
        let mut total_non_empty = 0usize;
        for k in 1..block_lines.len() - 1 {
            let block_line = block_lines[k].trim();
            let search_line = search[k].trim();
            if !block_line.is_empty() || !search_line.is_empty() {
                total_non_empty += 1;
                if block_line == search_line {
                    matching += 1;
                }
            }
        }

        let acceptable =
            total_non_empty == 0 || matching as f64 / total_non_empty as f64 >= 0.5;
        acceptable.then(|| block_lines.join("\n"))
    }))
}

/// Yields the fragment once per exact occurrence; the resolver turns this
/// into a replace-all when requested.
fn multi_occurrence<'a>(content: &'a str, fragment: &'a str) -> CandidateIter<'a> {
    if fragment.is_empty() {
        return Box::new(iter::empty());
    }
    let find = fragment.to_owned();
    let mut start = 0usize;
    Box::new(iter::from_fn(move || {
        let index = content[start..].find(&find)?;
        start += index + find.len();
        Some(find.clone())
    }))
}

/// Extract the original text of `lines[start_line..=end_line]` from content,
/// preserving the exact bytes between line boundaries.
fn extract_block(content: &str, lines: &[&str], start_line: usize, end_line: usize) -> String {
    let mut start = 0usize;
    for line in &lines[..start_line] {
        start += line.len() + 1;
    }
    let mut end = start;
    for (k, line) in lines[start_line..=end_line].iter().enumerate() {
        end += line.len();
        if start_line + k < end_line {
            end += 1;
        }
    }
    content[start..end].to_owned()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-flexible regex over the fragment's words, used to recover the
/// exact substring of a partially matching line.
fn word_pattern(fragment: &str) -> Option<Regex> {
    let words: Vec<&str> = fragment.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let pattern = words
        .iter()
        .map(|word| regex::escape(word))
        .collect::<Vec<_>>()
        .join(r"\s+");
    Regex::new(&pattern).ok()
}

fn remove_indentation(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let min_indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.chars().take_while(|c| c.is_whitespace()).count())
        .min();
    let Some(min_indent) = min_indent else {
        return text.to_owned();
    };
    lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                (*line).to_owned()
            } else {
                line.chars().skip(min_indent).collect()
            }
        })
        .collect::<Vec<String>>()
        .join("\n")
}

/// Undo the backslash escapes a model commonly leaves in fragments:
/// `\n \t \r \' \" \` \\ \$` and backslash-newline.
fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                chars.next();
                result.push('\n');
            }
            Some('t') => {
                chars.next();
                result.push('\t');
            }
            Some('r') => {
                chars.next();
                result.push('\r');
            }
            Some('\'') => {
                chars.next();
                result.push('\'');
            }
            Some('"') => {
                chars.next();
                result.push('"');
            }
            Some('`') => {
                chars.next();
                result.push('`');
            }
            Some('\\') => {
                chars.next();
                result.push('\\');
            }
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('\n') => {
                chars.next();
                result.push('\n');
            }
            _ => result.push(ch),
        }
    }
    result
}
