//! Cluster name resolution: exact, then case-insensitive, then fuzzy.

use crate::constants::FUZZY_MATCH_THRESHOLD;
use crate::error::ManagerError;
use glob::{MatchOptions, Pattern};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum MatchKind {
    Exact,
    CaseInsensitive,
    Fuzzy(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Resolved {
    pub(crate) name: String,
    pub(crate) kind: MatchKind,
}

pub(crate) fn resolve_name<'a, I>(query: &str, names: I) -> Result<Resolved, ManagerError>
where
    I: IntoIterator<Item = &'a str>,
{
    let names = names.into_iter().collect::<Vec<_>>();

    if names.iter().any(|name| *name == query) {
        return Ok(Resolved {
            name: query.to_string(),
            kind: MatchKind::Exact,
        });
    }

    let lowered = query.to_lowercase();
    if let Some(name) = names.iter().find(|name| name.to_lowercase() == lowered) {
        return Ok(Resolved {
            name: (*name).to_string(),
            kind: MatchKind::CaseInsensitive,
        });
    }

    match fuzzy_match(query, &names, FUZZY_MATCH_THRESHOLD) {
        Some((name, ratio)) => Ok(Resolved {
            name: name.to_string(),
            kind: MatchKind::Fuzzy(ratio),
        }),
        None => Err(ManagerError::NotFound(query.to_string())),
    }
}

/// Best candidate by [`similarity_ratio`] over lowercased strings. Ties keep
/// the earliest candidate.
pub(crate) fn fuzzy_match<'a>(
    query: &str,
    names: &[&'a str],
    threshold: f64,
) -> Option<(&'a str, f64)> {
    let query = query.to_lowercase();
    let mut best: Option<(&'a str, f64)> = None;
    for name in names {
        let ratio = similarity_ratio(&query, &name.to_lowercase());
        if ratio < threshold {
            continue;
        }
        if best.is_none_or(|(_, best_ratio)| ratio > best_ratio) {
            best = Some((*name, ratio));
        }
    }
    best
}

/// `2 * M / T`, where `M` counts characters in the recursively found longest
/// common blocks and `T` is the combined length. Range `[0, 1]`.
pub(crate) fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((a_lo, a_hi, b_lo, b_hi)) = pending.pop() {
        let (i, j, size) = longest_block(a, b, (a_lo, a_hi), (b_lo, b_hi));
        if size == 0 {
            continue;
        }
        matched += size;
        pending.push((a_lo, i, b_lo, j));
        pending.push((i + size, a_hi, j + size, b_hi));
    }
    matched
}

/// Longest common substring of `a[a_lo..a_hi]` and `b[b_lo..b_hi]`, earliest
/// in `a` and then in `b` on ties.
fn longest_block(
    a: &[char],
    b: &[char],
    (a_lo, a_hi): (usize, usize),
    (b_lo, b_hi): (usize, usize),
) -> (usize, usize, usize) {
    let width = b_hi - b_lo;
    let mut best = (a_lo, b_lo, 0);
    let mut previous = vec![0usize; width + 1];
    for i in a_lo..a_hi {
        let mut current = vec![0usize; width + 1];
        for j in b_lo..b_hi {
            if a[i] != b[j] {
                continue;
            }
            let run = previous[j - b_lo] + 1;
            current[j - b_lo + 1] = run;
            if run > best.2 {
                best = (i + 1 - run, j + 1 - run, run);
            }
        }
        previous = current;
    }
    best
}

/// Expands glob patterns (case-insensitive) against configured names,
/// dropping duplicates but keeping first-seen order. Returns the expanded
/// names and the patterns that matched nothing.
pub(crate) fn expand_patterns(patterns: &[String], names: &[&str]) -> (Vec<String>, Vec<String>) {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    let mut expanded: Vec<String> = Vec::new();
    let mut unmatched = Vec::new();
    for raw in patterns {
        let matches = match Pattern::new(raw) {
            Ok(pattern) => names
                .iter()
                .filter(|name| pattern.matches_with(name, options))
                .map(|name| (*name).to_string())
                .collect::<Vec<_>>(),
            Err(_) => names
                .iter()
                .filter(|name| name.eq_ignore_ascii_case(raw))
                .map(|name| (*name).to_string())
                .collect(),
        };
        if matches.is_empty() {
            unmatched.push(raw.clone());
        }
        for name in matches {
            if !expanded.contains(&name) {
                expanded.push(name);
            }
        }
    }
    (expanded, unmatched)
}

pub(crate) fn is_pattern(value: &str) -> bool {
    value.contains(['*', '?', '['])
}
