//! Text normalization and character n-gram similarity.
//!
//! Address names are short, mostly CJK strings where token-based similarity
//! degrades; character n-gram Jaccard is the workhorse instead.

use std::collections::BTreeSet;

/// Normalize free text for comparison: fullwidth brackets and digits to
/// halfwidth, bracketed segments dropped, whitespace collapsed, lowercased.
pub fn normalize_text(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.trim().chars() {
        let c = match c {
            '（' => '(',
            '）' => ')',
            '【' | '［' => '[',
            '】' | '］' => ']',
            '０'..='９' => {
                char::from_u32('0' as u32 + (c as u32 - '０' as u32)).unwrap_or(c)
            }
            _ => c,
        };
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    let mut out = String::with_capacity(stripped.len());
    let mut pending_space = false;
    for c in stripped.trim().chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Lookup key for alias tables: lowercase, all whitespace removed.
pub fn alias_key(s: &str) -> String {
    s.split_whitespace()
        .flat_map(|w| w.chars())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Character n-grams of `s`, whitespace removed. A string shorter than `n`
/// yields itself as the single gram.
pub fn char_ngrams(s: &str, n: usize) -> BTreeSet<String> {
    let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.is_empty() || n == 0 {
        return BTreeSet::new();
    }
    if chars.len() < n {
        let mut set = BTreeSet::new();
        set.insert(chars.iter().collect());
        return set;
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Jaccard similarity over character n-grams, in [0, 1].
pub fn jaccard(a: &str, b: &str, n: usize) -> f64 {
    let ga = char_ngrams(a, n);
    let gb = char_ngrams(b, n);
    if ga.is_empty() || gb.is_empty() {
        return 0.0;
    }
    let inter = ga.intersection(&gb).count();
    let union = ga.union(&gb).count();
    inter as f64 / union.max(1) as f64
}

/// Name similarity: the better of bigram and trigram Jaccard.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    jaccard(a, b, 2).max(jaccard(a, b, 3))
}
