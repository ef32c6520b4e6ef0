//! Text folding shared by the TOC scanner and the heading search.
//!
//! Folding collapses every whitespace run to a single space, lowercases,
//! drops soft hyphens and maps typographic dashes/quotes to ASCII. The same
//! fold is applied to TOC titles and to body text, so both heuristics agree
//! on what "the same heading" means.

use std::ops::Range;

const LEADER_CHARS: &[char] = &['.', '·', '…', '_', '\u{2024}', '\u{2027}'];

/// Fold `text` for comparison.
pub fn normalize(text: &str) -> String {
    NormalizedText::new(text).folded
}

/// Strip trailing dot-leader noise ("Overview ........", "Overview . . .").
/// A single trailing period is kept since it can be part of the title.
pub fn strip_leader(title: &str) -> &str {
    let trimmed = title.trim_end();
    let stripped = trimmed.trim_end_matches(|c: char| c.is_whitespace() || LEADER_CHARS.contains(&c));
    let leaders = trimmed[stripped.len()..]
        .chars()
        .filter(|c| LEADER_CHARS.contains(c))
        .count();
    if leaders >= 2 || trimmed[stripped.len()..].contains(['…', '_']) {
        stripped
    } else {
        trimmed
    }
}

enum Fold {
    Space,
    Drop,
    Keep(char),
}

fn fold(c: char) -> Fold {
    match c {
        c if c.is_whitespace() => Fold::Space,
        '\u{00AD}' | '\u{200B}' | '\u{FEFF}' => Fold::Drop,
        '\u{2010}'..='\u{2015}' | '\u{2212}' => Fold::Keep('-'),
        '\u{2018}' | '\u{2019}' => Fold::Keep('\''),
        '\u{201C}' | '\u{201D}' => Fold::Keep('"'),
        c => Fold::Keep(c),
    }
}

/// Folded copy of a text that remembers where every folded byte came from.
#[derive(Debug, Clone)]
pub struct NormalizedText {
    folded: String,
    origin: Vec<usize>,
}

impl NormalizedText {
    pub fn new(text: &str) -> Self {
        let mut folded = String::with_capacity(text.len());
        let mut origin = Vec::with_capacity(text.len());
        let mut space_at: Option<usize> = None;

        for (offset, c) in text.char_indices() {
            match fold(c) {
                Fold::Space => {
                    if !folded.is_empty() && space_at.is_none() {
                        space_at = Some(offset);
                    }
                }
                Fold::Drop => {}
                Fold::Keep(c) => {
                    if let Some(at) = space_at.take() {
                        folded.push(' ');
                        origin.push(at);
                    }
                    for lower in c.to_lowercase() {
                        folded.push(lower);
                        origin.extend(std::iter::repeat(offset).take(lower.len_utf8()));
                    }
                }
            }
        }

        NormalizedText { folded, origin }
    }

    /// Find `needle` (already folded) at or after original byte offset `from`.
    ///
    /// Matches must sit on word boundaries: the byte before is not
    /// alphanumeric or '.', the byte after is not alphanumeric. Returns the
    /// original byte offset of the match start.
    pub fn find(&self, needle: &str, from: usize) -> Option<usize> {
        self.find_where(needle, from..usize::MAX, |_| true)
    }

    /// Like [`find`](Self::find), restricted to matches starting inside
    /// `window` (original offsets) for which `accept(original_offset)` holds.
    pub fn find_where<F>(&self, needle: &str, window: Range<usize>, accept: F) -> Option<usize>
    where
        F: Fn(usize) -> bool,
    {
        if needle.is_empty() {
            return None;
        }
        let hay = self.folded.as_bytes();
        let mut idx = self.origin.partition_point(|&o| o < window.start);

        while idx <= self.folded.len() {
            let rel = self.folded.get(idx..)?.find(needle)?;
            let start = idx + rel;
            if self.origin[start] >= window.end {
                return None;
            }
            let end = start + needle.len();

            let before_ok = start == 0 || {
                let b = hay[start - 1];
                !(b.is_ascii_alphanumeric() || b == b'.')
            };
            let after_ok = end >= hay.len() || !hay[end].is_ascii_alphanumeric();

            if before_ok && after_ok && accept(self.origin[start]) {
                return Some(self.origin[start]);
            }

            // step past this match to the next char boundary
            idx = start + 1;
            while idx < self.folded.len() && !self.folded.is_char_boundary(idx) {
                idx += 1;
            }
        }
        None
    }
}
