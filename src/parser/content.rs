use std::ops::Range;

use regex::Regex;
use tracing::{debug, warn};

use super::hierarchy::SectionNode;
use super::normalize::{normalize, strip_leader, NormalizedText};
use crate::error::Diagnostic;
use crate::source::Page;

/// How a section's start boundary was located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKind {
    /// Normalized heading text found.
    Exact,
    /// Only the section number was found at a line start; the body's title differs.
    IdOnly { body_title: String },
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionContent {
    pub node: SectionNode,
    pub content: String,
    /// Byte range into the body stream.
    pub span: Option<Range<usize>>,
    pub match_kind: MatchKind,
    pub tags: Vec<String>,
}

/// The document body as one linear stream, with page start offsets.
#[derive(Debug, Clone)]
pub struct BodyText {
    text: String,
    // (page number, byte offset of the page's first byte)
    page_starts: Vec<(u32, usize)>,
    folded: NormalizedText,
}

impl BodyText {
    pub fn from_pages(pages: &[Page]) -> Self {
        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(pages.len());
        for page in pages {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            page_starts.push((page.number, text.len()));
            text.push_str(&page.text);
        }
        let folded = NormalizedText::new(&text);
        BodyText {
            text,
            page_starts,
            folded,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Offset where physical page `number` starts. Pages before the body clamp
    /// to 0; pages past the end give `None`.
    pub fn page_start(&self, number: i64) -> Option<usize> {
        let idx = self
            .page_starts
            .partition_point(|&(n, _)| i64::from(n) < number);
        self.page_starts.get(idx).map(|&(_, offset)| offset)
    }

    /// Physical page containing byte `offset`.
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        let idx = self.page_starts.partition_point(|&(_, start)| start <= offset);
        idx.checked_sub(1).map(|i| self.page_starts[i].0)
    }

    /// Offset just past physical page `number` (end of body when it is the last).
    fn page_end(&self, number: i64) -> usize {
        self.page_start(number + 1).unwrap_or(self.text.len())
    }

    fn at_line_start(&self, offset: usize) -> bool {
        self.text[..offset]
            .rsplit('\n')
            .next()
            .is_some_and(|prefix| prefix.trim().is_empty())
    }

    /// Heading search inside `window`: an occurrence at the start of a line
    /// first, then one anywhere in the window.
    fn find_heading(&self, needle: &str, window: Range<usize>) -> Option<usize> {
        self.find_heading_at_line_start(needle, window.clone())
            .or_else(|| self.folded.find_where(needle, window, |_| true))
    }

    fn find_heading_at_line_start(&self, needle: &str, window: Range<usize>) -> Option<usize> {
        self.folded.find_where(needle, window, |at| self.at_line_start(at))
    }

    /// Look for `section_id` alone at a line start inside `window`; returns
    /// the offset and the body's title.
    fn find_id_line(&self, section_id: &str, window: Range<usize>) -> Option<(usize, String)> {
        if window.start >= window.end || window.start > self.text.len() {
            return None;
        }
        let re = Regex::new(&format!(
            r"(?m)^[ \t]*{}\.?[ \t]+(\S[^\n]*)",
            regex::escape(section_id)
        ))
        .ok()?;
        let caps = re.captures_at(&self.text, window.start)?;
        let start = caps.get(0)?.start();
        if start >= window.end {
            return None;
        }
        let title = strip_leader(caps.get(1)?.as_str()).trim().to_string();
        Some((start, title))
    }
}

/// Derive printed-page → physical-page offset from the first few headings we can find.
pub fn detect_page_offset(body: &BodyText, nodes: &[SectionNode]) -> Option<i64> {
    nodes
        .iter()
        .filter(|n| n.entry.section_id.is_some())
        .take(10)
        .find_map(|n| {
            let declared = n.entry.page?;
            let at = body.find_heading_at_line_start(&normalize(&n.entry.heading()), 0..body.len())?;
            let physical = body.page_at(at)?;
            Some(i64::from(physical) - i64::from(declared))
        })
}

// How many pages past the next section's declared page a heading may drift.
const DRIFT_PAGES: i64 = 1;

/// Upper byte limits (exclusive) for one node's heading search.
struct Windows {
    /// Up to the first page declared by a later node.
    tight: usize,
    /// Through that page plus the drift allowance, capped at the later node's heading.
    drift: usize,
    /// Through that page, capped at the later node's heading.
    id_only: usize,
}

fn search_windows(body: &BodyText, nodes: &[SectionNode], i: usize, page_offset: i64) -> Windows {
    let len = body.len();
    let own = nodes[i].entry.page;
    let next = nodes[i + 1..]
        .iter()
        .find(|n| n.entry.page.is_some_and(|q| own.map_or(true, |p| q > p)));
    let Some((next, q)) = next.and_then(|n| Some((n, i64::from(n.entry.page?) + page_offset))) else {
        return Windows {
            tight: len,
            drift: len,
            id_only: len,
        };
    };

    let next_start = body.page_start(q).unwrap_or(len);
    let next_end = body.page_end(q);
    let next_at = body.find_heading(&normalize(&next.entry.heading()), next_start..next_end);
    Windows {
        tight: next_start,
        drift: next_at.unwrap_or_else(|| body.page_end(q + DRIFT_PAGES)),
        id_only: next_at.unwrap_or(next_end),
    }
}

#[derive(Debug)]
pub struct Extracted {
    pub sections: Vec<SectionContent>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Carve the body into one span per node.
///
/// A node starts at its heading (searched from its declared page and never
/// before the previous located start) and ends where the next located node of
/// the same or shallower level starts. Parent spans include their children.
///
/// The search never runs past the next declared page by more than
/// `DRIFT_PAGES`, so one missing heading cannot consume the sections after it.
pub fn extract_content(body: &BodyText, nodes: &[SectionNode], page_offset: i64) -> Extracted {
    let mut diagnostics = Vec::new();
    let mut located: Vec<(Option<usize>, MatchKind)> = Vec::with_capacity(nodes.len());
    let mut cursor = 0usize;

    for (i, node) in nodes.iter().enumerate() {
        let entry = &node.entry;
        let from = match entry.page {
            Some(p) => body.page_start(i64::from(p) + page_offset).map(|s| s.max(cursor)),
            None => Some(cursor),
        };

        let found = from.and_then(|from| {
            let limits = search_windows(body, nodes, i, page_offset);
            let needle = normalize(&entry.heading());
            if let Some(at) = body
                .find_heading(&needle, from..limits.tight)
                .or_else(|| body.find_heading_at_line_start(&needle, from..limits.drift))
            {
                return Some((at, MatchKind::Exact));
            }
            let id = entry.section_id.as_deref()?;
            let (at, body_title) = body.find_id_line(id, from..limits.id_only)?;
            debug!("entry #{} {}: matched by number only ({:?})", entry.seq, id, body_title);
            Some((at, MatchKind::IdOnly { body_title }))
        });

        match found {
            Some((at, kind)) => {
                cursor = at + 1;
                located.push((Some(at), kind));
            }
            None => {
                warn!("heading not found: {:?} (page {:?})", entry.heading(), entry.page);
                diagnostics.push(Diagnostic::BoundaryNotFound {
                    seq: entry.seq,
                    section_id: entry.section_id.clone(),
                    title: entry.title.clone(),
                    page: entry.page,
                });
                located.push((None, MatchKind::NotFound));
            }
        }
    }

    let sections = nodes
        .iter()
        .enumerate()
        .zip(located.iter())
        .map(|((i, node), (start, kind))| {
            let span = start.map(|start| {
                let end = nodes[i + 1..]
                    .iter()
                    .zip(&located[i + 1..])
                    .find_map(|(next, (next_start, _))| match next_start {
                        Some(s) if next.level <= node.level => Some(*s),
                        _ => None,
                    })
                    .unwrap_or(body.len());
                start..end
            });
            let content = span
                .as_ref()
                .map(|r| body.text[r.clone()].trim().to_string())
                .unwrap_or_default();
            SectionContent {
                node: node.clone(),
                content,
                span,
                match_kind: kind.clone(),
                tags: Vec::new(),
            }
        })
        .collect();

    Extracted {
        sections,
        diagnostics,
    }
}
