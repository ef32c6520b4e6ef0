//! Post-hoc diff of TOC entries against extracted sections.
//!
//! Pure: reads the scan output, the sections and the body text, and never
//! touches them.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::parser::content::{MatchKind, SectionContent};
use crate::parser::toc::TocEntry;

static BODY_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(\d{1,3}(?:\.\d{1,3}){1,7})[ \t]+([A-Z][^\n]{2,120}?)[ \t]*$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Matched,
    MissingContent,
    TitleMismatch,
    OrphanedContent,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Matched => "matched",
            EntryStatus::MissingContent => "missing-content",
            EntryStatus::TitleMismatch => "title-mismatch",
            EntryStatus::OrphanedContent => "orphaned-content",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRow {
    pub section_id: Option<String>,
    pub title: String,
    pub toc_page: Option<u32>,
    pub content_found: bool,
    pub status: EntryStatus,
    pub mismatch_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub body_len: usize,
    pub covered: usize,
    /// Bytes before the first located top-level heading.
    pub unassigned_prefix: usize,
    pub gaps: usize,
    pub overlaps: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub toc_entries: usize,
    pub parsed_sections: usize,
    pub matched: usize,
    pub missing_content: usize,
    pub title_mismatch: usize,
    pub orphaned_content: usize,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub rows: Vec<ValidationRow>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    pub fn problems(&self) -> impl Iterator<Item = &ValidationRow> {
        self.rows.iter().filter(|r| r.status != EntryStatus::Matched)
    }
}

fn entry_row(entry: &TocEntry, section: Option<&SectionContent>) -> ValidationRow {
    let (status, reason) = match section {
        None => (
            EntryStatus::MissingContent,
            Some("no parsed section for this entry".to_string()),
        ),
        Some(s) => match &s.match_kind {
            MatchKind::NotFound => (
                EntryStatus::MissingContent,
                Some(match entry.page {
                    Some(p) => format!("heading not found on or after page {}", p),
                    None => "heading not found (page unknown)".to_string(),
                }),
            ),
            MatchKind::IdOnly { body_title } => (
                EntryStatus::TitleMismatch,
                Some(format!("body heading reads {:?}", body_title)),
            ),
            MatchKind::Exact if s.content.is_empty() => (
                EntryStatus::MissingContent,
                Some("heading found but span is empty".to_string()),
            ),
            MatchKind::Exact => (EntryStatus::Matched, None),
        },
    };
    ValidationRow {
        section_id: entry.section_id.clone(),
        title: entry.title.clone(),
        toc_page: entry.page,
        content_found: section.is_some_and(|s| !s.content.is_empty()),
        status,
        mismatch_reason: reason,
    }
}

fn coverage(sections: &[SectionContent], body_len: usize) -> Coverage {
    let mut spans: Vec<_> = sections
        .iter()
        .filter(|s| s.node.level == 1)
        .filter_map(|s| s.span.clone())
        .collect();
    spans.sort_by_key(|r| r.start);

    let mut cov = Coverage {
        body_len,
        unassigned_prefix: spans.first().map_or(body_len, |r| r.start),
        ..Coverage::default()
    };
    for (i, span) in spans.iter().enumerate() {
        cov.covered += span.len();
        if let Some(next) = spans.get(i + 1) {
            if next.start > span.end {
                cov.gaps += 1;
            } else if next.start < span.end {
                cov.overlaps += 1;
            }
        }
    }
    cov
}

/// Compare TOC entries (by sequence position) with the extracted sections, and
/// look for numbered body headings the TOC does not know about.
pub fn validate(toc: &[TocEntry], sections: &[SectionContent], body: &str) -> ValidationReport {
    let by_seq: HashMap<usize, &SectionContent> = sections.iter().map(|s| (s.node.seq(), s)).collect();
    let toc_ids: HashSet<&str> = toc.iter().filter_map(|e| e.section_id.as_deref()).collect();

    let mut rows: Vec<ValidationRow> = toc
        .iter()
        .map(|e| entry_row(e, by_seq.get(&e.seq).copied()))
        .collect();

    // parsed-only side of the diff
    let mut seen: HashSet<&str> = HashSet::new();
    for s in sections {
        if let Some(id) = s.node.entry.section_id.as_deref() {
            if !toc_ids.contains(id) && seen.insert(id) {
                rows.push(ValidationRow {
                    section_id: Some(id.to_string()),
                    title: s.node.entry.title.clone(),
                    toc_page: None,
                    content_found: !s.content.is_empty(),
                    status: EntryStatus::OrphanedContent,
                    mismatch_reason: Some("parsed section has no TOC entry".to_string()),
                });
            }
        }
    }

    for caps in BODY_HEADING_RE.captures_iter(body) {
        let (Some(id), Some(title)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let id = id.as_str();
        if toc_ids.contains(id) || !seen.insert(id) {
            continue;
        }
        rows.push(ValidationRow {
            section_id: Some(id.to_string()),
            title: title.as_str().trim().to_string(),
            toc_page: None,
            content_found: true,
            status: EntryStatus::OrphanedContent,
            mismatch_reason: Some("numbered heading in body has no TOC entry".to_string()),
        });
    }

    let count = |status: EntryStatus| rows.iter().filter(|r| r.status == status).count();
    let summary = ValidationSummary {
        toc_entries: toc.len(),
        parsed_sections: sections.len(),
        matched: count(EntryStatus::Matched),
        missing_content: count(EntryStatus::MissingContent),
        title_mismatch: count(EntryStatus::TitleMismatch),
        orphaned_content: count(EntryStatus::OrphanedContent),
        coverage: coverage(sections, body.len()),
    };

    ValidationReport { rows, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{process_document, ParseOptions};
    use crate::source::{Page, PageTextSource, TextSource};

    fn fixture_report() -> ValidationReport {
        let raw = std::fs::read_to_string("tests/fixtures/usb_pd_sample.txt").unwrap();
        let pages = TextSource::from_text(&raw).pages().unwrap();
        let ex = process_document(&pages, &ParseOptions::default()).unwrap();
        validate(&ex.toc, &ex.sections, ex.body.text())
    }

    fn row<'a>(report: &'a ValidationReport, id: &str) -> &'a ValidationRow {
        report
            .rows
            .iter()
            .find(|r| r.section_id.as_deref() == Some(id))
            .unwrap()
    }

    #[test]
    fn fixture_statuses() {
        let report = fixture_report();
        assert_eq!(row(&report, "1.1").status, EntryStatus::Matched);
        assert_eq!(row(&report, "2.2").status, EntryStatus::Matched);

        let bist = row(&report, "6.4.3");
        assert_eq!(bist.status, EntryStatus::MissingContent);
        assert!(!bist.content_found);
        assert_eq!(bist.toc_page, Some(11));

        let orphan = row(&report, "6.3");
        assert_eq!(orphan.status, EntryStatus::OrphanedContent);
        assert_eq!(orphan.title, "Control Messages");
    }

    #[test]
    fn fixture_summary() {
        let s = fixture_report().summary;
        assert_eq!(s.toc_entries, s.parsed_sections);
        assert_eq!(s.missing_content, 1);
        assert_eq!(s.orphaned_content, 1);
        assert_eq!(s.title_mismatch, 0);
        assert_eq!(s.matched, s.toc_entries - 1);
        assert_eq!(s.coverage.gaps, 0);
        assert_eq!(s.coverage.overlaps, 0);
        assert_eq!(s.coverage.unassigned_prefix, 0);
        assert_eq!(s.coverage.covered, s.coverage.body_len);
    }

    #[test]
    fn sections_without_toc_entry_are_orphaned() {
        let report = fixture_report();
        let raw = std::fs::read_to_string("tests/fixtures/usb_pd_sample.txt").unwrap();
        let pages = TextSource::from_text(&raw).pages().unwrap();
        let ex = process_document(&pages, &ParseOptions::default()).unwrap();
        // drop 1.2 from the TOC side only
        let toc: Vec<_> = ex
            .toc
            .iter()
            .filter(|e| e.section_id.as_deref() != Some("1.2"))
            .cloned()
            .collect();
        let diffed = validate(&toc, &ex.sections, ex.body.text());
        assert_eq!(row(&diffed, "1.2").status, EntryStatus::OrphanedContent);
        assert_eq!(diffed.rows.len(), report.rows.len());
    }

    #[test]
    fn status_labels() {
        assert_eq!(EntryStatus::TitleMismatch.as_str(), "title-mismatch");
        assert_eq!(EntryStatus::OrphanedContent.as_str(), "orphaned-content");
    }

    #[test]
    fn renamed_body_heading_is_a_title_mismatch() {
        let pages = [
            Page::new(1, "Table of Contents\n1 Introduction ..... 1\n1.1 Overview of Ports ..... 2\n2 Architecture ..... 3"),
            Page::new(2, "1 Introduction\ntext"),
            Page::new(3, "1.1 Overview of Roles\nroles"),
            Page::new(4, "2 Architecture\nmore"),
        ];
        let ex = process_document(&pages, &ParseOptions::default()).unwrap();
        let report = validate(&ex.toc, &ex.sections, ex.body.text());
        let r = row(&report, "1.1");
        assert_eq!(r.status, EntryStatus::TitleMismatch);
        assert!(r.content_found);
        assert_eq!(r.mismatch_reason.as_deref(), Some("body heading reads \"Overview of Roles\""));
        assert_eq!(report.problems().count(), 1);
    }
}
