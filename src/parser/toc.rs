use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use super::normalize::{normalize, strip_leader};
use crate::error::Diagnostic;
use crate::source::Page;

// Trailing page reference: dot leaders (or plain spacing) then an arabic or lowercase roman number.
const PAGE_TAIL: &str = r"(?:\s*[.·…_\x{2024}]{2,}\s*|\s+)(?P<page>\d{1,4}|[ivxlcdm]{1,7})\s*$";

static SECTIONISH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,3}(?:\.\d{1,3})*\.?\s").unwrap());
static CONTINUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^(?P<title>[^\d\s].*?){PAGE_TAIL}")).unwrap());

const FRONT_MATTER: &str = "Preface|Foreword|Revision History|Acknowledge?ments|Abstract|Glossary|Bibliography|\
References|Index|Appendix|Appendices|Annex|Introduction|Scope|Notices?|Disclaimer|Copyright|Editors|Contributors";

/// Candidate TOC row, in scan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub seq: usize,
    pub section_id: Option<String>,
    pub title: String,
    /// Declared page; `None` means unknown.
    pub page: Option<u32>,
    pub raw_level_hint: u32,
    /// Physical page the TOC line was read from.
    pub toc_page: u32,
}

impl TocEntry {
    /// Heading text as it should appear in the body ("2.1 Overview").
    pub fn heading(&self) -> String {
        match &self.section_id {
            Some(id) => format!("{} {}", id, self.title),
            None => self.title.clone(),
        }
    }
}

#[derive(Debug)]
pub struct TocScan {
    pub entries: Vec<TocEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    section_id: Option<String>,
    title: String,
    page: Option<u32>,
    rule: &'static str,
}

struct Rule {
    name: &'static str,
    re: Regex,
    build: fn(&Captures) -> Option<(Option<String>, String, Option<u32>)>,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule {
            name: "numbered",
            re: Regex::new(&format!(r"^(?P<id>\d{{1,3}}(?:\.\d{{1,3}}){{0,7}})\.?\s+(?P<title>\S.*?){PAGE_TAIL}")).unwrap(),
            build: id_title_page,
        },
        Rule {
            name: "lettered",
            re: Regex::new(&format!(r"^(?P<id>[A-Z](?:\.\d{{1,3}}){{1,7}})\.?\s+(?P<title>\S.*?){PAGE_TAIL}")).unwrap(),
            build: id_title_page,
        },
        Rule {
            name: "appendix",
            re: Regex::new(&format!(
                r"^(?P<id>(?:Appendix|Annex)\s+[A-Z])\b\s*[:.\-–—]?\s*(?P<title>.*?)(?:{})?\s*$",
                PAGE_TAIL.trim_end_matches(r"\s*$")
            ))
            .unwrap(),
            build: appendix,
        },
        Rule {
            name: "numbered_no_page",
            re: Regex::new(r"^(?P<id>\d{1,3}(?:\.\d{1,3}){0,7})\.?\s+(?P<title>[A-Za-z].*?)[\s.·…_]*$").unwrap(),
            build: id_title_page,
        },
        Rule {
            name: "front_matter",
            re: Regex::new(&format!(
                r"^(?P<title>(?:{FRONT_MATTER})\b[^0-9]*?)(?:{})?\s*$",
                PAGE_TAIL.trim_end_matches(r"\s*$")
            ))
            .unwrap(),
            build: id_title_page,
        },
    ]
});

fn parse_page(caps: &Captures) -> Option<u32> {
    // roman numerals are front-matter pages and never map onto body pages
    caps.name("page")?.as_str().parse().ok()
}

fn clean_title(raw: &str) -> Option<String> {
    let title = strip_leader(raw.trim()).trim();
    if title.chars().any(char::is_alphabetic) {
        Some(title.split_whitespace().collect::<Vec<_>>().join(" "))
    } else {
        None
    }
}

fn id_title_page(caps: &Captures) -> Option<(Option<String>, String, Option<u32>)> {
    let title = clean_title(caps.name("title")?.as_str())?;
    let id = caps.name("id").map(|m| m.as_str().trim_end_matches('.').to_string());
    Some((id, title, parse_page(caps)))
}

fn appendix(caps: &Captures) -> Option<(Option<String>, String, Option<u32>)> {
    let id = caps["id"].split_whitespace().collect::<Vec<_>>().join(" ");
    let title = caps
        .name("title")
        .and_then(|m| clean_title(m.as_str()))
        .unwrap_or_else(|| id.clone());
    Some((Some(id), title, parse_page(caps)))
}

/// Try every rule in order; the first one that matches and builds wins.
fn match_line(line: &str) -> Option<Candidate> {
    RULES.iter().find_map(|rule| {
        let caps = rule.re.captures(line)?;
        let (section_id, title, page) = (rule.build)(&caps)?;
        Some(Candidate {
            section_id,
            title,
            page,
            rule: rule.name,
        })
    })
}

/// Depth implied by an id's numbering: "2.1.3" → 3, "A.2" → 2, "Appendix B" → 1.
pub fn segment_depth(section_id: &str) -> Option<u32> {
    let core = section_id
        .strip_prefix("Appendix ")
        .or_else(|| section_id.strip_prefix("Annex "))
        .unwrap_or(section_id);
    let segments: Vec<&str> = core.split('.').collect();
    if segments
        .iter()
        .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        Some(segments.len() as u32)
    } else {
        None
    }
}

fn is_region_heading(line: &str) -> bool {
    matches!(normalize(line).as_str(), "table of contents" | "contents")
}

// Only the bare heading counts; a TOC entry "List of Tables ..... 30" does not end the region.
fn is_region_terminator(line: &str) -> bool {
    matches!(normalize(line).as_str(), "list of figures" | "list of tables")
}

/// TOC-shaped lines on a page before any terminator, and whether one was seen.
fn region_stats<'a>(lines: impl Iterator<Item = &'a str>) -> (usize, bool) {
    let mut shaped = 0;
    for line in lines {
        if is_region_terminator(line) {
            return (shaped, true);
        }
        if match_line(line.trim()).is_some_and(|c| c.page.is_some()) {
            shaped += 1;
        }
    }
    (shaped, false)
}

/// Locate the TOC pages: from the page carrying a "Table of Contents" heading,
/// forward while pages keep at least `min_lines` TOC-shaped lines.
/// Returns indices into `pages`.
pub fn find_toc_region(pages: &[Page], min_lines: usize) -> Option<Range<usize>> {
    let start = pages
        .iter()
        .position(|p| p.text.lines().any(is_region_heading))?;

    let mut end = start + 1;
    let (_, terminated_on_start) =
        region_stats(pages[start].text.lines().skip_while(|l| !is_region_heading(l)));
    if !terminated_on_start {
        while end < pages.len() {
            let (shaped, terminated) = region_stats(pages[end].text.lines());
            if terminated {
                if shaped > 0 {
                    end += 1;
                }
                break;
            }
            if shaped < min_lines.max(1) {
                break;
            }
            end += 1;
        }
    }
    debug!("TOC region: pages {}..={}", pages[start].number, pages[end - 1].number);
    Some(start..end)
}

/// Scan TOC pages line by line and emit entries in document order. Lines
/// above a "Table of Contents" heading on the first page are ignored.
pub fn scan_entries(pages: &[Page]) -> TocScan {
    let mut entries: Vec<TocEntry> = Vec::new();
    let mut diagnostics = Vec::new();
    let mut in_region = false;

    'pages: for (i, page) in pages.iter().enumerate() {
        // Index of an entry on the previous line still waiting for its page number.
        let mut awaiting_page: Option<usize> = None;
        // cover text above the heading on the first page is not part of the TOC
        let lead_in = i == 0 && page.text.lines().any(is_region_heading);

        for raw in page.text.lines().skip_while(|l| lead_in && !is_region_heading(l)) {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if is_region_heading(line) {
                in_region = true;
                awaiting_page = None;
                continue;
            }
            if in_region && is_region_terminator(line) {
                break 'pages;
            }

            let pending = awaiting_page.take();
            match match_line(line) {
                Some(c) => {
                    let open = c.page.is_none() && c.rule == "numbered_no_page";
                    let seq = entries.len();
                    entries.push(TocEntry {
                        seq,
                        raw_level_hint: c.section_id.as_deref().and_then(segment_depth).unwrap_or(1),
                        section_id: c.section_id,
                        title: c.title,
                        page: c.page,
                        toc_page: page.number,
                    });
                    if open {
                        awaiting_page = Some(seq);
                    }
                }
                None => {
                    if let Some(idx) = pending {
                        if let Some(caps) = CONTINUATION_RE.captures(line) {
                            if let Some(rest) = clean_title(&caps["title"]) {
                                let entry = &mut entries[idx];
                                entry.title = format!("{} {}", entry.title, rest);
                                entry.page = parse_page(&caps);
                                continue;
                            }
                        }
                    }
                    if SECTIONISH_RE.is_match(line) {
                        debug!("toc page {}: skipping {:?}", page.number, line);
                        diagnostics.push(Diagnostic::ScanSkip {
                            toc_page: page.number,
                            line: line.to_string(),
                        });
                    }
                }
            }
        }
    }

    for entry in entries.iter().filter(|e| e.page.is_none()) {
        debug!("entry #{} {:?} has no page", entry.seq, entry.title);
        diagnostics.push(Diagnostic::MissingPage {
            seq: entry.seq,
            section_id: entry.section_id.clone(),
            title: entry.title.clone(),
        });
    }

    TocScan {
        entries,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, text: &str) -> Page {
        Page::new(n, text)
    }

    fn scan(text: &str) -> TocScan {
        scan_entries(&[page(1, text)])
    }

    #[test]
    fn text_above_contents_heading_is_ignored() {
        let s = scan(
            "Disclaimer: provided as is, without warranty\nTable of Contents\n1 Introduction ..... 1\n1.1 Overview ..... 2",
        );
        let ids: Vec<_> = s.entries.iter().map(|e| e.section_id.as_deref()).collect();
        assert_eq!(ids, vec![Some("1"), Some("1.1")]);
        assert_eq!(s.entries[0].seq, 0);
    }

    #[test]
    fn numbered_lines() {
        let s = scan("1 Introduction ... 1\n1.1 Overview ... 2\n2 Architecture ... 10");
        let got: Vec<_> = s
            .entries
            .iter()
            .map(|e| (e.section_id.as_deref().unwrap(), e.title.as_str(), e.page, e.raw_level_hint))
            .collect();
        assert_eq!(
            got,
            vec![
                ("1", "Introduction", Some(1), 1),
                ("1.1", "Overview", Some(2), 2),
                ("2", "Architecture", Some(10), 1),
            ]
        );
        assert!(s.diagnostics.is_empty());
    }

    #[test]
    fn dot_leaders_are_stripped() {
        let s = scan("6.4.1.2 Source Capabilities Message ........................ 123");
        assert_eq!(s.entries[0].title, "Source Capabilities Message");
        assert_eq!(s.entries[0].page, Some(123));
        assert_eq!(s.entries[0].raw_level_hint, 4);
    }

    #[test]
    fn title_with_embedded_numbers() {
        let s = scan("4.2 USB 2.0 Support 45");
        assert_eq!(s.entries[0].title, "USB 2.0 Support");
        assert_eq!(s.entries[0].page, Some(45));
    }

    #[test]
    fn appendix_without_page_is_retained() {
        let s = scan("1 Introduction ... 1\nAppendix Title\n2 Architecture ... 10");
        assert_eq!(s.entries.len(), 3);
        assert_eq!(s.entries[1].title, "Appendix Title");
        assert_eq!(s.entries[1].section_id, None);
        assert_eq!(s.entries[1].page, None);
        assert_eq!(s.entries[1].raw_level_hint, 1);
        assert_eq!(s.entries[2].section_id.as_deref(), Some("2"));
        assert!(s
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::MissingPage { seq: 1, .. })));
    }

    #[test]
    fn lettered_appendix_entries() {
        let s = scan("Appendix A CRC Calculations ..... 901\nA.1 CRC Example ..... 902");
        assert_eq!(s.entries[0].section_id.as_deref(), Some("Appendix A"));
        assert_eq!(s.entries[0].title, "CRC Calculations");
        assert_eq!(s.entries[0].page, Some(901));
        assert_eq!(s.entries[0].raw_level_hint, 1);
        assert_eq!(s.entries[1].section_id.as_deref(), Some("A.1"));
        assert_eq!(s.entries[1].raw_level_hint, 2);
    }

    #[test]
    fn front_matter_with_roman_page() {
        let s = scan("Revision History ..... iii\nPreface 1");
        assert_eq!(s.entries[0].title, "Revision History");
        assert_eq!(s.entries[0].page, None);
        assert_eq!(s.entries[1].title, "Preface");
        assert_eq!(s.entries[1].page, Some(1));
    }

    #[test]
    fn duplicate_ids_are_kept() {
        let s = scan("3.1 Cable ..... 20\n3.1 Cable Assembly ..... 21");
        assert_eq!(s.entries.len(), 2);
        assert_eq!(s.entries[0].seq, 0);
        assert_eq!(s.entries[1].seq, 1);
    }

    #[test]
    fn wrapped_title_is_merged() {
        let s = scan("6.4.1 Capabilities Message Format for Sources that\nsupport Extended Power ......... 140\n6.4.2 Request ..... 150");
        assert_eq!(s.entries.len(), 2);
        assert_eq!(
            s.entries[0].title,
            "Capabilities Message Format for Sources that support Extended Power"
        );
        assert_eq!(s.entries[0].page, Some(140));
    }

    #[test]
    fn unparsable_section_line_is_skipped() {
        let s = scan("1 Introduction ... 1\n2.3 4 5\n2 Architecture ... 10");
        assert_eq!(s.entries.len(), 2);
        assert!(matches!(&s.diagnostics[0], Diagnostic::ScanSkip { line, .. } if line == "2.3 4 5"));
    }

    #[test]
    fn noise_lines_are_ignored() {
        let s = scan("Universal Serial Bus Power Delivery Specification\nPage 4\n1 Introduction 1");
        assert_eq!(s.entries.len(), 1);
        assert!(s.diagnostics.is_empty());
    }

    #[test]
    fn segment_depths() {
        assert_eq!(segment_depth("2.1.3"), Some(3));
        assert_eq!(segment_depth("A.2"), Some(2));
        assert_eq!(segment_depth("Appendix B"), Some(1));
        assert_eq!(segment_depth("2..1"), None);
    }

    #[test]
    fn region_runs_until_list_of_figures() {
        let pages = vec![
            page(1, "Universal Serial Bus\nPower Delivery Specification"),
            page(2, "Table of Contents\n1 Introduction ..... 1\n1.1 Scope ..... 1"),
            page(3, "2 Overview ..... 3\n2.1 Roles ..... 4\n2.2 Ports ..... 5"),
            page(4, "3 Cables ..... 9\nList of Figures\nFigure 2-1 Logical Model ..... 4"),
            page(5, "1 Introduction\nbody text"),
        ];
        assert_eq!(find_toc_region(&pages, 2), Some(1..4));
        let s = scan_entries(&pages[1..4]);
        let ids: Vec<_> = s.entries.iter().filter_map(|e| e.section_id.as_deref()).collect();
        assert_eq!(ids, vec!["1", "1.1", "2", "2.1", "2.2", "3"]);
    }

    #[test]
    fn no_region_without_heading() {
        let pages = vec![page(1, "1 Introduction ..... 1"), page(2, "body")];
        assert_eq!(find_toc_region(&pages, 2), None);
    }

    #[test]
    fn sample_fixture_toc() {
        let src = crate::source::TextSource::from_text(
            &std::fs::read_to_string("tests/fixtures/usb_pd_sample.txt").unwrap(),
        );
        let pages = crate::source::PageTextSource::pages(&src).unwrap();
        let region = find_toc_region(&pages, 3).unwrap();
        let s = scan_entries(&pages[region]);
        assert!(s.entries.len() >= 10);
        assert!(s.entries.iter().any(|e| e.section_id.as_deref() == Some("6.4.1")));
    }
}
