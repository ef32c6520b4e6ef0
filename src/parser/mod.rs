pub mod content;
pub mod hierarchy;
pub mod normalize;
pub mod tags;
pub mod toc;

use tracing::{info, warn};

use crate::error::{Diagnostic, FatalInputError};
use crate::source::Page;
use content::{BodyText, SectionContent};
use toc::TocEntry;

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Inclusive physical page range of the TOC; detected when `None`.
    pub toc_pages: Option<(u32, u32)>,
    /// Minimum TOC-shaped lines for a page to continue the TOC region.
    pub min_toc_lines: usize,
    /// Printed-page → physical-page offset; detected when `None`.
    pub page_offset: Option<i64>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            toc_pages: None,
            min_toc_lines: 3,
            page_offset: None,
        }
    }
}

#[derive(Debug)]
pub struct Extraction {
    pub toc: Vec<TocEntry>,
    pub sections: Vec<SectionContent>,
    pub body: BodyText,
    pub page_offset: i64,
    pub diagnostics: Vec<Diagnostic>,
}

/// Three-pass pipeline: TOC lines → entries → hierarchy → content spans.
pub fn process_document(pages: &[Page], opts: &ParseOptions) -> Result<Extraction, FatalInputError> {
    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(FatalInputError::EmptyPages);
    }

    let region = match opts.toc_pages {
        Some((first, last)) => {
            let start = pages.iter().position(|p| p.number >= first);
            let end = pages.iter().rposition(|p| p.number <= last).map(|i| i + 1);
            match (start, end) {
                (Some(s), Some(e)) if s < e => s..e,
                _ => return Err(FatalInputError::NoTocEntries),
            }
        }
        None => toc::find_toc_region(pages, opts.min_toc_lines).ok_or(FatalInputError::NoTocEntries)?,
    };
    info!(
        "TOC on pages {}..={}",
        pages[region.start].number,
        pages[region.end - 1].number
    );

    let scan = toc::scan_entries(&pages[region.clone()]);
    if scan.entries.is_empty() {
        return Err(FatalInputError::NoTocEntries);
    }
    info!("Found {} TOC entries", scan.entries.len());

    let toc = scan.entries.clone();
    let hierarchy = hierarchy::build_hierarchy(scan.entries);

    let body = BodyText::from_pages(&pages[region.end..]);
    if body.is_empty() {
        warn!("no body text after the TOC region");
    }
    let page_offset = opts
        .page_offset
        .or_else(|| content::detect_page_offset(&body, &hierarchy.nodes))
        .unwrap_or(0);
    info!("Page offset: {}", page_offset);

    let extracted = content::extract_content(&body, &hierarchy.nodes, page_offset);
    info!(
        "Located {}/{} section headings",
        extracted.sections.iter().filter(|s| s.span.is_some()).count(),
        extracted.sections.len()
    );

    let mut diagnostics = scan.diagnostics;
    diagnostics.extend(hierarchy.diagnostics);
    diagnostics.extend(extracted.diagnostics);

    Ok(Extraction {
        toc,
        sections: extracted.sections,
        body,
        page_offset,
        diagnostics,
    })
}

// ── Tests ──
