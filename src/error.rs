use serde::Serialize;
use thiserror::Error;

/// Whole-document failures. Nothing is written when one of these is returned.
#[derive(Debug, Error)]
pub enum FatalInputError {
    #[error("page text stream is empty")]
    EmptyPages,
    #[error("document metadata is missing: {0}")]
    MissingMetadata(String),
    #[error("no table of contents entries found")]
    NoTocEntries,
}

/// Failures while reading the input document itself.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load PDF: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("failed to extract text from page {page}: {reason}")]
    PageText { page: u32, reason: String },
}

/// Per-entry problems that are recovered locally and reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("toc page {toc_page}: skipped unparsable line {line:?}")]
    ScanSkip { toc_page: u32, line: String },

    #[error("entry #{seq} {title:?} has no usable page number")]
    MissingPage {
        seq: usize,
        section_id: Option<String>,
        title: String,
    },

    #[error("entry #{seq} {section_id}: level hint {hint} disagrees with numbering depth {segments}")]
    LevelConflict {
        seq: usize,
        section_id: String,
        hint: u32,
        segments: u32,
    },

    #[error("entry #{seq}: level {claimed} has no open parent, clamped to {repaired}")]
    HierarchyRepair {
        seq: usize,
        section_id: Option<String>,
        claimed: u32,
        repaired: u32,
    },

    #[error("entry #{seq} {title:?}: heading not found in body text")]
    BoundaryNotFound {
        seq: usize,
        section_id: Option<String>,
        title: String,
        page: Option<u32>,
    },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::ScanSkip { .. } => "scan_skip",
            Diagnostic::MissingPage { .. } => "missing_page",
            Diagnostic::LevelConflict { .. } => "level_conflict",
            Diagnostic::HierarchyRepair { .. } => "hierarchy_repair",
            Diagnostic::BoundaryNotFound { .. } => "boundary_not_found",
        }
    }
}
