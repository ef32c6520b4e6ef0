//! Serialized output shapes. Field order here is the field order on disk.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::FatalInputError;
use crate::parser::content::SectionContent;
use crate::source::RawMetadata;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub doc_title: String,
    pub author: Option<String>,
    pub total_pages: u32,
    pub extracted_at: String,
}

impl DocumentMetadata {
    /// Combine what the document reports with user overrides. A run needs at
    /// least some metadata and a title from one side or the other.
    pub fn resolve(
        raw: Option<RawMetadata>,
        title_override: Option<&str>,
        page_count: usize,
        now: DateTime<Utc>,
    ) -> Result<Self, FatalInputError> {
        let raw = raw.ok_or_else(|| FatalInputError::MissingMetadata("source reported none".into()))?;
        let doc_title = title_override
            .map(str::to_string)
            .or(raw.title)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| FatalInputError::MissingMetadata("document title".into()))?;
        Ok(DocumentMetadata {
            doc_title,
            author: raw.author,
            total_pages: raw.total_pages.unwrap_or(page_count as u32),
            extracted_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocRecord {
    pub section_id: Option<String>,
    pub title: String,
    pub page: Option<u32>,
    pub level: u32,
    pub parent_id: Option<String>,
    pub full_path: String,
    pub tags: Vec<String>,
}

impl From<&SectionContent> for TocRecord {
    fn from(s: &SectionContent) -> Self {
        TocRecord {
            section_id: s.node.entry.section_id.clone(),
            title: s.node.entry.title.clone(),
            page: s.node.entry.page,
            level: s.node.level,
            parent_id: s.node.parent_id.clone(),
            full_path: s.node.full_path.clone(),
            tags: s.tags.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionRecord {
    pub doc_title: String,
    pub section_id: Option<String>,
    pub title: String,
    pub page: Option<u32>,
    pub level: u32,
    pub parent_id: Option<String>,
    pub full_path: String,
    pub tags: Vec<String>,
    pub content: String,
}

impl SectionRecord {
    pub fn new(doc_title: &str, s: &SectionContent) -> Self {
        let toc = TocRecord::from(s);
        SectionRecord {
            doc_title: doc_title.to_string(),
            section_id: toc.section_id,
            title: toc.title,
            page: toc.page,
            level: toc.level,
            parent_id: toc.parent_id,
            full_path: toc.full_path,
            tags: toc.tags,
            content: s.content.clone(),
        }
    }
}

pub fn toc_records(sections: &[SectionContent]) -> Vec<TocRecord> {
    sections.iter().map(TocRecord::from).collect()
}

pub fn section_records(doc_title: &str, sections: &[SectionContent]) -> Vec<SectionRecord> {
    sections.iter().map(|s| SectionRecord::new(doc_title, s)).collect()
}
