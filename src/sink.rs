//! File outputs for one run: JSONL records, the CSV report and its summary,
//! plus every recovered diagnostic for manual review.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::Diagnostic;
use crate::records::{DocumentMetadata, SectionRecord, TocRecord};
use crate::validate::{ValidationReport, ValidationRow};

pub const TOC_FILE: &str = "toc.jsonl";
pub const SECTIONS_FILE: &str = "sections.jsonl";
pub const METADATA_FILE: &str = "metadata.jsonl";
pub const REPORT_FILE: &str = "validation_report.csv";
pub const SUMMARY_FILE: &str = "validation_summary.json";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.jsonl";

/// One JSON object per line. Returns the number of rows written.
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(rows.len())
}

// One CSV line; missing ids and reasons are empty cells.
#[derive(Serialize)]
struct CsvRow<'a> {
    section_id: &'a str,
    title: &'a str,
    toc_page: Option<u32>,
    content_found: bool,
    status: &'static str,
    mismatch_reason: &'a str,
}

impl<'a> From<&'a ValidationRow> for CsvRow<'a> {
    fn from(r: &'a ValidationRow) -> Self {
        CsvRow {
            section_id: r.section_id.as_deref().unwrap_or(""),
            title: &r.title,
            toc_page: r.toc_page,
            content_found: r.content_found,
            status: r.status.as_str(),
            mismatch_reason: r.mismatch_reason.as_deref().unwrap_or(""),
        }
    }
}

pub fn write_report_csv(path: &Path, report: &ValidationReport) -> Result<usize> {
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in &report.rows {
        wtr.serialize(CsvRow::from(row))?;
    }
    wtr.flush()?;
    Ok(report.rows.len())
}

pub fn write_summary(path: &Path, report: &ValidationReport) -> Result<()> {
    let json = serde_json::to_string_pretty(&report.summary)?;
    fs::write(path, json + "\n").with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub struct Written {
    pub toc: usize,
    pub sections: usize,
    pub report_rows: usize,
    pub diagnostics: usize,
    pub dir: PathBuf,
}

pub fn write_outputs(
    dir: &Path,
    metadata: &DocumentMetadata,
    toc: &[TocRecord],
    sections: &[SectionRecord],
    report: &ValidationReport,
    diagnostics: &[Diagnostic],
) -> Result<Written> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let toc_n = write_jsonl(&dir.join(TOC_FILE), toc)?;
    let sections_n = write_jsonl(&dir.join(SECTIONS_FILE), sections)?;
    write_jsonl(&dir.join(METADATA_FILE), std::slice::from_ref(metadata))?;
    let report_n = write_report_csv(&dir.join(REPORT_FILE), report)?;
    write_summary(&dir.join(SUMMARY_FILE), report)?;
    let diagnostics_n = write_jsonl(&dir.join(DIAGNOSTICS_FILE), diagnostics)?;

    Ok(Written {
        toc: toc_n,
        sections: sections_n,
        report_rows: report_n,
        diagnostics: diagnostics_n,
        dir: dir.to_path_buf(),
    })
}
