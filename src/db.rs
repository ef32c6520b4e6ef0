use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::records::{DocumentMetadata, SectionRecord, TocRecord};
use crate::validate::ValidationReport;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id           INTEGER PRIMARY KEY,
            doc_title    TEXT NOT NULL,
            author       TEXT,
            total_pages  INTEGER NOT NULL,
            extracted_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS toc_entries (
            id          INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL REFERENCES documents(id),
            seq         INTEGER NOT NULL,
            section_id  TEXT,
            title       TEXT NOT NULL,
            page        INTEGER,
            level       INTEGER NOT NULL,
            parent_id   TEXT,
            full_path   TEXT NOT NULL,
            tags        TEXT NOT NULL,
            UNIQUE(document_id, seq)
        );
        CREATE INDEX IF NOT EXISTS idx_toc_section ON toc_entries(section_id);

        CREATE TABLE IF NOT EXISTS sections (
            id          INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL REFERENCES documents(id),
            seq         INTEGER NOT NULL,
            section_id  TEXT,
            title       TEXT NOT NULL,
            level       INTEGER NOT NULL,
            content     TEXT NOT NULL,
            UNIQUE(document_id, seq)
        );

        CREATE TABLE IF NOT EXISTS validation (
            id              INTEGER PRIMARY KEY,
            document_id     INTEGER NOT NULL REFERENCES documents(id),
            section_id      TEXT,
            title           TEXT NOT NULL,
            toc_page        INTEGER,
            content_found   BOOLEAN NOT NULL,
            status          TEXT NOT NULL CHECK(status IN
                ('matched','missing-content','title-mismatch','orphaned-content')),
            mismatch_reason TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_validation_status ON validation(status);
        ",
    )?;
    Ok(())
}

/// Store one run. Everything lands in a single transaction; returns the new document id.
pub fn save_run(
    conn: &Connection,
    metadata: &DocumentMetadata,
    toc: &[TocRecord],
    sections: &[SectionRecord],
    report: &ValidationReport,
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO documents (doc_title, author, total_pages, extracted_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            metadata.doc_title,
            metadata.author,
            metadata.total_pages,
            metadata.extracted_at
        ],
    )?;
    let doc_id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO toc_entries
             (document_id, seq, section_id, title, page, level, parent_id, full_path, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for (seq, r) in toc.iter().enumerate() {
            stmt.execute(params![
                doc_id,
                seq as i64,
                r.section_id,
                r.title,
                r.page,
                r.level,
                r.parent_id,
                r.full_path,
                r.tags.join(","),
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO sections (document_id, seq, section_id, title, level, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (seq, r) in sections.iter().enumerate() {
            stmt.execute(params![doc_id, seq as i64, r.section_id, r.title, r.level, r.content])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO validation
             (document_id, section_id, title, toc_page, content_found, status, mismatch_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for r in &report.rows {
            stmt.execute(params![
                doc_id,
                r.section_id,
                r.title,
                r.toc_page,
                r.content_found,
                r.status.as_str(),
                r.mismatch_reason,
            ])?;
        }
    }
    tx.commit()?;
    Ok(doc_id)
}

// ── Stats ──

pub struct Stats {
    pub documents: usize,
    pub toc_entries: usize,
    pub sections: usize,
    pub empty_sections: usize,
    pub matched: usize,
    pub problems: usize,
    pub latest: Option<(String, String)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let latest = conn
        .query_row(
            "SELECT doc_title, extracted_at FROM documents ORDER BY id DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e),
        })?;
    let matched = count("SELECT COUNT(*) FROM validation WHERE status = 'matched'")?;
    Ok(Stats {
        documents: count("SELECT COUNT(*) FROM documents")?,
        toc_entries: count("SELECT COUNT(*) FROM toc_entries")?,
        sections: count("SELECT COUNT(*) FROM sections")?,
        empty_sections: count("SELECT COUNT(*) FROM sections WHERE content = ''")?,
        matched,
        problems: count("SELECT COUNT(*) FROM validation")? - matched,
        latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{process_document, tags, ParseOptions};
    use crate::records::{section_records, toc_records};
    use crate::source::{PageTextSource, TextSource};
    use crate::validate::validate;

    fn save_fixture(conn: &Connection) -> i64 {
        let raw = std::fs::read_to_string("tests/fixtures/usb_pd_sample.txt").unwrap();
        let pages = TextSource::from_text(&raw).pages().unwrap();
        let mut ex = process_document(&pages, &ParseOptions::default()).unwrap();
        tags::apply(&mut ex.sections);
        let report = validate(&ex.toc, &ex.sections, ex.body.text());
        let meta = DocumentMetadata {
            doc_title: "USB PD".into(),
            author: Some("USB-IF".into()),
            total_pages: pages.len() as u32,
            extracted_at: "2024-10-01T12:00:00Z".into(),
        };
        save_run(
            conn,
            &meta,
            &toc_records(&ex.sections),
            &section_records(&meta.doc_title, &ex.sections),
            &report,
        )
        .unwrap()
    }

    #[test]
    fn empty_database_stats() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.documents, 0);
        assert_eq!(s.problems, 0);
        assert!(s.latest.is_none());
    }

    #[test]
    fn saved_run_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&dir.path().join("db/usbpd.sqlite")).unwrap();
        init_schema(&conn).unwrap();
        let id = save_fixture(&conn);
        assert_eq!(id, 1);

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.documents, 1);
        assert_eq!(s.toc_entries, s.sections);
        // 6.4.3 has no body heading, 6.3 has no TOC entry
        assert_eq!(s.empty_sections, 1);
        assert_eq!(s.problems, 2);
        assert_eq!(s.latest, Some(("USB PD".to_string(), "2024-10-01T12:00:00Z".to_string())));

        let tags: String = conn
            .query_row(
                "SELECT tags FROM toc_entries WHERE section_id = 'A.1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tags, "appendix");
    }

    #[test]
    fn second_run_appends() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        save_fixture(&conn);
        save_fixture(&conn);
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.documents, 2);
        assert_eq!(s.matched % 2, 0);
    }
}
