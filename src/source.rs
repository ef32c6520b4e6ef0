//! Page text providers.
//!
//! Everything downstream only sees `Vec<Page>` and `RawMetadata`; where the
//! text came from (a PDF, a `pdftotext` dump) is decided here.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use lopdf::Document;
use tracing::{debug, info, warn};

use crate::error::SourceError;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based physical page number.
    pub number: u32,
    pub text: String,
}

impl Page {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Page {
            number,
            text: text.into(),
        }
    }
}

/// Metadata as reported by the document itself, before any overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub total_pages: Option<u32>,
}

pub trait PageTextSource {
    fn pages(&self) -> Result<Vec<Page>, SourceError>;
    /// `None` when the source carries no metadata at all.
    fn metadata(&self) -> Result<Option<RawMetadata>, SourceError>;
}

/// Pick a source by file extension: `.pdf` goes through lopdf, anything else
/// is read as form-feed separated text.
pub fn open(path: &Path) -> Result<Box<dyn PageTextSource>, SourceError> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        Ok(Box::new(PdfSource::load(path)?))
    } else {
        Ok(Box::new(TextSource::read(path)?))
    }
}

// ── PDF ──

pub struct PdfSource {
    path: PathBuf,
    doc: Document,
}

impl PdfSource {
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        info!("Loading PDF: {}", path.display());
        let doc = Document::load(path)?;
        Ok(PdfSource {
            path: path.to_path_buf(),
            doc,
        })
    }

    fn page_text(&self, number: u32) -> Result<Page, SourceError> {
        let text = self
            .doc
            .extract_text(&[number])
            .map_err(|e| SourceError::PageText {
                page: number,
                reason: e.to_string(),
            })?;
        Ok(Page::new(number, text))
    }
}

impl PageTextSource for PdfSource {
    fn pages(&self) -> Result<Vec<Page>, SourceError> {
        let numbers: Vec<u32> = self.doc.get_pages().keys().copied().collect();
        info!("Extracting text from {} pages of {}", numbers.len(), self.path.display());

        let pb = ProgressBar::new(numbers.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages ({per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        #[cfg(feature = "rayon")]
        let iter = numbers.par_iter();
        #[cfg(not(feature = "rayon"))]
        let iter = numbers.iter();

        // One bad page should not sink the document; it becomes an empty page.
        let pages: Vec<Page> = iter
            .map(|&n| {
                let page = self.page_text(n).unwrap_or_else(|e| {
                    warn!("{}", e);
                    Page::new(n, String::new())
                });
                pb.inc(1);
                page
            })
            .collect();

        pb.finish_and_clear();
        Ok(pages)
    }

    fn metadata(&self) -> Result<Option<RawMetadata>, SourceError> {
        let mut meta = RawMetadata {
            total_pages: Some(self.doc.get_pages().len() as u32),
            ..RawMetadata::default()
        };

        let info = self
            .doc
            .trailer
            .get(b"Info")
            .and_then(|o| o.as_reference())
            .and_then(|id| self.doc.get_object(id))
            .and_then(|o| o.as_dict());

        match info {
            Ok(dict) => {
                meta.title = dict
                    .get(b"Title")
                    .and_then(|o| o.as_str())
                    .ok()
                    .and_then(decode_pdf_string);
                meta.author = dict
                    .get(b"Author")
                    .and_then(|o| o.as_str())
                    .ok()
                    .and_then(decode_pdf_string);
            }
            Err(e) => debug!("No Info dictionary: {}", e),
        }
        Ok(Some(meta))
    }
}

/// Decode a PDF text string: UTF-16BE when it carries a BOM, otherwise bytes
/// are taken as (close enough to) Latin-1 / UTF-8.
fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    let text = if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        }
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ── Plain text ──

/// Pre-extracted text with pages separated by form feeds (`pdftotext` output).
pub struct TextSource {
    pages: Vec<Page>,
}

impl TextSource {
    pub fn read(path: &Path) -> Result<Self, SourceError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_text(&raw))
    }

    pub fn from_text(raw: &str) -> Self {
        let normalized = raw.replace("\r\n", "\n");
        let mut pages: Vec<Page> = normalized
            .split('\u{000C}')
            .enumerate()
            .map(|(i, text)| Page::new(i as u32 + 1, text))
            .collect();
        // pdftotext ends the last page with a form feed too
        if pages.len() > 1 && pages.last().is_some_and(|p| p.text.trim().is_empty()) {
            pages.pop();
        }
        TextSource { pages }
    }
}

impl PageTextSource for TextSource {
    fn pages(&self) -> Result<Vec<Page>, SourceError> {
        Ok(self.pages.clone())
    }

    fn metadata(&self) -> Result<Option<RawMetadata>, SourceError> {
        Ok(Some(RawMetadata {
            title: None,
            author: None,
            total_pages: Some(self.pages.len() as u32),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn write_pdf(path: &Path, pages: &[&str], info: Option<(&str, &str)>) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let mut ops = Vec::new();
            for (i, line) in text.lines().enumerate() {
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new("Tf", vec!["F1".into(), 11.into()]));
                ops.push(Operation::new("Td", vec![50.into(), (780 - 14 * i as i64).into()]));
                ops.push(Operation::new("Tj", vec![Object::string_literal(line)]));
                ops.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations: ops };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages.len() as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if let Some((title, author)) = info {
            let info_id = doc.add_object(dictionary! {
                "Title" => Object::string_literal(title),
                "Author" => Object::string_literal(author),
            });
            doc.trailer.set("Info", info_id);
        }
        doc.save(path).unwrap();
    }

    #[test]
    fn pdf_pages_in_order_with_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pd.pdf");
        write_pdf(
            &path,
            &[
                "Table of Contents\n1 Introduction ..... 1",
                "1 Introduction\nintro text",
                "2 Architecture\narch text",
            ],
            Some(("USB Power Delivery", "USB-IF")),
        );

        let src = open(&path).unwrap();
        let pages = src.pages().unwrap();
        assert_eq!(pages.iter().map(|p| p.number).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(pages[0].text.contains("Table of Contents"));
        assert!(pages[1].text.contains("1 Introduction"));
        assert!(pages[1].text.contains("intro text"));
        assert!(pages[2].text.contains("2 Architecture"));
        assert!(!pages[2].text.contains("intro text"));

        let meta = src.metadata().unwrap().unwrap();
        assert_eq!(meta.title.as_deref(), Some("USB Power Delivery"));
        assert_eq!(meta.author.as_deref(), Some("USB-IF"));
        assert_eq!(meta.total_pages, Some(3));
    }

    #[test]
    fn pdf_without_info_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.PDF");
        write_pdf(&path, &["only page"], None);

        let src = open(&path).unwrap();
        let meta = src.metadata().unwrap().unwrap();
        assert_eq!(meta.title, None);
        assert_eq!(meta.author, None);
        assert_eq!(meta.total_pages, Some(1));
    }

    #[test]
    fn corrupt_pdf_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.5\nthis is not a pdf").unwrap();
        assert!(matches!(open(&path), Err(SourceError::Pdf(_))));
    }

    #[test]
    fn form_feeds_split_pages() {
        let src = TextSource::from_text("cover\u{000C}contents\r\nline\u{000C}body\u{000C}");
        let pages = src.pages().unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1], Page::new(2, "contents\nline"));
        assert_eq!(src.metadata().unwrap().unwrap().total_pages, Some(3));
    }

    #[test]
    fn decodes_utf16_titles() {
        let bytes = [0xFE, 0xFF, 0x00, 0x55, 0x00, 0x53, 0x00, 0x42];
        assert_eq!(decode_pdf_string(&bytes).as_deref(), Some("USB"));
        assert_eq!(decode_pdf_string(b"  Power Delivery ").as_deref(), Some("Power Delivery"));
        assert_eq!(decode_pdf_string(b"   "), None);
    }

    #[test]
    fn open_reads_text_fixture() {
        let src = open(Path::new("tests/fixtures/usb_pd_sample.txt")).unwrap();
        let pages = src.pages().unwrap();
        assert!(pages.len() > 5);
        assert_eq!(pages[0].number, 1);
    }

    #[test]
    fn open_missing_file_is_an_error() {
        assert!(open(Path::new("tests/fixtures/does_not_exist.txt")).is_err());
    }
}
