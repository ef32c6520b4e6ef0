//! Run settings: `usbpd.toml` (optional), then `USBPD_*` environment
//! variables. Command-line flags are layered on top in `main`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::parser::ParseOptions;

const CONFIG_FILE: &str = "usbpd";
const ENV_PREFIX: &str = "USBPD";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output_dir: PathBuf,
    /// Used when the document carries no title, and over the one it does.
    pub doc_title: Option<String>,
    pub page_offset: Option<i64>,
    /// Physical page range of the TOC, written `first-last`.
    pub toc_pages: Option<String>,
    pub min_toc_lines: usize,
    pub sqlite_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            output_dir: PathBuf::from("output"),
            doc_title: None,
            page_offset: None,
            toc_pages: None,
            min_toc_lines: ParseOptions::default().min_toc_lines,
            sqlite_path: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::build(Config::builder().add_source(File::with_name(CONFIG_FILE).required(false)))
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        Self::build(Config::builder().add_source(File::from(path)))
            .with_context(|| format!("reading settings from {}", path.display()))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn parse_options(&self) -> Result<ParseOptions> {
        let toc_pages = self.toc_pages.as_deref().map(parse_page_range).transpose()?;
        Ok(ParseOptions {
            toc_pages,
            min_toc_lines: self.min_toc_lines,
            page_offset: self.page_offset,
        })
    }
}

/// `"5-9"` → `(5, 9)`; a single page `"5"` → `(5, 5)`.
pub fn parse_page_range(s: &str) -> Result<(u32, u32)> {
    let (first, last) = match s.split_once('-') {
        Some((a, b)) => (a.trim(), b.trim()),
        None => (s.trim(), s.trim()),
    };
    let first: u32 = first.parse().with_context(|| format!("bad page range {:?}", s))?;
    let last: u32 = last.parse().with_context(|| format!("bad page range {:?}", s))?;
    if first == 0 || last < first {
        bail!("bad page range {:?}", s);
    }
    Ok((first, last))
}
