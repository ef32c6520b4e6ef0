mod db;
mod error;
mod parser;
mod records;
mod settings;
mod sink;
mod source;
mod validate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use parser::Extraction;
use records::DocumentMetadata;
use settings::Settings;

#[derive(Parser)]
#[command(name = "usbpd_parser", about = "Split the USB PD specification into TOC, sections and a validation report")]
struct Cli {
    /// Settings file (default: ./usbpd.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// PDF, or plain text with form-feed page breaks
    input: PathBuf,
    /// Document title (overrides the PDF's own)
    #[arg(long)]
    title: Option<String>,
    /// Physical TOC pages, e.g. "13-25" (detected when omitted)
    #[arg(long)]
    toc_pages: Option<String>,
    /// Physical page minus printed page (detected when omitted)
    #[arg(long, allow_negative_numbers = true)]
    page_offset: Option<i64>,
    /// Minimum TOC-shaped lines for a page to stay in the TOC region
    #[arg(long)]
    min_toc_lines: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write every output
    Extract {
        #[command(flatten)]
        input: InputArgs,
        /// Output directory
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Also store the run in this SQLite database
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the reconstructed TOC hierarchy
    Toc {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Print the validation summary and every mismatch
    Validate {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Show counts from a SQLite database written by `extract --db`
    Stats {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => Settings::load_file(path)?,
        None => Settings::load()?,
    };
    debug!(?settings, "settings loaded");

    let result = match cli.command {
        Commands::Extract { input, out, db } => {
            apply_overrides(&mut settings, &input);
            if let Some(out) = out {
                settings.output_dir = out;
            }
            if let Some(db) = db {
                settings.sqlite_path = Some(db);
            }
            let run = run_pipeline(&input.input, &settings)?;
            let report = validate::validate(&run.extraction.toc, &run.extraction.sections, run.extraction.body.text());
            let toc = records::toc_records(&run.extraction.sections);
            let sections = records::section_records(&run.metadata.doc_title, &run.extraction.sections);

            let written = sink::write_outputs(
                &settings.output_dir,
                &run.metadata,
                &toc,
                &sections,
                &report,
                &run.extraction.diagnostics,
            )?;
            println!(
                "Wrote {} TOC entries, {} sections, {} report rows, {} diagnostics to {}",
                written.toc,
                written.sections,
                written.report_rows,
                written.diagnostics,
                written.dir.display()
            );

            if let Some(path) = &settings.sqlite_path {
                let conn = db::connect(path)?;
                db::init_schema(&conn)?;
                let id = db::save_run(&conn, &run.metadata, &toc, &sections, &report)?;
                println!("Stored run as document #{} in {}", id, path.display());
            }

            print_diagnostics(&run.extraction);
            print_summary(&report);
            Ok(())
        }
        Commands::Toc { input } => {
            apply_overrides(&mut settings, &input);
            let run = run_pipeline(&input.input, &settings)?;
            for s in &run.extraction.sections {
                let indent = "  ".repeat(s.node.level.saturating_sub(1) as usize);
                let page = s.node.entry.page.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
                let tags = if s.tags.is_empty() {
                    String::new()
                } else {
                    format!("  [{}]", s.tags.join(", "))
                };
                println!("{}{} ... {}{}", indent, s.node.full_path, page, tags);
            }
            println!("\n{} entries | page offset {}", run.extraction.sections.len(), run.extraction.page_offset);
            Ok(())
        }
        Commands::Validate { input } => {
            apply_overrides(&mut settings, &input);
            let run = run_pipeline(&input.input, &settings)?;
            let report = validate::validate(&run.extraction.toc, &run.extraction.sections, run.extraction.body.text());
            print_summary(&report);

            let problems: Vec<_> = report.problems().collect();
            if !problems.is_empty() {
                println!("\n{:<10} | {:<40} | {:>5} | {:<16} | {}", "Section", "Title", "Page", "Status", "Reason");
                println!("{}", "-".repeat(100));
                for r in problems {
                    println!(
                        "{:<10} | {:<40} | {:>5} | {:<16} | {}",
                        r.section_id.as_deref().unwrap_or("-"),
                        truncate(&r.title, 40),
                        r.toc_page.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                        r.status.as_str(),
                        r.mismatch_reason.as_deref().unwrap_or(""),
                    );
                }
            }
            Ok(())
        }
        Commands::Stats { db } => {
            let path = db
                .or(settings.sqlite_path)
                .context("no database given (use --db or USBPD_SQLITE_PATH)")?;
            let conn = db::connect(&path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Documents:      {}", s.documents);
            println!("TOC entries:    {}", s.toc_entries);
            println!("Sections:       {}", s.sections);
            println!("Empty sections: {}", s.empty_sections);
            println!("Matched:        {}", s.matched);
            println!("Problems:       {}", s.problems);
            if let Some((title, at)) = s.latest {
                println!("Latest:         {} ({})", title, at);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn apply_overrides(settings: &mut Settings, args: &InputArgs) {
    if let Some(title) = &args.title {
        settings.doc_title = Some(title.clone());
    }
    if let Some(range) = &args.toc_pages {
        settings.toc_pages = Some(range.clone());
    }
    if let Some(offset) = args.page_offset {
        settings.page_offset = Some(offset);
    }
    if let Some(n) = args.min_toc_lines {
        settings.min_toc_lines = n;
    }
}

struct Run {
    metadata: DocumentMetadata,
    extraction: Extraction,
}

fn run_pipeline(input: &Path, settings: &Settings) -> anyhow::Result<Run> {
    let opts = settings.parse_options()?;
    let src = source::open(input).with_context(|| format!("opening {}", input.display()))?;
    let pages = src.pages()?;
    info!("Loaded {} pages from {}", pages.len(), input.display());

    let metadata = DocumentMetadata::resolve(
        src.metadata()?,
        settings.doc_title.as_deref(),
        pages.len(),
        chrono::Utc::now(),
    )?;
    let mut extraction = parser::process_document(&pages, &opts)?;
    parser::tags::apply(&mut extraction.sections);
    Ok(Run { metadata, extraction })
}

fn print_diagnostics(ex: &Extraction) {
    if ex.diagnostics.is_empty() {
        return;
    }
    let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
    for d in &ex.diagnostics {
        *by_kind.entry(d.kind()).or_default() += 1;
        debug!("{}", d);
    }
    let parts: Vec<String> = by_kind.iter().map(|(k, n)| format!("{} {}", n, k)).collect();
    println!("Diagnostics: {}", parts.join(", "));
}

fn print_summary(report: &validate::ValidationReport) {
    let s = &report.summary;
    println!("TOC entries:      {}", s.toc_entries);
    println!("Parsed sections:  {}", s.parsed_sections);
    println!("Matched:          {}", s.matched);
    println!("Missing content:  {}", s.missing_content);
    println!("Title mismatch:   {}", s.title_mismatch);
    println!("Orphaned content: {}", s.orphaned_content);
    let c = &s.coverage;
    let pct = if c.body_len == 0 {
        0.0
    } else {
        c.covered as f64 * 100.0 / c.body_len as f64
    };
    println!(
        "Coverage:         {:.1}% ({} gaps, {} overlaps, {} bytes before first section)",
        pct, c.gaps, c.overlaps, c.unassigned_prefix
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
