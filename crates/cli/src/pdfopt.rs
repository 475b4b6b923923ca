//! pdfopt - Rewrite a PDF
//!
//! Loads a document into a writer graph, applies the requested transforms
//! and writes a fresh file. With `--incremental` the input is left intact
//! and a small update stamping `/Producer` is appended instead.

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use quire_core::utils::human_readable_bytes;
use quire_core::{Dictionary, Document, PdfValue, WriteOptions, WriterGraph, XrefFormat};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const PRODUCER: &str = concat!("quire ", env!("CARGO_PKG_VERSION"));

/// Rewrite a PDF: merge, deduplicate, recompress, strip images.
#[derive(Parser, Debug)]
#[command(name = "pdfopt")]
#[command(author, version, about = "Rewrite and optimize PDF files", long_about = None)]
struct Args {
    /// Input PDF
    input: PathBuf,

    /// Output path
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Append the pages of these documents after the input's pages
    #[arg(short = 'm', long = "merge", value_name = "PDF")]
    merge: Vec<PathBuf>,

    /// Merge structurally identical objects
    #[arg(long = "dedupe", action = ArgAction::SetTrue)]
    dedupe: bool,

    /// Flate-encode every unfiltered stream
    #[arg(long = "compress", action = ArgAction::SetTrue)]
    compress: bool,

    /// Re-serialize and flate-encode page content streams
    #[arg(long = "recompress-content", action = ArgAction::SetTrue)]
    recompress_content: bool,

    /// Remove images from page content
    #[arg(long = "strip-images", action = ArgAction::SetTrue)]
    strip_images: bool,

    /// Write a cross-reference stream instead of a classic table
    #[arg(long = "xref-stream", action = ArgAction::SetTrue)]
    xref_stream: bool,

    /// Append an update to the input instead of rewriting it
    #[arg(long = "incremental", action = ArgAction::SetTrue)]
    incremental: bool,

    /// Print the report as JSON
    #[arg(long = "json", action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Debug, Default, Serialize)]
struct Report {
    input_bytes: u64,
    output_bytes: u64,
    pages: usize,
    objects_read: usize,
    objects_written: usize,
    duplicates_merged: usize,
    streams_compressed: usize,
    images_removed: usize,
    unreachable_dropped: usize,
    warnings: Vec<String>,
}

impl Report {
    fn print(&self) {
        let saved = self.input_bytes.saturating_sub(self.output_bytes);
        println!(
            "{} -> {} ({} saved)",
            human_readable_bytes(self.input_bytes),
            human_readable_bytes(self.output_bytes),
            human_readable_bytes(saved)
        );
        println!("pages:               {}", self.pages);
        println!("objects read:        {}", self.objects_read);
        println!("objects written:     {}", self.objects_written);
        println!("duplicates merged:   {}", self.duplicates_merged);
        println!("streams compressed:  {}", self.streams_compressed);
        println!("images removed:      {}", self.images_removed);
        println!("unreachable dropped: {}", self.unreachable_dropped);
        for warning in &self.warnings {
            println!("warning: {warning}");
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn stamp_producer(dict: &Dictionary) -> Dictionary {
    let mut dict = dict.clone();
    dict.insert("Producer", PdfValue::String(PRODUCER.as_bytes().to_vec()));
    dict
}

fn append_update(doc: &Document, report: &mut Report) -> Result<Vec<u8>> {
    let mut update = doc.edit();
    match doc.trailer().info {
        Some(info) => {
            let current = update.get(info)?;
            let dict = current.as_dict().context("/Info is not a dictionary")?;
            update.replace(info, stamp_producer(dict))?;
        }
        None => {
            let info = update.new_object(stamp_producer(&Dictionary::new()))?;
            update.set_info(info)?;
        }
    }
    report.objects_written = 1;
    Ok(update.to_bytes()?)
}

fn rewrite(doc: &Document, args: &Args, report: &mut Report) -> Result<Vec<u8>> {
    let mut graph = WriterGraph::from_document(doc)?;

    for path in &args.merge {
        let other =
            Document::open(path).with_context(|| format!("opening {}", path.display()))?;
        let added = graph.append_pages(&other)?;
        tracing::info!(pages = added.len(), path = %path.display(), "merged");
        report
            .warnings
            .extend(other.warnings().iter().map(ToString::to_string));
    }

    if args.strip_images {
        report.images_removed = graph.strip_images()?;
    }
    if args.recompress_content {
        for page in graph.page_ids() {
            graph
                .recompress_content(page)
                .with_context(|| format!("recompressing content of page {page}"))?;
        }
    }
    if args.dedupe {
        report.duplicates_merged = graph.deduplicate();
    }
    report.unreachable_dropped = graph.collect_garbage();
    if args.compress {
        report.streams_compressed = graph.compress_streams()?;
    }

    let format = if args.xref_stream {
        XrefFormat::Stream
    } else {
        XrefFormat::Table
    };
    let options = WriteOptions::default().with_xref_format(format);
    report.objects_written = graph.len();
    report.pages = graph.page_ids().len();
    Ok(graph.to_bytes(&options)?)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let transforms = args.dedupe
        || args.compress
        || args.recompress_content
        || args.strip_images
        || args.xref_stream
        || !args.merge.is_empty();
    if args.incremental && transforms {
        bail!("--incremental cannot be combined with rewriting transforms");
    }

    let doc = Document::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let mut report = Report {
        input_bytes: doc.bytes().len() as u64,
        objects_read: doc.resolvable_object_count(),
        ..Report::default()
    };

    let out = if args.incremental {
        report.pages = doc.page_count()?;
        append_update(&doc, &mut report)?
    } else {
        rewrite(&doc, &args, &mut report)?
    };
    report
        .warnings
        .extend(doc.warnings().iter().map(ToString::to_string));

    fs::write(&args.output, &out)
        .with_context(|| format!("writing {}", args.output.display()))?;
    report.output_bytes = out.len() as u64;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }
    Ok(())
}
