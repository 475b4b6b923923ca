//! pdfdump - Dump PDF internal structure as XML
//!
//! Prints trailers, cross-reference entries, individual objects or pages.
//! Streams are shown as their dictionary by default; `-r`, `-b` and `-t`
//! select raw bytes, decoded bytes or decoded data inline.

use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser};
use quire_core::document::{Document, XrefEntry};
use quire_core::{Dictionary, ObjectId, PdfValue};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Escape special characters for XML output.
fn escape(s: &[u8]) -> String {
    let mut result = String::new();
    for &byte in s {
        match byte {
            b'&' => result.push_str("&amp;"),
            b'<' => result.push_str("&lt;"),
            b'>' => result.push_str("&gt;"),
            b'"' => result.push_str("&quot;"),
            b'\'' => result.push_str("&#39;"),
            b'\\' => result.push_str("&#92;"),
            0..=31 | 127..=255 => {
                result.push_str(&format!("&#{byte};"));
            }
            _ => result.push(byte as char),
        }
    }
    result
}

fn escape_str(s: &str) -> String {
    escape(s.as_bytes())
}

/// How stream payloads are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamCodec {
    None,
    Raw,
    Binary,
    Text,
}

fn dumpxml<W: Write>(out: &mut W, doc: &Document, obj: &PdfValue, codec: StreamCodec) -> Result<()> {
    match obj {
        PdfValue::Null => write!(out, "<null />")?,
        PdfValue::Bool(b) => write!(out, "<boolean>{b}</boolean>")?,
        PdfValue::Int(n) => write!(out, "<number>{n}</number>")?,
        PdfValue::Real(n) => write!(out, "<number>{n}</number>")?,
        PdfValue::String(s) => write!(out, r#"<string size="{}">{}</string>"#, s.len(), escape(s))?,
        PdfValue::Name(name) => write!(out, "<literal>{}</literal>", escape_str(name.as_str()))?,
        PdfValue::Array(arr) => {
            writeln!(out, r#"<list size="{}">"#, arr.len())?;
            for item in arr {
                dumpxml(out, doc, item, codec)?;
                writeln!(out)?;
            }
            write!(out, "</list>")?;
        }
        PdfValue::Dict(dict) => dumpdict(out, doc, dict, codec)?,
        PdfValue::Stream(stream) => match codec {
            StreamCodec::Raw => out.write_all(stream.raw_data())?,
            StreamCodec::Binary => out.write_all(&doc.decode_stream(stream)?)?,
            StreamCodec::Text | StreamCodec::None => {
                writeln!(out, "<stream>")?;
                writeln!(out, "<props>")?;
                dumpdict(out, doc, &stream.dict, codec)?;
                writeln!(out)?;
                writeln!(out, "</props>")?;
                if codec == StreamCodec::Text {
                    let data = doc.decode_stream(stream)?;
                    writeln!(out, r#"<data size="{}">{}</data>"#, data.len(), escape(&data))?;
                }
                write!(out, "</stream>")?;
            }
        },
        PdfValue::Ref(id) => write!(out, r#"<ref id="{}" gen="{}" />"#, id.objnum, id.genno)?,
    }
    Ok(())
}

fn dumpdict<W: Write>(
    out: &mut W,
    doc: &Document,
    dict: &Dictionary,
    codec: StreamCodec,
) -> Result<()> {
    writeln!(out, r#"<dict size="{}">"#, dict.len())?;
    for (k, v) in dict.iter() {
        writeln!(out, "<key>{}</key>", escape_str(k.as_str()))?;
        write!(out, "<value>")?;
        dumpxml(out, doc, v, codec)?;
        writeln!(out, "</value>")?;
    }
    write!(out, "</dict>")?;
    Ok(())
}

fn dumptrailer<W: Write>(out: &mut W, doc: &Document) -> Result<()> {
    if doc.is_reconstructed() {
        tracing::warn!("cross-reference table was reconstructed; trailer is synthesized");
    }
    writeln!(out, "<trailer>")?;
    dumpdict(out, doc, &doc.trailer().dict, StreamCodec::None)?;
    writeln!(out)?;
    writeln!(out, "</trailer>")?;
    Ok(())
}

fn dumpxref<W: Write>(out: &mut W, doc: &Document) -> Result<()> {
    let xref = doc.xref();
    writeln!(out, r#"<xref kind="{:?}" size="{}">"#, xref.kind(), xref.len())?;
    for (objnum, entry) in xref.iter() {
        match entry {
            XrefEntry::Free { next, genno } => {
                writeln!(out, r#"<free id="{objnum}" gen="{genno}" next="{next}" />"#)?;
            }
            XrefEntry::InUse { offset, genno } => {
                writeln!(out, r#"<inuse id="{objnum}" gen="{genno}" offset="{offset}" />"#)?;
            }
            XrefEntry::Compressed { container, index } => {
                writeln!(
                    out,
                    r#"<compressed id="{objnum}" container="{container}" index="{index}" />"#
                )?;
            }
        }
    }
    writeln!(out, "</xref>")?;
    Ok(())
}

fn dumpobject<W: Write>(out: &mut W, doc: &Document, id: ObjectId, codec: StreamCodec) -> Result<()> {
    let obj = doc
        .resolve(id)
        .with_context(|| format!("resolving object {id}"))?;
    writeln!(out, r#"<object id="{}" gen="{}">"#, id.objnum, id.genno)?;
    dumpxml(out, doc, &obj, codec)?;
    writeln!(out)?;
    writeln!(out, "</object>")?;
    writeln!(out)?;
    Ok(())
}

fn dumpallobjs<W: Write>(out: &mut W, doc: &Document, codec: StreamCodec) -> Result<()> {
    write!(out, "<pdf>")?;
    for id in doc.object_ids() {
        if let Err(e) = dumpobject(out, doc, id, codec) {
            tracing::warn!("not found: object {id} - {e:#}");
        }
    }
    dumptrailer(out, doc)?;
    write!(out, "</pdf>")?;
    Ok(())
}

fn dumppages<W: Write>(
    out: &mut W,
    doc: &Document,
    pagenos: &HashSet<usize>,
    codec: StreamCodec,
) -> Result<()> {
    for (pageno, page) in doc.pages()?.iter().enumerate() {
        if !pagenos.contains(&pageno) {
            continue;
        }
        if codec == StreamCodec::None {
            dumpdict(out, doc, &doc.materialize(page), codec)?;
        } else {
            for id in page.content_ids(doc) {
                dumpxml(out, doc, &*doc.resolve(id)?, codec)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn dumpwarnings(doc: &Document) {
    for warning in doc.warnings() {
        eprintln!("warning: {warning}");
    }
}

/// Dump PDF internal structure as XML.
#[derive(Parser, Debug)]
#[command(name = "pdfdump")]
#[command(author, version, about = "Dump PDF structure as XML", long_about = None)]
#[command(group(
    ArgGroup::new("stream_codec")
        .args(["raw_stream", "binary_stream", "text_stream"])
))]
struct Args {
    /// One or more paths to PDF files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Page numbers to dump (1-indexed), comma separated
    #[arg(short = 'p', long = "page-numbers", value_delimiter = ',')]
    page_numbers: Vec<usize>,

    /// Object numbers to dump, comma separated
    #[arg(short = 'i', long = "objects", value_delimiter = ',')]
    objects: Vec<u32>,

    /// Dump every object
    #[arg(short = 'a', long = "all", action = ArgAction::SetTrue)]
    all: bool,

    /// Dump cross-reference entries
    #[arg(short = 'x', long = "xref", action = ArgAction::SetTrue)]
    xref: bool,

    /// Print structural warnings to stderr after each file
    #[arg(short = 'w', long = "warnings", action = ArgAction::SetTrue)]
    warnings: bool,

    /// Path to file where output is written, or "-" for stdout
    #[arg(short = 'o', long, default_value = "-")]
    outfile: String,

    /// Write stream objects without decoding
    #[arg(short = 'r', long = "raw-stream", action = ArgAction::SetTrue)]
    raw_stream: bool,

    /// Write decoded stream data as binary
    #[arg(short = 'b', long = "binary-stream", action = ArgAction::SetTrue)]
    binary_stream: bool,

    /// Write decoded stream data inline as text
    #[arg(short = 't', long = "text-stream", action = ArgAction::SetTrue)]
    text_stream: bool,
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

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let codec = if args.raw_stream {
        StreamCodec::Raw
    } else if args.binary_stream {
        StreamCodec::Binary
    } else if args.text_stream {
        StreamCodec::Text
    } else {
        StreamCodec::None
    };
    let pagenos: HashSet<usize> = args
        .page_numbers
        .iter()
        .map(|n| n.saturating_sub(1))
        .collect();

    let mut output: Box<dyn Write> = if args.outfile == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        let file = File::create(&args.outfile)
            .with_context(|| format!("creating {}", args.outfile))?;
        Box::new(BufWriter::new(file))
    };

    for path in &args.files {
        let doc = Document::open(path).with_context(|| format!("opening {}", path.display()))?;

        if args.all {
            dumpallobjs(&mut output, &doc, codec)?;
        } else {
            for &objnum in &args.objects {
                let genno = doc.xref().get(objnum).map_or(0, XrefEntry::genno);
                dumpobject(&mut output, &doc, ObjectId::new(objnum, genno), codec)?;
            }
            if !pagenos.is_empty() {
                dumppages(&mut output, &doc, &pagenos, codec)?;
            }
            if args.xref {
                dumpxref(&mut output, &doc)?;
            }
            if args.objects.is_empty() && pagenos.is_empty() && !args.xref {
                dumptrailer(&mut output, &doc)?;
            }
        }
        if codec != StreamCodec::Raw && codec != StreamCodec::Binary {
            writeln!(output)?;
        }
        if args.warnings {
            dumpwarnings(&doc);
        }
    }

    output.flush()?;
    Ok(())
}
