//! Command line argument parsing for the diskindex CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::index::BitmapThreshold;

/// diskindex - build and inspect per-field disk index segments
#[derive(Parser, Debug, Clone)]
#[command(name = "diskindex")]
#[command(about = "Build and inspect write-once per-field inverted index segments")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct DiskIndexArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl DiskIndexArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build field segments from JSONL term files
    Build(BuildArgs),

    /// Print the terms and postings of a field segment
    Dump(DumpArgs),

    /// Delete every file of a field segment
    Remove(RemoveArgs),
}

/// Arguments for building a segment
#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// Segment directory; each field is written under `<PREFIX>/<field>/`
    #[arg(short, long, value_name = "PREFIX")]
    pub prefix: PathBuf,

    /// Term file for a field, as FIELD=PATH (repeatable)
    #[arg(short, long = "input", value_name = "FIELD=PATH", required = true, value_parser = parse_input)]
    pub inputs: Vec<FieldInput>,

    /// Schema file (JSON); by default every input is a single-value field
    #[arg(short, long, value_name = "SCHEMA_FILE")]
    pub schema_file: Option<PathBuf>,

    /// Number of documents in the segment
    #[arg(long, env = "DISKINDEX_DOC_ID_LIMIT")]
    pub doc_id_limit: u32,

    /// Largest word number in use
    #[arg(long)]
    pub num_word_ids: u64,

    /// Docs per chunk before a skip table is written (0 = default)
    #[arg(long, default_value = "0")]
    pub min_skip_docs: u32,

    /// Maximum docs per chunk (0 = default)
    #[arg(long, default_value = "0")]
    pub min_chunk_docs: u32,

    /// Feature bits that close a chunk (0 = no limit)
    #[arg(long, default_value = "0")]
    pub features_size_flush_bits: u64,

    /// Use one doc id code for the whole field instead of one per chunk
    #[arg(long)]
    pub fixed_format: bool,

    /// Store field length and occurrence count next to each doc id
    #[arg(long)]
    pub interleaved: bool,

    /// Bitmap threshold: a doc count (e.g. 500) or a fraction of the doc-id
    /// limit (e.g. 0.02)
    #[arg(long, value_parser = parse_threshold)]
    pub bitmap_threshold: Option<BitmapThreshold>,

    /// Fsync files when closing them
    #[arg(long)]
    pub sync: bool,

    /// Leave the creation time out of file headers
    #[arg(long)]
    pub deterministic: bool,
}

/// A field name and the term file to build it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInput {
    pub field: String,
    pub path: PathBuf,
}

fn parse_input(value: &str) -> Result<FieldInput, String> {
    match value.split_once('=') {
        Some((field, path)) if !field.is_empty() && !path.is_empty() => Ok(FieldInput {
            field: field.to_string(),
            path: PathBuf::from(path),
        }),
        _ => Err(format!("expected FIELD=PATH, got '{value}'")),
    }
}

fn parse_threshold(value: &str) -> Result<BitmapThreshold, String> {
    if value.contains('.') {
        let fraction: f64 = value
            .parse()
            .map_err(|e| format!("invalid fraction '{value}': {e}"))?;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(format!("fraction must be in (0, 1], got {value}"));
        }
        Ok(BitmapThreshold::Fraction(fraction))
    } else {
        value
            .parse()
            .map(BitmapThreshold::Absolute)
            .map_err(|e| format!("invalid doc count '{value}': {e}"))
    }
}

/// Arguments for dumping a field
#[derive(Parser, Debug, Clone)]
pub struct DumpArgs {
    /// Field prefix, e.g. `segment/title/`
    #[arg(short, long, value_name = "PREFIX")]
    pub prefix: String,

    /// Only show this word number
    #[arg(short, long)]
    pub word: Option<u64>,

    /// Maximum number of terms to show
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Include per-document features
    #[arg(long)]
    pub features: bool,
}

/// Arguments for removing a field
#[derive(Parser, Debug, Clone)]
pub struct RemoveArgs {
    /// Field prefix, e.g. `segment/title/`
    #[arg(short, long, value_name = "PREFIX")]
    pub prefix: String,
}

/// Output formats supported by the CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build() {
        let args = DiskIndexArgs::try_parse_from([
            "diskindex",
            "-vv",
            "build",
            "--prefix",
            "/tmp/seg",
            "--input",
            "title=title.jsonl",
            "--input",
            "body=body.jsonl",
            "--doc-id-limit",
            "1000",
            "--num-word-ids",
            "50",
            "--bitmap-threshold",
            "0.25",
        ])
        .unwrap();
        assert_eq!(args.verbosity(), 2);
        let Command::Build(build) = args.command else {
            panic!("expected build command");
        };
        assert_eq!(build.inputs.len(), 2);
        assert_eq!(build.inputs[1].field, "body");
        assert_eq!(build.bitmap_threshold, Some(BitmapThreshold::Fraction(0.25)));
        assert!(!build.fixed_format);
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_input("title").is_err());
        assert!(parse_input("=x").is_err());
        assert_eq!(parse_threshold("40"), Ok(BitmapThreshold::Absolute(40)));
        assert!(parse_threshold("1.5").is_err());
        assert!(parse_threshold("-3").is_err());
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        let args =
            DiskIndexArgs::try_parse_from(["diskindex", "-q", "-v", "remove", "--prefix", "x/"])
                .unwrap();
        assert_eq!(args.verbosity(), 0);
    }
}
