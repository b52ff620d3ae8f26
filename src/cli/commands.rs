//! Command implementations for the diskindex CLI.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::index::{
    DocFeatures, ElementFeatures, FieldReader, FieldWriter, FieldWriterOptions, FieldWriterStats,
    WordPostings,
};
use crate::schema::{FieldLengthInfo, IndexField, Schema};
use crate::storage::{DefaultFileHeaderContext, FileHeaderContext, IoTuning};

/// Execute a CLI command.
pub fn execute_command(args: DiskIndexArgs) -> Result<()> {
    match &args.command {
        Command::Build(build_args) => build_segment(build_args, &args),
        Command::Dump(dump_args) => dump_field(dump_args, &args),
        Command::Remove(remove_args) => remove_field(remove_args, &args),
    }
}

/// One line of a term file: a term and its documents in doc id order.
///
/// A missing `word_number` continues from the previous term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRecord {
    #[serde(default)]
    pub word_number: Option<u64>,
    pub text: String,
    #[serde(default)]
    pub docs: Vec<TermDoc>,
}

/// A document of a term. Single-value fields give `positions` (and
/// optionally `field_length`); multi-value fields give `elements`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermDoc {
    pub doc_id: u32,
    #[serde(default)]
    pub field_length: Option<u32>,
    #[serde(default)]
    pub positions: Vec<u32>,
    #[serde(default)]
    pub elements: Vec<ElementFeatures>,
}

impl TermDoc {
    /// Posting features for this document.
    pub fn features(&self) -> DocFeatures {
        if self.elements.is_empty() {
            let field_length = self
                .field_length
                .unwrap_or_else(|| self.positions.last().map_or(0, |p| p + 1));
            DocFeatures::with_positions(field_length, self.positions.clone())
        } else {
            let field_length = self
                .field_length
                .unwrap_or_else(|| self.elements.iter().map(|e| e.element_length).sum());
            DocFeatures {
                field_length,
                elements: self.elements.clone(),
            }
        }
    }
}

/// Read a JSONL term file, skipping blank lines.
pub fn read_term_file(path: &Path) -> Result<Vec<TermRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TermRecord = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid term record", path.display(), line_no + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Average field and element lengths over the distinct documents of a
/// term file.
pub fn field_length_info(records: &[TermRecord]) -> FieldLengthInfo {
    let mut field_lengths: BTreeMap<u32, u32> = BTreeMap::new();
    let mut elements: BTreeMap<(u32, u32), u32> = BTreeMap::new();
    for record in records {
        for doc in &record.docs {
            let features = doc.features();
            field_lengths.insert(doc.doc_id, features.field_length);
            for element in &features.elements {
                elements.insert((doc.doc_id, element.element_id), element.element_length);
            }
        }
    }
    if field_lengths.is_empty() {
        return FieldLengthInfo::default();
    }
    FieldLengthInfo::new(
        average(field_lengths.values(), field_lengths.len()),
        average(elements.values(), elements.len()),
        field_lengths.len() as u32,
    )
}

fn average<'a>(values: impl Iterator<Item = &'a u32>, n: usize) -> f64 {
    values.map(|v| *v as f64).sum::<f64>() / n.max(1) as f64
}

/// Write every record of a term file to an opened field writer.
pub fn write_terms(writer: &mut FieldWriter, records: &[TermRecord]) -> Result<()> {
    for record in records {
        let begun = match record.word_number {
            Some(word_number) => writer.begin_term(word_number, &record.text),
            None => writer.begin_next_term(&record.text),
        };
        begun.with_context(|| format!("term '{}'", record.text))?;
        for doc in &record.docs {
            writer
                .add_document(doc.doc_id, &doc.features())
                .with_context(|| format!("term '{}', doc {}", record.text, doc.doc_id))?;
        }
    }
    Ok(())
}

fn load_schema(args: &BuildArgs) -> Result<Schema> {
    if let Some(schema_file) = &args.schema_file {
        debug!("Loading schema from {}", schema_file.display());
        let content = fs::read_to_string(schema_file)
            .with_context(|| format!("reading schema {}", schema_file.display()))?;
        let schema: Schema = serde_json::from_str(&content)
            .with_context(|| format!("parsing schema {}", schema_file.display()))?;
        return Ok(schema);
    }
    let mut schema = Schema::new();
    for input in &args.inputs {
        schema.add_index_field(IndexField::new(input.field.as_str()))?;
    }
    Ok(schema)
}

fn build_field(
    input: &FieldInput,
    schema: &Schema,
    args: &BuildArgs,
    header_context: &Arc<dyn FileHeaderContext>,
) -> Result<FieldBuildResult> {
    let index_id = schema
        .index_field_id(&input.field)
        .with_context(|| format!("field '{}' is not in the schema", input.field))?;
    let field = schema.index_field(index_id)?;
    let records = read_term_file(&input.path)?;

    let prefix = format!("{}/{}/", args.prefix.display(), input.field);
    let options = FieldWriterOptions::new(schema.clone(), index_id)
        .min_skip_docs(args.min_skip_docs)
        .min_chunk_docs(args.min_chunk_docs)
        .features_size_flush_bits(args.features_size_flush_bits)
        .dynamic_format(!args.fixed_format)
        .interleaved_features(args.interleaved || field.interleaved_features)
        .field_length_info(field_length_info(&records))
        .io_tuning(IoTuning::default().sync_on_close(args.sync))
        .header_context(Arc::clone(header_context));

    let mut writer = FieldWriter::new(args.doc_id_limit, args.num_word_ids, prefix.as_str());
    if let Some(threshold) = args.bitmap_threshold {
        writer = writer.with_bitmap_threshold(threshold);
    }
    if let Err(e) = writer.open(options) {
        writer.close().ok();
        discard_field(&prefix);
        return Err(e).with_context(|| format!("opening field writer at {prefix}"));
    }

    let written = write_terms(&mut writer, &records);
    // Close even after a write error so every file handle is released.
    let closed = writer.close();
    if written.is_err() || closed.is_err() {
        discard_field(&prefix);
    }
    written.with_context(|| format!("building field '{}'", input.field))?;
    closed.with_context(|| format!("closing field '{}'", input.field))?;

    let FieldWriterStats {
        num_words,
        num_bitmap_words,
        num_docs,
        num_bits,
        num_empty_words,
    } = writer.stats();
    Ok(FieldBuildResult {
        field: input.field.clone(),
        prefix,
        index_id,
        num_words,
        num_bitmap_words,
        num_empty_words,
        num_postings: num_docs,
        num_bits,
    })
}

/// Delete the files of a field whose build failed.
fn discard_field(prefix: &str) {
    let removed = FieldWriter::remove(prefix);
    warn!("Discarded incomplete field at {prefix} ({removed} file(s))");
}

/// Build one field segment per input, in parallel.
fn build_segment(args: &BuildArgs, cli_args: &DiskIndexArgs) -> Result<()> {
    let start = Instant::now();
    let schema = load_schema(args)?;
    let mut seen = HashSet::new();
    for input in &args.inputs {
        if !seen.insert(input.field.as_str()) {
            bail!("field '{}' given more than once", input.field);
        }
    }

    let header_context: Arc<dyn FileHeaderContext> = if args.deterministic {
        Arc::new(DefaultFileHeaderContext::deterministic())
    } else {
        Arc::new(DefaultFileHeaderContext::new())
    };

    info!(
        "Building {} field(s) under {}",
        args.inputs.len(),
        args.prefix.display()
    );
    let fields = args
        .inputs
        .par_iter()
        .map(|input| build_field(input, &schema, args, &header_context))
        .collect::<Result<Vec<_>>>()?;

    output_result(
        "Segment built successfully",
        &BuildResult {
            segment: args.prefix.display().to_string(),
            doc_id_limit: args.doc_id_limit,
            fields,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )?;
    Ok(())
}

/// Print the terms of a field segment.
fn dump_field(args: &DumpArgs, cli_args: &DiskIndexArgs) -> Result<()> {
    let mut reader = FieldReader::open(args.prefix.as_str())
        .with_context(|| format!("opening field at {}", args.prefix))?;
    reader.verify_bitmap_keys()?;

    let to_dumped = |word: WordPostings| DumpedWord {
        word_number: word.word_number,
        compacted_word_number: word.compacted_word_number,
        num_docs: word.counts.num_docs,
        bit_length: word.counts.bit_length,
        num_chunks: word.counts.segments.len().max(1),
        has_bitmap: word.bitmap.is_some(),
        doc_ids: word.doc_ids().collect(),
        features: args.features.then_some(word.docs),
        text: word.text,
    };

    let words = match args.word {
        Some(word_number) => match reader.lookup(word_number)? {
            Some(word) => vec![to_dumped(word)],
            None => bail!("word {word_number} is not in {}", args.prefix),
        },
        None => {
            let limit = args.limit.unwrap_or(usize::MAX);
            let mut words = Vec::new();
            while words.len() < limit {
                match reader.read_word()? {
                    Some(word) => words.push(to_dumped(word)),
                    None => break,
                }
            }
            words
        }
    };

    let feature_params = reader.feature_params();
    output_result(
        "Field segment",
        &DumpResult {
            prefix: reader.prefix().to_string(),
            field_name: feature_params.field_name.clone(),
            collection_type: feature_params.collection_type.to_string(),
            doc_id_limit: reader.count_params().doc_id_limit,
            num_words: reader.num_words(),
            num_bitmaps: reader.num_bitmaps(),
            words,
        },
        cli_args,
    )?;
    Ok(())
}

/// Delete the files of a field segment.
fn remove_field(args: &RemoveArgs, cli_args: &DiskIndexArgs) -> Result<()> {
    let files_removed = FieldWriter::remove(&args.prefix);
    output_result(
        "Field removed",
        &RemoveResult {
            prefix: args.prefix.clone(),
            files_removed,
        },
        cli_args,
    )?;
    Ok(())
}
