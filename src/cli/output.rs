//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{DiskIndexArgs, OutputFormat};
use crate::error::Result;
use crate::index::DocFeatures;

/// A command result that can also be printed for people.
pub trait HumanOutput {
    fn print_human(&self);
}

/// Result of building one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldBuildResult {
    pub field: String,
    pub prefix: String,
    pub index_id: u32,
    pub num_words: u64,
    pub num_bitmap_words: u64,
    pub num_empty_words: u64,
    pub num_postings: u64,
    pub num_bits: u64,
}

/// Result of the build command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    pub segment: String,
    pub doc_id_limit: u32,
    pub fields: Vec<FieldBuildResult>,
    pub duration_ms: u64,
}

impl HumanOutput for BuildResult {
    fn print_human(&self) {
        println!("Segment: {}", self.segment);
        println!("Doc id limit: {}", self.doc_id_limit);
        println!();
        println!(
            "{:<20} {:>10} {:>10} {:>10} {:>12} {:>12}",
            "Field", "Words", "Bitmaps", "Empty", "Postings", "Bits"
        );
        println!("{}", "─".repeat(79));
        for field in &self.fields {
            println!(
                "{:<20} {:>10} {:>10} {:>10} {:>12} {:>12}",
                field.field,
                field.num_words,
                field.num_bitmap_words,
                field.num_empty_words,
                field.num_postings,
                field.num_bits
            );
        }
        println!();
        println!("Built {} field(s) in {} ms", self.fields.len(), self.duration_ms);
    }
}

/// One term of a dumped field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpedWord {
    pub word_number: u64,
    pub compacted_word_number: u64,
    pub text: String,
    pub num_docs: u64,
    pub bit_length: u64,
    pub num_chunks: usize,
    pub has_bitmap: bool,
    pub doc_ids: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<(u32, DocFeatures)>>,
}

/// Result of the dump command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpResult {
    pub prefix: String,
    pub field_name: String,
    pub collection_type: String,
    pub doc_id_limit: u32,
    pub num_words: usize,
    pub num_bitmaps: usize,
    pub words: Vec<DumpedWord>,
}

impl HumanOutput for DumpResult {
    fn print_human(&self) {
        println!(
            "Field '{}' ({}) at {}",
            self.field_name, self.collection_type, self.prefix
        );
        println!(
            "{} words, {} bitmaps, doc id limit {}",
            self.num_words, self.num_bitmaps, self.doc_id_limit
        );
        for word in &self.words {
            println!();
            println!(
                "#{} [{}] '{}': {} docs, {} bits, {} chunk(s){}",
                word.word_number,
                word.compacted_word_number,
                word.text,
                word.num_docs,
                word.bit_length,
                word.num_chunks,
                if word.has_bitmap { ", bitmap" } else { "" }
            );
            match &word.features {
                Some(features) => {
                    for (doc_id, doc) in features {
                        println!("  {doc_id}: {}", format_features(doc));
                    }
                }
                None => println!("  {}", format_doc_ids(&word.doc_ids)),
            }
        }
    }
}

/// Result of the remove command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResult {
    pub prefix: String,
    pub files_removed: usize,
}

impl HumanOutput for RemoveResult {
    fn print_human(&self) {
        println!("Removed {} file(s) at {}", self.files_removed, self.prefix);
    }
}

/// Output a command result in the requested format.
pub fn output_result<T: Serialize + HumanOutput>(
    message: &str,
    result: &T,
    args: &DiskIndexArgs,
) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                println!("{message}");
                println!();
            }
            result.print_human();
            Ok(())
        }
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_json<T: Serialize>(result: &T, args: &DiskIndexArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}

fn format_doc_ids(doc_ids: &[u32]) -> String {
    const SHOWN: usize = 20;
    let mut text = doc_ids
        .iter()
        .take(SHOWN)
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    if doc_ids.len() > SHOWN {
        text.push_str(&format!(" ... (+{})", doc_ids.len() - SHOWN));
    }
    text
}

fn format_features(doc: &DocFeatures) -> String {
    let elements = doc
        .elements
        .iter()
        .map(|e| {
            format!(
                "e{} w{} len{} {:?}",
                e.element_id, e.weight, e.element_length, e.positions
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("field length {} [{elements}]", doc.field_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ElementFeatures;

    #[test]
    fn test_format_doc_ids_truncates() {
        let ids: Vec<u32> = (0..25).collect();
        let text = format_doc_ids(&ids);
        assert!(text.starts_with("0 1 2"));
        assert!(text.ends_with("(+5)"));
        assert_eq!(format_doc_ids(&[4, 9]), "4 9");
    }

    #[test]
    fn test_format_features() {
        let doc = DocFeatures::new(5).add_element(ElementFeatures::new(0, 5, vec![1, 3]));
        assert_eq!(format_features(&doc), "field length 5 [e0 w1 len5 [1, 3]]");
    }

    #[test]
    fn test_dump_result_json_skips_missing_features() {
        let word = DumpedWord {
            word_number: 1,
            compacted_word_number: 1,
            text: "a".to_string(),
            num_docs: 1,
            bit_length: 3,
            num_chunks: 1,
            has_bitmap: false,
            doc_ids: vec![2],
            features: None,
        };
        let json = serde_json::to_string(&word).unwrap();
        assert!(!json.contains("features"));
    }
}
