//! Index field definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DiskIndexError;

/// Value type of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Int64,
}

/// How many values a field holds per document.
///
/// Multi-value fields carry per-element features (element id, length and,
/// for weighted sets, a weight) in the posting stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    #[default]
    Single,
    Array,
    WeightedSet,
}

impl CollectionType {
    /// Whether postings carry element-level features.
    pub fn has_elements(self) -> bool {
        !matches!(self, CollectionType::Single)
    }

    /// Whether elements carry weights.
    pub fn has_element_weights(self) -> bool {
        matches!(self, CollectionType::WeightedSet)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionType::Single => "single",
            CollectionType::Array => "array",
            CollectionType::WeightedSet => "weighted_set",
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionType {
    type Err = DiskIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(CollectionType::Single),
            "array" => Ok(CollectionType::Array),
            "weighted_set" => Ok(CollectionType::WeightedSet),
            other => Err(DiskIndexError::schema(format!(
                "unknown collection type '{other}'"
            ))),
        }
    }
}

/// An indexed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    /// Field name.
    pub name: String,
    /// Value type.
    #[serde(default = "default_data_type")]
    pub data_type: DataType,
    /// Collection type.
    #[serde(default)]
    pub collection_type: CollectionType,
    /// Whether the field asks for interleaved features (field length and
    /// occurrence count stored next to each doc id).
    #[serde(default)]
    pub interleaved_features: bool,
}

fn default_data_type() -> DataType {
    DataType::String
}

impl IndexField {
    /// Create a single-value string field.
    pub fn new<S: Into<String>>(name: S) -> Self {
        IndexField {
            name: name.into(),
            data_type: DataType::String,
            collection_type: CollectionType::Single,
            interleaved_features: false,
        }
    }

    /// Set the data type.
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Set the collection type.
    pub fn collection_type(mut self, collection_type: CollectionType) -> Self {
        self.collection_type = collection_type;
        self
    }

    /// Set whether interleaved features are requested.
    pub fn interleaved_features(mut self, interleaved: bool) -> Self {
        self.interleaved_features = interleaved;
        self
    }
}

/// Average field length statistics for one field, used by encodings that
/// tune their codes to typical field sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldLengthInfo {
    pub average_field_length: f64,
    pub average_element_length: f64,
    pub num_samples: u32,
}

impl FieldLengthInfo {
    pub fn new(average_field_length: f64, average_element_length: f64, num_samples: u32) -> Self {
        FieldLengthInfo {
            average_field_length,
            average_element_length,
            num_samples,
        }
    }
}

impl Default for FieldLengthInfo {
    fn default() -> Self {
        FieldLengthInfo {
            average_field_length: 0.0,
            average_element_length: 0.0,
            num_samples: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_type_flags() {
        assert!(!CollectionType::Single.has_elements());
        assert!(CollectionType::Array.has_elements());
        assert!(!CollectionType::Array.has_element_weights());
        assert!(CollectionType::WeightedSet.has_element_weights());
    }

    #[test]
    fn test_collection_type_parse() {
        for ct in [
            CollectionType::Single,
            CollectionType::Array,
            CollectionType::WeightedSet,
        ] {
            assert_eq!(ct.to_string().parse::<CollectionType>().unwrap(), ct);
        }
        assert!("map".parse::<CollectionType>().is_err());
    }

    #[test]
    fn test_index_field_from_json() {
        let field: IndexField = serde_json::from_str(r#"{"name": "title"}"#).unwrap();
        assert_eq!(field, IndexField::new("title"));

        let field: IndexField = serde_json::from_str(
            r#"{"name": "tags", "collection_type": "weighted_set", "interleaved_features": true}"#,
        )
        .unwrap();
        assert_eq!(field.collection_type, CollectionType::WeightedSet);
        assert!(field.interleaved_features);
    }
}
