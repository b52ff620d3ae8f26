//! Per-document features attached to a posting.

use serde::{Deserialize, Serialize};

use crate::error::{DiskIndexError, Result};
use crate::schema::CollectionType;

/// Features of one element (one value of a multi-value field).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementFeatures {
    pub element_id: u32,
    #[serde(default = "default_weight")]
    pub weight: i32,
    pub element_length: u32,
    /// Word positions within the element, strictly increasing.
    #[serde(default)]
    pub positions: Vec<u32>,
}

fn default_weight() -> i32 {
    1
}

impl ElementFeatures {
    pub fn new(element_id: u32, element_length: u32, positions: Vec<u32>) -> Self {
        ElementFeatures {
            element_id,
            weight: 1,
            element_length,
            positions,
        }
    }

    pub fn weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }
}

/// Features of one document for the current term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocFeatures {
    pub field_length: u32,
    /// Elements containing the term, ordered by element id.
    #[serde(default)]
    pub elements: Vec<ElementFeatures>,
}

impl DocFeatures {
    /// Features with no occurrence data.
    pub fn new(field_length: u32) -> Self {
        DocFeatures {
            field_length,
            elements: Vec::new(),
        }
    }

    /// Features of a single-value field: the term occurs at `positions`.
    pub fn with_positions(field_length: u32, positions: Vec<u32>) -> Self {
        let mut features = DocFeatures::new(field_length);
        if !positions.is_empty() {
            features
                .elements
                .push(ElementFeatures::new(0, field_length, positions));
        }
        features
    }

    pub fn add_element(mut self, element: ElementFeatures) -> Self {
        self.elements.push(element);
        self
    }

    /// Total number of occurrences over all elements.
    pub fn num_occs(&self) -> u64 {
        self.elements.iter().map(|e| e.positions.len() as u64).sum()
    }

    /// Check that these features can be encoded for a field of the given
    /// collection type.
    pub fn validate(&self, collection_type: CollectionType) -> Result<()> {
        if !collection_type.has_elements() {
            match self.elements.as_slice() {
                [] => {}
                [element] => {
                    if element.element_id != 0
                        || element.weight != 1
                        || element.element_length != self.field_length
                    {
                        return Err(DiskIndexError::invalid_write_sequence(
                            "single-value fields take one element with id 0, weight 1 \
                             and the field length",
                        ));
                    }
                    if element.positions.is_empty() {
                        return Err(DiskIndexError::invalid_write_sequence(
                            "single-value element without positions",
                        ));
                    }
                }
                _ => {
                    return Err(DiskIndexError::invalid_write_sequence(format!(
                        "single-value field given {} elements",
                        self.elements.len()
                    )));
                }
            }
        } else if !collection_type.has_element_weights()
            && self.elements.iter().any(|e| e.weight != 1)
        {
            return Err(DiskIndexError::invalid_write_sequence(
                "element weights require a weighted set field",
            ));
        }

        let mut prev_element: Option<u32> = None;
        for element in &self.elements {
            if prev_element.is_some_and(|prev| element.element_id <= prev) {
                return Err(DiskIndexError::invalid_write_sequence(format!(
                    "element id {} not increasing",
                    element.element_id
                )));
            }
            prev_element = Some(element.element_id);
            if !element.positions.windows(2).all(|w| w[0] < w[1]) {
                return Err(DiskIndexError::invalid_write_sequence(format!(
                    "positions of element {} not strictly increasing",
                    element.element_id
                )));
            }
        }
        Ok(())
    }
}
