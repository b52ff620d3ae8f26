//! Schema management.

use serde::{Deserialize, Serialize};

use crate::error::{DiskIndexError, Result};
use crate::schema::field::IndexField;

/// The indexed fields of a segment. An index id is a field's position in
/// this list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    index_fields: Vec<IndexField>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Schema::default()
    }

    /// Add an index field, returning its index id.
    pub fn add_index_field(&mut self, field: IndexField) -> Result<u32> {
        if field.name.is_empty() {
            return Err(DiskIndexError::schema("Field name cannot be empty"));
        }
        if self.index_field_id(&field.name).is_some() {
            return Err(DiskIndexError::schema(format!(
                "Field '{}' already exists",
                field.name
            )));
        }
        self.index_fields.push(field);
        Ok((self.index_fields.len() - 1) as u32)
    }

    /// Builder-style variant of [`Schema::add_index_field`].
    pub fn with_index_field(mut self, field: IndexField) -> Result<Self> {
        self.add_index_field(field)?;
        Ok(self)
    }

    /// Look up a field by index id.
    pub fn index_field(&self, index_id: u32) -> Result<&IndexField> {
        self.index_fields.get(index_id as usize).ok_or_else(|| {
            DiskIndexError::schema(format!(
                "index id {index_id} out of range ({} fields)",
                self.index_fields.len()
            ))
        })
    }

    /// Index id of the field called `name`.
    pub fn index_field_id(&self, name: &str) -> Option<u32> {
        self.index_fields
            .iter()
            .position(|f| f.name == name)
            .map(|pos| pos as u32)
    }

    /// All index fields in id order.
    pub fn index_fields(&self) -> &[IndexField] {
        &self.index_fields
    }

    pub fn len(&self) -> usize {
        self.index_fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::CollectionType;

    #[test]
    fn test_add_and_lookup() {
        let mut schema = Schema::new();
        assert_eq!(schema.add_index_field(IndexField::new("title")).unwrap(), 0);
        assert_eq!(
            schema
                .add_index_field(IndexField::new("tags").collection_type(CollectionType::Array))
                .unwrap(),
            1
        );

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.index_field_id("tags"), Some(1));
        assert_eq!(schema.index_field(0).unwrap().name, "title");
        assert!(schema.index_field(2).is_err());
        assert!(schema.index_field_id("body").is_none());
    }

    #[test]
    fn test_duplicate_and_empty_names() {
        let mut schema = Schema::new().with_index_field(IndexField::new("title")).unwrap();
        assert!(schema.add_index_field(IndexField::new("title")).is_err());
        assert!(schema.add_index_field(IndexField::new("")).is_err());
    }

    #[test]
    fn test_schema_json() {
        let schema: Schema = serde_json::from_str(
            r#"{"index_fields": [{"name": "body"}, {"name": "tags", "collection_type": "array"}]}"#,
        )
        .unwrap();
        assert_eq!(schema.len(), 2);
        assert!(schema.index_field(1).unwrap().collection_type.has_elements());
    }
}
