//! Parquet batch writer
//!
//! One row per entity. Attributes are heterogeneous across types, so they
//! are stored as a JSON object column.

use super::{BatchFormat, BatchWriter, SinkError};
use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};
use ::parquet::arrow::ArrowWriter;
use ::parquet::basic::Compression;
use ::parquet::file::properties::WriterProperties;
use sourcesense_core::Entity;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Arrow schema of an entity batch
pub fn entity_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("typeName", DataType::Utf8, false),
        Field::new("qualifiedName", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("parentQualifiedName", DataType::Utf8, true),
        Field::new("attributes", DataType::Utf8, false),
    ]))
}

/// Build a record batch from entities
pub fn to_record_batch(entities: &[Entity]) -> Result<RecordBatch, ArrowError> {
    let attributes = entities
        .iter()
        .map(|e| serde_json::to_string(&e.attributes))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ArrowError::JsonError(e.to_string()))?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            entities.iter().map(|e| e.kind.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            entities.iter().map(|e| e.qualified_name.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            entities.iter().map(|e| e.name.as_str()),
        )),
        Arc::new(StringArray::from(
            entities
                .iter()
                .map(|e| e.parent_qualified_name.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(attributes)),
    ];

    RecordBatch::try_new(entity_schema(), columns)
}

/// Snappy-compressed Parquet
#[derive(Debug, Clone)]
pub struct ParquetBatchWriter {
    compression: Compression,
}

impl ParquetBatchWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
        }
    }
}

impl Default for ParquetBatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchWriter for ParquetBatchWriter {
    fn format(&self) -> BatchFormat {
        BatchFormat::Parquet
    }

    fn write(&self, path: &Path, entities: &[Entity]) -> Result<(), SinkError> {
        let batch = to_record_batch(entities).map_err(|e| SinkError::encode(path, e))?;

        let file = File::create(path).map_err(|e| SinkError::io(path, e))?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .build();

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .map_err(|e| SinkError::encode(path, e))?;
        writer
            .write(&batch)
            .map_err(|e| SinkError::encode(path, e))?;
        writer.close().map_err(|e| SinkError::encode(path, e))?;
        Ok(())
    }
}
