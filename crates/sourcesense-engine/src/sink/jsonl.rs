//! JSON Lines batch writer, the fallback format

use super::{BatchFormat, BatchWriter, SinkError};
use sourcesense_core::Entity;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One JSON object per line
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlBatchWriter;

impl BatchWriter for JsonlBatchWriter {
    fn format(&self) -> BatchFormat {
        BatchFormat::Jsonl
    }

    fn write(&self, path: &Path, entities: &[Entity]) -> Result<(), SinkError> {
        let file = File::create(path).map_err(|e| SinkError::io(path, e))?;
        let mut out = BufWriter::new(file);

        for entity in entities {
            serde_json::to_writer(&mut out, entity).map_err(|e| SinkError::encode(path, e))?;
            out.write_all(b"\n").map_err(|e| SinkError::io(path, e))?;
        }

        out.flush().map_err(|e| SinkError::io(path, e))
    }
}
