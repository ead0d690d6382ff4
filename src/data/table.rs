use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::model::Dataset;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Arrow view
// ---------------------------------------------------------------------------

/// One non-nullable `Float64` column per label, in label order. Header
/// entries ride along as schema metadata.
pub(crate) fn record_batch(dataset: &Dataset) -> Result<RecordBatch> {
    let fields: Vec<Field> = dataset
        .labels()
        .iter()
        .map(|label| Field::new(label, DataType::Float64, false))
        .collect();

    let metadata: HashMap<String, String> = dataset
        .headers()
        .iter()
        .map(|(tag, value)| (tag.to_string(), value.to_string()))
        .collect();

    let columns: Vec<ArrayRef> = (0..dataset.ncol())
        .map(|c| {
            let values = dataset.column_at(c).unwrap_or(&[]);
            Arc::new(Float64Array::from(values.to_vec())) as ArrayRef
        })
        .collect();

    let schema = Arc::new(Schema::new_with_metadata(fields, metadata));
    Ok(RecordBatch::try_new(schema, columns)?)
}

// ---------------------------------------------------------------------------
// Tabular writers
// ---------------------------------------------------------------------------

impl Dataset {
    /// First `rows` particles as a pretty-printed table.
    pub fn preview(&self, rows: usize) -> Result<String> {
        let table = self.table()?;
        let head = table.slice(0, rows.min(table.num_rows()));
        Ok(arrow::util::pretty::pretty_format_batches(&[head])?.to_string())
    }

    /// Write the tabular view to a Parquet file, replacing it if present.
    pub fn write_parquet(&self, path: &Path) -> Result<()> {
        let table = self.table()?;
        let file = std::fs::File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, table.schema(), None)?;
        writer.write(table)?;
        writer.close()?;
        log::info!("wrote {} rows to {}", table.num_rows(), path.display());
        Ok(())
    }

    /// Write the columns as CSV with a label header row. Header entries are
    /// not part of the CSV.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.labels())?;

        let columns: Vec<&[f64]> = (0..self.ncol())
            .filter_map(|c| self.column_at(c))
            .collect();
        for row in 0..self.npart() {
            writer.write_record(columns.iter().map(|col| col[row].to_string()))?;
        }
        writer.flush()?;
        log::info!("wrote {} rows to {}", self.npart(), path.display());
        Ok(())
    }
}
