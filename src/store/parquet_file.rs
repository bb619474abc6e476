// src/store/parquet_file.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::sync::Arc;
use std::path::Path;

use super::{stage, Staged};
use crate::process::{WideTable, GEOGRAPHY_CODE, GEOGRAPHY_NAME};

/// Key columns are non-null strings; every value column is nullable Float64.
pub fn arrow_schema(table: &WideTable) -> Arc<Schema> {
    let fields: Vec<Field> = [
        Field::new(GEOGRAPHY_CODE, DataType::Utf8, false),
        Field::new(GEOGRAPHY_NAME, DataType::Utf8, false),
    ]
    .into_iter()
    .chain(
        table
            .columns
            .iter()
            .map(|c| Field::new(c, DataType::Float64, /* nullable = */ true)),
    )
    .collect();
    Arc::new(Schema::new(fields))
}

pub fn to_record_batch(table: &WideTable) -> Result<RecordBatch> {
    let schema = arrow_schema(table);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.num_columns() + 2);
    arrays.push(Arc::new(StringArray::from_iter_values(
        table.rows.iter().map(|r| r.geography_code.as_str()),
    )));
    arrays.push(Arc::new(StringArray::from_iter_values(
        table.rows.iter().map(|r| r.geography_name.as_str()),
    )));
    for idx in 0..table.num_columns() {
        arrays.push(Arc::new(Float64Array::from(table.column_values(idx))));
    }
    RecordBatch::try_new(schema, arrays).context("building record batch")
}

/// Write `table` as a single-batch, Snappy-compressed Parquet file.
pub fn write_parquet(table: &WideTable, path: &Path) -> Result<()> {
    stage_parquet(table, path)?.commit()
}

pub(crate) fn stage_parquet(table: &WideTable, path: &Path) -> Result<Staged> {
    let batch = to_record_batch(table)?;
    stage(path, |file| {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .context("creating Arrow writer")?;
        writer.write(&batch).context("writing parquet batch")?;
        writer.close().context("closing parquet writer")?;
        Ok(())
    })
}
