// src/store/csv_file.rs

use anyhow::{Context, Result};
use csv::Writer;
use std::{io::BufWriter, path::Path};

use super::{stage, Staged};
use crate::process::WideTable;

/// Write `table` as CSV. Missing cells are empty fields.
pub fn write_csv(table: &WideTable, path: &Path) -> Result<()> {
    stage_csv(table, path)?.commit()
}

pub(crate) fn stage_csv(table: &WideTable, path: &Path) -> Result<Staged> {
    stage(path, |file| {
        let mut w = Writer::from_writer(BufWriter::new(file));
        w.write_record(table.header())
            .context("writing CSV header")?;

        let mut record: Vec<String> = Vec::with_capacity(table.num_columns() + 2);
        for row in &table.rows {
            record.clear();
            record.push(row.geography_code.clone());
            record.push(row.geography_name.clone());
            record.extend(
                row.values
                    .iter()
                    .map(|v| v.map(|x| x.to_string()).unwrap_or_default()),
            );
            w.write_record(&record)
                .with_context(|| format!("writing CSV row {}", row.geography_code))?;
        }
        w.flush().context("flushing CSV")?;
        Ok(())
    })
}
