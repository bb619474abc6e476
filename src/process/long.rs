// src/process/long.rs

use anyhow::{anyhow, bail, Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{trace, warn};

const GEOGRAPHY_CODE_COLUMN: &str = "GEOGRAPHY_CODE";
const GEOGRAPHY_NAME_COLUMN: &str = "GEOGRAPHY_NAME";
const VALUE_COLUMN: &str = "OBS_VALUE";

/// One cell of a census table in long form.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub geography_code: String,
    pub geography_name: String,
    /// Category label exactly as the API spells it, e.g. "Owned: Owns outright".
    pub category: String,
    pub value: f64,
}

/// Rows of a long-form response, possibly stitched together from several pages.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LongTable {
    pub rows: Vec<Observation>,
    /// Records dropped because they had no geography code or no value.
    pub skipped: usize,
}

impl LongTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of CSV records this table was built from, kept or not.
    pub fn records_read(&self) -> usize {
        self.rows.len() + self.skipped
    }

    pub fn append(&mut self, other: LongTable) {
        self.rows.extend(other.rows);
        self.skipped += other.skipped;
    }
}

struct Columns {
    code: usize,
    name: usize,
    category: usize,
    value: usize,
}

impl Columns {
    fn locate(headers: &StringRecord, category_column: &str) -> Result<Self> {
        let find = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim_matches('"').eq_ignore_ascii_case(wanted))
                .ok_or_else(|| {
                    anyhow!(
                        "response has no `{}` column (headers: {:?})",
                        wanted,
                        headers.iter().collect::<Vec<_>>()
                    )
                })
        };
        Ok(Self {
            code: find(GEOGRAPHY_CODE_COLUMN)?,
            name: find(GEOGRAPHY_NAME_COLUMN)?,
            category: find(category_column)?,
            value: find(VALUE_COLUMN)?,
        })
    }
}

/// Parse one long-form CSV page.
///
/// Columns are found by header name, case-insensitively, so the order and any
/// extra columns in the response do not matter.
pub fn parse_long_csv(text: &str, category_column: &str) -> Result<LongTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = rdr.headers().context("reading CSV header")?.clone();
    if headers.is_empty() {
        // empty body: a page past the end
        return Ok(LongTable::default());
    }
    let cols = Columns::locate(&headers, category_column)?;

    let mut table = LongTable::default();
    for result in rdr.records() {
        let record = result.context("malformed CSV record")?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let code = field(cols.code);
        if code.is_empty() {
            warn!(line, "record without geography code, skipping");
            table.skipped += 1;
            continue;
        }

        let raw_value = field(cols.value);
        if raw_value.is_empty() {
            warn!(line, geography = code, "record without value, skipping");
            table.skipped += 1;
            continue;
        }
        let value = match raw_value.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => bail!("line {}: value `{}` is not a number", line, raw_value),
        };

        trace!(line, code, "observation");
        table.rows.push(Observation {
            geography_code: code.to_string(),
            geography_name: field(cols.name).to_string(),
            category: field(cols.category).to_string(),
            value,
        });
    }

    Ok(table)
}
