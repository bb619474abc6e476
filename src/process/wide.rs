// src/process/wide.rs

/// Key columns leading every wide table.
pub const GEOGRAPHY_CODE: &str = "geography_code";
pub const GEOGRAPHY_NAME: &str = "geography_name";

#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub geography_code: String,
    pub geography_name: String,
    /// One entry per `WideTable::columns`; `None` where the API had no cell.
    pub values: Vec<Option<f64>>,
}

/// A topic in wide form: one row per geography, one column per category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    pub columns: Vec<String>,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Full header: key columns followed by value columns.
    pub fn header(&self) -> Vec<&str> {
        [GEOGRAPHY_CODE, GEOGRAPHY_NAME]
            .into_iter()
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    /// Look up a cell by geography code and column name.
    pub fn value(&self, geography_code: &str, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows
            .iter()
            .find(|r| r.geography_code == geography_code)
            .and_then(|r| r.values[idx])
    }

    pub fn column_values(&self, idx: usize) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.values[idx]).collect()
    }

    pub fn push_column(&mut self, name: String, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(name);
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.values.push(v);
        }
    }

    /// Remove `name`; returns whether it was present.
    pub fn remove_column(&mut self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.columns.remove(idx);
                for row in &mut self.rows {
                    row.values.remove(idx);
                }
                true
            }
            None => false,
        }
    }

    /// Rearrange columns so that position `i` holds old column `order[i]`.
    /// `order` must be a permutation of `0..num_columns()`.
    pub fn permute_columns(&mut self, order: &[usize]) {
        debug_assert_eq!(order.len(), self.columns.len());
        self.columns = order.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            row.values = order.iter().map(|&i| row.values[i]).collect();
        }
    }
}
