// src/process/pivot.rs

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::{
    long::LongTable,
    naming::ColumnNamer,
    wide::{WideRow, WideTable},
};

/// Spread a long table into one row per geography.
///
/// Columns appear in the order their categories are first seen. Categories
/// whose names collapse to the same column are summed. Rows come out sorted
/// by geography code.
pub fn pivot(long: &LongTable, namer: &ColumnNamer) -> WideTable {
    let mut columns: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut by_label: HashMap<&str, usize> = HashMap::new();
    let mut rows: BTreeMap<&str, (&str, Vec<Option<f64>>)> = BTreeMap::new();

    for obs in &long.rows {
        let idx = match by_label.get(obs.category.as_str()) {
            Some(&idx) => idx,
            None => {
                let name = namer.name(&obs.category);
                let idx = match by_name.get(&name) {
                    Some(&idx) => {
                        debug!(label = %obs.category, column = %name, "merging category into existing column");
                        idx
                    }
                    None => {
                        columns.push(name.clone());
                        by_name.insert(name, columns.len() - 1);
                        columns.len() - 1
                    }
                };
                by_label.insert(obs.category.as_str(), idx);
                idx
            }
        };

        let (name, values) = rows
            .entry(obs.geography_code.as_str())
            .or_insert_with(|| (obs.geography_name.as_str(), Vec::new()));
        if *name != obs.geography_name {
            warn!(
                code = %obs.geography_code,
                kept = %name,
                seen = %obs.geography_name,
                "geography has more than one name"
            );
        }
        if values.len() <= idx {
            values.resize(idx + 1, None);
        }
        values[idx] = Some(values[idx].unwrap_or(0.0) + obs.value);
    }

    let width = columns.len();
    let rows = rows
        .into_iter()
        .map(|(code, (name, mut values))| {
            values.resize(width, None);
            WideRow {
                geography_code: code.to_string(),
                geography_name: name.to_string(),
                values,
            }
        })
        .collect::<Vec<_>>();

    debug!(rows = rows.len(), columns = width, "pivoted");
    WideTable { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenameRule;
    use crate::process::long::Observation;

    fn obs(code: &str, category: &str, value: f64) -> Observation {
        Observation {
            geography_code: code.into(),
            geography_name: format!("Area {}", code),
            category: category.into(),
            value,
        }
    }

    #[test]
    fn spreads_categories_into_columns() {
        let long = LongTable {
            rows: vec![
                obs("E2", "Total: All households", 10.0),
                obs("E2", "Owned: Owns outright", 4.0),
                obs("E1", "Total: All households", 7.0),
                obs("E1", "Owned: Owns outright", 2.0),
            ],
            skipped: 0,
        };
        let namer = ColumnNamer::new(&[]).unwrap();
        let wide = pivot(&long, &namer);

        assert_eq!(wide.columns, vec!["total_all_households", "owned_owns_outright"]);
        let codes: Vec<_> = wide.rows.iter().map(|r| r.geography_code.as_str()).collect();
        assert_eq!(codes, vec!["E1", "E2"]);
        assert_eq!(wide.rows[0].geography_name, "Area E1");
        assert_eq!(wide.value("E1", "owned_owns_outright"), Some(2.0));
        assert_eq!(wide.value("E2", "total_all_households"), Some(10.0));
    }

    #[test]
    fn missing_cells_are_none() {
        let long = LongTable {
            rows: vec![obs("E1", "A", 1.0), obs("E2", "B", 2.0)],
            skipped: 0,
        };
        let wide = pivot(&long, &ColumnNamer::new(&[]).unwrap());
        assert_eq!(wide.rows[0].values, vec![Some(1.0), None]);
        assert_eq!(wide.rows[1].values, vec![None, Some(2.0)]);
    }

    #[test]
    fn labels_mapping_to_one_column_are_summed() {
        let namer = ColumnNamer::new(&[RenameRule {
            pattern: "^social_rented_.*$".into(),
            replace: "social_rented".into(),
        }])
        .unwrap();
        let long = LongTable {
            rows: vec![
                obs("E1", "Social rented: Rents from council or Local Authority", 3.0),
                obs("E1", "Social rented: Other social rented", 5.0),
                obs("E1", "Lives rent free", 1.0),
            ],
            skipped: 0,
        };
        let wide = pivot(&long, &namer);
        assert_eq!(wide.columns, vec!["social_rented", "lives_rent_free"]);
        assert_eq!(wide.value("E1", "social_rented"), Some(8.0));
    }

    #[test]
    fn first_geography_name_wins() {
        let mut renamed = obs("E1", "B", 2.0);
        renamed.geography_name = "Renamed area".into();
        let long = LongTable {
            rows: vec![obs("E1", "A", 1.0), renamed],
            skipped: 0,
        };
        let wide = pivot(&long, &ColumnNamer::new(&[]).unwrap());
        assert_eq!(wide.num_rows(), 1);
        assert_eq!(wide.rows[0].geography_name, "Area E1");
        assert_eq!(wide.rows[0].values, vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn empty_input_gives_empty_table() {
        let wide = pivot(&LongTable::default(), &ColumnNamer::new(&[]).unwrap());
        assert_eq!(wide.num_rows(), 0);
        assert_eq!(wide.num_columns(), 0);
    }
}
