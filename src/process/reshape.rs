// src/process/reshape.rs

use anyhow::{bail, Result};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::wide::{WideTable, GEOGRAPHY_CODE, GEOGRAPHY_NAME};
use crate::config::{GroupRule, TopicConfig};

/// Apply a topic's drop / group / order / prefix rules, in that order.
pub fn reshape(mut table: WideTable, topic: &TopicConfig) -> Result<WideTable> {
    drop_columns(&mut table, &topic.drop);
    add_groups(&mut table, &topic.groups)?;
    order_columns(&mut table, &topic.order);
    if let Some(prefix) = topic.prefix.as_deref().filter(|p| !p.is_empty()) {
        for col in &mut table.columns {
            *col = format!("{}_{}", prefix, col);
        }
    }
    check_column_names(&table)?;
    Ok(table)
}

/// Value columns must be unique and must not shadow the key columns.
fn check_column_names(table: &WideTable) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::from([GEOGRAPHY_CODE, GEOGRAPHY_NAME]);
    for col in &table.columns {
        if !seen.insert(col.as_str()) {
            if col == GEOGRAPHY_CODE || col == GEOGRAPHY_NAME {
                bail!("column `{}` clashes with a key column; add a prefix or rename rule", col);
            }
            bail!("column `{}` appears more than once", col);
        }
    }
    Ok(())
}

fn drop_columns(table: &mut WideTable, names: &[String]) {
    for name in names {
        if table.remove_column(name) {
            debug!(column = %name, "dropped");
        } else {
            warn!(column = %name, "asked to drop a column that is not present");
        }
    }
}

/// Sum each group's sources into a new column. A group cell is `None` only
/// when every source cell is `None`. Sources are removed after all groups
/// are built, so two groups may share a source.
fn add_groups(table: &mut WideTable, groups: &[GroupRule]) -> Result<()> {
    let mut consumed: Vec<&str> = Vec::new();

    for group in groups {
        if table.column_index(&group.name).is_some() {
            bail!("group `{}` clashes with an existing column", group.name);
        }
        let mut sources = Vec::with_capacity(group.sources.len());
        for src in &group.sources {
            match table.column_index(src) {
                Some(idx) => sources.push(idx),
                None => bail!(
                    "group `{}` needs column `{}`, available: {:?}",
                    group.name,
                    src,
                    table.columns
                ),
            }
        }

        let values = table
            .rows
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .filter_map(|&i| row.values[i])
                    .fold(None, |acc: Option<f64>, v| Some(acc.unwrap_or(0.0) + v))
            })
            .collect();
        table.push_column(group.name.clone(), values);
        debug!(group = %group.name, sources = group.sources.len(), "grouped");

        if !group.keep_sources {
            consumed.extend(group.sources.iter().map(String::as_str));
        }
    }

    let mut removed = HashSet::new();
    for src in consumed {
        if removed.insert(src) {
            table.remove_column(src);
        }
    }
    Ok(())
}

/// Move `order` columns to the front; the rest keep their relative order.
fn order_columns(table: &mut WideTable, order: &[String]) {
    if order.is_empty() {
        return;
    }
    let mut front = Vec::with_capacity(order.len());
    for name in order {
        match table.column_index(name) {
            Some(idx) if !front.contains(&idx) => front.push(idx),
            Some(_) => {}
            None => warn!(column = %name, "ordering names a column that is not present"),
        }
    }
    let rest = (0..table.num_columns()).filter(|i| !front.contains(i));
    let permutation: Vec<usize> = front.iter().copied().chain(rest).collect();
    table.permute_columns(&permutation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::wide::WideRow;

    fn tenure() -> WideTable {
        WideTable {
            columns: vec![
                "owns_outright".into(),
                "owns_with_a_mortgage_or_loan".into(),
                "total".into(),
                "lives_rent_free".into(),
            ],
            rows: vec![
                WideRow {
                    geography_code: "E1".into(),
                    geography_name: "One".into(),
                    values: vec![Some(2.0), Some(3.0), Some(6.0), Some(1.0)],
                },
                WideRow {
                    geography_code: "E2".into(),
                    geography_name: "Two".into(),
                    values: vec![None, None, Some(0.0), None],
                },
            ],
        }
    }

    fn topic() -> TopicConfig {
        TopicConfig {
            name: "tenure".into(),
            dataset: "NM_2072_1".into(),
            category_column: "C2021_TENURE_9_NAME".into(),
            params: Default::default(),
            prefix: None,
            rename: vec![],
            drop: vec![],
            groups: vec![],
            order: vec![],
        }
    }

    fn owned(keep_sources: bool) -> GroupRule {
        GroupRule {
            name: "owned".into(),
            sources: vec!["owns_outright".into(), "owns_with_a_mortgage_or_loan".into()],
            keep_sources,
        }
    }

    #[test]
    fn untouched_without_rules() -> Result<()> {
        assert_eq!(reshape(tenure(), &topic())?, tenure());
        Ok(())
    }

    #[test]
    fn groups_sum_and_consume_sources() -> Result<()> {
        let mut t = topic();
        t.groups = vec![owned(false)];
        let out = reshape(tenure(), &t)?;
        assert_eq!(out.columns, vec!["total", "lives_rent_free", "owned"]);
        assert_eq!(out.value("E1", "owned"), Some(5.0));
        assert_eq!(out.value("E2", "owned"), None);
        Ok(())
    }

    #[test]
    fn groups_can_keep_and_share_sources() -> Result<()> {
        let mut t = topic();
        t.groups = vec![
            owned(false),
            GroupRule {
                name: "outright_or_free".into(),
                sources: vec!["owns_outright".into(), "lives_rent_free".into()],
                keep_sources: true,
            },
        ];
        let out = reshape(tenure(), &t)?;
        assert_eq!(out.value("E1", "outright_or_free"), Some(3.0));
        assert!(out.column_index("owns_outright").is_none());
        assert!(out.column_index("lives_rent_free").is_some());
        Ok(())
    }

    #[test]
    fn group_with_unknown_source_fails() {
        let mut t = topic();
        t.groups = vec![GroupRule {
            name: "g".into(),
            sources: vec!["nope".into()],
            keep_sources: false,
        }];
        let err = reshape(tenure(), &t).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn group_name_clash_fails() {
        let mut t = topic();
        t.groups = vec![GroupRule {
            name: "total".into(),
            sources: vec!["owns_outright".into()],
            keep_sources: true,
        }];
        assert!(reshape(tenure(), &t).is_err());
    }

    #[test]
    fn drop_order_and_prefix() -> Result<()> {
        let mut t = topic();
        t.drop = vec!["lives_rent_free".into(), "absent".into()];
        t.groups = vec![owned(true)];
        t.order = vec!["total".into(), "owned".into(), "missing".into()];
        t.prefix = Some("tenure".into());
        let out = reshape(tenure(), &t)?;
        assert_eq!(
            out.columns,
            vec![
                "tenure_total",
                "tenure_owned",
                "tenure_owns_outright",
                "tenure_owns_with_a_mortgage_or_loan",
            ]
        );
        assert_eq!(out.rows[0].values, vec![Some(6.0), Some(5.0), Some(2.0), Some(3.0)]);
        Ok(())
    }

    #[test]
    fn value_column_may_not_shadow_a_key() {
        let mut table = tenure();
        table.columns[3] = "geography_code".into();
        let err = reshape(table.clone(), &topic()).unwrap_err();
        assert!(err.to_string().contains("key column"));

        // a prefix moves it out of the way
        let mut t = topic();
        t.prefix = Some("tenure".into());
        let out = reshape(table, &t).unwrap();
        assert!(out.column_index("tenure_geography_code").is_some());
    }

    #[test]
    fn duplicate_value_columns_fail() {
        let mut table = tenure();
        table.columns[3] = "total".into();
        let err = reshape(table, &topic()).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
