// src/process/naming.rs

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::RenameRule;

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex should compile"));

const UNNAMED: &str = "unnamed";

/// Lowercase `raw` and collapse every run of other characters into `_`.
///
/// "Owned: Owns with a mortgage or loan" → "owned_owns_with_a_mortgage_or_loan"
pub fn clean_column_name(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let snake = NON_ALNUM.replace_all(&lower, "_");
    let trimmed = snake.trim_matches('_');
    if trimmed.is_empty() {
        UNNAMED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Turns API category labels into column names for one topic.
#[derive(Debug, Clone)]
pub struct ColumnNamer {
    rules: Vec<(Regex, String)>,
}

impl ColumnNamer {
    pub fn new(rules: &[RenameRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|r| {
                Regex::new(&r.pattern)
                    .map(|re| (re, r.replace.clone()))
                    .with_context(|| format!("compiling rename pattern `{}`", r.pattern))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Clean `label`, then run every rename rule over the result in order.
    pub fn name(&self, label: &str) -> String {
        let mut name = clean_column_name(label);
        for (re, replace) in &self.rules {
            name = re.replace_all(&name, replace.as_str()).into_owned();
        }
        if name.is_empty() {
            UNNAMED.to_string()
        } else {
            name
        }
    }
}
