// src/config/mod.rs

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Built-in topic set used when no config file is given.
const DEFAULT_CONFIG: &str = include_str!("topics.yaml");

/// Environment variable carrying a registered Nomis user id.
pub const API_KEY_ENV: &str = "NOMIS_UID";

/// Most rows Nomis returns per request without a user id. Paging treats a
/// short page as the last one, so `page_size` must not exceed the cap.
pub const ANONYMOUS_ROW_CAP: usize = 25_000;
/// Most rows per request for a registered user id.
pub const REGISTERED_ROW_CAP: usize = 1_000_000;

/// Whole-run settings plus the list of census topics to transform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Nomis geography selector, e.g. `TYPE151` for 2021 LSOAs.
    #[serde(default = "default_geography")]
    pub geography: String,
    /// Directory name the outputs for this geography land in.
    #[serde(default = "default_geography_label")]
    pub geography_label: String,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
}

/// One census table and the column surgery applied to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicConfig {
    pub name: String,
    pub dataset: String,
    /// Column of the long response holding category labels.
    pub category_column: String,
    #[serde(default, deserialize_with = "scalar_params")]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub rename: Vec<RenameRule>,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub groups: Vec<GroupRule>,
    #[serde(default)]
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenameRule {
    pub pattern: String,
    pub replace: String,
}

/// A derived column holding the sum of `sources`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupRule {
    pub name: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub keep_sources: bool,
}

fn default_api_base() -> String {
    "https://www.nomisweb.co.uk/api/v01/dataset/".into()
}
fn default_geography() -> String {
    "TYPE151".into()
}
fn default_geography_label() -> String {
    "lsoa21".into()
}
fn default_out_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_page_size() -> usize {
    25_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_concurrency() -> usize {
    2
}

/// YAML writes `measures: 20100` as a number; the API only sees strings.
fn scalar_params<'de, D>(d: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(d)?;
    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(de::Error::custom(format!(
                        "param `{}` must be a scalar, got {:?}",
                        key, other
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}

impl Config {
    /// Parse a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing config YAML")
    }

    /// The built-in Census 2021 topic set.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(DEFAULT_CONFIG).context("parsing built-in topics")
    }

    /// Load `path` if given, else the built-in set, then pick up the API key
    /// from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::from_yaml_str(&text)
                    .with_context(|| format!("loading config {}", p.display()))?
            }
            None => Self::builtin()?,
        };
        cfg.apply_api_key(std::env::var(API_KEY_ENV).ok());
        Ok(cfg)
    }

    /// Take a key read from the environment; blank values leave the config as is.
    pub fn apply_api_key(&mut self, key: Option<String>) {
        if let Some(key) = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
            debug!("using API key from {}", API_KEY_ENV);
            self.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.topics.is_empty() {
            bail!("config defines no topics");
        }
        if self.page_size == 0 {
            bail!("page_size must be greater than zero");
        }
        let cap = self.row_cap();
        if self.page_size > cap {
            bail!(
                "page_size {} is above the {} rows the API returns per request{}",
                self.page_size,
                cap,
                if self.api_key.is_none() {
                    " without a user id"
                } else {
                    ""
                }
            );
        }
        if self.concurrency == 0 {
            bail!("concurrency must be greater than zero");
        }
        if self.geography.trim().is_empty() {
            bail!("geography must not be empty");
        }
        if !is_identifier(&self.geography_label) {
            bail!(
                "geography_label `{}` must be lowercase letters, digits or `_`",
                self.geography_label
            );
        }

        let mut seen = HashSet::new();
        for topic in &self.topics {
            topic
                .validate()
                .with_context(|| format!("topic `{}`", topic.name))?;
            if !seen.insert(topic.name.as_str()) {
                bail!("topic `{}` is defined more than once", topic.name);
            }
        }
        Ok(())
    }

    /// Topics named in `names`, in config order; every topic when empty.
    pub fn select_topics(&self, names: &[String]) -> Result<Vec<TopicConfig>> {
        if names.is_empty() {
            return Ok(self.topics.clone());
        }
        for name in names {
            if !self.topics.iter().any(|t| &t.name == name) {
                bail!("unknown topic `{}`", name);
            }
        }
        Ok(self
            .topics
            .iter()
            .filter(|t| names.contains(&t.name))
            .cloned()
            .collect())
    }

    /// Largest page the API will serve with the current credentials.
    pub fn row_cap(&self) -> usize {
        if self.api_key.is_some() {
            REGISTERED_ROW_CAP
        } else {
            ANONYMOUS_ROW_CAP
        }
    }

    /// Where this geography's files are written.
    pub fn output_dir(&self) -> PathBuf {
        self.out_dir.join(&self.geography_label)
    }
}

impl TopicConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.name) {
            bail!("name must be non-empty lowercase letters, digits or `_`");
        }
        if self.dataset.trim().is_empty() {
            bail!("dataset must not be empty");
        }
        if self.category_column.trim().is_empty() {
            bail!("category_column must not be empty");
        }
        for rule in &self.rename {
            Regex::new(&rule.pattern)
                .with_context(|| format!("invalid rename pattern `{}`", rule.pattern))?;
        }
        for group in &self.groups {
            if group.name.is_empty() || group.sources.is_empty() {
                bail!("group `{}` needs a name and at least one source", group.name);
            }
            let mut sources = HashSet::new();
            if let Some(dup) = group.sources.iter().map(String::as_str).find(|s| !sources.insert(*s)) {
                bail!("group `{}` lists source `{}` twice", group.name, dup);
            }
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
