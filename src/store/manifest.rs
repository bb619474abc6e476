// src/store/manifest.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

use super::write_atomically;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Written,
    /// Outputs already existed and the run was not forced.
    Skipped,
    Failed,
}

/// What happened to one topic during a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicEntry {
    pub name: String,
    pub dataset: String,
    pub status: TopicStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub csv: PathBuf,
    pub parquet: PathBuf,
}

/// Summary of a run, written next to the outputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub generated_at: DateTime<Utc>,
    pub geography: String,
    pub geography_label: String,
    pub topics: Vec<TopicEntry>,
}

impl Manifest {
    pub fn failed(&self) -> usize {
        self.count(TopicStatus::Failed)
    }

    pub fn count(&self, status: TopicStatus) -> usize {
        self.topics.iter().filter(|t| t.status == status).count()
    }

    /// Pretty-print to `<dir>/manifest.json`, replacing any previous one.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        write_atomically(&path, |mut file| {
            serde_json::to_writer_pretty(&mut file, self).context("serializing manifest")?;
            file.write_all(b"\n")?;
            Ok(())
        })?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parsing {}", path.display()))
    }
}
