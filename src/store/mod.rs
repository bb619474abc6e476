// src/store/mod.rs

pub mod csv_file;
pub mod manifest;
pub mod parquet_file;

pub use csv_file::write_csv;
use csv_file::stage_csv;
pub use manifest::{Manifest, TopicEntry, TopicStatus, MANIFEST_FILE};
pub use parquet_file::write_parquet;
use parquet_file::stage_parquet;

use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

use crate::process::WideTable;

/// The two files a topic produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicOutputs {
    pub csv: PathBuf,
    pub parquet: PathBuf,
}

impl TopicOutputs {
    pub fn new(dir: &Path, topic: &str) -> Self {
        Self {
            csv: dir.join(format!("{}.csv", topic)),
            parquet: dir.join(format!("{}.parquet", topic)),
        }
    }

    /// True only when both files are present.
    pub fn exist(&self) -> bool {
        self.csv.is_file() && self.parquet.is_file()
    }
}

/// Write both outputs for one topic as a pair.
///
/// Both files are staged before either is renamed into place. If the second
/// rename fails the new CSV is removed, so `TopicOutputs::exist` never sees a
/// CSV from this write next to a Parquet file from an older one.
#[instrument(level = "info", skip(table, outputs), fields(csv = %outputs.csv.display()))]
pub fn write_topic(table: &WideTable, outputs: &TopicOutputs) -> Result<()> {
    let csv = stage_csv(table, &outputs.csv)?;
    let parquet = match stage_parquet(table, &outputs.parquet) {
        Ok(staged) => staged,
        Err(e) => {
            csv.discard();
            return Err(e);
        }
    };

    if let Err(e) = csv.commit() {
        parquet.discard();
        return Err(e);
    }
    if let Err(e) = parquet.commit() {
        let _ = fs::remove_file(&outputs.csv);
        return Err(e.context("CSV removed so the topic is rebuilt next run"));
    }

    debug!(rows = table.num_rows(), columns = table.num_columns(), "outputs written");
    Ok(())
}

/// A fully written `.<name>.tmp` waiting to be renamed over its final path.
#[derive(Debug)]
#[must_use = "a staged file is lost unless committed"]
pub(crate) struct Staged {
    tmp: PathBuf,
    path: PathBuf,
}

impl Staged {
    pub(crate) fn commit(self) -> Result<()> {
        fs::rename(&self.tmp, &self.path).with_context(|| {
            format!("renaming {} -> {}", self.tmp.display(), self.path.display())
        })
    }

    pub(crate) fn discard(self) {
        let _ = fs::remove_file(&self.tmp);
    }
}

/// Run `write` against `.<name>.tmp` beside `path`. The final name is not
/// touched until the returned `Staged` is committed.
pub(crate) fn stage<F>(path: &Path, write: F) -> Result<Staged>
where
    F: FnOnce(File) -> Result<()>,
{
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?
        .to_string_lossy();
    let tmp = dir.join(format!(".{}.tmp", name));

    let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    if let Err(e) = write(file) {
        let _ = fs::remove_file(&tmp);
        return Err(e.context(format!("writing {}", path.display())));
    }
    Ok(Staged {
        tmp,
        path: path.to_path_buf(),
    })
}

/// Stage and commit in one go, for files that stand alone.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(File) -> Result<()>,
{
    stage(path, write)?.commit()
}
