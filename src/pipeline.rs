// src/pipeline.rs

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::{stream::FuturesUnordered, StreamExt};
use reqwest::Client;
use std::{fs, path::Path};
use tokio::time::Instant;
use tracing::{error, info, instrument};

use crate::{
    config::{Config, TopicConfig},
    fetch::fetch_topic,
    process::transform,
    store::{write_topic, Manifest, TopicEntry, TopicOutputs, TopicStatus},
};

/// Per-run switches that do not belong in the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only these topics; all of them when empty.
    pub topics: Vec<String>,
    /// Rebuild outputs that already exist.
    pub force: bool,
}

/// Fetch, reshape and write every selected topic, then write the manifest.
///
/// A failing topic does not stop the others; its error is recorded in the
/// returned manifest.
#[instrument(level = "info", skip_all, fields(geography = %config.geography))]
pub async fn run(client: &Client, config: &Config, options: &RunOptions) -> Result<Manifest> {
    config.validate()?;
    let topics = config.select_topics(&options.topics)?;
    let out_dir = config.output_dir();
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    info!(topics = topics.len(), out = %out_dir.display(), "starting run");

    let mut tasks = FuturesUnordered::new();
    let mut entries: Vec<(usize, TopicEntry)> = Vec::with_capacity(topics.len());

    for (idx, topic) in topics.into_iter().enumerate() {
        let out_dir = out_dir.as_path();
        tasks.push(async move { (idx, run_topic(client, config, topic, out_dir, options.force).await) });

        // throttle concurrency
        if tasks.len() >= config.concurrency {
            if let Some(done) = tasks.next().await {
                entries.push(done);
            }
        }
    }
    while let Some(done) = tasks.next().await {
        entries.push(done);
    }
    entries.sort_by_key(|(idx, _)| *idx);

    let manifest = Manifest {
        generated_at: Utc::now(),
        geography: config.geography.clone(),
        geography_label: config.geography_label.clone(),
        topics: entries.into_iter().map(|(_, e)| e).collect(),
    };
    let path = manifest.write(&out_dir)?;
    info!(
        written = manifest.count(TopicStatus::Written),
        skipped = manifest.count(TopicStatus::Skipped),
        failed = manifest.failed(),
        manifest = %path.display(),
        "run finished"
    );
    Ok(manifest)
}

async fn run_topic(
    client: &Client,
    config: &Config,
    topic: TopicConfig,
    out_dir: &Path,
    force: bool,
) -> TopicEntry {
    let outputs = TopicOutputs::new(out_dir, &topic.name);
    let mut entry = TopicEntry {
        name: topic.name.clone(),
        dataset: topic.dataset.clone(),
        status: TopicStatus::Written,
        rows: None,
        columns: None,
        error: None,
        csv: outputs.csv.clone(),
        parquet: outputs.parquet.clone(),
    };

    if !force && outputs.exist() {
        info!(topic = %entry.name, "outputs exist, skipping");
        entry.status = TopicStatus::Skipped;
        return entry;
    }

    let start = Instant::now();
    match process_topic(client, config, topic, outputs).await {
        Ok((rows, columns)) => {
            info!(topic = %entry.name, rows, columns, elapsed = ?start.elapsed(), "topic written");
            entry.rows = Some(rows);
            entry.columns = Some(columns);
        }
        Err(e) => {
            let msg = format!("{:#}", e);
            error!(topic = %entry.name, error = %msg, "topic failed");
            entry.status = TopicStatus::Failed;
            entry.error = Some(msg);
        }
    }
    entry
}

async fn process_topic(
    client: &Client,
    config: &Config,
    topic: TopicConfig,
    outputs: TopicOutputs,
) -> Result<(usize, usize)> {
    let long = fetch_topic(client, config, &topic).await?;
    if long.is_empty() {
        bail!("{} returned no observations", topic.dataset);
    }

    // offload the reshape and file writes to the blocking pool
    tokio::task::spawn_blocking(move || {
        let wide = transform(&long, &topic)?;
        write_topic(&wide, &outputs)?;
        Ok::<_, anyhow::Error>((wide.num_rows(), wide.num_columns()))
    })
    .await
    .context("transform task panicked")?
}
