use anyhow::{bail, Result};
use censuscraper::{
    config::Config,
    fetch::build_client,
    pipeline::{self, RunOptions},
};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Download census topic tables and write them in wide form, one row per area.
#[derive(Parser, Debug)]
#[command(name = "censuscraper", version, about)]
struct Cli {
    /// YAML config; the built-in Census 2021 topics when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory for outputs.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Nomis geography selector, e.g. TYPE150 for output areas.
    #[arg(long)]
    geography: Option<String>,

    /// Subdirectory name for this geography's outputs.
    #[arg(long)]
    geography_label: Option<String>,

    /// Only run this topic (repeatable).
    #[arg(long = "topic", value_name = "NAME")]
    topics: Vec<String>,

    /// Rebuild topics whose outputs already exist.
    #[arg(long)]
    force: bool,

    /// Print the configured topics and exit.
    #[arg(long)]
    list: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(dir) = &self.out_dir {
            cfg.out_dir = dir.clone();
        }
        if let Some(geo) = &self.geography {
            cfg.geography = geo.clone();
        }
        if let Some(label) = &self.geography_label {
            cfg.geography_label = label.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) config ───────────────────────────────────────────────────
    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config.as_deref())?;
    cli.apply(&mut cfg);
    cfg.validate()?;

    if cli.list {
        for topic in &cfg.topics {
            println!("{:<24} {}", topic.name, topic.dataset);
        }
        return Ok(());
    }
    if cli.geography.is_some() && cli.geography_label.is_none() {
        warn!(
            label = %cfg.geography_label,
            "geography overridden without --geography-label; outputs share the label directory"
        );
    }
    info!(geography = %cfg.geography, topics = cfg.topics.len(), "startup");

    // ─── 3) run ──────────────────────────────────────────────────────
    let client = build_client()?;
    let options = RunOptions {
        topics: cli.topics,
        force: cli.force,
    };
    let manifest = pipeline::run(&client, &cfg, &options).await?;

    if manifest.failed() > 0 {
        bail!(
            "{} of {} topics failed, see manifest",
            manifest.failed(),
            manifest.topics.len()
        );
    }
    info!("all done");
    Ok(())
}
