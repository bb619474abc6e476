// src/fetch/mod.rs

pub mod pages;
pub mod urls;

pub use pages::{get_text, RetryPolicy};
pub use urls::build_page_url;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, info_span, instrument, Instrument};

use crate::config::{Config, TopicConfig};
use crate::process::{parse_long_csv, LongTable};

/// Hard stop for a paging loop that never sees a short page.
const MAX_PAGES: usize = 10_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client shared by every topic of a run.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("building HTTP client")
}

/// Download every page of `topic` and stitch them into one long table.
///
/// Paging stops at the first page holding fewer than `page_size` records.
#[instrument(level = "info", skip(client, config, topic), fields(topic = %topic.name, dataset = %topic.dataset))]
pub async fn fetch_topic(client: &Client, config: &Config, topic: &TopicConfig) -> Result<LongTable> {
    let policy = RetryPolicy::from_config(config);
    let mut table = LongTable::default();
    let mut offset = 0;

    for page in 0..MAX_PAGES {
        let url = build_page_url(config, topic, offset)?;
        let body = get_text(client, &url, policy)
            .instrument(info_span!("page", page, offset))
            .await
            .with_context(|| format!("fetching page {} of {}", page, topic.dataset))?;
        let part = parse_long_csv(&body, &topic.category_column)
            .with_context(|| format!("parsing page {} of {}", page, topic.dataset))?;

        let read = part.records_read();
        debug!(page, offset, records = read, "page fetched");
        table.append(part);

        if read < config.page_size {
            info!(
                rows = table.len(),
                skipped = table.skipped,
                pages = page + 1,
                "topic fetched"
            );
            return Ok(table);
        }
        offset += read;
    }

    bail!(
        "{} still returning full pages after {} requests",
        topic.dataset,
        MAX_PAGES
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HEADER: &str = "\"GEOGRAPHY_CODE\",\"GEOGRAPHY_NAME\",\"C2021_CARS_5_NAME\",\"OBS_VALUE\"\n";

    fn config(base: &str) -> Config {
        Config::from_yaml_str(&format!(
            r#"
api_base: "{}/api/v01/dataset/"
page_size: 2
max_retries: 1
backoff_ms: 1
topics:
  - name: cars
    dataset: NM_2063_1
    category_column: C2021_CARS_5_NAME
"#,
            base
        ))
        .unwrap()
    }

    fn page(rows: &[(&str, &str, u32)]) -> String {
        let mut body = HEADER.to_string();
        for (code, cat, v) in rows {
            body.push_str(&format!("\"{}\",\"Area\",\"{}\",{}\n", code, cat, v));
        }
        body
    }

    async fn mount_page(server: &MockServer, offset: &str, body: String) {
        Mock::given(method("GET"))
            .and(path("/api/v01/dataset/NM_2063_1.data.csv"))
            .and(query_param("recordoffset", offset))
            .and(query_param("recordlimit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn follows_pages_until_short_page() -> Result<()> {
        let server = MockServer::start().await;
        mount_page(&server, "0", page(&[("E1", "No cars", 1), ("E1", "1 car", 2)])).await;
        mount_page(&server, "2", page(&[("E2", "No cars", 3), ("E2", "1 car", 4)])).await;
        mount_page(&server, "4", page(&[("E3", "No cars", 5)])).await;

        let cfg = config(&server.uri());
        let table = fetch_topic(&Client::new(), &cfg, &cfg.topics[0]).await?;

        assert_eq!(table.len(), 5);
        let codes: Vec<_> = table.rows.iter().map(|o| o.geography_code.as_str()).collect();
        assert_eq!(codes, vec!["E1", "E1", "E2", "E2", "E3"]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_page_ends_paging() -> Result<()> {
        let server = MockServer::start().await;
        mount_page(&server, "0", page(&[("E1", "No cars", 1), ("E1", "1 car", 2)])).await;
        mount_page(&server, "2", page(&[])).await;

        let cfg = config(&server.uri());
        let table = fetch_topic(&Client::new(), &cfg, &cfg.topics[0]).await?;
        assert_eq!(table.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn http_failure_names_the_page() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = config(&server.uri());
        let err = fetch_topic(&Client::new(), &cfg, &cfg.topics[0])
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("fetching page 0 of NM_2063_1"));
        Ok(())
    }
}
