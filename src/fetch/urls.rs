// src/fetch/urls.rs

use anyhow::{Context, Result};
use url::Url;

use crate::config::{Config, TopicConfig};

/// URL of one page of `topic` in long CSV form.
///
/// Query order is fixed: `date`, `geography`, `select`, topic params,
/// `recordoffset`, `recordlimit`, then `uid` when an API key is set. A topic
/// may override `date` through its params.
pub fn build_page_url(config: &Config, topic: &TopicConfig, offset: usize) -> Result<Url> {
    let mut base = config.api_base.clone();
    if !base.ends_with('/') {
        base.push('/');
    }
    let base = Url::parse(&base).with_context(|| format!("parsing api_base {}", base))?;
    let mut url = base
        .join(&format!("{}.data.csv", topic.dataset))
        .with_context(|| format!("joining dataset {} onto {}", topic.dataset, base))?;

    {
        let mut q = url.query_pairs_mut();
        if !topic.params.contains_key("date") {
            q.append_pair("date", "latest");
        }
        q.append_pair("geography", &config.geography);
        q.append_pair(
            "select",
            &format!(
                "geography_code,geography_name,{},obs_value",
                topic.category_column.to_lowercase()
            ),
        );
        for (key, value) in &topic.params {
            q.append_pair(key, value);
        }
        q.append_pair("recordoffset", &offset.to_string());
        q.append_pair("recordlimit", &config.page_size.to_string());
        if let Some(key) = &config.api_key {
            q.append_pair("uid", key);
        }
    }

    Ok(url)
}
