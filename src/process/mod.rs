// src/process/mod.rs

pub mod long;
pub mod naming;
pub mod pivot;
pub mod reshape;
pub mod wide;

pub use long::{parse_long_csv, LongTable, Observation};
pub use naming::{clean_column_name, ColumnNamer};
pub use pivot::pivot;
pub use reshape::reshape;
pub use wide::{WideRow, WideTable, GEOGRAPHY_CODE, GEOGRAPHY_NAME};

use anyhow::{Context, Result};
use tracing::instrument;

use crate::config::TopicConfig;

/// Long rows → wide table with the topic's naming and reshape rules applied.
#[instrument(level = "info", skip(long, topic), fields(topic = %topic.name, rows = long.len()))]
pub fn transform(long: &LongTable, topic: &TopicConfig) -> Result<WideTable> {
    let namer = ColumnNamer::new(&topic.rename)?;
    let wide = pivot(long, &namer);
    reshape(wide, topic).with_context(|| format!("reshaping topic `{}`", topic.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const AGE_PAGE: &str = "GEOGRAPHY_CODE,GEOGRAPHY_NAME,C2021_AGE_19_NAME,OBS_VALUE\n\
        E01000001,City of London 001A,Total,100\n\
        E01000001,City of London 001A,Aged 4 years and under,5\n\
        E01000001,City of London 001A,Aged 5 to 9 years,6\n\
        E01000001,City of London 001A,Aged 10 to 14 years,7\n\
        E01000001,City of London 001A,Aged 65 to 69 years,8\n\
        E01000001,City of London 001A,Aged 70 to 74 years,9\n\
        E01000001,City of London 001A,Aged 75 to 79 years,1\n\
        E01000001,City of London 001A,Aged 80 to 84 years,2\n\
        E01000001,City of London 001A,Aged 85 years and over,3\n\
        E01000001,City of London 001A,Aged 15 to 19 years,59\n";

    #[test]
    fn builtin_age_topic_end_to_end() -> Result<()> {
        let cfg = Config::builtin()?;
        let age = cfg.select_topics(&["age".to_string()])?.remove(0);

        let long = parse_long_csv(AGE_PAGE, &age.category_column)?;
        let wide = transform(&long, &age)?;

        assert_eq!(
            &wide.columns[..4],
            &["age_total", "age_under_15", "age_over_64", "age_0_4"]
        );
        assert_eq!(wide.value("E01000001", "age_under_15"), Some(18.0));
        assert_eq!(wide.value("E01000001", "age_over_64"), Some(23.0));
        assert_eq!(wide.value("E01000001", "age_85_plus"), Some(3.0));
        assert_eq!(wide.value("E01000001", "age_15_19"), Some(59.0));
        Ok(())
    }

    #[test]
    fn category_cleaning_to_a_key_name_fails_the_topic() -> Result<()> {
        let page = "GEOGRAPHY_CODE,GEOGRAPHY_NAME,CAT,OBS_VALUE\n\
                    E1,Area,Geography code,5\n";
        let mut topic = Config::builtin()?.topics.remove(0);
        topic.category_column = "CAT".into();
        topic.prefix = None;
        topic.rename.clear();
        topic.order.clear();
        topic.drop.clear();
        topic.groups.clear();

        let long = parse_long_csv(page, "CAT")?;
        let err = transform(&long, &topic).unwrap_err();
        assert!(format!("{:#}", err).contains("key column"));
        Ok(())
    }
}
