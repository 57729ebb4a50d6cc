use serde::{Deserialize, Serialize};
use std::result::Result as StdResult;
use time::macros::format_description;
use time::Date;

/// One processor as scraped from cpubenchmark.net.
///
/// The serde field names double as the CSV header, so a record written with
/// [`crate::report::write_csv`] reads back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorRecord {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    /// The multi thread CPU Mark, which is what the site ranks by
    #[serde(rename = "Multi Thread")]
    pub score: u32,
    #[serde(rename = "Single Thread")]
    pub single_thread: Option<u32>,
    /// Position on the chart listing the record came from
    #[serde(rename = "Rank")]
    pub rank: Option<u32>,
    #[serde(rename = "Price")]
    pub price: Option<f64>,
    #[serde(rename = "TDP")]
    pub tdp: Option<u32>,
    #[serde(rename = "Cores")]
    pub cores: Option<u16>,
    #[serde(rename = "Threads")]
    pub threads: Option<u16>,
    #[serde(rename = "# Samples")]
    pub samples: Option<u32>,
    #[serde(rename = "First Seen")]
    pub first_seen: Option<String>,
    #[serde(rename = "Link")]
    pub link: Option<String>,
    #[serde(
        rename = "Updated",
        serialize_with = "serialize_date",
        deserialize_with = "deserialize_date"
    )]
    pub updated: Option<Date>,
}

impl ProcessorRecord {
    pub fn new(name: impl Into<String>, score: u32) -> Self {
        Self {
            id: None,
            name: name.into(),
            score,
            single_thread: None,
            rank: None,
            price: None,
            tdp: None,
            cores: None,
            threads: None,
            samples: None,
            first_seen: None,
            link: None,
            updated: None,
        }
    }

    /// "4 (8)" style cores and threads, like the site shows them
    pub fn cores_display(&self) -> Option<String> {
        match (self.cores, self.threads) {
            (Some(c), Some(t)) => Some(format!("{} ({})", c, t)),
            (Some(c), None) => Some(c.to_string()),
            _ => None,
        }
    }
}

fn serialize_date<S>(date: &Option<Date>, serializer: S) -> StdResult<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let format = format_description!("[year]-[month]-[day]");
    match date {
        Some(date) => {
            let s = date.format(&format).map_err(serde::ser::Error::custom)?;
            serializer.serialize_some(&s)
        }
        None => serializer.serialize_none(),
    }
}

fn deserialize_date<'de, D>(deserializer: D) -> StdResult<Option<Date>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let format = format_description!("[year]-[month]-[day]");
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.trim().is_empty() => Date::parse(s.trim(), &format)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
