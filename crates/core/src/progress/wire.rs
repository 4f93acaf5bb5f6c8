//! On-disk shapes of the progress document.
//!
//! The JSON layout predates the typed model: `current` (and a lease's
//! `current_task`) is an object of five nullable fields, timestamps may be
//! RFC 3339 or `YYYY-MM-DD HH:MM:SS`, and `doc_number` has been seen both as
//! a number and as a string. Everything here reads those shapes leniently
//! and writes the canonical one.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use super::types::TaskKey;

const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, LEGACY_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Required timestamp. Unreadable values decay to the Unix epoch, which any
/// lease check treats as long expired.
pub(crate) mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(match raw.as_deref().and_then(parse_timestamp) {
            Some(ts) => ts,
            None => {
                warn!("Unreadable timestamp {:?} in progress record, treating as expired", raw);
                DateTime::<Utc>::default()
            }
        })
    }

    /// Optional timestamp (`null` or empty string means unset).
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => s.serialize_some(&format_timestamp(ts)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(text) => {
                    let parsed = parse_timestamp(text);
                    if parsed.is_none() {
                        warn!("Unreadable last_run {:?} in progress record, dropping it", text);
                    }
                    Ok(parsed)
                }
            }
        }
    }
}

/// `Option<TaskKey>` stored as the five-field object.
pub(crate) mod task_fields {
    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct TaskFields {
        #[serde(default)]
        year: Option<String>,
        #[serde(default)]
        district: Option<String>,
        #[serde(default)]
        taluka: Option<String>,
        #[serde(default)]
        village: Option<String>,
        #[serde(default, deserialize_with = "lenient_doc_number")]
        doc_number: Option<u32>,
    }

    pub fn serialize<S: Serializer>(task: &Option<TaskKey>, s: S) -> Result<S::Ok, S::Error> {
        let fields = match task {
            Some(task) => TaskFields {
                year: Some(task.year().to_string()),
                district: Some(task.district().to_string()),
                taluka: Some(task.taluka().to_string()),
                village: Some(task.village().to_string()),
                doc_number: Some(task.doc_number()),
            },
            None => TaskFields::default(),
        };
        fields.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<TaskKey>, D::Error> {
        let Some(fields) = Option::<TaskFields>::deserialize(d)? else {
            return Ok(None);
        };
        Ok(into_task(fields))
    }

    fn into_task(fields: TaskFields) -> Option<TaskKey> {
        match fields {
            TaskFields {
                year: Some(year),
                district: Some(district),
                taluka: Some(taluka),
                village: Some(village),
                doc_number: Some(doc_number),
            } => match TaskKey::new(year, district, taluka, village, doc_number) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!("Discarding unusable task in progress record: {}", e);
                    None
                }
            },
            TaskFields {
                year: None,
                district: None,
                taluka: None,
                village: None,
                doc_number: None,
            } => None,
            partial => {
                warn!("Discarding partially populated task in progress record: {:?}", partial);
                None
            }
        }
    }

    fn lenient_doc_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
            Other(serde_json::Value),
        }

        Ok(match Option::<Raw>::deserialize(d)? {
            None => None,
            Some(Raw::Number(n)) => Some(n),
            Some(Raw::Text(text)) => text.trim().parse().ok(),
            Some(Raw::Other(_)) => None,
        })
    }
}

/// Drops repeated entries from `completed`, keeping the first occurrence.
pub(crate) fn dedup_completed<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let raw = Option::<Vec<String>>::deserialize(d)?.unwrap_or_default();
    let mut seen = std::collections::HashSet::with_capacity(raw.len());
    let deduped: Vec<String> = raw
        .into_iter()
        .filter(|key| seen.insert(key.clone()))
        .collect();
    Ok(deduped)
}
