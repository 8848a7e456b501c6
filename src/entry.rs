//! # Entries
//! News entry model, the wire record a feed batch is made of, and the
//! prune pass that turns the append log into the effective entry set.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One news item as held by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: i64,
    pub title: String,
    pub image_url: String,
    pub content: String,
    pub link: String,
    pub sticky: bool,
    /// `None` means the entry never expires.
    pub expiry: Option<DateTime<Utc>>,
}

impl Entry {
    /// Expired means "expiry set and strictly before `now`".
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|at| at < now)
    }
}

/// One record of a feed batch, in the shape the feed server publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    pub pk: i64,
    // Carried along, never consulted.
    #[serde(default)]
    pub publish_from: Option<f64>,
    #[serde(default)]
    pub publish_to: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sticky: Option<bool>,
}

impl From<RawEntry> for Entry {
    fn from(raw: RawEntry) -> Self {
        Entry {
            key: raw.pk,
            title: raw.title.unwrap_or_default(),
            image_url: raw.image.unwrap_or_default(),
            content: raw.content.unwrap_or_default(),
            link: raw.url.unwrap_or_default(),
            sticky: raw.sticky.unwrap_or(false),
            expiry: raw.publish_to.and_then(epoch_to_datetime),
        }
    }
}

/// Whole seconds; the fractional part of `publish_to` is dropped.
fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs.trunc() as i64, 0).single()
}

/// Parse a serialized batch (JSON array of records).
pub fn parse_batch(s: &str) -> Result<Vec<RawEntry>> {
    serde_json::from_str(s).context("parsing news batch")
}

/// What a prune pass threw away.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    pub duplicates: usize,
    pub expired: usize,
}

impl PruneStats {
    pub fn removed(&self) -> usize {
        self.duplicates + self.expired
    }
}

/// Collapse duplicate keys to the most recently appended entry, then drop
/// expired entries. The survivor of a key is authoritative even when it is
/// expired and an earlier duplicate was not. Output is ordered by key.
pub fn prune(entries: Vec<Entry>, now: DateTime<Utc>) -> (Vec<Entry>, PruneStats) {
    let mut latest: HashMap<i64, usize> = HashMap::with_capacity(entries.len());
    for (idx, e) in entries.iter().enumerate() {
        latest.insert(e.key, idx);
    }

    let mut stats = PruneStats::default();
    let mut kept = Vec::with_capacity(latest.len());
    for (idx, e) in entries.into_iter().enumerate() {
        if latest.get(&e.key) != Some(&idx) {
            stats.duplicates += 1;
            continue;
        }
        if e.is_expired(now) {
            stats.expired += 1;
            continue;
        }
        kept.push(e);
    }

    kept.sort_by_key(|e| e.key);
    (kept, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: i64, title: &str, expiry: Option<i64>) -> Entry {
        Entry {
            key,
            title: title.into(),
            image_url: String::new(),
            content: String::new(),
            link: String::new(),
            sticky: false,
            expiry: expiry.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn raw_record_maps_fields_and_truncates_expiry() {
        let batch = r#"[{"pk": 4, "publish_from": 1557073748.13, "publish_to": 2557073748.13,
            "title": "test title", "image": "", "content": "<p>test content</p>",
            "url": "bla", "sticky": true}]"#;
        let raw = parse_batch(batch).unwrap();
        let e: Entry = raw.into_iter().next().unwrap().into();
        assert_eq!(e.key, 4);
        assert_eq!(e.expiry.map(|t| t.timestamp()), Some(2_557_073_748));
        assert_eq!(e.title, "test title");
        assert_eq!(e.content, "<p>test content</p>");
        assert_eq!(e.image_url, "");
        assert_eq!(e.link, "bla");
        assert!(e.sticky);
    }

    #[test]
    fn nulls_become_defaults() {
        let raw = parse_batch(r#"[{"pk": 9, "publish_to": null, "title": null}]"#).unwrap();
        let e: Entry = raw[0].clone().into();
        assert_eq!(e.expiry, None);
        assert_eq!(e.title, "");
        assert!(!e.sticky);
        assert!(!e.is_expired(now()));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_batch(r#"thisisnotvalidjson[{"pk": 6"#).is_err());
        assert!(parse_batch(r#"{"pk": 6}"#).is_err());
    }

    #[test]
    fn last_duplicate_wins_and_order_is_by_key() {
        let log = vec![
            entry(7, "a", None),
            entry(3, "b", None),
            entry(7, "c", None),
        ];
        let (kept, stats) = prune(log, now());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].key, 3);
        assert_eq!(kept[1].title, "c");
        assert_eq!(stats, PruneStats { duplicates: 1, expired: 0 });
    }

    #[test]
    fn expired_survivor_takes_its_key_with_it() {
        // Live first, expired last: the expired one is authoritative.
        let log = vec![entry(1, "live", None), entry(1, "dead", Some(10))];
        let (kept, stats) = prune(log, now());
        assert!(kept.is_empty());
        assert_eq!(stats.removed(), 2);

        // Expired first, live last: the key survives.
        let log = vec![entry(1, "dead", Some(10)), entry(1, "live", None)];
        let (kept, _) = prune(log, now());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "live");
    }

    #[test]
    fn expiry_equal_to_now_is_not_expired() {
        let at = now().timestamp();
        let (kept, _) = prune(vec![entry(1, "edge", Some(at))], now());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn prune_is_idempotent() {
        let log = vec![entry(2, "x", None), entry(2, "y", None), entry(5, "z", Some(1))];
        let (once, _) = prune(log, now());
        let (twice, stats) = prune(once.clone(), now());
        assert_eq!(once, twice);
        assert_eq!(stats.removed(), 0);
    }
}
