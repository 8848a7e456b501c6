//! # Feed parser
//! Owns one feed's entries: reads them back from the store (pruning on the
//! way), appends fetched batches to memory and store, and dismisses entries.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::entry::{self, parse_batch, Entry, RawEntry};
use crate::store::{FeedRecord, FeedStore};
use crate::telemetry::ensure_metrics_described;

/// The operations an entry cache needs from a feed parser.
pub trait FeedParser {
    /// Re-read stored entries, prune them against `now` and write the
    /// pruned set back.
    fn refresh(&mut self, now: DateTime<Utc>) -> Result<()>;

    /// Append records as-is (no dedup, no expiry check) and persist them.
    /// Returns the number of records appended.
    fn fetch_records(&mut self, records: Vec<RawEntry>, now: DateTime<Utc>) -> Result<usize>;

    /// Parse a serialized batch and append it. Nothing is appended when
    /// parsing fails.
    fn fetch(&mut self, batch: &str, now: DateTime<Utc>) -> Result<usize> {
        let records = parse_batch(batch)?;
        self.fetch_records(records, now)
    }

    fn entries(&self) -> &[Entry];

    /// Returns whether anything with `key` was removed.
    fn dismiss_entry(&mut self, key: i64) -> Result<bool>;

    /// Drop every entry of the feed, in memory and in the store.
    fn dismiss_all(&mut self) -> Result<()>;

    fn last_fetch(&self) -> Option<DateTime<Utc>>;
}

/// Feed key used for the durable state: the URL with every
/// non-alphanumeric character removed.
pub fn feed_key(url: &str) -> String {
    static RE_NON_ALNUM: OnceCell<Regex> = OnceCell::new();
    let re = RE_NON_ALNUM.get_or_init(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());
    re.replace_all(url, "").into_owned()
}

pub struct NewsFeedParser {
    feed_key: String,
    store: Arc<dyn FeedStore>,
    entries: Vec<Entry>,
    last_fetch: Option<DateTime<Utc>>,
}

impl NewsFeedParser {
    /// Bind to a feed without reading the store yet.
    pub fn new(store: Arc<dyn FeedStore>, feed_url: &str) -> Self {
        ensure_metrics_described();
        Self {
            feed_key: feed_key(feed_url),
            store,
            entries: Vec::new(),
            last_fetch: None,
        }
    }

    /// Bind to a feed and read its stored entries.
    pub fn open(store: Arc<dyn FeedStore>, feed_url: &str, now: DateTime<Utc>) -> Result<Self> {
        let mut parser = Self::new(store, feed_url);
        parser.refresh(now)?;
        Ok(parser)
    }

    pub fn feed_key(&self) -> &str {
        &self.feed_key
    }
}

impl FeedParser for NewsFeedParser {
    fn refresh(&mut self, now: DateTime<Utc>) -> Result<()> {
        let record = self.store.load(&self.feed_key)?;
        let (kept, stats) = entry::prune(record.entries, now);

        if stats.removed() > 0 {
            self.store.save(
                &self.feed_key,
                &FeedRecord {
                    entries: kept.clone(),
                    last_fetch: record.last_fetch,
                },
            )?;
            counter!("news_prune_expired_total").increment(stats.expired as u64);
            counter!("news_prune_duplicates_total").increment(stats.duplicates as u64);
            tracing::debug!(
                target: "news",
                feed = %self.feed_key,
                expired = stats.expired,
                duplicates = stats.duplicates,
                "pruned stored entries"
            );
        }

        self.entries = kept;
        self.last_fetch = record.last_fetch;
        gauge!("news_entries").set(self.entries.len() as f64);
        Ok(())
    }

    fn fetch_records(&mut self, records: Vec<RawEntry>, now: DateTime<Utc>) -> Result<usize> {
        let incoming: Vec<Entry> = records.into_iter().map(Entry::from).collect();
        let n = incoming.len();

        // Persist first so a failed write leaves memory untouched.
        let mut record = self.store.load(&self.feed_key)?;
        record.entries.extend(incoming.iter().cloned());
        record.last_fetch = Some(now);
        self.store.save(&self.feed_key, &record)?;

        self.entries.extend(incoming);
        self.last_fetch = Some(now);

        counter!("news_fetch_batches_total").increment(1);
        counter!("news_fetch_entries_total").increment(n as u64);
        gauge!("news_entries").set(self.entries.len() as f64);
        gauge!("news_last_fetch_ts").set(now.timestamp() as f64);
        Ok(n)
    }

    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn dismiss_entry(&mut self, key: i64) -> Result<bool> {
        let mut record = self.store.load(&self.feed_key)?;
        let stored_before = record.entries.len();
        record.entries.retain(|e| e.key != key);
        if record.entries.len() != stored_before {
            self.store.save(&self.feed_key, &record)?;
        }

        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        let removed = self.entries.len() != before || record.entries.len() != stored_before;

        if removed {
            counter!("news_dismissed_total").increment(1);
            gauge!("news_entries").set(self.entries.len() as f64);
        }
        Ok(removed)
    }

    fn dismiss_all(&mut self) -> Result<()> {
        self.store.remove(&self.feed_key)?;
        let n = self.entries.len();
        self.entries.clear();
        self.last_fetch = None;

        counter!("news_dismissed_total").increment(n as u64);
        gauge!("news_entries").set(0.0);
        tracing::info!(target: "news", feed = %self.feed_key, dismissed = n, "dismissed all entries");
        Ok(())
    }

    fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }
}
