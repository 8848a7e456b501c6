//! # News injector
//! The entry cache a plugin talks to. Entries added here are visible
//! immediately; duplicates and expired entries are only resolved by an
//! explicit [`NewsInjector::update`].
//!
//! Bulk loads only admit keys at or above the configured `pk_offset`, which
//! keeps injected entries disjoint from the feed server's own keys.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;

use crate::config::NewsConfig;
use crate::entry::{parse_batch, Entry, RawEntry};
use crate::parser::{FeedParser, NewsFeedParser};
use crate::store::FeedStore;

pub struct NewsInjector<P: FeedParser = NewsFeedParser> {
    parser: P,
    pk_offset: i64,
}

impl NewsInjector<NewsFeedParser> {
    /// Cache over `store` for the configured feed. Reads (and prunes) what
    /// is already stored.
    pub fn new(store: Arc<dyn FeedStore>, cfg: &NewsConfig) -> Result<Self> {
        Self::with_parser(NewsFeedParser::new(store, &cfg.feed_url), cfg.pk_offset)
    }
}

impl<P: FeedParser> NewsInjector<P> {
    pub fn with_parser(parser: P, pk_offset: i64) -> Result<Self> {
        let mut injector = Self { parser, pk_offset };
        injector.update()?;
        Ok(injector)
    }

    /// Re-read stored entries, dropping expired ones and collapsing
    /// duplicate keys onto the latest entry.
    pub fn update(&mut self) -> Result<()> {
        self.parser.refresh(Utc::now())
    }

    pub fn items(&self) -> &[Entry] {
        self.parser.entries()
    }

    /// Remove every entry of the feed, including ones other instances wrote.
    pub fn clear(&mut self) -> Result<()> {
        self.parser.dismiss_all()
    }

    /// Append a serialized batch. A batch that cannot be parsed or stored is
    /// logged and dropped; the cache is left as it was.
    pub fn add_items(&mut self, batch: &str) {
        match self.parser.fetch(batch, Utc::now()) {
            Ok(n) => tracing::debug!(target: "news", added = n, "batch appended"),
            Err(e) => {
                counter!("news_fetch_rejected_total").increment(1);
                tracing::warn!(target: "news", error = %format!("{e:#}"), "batch discarded");
            }
        }
    }

    /// Bulk-load a batch file. Unlike [`add_items`](Self::add_items), an
    /// unreadable or unparseable file is an error.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        self.update()?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading news batch from {}", path.display()))?;
        let records = parse_batch(&content)
            .with_context(|| format!("loading news batch from {}", path.display()))?;
        self.load_records(records)
    }

    pub fn load_str(&mut self, batch: &str) -> Result<bool> {
        self.update()?;
        let records = parse_batch(batch)?;
        self.load_records(records)
    }

    /// Admit candidates with `pk >= pk_offset` whose key is not already
    /// present, then update. Always `Ok(true)` once the records are in hand.
    pub fn load_records(&mut self, records: Vec<RawEntry>) -> Result<bool> {
        let present: HashSet<i64> = self.items().iter().map(|e| e.key).collect();

        let total = records.len();
        let mut below_offset = 0usize;
        let mut already_present = 0usize;
        let mut admitted = Vec::with_capacity(total);
        for r in records {
            if r.pk < self.pk_offset {
                below_offset += 1;
            } else if present.contains(&r.pk) {
                already_present += 1;
            } else {
                admitted.push(r);
            }
        }

        counter!("news_load_skipped_total", "reason" => "below_offset")
            .increment(below_offset as u64);
        counter!("news_load_skipped_total", "reason" => "already_present")
            .increment(already_present as u64);

        let n = admitted.len();
        if n > 0 {
            self.parser.fetch_records(admitted, Utc::now())?;
        }
        self.update()?;

        tracing::info!(
            target: "news",
            candidates = total,
            admitted = n,
            below_offset,
            already_present,
            items = self.items().len(),
            "bulk load finished"
        );
        Ok(true)
    }

    /// Dismiss a single entry. Returns whether it existed.
    pub fn dismiss(&mut self, key: i64) -> Result<bool> {
        self.parser.dismiss_entry(key)
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.parser.last_fetch()
    }

    pub fn pk_offset(&self) -> i64 {
        self.pk_offset
    }
}
