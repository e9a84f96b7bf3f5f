//! Podcast feed enumeration.
//!
//! Turns an RSS/Atom feed into the ordered list of [`Item`]s the pipeline
//! works through. Item identity is derived from the feed entry's guid so the
//! same episode maps to the same artifacts on every run.

use crate::error::{PodsiftError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Stable identifier of one episode, derived from its feed guid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Derive an id from a feed entry guid.
    pub fn from_guid(guid: &str) -> Self {
        let digest = format!("{:x}", Sha256::digest(guid.trim().as_bytes()));
        Self(digest[..16].to_string())
    }

    /// Id for an entry whose guid is shared with an older entry.
    pub fn from_guid_and_url(guid: &str, audio_url: &str) -> Self {
        Self::from_guid(&format!("{}\n{}", guid.trim(), audio_url.trim()))
    }

    /// Wrap an id that was previously derived (e.g. read back from the ledger).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One podcast episode as read from the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Feed entry guid the id was derived from.
    pub guid: String,
    pub title: String,
    pub audio_url: String,
    /// Publish position, oldest episode = 1.
    pub ordinal: u32,
    /// Episode number parsed from the title ("25", "P25").
    pub episode_label: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(guid: &str, title: &str, audio_url: &str, ordinal: u32) -> Self {
        Self {
            id: ItemId::from_guid(guid),
            guid: guid.to_string(),
            title: title.to_string(),
            audio_url: audio_url.to_string(),
            ordinal,
            episode_label: extract_episode_label(title),
            published_at: None,
        }
    }

    /// Episode number for reports, falling back to the ordinal.
    pub fn display_number(&self) -> String {
        self.episode_label
            .clone()
            .unwrap_or_else(|| self.ordinal.to_string())
    }
}

/// Source of the item set for a run.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the feed and return items in feed order.
    async fn fetch_items(&self) -> Result<Vec<Item>>;
}

/// HTTP-fetched RSS or Atom feed.
pub struct RssFeed {
    url: String,
    client: reqwest::Client,
}

impl RssFeed {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| PodsiftError::Feed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_items(&self) -> Result<Vec<Item>> {
        info!("Fetching feed");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PodsiftError::Feed(format!("Feed unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(PodsiftError::Feed(format!(
                "Feed request failed with status {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PodsiftError::Feed(format!("Failed to read feed body: {}", e)))?;

        parse_feed(&body)
    }
}

/// Parse feed bytes into items, skipping entries without audio.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<Item>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| PodsiftError::Feed(format!("Failed to parse feed: {}", e)))?;

    let mut items = Vec::with_capacity(feed.entries.len());

    for entry in feed.entries {
        let title = entry.title.map(|t| t.content).unwrap_or_default();

        let audio_url = entry
            .media
            .iter()
            .flat_map(|m| m.content.iter())
            .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
            .or_else(|| {
                entry
                    .links
                    .iter()
                    .find(|l| {
                        l.media_type
                            .as_deref()
                            .is_some_and(|t| t.starts_with("audio/"))
                    })
                    .map(|l| l.href.clone())
            });

        let Some(audio_url) = audio_url else {
            warn!("Skipping feed entry without audio: {}", title);
            continue;
        };

        let mut item = Item::new(&entry.id, &title, &audio_url, 0);
        item.published_at = entry.published;
        items.push(item);
    }

    assign_ordinals(&mut items);
    if disambiguate_ids(&mut items) {
        assign_ordinals(&mut items);
    }
    info!("Parsed {} episodes from feed", items.len());
    Ok(items)
}

/// Number items by publish order, oldest first.
///
/// Uses publish dates when every entry has one; otherwise assumes the usual
/// newest-first feed order.
fn assign_ordinals(items: &mut [Item]) {
    let mut order: Vec<usize> = (0..items.len()).collect();

    if items.iter().all(|i| i.published_at.is_some()) {
        order.sort_by_key(|&i| (items[i].published_at, Reverse(i)));
    } else {
        order.reverse();
    }

    for (rank, idx) in order.into_iter().enumerate() {
        items[idx].ordinal = rank as u32 + 1;
    }
}

/// Give entries that reuse a guid their own ids.
///
/// The oldest entry keeps the plain guid id; later ones also hash their audio
/// URL. Entries repeating both guid and URL are dropped. Returns whether
/// anything was dropped.
fn disambiguate_ids(items: &mut Vec<Item>) -> bool {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by_key(|&i| items[i].ordinal);

    let mut taken = HashSet::new();
    let mut duplicates = HashSet::new();

    for idx in order {
        let item = &mut items[idx];
        if taken.insert(item.id.clone()) {
            continue;
        }
        let id = ItemId::from_guid_and_url(&item.guid, &item.audio_url);
        if taken.insert(id.clone()) {
            warn!(
                "Feed reuses guid {:?} for \"{}\", using id {}",
                item.guid, item.title, id
            );
            item.id = id;
        } else {
            warn!("Dropping duplicate feed entry \"{}\" ({})", item.title, item.guid);
            duplicates.insert(idx);
        }
    }

    if duplicates.is_empty() {
        return false;
    }
    let mut idx = 0;
    items.retain(|_| {
        let keep = !duplicates.contains(&idx);
        idx += 1;
        keep
    });
    true
}

/// Extract an episode number from a title.
///
/// "Episode 25: ..." gives `25`; "Paid-only episode 25" gives `P25`.
pub fn extract_episode_label(title: &str) -> Option<String> {
    static PAID: OnceLock<Regex> = OnceLock::new();
    static REGULAR: OnceLock<Regex> = OnceLock::new();

    let paid = PAID.get_or_init(|| Regex::new(r"(?i)paid-only episode (\d+)").expect("valid regex"));
    if let Some(caps) = paid.captures(title) {
        return Some(format!("P{}", &caps[1]));
    }

    let regular = REGULAR.get_or_init(|| Regex::new(r"(?i)episode (\d+)").expect("valid regex"));
    regular.captures(title).map(|caps| caps[1].to_string())
}
