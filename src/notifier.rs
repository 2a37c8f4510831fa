//! Push event taxonomy.
//!
//! Server pushes arrive as `{event, extra}` JSON. `classify` maps them onto
//! the closed [`PushEvent`] set for the current user; the session decides
//! what each event does. Events for other users, unknown events, and known
//! events with an unusable `extra` all come out as [`PushEvent::Ignored`].

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::FeedError;
use crate::types::ItemId;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushMessage {
    pub event: String,
    #[serde(default)]
    pub extra: Value,
}

impl PushMessage {
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// An item matched some of the user's followed topics.
    TopicMatches { item_id: ItemId, topics: Vec<String> },
    /// Something new was published; re-run the current query in the background.
    NewItem,
    /// The user's topic list changed.
    TopicsChanged,
    SavedItemsChanged { count: u64 },
    Ignored,
}

#[derive(Deserialize)]
struct TopicMatchesExtra {
    item: MatchedItem,
    #[serde(default)]
    topics: Vec<String>,
}

#[derive(Deserialize)]
struct MatchedItem {
    #[serde(rename = "_id")]
    id: ItemId,
}

#[derive(Deserialize)]
struct SavedItemsExtra {
    count: u64,
}

/// Map a push message onto an event for `user`.
pub fn classify(message: &PushMessage, user: Option<&str>) -> PushEvent {
    match message.event.as_str() {
        "topic_matches" => match TopicMatchesExtra::deserialize(&message.extra) {
            Ok(extra) => PushEvent::TopicMatches {
                item_id: extra.item.id,
                topics: extra.topics,
            },
            Err(e) => {
                log::debug!("Ignoring topic_matches push with bad payload: {}", e);
                PushEvent::Ignored
            }
        },
        "new_item" => PushEvent::NewItem,
        event => match (event.split_once(':'), user) {
            (Some(("topics", target)), Some(user)) if target == user => PushEvent::TopicsChanged,
            (Some(("saved_items", target)), Some(user)) if target == user => {
                match SavedItemsExtra::deserialize(&message.extra) {
                    Ok(extra) => PushEvent::SavedItemsChanged { count: extra.count },
                    Err(e) => {
                        log::debug!("Ignoring saved_items push with bad payload: {}", e);
                        PushEvent::Ignored
                    }
                }
            }
            _ => PushEvent::Ignored,
        },
    }
}

/// Item ids matched per followed topic, for unread badges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicBadges {
    by_topic: BTreeMap<String, Vec<ItemId>>,
}

impl TopicBadges {
    pub fn record(&mut self, item_id: &str, topics: &[String]) {
        for topic in topics {
            let items = self.by_topic.entry(topic.clone()).or_default();
            if !items.iter().any(|id| id == item_id) {
                items.push(item_id.to_string());
            }
        }
    }

    pub fn count(&self, topic: &str) -> usize {
        self.by_topic.get(topic).map_or(0, Vec::len)
    }

    pub fn items(&self, topic: &str) -> &[ItemId] {
        self.by_topic.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Forget matches for a topic once the user has looked at it.
    pub fn clear(&mut self, topic: &str) {
        self.by_topic.remove(topic);
    }
}
