//! Domain types shared by the store, grouper, classifier, and session.
//!
//! These are the normalized shapes. Raw server JSON is decoded and
//! validated in `transport` before it ever reaches these types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ItemId = String;

/// A concrete scheduled instance of an agenda item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub item_id: ItemId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A planned or produced piece of content attached to one planning item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub planning_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_type: Option<String>,
}

/// Reference to a planning item of an agenda entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_date: Option<DateTime<Utc>>,
}

/// A wire story or agenda entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    /// Monotonically increasing content revision.
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slugline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub coverages: Vec<Coverage>,
    #[serde(default)]
    pub watches: Vec<String>,
    /// Users who bookmarked the item.
    #[serde(default)]
    pub bookmarks: Vec<String>,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
    #[serde(default)]
    pub planning_items: Vec<PlanningRef>,
}

impl Item {
    /// Best available display title.
    pub fn title(&self) -> &str {
        self.headline
            .as_deref()
            .or(self.name.as_deref())
            .or(self.slugline.as_deref())
            .unwrap_or(&self.id)
    }

    pub fn is_watched_by(&self, user: &str) -> bool {
        self.watches.iter().any(|w| w == user)
    }

    pub fn is_bookmarked_by(&self, user: &str) -> bool {
        self.bookmarks.iter().any(|b| b == user)
    }
}

/// A validated search response, ready for the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchPayload {
    pub items: Vec<Item>,
    pub total: u64,
    pub aggregations: Option<serde_json::Value>,
}

/// Created-date range filter. Values are either date-math shorthands
/// (`now/d`, `now/w`, `now/M`) or explicit dates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl CreatedFilter {
    pub fn from_value(&self) -> Option<&str> {
        self.from.as_deref().filter(|s| !s.is_empty())
    }

    pub fn to_value(&self) -> Option<&str> {
        self.to.as_deref().filter(|s| !s.is_empty())
    }

    /// A range filter is active when either bound is non-empty.
    pub fn is_active(&self) -> bool {
        self.from_value().is_some() || self.to_value().is_some()
    }
}

/// Facet key -> selected values.
pub type ActiveFilter = BTreeMap<String, Vec<String>>;

/// Everything the user has chosen that shapes the next search request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    pub query: Option<String>,
    pub active_filter: ActiveFilter,
    pub active_navigation: Option<String>,
    pub created_filter: CreatedFilter,
    pub bookmarks: bool,
    pub user: Option<String>,
    pub news_only: bool,
    pub section: Option<String>,
}

/// A saved search the user follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub filter: Option<ActiveFilter>,
    #[serde(default)]
    pub created: Option<CreatedFilter>,
    #[serde(default)]
    pub topic_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_filter_active_ignores_empty_strings() {
        let filter = CreatedFilter {
            from: Some(String::new()),
            to: None,
        };
        assert!(!filter.is_active());

        let filter = CreatedFilter {
            from: None,
            to: Some("2024-05-01".to_string()),
        };
        assert!(filter.is_active());
        assert_eq!(filter.from_value(), None);
    }

    #[test]
    fn test_topic_deserializes_without_optional_fields() {
        let topic: Topic = serde_json::from_str(r#"{"_id": "t1", "label": "Floods"}"#).unwrap();
        assert_eq!(topic.id, "t1");
        assert!(topic.topic_type.is_none());
        assert!(topic.filter.is_none());
    }
}
