//! Search request parameters.
//!
//! `build_params` is a pure function of the search state, the page offset,
//! and the timezone offset. The same inputs always produce the same
//! parameters in the same order, so a failed request can be retried
//! verbatim and tests can assert on exact query strings.

use crate::types::{ActiveFilter, SearchState};

/// Ordered, non-empty request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchParams {
    pairs: Vec<(&'static str, String)>,
}

impl SearchParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.pairs.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Requested page offset (0 when the parameter was omitted).
    pub fn offset(&self) -> usize {
        self.get("from").and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    /// URL-encoded query string, without a leading `?`.
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.iter() {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }

    fn push(&mut self, key: &'static str, value: Option<String>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.pairs.push((key, value));
        }
    }
}

/// Serialize the active filter, dropping facets with no selected values.
fn filter_json(filter: &ActiveFilter) -> Option<String> {
    let selected: ActiveFilter = filter
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(key, values)| (key.clone(), values.clone()))
        .collect();
    if selected.is_empty() {
        return None;
    }
    serde_json::to_string(&selected).ok()
}

/// Build request parameters for a search.
///
/// `page_offset` is 0 for a fresh query and the committed item count for
/// "fetch more". Falsy values (empty strings, `0`, `false`) are omitted.
pub fn build_params(state: &SearchState, page_offset: usize, timezone_offset: i32) -> SearchParams {
    let mut params = SearchParams::default();

    params.push("q", state.query.clone());
    params.push("bookmarks", state.user.clone().filter(|_| state.bookmarks));
    params.push("navigation", state.active_navigation.clone());
    params.push("filter", filter_json(&state.active_filter));
    params.push("from", (page_offset > 0).then(|| page_offset.to_string()));
    params.push("created_from", state.created_filter.from.clone());
    params.push("created_to", state.created_filter.to.clone());
    params.push(
        "timezone_offset",
        (timezone_offset != 0).then(|| timezone_offset.to_string()),
    );
    params.push("newsOnly", state.news_only.then(|| "true".to_string()));
    params.push("section", state.section.clone());

    params
}
