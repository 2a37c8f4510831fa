//! Search transport.
//!
//! `Transport` is the seam between the session and the network. The HTTP
//! implementation talks to the newsroom search API with reqwest; tests plug
//! in a recording fake.
//!
//! Raw response types mirror the server JSON. They are validated and
//! normalized into `types::*` here, so nothing past this module ever sees a
//! string revision or an unparsed date.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FeedError;
use crate::query::SearchParams;
use crate::types::{Coverage, Item, ItemId, Occurrence, PlanningRef, SearchPayload, Topic};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn search(&self, params: &SearchParams) -> Result<SearchPayload, FeedError>;
    async fn fetch_one(&self, id: &str) -> Result<Item, FeedError>;
    /// Topics the user follows in the transport's section (untyped topics included).
    async fn fetch_topics(&self, user: &str) -> Result<Vec<Topic>, FeedError>;
    /// Bookmark `ids` for the signed-in user.
    async fn bookmark(&self, ids: &[ItemId]) -> Result<(), FeedError>;
    async fn remove_bookmarks(&self, ids: &[ItemId]) -> Result<(), FeedError>;
}

// ============================================================================
// Raw response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    #[serde(rename = "_items", default)]
    items: Vec<RawItem>,
    #[serde(rename = "_meta", default)]
    meta: Option<RawMeta>,
    #[serde(rename = "_aggregations", default)]
    aggregations: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawMeta {
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(default)]
    version: Option<RawVersion>,
    #[serde(default)]
    versioncreated: Option<String>,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    slugline: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    dates: Option<RawDates>,
    #[serde(default)]
    occurrences: Vec<RawDates>,
    #[serde(default)]
    coverages: Vec<RawCoverage>,
    #[serde(default)]
    watches: Vec<String>,
    #[serde(default)]
    bookmarks: Vec<String>,
    #[serde(default)]
    planning_items: Vec<RawPlanning>,
}

#[derive(Debug, Deserialize)]
struct RawDates {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCoverage {
    #[serde(default)]
    planning_id: Option<String>,
    #[serde(default)]
    coverage_id: Option<String>,
    #[serde(default)]
    scheduled: Option<String>,
    #[serde(default)]
    coverage_status: Option<String>,
    #[serde(default)]
    coverage_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPlanning {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(default)]
    planning_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTopicList {
    #[serde(rename = "_items", default)]
    items: Vec<Topic>,
}

// ============================================================================
// Normalization
// ============================================================================

/// Parse a server timestamp. Accepts RFC 3339, the `+0000` offset form the
/// API emits, naive UTC datetimes, and bare dates (UTC midnight).
fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_version(version: Option<RawVersion>) -> Result<u64, String> {
    match version {
        None => Ok(0),
        Some(RawVersion::Number(n)) => Ok(n),
        Some(RawVersion::Text(text)) => text
            .trim()
            .parse()
            .map_err(|_| format!("non-numeric version '{}'", text)),
    }
}

fn occurrence(item_id: &str, dates: &RawDates) -> Option<Occurrence> {
    let start = dates.start.as_deref().and_then(parse_instant)?;
    let end = dates
        .end
        .as_deref()
        .and_then(parse_instant)
        .filter(|end| *end >= start)
        .unwrap_or(start);
    Some(Occurrence {
        item_id: item_id.to_string(),
        start,
        end,
    })
}

fn normalize_item(raw: RawItem) -> Result<Item, String> {
    if raw.id.is_empty() {
        return Err("item without _id".to_string());
    }
    let revision = parse_version(raw.version).map_err(|e| format!("{}: {}", raw.id, e))?;

    let occurrences: Vec<Occurrence> = raw
        .dates
        .iter()
        .chain(raw.occurrences.iter())
        .filter_map(|dates| occurrence(&raw.id, dates))
        .collect();

    let coverages = raw
        .coverages
        .into_iter()
        .filter_map(|c| {
            Some(Coverage {
                planning_id: c.planning_id.filter(|p| !p.is_empty())?,
                coverage_id: c.coverage_id,
                scheduled: c.scheduled.as_deref().and_then(parse_instant),
                status: c.coverage_status.unwrap_or_default(),
                coverage_type: c.coverage_type,
            })
        })
        .collect();

    let planning_items = raw
        .planning_items
        .into_iter()
        .filter(|p| !p.id.is_empty())
        .map(|p| PlanningRef {
            planning_date: p.planning_date.as_deref().and_then(parse_instant),
            id: p.id,
        })
        .collect();

    Ok(Item {
        created: raw.versioncreated.as_deref().and_then(parse_instant),
        id: raw.id,
        revision,
        headline: raw.headline,
        slugline: raw.slugline,
        name: raw.name,
        coverages,
        watches: raw.watches,
        bookmarks: raw.bookmarks,
        occurrences,
        planning_items,
    })
}

/// Decode and validate a search response body.
///
/// Invalid items are dropped with a warning; a body that is not a search
/// response at all is a payload error.
pub fn parse_search_response(body: &str) -> Result<SearchPayload, FeedError> {
    let raw: RawSearchResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Payload(e.to_string()))?;

    let mut items = Vec::with_capacity(raw.items.len());
    for raw_item in raw.items {
        match normalize_item(raw_item) {
            Ok(item) => items.push(item),
            Err(e) => log::warn!("Dropping invalid search item: {}", e),
        }
    }

    let total = raw
        .meta
        .and_then(|m| m.total)
        .unwrap_or(items.len() as u64);

    Ok(SearchPayload {
        items,
        total,
        aggregations: raw.aggregations,
    })
}

pub fn parse_item(body: &str) -> Result<Item, FeedError> {
    let raw: RawItem = serde_json::from_str(body).map_err(|e| FeedError::Payload(e.to_string()))?;
    normalize_item(raw).map_err(FeedError::Payload)
}

/// Decode a topic list, keeping untyped topics and those of `section`.
pub fn parse_topics(body: &str, section: &str) -> Result<Vec<Topic>, FeedError> {
    let raw: RawTopicList =
        serde_json::from_str(body).map_err(|e| FeedError::Payload(e.to_string()))?;
    Ok(raw
        .items
        .into_iter()
        .filter(|t| t.topic_type.as_deref().map_or(true, |kind| kind == section))
        .collect())
}

// ============================================================================
// Retry
// ============================================================================

/// How often and how patiently a request is repeated after a retryable
/// [`FeedError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

/// Longest server-requested pause that is honored.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Spread added to computed backoffs so parallel clients drift apart.
const JITTER_MS: u64 = 150;

impl RetryPolicy {
    /// Pause before the attempt after `failed_attempt` (1-based).
    ///
    /// A server hint wins over the exponential schedule.
    pub fn backoff(&self, failed_attempt: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint.min(MAX_RETRY_AFTER);
        }
        let doubling = 2u64.saturating_pow(failed_attempt.saturating_sub(1));
        let base = self
            .initial_backoff_ms
            .saturating_mul(doubling)
            .min(self.max_backoff_ms);
        let jitter = u64::from(Utc::now().timestamp_subsec_nanos()) % JITTER_MS;
        Duration::from_millis(base.saturating_add(jitter))
    }
}

/// `Retry-After` in its delta-seconds form.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}

/// Read the body of a response, turning non-success statuses into errors.
async fn read_body(response: reqwest::Response) -> Result<String, FeedError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let message: String = body.chars().take(200).collect();
        return Err(FeedError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(body)
}

/// Send `request` and read its body, repeating while the failure is
/// retryable and attempts remain. The last failure is returned as is.
async fn fetch_body(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<String, FeedError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        // Streaming bodies cannot be replayed.
        let Some(replay) = request.try_clone() else {
            return read_body(request.send().await?).await;
        };

        let (err, hint) = match replay.send().await {
            Ok(response) => {
                let hint = retry_after(response.headers());
                match read_body(response).await {
                    Ok(body) => return Ok(body),
                    Err(e) => (e, hint),
                }
            }
            Err(e) => (FeedError::Http(e), None),
        };

        if attempt >= attempts || !err.is_retryable() {
            return Err(err);
        }
        let delay = policy.backoff(attempt, hint);
        log::warn!(
            "Request failed ({}), attempt {} of {}, retrying in {:?}",
            err,
            attempt,
            attempts,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

// ============================================================================
// HTTP transport
// ============================================================================

#[derive(Serialize)]
struct BookmarkRequest<'a> {
    items: &'a [ItemId],
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    section: String,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(base_url: &str, section: &str, retry: RetryPolicy) -> Result<Self, FeedError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FeedError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FeedError::Config(format!(
                "Base URL '{}' cannot take a path",
                base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url,
            section: section.to_string(),
            retry,
        })
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Search URL with the builder's parameters plus a cache-busting `tick`.
    pub fn search_url(&self, params: &SearchParams, tick: i64) -> Url {
        let mut url = self.endpoint(&["search"]);
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params.iter() {
                query.append_pair(key, value);
            }
            query.append_pair("tick", &tick.to_string());
        }
        url
    }

    pub fn item_url(&self, id: &str) -> Url {
        let mut url = self.endpoint(&[self.section.as_str(), id]);
        url.query_pairs_mut().append_pair("format", "json");
        url
    }

    pub fn topics_url(&self, user: &str) -> Url {
        self.endpoint(&["users", user, "topics"])
    }

    pub fn bookmark_url(&self) -> Url {
        let resource = format!("{}_bookmark", self.section);
        self.endpoint(&[resource.as_str()])
    }

    async fn get(&self, url: Url) -> Result<String, FeedError> {
        log::debug!("GET {}", url);
        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        fetch_body(request, &self.retry).await
    }

    async fn send_bookmarks(
        &self,
        method: reqwest::Method,
        ids: &[ItemId],
    ) -> Result<(), FeedError> {
        let url = self.bookmark_url();
        log::debug!("{} {} ({} items)", method, url, ids.len());
        let request = self
            .client
            .request(method, url)
            .json(&BookmarkRequest { items: ids });
        fetch_body(request, &self.retry).await.map(|_| ())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn search(&self, params: &SearchParams) -> Result<SearchPayload, FeedError> {
        let body = self
            .get(self.search_url(params, Utc::now().timestamp_millis()))
            .await?;
        parse_search_response(&body)
    }

    async fn fetch_one(&self, id: &str) -> Result<Item, FeedError> {
        let body = self.get(self.item_url(id)).await?;
        parse_item(&body)
    }

    async fn fetch_topics(&self, user: &str) -> Result<Vec<Topic>, FeedError> {
        let body = self.get(self.topics_url(user)).await?;
        parse_topics(&body, &self.section)
    }

    async fn bookmark(&self, ids: &[ItemId]) -> Result<(), FeedError> {
        self.send_bookmarks(reqwest::Method::POST, ids).await
    }

    async fn remove_bookmarks(&self, ids: &[ItemId]) -> Result<(), FeedError> {
        self.send_bookmarks(reqwest::Method::DELETE, ids).await
    }
}
