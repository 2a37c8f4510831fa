//! Committed result set plus a single-slot staging area.
//!
//! The store is the only owner of the ordered id sequence and the item
//! map. Everything else reads through accessors and mutates through the
//! operations below, which keep these invariants:
//! - every ordered id has an entry in the item map
//! - the committed count never exceeds `min(total, page_cap)`
//! - a page request always starts at the committed count
//! - at most one staged payload exists, and a commit clears it

use std::collections::{HashMap, HashSet};

use crate::types::{Item, ItemId, SearchPayload};

/// Hard server-side ceiling on accumulated results for one query.
pub const PAGE_CAP: usize = 1000;

/// What the in-flight request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Fresh,
    Page,
}

/// Policy outcome for a request the store refuses to admit.
///
/// Not an error: callers check for it and do nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A fetch is already pending.
    InFlight(FetchKind),
    /// The committed count reached `min(total, page_cap)`.
    PageCapReached { committed: usize, limit: usize },
    /// `append_page` arrived without a matching `begin_page`.
    NoPageRequested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub committed: usize,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendSummary {
    pub appended: usize,
    pub committed: usize,
    pub total: u64,
}

#[derive(Debug)]
pub struct ResultStore {
    ids: Vec<ItemId>,
    /// Membership index over `ids`.
    committed: HashSet<ItemId>,
    items: HashMap<ItemId, Item>,
    total: u64,
    aggregations: Option<serde_json::Value>,
    in_flight: Option<FetchKind>,
    staged: Option<SearchPayload>,
    page_cap: usize,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new(PAGE_CAP)
    }
}

/// Keep the existing entry unless the incoming one is strictly newer.
fn merge_item(items: &mut HashMap<ItemId, Item>, item: Item) {
    match items.get(&item.id) {
        Some(existing) if existing.revision >= item.revision => {}
        _ => {
            items.insert(item.id.clone(), item);
        }
    }
}

impl ResultStore {
    pub fn new(page_cap: usize) -> Self {
        Self {
            ids: Vec::new(),
            committed: HashSet::new(),
            items: HashMap::new(),
            total: 0,
            aggregations: None,
            in_flight: None,
            staged: None,
            page_cap,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Committed ids in server order.
    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Whether `id` is part of the committed ordered sequence.
    pub fn contains(&self, id: &str) -> bool {
        self.committed.contains(id)
    }

    /// Committed items in server order.
    pub fn items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.ids.iter().filter_map(|id| self.items.get(id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn aggregations(&self) -> Option<&serde_json::Value> {
        self.aggregations.as_ref()
    }

    pub fn in_flight(&self) -> Option<FetchKind> {
        self.in_flight
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn page_cap(&self) -> usize {
        self.page_cap
    }

    /// `min(total, page_cap)`.
    pub fn limit(&self) -> usize {
        usize::try_from(self.total)
            .unwrap_or(usize::MAX)
            .min(self.page_cap)
    }

    pub fn can_fetch_more(&self) -> bool {
        self.in_flight.is_none() && self.ids.len() < self.limit()
    }

    pub fn has_staged(&self) -> bool {
        self.staged.is_some()
    }

    pub fn staged(&self) -> Option<&SearchPayload> {
        self.staged.as_ref()
    }

    /// Staged ids that are not committed yet, in server order.
    ///
    /// Empty when nothing is staged.
    pub fn new_item_ids(&self) -> Vec<ItemId> {
        let Some(staged) = &self.staged else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        staged
            .items
            .iter()
            .filter(|item| !self.committed.contains(&item.id) && seen.insert(item.id.as_str()))
            .map(|item| item.id.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Fetch lifecycle
    // ------------------------------------------------------------------

    /// Mark a fresh query as in flight.
    ///
    /// A second fresh query while anything is pending is rejected, not queued.
    pub fn start_query(&mut self) -> Result<(), Rejection> {
        if let Some(kind) = self.in_flight {
            log::debug!("ResultStore: fresh query rejected, {:?} fetch pending", kind);
            return Err(Rejection::InFlight(kind));
        }
        self.in_flight = Some(FetchKind::Fresh);
        Ok(())
    }

    /// Admit a "fetch more" request and return the offset to request.
    pub fn begin_page(&mut self) -> Result<usize, Rejection> {
        if let Some(kind) = self.in_flight {
            log::debug!("ResultStore: fetch more rejected, {:?} fetch pending", kind);
            return Err(Rejection::InFlight(kind));
        }
        let limit = self.limit();
        if self.ids.len() >= limit {
            log::debug!(
                "ResultStore: fetch more rejected at {} of limit {}",
                self.ids.len(),
                limit
            );
            return Err(Rejection::PageCapReached {
                committed: self.ids.len(),
                limit,
            });
        }
        self.in_flight = Some(FetchKind::Page);
        Ok(self.ids.len())
    }

    /// Clear the in-flight mark after a failed request. Committed state is untouched.
    pub fn abort_fetch(&mut self) {
        self.in_flight = None;
    }

    /// Replace the committed result set wholesale.
    ///
    /// Clears staging and the in-flight mark.
    pub fn commit(&mut self, payload: SearchPayload) -> CommitSummary {
        let SearchPayload {
            items,
            total,
            aggregations,
        } = payload;

        self.total = total;
        self.aggregations = aggregations;
        self.in_flight = None;
        self.staged = None;

        let limit = self.limit();
        let mut ids = Vec::with_capacity(items.len().min(limit));
        let mut seen = HashSet::new();
        let mut map = HashMap::with_capacity(items.len());
        for item in items {
            if ids.len() < limit && seen.insert(item.id.clone()) {
                ids.push(item.id.clone());
            }
            merge_item(&mut map, item);
        }
        self.ids = ids;
        self.committed = seen;
        self.items = map;

        log::info!(
            "ResultStore: committed {} items (total {})",
            self.ids.len(),
            self.total
        );
        CommitSummary {
            committed: self.ids.len(),
            total: self.total,
        }
    }

    /// Append a page admitted by [`begin_page`](Self::begin_page).
    ///
    /// Items already known are only replaced by a strictly newer revision.
    /// A shrinking total shrinks the limit; ids past it are dropped.
    pub fn append_page(&mut self, payload: SearchPayload) -> Result<AppendSummary, Rejection> {
        if self.in_flight != Some(FetchKind::Page) {
            return Err(match self.in_flight {
                Some(kind) => Rejection::InFlight(kind),
                None => Rejection::NoPageRequested,
            });
        }
        self.in_flight = None;

        let SearchPayload {
            items,
            total,
            aggregations,
        } = payload;
        self.total = total;
        if aggregations.is_some() {
            self.aggregations = aggregations;
        }

        let limit = self.limit();
        if self.ids.len() > limit {
            log::info!(
                "ResultStore: total shrank to {}, dropping {} committed ids",
                self.total,
                self.ids.len() - limit
            );
            for dropped in self.ids.drain(limit..) {
                self.committed.remove(&dropped);
            }
        }

        let before = self.ids.len();
        for item in items {
            if self.ids.len() < limit && self.committed.insert(item.id.clone()) {
                self.ids.push(item.id.clone());
            }
            merge_item(&mut self.items, item);
        }
        let appended = self.ids.len().saturating_sub(before);

        log::debug!(
            "ResultStore: appended {} items, {} committed of total {}",
            appended,
            self.ids.len(),
            self.total
        );
        Ok(AppendSummary {
            appended,
            committed: self.ids.len(),
            total: self.total,
        })
    }

    // ------------------------------------------------------------------
    // Staging
    // ------------------------------------------------------------------

    /// Hold a payload for a later refresh. Replaces any unconsumed stage.
    pub fn stage(&mut self, payload: SearchPayload) {
        if self.staged.is_some() {
            log::debug!("ResultStore: replacing unconsumed staged payload");
        }
        self.staged = Some(payload);
    }

    /// Take the staged payload, leaving the slot empty.
    pub fn consume_stage(&mut self) -> Option<SearchPayload> {
        self.staged.take()
    }

    // ------------------------------------------------------------------
    // Item map updates that never touch the ordered sequence
    // ------------------------------------------------------------------

    /// Merge a single fetched item into the item map.
    pub fn receive_item(&mut self, item: Item) {
        merge_item(&mut self.items, item);
    }

    /// Refresh items already in the map; unknown ids are ignored.
    pub fn update_items(&mut self, payload: SearchPayload) -> usize {
        let mut updated = 0;
        for item in payload.items {
            if let Some(existing) = self.items.get_mut(&item.id) {
                if item.revision >= existing.revision {
                    *existing = item;
                    updated += 1;
                }
            }
        }
        updated
    }

    /// Add or remove `user` from each item's watcher set.
    pub fn set_watching(&mut self, ids: &[ItemId], user: &str, watching: bool) {
        self.set_membership(ids, user, watching, |item| &mut item.watches);
    }

    /// Add or remove `user` from each item's bookmark set.
    pub fn set_bookmarked(&mut self, ids: &[ItemId], user: &str, bookmarked: bool) {
        self.set_membership(ids, user, bookmarked, |item| &mut item.bookmarks);
    }

    fn set_membership(
        &mut self,
        ids: &[ItemId],
        user: &str,
        member: bool,
        users: fn(&mut Item) -> &mut Vec<String>,
    ) {
        for id in ids {
            let Some(item) = self.items.get_mut(id) else {
                continue;
            };
            let users = users(item);
            if member {
                if !users.iter().any(|u| u == user) {
                    users.push(user.to_string());
                }
            } else {
                users.retain(|u| u != user);
            }
        }
    }
}
