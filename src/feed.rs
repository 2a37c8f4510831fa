//! Feed session: the single-threaded controller.
//!
//! Owns every component and is the only place that sequences them. All
//! network work goes through the injected [`Transport`], and persistence
//! through the injected [`LocalStore`]. Failures never escape as errors;
//! they come back as a [`FeedNotice`] with committed state left untouched.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;

use crate::agenda::{AgendaGrouper, AgendaGroups, DateGroupingState, Grouping};
use crate::anchor::{Anchor, AnchorInputs, DateAnchorResolver};
use crate::config::FeedConfig;
use crate::coverage::{classify_coverages, ClassifiedCoverages};
use crate::dates::timezone_offset_minutes;
use crate::error::{FeedError, FeedNotice};
use crate::interaction::{ListEffect, ListInteraction, NavKey};
use crate::notifier::{classify, PushEvent, PushMessage, TopicBadges};
use crate::persist::LocalStore;
use crate::query::{build_params, SearchParams};
use crate::selection::SelectionTracker;
use crate::store::{AppendSummary, CommitSummary, Rejection, ResultStore};
use crate::transport::Transport;
use crate::types::{CreatedFilter, ItemId, PlanningRef, SearchPayload, SearchState, Topic};

/// Result of a fetch-style operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Committed(CommitSummary),
    Appended(AppendSummary),
    /// Refused by store policy. Nothing was requested.
    Rejected(Rejection),
    Failed(FeedNotice),
    /// Refresh found nothing staged.
    NothingStaged,
}

pub struct FeedSession {
    config: FeedConfig,
    tz: Tz,
    transport: Arc<dyn Transport>,
    local: Arc<dyn LocalStore>,
    clock: fn() -> DateTime<Utc>,

    search: SearchState,
    store: ResultStore,
    selection: SelectionTracker,
    grouping: DateGroupingState,
    resolver: DateAnchorResolver,
    grouper: AgendaGrouper,

    topics: Vec<Topic>,
    badges: TopicBadges,
    saved_items_count: Option<u64>,

    active_item: Option<ItemId>,
    preview_item: Option<ItemId>,
    open_item: Option<ItemId>,
    interaction: ListInteraction,
    effects: mpsc::UnboundedReceiver<ListEffect>,
}

impl FeedSession {
    pub fn new(
        config: FeedConfig,
        transport: Arc<dyn Transport>,
        local: Arc<dyn LocalStore>,
    ) -> Result<Self, FeedError> {
        let tz = config.timezone()?;
        let search = SearchState {
            user: config.user.clone(),
            section: Some(config.section.clone()),
            active_filter: local.dropdown_filter(),
            ..Default::default()
        };
        let (interaction, effects) =
            ListInteraction::new(config.click_delay(), config.preview_delay());

        let mut session = Self {
            tz,
            transport,
            clock: Utc::now,
            search,
            store: ResultStore::new(config.page_cap),
            selection: SelectionTracker::new(),
            grouping: DateGroupingState {
                anchor: Anchor::Earliest,
                grouping: Grouping::Day,
            },
            resolver: DateAnchorResolver::new(tz, config.week_start),
            grouper: AgendaGrouper::new(tz, config.week_start),
            topics: Vec::new(),
            badges: TopicBadges::default(),
            saved_items_count: None,
            active_item: None,
            preview_item: None,
            open_item: None,
            interaction,
            effects,
            local,
            config,
        };
        session.grouping.anchor = session.resolve_anchor();
        Ok(session)
    }

    /// Replace the wall clock used for anchors and timezone offsets.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self.grouping.anchor = self.resolve_anchor();
        self
    }

    /// Seed read state reported by the server.
    pub fn with_read_state(mut self, read: std::collections::HashMap<ItemId, u64>) -> Self {
        self.selection = SelectionTracker::with_read_state(read);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn search(&self) -> &SearchState {
        &self.search
    }

    pub fn grouping(&self) -> &DateGroupingState {
        &self.grouping
    }

    pub fn selection(&self) -> &SelectionTracker {
        &self.selection
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn badges(&self) -> &TopicBadges {
        &self.badges
    }

    pub fn saved_items_count(&self) -> Option<u64> {
        self.saved_items_count
    }

    pub fn active_item(&self) -> Option<&str> {
        self.active_item.as_deref()
    }

    pub fn previewed_item(&self) -> Option<&str> {
        self.preview_item.as_deref()
    }

    pub fn opened_item(&self) -> Option<&str> {
        self.open_item.as_deref()
    }

    /// Parameters the next request at `page_offset` would carry.
    pub fn params(&self, page_offset: usize) -> SearchParams {
        let offset = timezone_offset_minutes(&self.tz, (self.clock)());
        build_params(&self.search, page_offset, offset)
    }

    fn resolve_anchor(&self) -> Anchor {
        let inputs = AnchorInputs {
            bookmarks: self.search.bookmarks,
            created_filter: &self.search.created_filter,
            persisted: self.local.active_date(),
        };
        self.resolver.resolve(&inputs, (self.clock)())
    }

    fn notice(&self, context: &str, err: &FeedError) -> FeedNotice {
        if err.is_retryable() {
            log::warn!("{} failed: {}", context, err);
        } else {
            log::error!("{} failed: {}", context, err);
        }
        FeedNotice::from(err)
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    /// Run the current query from offset 0 and replace the result set.
    pub async fn fetch_items(&mut self) -> FetchOutcome {
        if let Err(rejection) = self.store.start_query() {
            return FetchOutcome::Rejected(rejection);
        }
        let params = self.params(0);
        let result = self.transport.search(&params).await;
        match result {
            Ok(payload) => FetchOutcome::Committed(self.commit(payload)),
            Err(e) => {
                self.store.abort_fetch();
                FetchOutcome::Failed(self.notice("Search", &e))
            }
        }
    }

    /// Request the next page at the committed count.
    pub async fn fetch_more(&mut self) -> FetchOutcome {
        let offset = match self.store.begin_page() {
            Ok(offset) => offset,
            Err(rejection) => return FetchOutcome::Rejected(rejection),
        };
        let params = self.params(offset);
        let result = self.transport.search(&params).await;
        match result {
            Ok(payload) => match self.store.append_page(payload) {
                Ok(summary) => {
                    self.prune_selection();
                    FetchOutcome::Appended(summary)
                }
                Err(rejection) => FetchOutcome::Rejected(rejection),
            },
            Err(e) => {
                self.store.abort_fetch();
                FetchOutcome::Failed(self.notice("Fetch more", &e))
            }
        }
    }

    /// Commit whatever a background fetch staged.
    pub fn refresh(&mut self) -> FetchOutcome {
        match self.store.consume_stage() {
            Some(payload) => FetchOutcome::Committed(self.commit(payload)),
            None => FetchOutcome::NothingStaged,
        }
    }

    fn commit(&mut self, payload: SearchPayload) -> CommitSummary {
        let summary = self.store.commit(payload);
        self.prune_selection();
        self.grouping.anchor = self.resolve_anchor();
        summary
    }

    fn prune_selection(&mut self) {
        let pruned = self.selection.retain_committed(&self.store);
        if pruned > 0 {
            log::debug!("Dropped {} selected items no longer in the result set", pruned);
        }
    }

    /// Ids a refresh would add to the list, for an "N new items" prompt.
    pub fn new_item_ids(&self) -> Vec<ItemId> {
        self.store.new_item_ids()
    }

    /// Re-run the current query in the background and stage the result.
    pub async fn fetch_new_items(&mut self) -> Result<(), FeedNotice> {
        let params = self.params(0);
        let result = self.transport.search(&params).await;
        match result {
            Ok(payload) => {
                log::info!(
                    "Staged {} new results (total {})",
                    payload.items.len(),
                    payload.total
                );
                self.store.stage(payload);
                Ok(())
            }
            Err(e) => Err(self.notice("Background search", &e)),
        }
    }

    /// Fetch a single item into the item map without touching the list order.
    pub async fn fetch_item(&mut self, id: &str) -> Result<(), FeedNotice> {
        let result = self.transport.fetch_one(id).await;
        match result {
            Ok(item) => {
                self.store.receive_item(item);
                Ok(())
            }
            Err(e) => Err(self.notice("Item fetch", &e)),
        }
    }

    pub async fn reload_topics(&mut self) -> Result<(), FeedNotice> {
        let Some(user) = self.search.user.clone() else {
            return Ok(());
        };
        let result = self.transport.fetch_topics(&user).await;
        match result {
            Ok(topics) => {
                self.topics = topics;
                Ok(())
            }
            Err(e) => Err(self.notice("Topic reload", &e)),
        }
    }

    /// Apply startup parameters: a query to search for and an item to open.
    ///
    /// Neither runs the search; call `fetch_items` afterwards.
    pub async fn init_params(
        &mut self,
        query: Option<&str>,
        item: Option<&str>,
    ) -> Result<(), FeedNotice> {
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            self.set_query(Some(query.to_string()));
        }
        if let Some(id) = item.filter(|id| !id.is_empty()) {
            self.fetch_item(id).await?;
            self.open_item(id);
        }
        Ok(())
    }

    /// Bookmark `ids` for the current user.
    pub async fn bookmark_items(&mut self, ids: &[ItemId]) -> Result<(), FeedNotice> {
        let result = self.transport.bookmark(ids).await;
        if let Err(e) = result {
            return Err(self.notice("Bookmark", &e));
        }
        log::info!("Bookmarked {} items", ids.len());
        if let Some(user) = self.search.user.clone() {
            self.store.set_bookmarked(ids, &user, true);
        }
        Ok(())
    }

    /// Remove bookmarks from `ids`. While browsing bookmarks the result set
    /// is fetched again so removed items drop out.
    pub async fn remove_bookmarks(&mut self, ids: &[ItemId]) -> Result<(), FeedNotice> {
        let result = self.transport.remove_bookmarks(ids).await;
        if let Err(e) = result {
            return Err(self.notice("Bookmark removal", &e));
        }
        log::info!("Removed {} bookmarks", ids.len());
        if let Some(user) = self.search.user.clone() {
            self.store.set_bookmarked(ids, &user, false);
        }
        if !self.search.bookmarks {
            return Ok(());
        }
        match self.fetch_items().await {
            FetchOutcome::Failed(notice) => Err(notice),
            outcome => {
                log::debug!("Bookmark list refetch: {:?}", outcome);
                Ok(())
            }
        }
    }

    /// Refresh items already in the map, e.g. after a bulk action.
    pub fn update_items(&mut self, payload: SearchPayload) -> usize {
        self.store.update_items(payload)
    }

    // ------------------------------------------------------------------
    // Push events
    // ------------------------------------------------------------------

    /// Dispatch a server push. Returns the event that was acted on.
    pub async fn handle_push(&mut self, message: &PushMessage) -> Result<PushEvent, FeedNotice> {
        let event = classify(message, self.search.user.as_deref());
        match &event {
            PushEvent::TopicMatches { item_id, topics } => self.badges.record(item_id, topics),
            PushEvent::NewItem => self.fetch_new_items().await?,
            PushEvent::TopicsChanged => self.reload_topics().await?,
            PushEvent::SavedItemsChanged { count } => self.saved_items_count = Some(*count),
            PushEvent::Ignored => log::debug!("Ignoring push event '{}'", message.event),
        }
        Ok(event)
    }

    // ------------------------------------------------------------------
    // Search state
    // ------------------------------------------------------------------
    //
    // These only change what the next request carries; call
    // `fetch_items` to run it.

    pub fn set_query(&mut self, query: Option<String>) {
        self.search.query = query;
    }

    /// Toggle `value` under facet `key`. With `single`, the facet holds at
    /// most one value. The dropdown selection is persisted.
    pub fn toggle_filter(&mut self, key: &str, value: &str, single: bool) {
        let values = self.search.active_filter.entry(key.to_string()).or_default();
        let was_selected = values.iter().any(|v| v == value);
        if single {
            values.clear();
            if !was_selected {
                values.push(value.to_string());
            }
        } else if was_selected {
            values.retain(|v| v != value);
        } else {
            values.push(value.to_string());
        }
        if values.is_empty() {
            self.search.active_filter.remove(key);
        }
        if let Err(e) = self.local.set_dropdown_filter(&self.search.active_filter) {
            log::warn!("Failed to persist dropdown filter: {}", e);
        }
    }

    pub fn set_created_filter(&mut self, created: CreatedFilter) {
        self.search.created_filter = created;
    }

    /// Select a navigation, or clear it when it is already active.
    pub fn toggle_navigation(&mut self, navigation: &str) {
        if self.search.active_navigation.as_deref() == Some(navigation) {
            self.search.active_navigation = None;
        } else {
            self.search.active_navigation = Some(navigation.to_string());
        }
    }

    pub fn toggle_news_only(&mut self) {
        self.search.news_only = !self.search.news_only;
    }

    pub fn set_bookmarks(&mut self, bookmarks: bool) {
        self.search.bookmarks = bookmarks;
    }

    /// Load a followed topic's query and filters, and clear its badge.
    pub fn set_topic_query(&mut self, topic: &Topic) {
        self.search.query = topic.query.clone();
        self.search.active_filter = topic.filter.clone().unwrap_or_default();
        self.search.created_filter = topic.created.clone().unwrap_or_default();
        self.badges.clear(&topic.id);
    }

    // ------------------------------------------------------------------
    // Agenda
    // ------------------------------------------------------------------

    /// Move the agenda to `instant` at `grouping` granularity.
    ///
    /// Clears the selection and the preview, and remembers the date.
    pub fn select_date(&mut self, instant: DateTime<Utc>, grouping: Grouping) {
        self.grouping = DateGroupingState {
            anchor: Anchor::At(instant),
            grouping,
        };
        self.selection.select_none();
        self.preview_item = None;
        if let Err(e) = self.local.set_active_date(instant) {
            log::warn!("Failed to persist active date: {}", e);
        }
    }

    /// Change the granularity, keeping the current anchor.
    pub fn set_grouping(&mut self, grouping: Grouping) {
        self.grouping.grouping = grouping;
    }

    /// Committed items bucketed by local day for the current anchor.
    pub fn grouped_items(&self) -> AgendaGroups {
        let items = self.store.ids().iter().filter_map(|id| self.store.get(id));
        self.grouper.group(items, &self.grouping)
    }

    pub fn coverages_for(
        &self,
        item_id: &str,
        planning_id: &str,
        day: NaiveDate,
    ) -> Option<ClassifiedCoverages<'_>> {
        let item = self.store.get(item_id)?;
        Some(classify_coverages(item, planning_id, day, &self.tz))
    }

    pub fn plans_for_day(&self, item_id: &str, day: NaiveDate) -> Vec<&PlanningRef> {
        self.store
            .get(item_id)
            .map(|item| self.grouper.plans_for_day(item, day))
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Selection and reading
    // ------------------------------------------------------------------

    pub fn toggle_selected(&mut self, id: &str) -> bool {
        self.selection.toggle(id, &self.store)
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(&self.store);
    }

    pub fn select_none(&mut self) {
        self.selection.select_none();
    }

    pub fn is_read(&self, id: &str) -> bool {
        self.store
            .get(id)
            .is_some_and(|item| self.selection.is_read(id, item.revision))
    }

    fn mark_read(&mut self, id: &str) {
        if let Some(revision) = self.store.get(id).map(|item| item.revision) {
            self.selection.mark_read(id, revision);
        }
    }

    /// Show `id` in the preview pane (or close it with `None`).
    pub fn preview_item(&mut self, id: Option<&str>) {
        if let Some(id) = id {
            self.mark_read(id);
        }
        self.preview_item = id.map(str::to_string);
    }

    pub fn open_item(&mut self, id: &str) {
        self.mark_read(id);
        self.open_item = Some(id.to_string());
    }

    pub fn close_item(&mut self) {
        self.open_item = None;
    }

    pub fn watch_items(&mut self, ids: &[ItemId]) {
        if let Some(user) = self.search.user.clone() {
            self.store.set_watching(ids, &user, true);
        }
    }

    pub fn stop_watching(&mut self, ids: &[ItemId]) {
        if let Some(user) = self.search.user.clone() {
            self.store.set_watching(ids, &user, false);
        }
    }

    // ------------------------------------------------------------------
    // List interaction
    // ------------------------------------------------------------------

    pub fn click(&mut self, id: &str) {
        self.interaction.on_click(id);
    }

    pub fn double_click(&mut self, id: &str) {
        self.interaction.on_double_click(id);
    }

    pub fn key(&mut self, key: NavKey) {
        self.interaction
            .on_key(key, self.store.ids(), self.active_item.as_deref());
    }

    pub fn apply_list_effect(&mut self, effect: ListEffect) {
        match effect {
            ListEffect::Activate(id) => self.active_item = id,
            ListEffect::Preview(id) => self.preview_item(id.as_deref()),
            ListEffect::TogglePreview(id) => {
                if self.preview_item.as_deref() == Some(id.as_str()) {
                    self.preview_item(None);
                } else {
                    self.preview_item(Some(&id));
                }
            }
            ListEffect::Open(id) => self.open_item(&id),
        }
    }

    /// Apply every list effect that has already fired.
    pub fn apply_pending_effects(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(effect) = self.effects.try_recv() {
            self.apply_list_effect(effect);
            applied += 1;
        }
        applied
    }

    /// Wait for the next list effect and apply it.
    pub async fn next_effect(&mut self) -> Option<ListEffect> {
        let effect = self.effects.recv().await?;
        self.apply_list_effect(effect.clone());
        Some(effect)
    }
}
