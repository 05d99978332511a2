//! Coordinated fetch, search, filter and pagination state for the catalog.
//!
//! Every trigger takes a number from a monotonically increasing sequence
//! before its request goes out. A response is applied only if its number is
//! still the latest, so a slow response can never overwrite the result of a
//! request issued after it. Superseded requests are left to finish, their
//! results are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use derive_more::Display;
use recipebox_catalog::{NewRecipe, Recipe, RecipeId};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::providers::catalog::{CatalogError, ClientTrait};

pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(400);

const FETCH_FAILED: &str = "Failed to fetch recipes";
const SEARCH_FAILED: &str = "Search failed";
const TAGS_FAILED: &str = "Failed to fetch tags";
const ADD_FAILED: &str = "Failed to add recipe";
const DETAIL_FAILED: &str = "Failed to fetch recipe";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryStatus {
    #[default]
    Idle,
    Loading,
    Resolved,
    Error(String),
}

impl QueryStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryStatus::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryStatus::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// How a selected tag is looked up in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagLookup {
    /// Full text search for the tag.
    #[default]
    #[display("search")]
    Search,
    /// The dedicated `/tag/<tag>` endpoint.
    #[display("endpoint")]
    Endpoint,
}

/// A logical request for a page of recipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    All { limit: u32, skip: u64 },
    Search(String),
    Tag(String),
}

impl Query {
    fn failure_message(&self) -> &'static str {
        match self {
            Query::All { .. } => FETCH_FAILED,
            Query::Search(_) | Query::Tag(_) => SEARCH_FAILED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    Next,
    Prev,
}

/// What became of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The outcome, success or failure, is reflected in the state.
    Applied,
    /// A newer request was issued before this one completed.
    Superseded,
    /// Nothing to do, no request was sent.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct CatalogState {
    pub items: Vec<Recipe>,
    /// Number of recipes matching the query on the server.
    pub total: u64,
    /// The committed search text.
    pub search_query: String,
    pub selected_tag: String,
    /// Page size, 0 means unbounded.
    pub limit: u32,
    pub skip: u64,
    pub status: QueryStatus,
    pub last_query: Option<Query>,
    pub tags: Vec<String>,
    pub tags_status: QueryStatus,
    pub current_item: Option<Recipe>,
    pub detail_status: QueryStatus,
    /// Outcome of the latest [CatalogController::add_item].
    pub add_status: QueryStatus,
    seq: u64,
    detail_seq: u64,
}

impl CatalogState {
    fn new(limit: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            search_query: String::new(),
            selected_tag: String::new(),
            limit,
            skip: 0,
            status: QueryStatus::Idle,
            last_query: None,
            tags: Vec::new(),
            tags_status: QueryStatus::Idle,
            current_item: None,
            detail_status: QueryStatus::Idle,
            add_status: QueryStatus::Idle,
            seq: 0,
            detail_seq: 0,
        }
    }

    /// Whether there is a page after the current one.
    pub fn has_next_page(&self) -> bool {
        self.limit != 0 && self.skip + u64::from(self.limit) < self.total
    }

    pub fn has_prev_page(&self) -> bool {
        self.limit != 0 && self.skip > 0
    }
}

fn failure_message(err: &CatalogError, fallback: &str) -> String {
    err.upstream_message()
        .map(ToString::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

/// The single source of truth for the browsed recipes.
///
/// Methods take `&self` and can be issued concurrently. The state lock is
/// never held across a request.
#[derive(Debug)]
pub struct CatalogController<C> {
    client: C,
    state: Mutex<CatalogState>,
    tags_requested: AtomicBool,
    debounce: Mutex<Option<JoinHandle<()>>>,
    debounce_delay: Duration,
    tag_lookup: TagLookup,
}

impl<C: ClientTrait> CatalogController<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            state: Mutex::new(CatalogState::new(DEFAULT_LIMIT)),
            tags_requested: AtomicBool::new(false),
            debounce: Mutex::new(None),
            debounce_delay: DEFAULT_SEARCH_DEBOUNCE,
            tag_lookup: TagLookup::default(),
        }
    }

    pub fn with_limit(self, limit: u32) -> Self {
        self.lock().limit = limit;
        self
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }

    pub fn with_tag_lookup(mut self, tag_lookup: TagLookup) -> Self {
        self.tag_lookup = tag_lookup;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> CatalogState {
        self.lock().clone()
    }

    /// Take a sequence number, update the state and send `query`.
    ///
    /// `prepare` runs under the same lock as the sequence bump.
    async fn issue(&self, query: Query, prepare: impl FnOnce(&mut CatalogState)) -> Settled {
        let seq = {
            let mut state = self.lock();
            prepare(&mut state);
            state.seq += 1;
            state.status = QueryStatus::Loading;
            state.last_query = Some(query.clone());
            state.seq
        };
        debug!(seq, ?query, "issuing catalog query");

        let result = match &query {
            Query::All { limit, skip } => self.client.list(*limit, *skip).await,
            Query::Search(text) => self.client.search(text).await,
            Query::Tag(tag) => match self.tag_lookup {
                TagLookup::Search => self.client.search(tag).await,
                TagLookup::Endpoint => self.client.by_tag(tag).await,
            },
        };

        let mut state = self.lock();
        if state.seq != seq {
            debug!(seq, latest = state.seq, ?query, "dropping superseded response");
            return Settled::Superseded;
        }
        match result {
            Ok(page) => {
                state.items = page.recipes;
                state.total = page.total;
                state.status = QueryStatus::Resolved;
            },
            Err(err) => {
                warn!(error = %err, ?query, "catalog query failed");
                state.status = QueryStatus::Error(failure_message(&err, query.failure_message()));
            },
        }
        Settled::Applied
    }

    /// Fetch a page of all recipes.
    #[instrument(skip(self))]
    pub async fn fetch_all(&self, limit: u32, skip: u64) -> Settled {
        self.issue(Query::All { limit, skip }, |state| {
            state.limit = limit;
            state.skip = skip;
        })
        .await
    }

    /// Commit `query` as the search text and search for it.
    ///
    /// Blank text lists all recipes instead.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Settled {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            let limit = {
                let mut state = self.lock();
                state.search_query = query.to_string();
                state.limit
            };
            return self.fetch_all(limit, 0).await;
        }
        self.issue(Query::Search(trimmed.to_string()), |state| {
            state.search_query = query.to_string();
            state.skip = 0;
        })
        .await
    }

    /// Select a tag, or clear the selection with an empty string.
    #[instrument(skip(self))]
    pub async fn set_tag(&self, tag: &str) -> Settled {
        if tag.is_empty() {
            let limit = {
                let mut state = self.lock();
                state.selected_tag.clear();
                state.limit
            };
            return self.fetch_all(limit, 0).await;
        }
        self.issue(Query::Tag(tag.to_string()), |state| {
            state.selected_tag = tag.to_string();
            state.skip = 0;
        })
        .await
    }

    /// Change the page size and go back to the first page.
    #[instrument(skip(self))]
    pub async fn set_limit(&self, limit: u32) -> Settled {
        self.fetch_all(limit, 0).await
    }

    /// Move one page forward or back.
    ///
    /// Does nothing when the page size is unbounded, past the last page, or
    /// before the first.
    #[instrument(skip(self))]
    pub async fn paginate(&self, direction: PageDirection) -> Settled {
        let (limit, skip) = {
            let state = self.lock();
            let limit = state.limit;
            let skip = match direction {
                PageDirection::Next if state.has_next_page() => state.skip + u64::from(limit),
                PageDirection::Prev if state.has_prev_page() => {
                    state.skip.saturating_sub(u64::from(limit))
                },
                _ => return Settled::Skipped,
            };
            (limit, skip)
        };
        self.fetch_all(limit, skip).await
    }

    /// Re-issue the last logical request.
    pub async fn retry(&self) -> Settled {
        let (last_query, limit, skip) = {
            let state = self.lock();
            (state.last_query.clone(), state.limit, state.skip)
        };
        match last_query {
            Some(query) => self.issue(query, |_| {}).await,
            None => self.fetch_all(limit, skip).await,
        }
    }

    /// Reset search, tag and page, then list all recipes.
    pub async fn clear_filters(&self) -> Settled {
        let limit = {
            let mut state = self.lock();
            state.search_query.clear();
            state.selected_tag.clear();
            state.limit
        };
        self.fetch_all(limit, 0).await
    }

    /// Load the category labels.
    ///
    /// Only the first call sends a request. A failed load can be retried.
    #[instrument(skip(self))]
    pub async fn fetch_tags(&self) -> Settled {
        if self.tags_requested.swap(true, Ordering::SeqCst) {
            return Settled::Skipped;
        }
        self.lock().tags_status = QueryStatus::Loading;

        let result = self.client.tags().await;
        let mut state = self.lock();
        match result {
            Ok(tags) => {
                debug!(count = tags.len(), "loaded tags");
                state.tags = tags;
                state.tags_status = QueryStatus::Resolved;
            },
            Err(err) => {
                warn!(error = %err, "couldn't load tags");
                state.tags_status = QueryStatus::Error(failure_message(&err, TAGS_FAILED));
                self.tags_requested.store(false, Ordering::SeqCst);
            },
        }
        Settled::Applied
    }

    /// Submit a recipe and put the catalog's echo first in the list.
    ///
    /// The catalog doesn't store new recipes, so `total` stays as it is.
    /// The outcome is reported in `add_status`, the list query status is left
    /// alone.
    #[instrument(skip_all, fields(name = %recipe.name))]
    pub async fn add_item(&self, recipe: &NewRecipe) -> Result<Recipe, CatalogError> {
        self.lock().add_status = QueryStatus::Loading;
        let result = self.client.add(recipe).await;
        let mut state = self.lock();
        match result {
            Ok(echo) => {
                state.items.insert(0, echo.clone());
                state.add_status = QueryStatus::Resolved;
                Ok(echo)
            },
            Err(err) => {
                warn!(error = %err, "couldn't add recipe");
                state.add_status = QueryStatus::Error(failure_message(&err, ADD_FAILED));
                Err(err)
            },
        }
    }

    /// Load a single recipe into `current_item`.
    #[instrument(skip(self))]
    pub async fn fetch_item(&self, id: RecipeId) -> Settled {
        let seq = {
            let mut state = self.lock();
            state.detail_seq += 1;
            state.detail_status = QueryStatus::Loading;
            state.detail_seq
        };

        let result = self.client.get(id).await;
        let mut state = self.lock();
        if state.detail_seq != seq {
            debug!(id, "dropping superseded recipe");
            return Settled::Superseded;
        }
        match result {
            Ok(recipe) => {
                state.current_item = Some(recipe);
                state.detail_status = QueryStatus::Resolved;
            },
            Err(err) => {
                warn!(id, error = %err, "couldn't fetch recipe");
                state.detail_status = QueryStatus::Error(failure_message(&err, DETAIL_FAILED));
            },
        }
        Settled::Applied
    }

    pub fn clear_current_item(&self) {
        let mut state = self.lock();
        state.current_item = None;
        state.detail_status = QueryStatus::Idle;
    }

    pub fn clear_error(&self) {
        let mut state = self.lock();
        if state.status.error().is_some() {
            state.status = QueryStatus::Idle;
        }
        if state.detail_status.error().is_some() {
            state.detail_status = QueryStatus::Idle;
        }
        if state.add_status.error().is_some() {
            state.add_status = QueryStatus::Idle;
        }
    }

    /// Commit debounced search text unless it is already committed.
    async fn commit_search_input(&self, text: String) -> Settled {
        if self.lock().search_query == text {
            return Settled::Skipped;
        }
        self.search(&text).await
    }
}

impl<C: ClientTrait + 'static> CatalogController<C> {
    /// Feed free text from a search box.
    ///
    /// The text is committed once no further input arrived for the debounce
    /// delay. Each call restarts the timer. Must be called from within a tokio
    /// runtime.
    pub fn set_search_input(self: &Arc<Self>, text: impl Into<String>) {
        let text = text.into();
        let controller = Arc::clone(self);
        let delay = self.debounce_delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // detached, a later keystroke must not abort a request in flight
            tokio::spawn(async move {
                controller.commit_search_input(text).await;
            });
        });

        let previous = self
            .debounce
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(timer);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use recipebox_catalog::RecipePage;

    use super::*;
    use crate::providers::catalog::test_helpers::*;
    use crate::providers::catalog::{MockClient, MockRequest, Response};

    fn controller() -> (MockClient, CatalogController<MockClient>) {
        let client = MockClient::default();
        (client.clone(), CatalogController::new(client))
    }

    fn names(state: &CatalogState) -> Vec<&str> {
        state.items.iter().map(|recipe| recipe.name.as_str()).collect()
    }

    #[tokio::test]
    async fn fetch_all_resolves_page() {
        let (client, controller) = controller();
        client.push_page_response(page(1, &["Margherita", "Carbonara"], 50));

        assert_eq!(controller.fetch_all(10, 0).await, Settled::Applied);

        let state = controller.snapshot();
        assert_eq!(names(&state), vec!["Margherita", "Carbonara"]);
        assert_eq!(state.total, 50);
        assert_eq!(state.status, QueryStatus::Resolved);
        assert_eq!(client.received(), vec![MockRequest::List { limit: 10, skip: 0 }]);
    }

    #[tokio::test]
    async fn failure_keeps_items_and_uses_upstream_message() {
        let (client, controller) = controller();
        client.push_page_response(page(1, &["Margherita"], 1));
        client.push_error_response(500, Some("database on fire"));
        client.push_error_response(500, None);

        controller.fetch_all(10, 0).await;
        controller.search("pizza").await;
        let state = controller.snapshot();
        assert_eq!(state.status, QueryStatus::Error("database on fire".to_string()));
        assert_eq!(names(&state), vec!["Margherita"]);

        controller.fetch_all(10, 0).await;
        assert_eq!(
            controller.snapshot().status.error(),
            Some("Failed to fetch recipes")
        );

        controller.clear_error();
        assert_eq!(controller.snapshot().status, QueryStatus::Idle);
    }

    /// Whichever response arrives last, only the latest search is applied
    #[tokio::test(start_paused = true)]
    async fn superseded_search_is_dropped() {
        for (pasta_delay, rice_delay) in [(300, 100), (100, 300)] {
            let (client, controller) = controller();
            client.push_delayed(
                Response::Page(page(1, &["Pasta al Pomodoro"], 1)),
                Duration::from_millis(pasta_delay),
            );
            client.push_delayed(
                Response::Page(page(2, &["Fried Rice"], 1)),
                Duration::from_millis(rice_delay),
            );

            let (pasta, rice) = tokio::join!(controller.search("pasta"), controller.search("rice"));

            assert_eq!(pasta, Settled::Superseded);
            assert_eq!(rice, Settled::Applied);
            let state = controller.snapshot();
            assert_eq!(names(&state), vec!["Fried Rice"]);
            assert_eq!(state.search_query, "rice");
            // superseded requests are not aborted
            assert_eq!(client.received().len(), 2);
        }
    }

    /// A page turn that is still in flight when a tag is picked is dropped
    #[tokio::test(start_paused = true)]
    async fn tag_supersedes_page_turn() {
        for (page_delay, tag_delay) in [(300, 100), (100, 300)] {
            let (client, controller) = controller();
            client.push_page_response(page(1, &["Margherita"], 23));
            client.push_delayed(
                Response::Page(page(6, &["Carbonara"], 23)),
                Duration::from_millis(page_delay),
            );
            client.push_delayed(
                Response::Page(page(40, &["Pad Thai"], 1)),
                Duration::from_millis(tag_delay),
            );

            controller.fetch_all(5, 0).await;
            let (turned, tagged) = tokio::join!(
                controller.paginate(PageDirection::Next),
                controller.set_tag("Thai")
            );

            assert_eq!(turned, Settled::Superseded);
            assert_eq!(tagged, Settled::Applied);
            let state = controller.snapshot();
            assert_eq!(names(&state), vec!["Pad Thai"]);
            assert_eq!(state.total, 1);
            assert_eq!(state.skip, 0);
            assert_eq!(state.selected_tag, "Thai");
            assert_eq!(state.status, QueryStatus::Resolved);
        }
    }

    /// A tag lookup that is still in flight when the filters are cleared is
    /// dropped
    #[tokio::test(start_paused = true)]
    async fn clearing_filters_supersedes_tag() {
        for (tag_delay, clear_delay) in [(300, 100), (100, 300)] {
            let (client, controller) = controller();
            client.push_delayed(
                Response::Page(page(40, &["Pad Thai"], 1)),
                Duration::from_millis(tag_delay),
            );
            client.push_delayed(
                Response::Page(page(1, &["Margherita", "Carbonara"], 23)),
                Duration::from_millis(clear_delay),
            );

            let (tagged, cleared) =
                tokio::join!(controller.set_tag("Thai"), controller.clear_filters());

            assert_eq!(tagged, Settled::Superseded);
            assert_eq!(cleared, Settled::Applied);
            let state = controller.snapshot();
            assert_eq!(names(&state), vec!["Margherita", "Carbonara"]);
            assert_eq!(state.total, 23);
            assert_eq!(state.skip, 0);
            assert_eq!(state.selected_tag, "");
            assert_eq!(client.received(), vec![
                MockRequest::Search("Thai".to_string()),
                MockRequest::List { limit: 10, skip: 0 },
            ]);
        }
    }

    /// A retried page that fails late doesn't clobber a newer page size
    #[tokio::test(start_paused = true)]
    async fn set_limit_supersedes_retry() {
        let (client, controller) = controller();
        client.push_page_response(page(1, &["Margherita"], 23));
        client.push_delayed(
            Response::Error {
                status: 500,
                message: None,
            },
            Duration::from_millis(300),
        );
        client.push_delayed(
            Response::Page(page(1, &["Margherita", "Carbonara"], 23)),
            Duration::from_millis(100),
        );

        controller.fetch_all(5, 10).await;
        let (retried, resized) = tokio::join!(controller.retry(), controller.set_limit(20));

        assert_eq!(retried, Settled::Superseded);
        assert_eq!(resized, Settled::Applied);
        let state = controller.snapshot();
        assert_eq!(names(&state), vec!["Margherita", "Carbonara"]);
        assert_eq!((state.limit, state.skip, state.total), (20, 0, 23));
        assert_eq!(state.status, QueryStatus::Resolved);
    }

    #[tokio::test]
    async fn pagination_arithmetic() {
        let (client, controller) = controller();
        for _ in 0..4 {
            client.push_page_response(RecipePage {
                total: 23,
                ..Default::default()
            });
        }

        controller.fetch_all(5, 0).await;
        assert_eq!(controller.paginate(PageDirection::Next).await, Settled::Applied);
        assert_eq!(controller.paginate(PageDirection::Next).await, Settled::Applied);
        assert_eq!(controller.snapshot().skip, 10);

        assert_eq!(controller.paginate(PageDirection::Prev).await, Settled::Applied);
        assert_eq!(controller.snapshot().skip, 5);

        assert_eq!(client.received(), vec![
            MockRequest::List { limit: 5, skip: 0 },
            MockRequest::List { limit: 5, skip: 5 },
            MockRequest::List { limit: 5, skip: 10 },
            MockRequest::List { limit: 5, skip: 5 },
        ]);
    }

    #[tokio::test]
    async fn next_page_past_total_is_a_no_op() {
        let (client, controller) = controller();
        client.push_page_response(RecipePage {
            total: 23,
            ..Default::default()
        });

        controller.fetch_all(10, 20).await;
        assert_eq!(controller.paginate(PageDirection::Next).await, Settled::Skipped);
        assert_eq!(controller.snapshot().skip, 20);
        assert_eq!(client.received().len(), 1);
    }

    #[tokio::test]
    async fn prev_page_never_goes_negative() {
        let (client, controller) = controller();
        for _ in 0..3 {
            client.push_page_response(RecipePage {
                total: 23,
                ..Default::default()
            });
        }

        controller.fetch_all(10, 0).await;
        assert_eq!(controller.paginate(PageDirection::Prev).await, Settled::Skipped);

        controller.fetch_all(10, 3).await;
        controller.paginate(PageDirection::Prev).await;
        assert_eq!(controller.snapshot().skip, 0);
    }

    #[tokio::test]
    async fn unbounded_limit_disables_pagination() {
        let (client, controller) = controller();
        client.push_page_response(RecipePage {
            total: 50,
            ..Default::default()
        });

        controller.fetch_all(0, 0).await;
        assert_eq!(controller.paginate(PageDirection::Next).await, Settled::Skipped);
        assert_eq!(controller.paginate(PageDirection::Prev).await, Settled::Skipped);
    }

    #[tokio::test]
    async fn set_limit_resets_skip() {
        let (client, controller) = controller();
        client.push_page_response(page(1, &["a"], 40));
        client.push_page_response(page(1, &["a"], 40));

        controller.fetch_all(10, 20).await;
        controller.set_limit(20).await;

        let state = controller.snapshot();
        assert_eq!((state.limit, state.skip), (20, 0));
    }

    #[tokio::test]
    async fn tag_searches_by_default() {
        let (client, controller) = controller();
        client.push_page_response(page(1, &["Carbonara"], 1));
        client.push_page_response(page(1, &["a", "b"], 2));

        controller.set_tag("Italian").await;
        assert_eq!(controller.snapshot().selected_tag, "Italian");

        controller.set_tag("").await;
        let state = controller.snapshot();
        assert_eq!(state.selected_tag, "");
        assert_eq!(client.received(), vec![
            MockRequest::Search("Italian".to_string()),
            MockRequest::List {
                limit: DEFAULT_LIMIT,
                skip: 0
            },
        ]);
    }

    #[tokio::test]
    async fn tag_endpoint_lookup() {
        let client = MockClient::default();
        let controller =
            CatalogController::new(client.clone()).with_tag_lookup(TagLookup::Endpoint);
        client.push_page_response(page(1, &["Carbonara"], 1));

        controller.set_tag("Italian").await;
        assert_eq!(client.received(), vec![MockRequest::ByTag("Italian".to_string())]);
    }

    #[tokio::test]
    async fn retry_reissues_last_query() {
        let (client, controller) = controller();
        client.push_error_response(503, None);
        client.push_page_response(page(1, &["Pad Thai"], 1));

        controller.search("thai").await;
        assert_eq!(controller.snapshot().status.error(), Some("Search failed"));

        controller.retry().await;
        assert_eq!(controller.snapshot().status, QueryStatus::Resolved);
        assert_eq!(client.received(), vec![
            MockRequest::Search("thai".to_string()),
            MockRequest::Search("thai".to_string()),
        ]);
    }

    #[tokio::test]
    async fn clear_filters_lists_everything() {
        let (client, controller) = controller();
        client.push_page_response(page(1, &["Carbonara"], 1));
        client.push_page_response(page(1, &["Carbonara"], 1));
        client.push_page_response(page(1, &["a"], 50));

        controller.search("carbonara").await;
        controller.set_tag("Italian").await;
        controller.clear_filters().await;

        let state = controller.snapshot();
        assert_eq!(state.search_query, "");
        assert_eq!(state.selected_tag, "");
        assert_eq!(state.skip, 0);
        assert_eq!(state.total, 50);
    }

    #[tokio::test]
    async fn tags_are_fetched_once() {
        let (client, controller) = controller();
        client.push_error_response(500, None);
        client.push_tags_response(vec!["Italian".to_string(), "Thai".to_string()]);

        assert_eq!(controller.fetch_tags().await, Settled::Applied);
        assert_eq!(
            controller.snapshot().tags_status.error(),
            Some("Failed to fetch tags")
        );

        // failure allows another attempt
        assert_eq!(controller.fetch_tags().await, Settled::Applied);
        assert_eq!(controller.fetch_tags().await, Settled::Skipped);
        assert_eq!(controller.snapshot().tags, vec![
            "Italian".to_string(),
            "Thai".to_string()
        ]);
        assert_eq!(client.received().len(), 2);
    }

    #[tokio::test]
    async fn added_item_is_prepended() {
        let (client, controller) = controller();
        client.push_page_response(page(1, &["Margherita", "Carbonara"], 50));
        client.push_recipe_response(recipe(51, "Toast", &[], ""));
        client.push_error_response(400, None);

        controller.fetch_all(10, 0).await;
        let new_recipe = NewRecipe {
            name: "Toast".to_string(),
            ..Default::default()
        };
        let echo = controller.add_item(&new_recipe).await.unwrap();
        assert_eq!(echo.id, 51);

        let state = controller.snapshot();
        assert_eq!(names(&state), vec!["Toast", "Margherita", "Carbonara"]);
        assert_eq!(state.total, 50);

        assert_eq!(state.add_status, QueryStatus::Resolved);

        assert!(controller.add_item(&new_recipe).await.is_err());
        let state = controller.snapshot();
        assert_eq!(state.add_status.error(), Some("Failed to add recipe"));
        // the list is still resolved
        assert_eq!(state.status, QueryStatus::Resolved);
    }

    /// A failed add while a list query is loading leaves the query alone
    #[tokio::test(start_paused = true)]
    async fn failed_add_does_not_touch_loading_query() {
        let (client, controller) = controller();
        client.push_delayed(
            Response::Page(page(1, &["Margherita"], 1)),
            Duration::from_millis(300),
        );
        client.push_error_response(400, Some("name is required"));

        let new_recipe = NewRecipe::default();
        let (listed, added) = tokio::join!(controller.fetch_all(10, 0), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let added = controller.add_item(&new_recipe).await;
            assert!(controller.snapshot().status.is_loading());
            added
        });

        assert_eq!(listed, Settled::Applied);
        assert!(added.is_err());
        let state = controller.snapshot();
        assert_eq!(state.status, QueryStatus::Resolved);
        assert_eq!(names(&state), vec!["Margherita"]);
        assert_eq!(state.add_status.error(), Some("name is required"));

        controller.clear_error();
        assert_eq!(controller.snapshot().add_status, QueryStatus::Idle);
    }

    #[tokio::test]
    async fn fetch_item_sets_current_item() {
        let (client, controller) = controller();
        client.push_recipe_response(recipe(7, "Ramen", &["Japanese"], "Japanese"));
        client.push_error_response(404, Some("Recipe with id '999' not found"));

        controller.fetch_item(7).await;
        let state = controller.snapshot();
        assert_eq!(state.current_item.unwrap().name, "Ramen");
        assert_eq!(state.detail_status, QueryStatus::Resolved);

        controller.fetch_item(999).await;
        let state = controller.snapshot();
        assert_eq!(
            state.detail_status.error(),
            Some("Recipe with id '999' not found")
        );
        // the list state is not touched
        assert_eq!(state.status, QueryStatus::Idle);

        controller.clear_current_item();
        let state = controller.snapshot();
        assert_eq!(state.current_item, None);
        assert_eq!(state.detail_status, QueryStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn search_input_is_debounced() {
        let client = MockClient::default();
        let controller = Arc::new(CatalogController::new(client.clone()));
        client.push_page_response(page(1, &["Pasta Carbonara"], 1));

        for text in ["p", "pa", "pas", "pasta"] {
            controller.set_search_input(text);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(client.received().is_empty());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.received(), vec![MockRequest::Search("pasta".to_string())]);
        assert_eq!(controller.snapshot().search_query, "pasta");
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_search_input_is_not_sent() {
        let client = MockClient::default();
        let controller = Arc::new(CatalogController::new(client.clone()));
        client.push_page_response(page(1, &["Pasta Carbonara"], 1));

        controller.set_search_input("pasta");
        tokio::time::sleep(Duration::from_millis(500)).await;
        controller.set_search_input("pasta");
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(client.received().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_search_input_lists_all() {
        let client = MockClient::default();
        let controller = Arc::new(CatalogController::new(client.clone()));
        client.push_page_response(page(1, &["Pasta Carbonara"], 1));
        client.push_page_response(page(1, &["a", "b"], 50));

        controller.set_search_input("pasta");
        tokio::time::sleep(Duration::from_millis(500)).await;
        controller.set_search_input("   ");
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(client.received(), vec![
            MockRequest::Search("pasta".to_string()),
            MockRequest::List {
                limit: DEFAULT_LIMIT,
                skip: 0
            },
        ]);
        assert_eq!(controller.snapshot().total, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn keystroke_does_not_abort_request_in_flight() {
        let client = MockClient::default();
        let controller = Arc::new(CatalogController::new(client.clone()));
        client.push_delayed(
            Response::Page(page(1, &["Pasta Carbonara"], 1)),
            Duration::from_millis(1_000),
        );

        controller.set_search_input("pasta");
        // timer fired, request in flight
        tokio::time::sleep(Duration::from_millis(500)).await;
        controller.set_search_input("pastaa");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_search_input("pasta");
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        assert_eq!(names(&controller.snapshot()), vec!["Pasta Carbonara"]);
        assert_eq!(client.received(), vec![MockRequest::Search("pasta".to_string())]);
    }
}
