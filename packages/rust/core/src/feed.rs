//! Paginated QA feed for one dataset.
//!
//! Responses may complete out of issue order. Each fetch takes a sequence
//! number and only the most recently issued one may touch [`PageState`].
//! Rebinding or resetting starts a new epoch; fetches issued in an earlier
//! epoch no longer count towards [`PageState::is_loading`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use curator_client::CurationApi;
use curator_shared::{CuratorError, DatasetId, QaItem, QaPage, Result};

use crate::state::StateCell;

/// Items per page when nothing else is configured.
pub const DEFAULT_PAGE_LIMIT: u64 = 10;

/// How a fetched page combines with the items already held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Discard held items and keep only the new page.
    #[default]
    Replace,
    /// Concatenate the new page after the held items.
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub limit: u64,
    pub offset: u64,
    pub mode: FetchMode,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            mode: FetchMode::Replace,
        }
    }
}

/// Observable pagination state for the bound dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct PageState {
    pub dataset_id: Option<DatasetId>,
    pub dataset_name: String,
    pub items: Vec<QaItem>,
    pub total_count: u64,
    pub returned_count: u64,
    pub offset: u64,
    pub limit: u64,
    /// The item the user is looking at.
    pub current_item: Option<QaItem>,
    pub error: Option<String>,
    /// When the last page was applied.
    pub fetched_at: Option<DateTime<Utc>>,
    in_flight: u32,
    epoch: u64,
    latest_seq: u64,
    loaded: bool,
}

impl PageState {
    fn empty(limit: u64) -> Self {
        Self {
            dataset_id: None,
            dataset_name: String::new(),
            items: Vec::new(),
            total_count: 0,
            returned_count: 0,
            offset: 0,
            limit,
            current_item: None,
            error: None,
            fetched_at: None,
            in_flight: 0,
            epoch: 0,
            latest_seq: 0,
            loaded: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// Recomputed from the counters on every call.
    pub fn has_more_data(&self) -> bool {
        self.offset + self.returned_count < self.total_count
    }

    /// Whether a page has been applied for the bound dataset.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// 1-based page number of the last applied page.
    pub fn current_page(&self) -> u64 {
        if self.limit == 0 {
            return 1;
        }
        self.offset / self.limit + 1
    }

    /// Total number of pages at the current limit.
    pub fn page_count(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total_count.div_ceil(self.limit)
    }

    fn apply(&mut self, page: &QaPage, options: FetchOptions) {
        match options.mode {
            FetchMode::Replace => self.items = page.qa_data.clone(),
            FetchMode::Append => self.items.extend(page.qa_data.iter().cloned()),
        }
        self.dataset_name = page.dataset_name.clone();
        self.total_count = page.total_count;
        self.returned_count = page.returned_count;
        self.offset = page.offset;
        self.limit = page.limit.unwrap_or(options.limit);
        self.loaded = true;
        self.fetched_at = Some(Utc::now());

        if let Some(current) = &self.current_item {
            if !self.items.iter().any(|item| item.id == current.id) {
                self.current_item = None;
            }
        }
    }
}

/// Pages through the QA items of one dataset at a time.
pub struct PagedFeed {
    api: Arc<dyn CurationApi>,
    page_size: u64,
    state: StateCell<PageState>,
}

impl PagedFeed {
    pub fn new(api: Arc<dyn CurationApi>) -> Self {
        Self::with_page_size(api, DEFAULT_PAGE_LIMIT)
    }

    pub fn with_page_size(api: Arc<dyn CurationApi>, page_size: u64) -> Self {
        let page_size = page_size.max(1);
        Self {
            api,
            page_size,
            state: StateCell::new(PageState::empty(page_size)),
        }
    }

    /// Fetch one page and merge it into the state according to `options.mode`.
    ///
    /// The response is always returned to the caller, even when a newer fetch
    /// has superseded it and it was not applied.
    #[instrument(skip_all, fields(dataset_id = %dataset_id, limit = options.limit, offset = options.offset, mode = ?options.mode))]
    pub async fn fetch_page(&self, dataset_id: &DatasetId, options: FetchOptions) -> Result<QaPage> {
        if dataset_id.is_blank() {
            return Err(CuratorError::validation("dataset id must not be empty"));
        }
        if options.limit == 0 {
            return Err(CuratorError::validation("page limit must be at least 1"));
        }

        let (mut seq, mut epoch) = (0, 0);
        self.state.update(|s| {
            if s.dataset_id.as_ref() != Some(dataset_id) {
                let mut fresh = PageState::empty(s.limit);
                fresh.dataset_id = Some(dataset_id.clone());
                fresh.epoch = s.epoch + 1;
                fresh.latest_seq = s.latest_seq;
                *s = fresh;
            }
            s.latest_seq += 1;
            seq = s.latest_seq;
            epoch = s.epoch;
            s.in_flight += 1;
            s.error = None;
        });

        let result = self
            .api
            .list_qa(dataset_id, options.limit, options.offset)
            .await;

        let mut applied = false;
        self.state.update(|s| {
            if s.epoch == epoch {
                s.in_flight = s.in_flight.saturating_sub(1);
            }
            if s.latest_seq != seq {
                return;
            }
            applied = true;
            match &result {
                Ok(page) => s.apply(page, options),
                Err(e) => s.error = Some(e.user_message()),
            }
        });

        match result {
            Ok(page) => {
                if applied {
                    debug!(
                        returned = page.returned_count,
                        total = page.total_count,
                        "page applied"
                    );
                } else {
                    debug!(seq, "discarding superseded page response");
                }
                Ok(page)
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch QA page");
                Err(e)
            }
        }
    }

    /// Append the next page, if there is one and nothing is in flight.
    ///
    /// Returns `Ok(None)` without a request when no page was loaded for
    /// `dataset_id` yet, a fetch is pending, or everything is loaded. A page
    /// that came back empty also ends the walk, since asking for the next
    /// offset would repeat the same request.
    pub async fn load_more(&self, dataset_id: &DatasetId) -> Result<Option<QaPage>> {
        let next = self.state.read(|s| {
            if s.dataset_id.as_ref() != Some(dataset_id) || !s.loaded {
                return None;
            }
            if s.is_loading() || !s.has_more_data() || s.returned_count == 0 {
                return None;
            }
            Some(FetchOptions {
                limit: s.limit,
                offset: s.offset + s.returned_count,
                mode: FetchMode::Append,
            })
        });

        let Some(options) = next else {
            debug!(dataset_id = %dataset_id, "load_more skipped");
            return Ok(None);
        };
        self.fetch_page(dataset_id, options).await.map(Some)
    }

    /// Jump to a 1-based page at the current limit, replacing held items.
    pub async fn go_to_page(&self, dataset_id: &DatasetId, page: u64) -> Result<QaPage> {
        if page == 0 {
            return Err(CuratorError::validation("page numbers start at 1"));
        }
        let limit = self.state.read(|s| s.limit);
        info!(dataset_id = %dataset_id, page, limit, "navigating to page");
        self.fetch_page(
            dataset_id,
            FetchOptions {
                limit,
                offset: (page - 1) * limit,
                mode: FetchMode::Replace,
            },
        )
        .await
    }

    pub fn has_more_data(&self) -> bool {
        self.state.read(PageState::has_more_data)
    }

    /// Mark a loaded item as current.
    pub fn select_item(&self, item_id: &str) -> Option<QaItem> {
        let mut selected = None;
        self.state.update_if(|s| {
            selected = s.items.iter().find(|item| item.id == item_id).cloned();
            if selected.is_none() {
                return false;
            }
            s.current_item = selected.clone();
            true
        });
        selected
    }

    /// Clear all state and unbind the dataset. Outstanding fetches are discarded.
    pub fn reset(&self) {
        let page_size = self.page_size;
        self.state.update(|s| {
            let mut fresh = PageState::empty(page_size);
            fresh.epoch = s.epoch + 1;
            fresh.latest_seq = s.latest_seq + 1;
            *s = fresh;
        });
    }

    pub fn snapshot(&self) -> PageState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<PageState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{api_for, qa_page_json};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_page(server: &MockServer, offset: u64, count: usize, total: u64, calls: u64) {
        Mock::given(method("GET"))
            .and(path("/q_a/abc"))
            .and(query_param("offset", offset.to_string()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(qa_page_json("abc", offset, count, total)),
            )
            .expect(calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn counters_follow_response() {
        let server = MockServer::start().await;
        mount_page(&server, 0, 10, 25, 1).await;

        let feed = PagedFeed::new(api_for(&server));
        let id = DatasetId::from("abc");
        feed.fetch_page(&id, FetchOptions::default()).await.unwrap();

        let state = feed.snapshot();
        assert_eq!(state.items.len(), 10);
        assert_eq!(state.total_count, 25);
        assert!(state.offset + state.returned_count <= state.total_count);
        assert!(feed.has_more_data());
        assert_eq!(state.page_count(), 3);
        assert!(!state.is_loading());
        assert!(state.fetched_at.is_some());
        assert!(PagedFeed::new(api_for(&server)).snapshot().fetched_at.is_none());
    }

    #[tokio::test]
    async fn append_concatenates_and_replace_swaps() {
        let server = MockServer::start().await;
        mount_page(&server, 0, 10, 30, 1).await;
        mount_page(&server, 10, 10, 30, 2).await;

        let feed = PagedFeed::new(api_for(&server));
        let id = DatasetId::from("abc");
        feed.fetch_page(&id, FetchOptions::default()).await.unwrap();

        let append = FetchOptions {
            offset: 10,
            mode: FetchMode::Append,
            ..FetchOptions::default()
        };
        feed.fetch_page(&id, append).await.unwrap();
        assert_eq!(feed.snapshot().items.len(), 20);

        let replace = FetchOptions {
            offset: 10,
            ..FetchOptions::default()
        };
        feed.fetch_page(&id, replace).await.unwrap();
        let state = feed.snapshot();
        assert_eq!(state.items.len(), 10);
        assert_eq!(state.items[0].id, "q10");
        assert_eq!(state.current_page(), 2);
    }

    #[tokio::test]
    async fn load_more_walks_to_the_end() {
        let server = MockServer::start().await;
        mount_page(&server, 0, 10, 15, 1).await;
        mount_page(&server, 10, 5, 15, 1).await;

        let feed = PagedFeed::new(api_for(&server));
        let id = DatasetId::from("abc");
        feed.fetch_page(&id, FetchOptions::default()).await.unwrap();

        let page = feed.load_more(&id).await.unwrap();
        assert_eq!(page.map(|p| p.returned_count), Some(5));
        assert_eq!(feed.snapshot().items.len(), 15);
        assert!(!feed.has_more_data());

        // Exhausted: no request.
        assert!(feed.load_more(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_more_without_loaded_page_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let feed = PagedFeed::new(api_for(&server));
        assert!(feed.load_more(&"abc".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_more_is_guarded_while_in_flight() {
        let server = MockServer::start().await;
        mount_page(&server, 0, 10, 30, 1).await;
        Mock::given(method("GET"))
            .and(path("/q_a/abc"))
            .and(query_param("offset", "10"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(qa_page_json("abc", 10, 10, 30))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let feed = PagedFeed::new(api_for(&server));
        let id = DatasetId::from("abc");
        feed.fetch_page(&id, FetchOptions::default()).await.unwrap();

        let (first, second) = tokio::join!(feed.load_more(&id), feed.load_more(&id));
        assert!(first.unwrap().is_some());
        assert!(second.unwrap().is_none());
        assert_eq!(feed.snapshot().items.len(), 20);
    }

    #[tokio::test]
    async fn reset_forgets_fetches_from_the_previous_binding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/q_a/old"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(qa_page_json("old", 0, 10, 10))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_page(&server, 0, 10, 30, 1).await;
        Mock::given(method("GET"))
            .and(path("/q_a/abc"))
            .and(query_param("offset", "10"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(qa_page_json("abc", 10, 10, 30))
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let feed = PagedFeed::new(api_for(&server));
        let id = DatasetId::from("abc");

        let old_id = DatasetId::from("old");
        let old = feed.fetch_page(&old_id, FetchOptions::default());
        let current = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            feed.reset();
            feed.fetch_page(&id, FetchOptions::default()).await.unwrap();
            assert!(!feed.snapshot().is_loading());

            let slow_more = feed.load_more(&id);
            let second_more = async {
                // Lands after the old response and before the slow page.
                tokio::time::sleep(Duration::from_millis(300)).await;
                assert!(feed.snapshot().is_loading());
                feed.load_more(&id).await
            };
            tokio::join!(slow_more, second_more)
        };
        let (old_page, (first, second)) = tokio::join!(old, current);

        assert_eq!(old_page.unwrap().dataset_name, "ds1");
        assert!(first.unwrap().is_some());
        assert!(second.unwrap().is_none());

        let state = feed.snapshot();
        assert_eq!(state.dataset_id, Some(id));
        assert_eq!(state.items.len(), 20);
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn empty_page_ends_load_more() {
        let server = MockServer::start().await;
        // The server claims more items but hands back none.
        mount_page(&server, 0, 0, 25, 1).await;

        let feed = PagedFeed::new(api_for(&server));
        let id = DatasetId::from("abc");
        feed.fetch_page(&id, FetchOptions::default()).await.unwrap();
        assert!(feed.has_more_data());

        assert!(feed.load_more(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn go_to_page_uses_current_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/q_a/abc"))
            .and(query_param("limit", "5"))
            .and(query_param("offset", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(qa_page_json("abc", 10, 5, 42)))
            .expect(1)
            .mount(&server)
            .await;

        let feed = PagedFeed::with_page_size(api_for(&server), 5);
        let page = feed.go_to_page(&"abc".into(), 3).await.unwrap();
        assert_eq!(page.offset, 10);
        assert_eq!(feed.snapshot().current_page(), 3);

        let err = feed.go_to_page(&"abc".into(), 0).await.unwrap_err();
        assert!(matches!(err, CuratorError::Validation { .. }));
    }

    #[tokio::test]
    async fn out_of_range_page_is_accepted_empty() {
        let server = MockServer::start().await;
        mount_page(&server, 90, 0, 25, 1).await;

        let feed = PagedFeed::new(api_for(&server));
        feed.go_to_page(&"abc".into(), 10).await.unwrap();

        let state = feed.snapshot();
        assert!(state.items.is_empty());
        assert_eq!(state.returned_count, 0);
        assert!(!state.has_more_data());
    }

    #[tokio::test]
    async fn failure_keeps_items_and_records_error() {
        let server = MockServer::start().await;
        mount_page(&server, 0, 10, 30, 1).await;
        Mock::given(method("GET"))
            .and(path("/q_a/abc"))
            .and(query_param("offset", "10"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({"detail": "boom"})))
            .mount(&server)
            .await;

        let feed = PagedFeed::new(api_for(&server));
        let id = DatasetId::from("abc");
        feed.fetch_page(&id, FetchOptions::default()).await.unwrap();

        let err = feed.load_more(&id).await.unwrap_err();
        assert!(matches!(err, CuratorError::Server { status: 500, .. }));

        let state = feed.snapshot();
        assert_eq!(state.items.len(), 10);
        assert_eq!(state.offset, 0);
        assert_eq!(state.error.as_deref(), Some("boom"));
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn superseded_response_does_not_mutate_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/q_a/abc"))
            .and(query_param("offset", "0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(qa_page_json("abc", 0, 10, 30))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        mount_page(&server, 20, 10, 30, 1).await;

        let feed = PagedFeed::new(api_for(&server));
        let id = DatasetId::from("abc");

        let slow = FetchOptions::default();
        let fast = FetchOptions {
            offset: 20,
            ..FetchOptions::default()
        };
        let (slow_page, fast_page) =
            tokio::join!(feed.fetch_page(&id, slow), feed.fetch_page(&id, fast));

        // The slow response still reaches its caller.
        assert_eq!(slow_page.unwrap().offset, 0);
        assert_eq!(fast_page.unwrap().offset, 20);

        let state = feed.snapshot();
        assert_eq!(state.offset, 20);
        assert_eq!(state.items[0].id, "q20");
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn select_item_and_reset() {
        let server = MockServer::start().await;
        mount_page(&server, 0, 3, 3, 1).await;

        let feed = PagedFeed::new(api_for(&server));
        feed.fetch_page(&"abc".into(), FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(feed.select_item("q1").map(|i| i.question), Some("Question 1?".into()));
        assert!(feed.select_item("missing").is_none());
        assert_eq!(feed.snapshot().current_item.map(|i| i.id), Some("q1".into()));

        feed.reset();
        let state = feed.snapshot();
        assert!(state.dataset_id.is_none());
        assert!(state.items.is_empty());
        assert!(!state.is_loaded());
        assert_eq!(state.limit, DEFAULT_PAGE_LIMIT);
    }
}
