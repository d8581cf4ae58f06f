//! Listing controller: the pagination state machine and its async shell.
//!
//! The state machine ([`ListingState`]) is pure and exhaustively testable;
//! the shell ([`ListingController`]) runs it on a spawned cooperative task
//! that selects over consumer triggers, the invalidation bus and the single
//! in-flight fetch. Consumers read immutable [`ListingSnapshot`]s through a
//! watch channel. Dropping the controller tears the task down and cancels
//! any in-flight fetch with it.

use serde::Serialize;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::{Invalidation, InvalidationBus, InvalidationReceiver};
use crate::merge::MergeService;
use crate::model::CatalogItem;
use crate::remote::CatalogClient;
use crate::store::FavoriteStore;
use crate::{CommonError, LISTING_COMMAND_CAPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListingPhase {
    /// Not fetching; may or may not have data yet.
    Idle,
    LoadingInitial,
    LoadingMore,
    /// The most recent page came back empty. Terminal for the current
    /// epoch; no further fetch until an invalidation resets the cursor.
    Exhausted,
    /// The last fetch failed. Previously accumulated items are retained.
    Error,
}

impl ListingPhase {
    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::LoadingInitial | Self::LoadingMore)
    }
}

/// Position in the append-ordered remote listing. Owned by one listing
/// instance; advances by one per load-more, resets to the first page on
/// invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageCursor {
    page: u32,
    size: u32,
}

impl PageCursor {
    #[must_use]
    pub fn new(size: u32) -> Self {
        debug_assert!(size > 0, "page size must be positive");
        Self { page: 1, size }
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    fn advance(&mut self) {
        self.page += 1;
    }

    fn reset(&mut self) {
        self.page = 1;
    }
}

/// What a consumer sees of one listing instance at an instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingSnapshot {
    pub items: Vec<CatalogItem>,
    pub phase: ListingPhase,
    pub is_exhausted: bool,
    pub error: Option<String>,
    /// Whether the "more items pending" cell should be shown.
    pub shows_more_indicator: bool,
}

/// The pagination state machine. Owned exclusively by one controller task;
/// never shared across instances.
///
/// Trigger methods return the `(page, size)` to fetch when a fetch should
/// start, `None` when the trigger is ignored. `phase.is_loading()` doubles
/// as the "fetch in flight" guard: at most one fetch per instance.
#[derive(Debug, Clone)]
pub struct ListingState {
    items: Vec<CatalogItem>,
    cursor: PageCursor,
    phase: ListingPhase,
    is_exhausted: bool,
    last_error: Option<String>,
}

impl ListingState {
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            cursor: PageCursor::new(page_size),
            phase: ListingPhase::Idle,
            is_exhausted: false,
            last_error: None,
        }
    }

    #[must_use]
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    #[must_use]
    pub fn phase(&self) -> ListingPhase {
        self.phase
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.is_exhausted
    }

    #[must_use]
    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// "Become visible" trigger. Starts the initial fetch only when the
    /// instance has no data yet; activating an already-populated (or
    /// exhausted, or fetching) instance is a no-op.
    pub fn activate(&mut self) -> Option<(u32, u32)> {
        if self.phase.is_loading() || self.is_exhausted || !self.items.is_empty() {
            return None;
        }
        self.phase = ListingPhase::LoadingInitial;
        self.last_error = None;
        Some((self.cursor.page(), self.cursor.size()))
    }

    /// "Load more" trigger. Ignored while exhausted or while a fetch is in
    /// flight (not queued).
    pub fn request_more(&mut self) -> Option<(u32, u32)> {
        if self.phase.is_loading() || self.is_exhausted {
            return None;
        }
        // A failed fetch already advanced the cursor; retrying re-requests
        // the same page instead of skipping it.
        if self.phase != ListingPhase::Error {
            self.cursor.advance();
        }
        self.phase = ListingPhase::LoadingMore;
        self.last_error = None;
        Some((self.cursor.page(), self.cursor.size()))
    }

    /// Applies a successful page: append-only, no dedup. Exhaustion is set
    /// iff this page is empty; a short page does not exhaust.
    pub fn apply_page(&mut self, page_items: Vec<CatalogItem>) {
        self.is_exhausted = page_items.is_empty();
        self.items.extend(page_items);
        self.phase = if self.is_exhausted {
            ListingPhase::Exhausted
        } else {
            ListingPhase::Idle
        };
        self.last_error = None;
    }

    /// Applies a failed fetch: accumulated items and cursor untouched.
    pub fn apply_error(&mut self, message: String) {
        self.phase = ListingPhase::Error;
        self.last_error = Some(message);
    }

    /// Unconditional reset on invalidation, regardless of phase. Returns
    /// the `(page, size)` for the fresh initial fetch.
    pub fn invalidate(&mut self) -> (u32, u32) {
        self.items.clear();
        self.cursor.reset();
        self.is_exhausted = false;
        self.last_error = None;
        self.phase = ListingPhase::LoadingInitial;
        (self.cursor.page(), self.cursor.size())
    }

    #[must_use]
    pub fn snapshot(&self) -> ListingSnapshot {
        ListingSnapshot {
            items: self.items.clone(),
            phase: self.phase,
            is_exhausted: self.is_exhausted,
            error: self.last_error.clone(),
            shows_more_indicator: !self.is_exhausted
                && !self.items.is_empty()
                && self.phase != ListingPhase::Error,
        }
    }
}

enum ListingCommand {
    Activated,
    LoadMoreRequested,
}

type FetchFuture = Pin<Box<dyn Future<Output = Result<Vec<CatalogItem>, CommonError>> + Send>>;

/// Consumer handle for one listing view.
///
/// The state machine runs on its own task; this handle sends triggers in
/// and reads snapshots out. Dropping it aborts the task, which cancels the
/// in-flight fetch and the bus subscription deterministically.
pub struct ListingController {
    commands: mpsc::Sender<ListingCommand>,
    snapshot: watch::Receiver<ListingSnapshot>,
    task: JoinHandle<()>,
}

impl ListingController {
    pub fn spawn<C, S>(
        merge: Arc<MergeService<C, S>>,
        bus: &InvalidationBus,
        page_size: u32,
    ) -> Self
    where
        C: CatalogClient + 'static,
        S: FavoriteStore + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(LISTING_COMMAND_CAPACITY);
        let state = ListingState::new(page_size);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());

        let worker = ListingWorker {
            merge,
            state,
            commands: command_rx,
            invalidations: bus.subscribe(),
            snapshot_tx,
        };
        let task = tokio::spawn(worker.run());

        Self {
            commands: command_tx,
            snapshot: snapshot_rx,
            task,
        }
    }

    /// "Become visible" trigger.
    pub async fn activate(&self) {
        let _ = self.commands.send(ListingCommand::Activated).await;
    }

    /// Fired when the consumer is about to display the last loaded item.
    pub async fn load_more(&self) {
        let _ = self.commands.send(ListingCommand::LoadMoreRequested).await;
    }

    #[must_use]
    pub fn snapshot(&self) -> ListingSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Waits until the snapshot satisfies the predicate and returns it.
    /// Returns the last observed snapshot if the controller task ends
    /// first.
    pub async fn wait_for<F>(&mut self, predicate: F) -> ListingSnapshot
    where
        F: Fn(&ListingSnapshot) -> bool,
    {
        loop {
            let current = self.snapshot.borrow_and_update().clone();
            if predicate(&current) {
                return current;
            }
            if self.snapshot.changed().await.is_err() {
                return current;
            }
        }
    }
}

impl Drop for ListingController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct ListingWorker<C, S> {
    merge: Arc<MergeService<C, S>>,
    state: ListingState,
    commands: mpsc::Receiver<ListingCommand>,
    invalidations: InvalidationReceiver,
    snapshot_tx: watch::Sender<ListingSnapshot>,
}

impl<C, S> ListingWorker<C, S>
where
    C: CatalogClient + 'static,
    S: FavoriteStore + 'static,
{
    fn fetch(merge: &Arc<MergeService<C, S>>, page: u32, size: u32) -> FetchFuture {
        let merge = Arc::clone(merge);
        Box::pin(async move { merge.retrieve_listing(page, size).await })
    }

    /// Resolves the in-flight fetch, or pends forever when there is none.
    /// Cancel-safe: a partially polled fetch stays in the slot.
    async fn next_result(slot: &mut Option<FetchFuture>) -> Result<Vec<CatalogItem>, CommonError> {
        match slot {
            Some(fetch) => {
                let result = fetch.as_mut().await;
                *slot = None;
                result
            }
            None => future::pending().await,
        }
    }

    /// Next bus event; pends forever once the bus is gone so the select
    /// does not spin on a closed channel.
    async fn next_invalidation(
        receiver: &mut Option<InvalidationReceiver>,
    ) -> Option<Invalidation> {
        match receiver {
            Some(rx) => {
                let event = rx.recv().await;
                if event.is_none() {
                    *receiver = None;
                }
                event
            }
            None => future::pending().await,
        }
    }

    async fn run(self) {
        let Self {
            merge,
            mut state,
            mut commands,
            invalidations,
            snapshot_tx,
        } = self;
        let mut invalidations = Some(invalidations);
        let mut in_flight: Option<FetchFuture> = None;

        loop {
            tokio::select! {
                // Invalidations first: a reset racing a completed fetch
                // must win, so the stale result is discarded with the
                // overwritten future.
                biased;

                event = Self::next_invalidation(&mut invalidations) => {
                    if let Some(event) = event {
                        debug!(?event, "listing invalidated, resetting");
                        let (page, size) = state.invalidate();
                        in_flight = Some(Self::fetch(&merge, page, size));
                        let _ = snapshot_tx.send(state.snapshot());
                    }
                }

                command = commands.recv() => {
                    let Some(command) = command else { break };
                    let started = match command {
                        ListingCommand::Activated => state.activate(),
                        ListingCommand::LoadMoreRequested => state.request_more(),
                    };
                    if let Some((page, size)) = started {
                        in_flight = Some(Self::fetch(&merge, page, size));
                        let _ = snapshot_tx.send(state.snapshot());
                    }
                }

                result = Self::next_result(&mut in_flight) => {
                    match result {
                        Ok(page_items) => state.apply_page(page_items),
                        Err(error) => {
                            warn!(error = %error, page = state.cursor().page(), "listing fetch failed");
                            state.apply_error(error.message().to_string());
                        }
                    }
                    let _ = snapshot_tx.send(state.snapshot());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn items(n: usize) -> Vec<CatalogItem> {
        (0..n)
            .map(|i| CatalogItem {
                id: Some(format!("item-{i}")),
                urls: None,
                is_favorite: false,
            })
            .collect()
    }

    #[test]
    fn test_activation_starts_initial_fetch_at_page_one() {
        let mut state = ListingState::new(30);
        assert_eq!(state.activate(), Some((1, 30)));
        assert_eq!(state.phase(), ListingPhase::LoadingInitial);
    }

    #[test]
    fn test_activation_of_populated_state_is_noop() {
        let mut state = ListingState::new(30);
        state.activate();
        state.apply_page(items(30));

        assert_eq!(state.activate(), None);
        assert_eq!(state.phase(), ListingPhase::Idle);
    }

    #[test]
    fn test_full_first_page_does_not_exhaust() {
        // Scenario A: 30 of 30 items, empty favorite set.
        let mut state = ListingState::new(30);
        state.activate();
        state.apply_page(items(30));

        assert_eq!(state.items().len(), 30);
        assert!(state.items().iter().all(|i| !i.is_favorite));
        assert!(!state.is_exhausted());
        assert!(state.snapshot().shows_more_indicator);
    }

    #[test]
    fn test_short_page_does_not_exhaust_but_empty_page_does() {
        // Scenario B: a 5-item page is not exhaustion; the empty page is.
        let mut state = ListingState::new(30);
        state.activate();
        state.apply_page(items(30));

        assert_eq!(state.request_more(), Some((2, 30)));
        state.apply_page(items(5));
        assert!(!state.is_exhausted());
        assert_eq!(state.items().len(), 35);

        assert_eq!(state.request_more(), Some((3, 30)));
        state.apply_page(items(0));
        assert!(state.is_exhausted());
        assert_eq!(state.phase(), ListingPhase::Exhausted);
        assert!(!state.snapshot().shows_more_indicator);

        // No further fetch until invalidation.
        assert_eq!(state.request_more(), None);
        assert_eq!(state.activate(), None);
    }

    #[test]
    fn test_initial_failure_keeps_listing_empty() {
        // Scenario C.
        let mut state = ListingState::new(30);
        state.activate();
        state.apply_error("server error".into());

        assert!(state.items().is_empty());
        assert_eq!(state.phase(), ListingPhase::Error);
        assert_eq!(state.last_error(), Some("server error"));
        assert!(!state.snapshot().shows_more_indicator);
    }

    #[test]
    fn test_failed_load_more_retains_items_and_cursor() {
        let mut state = ListingState::new(30);
        state.activate();
        state.apply_page(items(30));

        assert_eq!(state.request_more(), Some((2, 30)));
        state.apply_error("timeout".into());

        assert_eq!(state.items().len(), 30);
        assert_eq!(state.cursor().page(), 2);

        // Retry re-requests the same incremented page.
        assert_eq!(state.request_more(), Some((2, 30)));
    }

    #[test]
    fn test_load_more_ignored_while_fetch_in_flight() {
        let mut state = ListingState::new(30);
        state.activate();
        state.apply_page(items(30));

        assert_eq!(state.request_more(), Some((2, 30)));
        // Second trigger while loading: ignored, not queued.
        assert_eq!(state.request_more(), None);
        assert_eq!(state.cursor().page(), 2);
    }

    #[test]
    fn test_no_dedup_across_pages() {
        let mut state = ListingState::new(2);
        state.activate();
        state.apply_page(items(2));
        state.request_more();
        state.apply_page(items(2));

        assert_eq!(state.items().len(), 4);
        assert_eq!(state.items()[0].id, state.items()[2].id);
    }

    #[test]
    fn test_invalidation_resets_everything() {
        let mut state = ListingState::new(30);
        state.activate();
        state.apply_page(items(30));
        state.request_more();
        state.apply_page(items(0));
        assert!(state.is_exhausted());

        assert_eq!(state.invalidate(), (1, 30));
        assert!(state.items().is_empty());
        assert_eq!(state.cursor().page(), 1);
        assert!(!state.is_exhausted());
        assert_eq!(state.phase(), ListingPhase::LoadingInitial);
    }

    #[test]
    fn test_empty_initial_page_exhausts_with_no_items() {
        let mut state = ListingState::new(30);
        state.activate();
        state.apply_page(items(0));

        assert!(state.items().is_empty());
        assert_eq!(state.phase(), ListingPhase::Exhausted);
    }

    #[test]
    fn test_activation_retries_after_initial_failure() {
        let mut state = ListingState::new(30);
        state.activate();
        state.apply_error("server error".into());

        // Still no data, so a fresh activation fetches page 1 again.
        assert_eq!(state.activate(), Some((1, 30)));
    }

    proptest! {
        #[test]
        fn prop_accumulated_length_is_sum_of_applied_pages(
            pages in proptest::collection::vec(0usize..40, 1..8)
        ) {
            let mut state = ListingState::new(30);
            prop_assert!(state.activate().is_some());

            let mut expected = 0usize;
            let mut first = true;
            for &count in &pages {
                if !first && state.request_more().is_none() {
                    break;
                }
                first = false;
                state.apply_page(items(count));
                expected += count;

                prop_assert_eq!(state.items().len(), expected);
                prop_assert_eq!(state.is_exhausted(), count == 0);
            }
        }

        #[test]
        fn prop_errors_never_mutate_accumulated_items(
            loaded in 0usize..60,
            message in ".{1,40}"
        ) {
            let mut state = ListingState::new(30);
            state.activate();
            state.apply_page(items(loaded));
            let before: Vec<_> = state.items().to_vec();
            let page_before = state.cursor().page();

            if state.request_more().is_some() {
                state.apply_error(message);
                prop_assert_eq!(state.items(), before.as_slice());
                prop_assert!(state.cursor().page() <= page_before + 1);
                prop_assert_eq!(state.phase(), ListingPhase::Error);
            }
        }

        #[test]
        fn prop_invalidation_always_yields_canonical_reset(
            pages in proptest::collection::vec(0usize..40, 0..5),
            fail_last in proptest::bool::ANY
        ) {
            let mut state = ListingState::new(30);
            state.activate();
            for &count in &pages {
                state.apply_page(items(count));
                state.request_more();
            }
            if fail_last {
                state.apply_error("boom".into());
            }

            prop_assert_eq!(state.invalidate(), (1, 30));
            prop_assert!(state.items().is_empty());
            prop_assert!(!state.is_exhausted());
            prop_assert_eq!(state.phase(), ListingPhase::LoadingInitial);
            prop_assert_eq!(state.last_error(), None);
        }
    }
}
