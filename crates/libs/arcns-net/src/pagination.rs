//! Page cursor bookkeeping for list screens.
//!
//! [`Paginator`] is the per-list state machine: `advance` before a fetch, then
//! either `merge_on_success` or `handle_failure` with the outcome.
//! [`PageLoader`] wraps one paginator and its list behind a single-flight
//! guard so advances can not interleave.

use crate::error::LoadError;
use crate::event::Event;
use crate::result::ApiResult;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

pub const DEFAULT_INITIAL_PAGE: u32 = 1;

pub type FailureNotice = Option<Arc<Event<String>>>;

#[derive(Debug)]
pub struct Paginator {
    initial_page: u32,
    page_size: Option<usize>,
    current_page: Option<u32>,
    is_first_refresh: bool,
    is_data_empty: bool,
    no_more_data: bool,
    refresh_failed: watch::Sender<FailureNotice>,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_PAGE)
    }
}

impl Paginator {
    pub fn new(initial_page: u32) -> Self {
        let (refresh_failed, _) = watch::channel(None);
        Self {
            initial_page,
            page_size: None,
            current_page: None,
            is_first_refresh: true,
            is_data_empty: false,
            no_more_data: false,
            refresh_failed,
        }
    }

    /// Enables end-of-list detection: a page shorter than `page_size` is the
    /// last one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn initial_page(&self) -> u32 {
        self.initial_page
    }

    pub fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    pub fn current_page(&self) -> u32 {
        self.current_page.unwrap_or(self.initial_page)
    }

    /// Moves the cursor for the next fetch and returns the page to request.
    pub fn advance(&mut self, refresh: bool) -> u32 {
        self.is_data_empty = false;
        let next = if refresh {
            self.is_first_refresh = false;
            self.initial_page
        } else {
            self.current_page().saturating_add(1)
        };
        self.current_page = Some(next);
        next
    }

    pub fn merge_on_success<T>(&mut self, refresh: bool, existing: Vec<T>, new: Vec<T>) -> Vec<T> {
        self.check_no_more_data(new.len());
        if refresh {
            self.is_data_empty = new.is_empty();
            return new;
        }
        let mut merged = existing;
        merged.extend(new);
        merged
    }

    /// Rolls the cursor back, publishes the error text, and returns the list
    /// the caller should keep: `None` after a failed refresh.
    pub fn handle_failure<T, D>(
        &mut self,
        refresh: bool,
        existing: Vec<T>,
        result: &ApiResult<D>,
    ) -> Option<Vec<T>> {
        if refresh {
            self.is_data_empty = true;
        }
        self.roll_back();
        self.notify_failure(result.error_message());
        if refresh {
            None
        } else {
            Some(existing)
        }
    }

    /// Rollback and notification for callers that keep their data elsewhere.
    pub fn record_failure<D>(&mut self, result: &ApiResult<D>) {
        self.roll_back();
        if self.current_page() <= self.initial_page {
            self.is_data_empty = true;
        }
        self.notify_failure(result.error_message());
    }

    /// Receives one-shot failure messages; the latest one is replayed to new
    /// subscribers, already marked handled if someone took it.
    pub fn refresh_failed(&self) -> watch::Receiver<FailureNotice> {
        self.refresh_failed.subscribe()
    }

    pub fn is_first_refresh(&self) -> bool {
        self.is_first_refresh
    }

    pub fn is_data_empty(&self) -> bool {
        self.is_data_empty
    }

    pub fn no_more_data(&self) -> bool {
        self.no_more_data
    }

    fn snapshot(&self) -> CursorSnapshot {
        CursorSnapshot {
            current_page: self.current_page,
            is_first_refresh: self.is_first_refresh,
            is_data_empty: self.is_data_empty,
        }
    }

    fn restore(&mut self, snapshot: CursorSnapshot) {
        self.current_page = snapshot.current_page;
        self.is_first_refresh = snapshot.is_first_refresh;
        self.is_data_empty = snapshot.is_data_empty;
    }

    fn roll_back(&mut self) {
        let page = self.current_page();
        self.current_page = Some(page.saturating_sub(1).max(self.initial_page));
    }

    fn check_no_more_data(&mut self, received: usize) {
        if let Some(page_size) = self.page_size {
            self.no_more_data = received < page_size;
        }
    }

    fn notify_failure(&self, message: String) {
        log::debug!("page {} load failed: {message}", self.current_page());
        self.refresh_failed.send_replace(Some(Arc::new(Event::new(message))));
    }
}

/// State `advance` touches, kept so an abandoned load can undo it.
#[derive(Clone, Copy, Debug)]
struct CursorSnapshot {
    current_page: Option<u32>,
    is_first_refresh: bool,
    is_data_empty: bool,
}

/// A list plus its paginator, loaded at most one page at a time.
#[derive(Debug)]
pub struct PageLoader<T> {
    paginator: Mutex<Paginator>,
    items: Mutex<Option<Vec<T>>>,
    in_flight: AtomicBool,
}

impl<T> PageLoader<T> {
    pub fn new(paginator: Paginator) -> Self {
        Self {
            paginator: Mutex::new(paginator),
            items: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Advances the cursor, runs `fetch` for the chosen page, and merges or
    /// rolls back. Returns the number of items received on success.
    ///
    /// A second call while one is pending is rejected. Dropping the returned
    /// future restores the cursor and leaves the list untouched.
    pub async fn load<F, Fut>(
        &self,
        refresh: bool,
        fetch: F,
    ) -> Result<ApiResult<usize>, LoadError>
    where
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = ApiResult<Vec<T>>>,
    {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(LoadError::InFlight);
        }
        let mut guard = InFlightGuard { loader: self, restore: None };
        let page = {
            let mut paginator = self.paginator();
            guard.restore = Some(paginator.snapshot());
            paginator.advance(refresh)
        };

        let result = fetch(page).await;
        guard.restore = None;

        let mut paginator = self.paginator();
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = items.take().unwrap_or_default();
        Ok(match result {
            ApiResult::Success { data, lag } => {
                let received = data.len();
                *items = Some(paginator.merge_on_success(refresh, existing, data));
                ApiResult::Success { data: received, lag }
            }
            failed => {
                *items = paginator.handle_failure(refresh, existing, &failed);
                match failed {
                    ApiResult::Error(error) => ApiResult::Error(error),
                    _ => ApiResult::Loading,
                }
            }
        })
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn current_page(&self) -> u32 {
        self.paginator().current_page()
    }

    pub fn no_more_data(&self) -> bool {
        self.paginator().no_more_data()
    }

    pub fn is_first_refresh(&self) -> bool {
        self.paginator().is_first_refresh()
    }

    pub fn is_data_empty(&self) -> bool {
        self.paginator().is_data_empty()
    }

    pub fn refresh_failed(&self) -> watch::Receiver<FailureNotice> {
        self.paginator().refresh_failed()
    }

    /// Runs `f` against the current list; `None` means invalidated or never
    /// loaded.
    pub fn with_items<R>(&self, f: impl FnOnce(Option<&[T]>) -> R) -> R {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        f(items.as_deref())
    }

    pub fn into_items(self) -> Option<Vec<T>> {
        self.items.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn paginator(&self) -> MutexGuard<'_, Paginator> {
        self.paginator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for PageLoader<T> {
    fn default() -> Self {
        Self::new(Paginator::default())
    }
}

struct InFlightGuard<'a, T> {
    loader: &'a PageLoader<T>,
    /// Paginator state to restore if the load is abandoned mid-fetch.
    restore: Option<CursorSnapshot>,
}

impl<T> Drop for InFlightGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(previous) = self.restore.take() {
            log::debug!("page load abandoned, restoring cursor");
            self.loader.paginator().restore(previous);
        }
        self.loader.in_flight.store(false, Ordering::Release);
    }
}
