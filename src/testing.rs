//! In-memory test doubles for the remote and storage seams.
//!
//! Used by this crate's own suites and available to shells that want to
//! drive the controllers without a network or a database.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Semaphore;

use crate::model::{RawDetail, RawItem};
use crate::remote::{CatalogClient, TransportError};
use crate::store::{FavoriteStore, StorageError};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Catalog client fed from scripted responses.
///
/// Page responses are consumed in push order; detail responses are keyed
/// by id. An unscripted fetch fails with [`TransportError::Unknown`].
/// A gated client ([`StubCatalogClient::gated`]) additionally blocks each
/// page fetch until a permit is released, which lets a test hold a fetch
/// in flight deliberately.
pub struct StubCatalogClient {
    pages: Mutex<VecDeque<Result<Vec<RawItem>, TransportError>>>,
    details: Mutex<HashMap<String, Result<RawDetail, TransportError>>>,
    page_requests: Mutex<Vec<(u32, u32)>>,
    gate: Option<Semaphore>,
}

impl StubCatalogClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            details: Mutex::new(HashMap::new()),
            page_requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// A client whose page fetches park until [`release`](Self::release)
    /// grants them a permit.
    #[must_use]
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn push_page(&self, response: Result<Vec<RawItem>, TransportError>) {
        lock(&self.pages).push_back(response);
    }

    pub fn set_detail(&self, id: &str, response: Result<RawDetail, TransportError>) {
        lock(&self.details).insert(id.to_string(), response);
    }

    /// Lets `count` gated page fetches proceed.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Every `(page, size)` pair fetched so far, in order.
    #[must_use]
    pub fn page_requests(&self) -> Vec<(u32, u32)> {
        lock(&self.page_requests).clone()
    }
}

impl Default for StubCatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogClient for StubCatalogClient {
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Vec<RawItem>, TransportError> {
        lock(&self.page_requests).push((page, size));
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|_| TransportError::Unknown)?;
            permit.forget();
        }
        lock(&self.pages)
            .pop_front()
            .unwrap_or(Err(TransportError::Unknown))
    }

    async fn fetch_detail(&self, id: &str) -> Result<RawDetail, TransportError> {
        lock(&self.details)
            .get(id)
            .cloned()
            .unwrap_or(Err(TransportError::Unknown))
    }
}

/// Favorite store over a plain vector.
///
/// A vector rather than a set, so tests can reproduce the duplicate-row
/// behavior of the real storage: `add` always appends, `remove` deletes
/// the first match only, `get_all` collapses to a set. Read and write
/// failures can be switched on to exercise error paths.
pub struct MemoryFavoriteStore {
    ids: Mutex<Vec<String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryFavoriteStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_favorites<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let store = Self::new();
        *lock(&store.ids) = ids.into_iter().map(str::to_string).collect();
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        lock(&self.ids).iter().any(|stored| stored == id)
    }

    /// Number of stored rows, duplicates included.
    #[must_use]
    pub fn row_count(&self) -> usize {
        lock(&self.ids).len()
    }
}

impl Default for MemoryFavoriteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FavoriteStore for MemoryFavoriteStore {
    async fn get_all(&self) -> Result<HashSet<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed("scripted read failure".into()));
        }
        Ok(lock(&self.ids).iter().cloned().collect())
    }

    async fn add(&self, id: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("scripted write failure".into()));
        }
        lock(&self.ids).push(id.to_string());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("scripted write failure".into()));
        }
        let mut ids = lock(&self.ids);
        if let Some(position) = ids.iter().position(|stored| stored == id) {
            ids.remove(position);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_client_serves_pages_in_push_order() {
        let client = StubCatalogClient::new();
        client.push_page(Ok(vec![RawItem {
            id: Some("a".into()),
            urls: None,
        }]));
        client.push_page(Ok(vec![]));

        assert_eq!(client.fetch_page(1, 30).await.unwrap().len(), 1);
        assert!(client.fetch_page(2, 30).await.unwrap().is_empty());
        assert_eq!(client.page_requests(), vec![(1, 30), (2, 30)]);
    }

    #[tokio::test]
    async fn test_unscripted_fetch_fails() {
        let client = StubCatalogClient::new();
        assert_eq!(
            client.fetch_page(1, 30).await.unwrap_err(),
            TransportError::Unknown
        );
        assert_eq!(
            client.fetch_detail("missing").await.unwrap_err(),
            TransportError::Unknown
        );
    }

    #[tokio::test]
    async fn test_memory_store_models_duplicate_rows() {
        let store = MemoryFavoriteStore::new();
        store.add("a").await.unwrap();
        store.add("a").await.unwrap();
        assert_eq!(store.row_count(), 2);
        assert_eq!(store.get_all().await.unwrap().len(), 1);

        store.remove("a").await.unwrap();
        assert!(store.contains("a"));
        store.remove("a").await.unwrap();
        assert!(!store.contains("a"));
    }
}
