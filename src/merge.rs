//! Merge service: combines remote catalog data with the local favorite set.
//!
//! Pure combination, no caching. Each operation fans out to the remote
//! fetch and the full favorite-set read concurrently, joins on both, and
//! stamps the favorite flag onto the remote data in remote order. If
//! either side fails the whole operation fails; a store read failure in
//! particular degrades the call to an opaque error rather than silently
//! treating everything as non-favorite.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::{CatalogItem, DetailedItem};
use crate::remote::CatalogClient;
use crate::store::FavoriteStore;
use crate::CommonError;

/// Message used when the favorite store cannot be read during a merge.
const STORE_READ_ERROR: &str = "Unknown exception";

pub struct MergeService<C, S> {
    client: Arc<C>,
    favorites: Arc<S>,
}

impl<C: CatalogClient, S: FavoriteStore> MergeService<C, S> {
    pub fn new(client: Arc<C>, favorites: Arc<S>) -> Self {
        Self { client, favorites }
    }

    /// Fetches one listing page and stamps each item with
    /// `favorite_set.contains(id)` evaluated at call time.
    pub async fn retrieve_listing(
        &self,
        page: u32,
        size: u32,
    ) -> Result<Vec<CatalogItem>, CommonError> {
        let (page_result, favorites_result) = tokio::join!(
            self.client.fetch_page(page, size),
            self.favorites.get_all(),
        );

        let favorite_ids = favorites_result.map_err(|e| {
            warn!(error = %e, "favorite store unreadable during listing merge");
            CommonError::new(STORE_READ_ERROR)
        })?;
        let raw_items = page_result?;

        debug!(page, count = raw_items.len(), "listing page merged");
        Ok(raw_items
            .into_iter()
            .map(|raw| CatalogItem::from_raw(raw, &favorite_ids))
            .collect())
    }

    /// Fetches detail for one item and stamps its favorite flag, same
    /// concurrent-combine pattern as the listing path.
    pub async fn retrieve_detail(&self, id: &str) -> Result<DetailedItem, CommonError> {
        let (detail_result, favorites_result) = tokio::join!(
            self.client.fetch_detail(id),
            self.favorites.get_all(),
        );

        let favorite_ids = favorites_result.map_err(|e| {
            warn!(error = %e, id, "favorite store unreadable during detail merge");
            CommonError::new(STORE_READ_ERROR)
        })?;
        let raw_detail = detail_result?;

        Ok(DetailedItem::from_raw(raw_detail, &favorite_ids))
    }
}
