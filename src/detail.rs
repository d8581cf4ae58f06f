//! Detail controller: single-item view logic.
//!
//! Loads the extended entity through the merge service and owns the
//! favorite toggle. A toggle writes through to the store first and
//! publishes on the invalidation bus only after the write succeeds, so
//! subscribers never reset for a change that did not happen.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::bus::{Invalidation, InvalidationBus};
use crate::merge::MergeService;
use crate::model::DetailedItem;
use crate::remote::CatalogClient;
use crate::store::FavoriteStore;
use crate::CommonError;

pub struct DetailController<C, S> {
    merge: Arc<MergeService<C, S>>,
    favorites: Arc<S>,
    bus: InvalidationBus,
}

impl<C: CatalogClient, S: FavoriteStore> DetailController<C, S> {
    pub fn new(merge: Arc<MergeService<C, S>>, favorites: Arc<S>, bus: InvalidationBus) -> Self {
        Self {
            merge,
            favorites,
            bus,
        }
    }

    /// Fetches the extended entity with its favorite flag stamped from the
    /// store as of now.
    pub async fn load(&self, id: &str) -> Result<DetailedItem, CommonError> {
        self.merge.retrieve_detail(id).await
    }

    /// Sets the favorite state of `id` to `favorited`.
    ///
    /// On success every bus subscriber is notified; on failure nothing is
    /// published and the stored set is unchanged, so the caller's displayed
    /// flag stays untoggled.
    pub async fn toggle_favorite(&self, id: &str, favorited: bool) -> Result<(), CommonError> {
        let result = if favorited {
            self.favorites.add(id).await
        } else {
            self.favorites.remove(id).await
        };

        if let Err(error) = &result {
            warn!(error = %error, id, favorited, "favorite toggle failed");
        }
        result?;

        debug!(id, favorited, "favorite toggled");
        self.bus.publish(Invalidation::FavoritesChanged {
            id: id.to_string(),
            is_favorite: favorited,
        });
        Ok(())
    }
}
