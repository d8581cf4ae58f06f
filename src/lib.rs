//! Core data layer for a paginated image catalog with locally-owned
//! favorites.
//!
//! The crate owns the merge-and-pagination engine that keeps three
//! independently evolving pieces of state consistent:
//!
//! - the append-only paginated remote listing ([`remote::CatalogClient`]),
//! - the durable local favorite id set ([`store::FavoriteStore`]),
//! - any number of open listing views, which must all observe the same
//!   favorite state and reset the instant it changes anywhere in the
//!   process ([`bus::InvalidationBus`]).
//!
//! Rendering, gestures, image decoding and the concrete HTTP socket are
//! collaborators supplied by the shell; everything here is plain async
//! Rust driven by explicit typed channels.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod detail;
pub mod listing;
pub mod merge;
pub mod model;
pub mod remote;
pub mod store;
pub mod testing;

pub use bus::{Invalidation, InvalidationBus, InvalidationReceiver};
pub use detail::DetailController;
pub use listing::{ListingController, ListingPhase, ListingSnapshot, ListingState, PageCursor};
pub use merge::MergeService;
pub use model::{CatalogItem, DetailedItem, ImageUrls, Location};
pub use remote::{CatalogClient, HttpCatalogClient, TransportError};
pub use store::{FavoriteStore, SqliteFavoriteStore, StorageError};

/// Number of items requested per listing page.
pub const PAGE_SIZE: u32 = 30;

/// Buffered invalidation events per subscriber before the oldest is dropped.
/// A lagged subscriber still observes that a change happened, which is all
/// the listing reset needs.
pub const INVALIDATION_BUS_CAPACITY: usize = 32;

/// Buffered triggers per listing controller. The state machine coalesces
/// triggers anyway, so the bound only guards against a runaway producer.
pub const LISTING_COMMAND_CAPACITY: usize = 8;

/// The unified error surfaced to consumers for display.
///
/// Transport and storage failures are mapped into this type at the merge
/// boundary; the mapping is total and every variant produces a non-empty
/// message. Nothing in the crate retries automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonError {
    message: String,
}

impl CommonError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for CommonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommonError {}

impl From<remote::TransportError> for CommonError {
    fn from(e: remote::TransportError) -> Self {
        use remote::TransportError;
        match e {
            TransportError::Unknown => Self::new("Unknown error"),
            TransportError::InvalidRequest => Self::new("Invalid request URL"),
            TransportError::Parsing { message } => {
                Self::new(format!("Parsing response error:\n{message}"))
            }
            TransportError::InvalidResponse { status, message } => {
                Self::new(format!("Error response with code {status}:\n{message}"))
            }
        }
    }
}

impl From<store::StorageError> for CommonError {
    fn from(e: store::StorageError) -> Self {
        Self::new(e.to_string())
    }
}
