//! Domain entities and their wire-side counterparts.
//!
//! The wire types ([`RawItem`], [`RawDetail`]) are what the catalog API
//! actually returns and deliberately have no favorite field: favorite
//! status is always derived locally at merge time and never trusted from
//! the remote source. The domain types carry the stamped flag.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Thumbnail and full-size image locations for one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrls {
    #[serde(default)]
    pub small: Option<String>,
    #[serde(default)]
    pub full: Option<String>,
}

/// Where a photo was taken, as reported by the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// One listing entry as received from the catalog API.
///
/// Every field is optional; the remote source omits them freely and a
/// partially filled item is still shown.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub urls: Option<ImageUrls>,
}

/// The extended entity for a single item as received from the catalog API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawDetail {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub urls: Option<ImageUrls>,
}

/// A listing entry with its locally-derived favorite flag stamped on.
///
/// Ephemeral; rebuilt on every page fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogItem {
    pub id: Option<String>,
    pub urls: Option<ImageUrls>,
    pub is_favorite: bool,
}

impl CatalogItem {
    /// Stamps the favorite flag onto a wire item. Items without an id are
    /// never favorites.
    #[must_use]
    pub fn from_raw(raw: RawItem, favorite_ids: &HashSet<String>) -> Self {
        let is_favorite = favorite_ids.contains(raw.id.as_deref().unwrap_or(""));
        Self {
            id: raw.id,
            urls: raw.urls,
            is_favorite,
        }
    }

    #[must_use]
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.urls.as_ref().and_then(|u| u.small.as_deref())
    }
}

/// A detail entry with its locally-derived favorite flag stamped on.
///
/// Ephemeral; rebuilt on every detail fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailedItem {
    pub id: Option<String>,
    pub description: Option<String>,
    pub location: Option<Location>,
    pub urls: Option<ImageUrls>,
    pub is_favorite: bool,
}

impl DetailedItem {
    #[must_use]
    pub fn from_raw(raw: RawDetail, favorite_ids: &HashSet<String>) -> Self {
        let is_favorite = favorite_ids.contains(raw.id.as_deref().unwrap_or(""));
        Self {
            id: raw.id,
            description: raw.description,
            location: raw.location,
            urls: raw.urls,
            is_favorite,
        }
    }

    #[must_use]
    pub fn full_url(&self) -> Option<&str> {
        self.urls.as_ref().and_then(|u| u.full.as_deref())
    }

    /// "Country, City" presentation text; either half may be missing.
    #[must_use]
    pub fn location_text(&self) -> String {
        let mut text = String::new();
        if let Some(location) = &self.location {
            if let Some(country) = &location.country {
                text.push_str(country);
            }
            if let Some(city) = &location.city {
                if text.is_empty() {
                    text.push_str(city);
                } else {
                    text.push_str(", ");
                    text.push_str(city);
                }
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn favorites(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_raw_item_decodes_with_missing_fields() {
        let item: RawItem = serde_json::from_str("{}").unwrap();
        assert!(item.id.is_none());
        assert!(item.urls.is_none());
    }

    #[test]
    fn test_raw_item_ignores_remote_favorite_field() {
        // A remote-supplied flag has no field to land in; the stamped value
        // comes from the local set alone.
        let item: RawItem =
            serde_json::from_str(r#"{"id":"abc","isFavorite":true}"#).unwrap();
        let stamped = CatalogItem::from_raw(item, &HashSet::new());
        assert!(!stamped.is_favorite);
    }

    #[test]
    fn test_stamping_uses_favorite_set() {
        let raw = RawItem {
            id: Some("x1".into()),
            urls: None,
        };
        let stamped = CatalogItem::from_raw(raw, &favorites(&["x1", "x2"]));
        assert!(stamped.is_favorite);
    }

    #[test]
    fn test_item_without_id_is_never_favorite() {
        let raw = RawItem {
            id: None,
            urls: None,
        };
        let stamped = CatalogItem::from_raw(raw, &favorites(&["x1"]));
        assert!(!stamped.is_favorite);
    }

    #[test]
    fn test_detail_decodes_nested_location() {
        let detail: RawDetail = serde_json::from_str(
            r#"{"id":"d1","description":"a pier","location":{"city":"Porto","country":"Portugal"},"urls":{"small":"s","full":"f"}}"#,
        )
        .unwrap();
        let stamped = DetailedItem::from_raw(detail, &HashSet::new());
        assert_eq!(stamped.location_text(), "Portugal, Porto");
        assert_eq!(stamped.full_url(), Some("f"));
    }

    #[test]
    fn test_location_text_with_partial_location() {
        let city_only = DetailedItem {
            id: None,
            description: None,
            location: Some(Location {
                city: Some("Porto".into()),
                country: None,
            }),
            urls: None,
            is_favorite: false,
        };
        assert_eq!(city_only.location_text(), "Porto");

        let country_only = DetailedItem {
            location: Some(Location {
                city: None,
                country: Some("Portugal".into()),
            }),
            ..city_only.clone()
        };
        assert_eq!(country_only.location_text(), "Portugal");

        let neither = DetailedItem {
            location: None,
            ..city_only
        };
        assert_eq!(neither.location_text(), "");
    }
}
