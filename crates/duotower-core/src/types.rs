//! Validated record types handed to the core by the data-loading collaborator.
//!
//! Records are constructed once at ingestion. Constructors reject values that
//! would otherwise propagate garbage into scoring (non-finite ratings,
//! non-finite side features), so downstream code never re-validates.

use serde::{Deserialize, Serialize};

use crate::error::{RecError, Result};

/// Opaque external identifier of a user or item.
pub type RawId = i64;

/// One observed (user, item, rating, timestamp) event, keyed by raw ids.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawInteraction {
    /// External user id.
    pub user_id: RawId,
    /// External item id.
    pub item_id: RawId,
    /// Explicit rating.
    pub rating: f32,
    /// Event time (seconds since the epoch in MovieLens logs).
    pub timestamp: i64,
}

impl RawInteraction {
    /// Creates a validated interaction.
    ///
    /// # Errors
    ///
    /// [`RecError::Configuration`] if `rating` is not finite.
    pub fn new(user_id: RawId, item_id: RawId, rating: f32, timestamp: i64) -> Result<Self> {
        if !rating.is_finite() {
            return Err(RecError::configuration(format!(
                "rating for user {} / item {} must be finite, got {}",
                user_id, item_id, rating
            )));
        }
        Ok(Self {
            user_id,
            item_id,
            rating,
            timestamp,
        })
    }
}

/// An interaction translated to dense indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Row in the user table.
    pub user_index: usize,
    /// Row in the item table.
    pub item_index: usize,
    /// Explicit rating.
    pub rating: f32,
    /// Event time.
    pub timestamp: i64,
}

/// Catalog entry for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// External item id.
    pub id: RawId,
    /// Display title.
    pub title: String,
    /// Release year parsed from the title, if present.
    pub year: Option<i32>,
    /// Names of the categories this item belongs to.
    pub genres: Vec<String>,
    /// Fixed-length numeric side features (e.g. multi-hot genre flags).
    pub side_features: Option<Vec<f32>>,
}

impl ItemRecord {
    /// Creates an item with a title and no side information.
    pub fn new(id: RawId, title: impl Into<String>) -> Self {
        let title = title.into();
        let year = extract_year(&title);
        Self {
            id,
            title,
            year,
            genres: Vec::new(),
            side_features: None,
        }
    }

    /// Attaches category names.
    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches a side-feature row.
    ///
    /// # Errors
    ///
    /// [`RecError::Configuration`] if any feature is not finite.
    pub fn with_side_features(mut self, features: Vec<f32>) -> Result<Self> {
        if let Some(pos) = features.iter().position(|v| !v.is_finite()) {
            return Err(RecError::configuration(format!(
                "side feature {} of item {} is not finite",
                pos, self.id
            )));
        }
        self.side_features = Some(features);
        Ok(self)
    }
}

/// Extracts a four-digit year from a trailing-style `"(1995)"` group in a title.
///
/// ```
/// use duotower_core::types::extract_year;
///
/// assert_eq!(extract_year("Toy Story (1995)"), Some(1995));
/// assert_eq!(extract_year("Untitled"), None);
/// ```
pub fn extract_year(title: &str) -> Option<i32> {
    let bytes = title.as_bytes();
    let mut start = 0;
    while let Some(open) = title[start..].find('(') {
        let open = start + open;
        let digits = &bytes[open + 1..];
        if digits.len() >= 5
            && digits[..4].iter().all(u8::is_ascii_digit)
            && digits[4] == b')'
        {
            return title[open + 1..open + 5].parse().ok();
        }
        start = open + 1;
    }
    None
}
