//! Core data models for release tracking.
//!
//! Records extracted from catalog and release pages, and the typed rows the
//! store hands back. Nothing outside `store` reads raw SQL rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

// ============================================================================
// Extracted Records
// ============================================================================

/// One entry of an artist's catalog grid. `link` is as found in the page,
/// usually relative to the catalog URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogItem {
    pub link: String,
    pub title: String,
    pub art_url: String,
}

/// Track as listed on a release page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Track {
    pub number: u32,
    pub title: String,
    pub duration: String, // free-form, e.g. "04:40"
    pub link: String,
}

/// Release with the artist name joined in, as extracted from a release page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReleaseDenorm {
    pub title: String,
    pub artist: String,
    pub link: String,
    pub release_date: Option<NaiveDate>,
    pub art_url: String,
    pub tracks: Vec<Track>,
}

/// Why a single track row was left out of a release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skip {
    pub reason: String,
}

impl Skip {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Store Rows
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtistRecord {
    pub id: i64,
    pub nickname: String,
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackRecord {
    pub id: i64,
    pub release_id: i64,
    pub number: u32,
    pub title: String,
    pub duration: String,
    pub link: String,
}

/// Row of the date-filtered release listing (release joined to artist nickname).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReleaseSummary {
    pub title: String,
    pub artist: String,
    pub link: String,
    pub release_date: Option<NaiveDate>,
}

// ============================================================================
// Batch Results
// ============================================================================

/// Outcome of one pass over every stored artist.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub artists: usize,
    pub new_releases: usize,
    pub failed: Vec<String>,
}
