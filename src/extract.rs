//! Markup extraction for catalog and release pages.
//!
//! Pure functions over a downloaded body. Missing optional structure (art,
//! byline, date, track table) degrades to empty values; only a release page
//! without a title is an extraction failure.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::ExtractError;
use crate::models::{CatalogItem, ReleaseDenorm, Skip, Track};

// ============================================================================
// Selectors
// ============================================================================

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static CATALOG_GRID: Lazy<Selector> = Lazy::new(|| selector("ol.music-grid"));
static CATALOG_ITEM: Lazy<Selector> = Lazy::new(|| selector("li.music-grid-item"));
static ITEM_TITLE: Lazy<Selector> = Lazy::new(|| selector("p.title"));
static ITEM_ART: Lazy<Selector> = Lazy::new(|| selector("div.art img"));
static ANY_LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));

static RELEASE_TITLE: Lazy<Selector> = Lazy::new(|| selector("h2.trackTitle"));
static HEADING_3: Lazy<Selector> = Lazy::new(|| selector("h3"));
static CREDITS: Lazy<Selector> = Lazy::new(|| selector("div.tralbumData.tralbum-credits"));
static RELEASE_ART: Lazy<Selector> = Lazy::new(|| selector("#tralbumArt a.popupImage"));

// Lyrics rows sit between track rows and carry no track data.
static TRACK_ROW: Lazy<Selector> =
    Lazy::new(|| selector("table#track_table tr:not(.lyricsRow)"));
static TRACK_NUMBER: Lazy<Selector> = Lazy::new(|| selector(".track_number"));
static TRACK_TITLE: Lazy<Selector> = Lazy::new(|| selector("span.track-title"));
static TRACK_TIME: Lazy<Selector> = Lazy::new(|| selector("span.time"));
static TRACK_LINK: Lazy<Selector> = Lazy::new(|| selector("a[href*='/track/']"));

/// "released March 10, 2023" inside the credits block.
static RELEASED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)released\s+([a-z]+)\s+(\d{1,2}),\s*(\d{4})").unwrap());

static TRACKNUM_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"tracknum=(\d+)").unwrap());

// ============================================================================
// Catalog Page
// ============================================================================

/// List the entries of an artist's catalog grid.
///
/// A page without the grid yields an empty list: the artist simply has no
/// releases as far as the markup is concerned.
pub fn list_catalog_items(body: &str) -> Vec<CatalogItem> {
    let document = Html::parse_document(body);

    let Some(grid) = document.select(&CATALOG_GRID).next() else {
        return Vec::new();
    };

    grid.select(&CATALOG_ITEM)
        .map(|item| CatalogItem {
            link: item
                .select(&ANY_LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| href.trim().to_string())
                .unwrap_or_default(),
            title: item
                .select(&ITEM_TITLE)
                .next()
                .map(collapsed_text)
                .unwrap_or_default(),
            art_url: item
                .select(&ITEM_ART)
                .next()
                .and_then(|img| {
                    img.value()
                        .attr("src")
                        .or_else(|| img.value().attr("data-original"))
                })
                .map(|src| src.trim().to_string())
                .unwrap_or_default(),
        })
        .collect()
}

// ============================================================================
// Release Page
// ============================================================================

/// Extract title, artist, date and track listing from a release page.
///
/// `page_url` is where the body came from: it becomes the release link,
/// resolves relative track links, and supplies the artist name when the page
/// has no byline.
pub fn extract_release_metadata(body: &str, page_url: &Url) -> Result<ReleaseDenorm, ExtractError> {
    let document = Html::parse_document(body);

    let title = document
        .select(&RELEASE_TITLE)
        .next()
        .map(collapsed_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExtractError::MissingTitle(page_url.to_string()))?;

    let artist = byline_artist(&document)
        .or_else(|| nickname_from_url(page_url))
        .unwrap_or_default();

    let release_date = document
        .select(&CREDITS)
        .next()
        .and_then(|credits| parse_release_date(&credits.text().collect::<String>()));

    let art_url = document
        .select(&RELEASE_ART)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .unwrap_or_default();

    let mut tracks = Vec::new();
    for (index, row) in document.select(&TRACK_ROW).enumerate() {
        match extract_track_row(row, page_url) {
            Ok(track) => tracks.push(track),
            Err(skip) => tracing::warn!(
                release = %page_url,
                row = index + 1,
                reason = %skip.reason,
                "skipping track row"
            ),
        }
    }

    Ok(ReleaseDenorm {
        title,
        artist,
        link: page_url.to_string(),
        release_date,
        art_url,
        tracks,
    })
}

fn extract_track_row(row: ElementRef, page_url: &Url) -> Result<Track, Skip> {
    let number = row
        .select(&TRACK_NUMBER)
        .next()
        .and_then(|el| digits(&el.text().collect::<String>()))
        .or_else(|| {
            row.value()
                .attr("rel")
                .and_then(|rel| TRACKNUM_ATTR.captures(rel))
                .and_then(|caps| caps[1].parse().ok())
        })
        .ok_or_else(|| Skip::new("no track number"))?;

    if number == 0 {
        return Err(Skip::new("track number is zero"));
    }

    let title = row
        .select(&TRACK_TITLE)
        .next()
        .map(collapsed_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Skip::new(format!("track {} has no title", number)))?;

    let duration = row
        .select(&TRACK_TIME)
        .next()
        .map(collapsed_text)
        .unwrap_or_default();

    let link = row
        .select(&TRACK_LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| {
            page_url
                .join(href.trim())
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.trim().to_string())
        })
        .unwrap_or_default();

    Ok(Track {
        number,
        title,
        duration,
        link,
    })
}

fn byline_artist(document: &Html) -> Option<String> {
    document
        .select(&HEADING_3)
        .filter(|h3| collapsed_text(*h3).split_whitespace().next() == Some("by"))
        .find_map(|h3| h3.select(&ANY_LINK).next())
        .map(collapsed_text)
        .filter(|name| !name.is_empty())
}

// ============================================================================
// Helpers
// ============================================================================

/// Artist nickname encoded in a platform URL: the first label of the host.
pub fn nickname_from_url(url: &Url) -> Option<String> {
    url.host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}

/// Parse the date out of free text like "released March 10, 2023".
pub fn parse_release_date(text: &str) -> Option<NaiveDate> {
    let caps = RELEASED_PATTERN.captures(text)?;
    let normalized = format!("{} {}, {}", &caps[1], &caps[2], &caps[3]);
    NaiveDate::parse_from_str(&normalized, "%B %d, %Y").ok()
}

fn collapsed_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn digits(s: &str) -> Option<u32> {
    let d: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    d.parse().ok()
}
