//! Release discovery: diff an artist's catalog against the store and persist
//! whatever is new.
//!
//! A catalog fetch failure aborts that artist's run. A release page that
//! cannot be fetched or extracted is logged and skipped; the rest of the run
//! continues and releases already committed stay committed.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use rustc_hash::FxHashSet;
use url::Url;

use crate::config::Config;
use crate::error::{DiscoverError, StoreError};
use crate::extract::{extract_release_metadata, list_catalog_items};
use crate::fetch::Fetcher;
use crate::models::{CatalogItem, ReleaseDenorm, Skip, UpdateSummary};
use crate::progress::create_progress_bar;
use crate::store::{canonical_nickname, Store};

/// Catalog entry whose link has been resolved to an absolute release URL.
#[derive(Clone, Debug)]
struct Candidate {
    url: Url,
    item: CatalogItem,
}

pub struct Discovery<F: Fetcher> {
    config: Config,
    store: Store,
    fetcher: F,
    pool: Option<ThreadPool>,
}

impl<F: Fetcher> Discovery<F> {
    pub fn new(config: Config, store: Store, fetcher: F) -> Result<Self, DiscoverError> {
        let pool = if config.workers > 1 {
            Some(ThreadPoolBuilder::new().num_threads(config.workers).build()?)
        } else {
            None
        };

        Ok(Self {
            config,
            store,
            fetcher,
            pool,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog_url(&self, nickname: &str) -> Result<Url, DiscoverError> {
        Url::parse(&format!("https://{}.{}/", nickname, self.config.platform_domain)).map_err(|e| {
            DiscoverError::CatalogUrl {
                nickname: nickname.to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Fetch the artist's catalog and persist every release not seen before.
    /// Returns only the releases stored by this call.
    pub fn discover(&mut self, nickname: &str) -> Result<Vec<ReleaseDenorm>, DiscoverError> {
        let canonical = canonical_nickname(nickname);
        let nickname = canonical.as_str();
        if !is_valid_nickname(nickname) {
            return Err(DiscoverError::InvalidNickname(nickname.to_string()));
        }
        let catalog_url = self.catalog_url(nickname)?;

        let artist_id = self.store.get_or_create_artist(nickname)?;
        let known = self.store.known_links(artist_id)?;

        let catalog = self
            .fetcher
            .fetch(&catalog_url)
            .map_err(|source| DiscoverError::Catalog {
                nickname: nickname.to_string(),
                source,
            })?;

        let items = list_catalog_items(&catalog.body);
        let found = items.len();
        let candidates = new_candidates(&catalog_url, items, &known);
        tracing::info!(
            nickname,
            found,
            new = candidates.len(),
            "catalog scanned"
        );

        let fetcher = &self.fetcher;
        let fetched: Vec<(Url, Result<ReleaseDenorm, Skip>)> = match &self.pool {
            Some(pool) => pool.install(|| {
                candidates
                    .par_iter()
                    .map(|c| (c.url.clone(), fetch_release(fetcher, c)))
                    .collect()
            }),
            None => candidates
                .iter()
                .map(|c| (c.url.clone(), fetch_release(fetcher, c)))
                .collect(),
        };

        let mut added = Vec::new();
        for (url, result) in fetched {
            match result {
                Ok(release) => {
                    if self.store.persist_release(artist_id, &release)?.is_some() {
                        added.push(release);
                    }
                }
                Err(skip) => tracing::warn!(release = %url, reason = %skip.reason, "skipping release"),
            }
        }

        tracing::info!(nickname, added = added.len(), "discovery finished");
        Ok(added)
    }

    /// Run discovery for every stored artist. A failing artist is logged and
    /// counted; only a failure to list the artists aborts the batch.
    pub fn update_all_known_artists(&mut self) -> Result<UpdateSummary, StoreError> {
        let nicknames = self.store.list_artist_nicknames()?;
        let pb = create_progress_bar(
            nicknames.len() as u64,
            "Updating artists",
            !self.config.progress,
        );

        let mut summary = UpdateSummary {
            artists: nicknames.len(),
            ..UpdateSummary::default()
        };

        for nickname in nicknames {
            match self.discover(&nickname) {
                Ok(added) => summary.new_releases += added.len(),
                Err(e) => {
                    tracing::error!(nickname = %nickname, error = %e, "artist update failed");
                    summary.failed.push(nickname);
                }
            }
            pb.inc(1);
        }

        pb.finish_with_message(format!(
            "Updated {} artists, {} new releases",
            summary.artists, summary.new_releases
        ));
        Ok(summary)
    }
}

/// Nicknames are platform subdomains: ASCII letters, digits, `_` and `-`.
pub fn is_valid_nickname(nickname: &str) -> bool {
    !nickname.is_empty()
        && nickname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Resolve catalog links and keep those not yet stored, first occurrence wins.
fn new_candidates(catalog_url: &Url, items: Vec<CatalogItem>, known: &FxHashSet<String>) -> Vec<Candidate> {
    let mut seen = FxHashSet::default();
    items
        .into_iter()
        .filter(|item| !item.link.is_empty())
        .filter_map(|item| match catalog_url.join(&item.link) {
            Ok(url) => Some(Candidate { url, item }),
            Err(e) => {
                tracing::warn!(link = %item.link, error = %e, "unresolvable catalog link");
                None
            }
        })
        .filter(|c| !known.contains(c.url.as_str()))
        .filter(|c| seen.insert(c.url.to_string()))
        .collect()
}

fn fetch_release<F: Fetcher>(fetcher: &F, candidate: &Candidate) -> Result<ReleaseDenorm, Skip> {
    let page = fetcher
        .fetch(&candidate.url)
        .map_err(|e| Skip::new(e.to_string()))?;

    let mut release = extract_release_metadata(&page.body, &candidate.url)
        .map_err(|e| Skip::new(e.to_string()))?;

    if release.art_url.is_empty() {
        release.art_url = candidate.item.art_url.clone();
    }
    Ok(release)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::RawPage;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory site keyed by absolute URL; records every request.
    #[derive(Default)]
    struct FakeSite {
        pages: HashMap<String, Result<String, FetchError>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeSite {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        fn failing(mut self, url: &str, status: u16) -> Self {
            self.pages.insert(
                url.to_string(),
                Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status,
                }),
            );
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Fetcher for FakeSite {
        fn fetch(&self, url: &Url) -> Result<RawPage, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.pages.get(url.as_str()) {
                Some(Ok(body)) => Ok(RawPage {
                    url: url.clone(),
                    body: body.clone(),
                }),
                Some(Err(e)) => Err(e.clone()),
                None => Err(FetchError::Unreachable {
                    url: url.to_string(),
                    reason: "no such page".to_string(),
                }),
            }
        }
    }

    fn catalog(links: &[&str]) -> String {
        let items: String = links
            .iter()
            .map(|l| {
                format!(
                    r#"<li class="music-grid-item"><a href="{}"><div class="art"><img src="art{}.jpg"></div><p class="title">T</p></a></li>"#,
                    l,
                    l.len()
                )
            })
            .collect();
        format!(r#"<ol class="music-grid">{}</ol>"#, items)
    }

    fn release_page(title: &str, date: &str, tracks: &[(u32, &str)]) -> String {
        let rows: String = tracks
            .iter()
            .map(|(n, t)| {
                format!(
                    r#"<tr class="track_row_view"><td><div class="track_number">{}.</div></td><td class="title-col"><a href="/track/{}"><span class="track-title">{}</span></a><span class="time">3:00</span></td></tr>"#,
                    n, t, t
                )
            })
            .collect();
        format!(
            r#"<h2 class="trackTitle">{}</h2>
               <h3>by <span><a href="/">Display Name</a></span></h3>
               <table id="track_table">{}</table>
               <div class="tralbumData tralbum-credits">released {}
               </div>"#,
            title, rows, date
        )
    }

    fn config(workers: usize) -> Config {
        Config {
            platform_domain: "bandcamp.test".to_string(),
            workers,
            progress: false,
            ..Config::default()
        }
    }

    fn engine(site: FakeSite, workers: usize) -> Discovery<FakeSite> {
        let store = Store::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        Discovery::new(config(workers), store, site).unwrap()
    }

    fn three_release_site() -> FakeSite {
        FakeSite::default()
            .page(
                "https://artist.bandcamp.test/",
                &catalog(&["/album/one", "/album/two", "/album/three"]),
            )
            .page(
                "https://artist.bandcamp.test/album/one",
                &release_page("One", "March 10, 2023", &[(1, "a"), (2, "b")]),
            )
            .page(
                "https://artist.bandcamp.test/album/two",
                "<html><body><p>maintenance</p></body></html>",
            )
            .page(
                "https://artist.bandcamp.test/album/three",
                &release_page("Three", "June 1, 2023", &[(1, "c")]),
            )
    }

    fn titles(releases: &[ReleaseDenorm]) -> Vec<String> {
        let mut t: Vec<String> = releases.iter().map(|r| r.title.clone()).collect();
        t.sort();
        t
    }

    #[test]
    fn test_discover_is_idempotent() {
        let mut engine = engine(three_release_site(), 1);

        let first = engine.discover("artist").unwrap();
        assert_eq!(first.len(), 2);
        let artist = engine.store().artist_id("artist").unwrap().unwrap();
        assert_eq!(engine.store().release_count(artist).unwrap(), 2);

        let before = engine.fetcher.requests().len();
        let second = engine.discover("artist").unwrap();
        assert!(second.is_empty());
        assert_eq!(engine.store().release_count(artist).unwrap(), 2);

        // Known links are not fetched again; the failed one is retried.
        let retried: Vec<String> = engine.fetcher.requests()[before..].to_vec();
        assert_eq!(
            retried,
            vec![
                "https://artist.bandcamp.test/".to_string(),
                "https://artist.bandcamp.test/album/two".to_string(),
            ]
        );
    }

    #[test]
    fn test_failed_release_is_isolated() {
        let mut engine = engine(three_release_site(), 1);
        let added = engine.discover("artist").unwrap();

        assert_eq!(titles(&added), vec!["One", "Three"]);
        let artist = engine.store().artist_id("artist").unwrap().unwrap();
        let known = engine.store().known_links(artist).unwrap();
        assert!(known.contains("https://artist.bandcamp.test/album/one"));
        assert!(known.contains("https://artist.bandcamp.test/album/three"));
        assert!(!known.contains("https://artist.bandcamp.test/album/two"));
    }

    #[test]
    fn test_release_fetch_failure_is_skipped() {
        let site = FakeSite::default()
            .page(
                "https://artist.bandcamp.test/",
                &catalog(&["/album/one", "/album/gone"]),
            )
            .page(
                "https://artist.bandcamp.test/album/one",
                &release_page("One", "March 10, 2023", &[(1, "a")]),
            )
            .failing("https://artist.bandcamp.test/album/gone", 404);
        let mut engine = engine(site, 1);

        let added = engine.discover("artist").unwrap();
        assert_eq!(titles(&added), vec!["One"]);
    }

    #[test]
    fn test_persisted_release_contents() {
        let mut engine = engine(three_release_site(), 1);
        let added = engine.discover("artist").unwrap();

        let one = added.iter().find(|r| r.title == "One").unwrap();
        assert_eq!(one.artist, "Display Name");
        assert_eq!(one.link, "https://artist.bandcamp.test/album/one");
        assert_eq!(one.release_date, NaiveDate::from_ymd_opt(2023, 3, 10));
        // No art on the release page, taken from the catalog entry
        assert_eq!(one.art_url, format!("art{}.jpg", "/album/one".len()));

        let artist = engine.store().artist_id("artist").unwrap().unwrap();
        let id = engine.store().release_id(artist, &one.link).unwrap().unwrap();
        let tracks = engine.store().tracks_for_release(id).unwrap();
        let numbers: Vec<u32> = tracks.iter().map(|t| t.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(tracks[0].link, "https://artist.bandcamp.test/track/a");
    }

    #[test]
    fn test_parallel_workers_give_same_result() {
        let mut engine = engine(three_release_site(), 3);
        let added = engine.discover("artist").unwrap();
        assert_eq!(titles(&added), vec!["One", "Three"]);
        assert!(engine.discover("artist").unwrap().is_empty());
    }

    #[test]
    fn test_catalog_failure_aborts_run() {
        let site = FakeSite::default().failing("https://artist.bandcamp.test/", 503);
        let mut engine = engine(site, 1);

        match engine.discover("artist") {
            Err(DiscoverError::Catalog { nickname, source }) => {
                assert_eq!(nickname, "artist");
                assert!(matches!(source, FetchError::HttpStatus { status: 503, .. }));
            }
            other => panic!("expected catalog failure, got {:?}", other.map(|r| r.len())),
        }
        // The artist row exists even though its catalog could not be read
        assert!(engine.store().artist_id("artist").unwrap().is_some());
    }

    #[test]
    fn test_invalid_nickname_rejected_before_any_io() {
        let mut engine = engine(FakeSite::default(), 1);
        assert!(matches!(
            engine.discover("bad name/.."),
            Err(DiscoverError::InvalidNickname(_))
        ));
        assert!(engine.fetcher.requests().is_empty());
        assert!(engine.store().list_artist_nicknames().unwrap().is_empty());
    }

    #[test]
    fn test_empty_catalog_adds_nothing() {
        let site = FakeSite::default().page(
            "https://quiet.bandcamp.test/",
            "<html><body>No releases yet</body></html>",
        );
        let mut engine = engine(site, 1);
        assert!(engine.discover("quiet").unwrap().is_empty());
        assert_eq!(engine.fetcher.requests().len(), 1);
    }

    #[test]
    fn test_duplicate_and_empty_catalog_links_collapse() {
        let site = FakeSite::default()
            .page(
                "https://artist.bandcamp.test/",
                &catalog(&[
                    "/album/one",
                    "",
                    "https://artist.bandcamp.test/album/one",
                ]),
            )
            .page(
                "https://artist.bandcamp.test/album/one",
                &release_page("One", "March 10, 2023", &[(1, "a")]),
            );
        let mut engine = engine(site, 1);

        assert_eq!(engine.discover("artist").unwrap().len(), 1);
        assert_eq!(engine.fetcher.requests().len(), 2);
    }

    #[test]
    fn test_update_all_continues_past_failures() {
        let site = three_release_site()
            .failing("https://broken.bandcamp.test/", 500)
            .page("https://quiet.bandcamp.test/", "<html></html>");
        let mut engine = engine(site, 1);
        for nickname in ["broken", "artist", "quiet"] {
            engine.store().add_artist(nickname).unwrap();
        }

        let summary = engine.update_all_known_artists().unwrap();
        assert_eq!(
            summary,
            UpdateSummary {
                artists: 3,
                new_releases: 2,
                failed: vec!["broken".to_string()],
            }
        );
    }

    #[test]
    fn test_nickname_validation() {
        assert!(is_valid_nickname("booka-shade_2"));
        assert!(!is_valid_nickname(""));
        assert!(!is_valid_nickname("evil.example.com/x"));
        assert!(!is_valid_nickname("spaced out"));
    }

    #[test]
    fn test_nickname_case_does_not_duplicate_artist() {
        let mut engine = engine(three_release_site(), 1);
        let first = engine.discover("artist").unwrap();
        assert_eq!(first.len(), 2);

        let second = engine.discover("Artist").unwrap();
        assert!(second.is_empty());
        let upper = engine.discover("ARTIST").unwrap();
        assert!(upper.is_empty());

        assert_eq!(engine.store().list_artist_nicknames().unwrap(), vec!["artist"]);
        let artist = engine.store().artist_id("artist").unwrap().unwrap();
        assert_eq!(engine.store().release_count(artist).unwrap(), 2);
    }
}
