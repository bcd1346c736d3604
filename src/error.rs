//! Error types for fetching, extraction, storage and discovery.

/// Failure to retrieve a page. Transport details are flattened to a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("{url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("could not read body of {url}: {reason}")]
    Body { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("no release title found on {0}")]
    MissingTitle(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("artist {0} not found")]
    ArtistNotFound(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("invalid artist nickname {0:?}: only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidNickname(String),

    #[error("could not build catalog URL for {nickname}: {reason}")]
    CatalogUrl { nickname: String, reason: String },

    #[error("catalog fetch failed for {nickname}: {source}")]
    Catalog {
        nickname: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid date {0:?}, expected YYYYMMDD")]
    InvalidDate(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
