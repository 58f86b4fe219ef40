use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod api;
pub mod config_file;
pub mod query;
pub mod store;
pub mod sync;
pub mod tags;

// Re-export for convenience
pub use api::remote::RemoteClient;
pub use api::{ApiError, PaperApi};
pub use query::{PaperQuery, fetch_categories, fetch_papers};
pub use store::{
    FAVORITE_PAPERS_KEY, LocalStore, MemoryStore, READ_PAPERS_KEY, SqliteStore, open_store,
};
pub use sync::{
    Confirm, Notice, NoticeLevel, PaperCard, RemoveOutcome, SyncController, SyncEvent,
    ToggleOutcome,
};
pub use tags::{PaperTagCache, TagTaxonomy};

/// Default API root of the local paper server.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8889/api";

/// Stable identifier of a paper: its canonical URL.
///
/// Used as the join key between the local cache, the tag cache, the renderer
/// and every API call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaperId(String);

impl PaperId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PaperId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PaperId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for PaperId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Which boolean flag a status operation targets.
///
/// Each kind has its own set, its own local cache key and its own endpoint;
/// nothing that operates on one kind ever touches the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Read,
    Favorite,
}

impl StatusKind {
    /// Key under which this kind's set is kept in the local cache store.
    pub fn storage_key(self) -> &'static str {
        match self {
            StatusKind::Read => READ_PAPERS_KEY,
            StatusKind::Favorite => FAVORITE_PAPERS_KEY,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusKind::Read => "read",
            StatusKind::Favorite => "favorite",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A tag assigned to a paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: i64,
    pub name: String,
}

impl TagRef {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A node of the server-owned tag taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTag {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub children: Vec<CustomTag>,
}

impl CustomTag {
    pub fn to_tag_ref(&self) -> TagRef {
        TagRef::new(self.id, self.name.clone())
    }
}

/// A paper as returned by `GET /papers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub paper_url: PaperId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub authors: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    /// Tag assignments, when the server embeds them in the listing.
    #[serde(default)]
    pub custom_tags: Option<Vec<TagRef>>,
}

impl Paper {
    /// The flag the server embedded in the listing, if any.
    pub fn status(&self, kind: StatusKind) -> Option<bool> {
        match kind {
            StatusKind::Read => self.is_read,
            StatusKind::Favorite => self.is_favorite,
        }
    }
}

/// The server sends `authors`/`categories` either as an array or as a single string.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// Paging metadata returned next to a page of papers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// One page of the paper listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperPage {
    pub papers: Vec<Paper>,
    pub pagination: Option<Pagination>,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("unknown tag id {0}")]
    UnknownTag(i64),
}

/// Runtime configuration for a papertrack session.
#[derive(Debug, Clone)]
pub struct Config {
    /// API root, e.g. `http://localhost:8889/api`. Endpoints are appended to it.
    pub api_base_url: String,
    pub timeout_secs: u64,
    /// Path to the SQLite local cache. `None` keeps the cache in memory.
    pub cache_path: Option<PathBuf>,
    /// Default `limit` for paper listings.
    pub page_size: usize,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: 10,
            cache_path: default_cache_path(),
            page_size: 100,
        }
    }
}

/// Platform data directory path: `<data_dir>/papertrack/cache.db`.
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("papertrack").join("cache.db"))
}

/// Build a [`Config`] from the on-disk config file, falling back to defaults
/// for anything it leaves unset.
pub fn config_from_file(file: &config_file::ConfigFile) -> Config {
    let defaults = Config::default();
    let server = file.server.as_ref();
    let cache = file.cache.as_ref();
    let display = file.display.as_ref();
    Config {
        api_base_url: server
            .and_then(|s| s.api_base_url.clone())
            .unwrap_or(defaults.api_base_url),
        timeout_secs: server
            .and_then(|s| s.timeout_secs)
            .unwrap_or(defaults.timeout_secs),
        cache_path: cache
            .and_then(|c| c.path.as_ref().map(PathBuf::from))
            .or(defaults.cache_path),
        page_size: display
            .and_then(|d| d.page_size)
            .unwrap_or(defaults.page_size),
    }
}
