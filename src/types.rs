//! Data records for the Trakt.tv API.
//!
//! These mirror the remote JSON shapes one-to-one. Nothing here is cached or
//! persisted; every record is materialized per API call and dropped once the
//! tool layer has rendered it to text. Optional fields are `Option` because
//! Trakt returns `null` for ids it does not know (e.g. `imdb` on obscure
//! entries).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A TV show.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Show {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub ids: ShowIds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowIds {
    #[serde(default)]
    pub trakt: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<u64>,
}

/// A movie.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Movie {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub ids: MovieIds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovieIds {
    #[serde(default)]
    pub trakt: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<u64>,
}

/// A single TV episode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Episode {
    #[serde(default)]
    pub season: u32,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ids: EpisodeIds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeIds {
    #[serde(default)]
    pub trakt: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<u64>,
}

/// One entry from `GET /search/...`, ranked by relevance score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    /// "show", "movie", or "episode".
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<Show>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie: Option<Movie>,
}

/// One entry from the user's watch history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryItem {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub watched_at: Option<DateTime<Utc>>,
    /// "watch" or "scrobble".
    #[serde(default)]
    pub action: String,
    /// "episode" or "movie".
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<Episode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<Show>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie: Option<Movie>,
}

/// Request body for `/sync/history` and `/sync/history/remove`.
///
/// `watched_at` is `None` to let the remote service stamp "now".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchedItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub movies: Vec<Movie>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shows: Vec<Show>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episodes: Vec<Episode>,
}

/// The remote service's report of what a history mutation actually did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub added: SyncStats,
    #[serde(default)]
    pub deleted: SyncStats,
    #[serde(default)]
    pub existing: SyncStats,
    #[serde(default)]
    pub not_found: NotFound,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyncStats {
    #[serde(default)]
    pub movies: u32,
    #[serde(default)]
    pub episodes: u32,
}

/// Items the remote service could not match during a sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotFound {
    #[serde(default)]
    pub movies: Vec<Movie>,
    #[serde(default)]
    pub shows: Vec<Show>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

/// Response from `POST /oauth/device/code`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceCode {
    #[serde(default)]
    pub device_code: String,
    #[serde(default)]
    pub user_code: String,
    #[serde(default)]
    pub verification_url: String,
    /// Seconds until the user code expires.
    #[serde(default)]
    pub expires_in: u32,
    /// Recommended polling interval in seconds.
    #[serde(default)]
    pub interval: u32,
}

/// Response from `POST /oauth/device/token`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub created_at: i64,
}
