//! Shared test helpers: a loopback mock of the Trakt API.
//!
//! Each test builds an `axum::Router` describing just the endpoints it
//! needs, spawns it on an ephemeral port, and points a [`TraktClient`] at
//! the returned base URL. The Rust analogue of `httptest` mocks.

use axum::Router;

use crate::config::Config;
use crate::types::{
    Episode, EpisodeIds, HistoryItem, Movie, MovieIds, SearchResult, Show, ShowIds,
};

/// Serve `router` on 127.0.0.1 and return the base URL. The server task
/// lives until the test runtime shuts down.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("mock listener addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{addr}")
}

/// Credentials with both a client id and an access token.
pub fn authenticated_config() -> Config {
    Config {
        client_id: "test-client-id".to_string(),
        access_token: "test-token".to_string(),
        ..Default::default()
    }
}

/// Credentials with a client id but no access token.
pub fn unauthenticated_config() -> Config {
    Config {
        client_id: "test-client-id".to_string(),
        ..Default::default()
    }
}

/// Builders for canned Trakt records.
pub mod mock {
    use super::*;

    pub fn show(title: &str, year: i32, trakt: u64) -> Show {
        Show {
            title: title.to_string(),
            year: Some(year),
            ids: ShowIds {
                trakt,
                ..Default::default()
            },
        }
    }

    pub fn movie(title: &str, year: i32, trakt: u64) -> Movie {
        Movie {
            title: title.to_string(),
            year: Some(year),
            ids: MovieIds {
                trakt,
                ..Default::default()
            },
        }
    }

    pub fn episode(title: &str, season: u32, number: u32, trakt: u64) -> Episode {
        Episode {
            season,
            number,
            title: title.to_string(),
            ids: EpisodeIds {
                trakt,
                ..Default::default()
            },
        }
    }

    pub fn show_result(score: f64, show: Show) -> SearchResult {
        SearchResult {
            kind: "show".to_string(),
            score,
            show: Some(show),
            movie: None,
        }
    }

    pub fn movie_result(score: f64, movie: Movie) -> SearchResult {
        SearchResult {
            kind: "movie".to_string(),
            score,
            show: None,
            movie: Some(movie),
        }
    }

    pub fn episode_history_item(
        show_title: &str,
        episode_title: &str,
        season: u32,
        number: u32,
    ) -> HistoryItem {
        HistoryItem {
            id: 1,
            kind: "episode".to_string(),
            action: "watch".to_string(),
            watched_at: "2024-01-15T20:00:00Z".parse().ok(),
            show: Some(show(show_title, 2008, 1388)),
            episode: Some(episode(episode_title, season, number, 62085)),
            movie: None,
        }
    }

    pub fn movie_history_item(title: &str, year: i32) -> HistoryItem {
        HistoryItem {
            id: 2,
            kind: "movie".to_string(),
            action: "watch".to_string(),
            watched_at: "2024-02-02T21:30:00Z".parse().ok(),
            movie: Some(movie(title, year, 16662)),
            show: None,
            episode: None,
        }
    }
}
