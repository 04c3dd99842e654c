//! Trakt tool definitions and handlers.
//!
//! Each tool is defined as a JSON schema and handled by an async function
//! registered with the [`Server`]. Handlers validate their arguments beyond
//! what the schema states, call the [`TraktClient`], and render the outcome
//! as Markdown-flavored text for the assistant host to display verbatim.
//!
//! ## Tools
//!
//! - `authenticate` - OAuth device flow: returns a verification URL + code
//! - `search_show` - free-text search over shows and movies
//! - `get_history` - recent watch history (requires an access token)
//! - `log_watch` - resolve a title and mark an episode or movie watched
//!
//! Validation failures and remote errors are rendered as error-flagged tool
//! results (`isError: true`), never as JSON-RPC protocol errors.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::{ClientError, TraktClient};
use crate::protocol::{Tool, ToolCallResult};
use crate::server::Server;
use crate::types::{Episode, EpisodeIds, Movie, MovieIds, SearchResult, Show, WatchedItem};

/// Search score at or above which the top hit is trusted without
/// disambiguation, regardless of how many other results came back.
const HIGH_CONFIDENCE_SCORE: f64 = 1000.0;
/// Maximum entries rendered by `search_show` before truncating.
const MAX_SEARCH_RESULTS: usize = 10;
/// Maximum candidates listed in a disambiguation error.
const MAX_CANDIDATES: usize = 5;
const DEFAULT_HISTORY_LIMIT: u32 = 10;

/// Register all Trakt tools with the server. Each handler captures its own
/// reference to the shared client.
pub async fn register_tools(server: &Server, client: Arc<TraktClient>) {
    let c = Arc::clone(&client);
    server
        .register_tool(
            Tool {
                name: "authenticate".to_string(),
                description: "Authenticate with Trakt.tv using OAuth device flow. Returns a \
                              verification URL and code for the user to authorize."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
            Box::new(move |_shutdown, _args| {
                let client = Arc::clone(&c);
                Box::pin(async move { authenticate(&client).await })
            }),
        )
        .await;

    let c = Arc::clone(&client);
    server
        .register_tool(
            Tool {
                name: "search_show".to_string(),
                description: "Search for TV shows, movies, or anime by title. Returns matching \
                              content with IDs and metadata."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search query (title or keywords)"
                        },
                        "type": {
                            "type": "string",
                            "description": "Content type filter (optional)",
                            "enum": ["show", "movie"]
                        }
                    },
                    "required": ["query"]
                }),
            },
            Box::new(move |_shutdown, args| {
                let client = Arc::clone(&c);
                Box::pin(async move { search_show(&client, args).await })
            }),
        )
        .await;

    let c = Arc::clone(&client);
    server
        .register_tool(
            Tool {
                name: "get_history".to_string(),
                description: "Retrieve watch history with optional filters. Supports content \
                              type filtering."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "description": "Filter by content type (optional)",
                            "enum": ["shows", "movies"]
                        },
                        "limit": {
                            "type": "number",
                            "description": "Maximum number of items to return"
                        }
                    }
                }),
            },
            Box::new(move |_shutdown, args| {
                let client = Arc::clone(&c);
                Box::pin(async move { get_history(&client, args).await })
            }),
        )
        .await;

    let c = Arc::clone(&client);
    server
        .register_tool(
            Tool {
                name: "log_watch".to_string(),
                description: "Log a single episode or movie as watched. Accepts ISO 8601 dates. \
                              If no date provided, uses current time."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "description": "Content type",
                            "enum": ["episode", "movie"]
                        },
                        "showName": {
                            "type": "string",
                            "description": "Show name (required for episodes)"
                        },
                        "season": {
                            "type": "number",
                            "description": "Season number (required for episodes)"
                        },
                        "episode": {
                            "type": "number",
                            "description": "Episode number (required for episodes)"
                        },
                        "movieName": {
                            "type": "string",
                            "description": "Movie name (required for movies)"
                        },
                        "watchedAt": {
                            "type": "string",
                            "description": "When it was watched. ISO 8601 format"
                        }
                    },
                    "required": ["type"]
                }),
            },
            Box::new(move |_shutdown, args| {
                let client = Arc::clone(&c);
                Box::pin(async move { log_watch(&client, args).await })
            }),
        )
        .await;
}

// Handlers

async fn authenticate(client: &TraktClient) -> anyhow::Result<ToolCallResult> {
    if !client.is_configured() {
        return Ok(ToolCallResult::error(
            "Error: TRAKT_CLIENT_ID and TRAKT_CLIENT_SECRET environment variables must be set",
        ));
    }

    let code = match client.get_device_code().await {
        Ok(code) => code,
        Err(e) => return Ok(render_gateway_error(&e)),
    };

    let msg = format!(
        "🔐 **Trakt Authentication**\n\n\
         Please visit: {}\n\
         Enter code: **{}**\n\n\
         The code expires in {} seconds.\n\n\
         After authorizing, the access token will be displayed. Set it as \
         TRAKT_ACCESS_TOKEN environment variable.",
        code.verification_url, code.user_code, code.expires_in
    );

    Ok(ToolCallResult::text(msg))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchArgs {
    query: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

async fn search_show(client: &TraktClient, args: Value) -> anyhow::Result<ToolCallResult> {
    let args: SearchArgs = match serde_json::from_value(args) {
        Ok(args) => args,
        Err(e) => return Ok(ToolCallResult::error(format!("Error: invalid arguments: {e}"))),
    };

    if args.query.is_empty() {
        return Ok(ToolCallResult::error("Error: query is required"));
    }

    let results = match client.search(&args.query, args.kind.as_deref()).await {
        Ok(results) => results,
        Err(e) => return Ok(render_gateway_error(&e)),
    };

    if results.is_empty() {
        return Ok(ToolCallResult::text(format!(
            "No results found for: {}",
            args.query
        )));
    }

    let mut output = String::new();
    for (i, result) in results.iter().enumerate() {
        if i >= MAX_SEARCH_RESULTS {
            output.push_str(&format!(
                "\n... and {} more results",
                results.len() - MAX_SEARCH_RESULTS
            ));
            break;
        }
        match result.kind.as_str() {
            "show" => {
                if let Some(show) = &result.show {
                    output.push_str(&format!(
                        "📺 **{}** ({}) - Trakt ID: {}\n",
                        show.title,
                        show.year.unwrap_or(0),
                        show.ids.trakt
                    ));
                }
            }
            "movie" => {
                if let Some(movie) = &result.movie {
                    output.push_str(&format!(
                        "🎬 **{}** ({}) - Trakt ID: {}\n",
                        movie.title,
                        movie.year.unwrap_or(0),
                        movie.ids.trakt
                    ));
                }
            }
            _ => {}
        }
    }

    Ok(ToolCallResult::text(output))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryArgs {
    #[serde(rename = "type")]
    kind: Option<String>,
    limit: i64,
}

async fn get_history(client: &TraktClient, args: Value) -> anyhow::Result<ToolCallResult> {
    if !client.is_authenticated() {
        return Ok(ToolCallResult::error(
            "Error: Not authenticated. Use the authenticate tool first.",
        ));
    }

    let args: HistoryArgs = match serde_json::from_value(args) {
        Ok(args) => args,
        Err(e) => return Ok(ToolCallResult::error(format!("Error: invalid arguments: {e}"))),
    };

    let limit = if args.limit <= 0 {
        DEFAULT_HISTORY_LIMIT
    } else {
        args.limit as u32
    };

    let history = match client.get_history(args.kind.as_deref(), limit).await {
        Ok(history) => history,
        Err(e) => return Ok(render_gateway_error(&e)),
    };

    if history.is_empty() {
        return Ok(ToolCallResult::text("No watch history found."));
    }

    let mut output = String::new();
    for item in &history {
        match item.kind.as_str() {
            "episode" => {
                // Entries missing their episode or show payload are skipped
                if let (Some(show), Some(episode)) = (&item.show, &item.episode) {
                    output.push_str(&format!(
                        "📺 {} S{:02}E{:02} - {} ({})\n",
                        show.title,
                        episode.season,
                        episode.number,
                        episode.title,
                        format_date(item.watched_at)
                    ));
                }
            }
            "movie" => {
                if let Some(movie) = &item.movie {
                    output.push_str(&format!(
                        "🎬 {} ({})\n",
                        movie.title,
                        format_date(item.watched_at)
                    ));
                }
            }
            _ => {}
        }
    }

    Ok(ToolCallResult::text(output))
}

fn format_date(watched_at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    match watched_at {
        Some(at) => at.format("%Y-%m-%d").to_string(),
        None => "unknown".to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LogWatchArgs {
    #[serde(rename = "type")]
    kind: String,
    show_name: String,
    season: i64,
    episode: i64,
    movie_name: String,
    /// Passed through to the remote service verbatim; empty means "now".
    watched_at: String,
}

async fn log_watch(client: &TraktClient, args: Value) -> anyhow::Result<ToolCallResult> {
    if !client.is_authenticated() {
        return Ok(ToolCallResult::error(
            "Error: Not authenticated. Use the authenticate tool first.",
        ));
    }

    let args: LogWatchArgs = match serde_json::from_value(args) {
        Ok(args) => args,
        Err(e) => return Ok(ToolCallResult::error(format!("Error: invalid arguments: {e}"))),
    };

    match args.kind.as_str() {
        "episode" => log_episode(client, &args).await,
        "movie" => log_movie(client, &args).await,
        _ => Ok(ToolCallResult::error(
            "Error: type must be \"episode\" or \"movie\"",
        )),
    }
}

async fn log_episode(client: &TraktClient, args: &LogWatchArgs) -> anyhow::Result<ToolCallResult> {
    if args.show_name.is_empty() {
        return Ok(ToolCallResult::error(
            "Error: showName is required for episodes",
        ));
    }
    // Season 0 is valid (specials); episode numbers start at 1
    if args.season < 0 || args.episode <= 0 {
        return Ok(ToolCallResult::error(
            "Error: season must be >= 0 and episode must be > 0",
        ));
    }

    let results = match client.search(&args.show_name, Some("show")).await {
        Ok(results) => results,
        Err(e) => return Ok(render_gateway_error(&e)),
    };
    let show = match resolve_show(&results, &args.show_name) {
        Ok(show) => show,
        Err(result) => return Ok(result),
    };

    let episode = match client
        .get_episode(
            &show.ids.trakt.to_string(),
            args.season as u32,
            args.episode as u32,
        )
        .await
    {
        Ok(episode) => episode,
        Err(e) if e.is_not_found() => {
            return Ok(ToolCallResult::error(format!(
                "No episode found: S{:02}E{:02} of {}",
                args.season, args.episode, show.title
            )));
        }
        Err(e) => return Ok(render_gateway_error(&e)),
    };

    let item = WatchedItem {
        watched_at: watched_at_param(&args.watched_at),
        episodes: vec![Episode {
            ids: EpisodeIds {
                trakt: episode.ids.trakt,
                ..Default::default()
            },
            ..Default::default()
        }],
        ..Default::default()
    };
    let sync = match client.add_to_history(&item).await {
        Ok(sync) => sync,
        Err(e) => return Ok(render_gateway_error(&e)),
    };

    if sync.added.episodes > 0 {
        Ok(ToolCallResult::text(format!(
            "✅ Logged **{}** S{:02}E{:02} - {}",
            show.title, args.season, args.episode, episode.title
        )))
    } else if sync.existing.episodes > 0 {
        Ok(ToolCallResult::text(format!(
            "ℹ️ Already watched: **{}** S{:02}E{:02} - {}",
            show.title, args.season, args.episode, episode.title
        )))
    } else {
        Ok(ToolCallResult::text(format!(
            "⚠️ Trakt reported nothing added or existing for **{}** S{:02}E{:02}",
            show.title, args.season, args.episode
        )))
    }
}

async fn log_movie(client: &TraktClient, args: &LogWatchArgs) -> anyhow::Result<ToolCallResult> {
    if args.movie_name.is_empty() {
        return Ok(ToolCallResult::error(
            "Error: movieName is required for movies",
        ));
    }

    let results = match client.search(&args.movie_name, Some("movie")).await {
        Ok(results) => results,
        Err(e) => return Ok(render_gateway_error(&e)),
    };
    let movie = match resolve_movie(&results, &args.movie_name) {
        Ok(movie) => movie,
        Err(result) => return Ok(result),
    };

    let item = WatchedItem {
        watched_at: watched_at_param(&args.watched_at),
        movies: vec![Movie {
            ids: MovieIds {
                trakt: movie.ids.trakt,
                ..Default::default()
            },
            ..Default::default()
        }],
        ..Default::default()
    };
    let sync = match client.add_to_history(&item).await {
        Ok(sync) => sync,
        Err(e) => return Ok(render_gateway_error(&e)),
    };

    let year = movie.year.unwrap_or(0);
    if sync.added.movies > 0 {
        Ok(ToolCallResult::text(format!(
            "✅ Logged **{}** ({year})",
            movie.title
        )))
    } else if sync.existing.movies > 0 {
        Ok(ToolCallResult::text(format!(
            "ℹ️ Already watched: **{}** ({year})",
            movie.title
        )))
    } else {
        Ok(ToolCallResult::text(format!(
            "⚠️ Trakt reported nothing added or existing for **{}** ({year})",
            movie.title
        )))
    }
}

// Resolution

/// Pick the authoritative show from ranked search results, or produce the
/// not-found / disambiguation error the caller should return as-is.
///
/// A top result scoring at least [`HIGH_CONFIDENCE_SCORE`] is trusted even
/// amid many lower-scoring matches; below that, multiple results mean the
/// query is ambiguous.
fn resolve_show<'a>(results: &'a [SearchResult], query: &str) -> Result<&'a Show, ToolCallResult> {
    if results.is_empty() {
        return Err(ToolCallResult::error(format!("No show found for: {query}")));
    }

    if results.len() > 1 && results[0].score < HIGH_CONFIDENCE_SCORE {
        let mut msg = format!("Multiple shows found matching '{query}'. Please refine your search:\n");
        for (i, result) in results.iter().enumerate() {
            if i >= MAX_CANDIDATES {
                msg.push_str(&format!(
                    "... and {} more matches",
                    results.len() - MAX_CANDIDATES
                ));
                break;
            }
            if let Some(show) = &result.show {
                msg.push_str(&format!(
                    "📺 **{}** ({}) - Trakt ID: {}\n",
                    show.title,
                    show.year.unwrap_or(0),
                    show.ids.trakt
                ));
            }
        }
        return Err(ToolCallResult::error(msg));
    }

    match &results[0].show {
        Some(show) => Ok(show),
        None => Err(ToolCallResult::error(format!("No show found for: {query}"))),
    }
}

/// Movie counterpart of [`resolve_show`], same confidence rule.
fn resolve_movie<'a>(
    results: &'a [SearchResult],
    query: &str,
) -> Result<&'a Movie, ToolCallResult> {
    if results.is_empty() {
        return Err(ToolCallResult::error(format!("No movie found for: {query}")));
    }

    if results.len() > 1 && results[0].score < HIGH_CONFIDENCE_SCORE {
        let mut msg =
            format!("Multiple movies found matching '{query}'. Please refine your search:\n");
        for (i, result) in results.iter().enumerate() {
            if i >= MAX_CANDIDATES {
                msg.push_str(&format!(
                    "... and {} more matches",
                    results.len() - MAX_CANDIDATES
                ));
                break;
            }
            if let Some(movie) = &result.movie {
                msg.push_str(&format!(
                    "🎬 **{}** ({}) - Trakt ID: {}\n",
                    movie.title,
                    movie.year.unwrap_or(0),
                    movie.ids.trakt
                ));
            }
        }
        return Err(ToolCallResult::error(msg));
    }

    match &results[0].movie {
        Some(movie) => Ok(movie),
        None => Err(ToolCallResult::error(format!("No movie found for: {query}"))),
    }
}

fn watched_at_param(watched_at: &str) -> Option<String> {
    if watched_at.is_empty() {
        None
    } else {
        Some(watched_at.to_string())
    }
}

/// Render a gateway failure as a tool-logic error, with an actionable hint
/// for the two cases the user can do something about.
fn render_gateway_error(err: &ClientError) -> ToolCallResult {
    let mut msg = format!("Error: {err}");
    if err.is_auth_error() {
        msg.push_str("\nYour access token may be missing or expired. Run the authenticate tool to get a new one.");
    } else if err.is_rate_limited() {
        msg.push_str("\nTrakt is rate limiting requests. Wait a moment and try again.");
    }
    ToolCallResult::error(msg)
}
