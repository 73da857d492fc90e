#![forbid(unsafe_code)]

//! Thin blocking client for the YouTube Data API v3 list endpoints, plus the
//! pull-based page sequence both traversal levels are built on. Responses are
//! narrowed with `fields` masks so a backup run transfers titles and cursors,
//! nothing else.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::identity::{ChannelLookup, Identity};

pub const DATA_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

const LIST_FIELDS: &str = "items(id,snippet/title),nextPageToken";
const LIST_FIELDS_WITH_TOTAL: &str = "items(id,snippet/title),nextPageToken,pageInfo/totalResults";
const RELATED_FIELDS: &str = "items(contentDetails/relatedPlaylists)";

/// A playlist as the traversal sees it: enough to fetch its videos and to
/// label its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: String,
}

/// A single video; its ordinal is assigned by the traversal, not the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEntry {
    pub title: String,
}

/// One page of a listing. `next_page_token` is present iff more pages remain;
/// `total_results` is only requested (and therefore only present) when the
/// run needs a total up front.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
    pub total_results: Option<u64>,
}

/// Lazily pulls pages from `fetch`, feeding each page's continuation token
/// into the next call. The first call is made with no token. Iteration ends
/// when a page arrives without a token; an empty item list alone does not end
/// it. An error is yielded once and ends the sequence.
pub fn pages<T, F>(mut fetch: F) -> impl Iterator<Item = Result<Page<T>>>
where
    F: FnMut(Option<&str>) -> Result<Page<T>>,
{
    let mut token: Option<String> = None;
    let mut first = true;
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let current = if first { None } else { token.clone() };
        first = false;
        match fetch(current.as_deref()) {
            Ok(page) => {
                match &page.next_page_token {
                    Some(next) => token = Some(next.clone()),
                    None => done = true,
                }
                Some(Ok(page))
            }
            Err(err) => {
                done = true;
                Some(Err(err))
            }
        }
    })
}

/// What the playlist listing is filtered by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistFilter {
    /// Public playlists of one channel.
    Channel(String),
    /// An explicit set of playlist IDs (the related-playlists path).
    Ids(Vec<String>),
    /// The authenticated user's own playlists, private ones included.
    Mine,
}

/// A prepared `playlists.list` request; re-executed with successive page
/// tokens by the traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistListRequest {
    pub filter: PlaylistFilter,
    pub include_total: bool,
}

impl PlaylistListRequest {
    pub fn query(&self, max_results: u32, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let fields = if self.include_total {
            LIST_FIELDS_WITH_TOTAL
        } else {
            LIST_FIELDS
        };
        let mut query = vec![
            ("part", "id,snippet".to_string()),
            ("fields", fields.to_string()),
            ("maxResults", max_results.to_string()),
        ];
        match &self.filter {
            PlaylistFilter::Channel(id) => query.push(("channelId", id.clone())),
            PlaylistFilter::Ids(ids) => query.push(("id", ids.join(","))),
            PlaylistFilter::Mine => query.push(("mine", "true".to_string())),
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        query
    }
}

/// Paged access to playlists and their videos, as the traversal consumes it.
pub trait PlaylistSource {
    fn playlists_page(
        &self,
        request: &PlaylistListRequest,
        page_token: Option<&str>,
    ) -> Result<Page<PlaylistEntry>>;

    fn videos_page(&self, playlist_id: &str, page_token: Option<&str>)
    -> Result<Page<VideoEntry>>;
}

enum ClientAuth {
    DeveloperKey(String),
    Bearer(String),
}

/// Handle to the Data API. Constructed once per run and passed by reference
/// into every lookup and traversal call; read-only after construction.
pub struct YouTubeClient {
    agent: ureq::Agent,
    base_url: String,
    auth: ClientAuth,
    max_results: u32,
}

impl YouTubeClient {
    /// Client for public data, authorized by an API developer key.
    pub fn with_developer_key(agent: ureq::Agent, key: String, max_results: u32) -> Self {
        Self::new(agent, ClientAuth::DeveloperKey(key), max_results)
    }

    /// Client acting as the authenticated user, authorized by an OAuth
    /// access token.
    pub fn with_access_token(agent: ureq::Agent, token: String, max_results: u32) -> Self {
        Self::new(agent, ClientAuth::Bearer(token), max_results)
    }

    fn new(agent: ureq::Agent, auth: ClientAuth, max_results: u32) -> Self {
        Self {
            agent,
            base_url: DATA_API_BASE.to_string(),
            auth,
            max_results,
        }
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, resource);
        let mut request = self.agent.get(&url);
        for (name, value) in params {
            request = request.query(name, value);
        }
        request = match &self.auth {
            ClientAuth::DeveloperKey(key) => request.query("key", key),
            ClientAuth::Bearer(token) => request.set("Authorization", &format!("Bearer {token}")),
        };
        match request.call() {
            Ok(response) => response
                .into_json()
                .with_context(|| format!("decoding {resource} response")),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                bail!("An HTTP error {status} occurred:\n{body}")
            }
            Err(err) => Err(err).with_context(|| format!("requesting {resource}")),
        }
    }
}

impl PlaylistSource for YouTubeClient {
    fn playlists_page(
        &self,
        request: &PlaylistListRequest,
        page_token: Option<&str>,
    ) -> Result<Page<PlaylistEntry>> {
        // A channel with no related playlists leaves the ID filter empty;
        // the listing is empty by definition, no request needed.
        if let PlaylistFilter::Ids(ids) = &request.filter
            && ids.is_empty()
        {
            return Ok(Page {
                items: Vec::new(),
                next_page_token: None,
                total_results: Some(0),
            });
        }
        let query = request.query(self.max_results, page_token);
        let response: PlaylistListResponse = self.get_json("playlists", &query)?;
        Ok(Page {
            items: response
                .items
                .into_iter()
                .map(|item| PlaylistEntry {
                    id: item.id,
                    title: item.snippet.title,
                })
                .collect(),
            next_page_token: response.next_page_token,
            total_results: response.page_info.and_then(|info| info.total_results),
        })
    }

    fn videos_page(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<VideoEntry>> {
        let mut params = vec![
            ("part", "id,snippet".to_string()),
            ("fields", LIST_FIELDS.to_string()),
            ("playlistId", playlist_id.to_string()),
            ("maxResults", self.max_results.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        let response: PlaylistItemListResponse = self.get_json("playlistItems", &params)?;
        Ok(Page {
            items: response
                .items
                .into_iter()
                .map(|item| VideoEntry {
                    title: item.snippet.title,
                })
                .collect(),
            next_page_token: response.next_page_token,
            total_results: None,
        })
    }
}

impl ChannelLookup for YouTubeClient {
    fn channel_id_for_username(&self, username: &str) -> Result<Option<String>> {
        let params = vec![
            ("part", "id".to_string()),
            ("forUsername", username.to_string()),
            ("maxResults", self.max_results.to_string()),
        ];
        let response: ChannelListResponse = self.get_json("channels", &params)?;
        Ok(response.items.into_iter().next().map(|channel| channel.id))
    }

    fn related_playlist_ids(&self, identity: &Identity) -> Result<Vec<String>> {
        let scope = match identity {
            Identity::ChannelId(id) => ("id", id.clone()),
            Identity::Username(name) => ("forUsername", name.clone()),
            Identity::Authenticated => ("mine", "true".to_string()),
        };
        let params = vec![
            ("part", "contentDetails".to_string()),
            ("fields", RELATED_FIELDS.to_string()),
            scope,
        ];
        let response: ChannelDetailsResponse = self.get_json("channels", &params)?;
        let mut ids = Vec::new();
        for channel in response.items {
            if let Some(details) = channel.content_details
                && let Some(related) = details.related_playlists
            {
                ids.extend(related.ids());
            }
        }
        Ok(ids)
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistListResponse {
    #[serde(default)]
    items: Vec<PlaylistResource>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "pageInfo")]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResource {
    id: String,
    #[serde(default)]
    snippet: TitleSnippet,
}

#[derive(Debug, Default, Deserialize)]
struct TitleSnippet {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "totalResults")]
    total_results: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemListResponse {
    #[serde(default)]
    items: Vec<PlaylistItemResource>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemResource {
    #[serde(default)]
    snippet: TitleSnippet,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelResource>,
}

#[derive(Debug, Deserialize)]
struct ChannelResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelDetailsResponse {
    #[serde(default)]
    items: Vec<ChannelDetailsResource>,
}

#[derive(Debug, Deserialize)]
struct ChannelDetailsResource {
    #[serde(rename = "contentDetails")]
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
struct ChannelContentDetails {
    #[serde(rename = "relatedPlaylists")]
    related_playlists: Option<RelatedPlaylists>,
}

/// The server-managed system playlists of a channel. Flattening order is the
/// declaration order below.
#[derive(Debug, Default, Deserialize)]
struct RelatedPlaylists {
    likes: Option<String>,
    favorites: Option<String>,
    uploads: Option<String>,
    #[serde(rename = "watchHistory")]
    watch_history: Option<String>,
    #[serde(rename = "watchLater")]
    watch_later: Option<String>,
}

impl RelatedPlaylists {
    fn ids(&self) -> Vec<String> {
        [
            &self.likes,
            &self.favorites,
            &self.uploads,
            &self.watch_history,
            &self.watch_later,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    fn page_of(titles: &[&str], token: Option<&str>) -> Page<VideoEntry> {
        Page {
            items: titles
                .iter()
                .map(|title| VideoEntry {
                    title: title.to_string(),
                })
                .collect(),
            next_page_token: token.map(|token| token.to_string()),
            total_results: None,
        }
    }

    #[test]
    fn pages_follows_tokens_until_absent() {
        let queued = RefCell::new(VecDeque::from(vec![
            page_of(&["A", "B"], Some("t1")),
            page_of(&[], Some("t2")),
            page_of(&["C"], None),
        ]));
        let seen_tokens = RefCell::new(Vec::new());
        let collected: Vec<Page<VideoEntry>> = pages(|token| {
            seen_tokens
                .borrow_mut()
                .push(token.map(|token| token.to_string()));
            Ok(queued.borrow_mut().pop_front().expect("fetch past end"))
        })
        .collect::<Result<_>>()
        .expect("pages");

        assert_eq!(collected.len(), 3);
        assert_eq!(
            *seen_tokens.borrow(),
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
        // The middle page was empty but carried a token, so it did not end
        // the sequence.
        assert_eq!(collected[1].items.len(), 0);
    }

    #[test]
    fn pages_stops_after_error() {
        let mut calls = 0;
        let results: Vec<Result<Page<VideoEntry>>> = pages(|_token| {
            calls += 1;
            Err(anyhow::anyhow!("boom"))
        })
        .collect();

        assert_eq!(calls, 1);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn playlist_query_filters_by_channel() {
        let request = PlaylistListRequest {
            filter: PlaylistFilter::Channel("UC123".to_string()),
            include_total: false,
        };
        let query = request.query(50, None);
        assert!(query.contains(&("part", "id,snippet".to_string())));
        assert!(query.contains(&("fields", LIST_FIELDS.to_string())));
        assert!(query.contains(&("maxResults", "50".to_string())));
        assert!(query.contains(&("channelId", "UC123".to_string())));
        assert!(!query.iter().any(|(name, _)| *name == "pageToken"));
    }

    #[test]
    fn playlist_query_requests_total_and_token() {
        let request = PlaylistListRequest {
            filter: PlaylistFilter::Mine,
            include_total: true,
        };
        let query = request.query(25, Some("NEXT"));
        assert!(query.contains(&("fields", LIST_FIELDS_WITH_TOTAL.to_string())));
        assert!(query.contains(&("maxResults", "25".to_string())));
        assert!(query.contains(&("mine", "true".to_string())));
        assert!(query.contains(&("pageToken", "NEXT".to_string())));
    }

    #[test]
    fn playlist_query_joins_ids() {
        let request = PlaylistListRequest {
            filter: PlaylistFilter::Ids(vec!["PL1".to_string(), "PL2".to_string()]),
            include_total: false,
        };
        let query = request.query(50, None);
        assert!(query.contains(&("id", "PL1,PL2".to_string())));
    }

    #[test]
    fn empty_id_filter_yields_empty_page_without_network() {
        let client = YouTubeClient::with_developer_key(ureq::agent(), "key".to_string(), 50);
        let request = PlaylistListRequest {
            filter: PlaylistFilter::Ids(Vec::new()),
            include_total: true,
        };
        let page = client.playlists_page(&request, None).expect("empty page");
        assert!(page.items.is_empty());
        assert_eq!(page.next_page_token, None);
        assert_eq!(page.total_results, Some(0));
    }

    #[test]
    fn parses_playlist_listing() {
        let body = r#"{
            "items": [
                {"id": "PL1", "snippet": {"title": "Mix"}},
                {"id": "PL2", "snippet": {"title": "Live — 2024"}}
            ],
            "nextPageToken": "CAUQAA",
            "pageInfo": {"totalResults": 7, "resultsPerPage": 2}
        }"#;
        let response: PlaylistListResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(response.items.len(), 2);
        assert_eq!(response.items[1].snippet.title, "Live — 2024");
        assert_eq!(response.next_page_token.as_deref(), Some("CAUQAA"));
        assert_eq!(
            response.page_info.and_then(|info| info.total_results),
            Some(7)
        );
    }

    #[test]
    fn parses_last_page_without_token_or_items() {
        let response: PlaylistItemListResponse = serde_json::from_str("{}").expect("parse");
        assert!(response.items.is_empty());
        assert_eq!(response.next_page_token, None);
    }

    #[test]
    fn related_ids_flatten_in_declaration_order() {
        let body = r#"{
            "items": [
                {"contentDetails": {"relatedPlaylists": {"uploads": "PL2", "likes": "PL1"}}}
            ]
        }"#;
        let response: ChannelDetailsResponse = serde_json::from_str(body).expect("parse");
        let related = response.items[0]
            .content_details
            .as_ref()
            .and_then(|details| details.related_playlists.as_ref())
            .expect("related");
        assert_eq!(related.ids(), vec!["PL1".to_string(), "PL2".to_string()]);
    }
}
