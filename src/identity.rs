#![forbid(unsafe_code)]

//! Decides whose playlists a run backs up and turns that decision into the
//! initial listing request. Exactly one of channel ID, username, or the
//! authenticated user is active per run.

use anyhow::{Result, bail};

use crate::api::{PlaylistFilter, PlaylistListRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    ChannelId(String),
    Username(String),
    /// No explicit target; the run operates on the OAuth user's own
    /// playlists, private ones included.
    Authenticated,
}

/// Channel lookups the request builders need from the API client.
pub trait ChannelLookup {
    /// Resolves a legacy username to its channel ID, `None` when the
    /// username matches no channel.
    fn channel_id_for_username(&self, username: &str) -> Result<Option<String>>;

    /// Returns the IDs of the identity's system playlists (likes, uploads,
    /// ...), flattened in category order. Empty when the lookup matches no
    /// channel.
    fn related_playlist_ids(&self, identity: &Identity) -> Result<Vec<String>>;
}

/// Merges the CLI and configuration-file identity slots. The CLI value wins
/// per slot; a channel ID and a username arriving together, from whichever
/// sources, is a configuration error raised before any network access.
pub fn resolve_identity(
    cli_channel_id: Option<String>,
    cli_username: Option<String>,
    cfg_channel_id: Option<String>,
    cfg_username: Option<String>,
) -> Result<Identity> {
    let channel_id = pick(cli_channel_id, cfg_channel_id);
    let username = pick(cli_username, cfg_username);
    match (channel_id, username) {
        (Some(_), Some(_)) => {
            bail!("may only specify either a channel ID or a username, not both")
        }
        (Some(id), None) => Ok(Identity::ChannelId(id)),
        (None, Some(name)) => Ok(Identity::Username(name)),
        (None, None) => Ok(Identity::Authenticated),
    }
}

fn pick(cli: Option<String>, cfg: Option<String>) -> Option<String> {
    cli.and_then(normalized).or_else(|| cfg.and_then(normalized))
}

fn normalized(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Builds the primary listing request. The username path resolves to a
/// channel ID first and fails the run when the name matches no channel.
pub fn build_playlists_request(
    lookup: &impl ChannelLookup,
    identity: &Identity,
    include_total: bool,
) -> Result<PlaylistListRequest> {
    let filter = match identity {
        Identity::ChannelId(id) => PlaylistFilter::Channel(id.clone()),
        Identity::Username(name) => match lookup.channel_id_for_username(name)? {
            Some(id) => PlaylistFilter::Channel(id),
            None => bail!("no channel found for {name}"),
        },
        Identity::Authenticated => PlaylistFilter::Mine,
    };
    Ok(PlaylistListRequest {
        filter,
        include_total,
    })
}

/// Builds the listing request for the identity's related playlists. A lookup
/// matching no channel yields an empty ID set, which lists as zero playlists
/// rather than failing.
pub fn build_related_request(
    lookup: &impl ChannelLookup,
    identity: &Identity,
    include_total: bool,
) -> Result<PlaylistListRequest> {
    let ids = lookup.related_playlist_ids(identity)?;
    Ok(PlaylistListRequest {
        filter: PlaylistFilter::Ids(ids),
        include_total,
    })
}
