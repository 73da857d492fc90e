#![forbid(unsafe_code)]

//! Command-line entry point: backs up the titles of a channel's YouTube
//! playlists, either as numbered sections on the console or as one file per
//! playlist inside a timestamped directory.

use anyhow::{Result, anyhow};
use clap::Parser;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use ypb::api::{PlaylistSource, YouTubeClient};
use ypb::auth;
use ypb::backup::{ConsoleSink, DirectorySink, backup_playlists, timestamp_dir_name};
use ypb::config::{BackupOptions, BackupOverrides, resolve_backup_options};
use ypb::identity::{ChannelLookup, Identity, build_playlists_request, build_related_request};
use ypb::security::ensure_not_root;

#[derive(Parser, Debug)]
#[command(
    name = "ypb",
    version,
    about = "Back up the titles of a YouTube channel's playlists",
    long_about = None
)]
struct Cli {
    /// Channel ID whose public playlists should be backed up.
    #[arg(
        short = 'i',
        long = "id",
        value_name = "CHANNEL_ID",
        conflicts_with = "username"
    )]
    id: Option<String>,

    /// Legacy username, resolved to a channel ID before listing.
    #[arg(short = 'u', long = "username", value_name = "USERNAME")]
    username: Option<String>,

    /// Also back up the channel's related playlists (likes, uploads, ...).
    #[arg(short = 'r', long = "related")]
    related: bool,

    /// Parent directory for the timestamped backup folder; omit to print to
    /// the console instead.
    #[arg(short = 'd', long = "directory", value_name = "PATH")]
    directory: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    ensure_not_root("ypb")?;

    let options = resolve_backup_options(BackupOverrides {
        channel_id: cli.id,
        username: cli.username,
        related: cli.related,
        directory: cli.directory,
        env_path: None,
    })?;

    let client = build_client(&options)?;
    run_backup(&client, &options)
}

/// Without a configured identity the backup covers the caller's own
/// playlists, which needs an OAuth token; channel ID and username reads are
/// public data behind the developer key.
fn build_client(options: &BackupOptions) -> Result<YouTubeClient> {
    let agent = ureq::agent();
    match &options.identity {
        Identity::Authenticated => {
            let token = auth::authorized_access_token(
                &agent,
                &options.client_secrets_file,
                &auth::default_cache_path(),
            )?;
            Ok(YouTubeClient::with_access_token(
                agent,
                token,
                options.max_results,
            ))
        }
        _ => {
            let key = options.developer_key.clone().ok_or_else(|| {
                anyhow!("DEVELOPER_KEY is not set; add it to .env to read public channel data")
            })?;
            Ok(YouTubeClient::with_developer_key(
                agent,
                key,
                options.max_results,
            ))
        }
    }
}

fn run_backup<C>(client: &C, options: &BackupOptions) -> Result<()>
where
    C: PlaylistSource + ChannelLookup,
{
    match &options.directory {
        Some(parent) => run_directory(client, options, parent),
        None => run_console(client, options, io::stdout().lock()),
    }
}

fn run_directory<C>(client: &C, options: &BackupOptions, parent: &Path) -> Result<()>
where
    C: PlaylistSource + ChannelLookup,
{
    let primary = build_playlists_request(client, &options.identity, true)?;
    let stamp = timestamp_dir_name();
    let mut sink = DirectorySink::create(parent, &stamp)?;
    backup_playlists(client, &primary, &mut sink)?;

    let mut written = vec![sink.root().to_path_buf()];
    if options.related {
        // The related lookup waits until the primary listing is on disk, so
        // a failing lookup cannot cost the main backup.
        let related = build_related_request(client, &options.identity, true)?;
        if options.merge_related {
            backup_playlists(client, &related, &mut sink)?;
        } else {
            let mut related_sink = DirectorySink::create(parent, &format!("{stamp}-related"))?;
            backup_playlists(client, &related, &mut related_sink)?;
            written.push(related_sink.root().to_path_buf());
        }
    }
    for dir in written {
        println!("Backup written to {}", dir.display());
    }
    Ok(())
}

fn run_console<C>(client: &C, options: &BackupOptions, out: impl Write) -> Result<()>
where
    C: PlaylistSource + ChannelLookup,
{
    let primary = build_playlists_request(client, &options.identity, false)?;
    let mut sink = ConsoleSink::new(out);
    backup_playlists(client, &primary, &mut sink)?;
    if options.related {
        let related = build_related_request(client, &options.identity, false)?;
        backup_playlists(client, &related, &mut sink)?;
    }
    Ok(())
}
