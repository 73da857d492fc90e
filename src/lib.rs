#![forbid(unsafe_code)]

//! Library behind the `ypb` binary: YouTube Data API access, identity
//! resolution, OAuth device authorization, and the playlist backup
//! traversal with its console and directory sinks.

pub mod api;
pub mod auth;
pub mod backup;
pub mod config;
pub mod identity;
pub mod security;
