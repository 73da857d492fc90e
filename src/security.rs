#![forbid(unsafe_code)]

//! Refuses to run with root privileges. Backup directories and the cached
//! OAuth credentials should end up owned by the invoking user, not root.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when the tool is started as root.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!("{process} must not be run as root; run it as the user who owns the backups");
    }
    Ok(())
}
