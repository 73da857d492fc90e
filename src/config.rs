#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::identity::{Identity, resolve_identity};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_CLIENT_SECRETS_FILE: &str = "client_secrets.json";
/// The Data API caps `maxResults` at 50; backups want the fewest round
/// trips, so the cap is also the default.
pub const DEFAULT_MAX_RESULTS: u32 = 50;

/// Everything a backup run needs to know, resolved once at startup. Optional
/// fields are genuinely optional; nothing is looked up again later.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub identity: Identity,
    pub related: bool,
    pub merge_related: bool,
    /// Parent for the timestamped backup directory. Present selects
    /// directory mode; absent selects console mode.
    pub directory: Option<PathBuf>,
    pub developer_key: Option<String>,
    pub client_secrets_file: PathBuf,
    pub max_results: u32,
}

/// Values supplied on the command line; they take precedence over the
/// configuration file.
#[derive(Debug, Clone, Default)]
pub struct BackupOverrides {
    pub channel_id: Option<String>,
    pub username: Option<String>,
    pub related: bool,
    pub directory: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_backup_options(overrides: BackupOverrides) -> Result<BackupOptions> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_backup_options(&file_vars, overrides)
}

fn build_backup_options(
    file_vars: &HashMap<String, String>,
    overrides: BackupOverrides,
) -> Result<BackupOptions> {
    let identity = resolve_identity(
        overrides.channel_id,
        overrides.username,
        lookup_value("CHANNELID", file_vars),
        lookup_value("USERNAME", file_vars),
    )?;
    let related = overrides.related
        || lookup_value("RELATED", file_vars).is_some_and(|value| parse_truthy(&value));
    let merge_related =
        lookup_value("MERGE_RELATED", file_vars).is_some_and(|value| parse_truthy(&value));
    let directory = overrides
        .directory
        .or_else(|| lookup_value("DIRECTORY", file_vars).map(PathBuf::from));
    let developer_key = lookup_value("DEVELOPER_KEY", file_vars);
    let client_secrets_file = lookup_value("CLIENT_SECRETS_FILE", file_vars)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_SECRETS_FILE));
    let max_results = lookup_value("MAX_RESULTS", file_vars)
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|count| (1..=DEFAULT_MAX_RESULTS).contains(count))
        .unwrap_or(DEFAULT_MAX_RESULTS);
    Ok(BackupOptions {
        identity,
        related,
        merge_related,
        directory,
        developer_key,
        client_secrets_file,
        max_results,
    })
}

// Config keys like USERNAME shadow common login-environment variables, so
// lookups read the file only, never the process environment.
fn lookup_value(key: &str, file_vars: &HashMap<String, String>) -> Option<String> {
    file_vars.get(key).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
