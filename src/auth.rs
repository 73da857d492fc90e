#![forbid(unsafe_code)]

//! OAuth for the authenticated backup path: Google client secrets, a JSON
//! credential cache next to the invoked program, token refresh, and the
//! device authorization grant when no usable credentials exist. Prompts go
//! to standard error so piped backup output stays clean.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub const YOUTUBE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";

const DEVICE_CODE_URL: &str = "https://oauth2.googleapis.com/device/code";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// Tokens this close to expiry are treated as expired, so a token cannot
/// lapse between the check and the first API call.
const EXPIRY_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

/// Reads a Google `client_secrets.json` (either the "installed" or "web"
/// flavor). A missing file aborts with pointers on where credentials come
/// from.
pub fn load_client_secrets(path: &Path) -> Result<ClientSecrets> {
    let raw = fs::read_to_string(path).with_context(|| missing_secrets_help(path))?;
    let parsed: ClientSecretsFile =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    parsed.installed.or(parsed.web).ok_or_else(|| {
        anyhow!(
            "{} has neither an \"installed\" nor a \"web\" client section",
            path.display()
        )
    })
}

fn missing_secrets_help(path: &Path) -> String {
    format!(
        "could not read the OAuth client secrets file {}\n\
         The authenticated and related modes need OAuth client credentials.\n\
         Create an OAuth client at https://console.developers.google.com/, save the\n\
         downloaded JSON at that path, or point CLIENT_SECRETS_FILE at it.",
        path.display()
    )
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// RFC 3339; an unparseable or absent expiry counts as expired.
    #[serde(default)]
    pub expiry: String,
}

impl StoredCredentials {
    fn is_expired(&self) -> bool {
        match DateTime::parse_from_rfc3339(&self.expiry) {
            Ok(expiry) => {
                Utc::now() + chrono::Duration::seconds(EXPIRY_LEEWAY_SECONDS)
                    >= expiry.with_timezone(&Utc)
            }
            Err(_) => true,
        }
    }

    fn is_usable(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }
}

/// Cache file placed next to the invoked program, `<program>-oauth2.json`.
pub fn default_cache_path() -> PathBuf {
    let program = env::args().next().unwrap_or_else(|| "ypb".to_string());
    cache_path_for(&program)
}

pub fn cache_path_for(program: &str) -> PathBuf {
    PathBuf::from(format!("{program}-oauth2.json"))
}

/// Produces an access token for the Data API, in order of preference: the
/// cached token, a refresh-token grant, a fresh device authorization.
pub fn authorized_access_token(
    agent: &ureq::Agent,
    secrets_path: &Path,
    cache_path: &Path,
) -> Result<String> {
    let secrets = load_client_secrets(secrets_path)?;
    if let Some(cached) = load_credentials(cache_path) {
        if cached.is_usable() {
            return Ok(cached.access_token);
        }
        if !cached.refresh_token.is_empty() {
            match refresh_credentials(agent, &secrets, &cached.refresh_token) {
                Ok(refreshed) => {
                    store_credentials(cache_path, &refreshed);
                    return Ok(refreshed.access_token);
                }
                Err(err) => {
                    eprintln!("  Warning: could not refresh credentials: {err:#}");
                }
            }
        }
    }
    let fresh = run_device_flow(agent, &secrets)?;
    store_credentials(cache_path, &fresh);
    Ok(fresh.access_token)
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_url: String,
    expires_in: u64,
    #[serde(default)]
    interval: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
}

fn run_device_flow(agent: &ureq::Agent, secrets: &ClientSecrets) -> Result<StoredCredentials> {
    let device: DeviceCodeResponse = match agent.post(DEVICE_CODE_URL).send_form(&[
        ("client_id", secrets.client_id.as_str()),
        ("scope", YOUTUBE_READONLY_SCOPE),
    ]) {
        Ok(response) => response
            .into_json()
            .context("decoding device code response")?,
        Err(ureq::Error::Status(status, response)) => {
            bail!(
                "device code request failed ({status}): {}",
                token_error(response)
            )
        }
        Err(err) => return Err(err).context("requesting device code"),
    };

    eprintln!();
    eprintln!(
        "To authorize this backup, visit {} and enter the code {}",
        device.verification_url, device.user_code
    );
    eprintln!("Waiting for authorization...");

    let mut interval = device.interval.max(1);
    let deadline = Instant::now() + Duration::from_secs(device.expires_in);
    loop {
        thread::sleep(Duration::from_secs(interval));
        if Instant::now() >= deadline {
            bail!("the device code expired before the authorization was granted");
        }
        match agent.post(TOKEN_URL).send_form(&[
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("device_code", device.device_code.as_str()),
            ("grant_type", DEVICE_CODE_GRANT),
        ]) {
            Ok(response) => {
                let token: TokenResponse =
                    response.into_json().context("decoding token response")?;
                return Ok(credentials_from(token, None));
            }
            Err(ureq::Error::Status(_, response)) => match token_error(response).as_str() {
                "authorization_pending" => {}
                "slow_down" => interval += 5,
                "access_denied" => bail!("the authorization request was denied"),
                "expired_token" => {
                    bail!("the device code expired before the authorization was granted")
                }
                other => bail!("token request failed: {other}"),
            },
            Err(err) => return Err(err).context("polling for authorization"),
        }
    }
}

fn refresh_credentials(
    agent: &ureq::Agent,
    secrets: &ClientSecrets,
    refresh_token: &str,
) -> Result<StoredCredentials> {
    match agent.post(TOKEN_URL).send_form(&[
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ]) {
        Ok(response) => {
            let token: TokenResponse = response.into_json().context("decoding token response")?;
            Ok(credentials_from(token, Some(refresh_token)))
        }
        Err(ureq::Error::Status(status, response)) => {
            bail!("token refresh failed ({status}): {}", token_error(response))
        }
        Err(err) => Err(err).context("refreshing credentials"),
    }
}

// The refresh grant usually omits the refresh token; the previous one stays
// valid and is carried over.
fn credentials_from(token: TokenResponse, previous_refresh: Option<&str>) -> StoredCredentials {
    let expiry = Utc::now() + chrono::Duration::seconds(token.expires_in);
    StoredCredentials {
        access_token: token.access_token,
        refresh_token: token
            .refresh_token
            .or_else(|| previous_refresh.map(|token| token.to_string()))
            .unwrap_or_default(),
        expiry: expiry.to_rfc3339(),
    }
}

fn token_error(response: ureq::Response) -> String {
    response
        .into_json::<TokenErrorResponse>()
        .map(|body| body.error)
        .unwrap_or_else(|_| "unreadable error body".to_string())
}

fn load_credentials(path: &Path) -> Option<StoredCredentials> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(credentials) => Some(credentials),
        Err(err) => {
            eprintln!(
                "  Warning: ignoring unreadable credential cache {}: {err}",
                path.display()
            );
            None
        }
    }
}

fn store_credentials(path: &Path, credentials: &StoredCredentials) {
    if let Err(err) = save_credentials(path, credentials) {
        eprintln!(
            "  Warning: could not save credentials to {}: {err:#}",
            path.display()
        );
    }
}

fn save_credentials(path: &Path, credentials: &StoredCredentials) -> Result<()> {
    let payload = serde_json::to_string_pretty(credentials).context("serializing credentials")?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload + "\n")
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
