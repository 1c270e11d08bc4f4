//! Service-account credentials for the spreadsheet API.
//!
//! Credentials are resolved once at startup. The first source that exists
//! wins, in this order:
//!
//! 1. inline JSON (`sheets.credentials_json`)
//! 2. key file (`sheets.credentials_file`)
//! 3. `GOOGLE_APPLICATION_CREDENTIALS`
//! 4. [`FALLBACK_KEY_PATHS`]
//!
//! Access tokens come from the OAuth2 JWT-bearer grant and are cached until
//! shortly before they expire.

use crate::config::SheetsConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Searched after the configured sources
pub const FALLBACK_KEY_PATHS: &[&str] = &[
    "config/service-account.json",
    "/etc/admissions/service-account.json",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens are refreshed this long before their stated expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The fields of a service-account key file that token exchange needs
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// Where a key was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Inline,
    File(PathBuf),
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Inline => f.write_str("inline JSON"),
            CredentialSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Resolve credentials using the process environment and default search path
pub fn resolve_service_account(
    config: &SheetsConfig,
) -> Result<Option<(ServiceAccountKey, CredentialSource)>> {
    let env_path = std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok();
    resolve_service_account_from(config, env_path.as_deref(), FALLBACK_KEY_PATHS)
}

/// Resolve credentials from explicit inputs.
///
/// `Ok(None)` means no source exists. A source that exists but cannot be
/// parsed is an error.
pub fn resolve_service_account_from(
    config: &SheetsConfig,
    env_path: Option<&str>,
    fallback_paths: &[&str],
) -> Result<Option<(ServiceAccountKey, CredentialSource)>> {
    if let Some(ref inline) = config.credentials_json {
        let key = serde_json::from_str(inline)
            .context("Failed to parse inline service-account credentials")?;
        return Ok(Some((key, CredentialSource::Inline)));
    }

    let candidates = config
        .credentials_file
        .iter()
        .map(String::as_str)
        .chain(env_path)
        .chain(fallback_paths.iter().copied())
        .map(PathBuf::from);

    for path in candidates {
        if !path.is_file() {
            debug!(path = %path.display(), "No service-account key at path");
            continue;
        }
        let key = read_key_file(&path)?;
        return Ok(Some((key, CredentialSource::File(path))));
    }

    Ok(None)
}

fn read_key_file(path: &Path) -> Result<ServiceAccountKey> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read service-account key {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse service-account key {}", path.display()))
}

/// Supplies bearer tokens for the spreadsheet API
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed, pre-issued token
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Exchanges a signed service-account assertion for access tokens
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scope: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey, scope: &str, http: reqwest::Client) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("Service-account private key is not a valid RSA PEM")?;

        info!(client_email = %key.client_email, "Service-account token source initialized");

        Ok(Self {
            key,
            encoding_key,
            scope: scope.to_string(),
            http,
            cached: Mutex::new(None),
        })
    }

    fn sign_assertion(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .context("Failed to sign service-account assertion")
    }

    async fn exchange(&self) -> Result<TokenResponse> {
        let assertion = self.sign_assertion()?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("Failed to reach token endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("Token endpoint returned {status}: {detail}");
        }

        response
            .json()
            .await
            .context("Failed to parse token response")
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(ref token) = *cached {
            if Instant::now() < token.refresh_at {
                return Ok(token.token.clone());
            }
        }

        let response = self.exchange().await?;
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(EXPIRY_MARGIN);
        debug!(expires_in = response.expires_in, "Obtained spreadsheet access token");

        *cached = Some(CachedToken {
            token: response.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(response.access_token)
    }
}

/// Log-and-continue wrapper used at startup
pub fn resolve_or_warn(config: &SheetsConfig) -> Option<(ServiceAccountKey, CredentialSource)> {
    match resolve_service_account(config) {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Ignoring unusable service-account credentials");
            None
        }
    }
}
