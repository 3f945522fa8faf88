/// Remote sync client for the Firebase Realtime Database.
///
/// Mirrors the latest readings and predicted levels to a fixed location in
/// the database over the REST API, where the dashboard picks them up. Each
/// write replaces the fields it carries; nothing is appended or versioned.
///
/// Authentication happens once at construction from a credential file:
/// - a Google service account key is exchanged for an OAuth2 access token
///   (refreshed shortly before it expires), or
/// - a legacy database secret is passed through as `auth=`.

use chrono::{NaiveDate, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::{SiteConfig, SyncConfig};
use crate::logging::{self, Component};
use crate::model::{FloodError, Predictions, SensorFrame, SyncRecord};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DATABASE_SCOPES: &str =
    "https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/firebase.database";

/// Refresh the access token when it has less than this long left.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Sink abstraction
// ---------------------------------------------------------------------------

/// Destination for the per-iteration record.
pub trait RecordSink {
    /// Builds the record for this iteration and writes it. `date` is the
    /// same date the predictions were made for.
    fn update(
        &mut self,
        date: NaiveDate,
        frame: &SensorFrame,
        predictions: &Predictions,
    ) -> Result<(), FloodError>;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Contents of the credential file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
    DatabaseSecret {
        database_secret: String,
    },
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self, FloodError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            FloodError::Sync(format!("failed to read credentials {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, FloodError> {
        serde_json::from_str(contents).map_err(|e| {
            FloodError::Sync(format!(
                "credential file is neither a service account key nor a database secret: {}",
                e
            ))
        })
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

enum Auth {
    Secret(String),
    OAuth {
        client_email: String,
        private_key: String,
        token_uri: String,
        token: AccessToken,
    },
}

/// Signs a service-account assertion and trades it for an access token.
fn fetch_access_token(
    http: &reqwest::blocking::Client,
    client_email: &str,
    private_key: &str,
    token_uri: &str,
) -> Result<AccessToken, FloodError> {
    let now = Utc::now().timestamp();
    let claims = AssertionClaims {
        iss: client_email,
        scope: DATABASE_SCOPES,
        aud: token_uri,
        iat: now,
        exp: now + 3600,
    };

    let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
        .map_err(|e| FloodError::Sync(format!("invalid service account private key: {}", e)))?;
    let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| FloodError::Sync(format!("failed to sign token request: {}", e)))?;

    let response = http
        .post(token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .map_err(|e| FloodError::Sync(format!("token request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(FloodError::Sync(format!(
            "token endpoint returned HTTP {}: {}",
            status.as_u16(),
            body
        )));
    }

    let token: TokenResponse = response
        .json()
        .map_err(|e| FloodError::Sync(format!("unreadable token response: {}", e)))?;

    Ok(AccessToken {
        value: token.access_token,
        expires_at: Instant::now() + Duration::from_secs(token.expires_in),
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// REST location of `path` under the database at `base_url`.
pub fn record_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_matches('/');
    if path.is_empty() {
        format!("{}/.json", base)
    } else {
        format!("{}/{}.json", base, path)
    }
}

/// Handle to the realtime database, authenticated for the process lifetime.
pub struct FirebaseClient {
    http: reqwest::blocking::Client,
    url: String,
    auth: Auth,
    sites: Vec<SiteConfig>,
}

impl FirebaseClient {
    /// Reads the credential file and authenticates.
    pub fn connect(config: &SyncConfig, sites: &[SiteConfig]) -> Result<Self, FloodError> {
        let credentials = Credentials::load(Path::new(&config.credentials))?;
        Self::with_credentials(credentials, &config.database_url, &config.path, sites)
    }

    pub fn with_credentials(
        credentials: Credentials,
        database_url: &str,
        path: &str,
        sites: &[SiteConfig],
    ) -> Result<Self, FloodError> {
        let http = reqwest::blocking::Client::new();

        let auth = match credentials {
            Credentials::DatabaseSecret { database_secret } => Auth::Secret(database_secret),
            Credentials::ServiceAccount { client_email, private_key, token_uri } => {
                let token_uri = token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
                let token = fetch_access_token(&http, &client_email, &private_key, &token_uri)?;
                logging::info(
                    Component::Sync,
                    &format!("Authenticated to Firebase as {}", client_email),
                );
                Auth::OAuth { client_email, private_key, token_uri, token }
            }
        };

        Ok(Self {
            http,
            url: record_url(database_url, path),
            auth,
            sites: sites.to_vec(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Query parameter carrying the credential, refreshing an expiring token first.
    fn auth_param(&mut self) -> Result<(&'static str, String), FloodError> {
        match &mut self.auth {
            Auth::Secret(secret) => Ok(("auth", secret.clone())),
            Auth::OAuth { client_email, private_key, token_uri, token } => {
                if token.expires_at.saturating_duration_since(Instant::now()) < TOKEN_REFRESH_MARGIN {
                    logging::debug(Component::Sync, "Refreshing Firebase access token");
                    *token = fetch_access_token(&self.http, client_email, private_key, token_uri)?;
                }
                Ok(("access_token", token.value.clone()))
            }
        }
    }

    /// Overwrites the record's fields at the configured location.
    pub fn write(&mut self, record: &SyncRecord) -> Result<(), FloodError> {
        let (param, credential) = self.auth_param()?;

        let response = self
            .http
            .patch(&self.url)
            .query(&[(param, credential.as_str())])
            .json(record)
            .send()
            .map_err(|e| FloodError::Sync(format!("write to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FloodError::Sync(format!(
                "database returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        logging::info(Component::Sync, "Data updated to Firebase");
        Ok(())
    }
}

impl RecordSink for FirebaseClient {
    fn update(
        &mut self,
        date: NaiveDate,
        frame: &SensorFrame,
        predictions: &Predictions,
    ) -> Result<(), FloodError> {
        let record = SyncRecord::build(date, &self.sites, frame, predictions);
        self.write(&record)
    }
}
