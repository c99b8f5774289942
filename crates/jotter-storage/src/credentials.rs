//! AWS credential resolution for the S3 backend.
//!
//! Static keys from the environment win. Without them, credentials come from
//! the EC2 instance metadata service (IMDSv2) of the instance profile and are
//! cached until shortly before they expire.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use jotter_core::{Error, Result};

/// Instance metadata service address.
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";

const IMDS_TOKEN_PATH: &str = "/latest/api/token";
const IMDS_CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";
const IMDS_TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const IMDS_TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const IMDS_TOKEN_TTL_SECS: &str = "21600";
const IMDS_TIMEOUT: Duration = Duration::from_secs(2);

/// Instance credentials are refreshed this long before they expire.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// One set of AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

/// Where the S3 backend gets its credentials.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Fixed keys, usually from `AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY`.
    Static(AwsCredentials),
    /// Role credentials of the EC2 instance profile.
    InstanceProfile { endpoint: String },
}

impl From<AwsCredentials> for CredentialSource {
    fn from(credentials: AwsCredentials) -> Self {
        CredentialSource::Static(credentials)
    }
}

impl CredentialSource {
    /// Instance profile credentials from the default metadata endpoint.
    pub fn instance_profile() -> Self {
        CredentialSource::InstanceProfile {
            endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
        }
    }

    /// Resolve the source through a variable lookup.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `AWS_ACCESS_KEY_ID` + `AWS_SECRET_ACCESS_KEY` | static keys (`AWS_SESSION_TOKEN` optional) |
    /// | `AWS_EC2_METADATA_SERVICE_ENDPOINT` | metadata endpoint, default `http://169.254.169.254` |
    /// | `AWS_EC2_METADATA_DISABLED=true` | no instance profile fallback |
    ///
    /// Setting only one of the two keys is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        match (
            non_empty("AWS_ACCESS_KEY_ID"),
            non_empty("AWS_SECRET_ACCESS_KEY"),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => {
                Ok(CredentialSource::Static(AwsCredentials {
                    access_key_id,
                    secret_access_key,
                    session_token: non_empty("AWS_SESSION_TOKEN"),
                }))
            }
            (Some(_), None) => Err(Error::StorageConfig(
                "AWS_SECRET_ACCESS_KEY is not set".to_string(),
            )),
            (None, Some(_)) => Err(Error::StorageConfig(
                "AWS_ACCESS_KEY_ID is not set".to_string(),
            )),
            (None, None) => {
                let disabled = non_empty("AWS_EC2_METADATA_DISABLED")
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
                if disabled {
                    return Err(Error::StorageConfig(
                        "no AWS credentials: AWS_ACCESS_KEY_ID is not set and instance metadata is disabled"
                            .to_string(),
                    ));
                }
                Ok(CredentialSource::InstanceProfile {
                    endpoint: non_empty("AWS_EC2_METADATA_SERVICE_ENDPOINT")
                        .unwrap_or_else(|| DEFAULT_IMDS_ENDPOINT.to_string()),
                })
            }
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialSource::Static(_) => "static",
            CredentialSource::InstanceProfile { .. } => "instance_profile",
        }
    }
}

#[derive(Debug, Clone)]
struct CachedCredentials {
    credentials: AwsCredentials,
    expires_at: DateTime<Utc>,
}

impl CachedCredentials {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

/// Credentials document served by the metadata service.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceCredentials {
    code: Option<String>,
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expiration: DateTime<Utc>,
}

/// Hands out credentials for each signed request.
///
/// Clones share one cache, so a refresh is seen by every clone.
#[derive(Debug, Clone)]
pub struct CredentialsProvider {
    source: CredentialSource,
    client: reqwest::Client,
    cache: Arc<RwLock<Option<CachedCredentials>>>,
}

impl CredentialsProvider {
    pub fn new(source: CredentialSource, client: reqwest::Client) -> Self {
        Self {
            source,
            client,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Current credentials, fetching from the metadata service when needed.
    pub async fn credentials(&self) -> Result<AwsCredentials> {
        let endpoint = match &self.source {
            CredentialSource::Static(credentials) => return Ok(credentials.clone()),
            CredentialSource::InstanceProfile { endpoint } => endpoint,
        };

        {
            let cached = self.cache.read().await;
            if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh(Utc::now())) {
                return Ok(entry.credentials.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // another task may have refreshed while we waited for the lock
        if let Some(entry) = cache.as_ref().filter(|e| e.is_fresh(Utc::now())) {
            return Ok(entry.credentials.clone());
        }

        let fresh = fetch_instance_credentials(&self.client, endpoint).await?;
        let credentials = fresh.credentials.clone();
        *cache = Some(fresh);
        Ok(credentials)
    }
}

fn metadata_unreachable(e: reqwest::Error) -> Error {
    warn!(
        subsystem = "storage",
        component = "credentials",
        error = %e,
        "Instance metadata request failed"
    );
    Error::StorageUnavailable(format!("instance metadata service unreachable: {}", e))
}

async fn metadata_body(response: reqwest::Response, what: &str) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        let msg = format!("instance metadata {} request failed with status {}", what, status);
        return Err(if status.is_server_error() {
            Error::StorageUnavailable(msg)
        } else if status == StatusCode::NOT_FOUND && what == "role" {
            Error::StorageConfig("no IAM role is attached to this instance".to_string())
        } else {
            Error::StorageConfig(msg)
        });
    }
    response.text().await.map_err(metadata_unreachable)
}

async fn metadata_get(client: &reqwest::Client, url: &str, token: &str, what: &str) -> Result<String> {
    let response = client
        .get(url)
        .header(IMDS_TOKEN_HEADER, token)
        .timeout(IMDS_TIMEOUT)
        .send()
        .await
        .map_err(metadata_unreachable)?;
    metadata_body(response, what).await
}

/// IMDSv2: session token, role name, then the role's credentials.
async fn fetch_instance_credentials(
    client: &reqwest::Client,
    endpoint: &str,
) -> Result<CachedCredentials> {
    let base = endpoint.trim_end_matches('/');
    debug!(
        subsystem = "storage",
        component = "credentials",
        op = "refresh",
        endpoint = %base,
        "Fetching instance profile credentials"
    );

    let response = client
        .put(format!("{}{}", base, IMDS_TOKEN_PATH))
        .header(IMDS_TOKEN_TTL_HEADER, IMDS_TOKEN_TTL_SECS)
        .timeout(IMDS_TIMEOUT)
        .send()
        .await
        .map_err(metadata_unreachable)?;
    let token = metadata_body(response, "token").await?;

    let roles_url = format!("{}{}", base, IMDS_CREDENTIALS_PATH);
    let roles = metadata_get(client, &roles_url, token.trim(), "role").await?;
    let role = roles
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| Error::StorageConfig("no IAM role is attached to this instance".to_string()))?;

    let body = metadata_get(client, &format!("{}{}", roles_url, role), token.trim(), "credentials").await?;
    let document: InstanceCredentials = serde_json::from_str(&body).map_err(|e| {
        Error::StorageConfig(format!("unreadable instance credentials for role '{}': {}", role, e))
    })?;
    if let Some(code) = document.code.as_deref().filter(|c| *c != "Success") {
        return Err(Error::StorageConfig(format!(
            "instance credentials for role '{}' not available ({})",
            role, code
        )));
    }

    info!(
        subsystem = "storage",
        component = "credentials",
        op = "refresh",
        role = %role,
        expires_at = %document.expiration,
        "Instance profile credentials refreshed"
    );

    Ok(CachedCredentials {
        credentials: AwsCredentials {
            access_key_id: document.access_key_id,
            secret_access_key: document.secret_access_key,
            session_token: document.token,
        },
        expires_at: document.expiration,
    })
}
