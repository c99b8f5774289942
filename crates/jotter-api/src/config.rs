//! Server configuration from environment variables.
//!
//! `main` calls `dotenvy::dotenv()` first, so a `.env` file works too. All
//! parsing goes through a lookup function so it can be tested without
//! touching the process environment.

use std::fmt;
use std::path::PathBuf;

use jotter_core::{Error, Result};
use jotter_storage::S3Config;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/jotter";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_FILE_STORAGE_PATH: &str = "./data/files";
pub const DEFAULT_FILE_PUBLIC_BASE_URL: &str = "http://localhost:8080/files";
/// Cognito puts the login name here.
pub const DEFAULT_DISPLAY_NAME_CLAIM: &str = "cognito:username";

/// Where attachments go.
#[derive(Debug, Clone)]
pub enum StorageSettings {
    S3(S3Config),
    Filesystem {
        path: PathBuf,
        public_base_url: String,
    },
}

impl StorageSettings {
    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageSettings::S3(_) => "s3",
            StorageSettings::Filesystem { .. } => "filesystem",
        }
    }
}

/// Source of token verification keys.
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    /// OIDC JWKS endpoint (asymmetric algorithms).
    Jwks(String),
    /// HS256 shared secret.
    Secret(String),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Jwks(url) => f.debug_tuple("Jwks").field(url).finish(),
            KeySource::Secret(_) => f.debug_tuple("Secret").field(&"[REDACTED]").finish(),
        }
    }
}

/// Bearer token validation settings.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub keys: KeySource,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub display_name_claim: String,
}

/// CORS origin policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if origins.iter().any(|o| o == "*") {
            return AllowedOrigins::Any;
        }
        if origins.is_empty() {
            return AllowedOrigins::List(vec![DEFAULT_ALLOWED_ORIGINS.to_string()]);
        }
        AllowedOrigins::List(origins)
    }
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub allowed_origins: AllowedOrigins,
    pub max_upload_bytes: usize,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
}

fn parse_number<T: std::str::FromStr>(name: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", name, raw))),
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let storage = match var("STORAGE_BACKEND")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("s3") => StorageSettings::S3(S3Config::from_lookup(&var)?),
            Some("filesystem") | Some("fs") => StorageSettings::Filesystem {
                path: PathBuf::from(
                    var("FILE_STORAGE_PATH").unwrap_or_else(|| DEFAULT_FILE_STORAGE_PATH.into()),
                ),
                public_base_url: var("FILE_PUBLIC_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_FILE_PUBLIC_BASE_URL.into()),
            },
            Some(other) => {
                return Err(Error::StorageConfig(format!(
                    "STORAGE_BACKEND must be 's3' or 'filesystem', got '{}'",
                    other
                )))
            }
        };

        let keys = match (var("AUTH_JWKS_URL"), var("AUTH_JWT_SECRET")) {
            (Some(url), _) => KeySource::Jwks(url),
            (None, Some(secret)) => KeySource::Secret(secret),
            (None, None) => {
                return Err(Error::Config(
                    "one of AUTH_JWKS_URL or AUTH_JWT_SECRET must be set".to_string(),
                ))
            }
        };

        let auth = AuthSettings {
            keys,
            issuer: var("AUTH_ISSUER"),
            audience: var("AUTH_AUDIENCE"),
            display_name_claim: var("AUTH_DISPLAY_NAME_CLAIM")
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME_CLAIM.into()),
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| DEFAULT_HOST.into()),
            port: parse_number("PORT", var("PORT"), DEFAULT_PORT)?,
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            database_max_connections: parse_number(
                "DATABASE_MAX_CONNECTIONS",
                var("DATABASE_MAX_CONNECTIONS"),
                DEFAULT_MAX_CONNECTIONS,
            )?,
            allowed_origins: AllowedOrigins::parse(
                &var("ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.into()),
            ),
            max_upload_bytes: parse_number(
                "MAX_UPLOAD_BYTES",
                var("MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            storage,
            auth,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
