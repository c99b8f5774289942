//! AWS S3 object storage backend.
//!
//! Talks to the S3 REST API directly: one signed `PUT Object` per upload.
//! With no custom endpoint the bucket is addressed virtual-host style on
//! AWS; with `S3_ENDPOINT` set (MinIO, LocalStack, R2) it is addressed
//! path style.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use reqwest::{StatusCode, Url};
use tracing::{debug, info, warn};

use jotter_core::{Error, Result};

use crate::credentials::{CredentialSource, CredentialsProvider};
use crate::sigv4::{self, SigningParams};
use crate::ObjectStore;

/// Region used when `AWS_REGION` is not set.
pub const DEFAULT_REGION: &str = "us-east-1";

/// S3 backend configuration.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services, e.g. `http://localhost:9000`.
    pub endpoint: Option<String>,
    /// Base for returned URLs, e.g. a CDN in front of the bucket.
    pub public_base_url: Option<String>,
    pub credentials: CredentialSource,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>, credentials: impl Into<CredentialSource>) -> Self {
        Self {
            bucket: bucket.into(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            public_base_url: None,
            credentials: credentials.into(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// Build the configuration from variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3_BUCKET` | required |
    /// | `AWS_REGION` | `us-east-1` |
    /// | `S3_ENDPOINT` | AWS |
    /// | `S3_PUBLIC_BASE_URL` | derived from bucket/endpoint |
    ///
    /// Credentials resolve through [`CredentialSource::from_lookup`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bucket = non_empty("S3_BUCKET")
            .ok_or_else(|| Error::StorageConfig("S3_BUCKET is not set".to_string()))?;

        Ok(Self {
            bucket,
            region: non_empty("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint: non_empty("S3_ENDPOINT"),
            public_base_url: non_empty("S3_PUBLIC_BASE_URL"),
            credentials: CredentialSource::from_lookup(&lookup)?,
        })
    }

    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

/// S3 object store. Cheap to share: the inner HTTP client pools connections.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: reqwest::Client,
    config: S3Config,
    credentials: CredentialsProvider,
    /// Scheme + authority the bucket is addressed through.
    base: Url,
    /// `Host` header value (includes a non-default port).
    host: String,
    /// Path prefix before the key: `/{bucket}` for path style, empty otherwise.
    path_prefix: String,
}

impl S3ObjectStore {
    /// Create the store, validating the configuration.
    ///
    /// Errors here are configuration errors and should abort startup.
    pub fn new(config: S3Config) -> Result<Self> {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create the store with a caller-supplied HTTP client.
    pub fn with_client(config: S3Config, client: reqwest::Client) -> Result<Self> {
        if config.bucket.trim().is_empty() {
            return Err(Error::StorageConfig("bucket name is empty".to_string()));
        }
        if config.region.trim().is_empty() {
            return Err(Error::StorageConfig("region is empty".to_string()));
        }

        let (base, path_prefix) = match &config.endpoint {
            Some(endpoint) => {
                let url = Url::parse(endpoint.trim_end_matches('/')).map_err(|e| {
                    Error::StorageConfig(format!("invalid S3 endpoint '{}': {}", endpoint, e))
                })?;
                (url, format!("/{}", sigv4::encode_key(&config.bucket)))
            }
            None => {
                let raw = format!(
                    "https://{}.s3.{}.amazonaws.com",
                    config.bucket, config.region
                );
                let url = Url::parse(&raw).map_err(|e| {
                    Error::StorageConfig(format!("invalid bucket '{}': {}", config.bucket, e))
                })?;
                (url, String::new())
            }
        };

        let host = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(Error::StorageConfig(format!(
                    "S3 endpoint '{}' has no host",
                    base
                )))
            }
        };

        info!(
            subsystem = "storage",
            component = "s3",
            bucket = %config.bucket,
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("(aws)"),
            credentials = config.credentials.kind(),
            "S3 client initialized"
        );

        let credentials = CredentialsProvider::new(config.credentials.clone(), client.clone());
        Ok(Self {
            client,
            config,
            credentials,
            base,
            host,
            path_prefix,
        })
    }

    fn canonical_uri(&self, key: &str) -> String {
        format!("{}/{}", self.path_prefix, sigv4::encode_key(key))
    }

    /// URL the object is uploaded to.
    fn object_url(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.base.as_str().trim_end_matches('/'),
            self.canonical_uri(key)
        )
    }

    /// Public URL recorded on the note.
    pub fn public_url(&self, key: &str) -> String {
        let encoded = sigv4::encode_key(key);
        if let Some(base) = &self.config.public_base_url {
            return format!("{}/{}", base.trim_end_matches('/'), encoded);
        }
        if self.config.endpoint.is_some() {
            return self.object_url(key);
        }
        format!("https://{}.s3.amazonaws.com/{}", self.config.bucket, encoded)
    }
}

/// Pull `<Code>...</Code>` out of an S3 error document.
fn s3_error_code(body: &str) -> Option<&str> {
    let start = body.find("<Code>")? + "<Code>".len();
    let end = body[start..].find("</Code>")? + start;
    Some(&body[start..end])
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        let start = Instant::now();
        let canonical_uri = self.canonical_uri(key);
        let payload_hash = sigv4::hash_payload(data);
        let credentials = self.credentials.credentials().await?;

        let params = SigningParams {
            access_key_id: &credentials.access_key_id,
            secret_access_key: &credentials.secret_access_key,
            region: &self.config.region,
            service: "s3",
            time: Utc::now(),
        };

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        headers.insert("host".to_string(), self.host.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert("x-amz-date".to_string(), params.amz_date());
        if let Some(token) = &credentials.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let authorization =
            sigv4::authorization_header(&params, "PUT", &canonical_uri, "", &headers, &payload_hash);

        // reqwest derives Host from the URL, which matches the signed value
        let mut request = self
            .client
            .put(self.object_url(key))
            .header(AUTHORIZATION, authorization)
            .body(data.to_vec());
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(
            subsystem = "storage",
            component = "s3",
            op = "put_object",
            storage_key = %key,
            size_bytes = data.len(),
            "Uploading object"
        );

        let response = request.send().await.map_err(|e| {
            warn!(subsystem = "storage", component = "s3", storage_key = %key, error = %e, "S3 request failed");
            Error::StorageUnavailable(format!("S3 request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let code = s3_error_code(&body).unwrap_or("unknown").to_string();
            warn!(
                subsystem = "storage",
                component = "s3",
                storage_key = %key,
                status = status.as_u16(),
                s3_code = %code,
                "S3 PutObject rejected"
            );
            let msg = format!("S3 PutObject failed with status {} ({})", status, code);
            return Err(match status {
                StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Error::StorageConfig(msg),
                _ => Error::StorageUnavailable(msg),
            });
        }

        info!(
            subsystem = "storage",
            component = "s3",
            op = "put_object",
            storage_key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Object uploaded"
        );
        Ok(self.public_url(key))
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AwsCredentials;
    use std::collections::HashMap;

    fn creds() -> AwsCredentials {
        AwsCredentials::new("AKIDEXAMPLE", "secret")
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_public_url_matches_aws_virtual_host_style() {
        let store = S3ObjectStore::new(S3Config::new("notes-bucket", creds())).unwrap();
        assert_eq!(
            store.public_url("abc_file.txt"),
            "https://notes-bucket.s3.amazonaws.com/abc_file.txt"
        );
        assert_eq!(
            store.object_url("abc_file.txt"),
            "https://notes-bucket.s3.us-east-1.amazonaws.com/abc_file.txt"
        );
        assert_eq!(store.host, "notes-bucket.s3.us-east-1.amazonaws.com");
    }

    #[test]
    fn test_custom_endpoint_uses_path_style() {
        let config = S3Config::new("notes", creds()).with_endpoint("http://localhost:9000/");
        let store = S3ObjectStore::new(config).unwrap();
        assert_eq!(store.host, "localhost:9000");
        assert_eq!(store.canonical_uri("k.txt"), "/notes/k.txt");
        assert_eq!(
            store.public_url("k.txt"),
            "http://localhost:9000/notes/k.txt"
        );
    }

    #[test]
    fn test_public_base_url_override() {
        let config = S3Config::new("notes", creds())
            .with_region("eu-central-1")
            .with_public_base_url("https://cdn.example.com/files/");
        let store = S3ObjectStore::new(config).unwrap();
        assert_eq!(
            store.public_url("k.txt"),
            "https://cdn.example.com/files/k.txt"
        );
        assert_eq!(store.host, "notes.s3.eu-central-1.amazonaws.com");
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let err = S3ObjectStore::new(S3Config::new("  ", creds())).unwrap_err();
        assert!(matches!(err, Error::StorageConfig(_)));

        let err = S3ObjectStore::new(S3Config::new("b", creds()).with_endpoint("not a url"))
            .unwrap_err();
        assert!(matches!(err, Error::StorageConfig(_)));

        let err = S3ObjectStore::new(S3Config::new("b", creds()).with_region("")).unwrap_err();
        assert!(matches!(err, Error::StorageConfig(_)));
    }

    #[test]
    fn test_config_from_lookup() {
        let config = S3Config::from_lookup(lookup_from(&[
            ("S3_BUCKET", "my-notes"),
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "SECRET"),
            ("AWS_SESSION_TOKEN", "TOKEN"),
        ]))
        .unwrap();

        assert_eq!(config.bucket, "my-notes");
        assert_eq!(config.region, DEFAULT_REGION);
        assert!(config.endpoint.is_none());
        assert!(matches!(
            config.credentials,
            CredentialSource::Static(ref c) if c.session_token.as_deref() == Some("TOKEN")
        ));
    }

    #[test]
    fn test_config_without_keys_uses_instance_profile() {
        let config = S3Config::from_lookup(lookup_from(&[("S3_BUCKET", "my-notes")])).unwrap();
        assert_eq!(config.credentials.kind(), "instance_profile");
        assert!(S3ObjectStore::new(config).is_ok());
    }

    #[test]
    fn test_config_from_lookup_missing_values() {
        let err = S3Config::from_lookup(lookup_from(&[
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "SECRET"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("S3_BUCKET"));

        let err = S3Config::from_lookup(lookup_from(&[
            ("S3_BUCKET", "b"),
            ("AWS_ACCESS_KEY_ID", "AKID"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::StorageConfig(ref m) if m.contains("AWS_SECRET_ACCESS_KEY")));
    }

    #[test]
    fn test_s3_error_code() {
        let body = "<?xml version=\"1.0\"?><Error><Code>NoSuchBucket</Code><Message>x</Message></Error>";
        assert_eq!(s3_error_code(body), Some("NoSuchBucket"));
        assert_eq!(s3_error_code("plain text"), None);
    }
}
