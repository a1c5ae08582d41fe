//! Client configuration: builder and JSON persistence.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use byfs_proto::{AuthDigest, DEFAULT_PAGE_SIZE, ErrorPayload, MAX_PAGE_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default connect timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Stand-in printed in place of a configured secret.
pub const REDACTED: &str = "<redacted>";

/// Connection settings for a [`Client`](crate::Client).
///
/// Defaults: `127.0.0.1:8080`, 300 s connect timeout, no secret, MD5 auth
/// digest, error messages on every failure status, 100 names per page.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server host name or address.
    server: String,
    /// Server TCP port.
    port: u16,
    /// Connect (and handshake) timeout.
    #[serde(rename = "timeout_secs", with = "secs")]
    timeout: Duration,
    /// Shared secret answering the auth challenge.
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
    /// Digest used for the auth token.
    digest: AuthDigest,
    /// Whether failure statuses carry a message string.
    error_payload: ErrorPayload,
    /// Names requested per directory page.
    page_size: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".to_owned(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            secret: None,
            digest: AuthDigest::default(),
            error_payload: ErrorPayload::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("secret", &self.secret.as_ref().map(|_| REDACTED))
            .field("digest", &self.digest)
            .field("error_payload", &self.error_payload)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl Config {
    /// Starts a builder from the defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Loads and validates a JSON config file. Absent fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let err = |message: String| Error::Config {
            path: path.display().to_string(),
            message,
        };
        let data = fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
        let config: Self = serde_json::from_str(&data).map_err(|e| err(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Persists the config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| Error::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Copy with the secret, if any, replaced by [`REDACTED`]. For display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            secret: self.secret.as_ref().map(|_| REDACTED.to_owned()),
            ..self.clone()
        }
    }

    /// Returns a builder seeded with this config.
    pub fn to_builder(&self) -> ConfigBuilder {
        ConfigBuilder {
            inner: self.clone(),
        }
    }

    /// Server host.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Server port.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` for dialing and logging.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// Connect timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Shared secret, if configured.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// Auth digest.
    pub const fn digest(&self) -> AuthDigest {
        self.digest
    }

    /// Error payload convention.
    pub const fn error_payload(&self) -> ErrorPayload {
        self.error_payload
    }

    /// Directory page size.
    pub const fn page_size(&self) -> u16 {
        self.page_size
    }

    fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(Error::InvalidArgument("server must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidArgument("timeout must be positive".into()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(Error::InvalidArgument(format!(
                "page size {} outside 1..={MAX_PAGE_SIZE}",
                self.page_size
            )));
        }
        Ok(())
    }
}

/// Builder for [`Config`].
///
/// ```
/// use std::time::Duration;
///
/// let config = byfs::Config::builder()
///     .server("files.internal")
///     .port(9000)
///     .timeout(Duration::from_secs(5))
///     .secret("s3cret")
///     .build()
///     .expect("valid config");
/// assert_eq!(config.addr(), "files.internal:9000");
/// ```
#[derive(Debug, Default)]
#[must_use = "a ConfigBuilder does nothing until .build() is called"]
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    /// Sets the server host (default: `127.0.0.1`).
    pub fn server(mut self, host: impl Into<String>) -> Self {
        self.inner.server = host.into();
        self
    }

    /// Sets the server port (default: 8080).
    pub const fn port(mut self, port: u16) -> Self {
        self.inner.port = port;
        self
    }

    /// Sets the connect timeout (default: 300 s).
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = timeout;
        self
    }

    /// Sets the shared secret used when the server sends a challenge.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.inner.secret = Some(secret.into());
        self
    }

    /// Sets the auth digest (default: MD5).
    pub const fn digest(mut self, digest: AuthDigest) -> Self {
        self.inner.digest = digest;
        self
    }

    /// Sets whether failure statuses carry a message (default: always).
    pub const fn error_payload(mut self, payload: ErrorPayload) -> Self {
        self.inner.error_payload = payload;
        self
    }

    /// Sets the directory page size (default: 100, max 1000).
    pub const fn page_size(mut self, n: u16) -> Self {
        self.inner.page_size = n;
        self
    }

    /// Validates and returns the config.
    pub fn build(self) -> Result<Config> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

/// Serializes a [`Duration`] as whole seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
