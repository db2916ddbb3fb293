//! Client configuration as the host supplies it.
//!
//! ```json
//! {
//!   "base_url": "https://vpc.example.com/v1",
//!   "project_id": "0b1c2d",
//!   "request_timeout": "90s",
//!   "default_headers": { "x-language": "en-us" },
//!   "tls_roots": "native"
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratus_http::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT, TlsRootConfig,
    TransportConfig, TransportSecurity,
};

use crate::endpoint::Endpoint;
use crate::error::{CloudError, CloudResult};

/// Whether this build may talk plain HTTP: debug builds or the
/// `allow-insecure-http` feature, same as `TransportBuilder::allow_insecure_http`.
pub const INSECURE_HTTP_PERMITTED: bool =
    cfg!(any(debug_assertions, feature = "allow-insecure-http"));

/// Root certificate store used for TLS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsRoots {
    #[default]
    Webpki,
    Native,
}

impl From<TlsRoots> for TlsRootConfig {
    fn from(roots: TlsRoots) -> Self {
        match roots {
            TlsRoots::Webpki => Self::WebPki,
            TlsRoots::Native => Self::Native,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub base_url: String,
    pub project_id: Option<String>,
    /// Embed `project_id` as the first path segment of resource URLs.
    pub project_scoped: bool,
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    pub max_body_size: usize,
    pub user_agent: Option<String>,
    pub default_headers: BTreeMap<String, String>,
    pub max_concurrent_requests: Option<usize>,
    #[serde(with = "option_duration_serde")]
    pub pool_idle_timeout: Option<Duration>,
    pub pool_max_idle_per_host: usize,
    pub tls_roots: TlsRoots,
    pub allow_insecure_http: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            base_url: String::new(),
            project_id: None,
            project_scoped: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            user_agent: None,
            default_headers: BTreeMap::new(),
            max_concurrent_requests: transport.max_concurrent_requests,
            pool_idle_timeout: transport.pool_idle_timeout,
            pool_max_idle_per_host: transport.pool_max_idle_per_host,
            tls_roots: TlsRoots::default(),
            allow_insecure_http: false,
        }
    }
}

impl ClientConfig {
    /// Decode from the host's JSON configuration blob.
    ///
    /// # Errors
    /// `InvalidRequest` naming the offending setting.
    pub fn from_json_value(value: &Value) -> CloudResult<Self> {
        let config = Self::deserialize(value)
            .map_err(|e| CloudError::bad_options("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// `InvalidRequest` for an empty base URL, zero-sized limits, or
    /// `allow_insecure_http` in a build that does not permit it.
    pub fn validate(&self) -> CloudResult<()> {
        if self.base_url.trim().trim_end_matches('/').is_empty() {
            return Err(CloudError::missing_required("base_url"));
        }
        if self.allow_insecure_http && !INSECURE_HTTP_PERMITTED {
            return Err(CloudError::bad_options(
                "allow_insecure_http",
                "plain HTTP needs a debug build or the allow-insecure-http feature",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(CloudError::bad_options(
                "request_timeout",
                "must be greater than zero",
            ));
        }
        if self.max_body_size == 0 {
            return Err(CloudError::bad_options(
                "max_body_size",
                "must be greater than zero",
            ));
        }
        if self.max_concurrent_requests == Some(0) {
            return Err(CloudError::bad_options(
                "max_concurrent_requests",
                "use null for no limit",
            ));
        }
        Ok(())
    }

    /// # Errors
    /// `InvalidRequest` if the base URL is empty.
    pub fn endpoint(&self) -> CloudResult<Endpoint> {
        let endpoint = Endpoint::new(&self.base_url)?;
        Ok(match self.project_id.as_deref() {
            Some(project) if !project.is_empty() => endpoint
                .with_project(project)
                .embed_project(self.project_scoped),
            _ => endpoint,
        })
    }

    #[must_use]
    pub fn transport_config(&self) -> TransportConfig {
        let transport = if self.allow_insecure_http && INSECURE_HTTP_PERMITTED {
            tracing::warn!(
                base_url = %self.base_url,
                "allow_insecure_http is set - cloud API traffic will NOT be encrypted"
            );
            TransportSecurity::AllowInsecureHttp
        } else {
            TransportSecurity::TlsOnly
        };
        TransportConfig {
            request_timeout: self.request_timeout,
            max_body_size: self.max_body_size,
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
            default_headers: self
                .default_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            transport,
            tls_roots: self.tls_roots.into(),
            max_concurrent_requests: self.max_concurrent_requests,
            pool_idle_timeout: self.pool_idle_timeout,
            pool_max_idle_per_host: self.pool_max_idle_per_host,
            ..TransportConfig::default()
        }
    }
}

/// `Duration` as a humantime string such as `"60s"` or `"1m 30s"`.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.collect_str(&humantime::format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| humantime::parse_duration(&raw).map_err(de::Error::custom))
            .transpose()
    }
}
