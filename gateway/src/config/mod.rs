//! Gateway configuration
//!
//! Single source of truth for endpoint composition and credential policy.
//! Configuration can come from environment variables (`.env` is loaded by the
//! binary before this module runs), a YAML file, or the persisted JSON record
//! written by [`ConfigStore`]. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading
//! - `store`: Persisted `{accountId, gatewayId, apiKey, authToken, model, voice}` record
//! - `secret`: Zeroizing credential wrapper
//!
//! # Example
//! ```rust,no_run
//! use aig_probe::config::GatewayConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env()?;
//! println!("HTTP endpoint: {}", config.derive_http_base_url()?);
//! println!("Subprotocols: {:?}", config.build_websocket_subprotocols().len());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;

use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};

mod env;
mod secret;
pub mod store;
mod yaml;

pub use secret::Secret;
pub use store::{ConfigStore, STORAGE_KEY, StoredConfig};

/// Cloudflare AI Gateway host.
pub const DEFAULT_GATEWAY_HOST: &str = "gateway.ai.cloudflare.com";

/// Provider host used by the direct (non-relayed) target.
pub const DIRECT_PROVIDER_HOST: &str = "api.openai.com";

/// Provider path segment appended after the gateway identifiers.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Chat model used when nothing else is configured.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Realtime voice used when nothing else is configured.
pub const DEFAULT_VOICE: &str = "alloy";

/// Header carrying the gateway-level credential over HTTP.
pub const GATEWAY_AUTH_HEADER: &str = "cf-aig-authorization";

/// Subprotocol token that always leads the WebSocket offer.
pub const REALTIME_SUBPROTOCOL: &str = "realtime";

/// Inline provider key accepted by the gateway's realtime endpoint.
pub const INSECURE_KEY_SUBPROTOCOL_PREFIX: &str = "insecure-api-key.";

/// Inline provider key accepted by the provider's own realtime endpoint.
pub const DIRECT_INSECURE_KEY_SUBPROTOCOL_PREFIX: &str = "openai-insecure-api-key.";

/// Gateway-level credential smuggled through the subprotocol list.
pub const GATEWAY_AUTH_SUBPROTOCOL_PREFIX: &str = "cf-aig-authorization.";

/// Where requests are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportTarget {
    /// Relayed through `/v1/<account>/<gateway>/<provider>` on the AI Gateway
    #[default]
    Gateway,
    /// Straight to the provider API, bypassing the gateway
    Direct,
}

impl TransportTarget {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Direct => "direct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gateway" | "aig" | "cloudflare" => Some(Self::Gateway),
            "direct" | "provider" | "openai" => Some(Self::Direct),
            _ => None,
        }
    }
}

impl fmt::Display for TransportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Endpoint identifiers and credentials for both transports.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Cloudflare account identifier (first path segment)
    pub account_id: String,
    /// AI Gateway identifier (second path segment)
    pub gateway_id: String,
    /// Upstream provider credential (BYOK)
    pub api_key: Option<Secret>,
    /// Gateway-level credential, required only when the gateway enforces auth
    pub auth_token: Option<Secret>,
    /// Upstream chat model; mutable between calls
    pub model: String,
    /// Realtime voice
    pub voice: String,
    /// Provider path segment
    pub provider: String,
    /// Host override; `None` selects the default host for `target`
    pub host: Option<String>,
    /// `https`/`wss` when true, `http`/`ws` otherwise
    pub tls: bool,
    /// Relayed or direct
    pub target: TransportTarget,
    /// Send the gateway-auth header over HTTP
    pub gateway_auth: bool,
    /// Expose the raw provider key in a WebSocket subprotocol
    pub insecure_subprotocol: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            gateway_id: String::new(),
            api_key: None,
            auth_token: None,
            model: DEFAULT_CHAT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            host: None,
            tls: true,
            target: TransportTarget::Gateway,
            gateway_auth: false,
            insecure_subprotocol: false,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables only.
    ///
    /// The binary loads `.env` before calling this, so `.env` values act as
    /// a base that real environment variables override.
    pub fn from_env() -> GatewayResult<Self> {
        Self::load(None, None)
    }

    /// Load configuration from a YAML file with environment variables as the base.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, if an environment
    /// variable has an invalid format, or if validation of the merged result fails.
    pub fn from_file(path: &Path) -> GatewayResult<Self> {
        Self::load(Some(path), None)
    }

    /// Merge every configuration source and validate the result.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. The persisted record
    /// 5. Default values
    pub fn load(path: Option<&Path>, stored: Option<&StoredConfig>) -> GatewayResult<Self> {
        let mut config = Self::default();
        if let Some(stored) = stored {
            stored.apply_to(&mut config);
        }
        let mut config = env::load_from_env(config)?;
        if let Some(path) = path {
            config = yaml::YamlConfig::from_file(path)?.apply(config);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that would otherwise fail later at call time.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.target == TransportTarget::Gateway {
            self.require_identifiers()?;
        }
        if self.model.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "model must not be empty".to_string(),
            ));
        }
        if self.gateway_auth && self.auth_token.is_none() {
            return Err(GatewayError::Configuration(
                "gateway_auth is enabled but no auth token is configured".to_string(),
            ));
        }
        if self.insecure_subprotocol && self.api_key.is_none() {
            return Err(GatewayError::Configuration(
                "insecure_subprotocol is enabled but no API key is configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Switch the upstream model for subsequent calls.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Host requests are sent to.
    pub fn effective_host(&self) -> &str {
        match (&self.host, self.target) {
            (Some(host), _) => host.as_str(),
            (None, TransportTarget::Gateway) => DEFAULT_GATEWAY_HOST,
            (None, TransportTarget::Direct) => DIRECT_PROVIDER_HOST,
        }
    }

    fn require_identifiers(&self) -> GatewayResult<()> {
        if self.account_id.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "account_id is required to derive a gateway URL".to_string(),
            ));
        }
        if self.gateway_id.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "gateway_id is required to derive a gateway URL".to_string(),
            ));
        }
        Ok(())
    }

    fn base_url(&self, scheme: &str) -> GatewayResult<Url> {
        let mut url = Url::parse(&format!("{scheme}://{}", self.effective_host()))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                GatewayError::Configuration(format!(
                    "host '{}' cannot carry a path",
                    self.effective_host()
                ))
            })?;
            segments.clear().push("v1");
            if self.target == TransportTarget::Gateway {
                segments
                    .push(&self.account_id)
                    .push(&self.gateway_id)
                    .push(&self.provider);
            }
        }
        Ok(url)
    }

    /// Base URL of the HTTP endpoint.
    ///
    /// Gateway target: `https://<host>/v1/<accountId>/<gatewayId>/<provider>`.
    /// Direct target: `https://api.openai.com/v1`.
    pub fn derive_http_base_url(&self) -> GatewayResult<Url> {
        if self.target == TransportTarget::Gateway {
            self.require_identifiers()?;
        }
        self.base_url(if self.tls { "https" } else { "http" })
    }

    /// Full chat completions URL.
    pub fn chat_completions_url(&self) -> GatewayResult<Url> {
        let mut url = self.derive_http_base_url()?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("chat").push("completions");
        }
        Ok(url)
    }

    /// URL of the realtime WebSocket endpoint, with an optional `model` query parameter.
    pub fn derive_websocket_base_url(&self, model: Option<&str>) -> GatewayResult<Url> {
        if self.target == TransportTarget::Gateway {
            self.require_identifiers()?;
        }
        let mut url = self.base_url(if self.tls { "wss" } else { "ws" })?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("realtime");
        }
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            url.query_pairs_mut().append_pair("model", model);
        }
        Ok(url)
    }

    /// Headers for the HTTP transport.
    ///
    /// `content-type` is always set. `authorization` carries the provider key
    /// when one is configured. The gateway-auth header is added only when an
    /// auth token is present AND gateway-level auth is enabled.
    pub fn build_http_headers(&self) -> GatewayResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            headers.insert(AUTHORIZATION, bearer(key)?);
        }

        if self.target == TransportTarget::Gateway && self.gateway_auth {
            if let Some(token) = self.auth_token.as_ref().filter(|t| !t.is_empty()) {
                headers.insert(HeaderName::from_static(GATEWAY_AUTH_HEADER), bearer(token)?);
            }
        }

        Ok(headers)
    }

    /// Ordered subprotocol offer for the WebSocket handshake.
    ///
    /// `realtime` first, then the inline provider key only when
    /// `insecure_subprotocol` is set, then the provider beta token, then the
    /// gateway token whenever one is configured. The gateway token alone is
    /// not accepted by the gateway's realtime endpoint; connecting without the
    /// inline key is expected to close with 4001.
    pub fn build_websocket_subprotocols(&self) -> Vec<String> {
        let mut protocols = vec![REALTIME_SUBPROTOCOL.to_string()];

        if self.insecure_subprotocol {
            if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
                let prefix = match self.target {
                    TransportTarget::Gateway => INSECURE_KEY_SUBPROTOCOL_PREFIX,
                    TransportTarget::Direct => DIRECT_INSECURE_KEY_SUBPROTOCOL_PREFIX,
                };
                protocols.push(format!("{prefix}{}", key.expose()));
            }
        }

        protocols.push(format!("{}-beta.realtime-v1", self.provider));

        if self.target == TransportTarget::Gateway {
            if let Some(token) = self.auth_token.as_ref().filter(|t| !t.is_empty()) {
                protocols.push(format!("{GATEWAY_AUTH_SUBPROTOCOL_PREFIX}{}", token.expose()));
            }
        }

        protocols
    }
}

fn bearer(secret: &Secret) -> GatewayResult<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", secret.expose())).map_err(|_| {
        GatewayError::Configuration("credential contains characters not valid in a header".to_string())
    })?;
    value.set_sensitive(true);
    Ok(value)
}
