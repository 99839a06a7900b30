use serde::Deserialize;
use std::path::Path;

use super::{GatewayConfig, Secret, TransportTarget};
use crate::core::error::{GatewayError, GatewayResult};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration; anything left out
/// keeps the value coming from the environment.
///
/// # Example YAML structure
/// ```yaml
/// gateway:
///   account_id: "0123456789abcdef"
///   gateway_id: "my-gateway"
///   provider: "openai"
///   host: "gateway.ai.cloudflare.com"
///   tls: true
///   target: "gateway"
///
/// credentials:
///   api_key: "sk-..."
///   auth_token: "cf-aig-token"
///
/// auth:
///   gateway_auth: true
///   insecure_subprotocol: false
///
/// model:
///   name: "gpt-4o-mini"
///   voice: "alloy"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub gateway: Option<GatewayYaml>,
    pub credentials: Option<CredentialsYaml>,
    pub auth: Option<AuthYaml>,
    pub model: Option<ModelYaml>,
}

/// Endpoint identifiers from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GatewayYaml {
    pub account_id: Option<String>,
    pub gateway_id: Option<String>,
    pub provider: Option<String>,
    pub host: Option<String>,
    pub tls: Option<bool>,
    pub target: Option<TransportTarget>,
}

/// Credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsYaml {
    pub api_key: Option<String>,
    pub auth_token: Option<String>,
}

/// Authentication policy from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub gateway_auth: Option<bool>,
    pub insecure_subprotocol: Option<bool>,
}

/// Model selection from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ModelYaml {
    pub name: Option<String>,
    pub voice: Option<String>,
}

impl YamlConfig {
    pub fn from_file(path: &Path) -> GatewayResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| GatewayError::Configuration(format!("Failed to parse YAML: {e}")))
    }

    /// Apply the values present in this file on top of `config`.
    pub fn apply(self, mut config: GatewayConfig) -> GatewayConfig {
        if let Some(gateway) = self.gateway {
            if let Some(v) = gateway.account_id {
                config.account_id = v;
            }
            if let Some(v) = gateway.gateway_id {
                config.gateway_id = v;
            }
            if let Some(v) = gateway.provider {
                config.provider = v;
            }
            if let Some(v) = gateway.host {
                config.host = Some(v);
            }
            if let Some(v) = gateway.tls {
                config.tls = v;
            }
            if let Some(v) = gateway.target {
                config.target = v;
            }
        }

        if let Some(credentials) = self.credentials {
            if let Some(v) = credentials.api_key {
                config.api_key = Secret::non_empty(v);
            }
            if let Some(v) = credentials.auth_token {
                config.auth_token = Secret::non_empty(v);
            }
        }

        if let Some(auth) = self.auth {
            if let Some(v) = auth.gateway_auth {
                config.gateway_auth = v;
            }
            if let Some(v) = auth.insecure_subprotocol {
                config.insecure_subprotocol = v;
            }
        }

        if let Some(model) = self.model {
            if let Some(v) = model.name {
                config.model = v;
            }
            if let Some(v) = model.voice {
                config.voice = v;
            }
        }

        config
    }
}
