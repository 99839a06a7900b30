use std::env;

use super::{GatewayConfig, Secret, TransportTarget};
use crate::core::error::{GatewayError, GatewayResult};

/// Overlay environment variables onto `base`.
///
/// Unset or blank variables leave the corresponding field untouched.
pub(super) fn load_from_env(mut config: GatewayConfig) -> GatewayResult<GatewayConfig> {
    if let Some(v) = var("CF_ACCOUNT_ID") {
        config.account_id = v;
    }
    if let Some(v) = var("CF_GATEWAY_ID") {
        config.gateway_id = v;
    }
    if let Some(v) = var("OPENAI_API_KEY") {
        config.api_key = Secret::non_empty(v);
    }
    if let Some(v) = var("CF_AIG_TOKEN") {
        config.auth_token = Secret::non_empty(v);
    }
    if let Some(v) = var("OPENAI_MODEL") {
        config.model = v;
    }
    if let Some(v) = var("OPENAI_VOICE") {
        config.voice = v;
    }
    if let Some(v) = var("AIG_PROVIDER") {
        config.provider = v;
    }
    if let Some(v) = var("AIG_HOST") {
        config.host = Some(v);
    }
    if let Some(v) = var("AIG_TLS") {
        config.tls = parse_bool("AIG_TLS", &v)?;
    }
    if let Some(v) = var("AIG_TARGET") {
        config.target = TransportTarget::parse(&v).ok_or_else(|| {
            GatewayError::Configuration(format!(
                "AIG_TARGET must be 'gateway' or 'direct', got '{v}'"
            ))
        })?;
    }
    if let Some(v) = var("AIG_GATEWAY_AUTH") {
        config.gateway_auth = parse_bool("AIG_GATEWAY_AUTH", &v)?;
    }
    if let Some(v) = var("AIG_INSECURE_SUBPROTOCOL") {
        config.insecure_subprotocol = parse_bool("AIG_INSECURE_SUBPROTOCOL", &v)?;
    }
    Ok(config)
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a boolean environment value (`true/false`, `1/0`, `yes/no`, `on/off`).
pub(super) fn parse_bool(name: &str, value: &str) -> GatewayResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(GatewayError::Configuration(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert!(parse_bool("X", v).unwrap());
        }
        for v in ["false", "0", "No", "off"] {
            assert!(!parse_bool("X", v).unwrap());
        }
        let err = parse_bool("AIG_TLS", "maybe").unwrap_err();
        assert!(err.to_string().contains("AIG_TLS"));
    }
}
