//! Signer Configuration
//!
//! Settings are read from an optional JSON file and then overridden by
//! environment variables:
//! - `PSBT_SIGNER_NETWORK` (`mainnet`, `testnet`, `signet`, `regtest`)
//! - `PSBT_SIGNER_DEBUG` (`1`/`true` enables debug logs)
//! - `PSBT_SIGNER_REDACT_LOGS` (`0`/`false` disables address shortening)

use crate::error::{SignerError, SignerResult};
use crate::types::BtcNetwork;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_NETWORK: &str = "PSBT_SIGNER_NETWORK";
pub const ENV_DEBUG: &str = "PSBT_SIGNER_DEBUG";
pub const ENV_REDACT_LOGS: &str = "PSBT_SIGNER_REDACT_LOGS";

/// Hard ceiling for `max_inputs`
const INPUT_LIMIT_CEILING: usize = 10_000;

/// Signer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignerSettings {
    /// Network selected at startup
    pub network: BtcNetwork,
    /// Emit debug-level log lines
    pub debug: bool,
    /// Shorten addresses and hashes in logs
    pub redact_logs: bool,
    /// Largest PSBT (by input count) accepted for signing
    pub max_inputs: usize,
    /// Accounts created up front by the in-memory directory
    pub initial_accounts: u32,
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self {
            network: BtcNetwork::Mainnet,
            debug: false,
            redact_logs: true,
            max_inputs: 500,
            initial_accounts: 1,
        }
    }
}

impl SignerSettings {
    /// Load settings from a JSON file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> SignerResult<Self> {
        let mut settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    SignerError::invalid_request(format!(
                        "Cannot read config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_json(&raw)?
            }
            None => Self::default(),
        };

        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json(raw: &str) -> SignerResult<Self> {
        let settings: SignerSettings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> SignerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(network) = lookup(ENV_NETWORK) {
            self.network = network.parse()?;
        }
        if let Some(debug) = lookup(ENV_DEBUG) {
            self.debug = parse_flag(ENV_DEBUG, &debug)?;
        }
        if let Some(redact) = lookup(ENV_REDACT_LOGS) {
            self.redact_logs = parse_flag(ENV_REDACT_LOGS, &redact)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> SignerResult<()> {
        if self.max_inputs == 0 || self.max_inputs > INPUT_LIMIT_CEILING {
            return Err(SignerError::invalid_request(format!(
                "maxInputs must be between 1 and {}",
                INPUT_LIMIT_CEILING
            )));
        }
        if self.initial_accounts > 100 {
            return Err(SignerError::invalid_request(
                "initialAccounts must not exceed 100",
            ));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> SignerResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SignerError::invalid_request(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = SignerSettings::default();
        assert_eq!(settings.network, BtcNetwork::Mainnet);
        assert!(settings.redact_logs);
        assert!(!settings.debug);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = SignerSettings::from_json(r#"{"network":"testnet","maxInputs":20}"#).unwrap();
        assert_eq!(settings.network, BtcNetwork::Testnet);
        assert_eq!(settings.max_inputs, 20);
        assert!(settings.redact_logs);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [(ENV_NETWORK, "regtest"), (ENV_DEBUG, "1")].into_iter().collect();
        let mut settings = SignerSettings::default();
        settings
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.network, BtcNetwork::Regtest);
        assert!(settings.debug);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SignerSettings::from_json(r#"{"maxInputs":0}"#).is_err());
        assert!(SignerSettings::from_json(r#"{"network":"dogecoin"}"#).is_err());

        let mut settings = SignerSettings::default();
        let result = settings.apply_overrides(|k| (k == ENV_DEBUG).then(|| "maybe".to_string()));
        assert!(result.is_err());
    }
}
