//! Shared types for the signer
//!
//! All data structures that cross module boundaries are defined here
//! for consistent serialization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Network Types
// =============================================================================

/// Supported Bitcoin networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    #[default]
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl BtcNetwork {
    pub fn to_bitcoin(&self) -> bitcoin::Network {
        match self {
            BtcNetwork::Mainnet => bitcoin::Network::Bitcoin,
            BtcNetwork::Testnet => bitcoin::Network::Testnet,
            BtcNetwork::Signet => bitcoin::Network::Signet,
            BtcNetwork::Regtest => bitcoin::Network::Regtest,
        }
    }

    pub fn is_testnet(&self) -> bool {
        !matches!(self, BtcNetwork::Mainnet)
    }

    /// SLIP-0044 coin type used in derivation paths on this network
    pub fn coin_type(&self) -> u32 {
        if self.is_testnet() { 1 } else { 0 }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BtcNetwork::Mainnet => "mainnet",
            BtcNetwork::Testnet => "testnet",
            BtcNetwork::Signet => "signet",
            BtcNetwork::Regtest => "regtest",
        }
    }
}

impl fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BtcNetwork {
    type Err = crate::error::SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(BtcNetwork::Mainnet),
            "testnet" | "test" => Ok(BtcNetwork::Testnet),
            "signet" => Ok(BtcNetwork::Signet),
            "regtest" => Ok(BtcNetwork::Regtest),
            other => Err(crate::error::SignerError::invalid_request(format!(
                "Unknown network: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Account Types
// =============================================================================

/// A signing account: an address plus the path its key is derived at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    /// Path segments, e.g. `["m", "84'", "0'", "0'", "0", "0"]`
    pub derivation_path: Vec<String>,
}

impl Account {
    pub fn new(address: impl Into<String>, derivation_path: Vec<String>) -> Self {
        Self {
            address: address.into(),
            derivation_path,
        }
    }

    /// Path rendered as `m/84'/0'/0'/0/0`
    pub fn path_string(&self) -> String {
        self.derivation_path.join("/")
    }
}

// =============================================================================
// Signing Results
// =============================================================================

/// A fully signed, broadcastable transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedTransaction {
    pub tx_id: String,
    pub tx_hex: String,
}

/// Result of signing a plain message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    pub address: String,
    pub message: String,
    /// Base64 compact recoverable signature
    pub signature: String,
}

/// Result of signing a Lightning invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedInvoice {
    pub invoice: String,
}

// =============================================================================
// API Response
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<crate::error::SignerError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: crate::error::SignerError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

impl<T> From<crate::error::SignerResult<T>> for ApiResponse<T> {
    fn from(result: crate::error::SignerResult<T>) -> Self {
        match result {
            Ok(data) => ApiResponse::ok(data),
            Err(e) => ApiResponse::err(e),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":{"code":"internal","message":"Internal error"}}"#.to_string()
        })
    }
}
