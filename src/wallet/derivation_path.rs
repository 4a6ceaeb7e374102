//! Account Derivation Paths
//!
//! Parses and checks BIP-44 style paths (`m / purpose' / coin' / account' /
//! change / index`). Only full five-level paths are supported, the first
//! three levels must be hardened, and the coin type must match the network.

use bitcoin::bip32::{self, ChildNumber};
use std::fmt;
use std::str::FromStr;

use crate::types::BtcNetwork;

/// Standard BIP purposes
pub mod bip_purposes {
    pub const BIP44: u32 = 44; // Legacy (P2PKH)
    pub const BIP49: u32 = 49; // SegWit compatible (P2SH-P2WPKH)
    pub const BIP84: u32 = 84; // Native SegWit (P2WPKH)
    pub const BIP86: u32 = 86; // Taproot (P2TR)
}

/// Hardened offset for BIP-32 derivation
pub const HARDENED: u32 = 0x80000000;

/// Number of levels below the master key
pub const ACCOUNT_PATH_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Unsupported path depth {0}, expected {ACCOUNT_PATH_DEPTH}")]
    UnsupportedDepth(usize),

    #[error("The {0} level must be hardened")]
    UnhardenedLevel(&'static str),

    #[error("Coin type {found} does not match network (expected {expected})")]
    CoinTypeMismatch { expected: u32, found: u32 },

    #[error("Invalid root secret: {0}")]
    InvalidRootSecret(String),

    #[error("Key derivation failed: {0}")]
    Bip32(String),
}

/// Single component of a derivation path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationComponent {
    pub index: u32,
    pub hardened: bool,
}

impl DerivationComponent {
    pub fn new(index: u32, hardened: bool) -> Self {
        Self { index, hardened }
    }

    pub fn to_child_number(self) -> Result<ChildNumber, DerivationError> {
        let child = if self.hardened {
            ChildNumber::from_hardened_idx(self.index)
        } else {
            ChildNumber::from_normal_idx(self.index)
        };
        child.map_err(|e| DerivationError::Bip32(e.to_string()))
    }
}

impl fmt::Display for DerivationComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// A validated five-level account path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPath {
    components: [DerivationComponent; ACCOUNT_PATH_DEPTH],
}

impl AccountPath {
    /// Build a path from its numeric parts (first three hardened)
    pub fn new(purpose: u32, coin_type: u32, account: u32, change: u32, index: u32) -> Self {
        Self {
            components: [
                DerivationComponent::new(purpose, true),
                DerivationComponent::new(coin_type, true),
                DerivationComponent::new(account, true),
                DerivationComponent::new(change, false),
                DerivationComponent::new(index, false),
            ],
        }
    }

    /// Parse path segments such as `["m", "86'", "0'", "0'", "0", "0"]`
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Self, DerivationError> {
        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| DerivationError::InvalidPath("empty path".to_string()))?;

        if !matches!(first.as_ref().trim(), "m" | "M") {
            return Err(DerivationError::InvalidPath(
                "path must start with 'm'".to_string(),
            ));
        }

        if rest.len() != ACCOUNT_PATH_DEPTH {
            return Err(DerivationError::UnsupportedDepth(rest.len()));
        }

        let mut components = [DerivationComponent::new(0, false); ACCOUNT_PATH_DEPTH];
        for (slot, segment) in components.iter_mut().zip(rest) {
            *slot = parse_component(segment.as_ref())?;
        }

        let levels = ["purpose", "coin type", "account"];
        for (component, level) in components.iter().zip(levels) {
            if !component.hardened {
                return Err(DerivationError::UnhardenedLevel(level));
            }
        }

        Ok(Self { components })
    }

    pub fn purpose(&self) -> u32 {
        self.components[0].index
    }

    pub fn coin_type(&self) -> u32 {
        self.components[1].index
    }

    pub fn account(&self) -> u32 {
        self.components[2].index
    }

    pub fn change(&self) -> u32 {
        self.components[3].index
    }

    pub fn address_index(&self) -> u32 {
        self.components[4].index
    }

    /// Reject paths whose coin type belongs to another network
    pub fn check_network(&self, network: BtcNetwork) -> Result<(), DerivationError> {
        let expected = network.coin_type();
        if self.coin_type() != expected {
            return Err(DerivationError::CoinTypeMismatch {
                expected,
                found: self.coin_type(),
            });
        }
        Ok(())
    }

    pub fn to_bip32(&self) -> Result<bip32::DerivationPath, DerivationError> {
        let children = self
            .components
            .iter()
            .map(|c| c.to_child_number())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bip32::DerivationPath::from(children))
    }

    /// Segments in the account representation, `"m"` first
    pub fn to_segments(&self) -> Vec<String> {
        std::iter::once("m".to_string())
            .chain(self.components.iter().map(|c| c.to_string()))
            .collect()
    }
}

impl fmt::Display for AccountPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for AccountPath {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.trim().split('/').collect();
        Self::from_segments(&segments)
    }
}

fn parse_component(s: &str) -> Result<DerivationComponent, DerivationError> {
    let trimmed = s.trim();

    if trimmed.is_empty() {
        return Err(DerivationError::InvalidPath("empty path component".to_string()));
    }

    let (number_str, hardened) = match trimmed.strip_suffix(['\'', 'h', 'H']) {
        Some(number) => (number, true),
        None => (trimmed, false),
    };

    let index: u32 = number_str
        .parse()
        .map_err(|e| DerivationError::InvalidPath(format!("component '{}': {}", s, e)))?;

    if index >= HARDENED {
        return Err(DerivationError::InvalidPath(format!(
            "component {} exceeds maximum value",
            index
        )));
    }

    Ok(DerivationComponent::new(index, hardened))
}
