//! Lightning Invoice Signing (BOLT-11)
//!
//! Takes an unsigned invoice (human-readable part plus tagged data, bech32
//! encoded), signs `SHA256(hrp || data)` with a recoverable ECDSA signature
//! and appends the 65-byte `r || s || recovery_id` to the data part.

use bech32::{FromBase32, ToBase32, Variant};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1};
use sha2::{Digest, Sha256};

use crate::types::BtcNetwork;
use crate::wallet::PrivateKeyHandle;

/// 35-bit timestamp, the only mandatory field before tagged fields
const TIMESTAMP_WORDS: usize = 7;
/// 520-bit signature in 5-bit words
const SIGNATURE_WORDS: usize = 104;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LightningError {
    #[error("Invalid invoice: {0}")]
    InvalidInvoice(String),

    #[error("Invoice is for {got}, signer is on {expected}")]
    NetworkMismatch { expected: String, got: String },

    #[error("Invoice encoding failed: {0}")]
    Encoding(String),
}

/// BOLT-11 prefix for a network
pub fn invoice_prefix(network: BtcNetwork) -> &'static str {
    match network {
        BtcNetwork::Mainnet => "lnbc",
        BtcNetwork::Testnet => "lntb",
        BtcNetwork::Signet => "lntbs",
        BtcNetwork::Regtest => "lnbcrt",
    }
}

fn network_of(hrp: &str) -> Option<BtcNetwork> {
    // Longest prefixes first: "lnbcrt" also starts with "lnbc"
    [
        BtcNetwork::Regtest,
        BtcNetwork::Signet,
        BtcNetwork::Mainnet,
        BtcNetwork::Testnet,
    ]
    .into_iter()
    .find(|n| hrp.starts_with(invoice_prefix(*n)))
}

/// Digest signed by the node key: `SHA256(hrp || data padded to bytes)`
fn invoice_digest(hrp: &str, data: &[bech32::u5]) -> Result<[u8; 32], LightningError> {
    let words: Vec<u8> = data.iter().map(|w| w.to_u8()).collect();
    let data_bytes = bech32::convert_bits(&words, 5, 8, true)
        .map_err(|e| LightningError::Encoding(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(hrp.as_bytes());
    hasher.update(&data_bytes);
    Ok(hasher.finalize().into())
}

fn decode(invoice: &str, network: BtcNetwork) -> Result<(String, Vec<bech32::u5>), LightningError> {
    let (hrp, data, variant) = bech32::decode(invoice.trim())
        .map_err(|e| LightningError::InvalidInvoice(e.to_string()))?;

    if variant != Variant::Bech32 {
        return Err(LightningError::InvalidInvoice("expected bech32, got bech32m".to_string()));
    }

    match network_of(&hrp) {
        Some(found) if found == network => {}
        Some(found) => {
            return Err(LightningError::NetworkMismatch {
                expected: network.to_string(),
                got: found.to_string(),
            })
        }
        None => {
            return Err(LightningError::InvalidInvoice(format!(
                "unknown prefix '{}'",
                hrp
            )))
        }
    }

    Ok((hrp, data))
}

/// Sign an unsigned invoice, returning the signed bech32 string
pub fn sign_invoice(
    secp: &Secp256k1<All>,
    key: &PrivateKeyHandle,
    invoice: &str,
    network: BtcNetwork,
) -> Result<String, LightningError> {
    let (hrp, mut data) = decode(invoice, network)?;
    if data.len() < TIMESTAMP_WORDS {
        return Err(LightningError::InvalidInvoice("missing timestamp".to_string()));
    }

    let msg = Message::from_digest(invoice_digest(&hrp, &data)?);
    let signature = secp.sign_ecdsa_recoverable(&msg, key.secret_key());
    let (recovery_id, compact) = signature.serialize_compact();

    let mut raw = Vec::with_capacity(65);
    raw.extend_from_slice(&compact);
    raw.push(recovery_id.to_i32() as u8);
    data.extend(raw.to_base32());

    bech32::encode(&hrp, data, Variant::Bech32).map_err(|e| LightningError::Encoding(e.to_string()))
}

/// Recover the node key that signed `invoice`
pub fn recover_payee(
    secp: &Secp256k1<All>,
    invoice: &str,
    network: BtcNetwork,
) -> Result<PublicKey, LightningError> {
    let (hrp, data) = decode(invoice, network)?;
    if data.len() < TIMESTAMP_WORDS + SIGNATURE_WORDS {
        return Err(LightningError::InvalidInvoice("missing signature".to_string()));
    }

    let (body, signature_words) = data.split_at(data.len() - SIGNATURE_WORDS);
    let raw = Vec::<u8>::from_base32(signature_words)
        .map_err(|e| LightningError::InvalidInvoice(e.to_string()))?;

    let recovery_id = RecoveryId::from_i32(raw[64] as i32)
        .map_err(|e| LightningError::InvalidInvoice(e.to_string()))?;
    let signature = RecoverableSignature::from_compact(&raw[..64], recovery_id)
        .map_err(|e| LightningError::InvalidInvoice(e.to_string()))?;

    let msg = Message::from_digest(invoice_digest(&hrp, body)?);
    secp.recover_ecdsa(&msg, &signature)
        .map_err(|e| LightningError::InvalidInvoice(e.to_string()))
}
