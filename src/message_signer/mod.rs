//! Bitcoin Message Signing
//!
//! Signs `"\x18Bitcoin Signed Message:\n" || varint(len) || message` with a
//! recoverable ECDSA signature and returns the 65-byte compact form in
//! base64. The header byte follows BIP-137 so verifiers can tell which
//! address type the key is bound to:
//!
//! | header | address type      |
//! |--------|-------------------|
//! | 31-34  | P2PKH (compressed)|
//! | 35-38  | P2SH-P2WPKH       |
//! | 39-42  | P2WPKH            |
//!
//! Taproot accounts have no BIP-137 encoding and are rejected.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bitcoin::hashes::Hash;
use bitcoin::sign_message::signed_msg_hash;
use bitcoin::Address;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, Secp256k1};

use crate::tx::ScriptType;
use crate::types::BtcNetwork;
use crate::wallet::PrivateKeyHandle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageSignError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Cannot sign messages for {0} accounts")]
    UnsupportedScriptType(ScriptType),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
}

/// Digest a message the way Bitcoin Core's `signmessage` does
pub fn message_digest(message: &str) -> [u8; 32] {
    signed_msg_hash(message).to_byte_array()
}

fn header_base(script_type: ScriptType) -> Result<u8, MessageSignError> {
    match script_type {
        ScriptType::Legacy => Ok(31),
        ScriptType::P2shSegwit => Ok(35),
        ScriptType::NativeSegwit => Ok(39),
        ScriptType::Taproot => Err(MessageSignError::UnsupportedScriptType(script_type)),
    }
}

/// Sign `message` with an account key, returning the base64 signature
pub fn sign_message(
    secp: &Secp256k1<All>,
    key: &PrivateKeyHandle,
    script_type: ScriptType,
    message: &str,
) -> Result<String, MessageSignError> {
    if message.is_empty() {
        return Err(MessageSignError::EmptyMessage);
    }
    let header = header_base(script_type)?;

    let msg = Message::from_digest(message_digest(message));
    let signature = secp.sign_ecdsa_recoverable(&msg, key.secret_key());
    let (recovery_id, compact) = signature.serialize_compact();

    let mut bytes = [0u8; 65];
    bytes[0] = header + recovery_id.to_i32() as u8;
    bytes[1..].copy_from_slice(&compact);

    Ok(BASE64.encode(bytes))
}

/// Check a base64 signature against an address
///
/// The recovered key is accepted if it produces `address` under any
/// single-key ECDSA script type.
pub fn verify_message(
    secp: &Secp256k1<All>,
    address: &Address,
    network: BtcNetwork,
    message: &str,
    signature: &str,
) -> Result<bool, MessageSignError> {
    let bytes = BASE64
        .decode(signature.trim())
        .map_err(|e| MessageSignError::MalformedSignature(e.to_string()))?;
    if bytes.len() != 65 {
        return Err(MessageSignError::MalformedSignature(format!(
            "expected 65 bytes, got {}",
            bytes.len()
        )));
    }
    if !(27..=42).contains(&bytes[0]) {
        return Err(MessageSignError::MalformedSignature(format!(
            "invalid header byte {}",
            bytes[0]
        )));
    }

    let recovery_id = RecoveryId::from_i32(((bytes[0] - 27) & 3) as i32)
        .map_err(|e| MessageSignError::MalformedSignature(e.to_string()))?;
    let signature = RecoverableSignature::from_compact(&bytes[1..], recovery_id)
        .map_err(|e| MessageSignError::MalformedSignature(e.to_string()))?;

    let msg = Message::from_digest(message_digest(message));
    let public_key = match secp.recover_ecdsa(&msg, &signature) {
        Ok(public_key) => public_key,
        Err(_) => return Ok(false),
    };

    let expected = address.script_pubkey();
    Ok([ScriptType::Legacy, ScriptType::P2shSegwit, ScriptType::NativeSegwit]
        .into_iter()
        .any(|ty| ty.address_for(secp, &public_key, network).script_pubkey() == expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{derive, AccountPath, RootSecret};

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn key(secp: &Secp256k1<All>, script_type: ScriptType) -> PrivateKeyHandle {
        let root = RootSecret::from_mnemonic(TEST_MNEMONIC, "").unwrap();
        let path = AccountPath::new(script_type.purpose(), 0, 0, 0, 0);
        derive(secp, &root, BtcNetwork::Mainnet, &path).unwrap()
    }

    #[test]
    fn test_sign_and_verify_native_segwit() {
        let secp = Secp256k1::new();
        let key = key(&secp, ScriptType::NativeSegwit);
        let address = ScriptType::NativeSegwit.address_for(&secp, &key.public_key(), BtcNetwork::Mainnet);

        let signature = sign_message(&secp, &key, ScriptType::NativeSegwit, "hello world").unwrap();
        let raw = BASE64.decode(&signature).unwrap();
        assert_eq!(raw.len(), 65);
        assert!((39..=42).contains(&raw[0]));

        assert!(verify_message(&secp, &address, BtcNetwork::Mainnet, "hello world", &signature).unwrap());
        assert!(!verify_message(&secp, &address, BtcNetwork::Mainnet, "hello there", &signature).unwrap());
    }

    #[test]
    fn test_signature_is_deterministic() {
        let secp = Secp256k1::new();
        let key = key(&secp, ScriptType::Legacy);
        let a = sign_message(&secp, &key, ScriptType::Legacy, "deterministic").unwrap();
        let b = sign_message(&secp, &key, ScriptType::Legacy, "deterministic").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_taproot_and_empty() {
        let secp = Secp256k1::new();
        let key = key(&secp, ScriptType::Taproot);
        assert_eq!(
            sign_message(&secp, &key, ScriptType::Taproot, "hi"),
            Err(MessageSignError::UnsupportedScriptType(ScriptType::Taproot))
        );
        assert_eq!(
            sign_message(&secp, &key, ScriptType::NativeSegwit, ""),
            Err(MessageSignError::EmptyMessage)
        );
    }

    #[test]
    fn test_verify_rejects_malformed() {
        let secp = Secp256k1::new();
        let key = key(&secp, ScriptType::NativeSegwit);
        let address = ScriptType::NativeSegwit.address_for(&secp, &key.public_key(), BtcNetwork::Mainnet);
        assert!(verify_message(&secp, &address, BtcNetwork::Mainnet, "m", "not base64!").is_err());
        assert!(verify_message(&secp, &address, BtcNetwork::Mainnet, "m", &BASE64.encode([0u8; 10])).is_err());
    }
}
