//! Address/Script Classifier
//!
//! Maps a BIP43 purpose (or a previous-output script) to one of the four
//! script types the signer understands. The script type decides which
//! sighash algorithm an input uses and whether the account key is tweaked.

use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use bitcoin::{Address, Script};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SignerError, SignerResult};
use crate::signing::SignatureScheme;
use crate::types::{Account, BtcNetwork};
use crate::wallet::{bip_purposes, AccountPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    /// P2PKH
    Legacy,
    /// P2SH-wrapped P2WPKH
    P2shSegwit,
    /// P2WPKH
    NativeSegwit,
    /// P2TR key path
    Taproot,
}

impl ScriptType {
    pub fn purpose(self) -> u32 {
        match self {
            ScriptType::Legacy => bip_purposes::BIP44,
            ScriptType::P2shSegwit => bip_purposes::BIP49,
            ScriptType::NativeSegwit => bip_purposes::BIP84,
            ScriptType::Taproot => bip_purposes::BIP86,
        }
    }

    /// Only Taproot keys are tweaked before signing
    pub fn requires_tweak(self) -> bool {
        matches!(self, ScriptType::Taproot)
    }

    pub fn signature_scheme(self) -> SignatureScheme {
        match self {
            ScriptType::Taproot => SignatureScheme::Schnorr,
            _ => SignatureScheme::Ecdsa,
        }
    }

    /// Address of `public_key` under this script type
    ///
    /// Taproot addresses commit to the untweaked internal key (BIP86).
    pub fn address_for(
        self,
        secp: &Secp256k1<All>,
        public_key: &PublicKey,
        network: BtcNetwork,
    ) -> Address {
        let network = network.to_bitcoin();
        let compressed = CompressedPublicKey(*public_key);
        match self {
            ScriptType::Legacy => Address::p2pkh(compressed.pubkey_hash(), network),
            ScriptType::P2shSegwit => Address::p2shwpkh(&compressed, network),
            ScriptType::NativeSegwit => Address::p2wpkh(&compressed, network),
            ScriptType::Taproot => {
                let (internal_key, _parity) = public_key.x_only_public_key();
                Address::p2tr(secp, internal_key, None, network)
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScriptType::Legacy => "legacy",
            ScriptType::P2shSegwit => "p2sh_segwit",
            ScriptType::NativeSegwit => "native_segwit",
            ScriptType::Taproot => "taproot",
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Script type for a BIP43 purpose
pub fn classify(purpose: u32) -> SignerResult<ScriptType> {
    match purpose {
        bip_purposes::BIP44 => Ok(ScriptType::Legacy),
        bip_purposes::BIP49 => Ok(ScriptType::P2shSegwit),
        bip_purposes::BIP84 => Ok(ScriptType::NativeSegwit),
        bip_purposes::BIP86 => Ok(ScriptType::Taproot),
        other => Err(SignerError::unsupported_script_type(format!(
            "purpose {}",
            other
        ))),
    }
}

/// Script type of an account, read from the purpose level of its path
pub fn classify_account(account: &Account) -> SignerResult<ScriptType> {
    let path = AccountPath::from_segments(&account.derivation_path)?;
    classify(path.purpose())
}

/// Script type of a previous output
///
/// P2SH outputs are assumed to wrap P2WPKH; the redeem script is checked
/// separately when the PSBT carries one.
pub fn classify_script(script: &Script) -> SignerResult<ScriptType> {
    if script.is_p2pkh() {
        Ok(ScriptType::Legacy)
    } else if script.is_p2sh() {
        Ok(ScriptType::P2shSegwit)
    } else if script.is_p2wpkh() {
        Ok(ScriptType::NativeSegwit)
    } else if script.is_p2tr() {
        Ok(ScriptType::Taproot)
    } else {
        Err(SignerError::unsupported_script_type(format!(
            "script {}",
            script.to_hex_string()
        )))
    }
}
