//! Account Signers
//!
//! A signer owns exactly one account key for the length of a request and
//! signs 32-byte sighash digests with it. Plain signers produce ECDSA
//! signatures, tweaked (Taproot) signers produce BIP-340 Schnorr signatures.
//! The caller chooses the scheme from the input's script type and the signer
//! refuses a scheme it cannot produce.

use bitcoin::secp256k1::{ecdsa, schnorr, All, Message, PublicKey, Secp256k1, XOnlyPublicKey};
use serde::{Deserialize, Serialize};

use crate::crypto::{tweak, TweakedPrivateKeyHandle};
use crate::error::{SignerError, SignerResult};
use crate::tx::classifier::ScriptType;
use crate::wallet::PrivateKeyHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScheme {
    Ecdsa,
    Schnorr,
}

/// Signature over one digest, before a sighash type is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Ecdsa(ecdsa::Signature),
    Schnorr(schnorr::Signature),
}

impl Signature {
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            Signature::Ecdsa(_) => SignatureScheme::Ecdsa,
            Signature::Schnorr(_) => SignatureScheme::Schnorr,
        }
    }
}

/// ECDSA signer over an untweaked account key
#[derive(Debug)]
pub struct PlainSigner {
    key: PrivateKeyHandle,
}

impl PlainSigner {
    pub fn new(key: PrivateKeyHandle) -> Self {
        Self { key }
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Deterministic (RFC6979) low-R signature
    pub fn sign(&self, secp: &Secp256k1<All>, digest: [u8; 32]) -> ecdsa::Signature {
        let msg = Message::from_digest(digest);
        secp.sign_ecdsa_low_r(&msg, self.key.secret_key())
    }
}

/// BIP-340 signer over a Taproot-tweaked key
#[derive(Debug)]
pub struct TweakedSigner {
    key: TweakedPrivateKeyHandle,
}

impl TweakedSigner {
    pub fn new(key: TweakedPrivateKeyHandle) -> Self {
        Self { key }
    }

    pub fn output_key(&self) -> XOnlyPublicKey {
        self.key.output_key()
    }

    /// Schnorr signature without auxiliary randomness
    pub fn sign(&self, secp: &Secp256k1<All>, digest: [u8; 32]) -> schnorr::Signature {
        let msg = Message::from_digest(digest);
        secp.sign_schnorr_no_aux_rand(&msg, self.key.keypair())
    }
}

/// Signer for one account, dropped (and its key erased) with the request
#[derive(Debug)]
pub enum AccountSigner {
    Plain(PlainSigner),
    Tweaked(TweakedSigner),
}

impl AccountSigner {
    /// Wrap a derived key, tweaking it first when the script type needs it
    pub fn for_script_type(
        secp: &Secp256k1<All>,
        key: PrivateKeyHandle,
        script_type: ScriptType,
    ) -> SignerResult<Self> {
        if script_type.requires_tweak() {
            let tweaked = tweak(secp, &key)?;
            Ok(AccountSigner::Tweaked(TweakedSigner::new(tweaked)))
        } else {
            Ok(AccountSigner::Plain(PlainSigner::new(key)))
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        match self {
            AccountSigner::Plain(_) => SignatureScheme::Ecdsa,
            AccountSigner::Tweaked(_) => SignatureScheme::Schnorr,
        }
    }

    pub fn sign(
        &self,
        secp: &Secp256k1<All>,
        digest: [u8; 32],
        scheme: SignatureScheme,
    ) -> SignerResult<Signature> {
        match (self, scheme) {
            (AccountSigner::Plain(signer), SignatureScheme::Ecdsa) => {
                Ok(Signature::Ecdsa(signer.sign(secp, digest)))
            }
            (AccountSigner::Tweaked(signer), SignatureScheme::Schnorr) => {
                Ok(Signature::Schnorr(signer.sign(secp, digest)))
            }
            (signer, requested) => Err(SignerError::signing(format!(
                "{:?} signer cannot produce {:?} signatures",
                signer.scheme(),
                requested
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::BtcNetwork;
    use crate::wallet::{derive, AccountPath, RootSecret};

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn signer(secp: &Secp256k1<All>, script_type: ScriptType) -> AccountSigner {
        let root = RootSecret::from_mnemonic(TEST_MNEMONIC, "").unwrap();
        let path = AccountPath::new(script_type.purpose(), 0, 0, 0, 0);
        let key = derive(secp, &root, BtcNetwork::Mainnet, &path).unwrap();
        AccountSigner::for_script_type(secp, key, script_type).unwrap()
    }

    #[test]
    fn test_variant_follows_script_type() {
        let secp = Secp256k1::new();
        assert!(matches!(signer(&secp, ScriptType::NativeSegwit), AccountSigner::Plain(_)));
        assert!(matches!(signer(&secp, ScriptType::Legacy), AccountSigner::Plain(_)));
        assert!(matches!(signer(&secp, ScriptType::Taproot), AccountSigner::Tweaked(_)));
    }

    #[test]
    fn test_ecdsa_is_deterministic_and_verifies() {
        let secp = Secp256k1::new();
        let signer = signer(&secp, ScriptType::NativeSegwit);
        let digest = [0x11; 32];

        let a = signer.sign(&secp, digest, SignatureScheme::Ecdsa).unwrap();
        let b = signer.sign(&secp, digest, SignatureScheme::Ecdsa).unwrap();
        assert_eq!(a, b);

        let (Signature::Ecdsa(sig), AccountSigner::Plain(plain)) = (a, &signer) else {
            panic!("expected an ECDSA signature from a plain signer");
        };
        let msg = Message::from_digest(digest);
        assert!(secp.verify_ecdsa(&msg, &sig, &plain.public_key()).is_ok());
    }

    #[test]
    fn test_schnorr_verifies_against_output_key() {
        let secp = Secp256k1::new();
        let signer = signer(&secp, ScriptType::Taproot);
        let digest = [0x22; 32];

        let Signature::Schnorr(sig) = signer.sign(&secp, digest, SignatureScheme::Schnorr).unwrap() else {
            panic!("expected a Schnorr signature");
        };
        let AccountSigner::Tweaked(tweaked) = &signer else {
            panic!("expected a tweaked signer");
        };
        assert_eq!(
            hex::encode(tweaked.output_key().serialize()),
            "a60869f0dbcf1dc659c9cecbaf8050135ea9e8cdc487053f1dc6880949dc684c"
        );
        let msg = Message::from_digest(digest);
        assert!(secp.verify_schnorr(&sig, &msg, &tweaked.output_key()).is_ok());
    }

    #[test]
    fn test_scheme_mismatch_rejected() {
        let secp = Secp256k1::new();
        let plain = signer(&secp, ScriptType::NativeSegwit);
        let err = plain.sign(&secp, [0; 32], SignatureScheme::Schnorr).unwrap_err();
        assert_eq!(err.code, ErrorCode::SigningError);

        let tweaked = signer(&secp, ScriptType::Taproot);
        assert!(tweaked.sign(&secp, [0; 32], SignatureScheme::Ecdsa).is_err());
    }
}
