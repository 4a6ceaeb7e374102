//! Taproot Key Tweaking (BIP-341 key path)
//!
//! Turns an account key into the key that signs for its BIP86 output:
//!
//! ```text
//! P  = d·G, with d negated when P has odd Y
//! t  = tagged_hash("TapTweak", x(P))
//! d' = d + t  (mod n)
//! Q  = d'·G   (the output key committed to by the address)
//! ```
//!
//! Script trees are not supported, so the tweak never commits to a merkle
//! root.
//!
//! Reference: https://github.com/bitcoin/bips/blob/master/bip-0341.mediawiki

use bitcoin::secp256k1::{All, Keypair, Parity, Scalar, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use crate::wallet::PrivateKeyHandle;

/// BIP-340/341 tag names
pub mod tags {
    pub const TAP_TWEAK: &str = "TapTweak";
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TweakError {
    #[error("tweak hash is not a valid scalar")]
    TweakOutOfRange,

    #[error("tweaked key is invalid")]
    InvalidTweakedKey,
}

/// `SHA256(SHA256(tag) || SHA256(tag) || msg)`
pub fn tagged_hash(tag: &str, msg: &[u8]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());

    let mut hasher = Sha256::new();
    hasher.update(&tag_hash);
    hasher.update(&tag_hash);
    hasher.update(msg);
    hasher.finalize().into()
}

/// Key-path tweak for an internal key
pub fn tap_tweak_hash(internal_key: &XOnlyPublicKey) -> [u8; 32] {
    tagged_hash(tags::TAP_TWEAK, &internal_key.serialize())
}

/// Tweaked key for Taproot key-path signing
pub struct TweakedPrivateKeyHandle {
    keypair: Keypair,
    output_key: XOnlyPublicKey,
}

impl TweakedPrivateKeyHandle {
    /// x-only output key, as encoded in the P2TR witness program
    pub fn output_key(&self) -> XOnlyPublicKey {
        self.output_key
    }

    pub(crate) fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl Drop for TweakedPrivateKeyHandle {
    fn drop(&mut self) {
        self.keypair.non_secure_erase();
    }
}

impl std::fmt::Debug for TweakedPrivateKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TweakedPrivateKeyHandle")
            .field("output_key", &self.output_key)
            .finish_non_exhaustive()
    }
}

/// Apply the key-path tweak to an account key
pub fn tweak(
    secp: &Secp256k1<All>,
    key: &PrivateKeyHandle,
) -> Result<TweakedPrivateKeyHandle, TweakError> {
    let (internal_key, parity) = key.public_key().x_only_public_key();

    let mut secret = *key.secret_key();
    if parity == Parity::Odd {
        secret = secret.negate();
    }

    let tweak = Scalar::from_be_bytes(tap_tweak_hash(&internal_key))
        .map_err(|_| TweakError::TweakOutOfRange)?;
    let tweaked = secret.add_tweak(&tweak);
    secret.non_secure_erase();
    let mut tweaked = tweaked.map_err(|_| TweakError::InvalidTweakedKey)?;

    // BIP-340 signing normalizes the keypair to even Y internally
    let keypair = Keypair::from_secret_key(secp, &tweaked);
    tweaked.non_secure_erase();
    let (output_key, _parity) = keypair.x_only_public_key();

    Ok(TweakedPrivateKeyHandle {
        keypair,
        output_key,
    })
}
