//! Root Secret
//!
//! The single secret every account key is derived from: a BIP39 seed.
//!
//! SECURITY: Entropy and seed bytes are zeroized on drop.

use bip39::Mnemonic;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::SignerResult;

use super::DerivationError;

/// BIP39 seed held for the lifetime of the process
pub struct RootSecret {
    seed: Zeroizing<Vec<u8>>,
}

impl RootSecret {
    /// Restore from a mnemonic phrase with an optional BIP39 passphrase
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self, DerivationError> {
        let mnemonic = Mnemonic::parse(phrase.trim())
            .map_err(|e| DerivationError::InvalidRootSecret(e.to_string()))?;
        let seed = Zeroizing::new(mnemonic.to_seed(passphrase));
        Ok(Self {
            seed: Zeroizing::new(seed.to_vec()),
        })
    }

    /// Wrap raw seed bytes (16 to 64 bytes, as accepted by BIP32)
    pub fn from_seed(seed: &[u8]) -> Result<Self, DerivationError> {
        if !(16..=64).contains(&seed.len()) {
            return Err(DerivationError::InvalidRootSecret(format!(
                "seed must be 16 to 64 bytes, got {}",
                seed.len()
            )));
        }
        Ok(Self {
            seed: Zeroizing::new(seed.to_vec()),
        })
    }

    pub(crate) fn seed_bytes(&self) -> &[u8] {
        &self.seed
    }
}

impl std::fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RootSecret([REDACTED])")
    }
}

/// Generate a fresh 12-word mnemonic from OS randomness
pub fn generate_mnemonic() -> SignerResult<String> {
    let mut entropy = Zeroizing::new([0u8; 16]); // 128 bits = 12 words
    OsRng.fill_bytes(entropy.as_mut());

    let mnemonic = Mnemonic::from_entropy(entropy.as_ref())?;
    Ok(mnemonic.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_mnemonic() {
        let phrase = generate_mnemonic().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        assert!(RootSecret::from_mnemonic(&phrase, "").is_ok());
    }

    #[test]
    fn test_known_seed() {
        let root = RootSecret::from_mnemonic(TEST_MNEMONIC, "").unwrap();
        assert_eq!(
            hex::encode(root.seed_bytes()),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc19a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(RootSecret::from_mnemonic("abandon abandon", "").is_err());
        assert!(RootSecret::from_seed(&[1u8; 8]).is_err());
        assert!(RootSecret::from_seed(&[1u8; 65]).is_err());
        assert_eq!(RootSecret::from_seed(&[7u8; 32]).unwrap().seed_bytes(), &[7u8; 32]);
    }

    #[test]
    fn test_debug_is_redacted() {
        let root = RootSecret::from_seed(&[7u8; 32]).unwrap();
        assert_eq!(format!("{:?}", root), "RootSecret([REDACTED])");
    }
}
