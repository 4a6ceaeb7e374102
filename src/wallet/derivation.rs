//! Key Derivation
//!
//! Derives account private keys from the root secret along validated
//! account paths.
//!
//! SECURITY: Derived keys live in a [`PrivateKeyHandle`] which erases the
//! secret scalar when dropped. Intermediate extended keys are erased before
//! `derive` returns.

use bitcoin::bip32::Xpriv;
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey, XOnlyPublicKey};

use crate::types::BtcNetwork;

use super::{AccountPath, DerivationError, RootSecret};

/// Private key for one account, valid for a single signing request
pub struct PrivateKeyHandle {
    secret: SecretKey,
    public: PublicKey,
}

impl PrivateKeyHandle {
    pub(crate) fn new(secp: &Secp256k1<All>, secret: SecretKey) -> Self {
        let public = secret.public_key(secp);
        Self { secret, public }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.public.x_only_public_key().0
    }

    /// Hand the scalar to a signer or tweak without copying it out
    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

impl Drop for PrivateKeyHandle {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl std::fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyHandle")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Derive the private key for `path` on `network`
///
/// Deterministic: the same root, network and path always give the same key.
pub fn derive(
    secp: &Secp256k1<All>,
    root: &RootSecret,
    network: BtcNetwork,
    path: &AccountPath,
) -> Result<PrivateKeyHandle, DerivationError> {
    path.check_network(network)?;
    let bip32_path = path.to_bip32()?;

    let mut master = Xpriv::new_master(network.to_bitcoin(), root.seed_bytes())
        .map_err(|e| DerivationError::Bip32(e.to_string()))?;
    let child = master.derive_priv(secp, &bip32_path);
    master.private_key.non_secure_erase();

    let mut child = child.map_err(|e| DerivationError::Bip32(e.to_string()))?;
    let handle = PrivateKeyHandle::new(secp, child.private_key);
    child.private_key.non_secure_erase();

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn root() -> RootSecret {
        RootSecret::from_mnemonic(TEST_MNEMONIC, "").unwrap()
    }

    #[test]
    fn test_bip84_vector() {
        let secp = Secp256k1::new();
        let path: AccountPath = "m/84'/0'/0'/0/0".parse().unwrap();
        let key = derive(&secp, &root(), BtcNetwork::Mainnet, &path).unwrap();
        assert_eq!(
            key.public_key().to_string(),
            "0330d54fd0dd420a6e5f8d3624f5f3482cae350f79d5f0753bf5beef9c2d91af3c"
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let secp = Secp256k1::new();
        let path: AccountPath = "m/86'/1'/0'/0/3".parse().unwrap();
        let a = derive(&secp, &root(), BtcNetwork::Testnet, &path).unwrap();
        let b = derive(&secp, &root(), BtcNetwork::Testnet, &path).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.secret_key().secret_bytes(), b.secret_key().secret_bytes());
    }

    #[test]
    fn test_network_mismatch_fails() {
        let secp = Secp256k1::new();
        let path: AccountPath = "m/84'/0'/0'/0/0".parse().unwrap();
        let err = derive(&secp, &root(), BtcNetwork::Testnet, &path).unwrap_err();
        assert!(matches!(err, DerivationError::CoinTypeMismatch { .. }));
    }
}
