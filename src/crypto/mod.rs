//! Cryptographic primitives
//!
//! Taproot key-path tweaking and the BIP-340 tagged hash it is built on.
//! Curve arithmetic and signature algorithms come from `secp256k1`.

pub mod taproot;

pub use taproot::*;
