//! Signing
//!
//! Per-request signers that hold one account key each. Plain keys sign
//! legacy and SegWit v0 inputs with ECDSA; Taproot keys are tweaked and sign
//! with BIP-340 Schnorr.

pub mod signer;

pub use signer::*;
