//! PSBT Signer Library
//!
//! Custodial Bitcoin signer: accounts are derived from one root secret and
//! callers only ever receive signatures, never keys.
//!
//! # Architecture
//!
//! This crate provides:
//! - **wallet**: Root secret, account paths, key derivation, account and network stores
//! - **crypto**: Taproot key tweaking
//! - **signing**: Per-request ECDSA and Schnorr signers
//! - **tx**: PSBT parsing, summary, validation, signing and finalization
//! - **message_signer**: Bitcoin signed messages
//! - **lightning**: BOLT-11 invoice signing
//! - **rpc**: Request router and the `btc_signPsbt` lifecycle
//!
//! # Security
//!
//! Seeds and derived keys are erased on drop (`zeroize` and
//! `non_secure_erase`). Keys are derived per request, only after the host
//! approved it, and live no longer than the request.
//!
//! # Example
//!
//! ```rust,ignore
//! use psbt_signer::{Engine, RootSecret, SignerSettings, AutoApprove};
//!
//! let root = RootSecret::from_mnemonic(phrase, "")?;
//! let engine = Engine::new(root, SignerSettings::default(), Box::new(AutoApprove))?;
//! let response = engine.handle_json("wallet-ui", r#"{"method":"btc_getAccounts"}"#);
//! ```

pub mod crypto;
pub mod error;
pub mod lightning;
pub mod message_signer;
pub mod rpc;
pub mod signing;
pub mod tx;
pub mod types;
pub mod utils;
pub mod wallet;

pub use error::{ErrorCode, SignerError, SignerResult};
pub use rpc::{
    sign_psbt, AutoApprove, AutoDecline, Authorizer, ConfirmationPrompt, Engine, RpcRequest,
    RpcResult, SignPsbtParams,
};
pub use types::*;
pub use utils::config::SignerSettings;
pub use wallet::{generate_mnemonic, RootSecret};
