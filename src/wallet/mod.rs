//! Wallet Module
//!
//! Root secret handling, account paths, key derivation and the account and
//! network collaborators used by the request handlers.

mod derivation;
mod derivation_path;
mod keygen;
pub mod accounts;
pub mod network;

pub use accounts::{derive_account, AccountDirectory, InMemoryAccounts};
pub use derivation::*;
pub use derivation_path::*;
pub use keygen::*;
pub use network::{NetworkSelector, NetworkStore};
