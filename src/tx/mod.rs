//! Transaction Module
//!
//! PSBT parsing, summarizing, validation, signing and finalization, plus the
//! script classifier that drives sighash selection.

pub mod classifier;
mod psbt;
mod summary;

pub use classifier::{classify, classify_account, classify_script, ScriptType};
pub use psbt::*;
pub use summary::*;
