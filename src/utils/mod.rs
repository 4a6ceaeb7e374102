//! Utilities Module
//!
//! Logging and configuration shared by the library and the binary.

pub mod config;
pub mod logging;

pub use config::SignerSettings;
