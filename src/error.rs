//! Unified error types for the signer
//!
//! Every failure leaves the crate as a [`SignerError`]: a stable machine
//! readable [`ErrorCode`] plus the fixed description of that code. Internal
//! detail (library error text, offending input index, ...) is kept in
//! `details` for logging only and is never serialized to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all signer operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip)]
    pub details: Option<String>,
}

impl SignerError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.description().to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn malformed_transaction(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedTransaction).with_details(details)
    }

    pub fn unsupported_script_type(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedScriptType).with_details(details)
    }

    pub fn account_not_found(address: impl Into<String>) -> Self {
        Self::new(ErrorCode::AccountNotFound).with_details(address)
    }

    pub fn validation(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError).with_details(details)
    }

    pub fn authorization_declined() -> Self {
        Self::new(ErrorCode::AuthorizationDeclined)
    }

    pub fn derivation(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::DerivationError).with_details(details)
    }

    pub fn signing(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::SigningError).with_details(details)
    }

    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest).with_details(details)
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal).with_details(details)
    }
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for SignerError {}

impl PartialEq<ErrorCode> for SignerError {
    fn eq(&self, other: &ErrorCode) -> bool {
        self.code == *other
    }
}

/// Error codes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedTransaction,
    UnsupportedScriptType,
    AccountNotFound,
    ValidationError,
    AuthorizationDeclined,
    DerivationError,
    SigningError,

    // Request surface
    InvalidRequest,
    Internal,
}

impl ErrorCode {
    /// Stable code string, identical to the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MalformedTransaction => "malformed_transaction",
            ErrorCode::UnsupportedScriptType => "unsupported_script_type",
            ErrorCode::AccountNotFound => "account_not_found",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::AuthorizationDeclined => "authorization_declined",
            ErrorCode::DerivationError => "derivation_error",
            ErrorCode::SigningError => "signing_error",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::Internal => "internal",
        }
    }

    /// Fixed human-readable description shown to callers
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::MalformedTransaction => "The transaction is not a well-formed PSBT for the current network",
            ErrorCode::UnsupportedScriptType => "The transaction uses a script type that cannot be signed",
            ErrorCode::AccountNotFound => "A signer address does not belong to any known account",
            ErrorCode::ValidationError => "The transaction does not match the signer addresses or is already signed",
            ErrorCode::AuthorizationDeclined => "The signing request was rejected",
            ErrorCode::DerivationError => "The account key could not be derived",
            ErrorCode::SigningError => "The transaction could not be fully signed",
            ErrorCode::InvalidRequest => "The request is invalid or the method is not supported",
            ErrorCode::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for signer operations
pub type SignerResult<T> = Result<T, SignerError>;

// Conversions from common error types

impl From<serde_json::Error> for SignerError {
    fn from(e: serde_json::Error) -> Self {
        SignerError::invalid_request(format!("JSON error: {}", e))
    }
}

impl From<bitcoin::bip32::Error> for SignerError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        SignerError::derivation(format!("BIP32 error: {}", e))
    }
}

impl From<bip39::Error> for SignerError {
    fn from(e: bip39::Error) -> Self {
        SignerError::derivation(format!("BIP39 error: {}", e))
    }
}

impl From<crate::wallet::DerivationError> for SignerError {
    fn from(e: crate::wallet::DerivationError) -> Self {
        SignerError::derivation(e.to_string())
    }
}

impl From<crate::tx::PsbtError> for SignerError {
    fn from(e: crate::tx::PsbtError) -> Self {
        SignerError::malformed_transaction(e.to_string())
    }
}

impl From<crate::crypto::TweakError> for SignerError {
    fn from(e: crate::crypto::TweakError) -> Self {
        SignerError::derivation(format!("Taproot tweak failed: {}", e))
    }
}

impl From<crate::message_signer::MessageSignError> for SignerError {
    fn from(e: crate::message_signer::MessageSignError) -> Self {
        SignerError::signing(e.to_string())
    }
}

impl From<crate::lightning::LightningError> for SignerError {
    fn from(e: crate::lightning::LightningError) -> Self {
        match e {
            crate::lightning::LightningError::InvalidInvoice(_) => {
                SignerError::invalid_request(e.to_string())
            }
            _ => SignerError::signing(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization_hides_details() {
        let err = SignerError::signing("input 3 has no signature")
            .with_details("secp256k1: malformed signature");

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("signing_error"));
        assert!(json.contains(ErrorCode::SigningError.description()));
        assert!(!json.contains("secp256k1"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            ErrorCode::MalformedTransaction,
            ErrorCode::UnsupportedScriptType,
            ErrorCode::AccountNotFound,
            ErrorCode::ValidationError,
            ErrorCode::AuthorizationDeclined,
            ErrorCode::DerivationError,
            ErrorCode::SigningError,
        ];
        let unique: std::collections::HashSet<_> = codes.iter().map(|c| c.as_str()).collect();
        assert_eq!(unique.len(), codes.len());

        for code in codes {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_display_uses_fixed_message() {
        let err = SignerError::account_not_found("bc1qexample");
        assert_eq!(
            err.to_string(),
            format!("[account_not_found] {}", ErrorCode::AccountNotFound.description())
        );
        assert!(err == ErrorCode::AccountNotFound);
    }
}
