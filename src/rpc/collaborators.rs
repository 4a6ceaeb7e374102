//! Request Collaborators
//!
//! The host supplies the approval step. Accounts and the current network
//! come from the wallet stores, re-exported here so handlers depend on the
//! traits only.

use serde::Serialize;

pub use crate::wallet::{AccountDirectory, NetworkSelector};

/// What the user is asked to approve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationPrompt {
    pub title: String,
    pub entries: Vec<(String, String)>,
}

impl ConfirmationPrompt {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entries: Vec::new(),
        }
    }

    pub fn entry(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((field.into(), value.into()));
        self
    }

    pub fn entries<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.entries.extend(entries);
        self
    }

    pub fn render(&self) -> String {
        let mut out = self.title.clone();
        for (field, value) in &self.entries {
            out.push_str(&format!("\n  {}: {}", field, value));
        }
        out
    }
}

/// External approval step. `origin` identifies the requesting party.
pub trait Authorizer: Send + Sync {
    fn confirm(&self, origin: &str, prompt: &ConfirmationPrompt) -> bool;
}

/// Approves every request (non-interactive use with an explicit opt-in)
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl Authorizer for AutoApprove {
    fn confirm(&self, _origin: &str, _prompt: &ConfirmationPrompt) -> bool {
        true
    }
}

/// Declines every request
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDecline;

impl Authorizer for AutoDecline {
    fn confirm(&self, _origin: &str, _prompt: &ConfirmationPrompt) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_render() {
        let prompt = ConfirmationPrompt::new("Sign transaction")
            .entry("Network", "testnet")
            .entries(vec![("Fee".to_string(), "0.00001 BTC".to_string())]);
        assert_eq!(prompt.render(), "Sign transaction\n  Network: testnet\n  Fee: 0.00001 BTC");
        assert!(AutoApprove.confirm("cli", &prompt));
        assert!(!AutoDecline.confirm("cli", &prompt));
    }
}
