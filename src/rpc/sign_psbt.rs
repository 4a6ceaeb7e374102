//! `btc_signPsbt` handler
//!
//! One request runs start to finish on the calling thread:
//!
//! ```text
//! Received -> Parsed -> Summarized -> Validated -> Authorized -> Signed -> Finalized
//!                                         |
//!                                         +-> Rejected
//! ```
//!
//! Any step may instead end in `Failed(code)`. Keys are derived only after
//! approval and are erased when the signers drop at the end of the request.

use bitcoin::secp256k1::{All, Secp256k1};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, SignerError, SignerResult};
use crate::signing::AccountSigner;
use crate::tx::{classify_account, BtcTx, ScriptType};
use crate::types::{Account, BtcNetwork, FinalizedTransaction};
use crate::wallet::{derive, AccountPath, RootSecret};
use crate::{log_info, log_warn};

use super::collaborators::{AccountDirectory, Authorizer, ConfirmationPrompt, NetworkSelector};

const MODULE: &str = "rpc::sign_psbt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPsbtParams {
    /// Base64 or hex PSBT
    pub psbt: String,
    pub signer_addresses: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Parsed,
    Summarized,
    Validated,
    Authorized,
    Signed,
    Finalized,
    Rejected,
    Failed(ErrorCode),
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Finalized | RequestState::Rejected | RequestState::Failed(_)
        )
    }

    fn can_advance_to(self, next: RequestState) -> bool {
        use RequestState::*;
        match (self, next) {
            (Received, Parsed)
            | (Parsed, Summarized)
            | (Summarized, Validated)
            | (Validated, Authorized)
            | (Validated, Rejected)
            | (Authorized, Signed)
            | (Signed, Finalized) => true,
            (current, Failed(_)) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// State history of a single request
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    history: Vec<RequestState>,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            history: vec![RequestState::Received],
        }
    }

    pub fn state(&self) -> RequestState {
        self.history
            .last()
            .copied()
            .unwrap_or(RequestState::Received)
    }

    pub fn history(&self) -> &[RequestState] {
        &self.history
    }

    fn advance(&mut self, next: RequestState) -> SignerResult<()> {
        let current = self.state();
        if !current.can_advance_to(next) {
            return Err(SignerError::internal(format!(
                "invalid transition {:?} -> {:?}",
                current, next
            )));
        }
        log_info!(MODULE, "Request state", state = format!("{:?}", next));
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self, error: &SignerError) {
        if !self.state().is_terminal() {
            self.history.push(RequestState::Failed(error.code));
        }
    }
}

/// Everything a signing pass reads, fixed for the length of the request
pub struct SigningContext {
    pub network: BtcNetwork,
    pub authorizing_addresses: Vec<String>,
    pub tx: BtcTx,
}

/// Process-level dependencies of the handler
pub struct SigningServices<'a> {
    pub secp: &'a Secp256k1<All>,
    pub root: &'a RootSecret,
    pub network: &'a dyn NetworkSelector,
    pub accounts: &'a dyn AccountDirectory,
    pub authorizer: &'a dyn Authorizer,
    /// Larger PSBTs are refused before summarizing
    pub max_inputs: usize,
}

pub fn sign_psbt(
    services: &SigningServices<'_>,
    origin: &str,
    params: &SignPsbtParams,
) -> SignerResult<FinalizedTransaction> {
    let mut lifecycle = RequestLifecycle::new();
    sign_psbt_tracked(services, origin, params, &mut lifecycle)
}

/// [`sign_psbt`], recording every state the request passes through
pub fn sign_psbt_tracked(
    services: &SigningServices<'_>,
    origin: &str,
    params: &SignPsbtParams,
    lifecycle: &mut RequestLifecycle,
) -> SignerResult<FinalizedTransaction> {
    let result = run(services, origin, params, lifecycle);
    match &result {
        Ok(finalized) => {
            log_info!(MODULE, "PSBT signed", tx_id = finalized.tx_id, origin = origin);
        }
        Err(e) => {
            lifecycle.fail(e);
            log_warn!(
                MODULE,
                "PSBT signing failed",
                code = e.code,
                reason = e.details.as_deref().unwrap_or("-")
            );
        }
    }
    result
}

fn run(
    services: &SigningServices<'_>,
    origin: &str,
    params: &SignPsbtParams,
    lifecycle: &mut RequestLifecycle,
) -> SignerResult<FinalizedTransaction> {
    let network = services.network.current_network();

    let tx = BtcTx::parse(&params.psbt, network)?;
    if tx.input_count() > services.max_inputs {
        return Err(SignerError::validation(format!(
            "{} inputs exceeds the limit of {}",
            tx.input_count(),
            services.max_inputs
        )));
    }
    lifecycle.advance(RequestState::Parsed)?;

    let summary = tx.summarize();
    lifecycle.advance(RequestState::Summarized)?;

    let authorizing_addresses = dedup(&params.signer_addresses);
    let accounts = resolve_accounts(services.accounts, &authorizing_addresses)?;

    let context = SigningContext {
        network,
        authorizing_addresses,
        tx,
    };
    context.tx.validate(&context.authorizing_addresses)?;
    lifecycle.advance(RequestState::Validated)?;

    let prompt = ConfirmationPrompt::new("Sign Bitcoin transaction")
        .entries(summary.entries().iter().cloned())
        .entry("Signers", context.authorizing_addresses.join(", "));
    if !services.authorizer.confirm(origin, &prompt) {
        lifecycle.advance(RequestState::Rejected)?;
        log_info!(MODULE, "Signing declined", origin = origin);
        return Err(SignerError::authorization_declined());
    }
    lifecycle.advance(RequestState::Authorized)?;

    let signers = accounts
        .into_iter()
        .map(|(account, script_type)| {
            let signer = account_signer(services, context.network, &account, script_type)?;
            Ok((account, signer))
        })
        .collect::<SignerResult<Vec<_>>>()?;

    let finalized = context.tx.sign(services.secp, &signers)?;
    lifecycle.advance(RequestState::Signed)?;
    drop(signers);
    lifecycle.advance(RequestState::Finalized)?;

    Ok(finalized)
}

/// Look up every authorizing address and classify its account. Runs before
/// any key is derived.
fn resolve_accounts(
    directory: &dyn AccountDirectory,
    addresses: &[String],
) -> SignerResult<Vec<(Account, ScriptType)>> {
    let known = directory.accounts();
    addresses
        .iter()
        .map(|address| {
            let account = known
                .iter()
                .find(|a| a.address == *address)
                .cloned()
                .ok_or_else(|| SignerError::account_not_found(address.clone()))?;
            let script_type = classify_account(&account)?;
            Ok((account, script_type))
        })
        .collect()
}

/// Derive an account key and wrap it, tweaked when the account is Taproot
pub(crate) fn account_signer(
    services: &SigningServices<'_>,
    network: BtcNetwork,
    account: &Account,
    script_type: ScriptType,
) -> SignerResult<AccountSigner> {
    let path = AccountPath::from_segments(&account.derivation_path)?;
    let key = derive(services.secp, services.root, network, &path)?;
    AccountSigner::for_script_type(services.secp, key, script_type)
}

fn dedup(addresses: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(addresses.len());
    for address in addresses {
        let address = address.trim().to_string();
        if !seen.contains(&address) {
            seen.push(address);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use RequestState::*;
        assert!(Received.can_advance_to(Parsed));
        assert!(Validated.can_advance_to(Rejected));
        assert!(Validated.can_advance_to(Authorized));
        assert!(!Validated.can_advance_to(Signed));
        assert!(!Rejected.can_advance_to(Authorized));
        assert!(!Finalized.can_advance_to(Failed(ErrorCode::Internal)));
        assert!(Parsed.can_advance_to(Failed(ErrorCode::ValidationError)));
    }

    #[test]
    fn test_lifecycle_no_reentry() {
        let mut lifecycle = RequestLifecycle::new();
        lifecycle.advance(RequestState::Parsed).unwrap();
        assert!(lifecycle.advance(RequestState::Parsed).is_err());

        lifecycle.fail(&SignerError::validation("x"));
        assert_eq!(lifecycle.state(), RequestState::Failed(ErrorCode::ValidationError));

        // A terminal state is never replaced
        lifecycle.fail(&SignerError::internal("y"));
        assert_eq!(lifecycle.history().len(), 3);
    }

    #[test]
    fn test_dedup_keeps_order() {
        let input = vec!["b".to_string(), "a".to_string(), " b ".to_string()];
        assert_eq!(dedup(&input), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_params_shape() {
        let params: SignPsbtParams =
            serde_json::from_str(r#"{"psbt":"cHNidP8=","signerAddresses":["tb1qexample"]}"#).unwrap();
        assert_eq!(params.signer_addresses, vec!["tb1qexample".to_string()]);
    }
}
