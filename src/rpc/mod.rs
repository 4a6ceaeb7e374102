//! Request Router
//!
//! Requests arrive as `{"method": "...", "params": {...}}` and are decoded
//! into the closed [`RpcRequest`] union. Unknown methods fail to decode and
//! surface as `invalid_request`. Every key-using method goes through the
//! host's [`Authorizer`] before any key is derived.

pub mod collaborators;
pub mod sign_psbt;

use bitcoin::secp256k1::{All, Secp256k1};
use serde::{Deserialize, Serialize};

use crate::error::{SignerError, SignerResult};
use crate::lightning;
use crate::message_signer;
use crate::tx::{classify_account, ScriptType};
use crate::types::{Account, ApiResponse, BtcNetwork, FinalizedTransaction, SignedInvoice, SignedMessage};
use crate::utils::config::SignerSettings;
use crate::wallet::{
    derive, derive_account, AccountPath, InMemoryAccounts, NetworkStore, PrivateKeyHandle, RootSecret,
};
use crate::{log_debug, log_info, log_warn};

pub use collaborators::*;
pub use sign_psbt::{
    sign_psbt, sign_psbt_tracked, RequestLifecycle, RequestState, SignPsbtParams, SigningContext,
    SigningServices,
};

const MODULE: &str = "rpc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkAction {
    Get,
    Set,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub action: NetworkAction,
    #[serde(default)]
    pub network: Option<BtcNetwork>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessageParams {
    pub signer_address: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInvoiceParams {
    /// Account whose key acts as the node key
    pub signer_address: String,
    pub invoice: String,
}

/// Every method the signer answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RpcRequest {
    #[serde(rename = "btc_signPsbt")]
    SignPsbt(SignPsbtParams),
    #[serde(rename = "btc_network")]
    Network(NetworkParams),
    #[serde(rename = "btc_getAccounts")]
    GetAccounts,
    #[serde(rename = "btc_addAccount")]
    AddAccount,
    #[serde(rename = "btc_signMessage")]
    SignMessage(SignMessageParams),
    #[serde(rename = "btc_signLNInvoice")]
    SignInvoice(SignInvoiceParams),
}

impl RpcRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::SignPsbt(_) => "btc_signPsbt",
            RpcRequest::Network(_) => "btc_network",
            RpcRequest::GetAccounts => "btc_getAccounts",
            RpcRequest::AddAccount => "btc_addAccount",
            RpcRequest::SignMessage(_) => "btc_signMessage",
            RpcRequest::SignInvoice(_) => "btc_signLNInvoice",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub network: BtcNetwork,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RpcResult {
    Transaction(FinalizedTransaction),
    Network(NetworkState),
    Accounts(Vec<Account>),
    Account(Account),
    Message(SignedMessage),
    Invoice(SignedInvoice),
}

/// Process-wide signer state, created once by the entry point
pub struct Engine {
    secp: Secp256k1<All>,
    root: RootSecret,
    settings: SignerSettings,
    network: NetworkStore,
    accounts: InMemoryAccounts,
    authorizer: Box<dyn Authorizer>,
}

impl Engine {
    /// Engine on the configured network, seeded with its first accounts
    pub fn new(
        root: RootSecret,
        settings: SignerSettings,
        authorizer: Box<dyn Authorizer>,
    ) -> SignerResult<Self> {
        settings.validate()?;
        let secp = Secp256k1::new();
        let accounts =
            InMemoryAccounts::bootstrap(&secp, &root, settings.network, settings.initial_accounts)?;
        log_info!(
            MODULE,
            "Signer ready",
            network = settings.network,
            accounts = settings.initial_accounts
        );
        Ok(Self {
            secp,
            root,
            network: NetworkStore::new(settings.network),
            settings,
            accounts,
            authorizer,
        })
    }

    /// Register extra accounts (for example other script types)
    pub fn with_accounts(self, accounts: Vec<Account>) -> Self {
        for account in accounts {
            self.accounts.insert(account);
        }
        self
    }

    /// Register account `index` of another script type on the current network.
    /// Startup configuration only, no approval is asked.
    pub fn register_account(&self, script_type: ScriptType, index: u32) -> SignerResult<Account> {
        let account = derive_account(&self.secp, &self.root, self.network(), script_type, index)?;
        self.accounts.insert(account.clone());
        Ok(account)
    }

    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    pub fn network(&self) -> BtcNetwork {
        self.network.current_network()
    }

    pub fn services(&self) -> SigningServices<'_> {
        SigningServices {
            secp: &self.secp,
            root: &self.root,
            network: &self.network,
            accounts: &self.accounts,
            authorizer: self.authorizer.as_ref(),
            max_inputs: self.settings.max_inputs,
        }
    }

    pub fn handle(&self, origin: &str, request: RpcRequest) -> SignerResult<RpcResult> {
        log_debug!(MODULE, "Request", method = request.method(), origin = origin);

        let result = match request {
            RpcRequest::SignPsbt(params) => {
                sign_psbt(&self.services(), origin, &params).map(RpcResult::Transaction)
            }
            RpcRequest::Network(params) => self.handle_network(origin, params).map(RpcResult::Network),
            RpcRequest::GetAccounts => Ok(RpcResult::Accounts(self.current_accounts())),
            RpcRequest::AddAccount => self.add_account(origin).map(RpcResult::Account),
            RpcRequest::SignMessage(params) => {
                self.sign_message(origin, params).map(RpcResult::Message)
            }
            RpcRequest::SignInvoice(params) => {
                self.sign_invoice(origin, params).map(RpcResult::Invoice)
            }
        };

        if let Err(e) = &result {
            log_warn!(MODULE, "Request failed", code = e.code, origin = origin);
        }
        result
    }

    /// Decode, dispatch and wrap the outcome as an [`ApiResponse`] JSON string
    pub fn handle_json(&self, origin: &str, raw: &str) -> String {
        let response: ApiResponse<RpcResult> = serde_json::from_str::<RpcRequest>(raw)
            .map_err(SignerError::from)
            .and_then(|request| self.handle(origin, request))
            .into();
        response.to_json()
    }

    fn handle_network(&self, origin: &str, params: NetworkParams) -> SignerResult<NetworkState> {
        match params.action {
            NetworkAction::Get => Ok(NetworkState {
                network: self.network(),
            }),
            NetworkAction::Set => {
                let next = params
                    .network
                    .ok_or_else(|| SignerError::invalid_request("network is required for set"))?;
                let prompt = ConfirmationPrompt::new("Switch Bitcoin network")
                    .entry("From", self.network().to_string())
                    .entry("To", next.to_string());
                self.authorize(origin, &prompt)?;

                let previous = self.network.set(next);
                log_info!(MODULE, "Network switched", from = previous, to = next);
                Ok(NetworkState { network: next })
            }
        }
    }

    /// Accounts whose coin type matches the current network
    fn current_accounts(&self) -> Vec<Account> {
        let coin_type = self.network().coin_type();
        self.accounts
            .accounts()
            .into_iter()
            .filter(|a| {
                AccountPath::from_segments(&a.derivation_path)
                    .map(|p| p.coin_type() == coin_type)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn add_account(&self, origin: &str) -> SignerResult<Account> {
        let network = self.network();
        let prompt = ConfirmationPrompt::new("Add Bitcoin account").entry("Network", network.to_string());
        self.authorize(origin, &prompt)?;

        let account = self.accounts.add_account(&self.secp, &self.root, network)?;
        log_info!(MODULE, "Account added", address = account.address, path = account.path_string());
        Ok(account)
    }

    fn sign_message(&self, origin: &str, params: SignMessageParams) -> SignerResult<SignedMessage> {
        let (account, script_type) = self.lookup(&params.signer_address)?;
        if script_type == ScriptType::Taproot {
            return Err(SignerError::unsupported_script_type(
                "message signing is not defined for taproot accounts",
            ));
        }

        let prompt = ConfirmationPrompt::new("Sign message")
            .entry("Address", account.address.clone())
            .entry("Message", params.message.clone());
        self.authorize(origin, &prompt)?;

        let key = self.account_key(&account)?;
        let signature = message_signer::sign_message(&self.secp, &key, script_type, &params.message)?;
        Ok(SignedMessage {
            address: account.address,
            message: params.message,
            signature,
        })
    }

    fn sign_invoice(&self, origin: &str, params: SignInvoiceParams) -> SignerResult<SignedInvoice> {
        let (account, _) = self.lookup(&params.signer_address)?;

        let prompt = ConfirmationPrompt::new("Sign Lightning invoice")
            .entry("Node account", account.address.clone())
            .entry("Invoice", params.invoice.clone());
        self.authorize(origin, &prompt)?;

        let key = self.account_key(&account)?;
        let invoice = lightning::sign_invoice(&self.secp, &key, &params.invoice, self.network())?;
        Ok(SignedInvoice { invoice })
    }

    fn lookup(&self, address: &str) -> SignerResult<(Account, ScriptType)> {
        let account = self
            .accounts
            .find(address.trim())
            .ok_or_else(|| SignerError::account_not_found(address))?;
        let script_type = classify_account(&account)?;
        Ok((account, script_type))
    }

    fn account_key(&self, account: &Account) -> SignerResult<PrivateKeyHandle> {
        let path = AccountPath::from_segments(&account.derivation_path)?;
        Ok(derive(&self.secp, &self.root, self.network(), &path)?)
    }

    fn authorize(&self, origin: &str, prompt: &ConfirmationPrompt) -> SignerResult<()> {
        if self.authorizer.confirm(origin, prompt) {
            Ok(())
        } else {
            log_info!(MODULE, "Request declined", origin = origin, title = prompt.title);
            Err(SignerError::authorization_declined())
        }
    }
}
