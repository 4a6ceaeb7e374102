use std::path::PathBuf;

use clap::{Parser, Subcommand};
use psbt_signer::BtcNetwork;

#[derive(Parser, Debug)]
#[command(
    name = "psbt-signer",
    about = "Custodial Bitcoin signer for PSBTs, messages and Lightning invoices",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    #[arg(long, global = true, help = "path to a JSON settings file")]
    pub(crate) config: Option<PathBuf>,

    #[arg(long, global = true, help = "network override (mainnet, testnet, signet, regtest)")]
    pub(crate) network: Option<BtcNetwork>,

    #[arg(long, global = true, help = "emit debug logs")]
    pub(crate) debug: bool,

    #[arg(
        long,
        global = true,
        env = "PSBT_SIGNER_MNEMONIC",
        hide_env_values = true,
        help = "BIP39 mnemonic of the root secret"
    )]
    pub(crate) mnemonic: Option<String>,

    #[arg(long, global = true, help = "read the mnemonic from a file instead")]
    pub(crate) mnemonic_file: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "PSBT_SIGNER_PASSPHRASE",
        hide_env_values = true,
        default_value = "",
        help = "optional BIP39 passphrase"
    )]
    pub(crate) passphrase: String,

    #[arg(
        long = "purpose",
        global = true,
        help = "also register account 0 of this BIP purpose (44, 49, 84, 86); repeatable"
    )]
    pub(crate) purposes: Vec<u32>,

    #[arg(long, short = 'y', global = true, help = "approve every request without prompting")]
    pub(crate) yes: bool,

    #[arg(long, global = true, default_value = "cli", help = "origin shown in approval prompts")]
    pub(crate) origin: String,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Commands {
    /// Sign and finalize a PSBT
    SignPsbt {
        #[arg(long, help = "base64 or hex PSBT, '-' reads stdin")]
        psbt: String,

        #[arg(long = "signer", required = true, help = "authorizing account address; repeatable")]
        signers: Vec<String>,
    },

    /// Sign a message with an account key
    SignMessage {
        #[arg(long)]
        address: String,

        #[arg(long)]
        message: String,
    },

    /// Sign a BOLT-11 invoice with an account key
    SignInvoice {
        #[arg(long, help = "account whose key is the node key")]
        address: String,

        #[arg(long)]
        invoice: String,
    },

    /// List accounts on the current network
    Accounts,

    /// Derive the next native SegWit account
    AddAccount,

    /// Generate a new 12-word mnemonic
    NewSecret,

    /// Handle a raw JSON request, '-' or no argument reads stdin
    Rpc { request: Option<String> },
}
