mod cli;

use std::io::{self, BufRead, Read, Write};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use psbt_signer::rpc::{SignInvoiceParams, SignMessageParams};
use psbt_signer::tx::classify;
use psbt_signer::utils::logging;
use psbt_signer::{
    generate_mnemonic, ApiResponse, AutoApprove, Authorizer, ConfirmationPrompt, Engine, RootSecret,
    RpcRequest, RpcResult, SignPsbtParams, SignerError, SignerSettings,
};
use serde::Serialize;
use zeroize::Zeroizing;

use crate::cli::{Cli, Commands};

/// Asks on the terminal. Anything but `y`/`yes` declines.
struct TerminalAuthorizer;

impl Authorizer for TerminalAuthorizer {
    fn confirm(&self, origin: &str, prompt: &ConfirmationPrompt) -> bool {
        let mut stderr = io::stderr();
        let _ = writeln!(stderr, "{}", prompt.render());
        let _ = write!(stderr, "Approve request from '{}'? [y/N] ", origin);
        let _ = stderr.flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

#[derive(Serialize)]
struct NewSecret {
    mnemonic: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the request succeeded
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut settings = SignerSettings::load(cli.config.as_deref())?;
    if let Some(network) = cli.network {
        settings.network = network;
    }
    if cli.debug {
        settings.debug = true;
    }
    logging::init(settings.debug, settings.redact_logs);

    if let Commands::NewSecret = cli.command {
        let mnemonic = generate_mnemonic()?;
        println!("{}", ApiResponse::ok(NewSecret { mnemonic }).to_json());
        return Ok(true);
    }

    let root = load_root_secret(&cli)?;
    let authorizer: Box<dyn Authorizer> = if cli.yes {
        Box::new(AutoApprove)
    } else {
        Box::new(TerminalAuthorizer)
    };
    let engine = Engine::new(root, settings, authorizer)?;
    for purpose in &cli.purposes {
        engine.register_account(classify(*purpose)?, 0)?;
    }

    let request = match cli.command {
        Commands::Rpc { request } => {
            let raw = match request.as_deref() {
                None | Some("-") => read_stdin()?,
                Some(raw) => raw.to_string(),
            };
            serde_json::from_str::<RpcRequest>(&raw).map_err(SignerError::from)
        }
        command => Ok(to_request(command)?),
    };

    let response: ApiResponse<RpcResult> = request
        .and_then(|request| engine.handle(&cli.origin, request))
        .into();
    println!("{}", response.to_json());
    Ok(response.success)
}

fn to_request(command: Commands) -> anyhow::Result<RpcRequest> {
    Ok(match command {
        Commands::SignPsbt { psbt, signers } => {
            let psbt = if psbt == "-" { read_stdin()? } else { psbt };
            RpcRequest::SignPsbt(SignPsbtParams {
                psbt: psbt.trim().to_string(),
                signer_addresses: signers,
            })
        }
        Commands::SignMessage { address, message } => {
            RpcRequest::SignMessage(SignMessageParams {
                signer_address: address,
                message,
            })
        }
        Commands::SignInvoice { address, invoice } => {
            RpcRequest::SignInvoice(SignInvoiceParams {
                signer_address: address,
                invoice,
            })
        }
        Commands::Accounts => RpcRequest::GetAccounts,
        Commands::AddAccount => RpcRequest::AddAccount,
        Commands::NewSecret | Commands::Rpc { .. } => bail!("not a signer request"),
    })
}

fn load_root_secret(cli: &Cli) -> anyhow::Result<RootSecret> {
    let phrase = match (&cli.mnemonic_file, &cli.mnemonic) {
        (Some(path), _) => Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("cannot read mnemonic file {}", path.display()))?,
        ),
        (None, Some(phrase)) => Zeroizing::new(phrase.clone()),
        (None, None) => bail!("no root secret: set PSBT_SIGNER_MNEMONIC or pass --mnemonic-file"),
    };
    Ok(RootSecret::from_mnemonic(phrase.trim(), &cli.passphrase)?)
}

fn read_stdin() -> anyhow::Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("cannot read stdin")?;
    Ok(buffer)
}
