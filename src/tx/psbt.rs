//! PSBT Transaction Model
//!
//! Parses a BIP-174 PSBT, classifies every input by the script of the
//! output it spends, checks the inputs against the authorizing addresses,
//! and signs and finalizes the inputs those addresses own.
//!
//! Signing is all-or-nothing: the extracted transaction is only returned
//! when every input ends the pass finalized.

use std::collections::HashSet;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bitcoin::blockdata::script::{Builder, PushBytesBuf};
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::key::{CompressedPublicKey, TweakedPublicKey};
use bitcoin::psbt::{self, Psbt};
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::{Address, Amount, OutPoint, ScriptBuf, Transaction, TxIn, TxOut, Witness};

use crate::error::{SignerError, SignerResult};
use crate::signing::{AccountSigner, Signature};
use crate::types::{Account, BtcNetwork, FinalizedTransaction};
use crate::{log_debug, log_warn};

use super::classifier::{classify_script, ScriptType};
use super::summary::TxSummary;

const MODULE: &str = "tx::psbt";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PsbtError {
    #[error("PSBT is neither base64 nor hex: {0}")]
    Encoding(String),

    #[error("Invalid PSBT: {0}")]
    Deserialize(String),

    #[error("Input {0} carries no previous output")]
    MissingUtxo(usize),

    #[error("Input {0} previous transaction does not match its outpoint")]
    UtxoMismatch(usize),

    #[error("Input {0} witness UTXO disagrees with its previous transaction")]
    ConflictingUtxo(usize),

    #[error("Input {0} spends a legacy output without its previous transaction")]
    MissingPreviousTransaction(usize),

    #[error("Input {0} amount exceeds the money supply")]
    InputAmountOutOfRange(usize),

    #[error("Output {0} amount exceeds the money supply")]
    OutputAmountOutOfRange(usize),
}

/// One input with the facts signing needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedInput {
    pub index: usize,
    pub outpoint: OutPoint,
    /// `None` only for inputs that arrived already finalized
    pub script_type: Option<ScriptType>,
    pub amount: Amount,
    pub script_pubkey: ScriptBuf,
    pub address: Option<String>,
    pub finalized: bool,
}

/// A parsed, not yet fully signed transaction
#[derive(Debug, Clone)]
pub struct BtcTx {
    psbt: Psbt,
    network: BtcNetwork,
    inputs: Vec<ClassifiedInput>,
}

impl BtcTx {
    /// Parse a base64 (BIP-174 text form) or hex encoded PSBT
    pub fn parse(serialized: &str, network: BtcNetwork) -> SignerResult<Self> {
        let bytes = decode_container(serialized)?;
        let psbt = Psbt::deserialize(&bytes).map_err(|e| PsbtError::Deserialize(e.to_string()))?;

        let inputs = psbt
            .inputs
            .iter()
            .zip(&psbt.unsigned_tx.input)
            .enumerate()
            .map(|(index, (input, txin))| classify_input(index, input, txin, network))
            .collect::<SignerResult<Vec<_>>>()?;

        if let Some(index) = psbt
            .unsigned_tx
            .output
            .iter()
            .position(|output| output.value > Amount::MAX_MONEY)
        {
            return Err(PsbtError::OutputAmountOutOfRange(index).into());
        }

        log_debug!(
            MODULE,
            "Parsed PSBT",
            inputs = inputs.len(),
            outputs = psbt.unsigned_tx.output.len()
        );

        Ok(Self {
            psbt,
            network,
            inputs,
        })
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    pub fn inputs(&self) -> &[ClassifiedInput] {
        &self.inputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.psbt.unsigned_tx.output.len()
    }

    /// Inputs that still need a signature
    pub fn unsigned_inputs(&self) -> impl Iterator<Item = &ClassifiedInput> {
        self.inputs.iter().filter(|input| !input.finalized)
    }

    pub fn summarize(&self) -> TxSummary {
        let inputs: Vec<(Option<String>, Amount)> = self
            .inputs
            .iter()
            .map(|input| (input.address.clone(), input.amount))
            .collect();
        TxSummary::build(self.network, &inputs, &self.psbt.unsigned_tx.output)
    }

    /// Check every unsigned input belongs to one of `authorizing_addresses`
    pub fn validate(&self, authorizing_addresses: &[String]) -> SignerResult<()> {
        if self.inputs.is_empty() {
            return Err(SignerError::validation("transaction has no inputs"));
        }
        if self.unsigned_inputs().next().is_none() {
            return Err(SignerError::validation("transaction is already fully signed"));
        }

        let authorized = authorizing_addresses
            .iter()
            .map(|address| address_script(address, self.network))
            .collect::<SignerResult<HashSet<_>>>()?;

        for input in self.unsigned_inputs() {
            if !authorized.contains(&input.script_pubkey) {
                return Err(SignerError::validation(format!(
                    "input {} is not owned by a signer address",
                    input.index
                )));
            }
        }

        // Sighash policy, checked ahead of the prompt
        for input in self.unsigned_inputs() {
            let psbt_input = &self.psbt.inputs[input.index];
            match input.script_type {
                Some(ScriptType::Taproot) => {
                    taproot_sighash(input.index, psbt_input)?;
                }
                Some(_) => {
                    ecdsa_sighash(input.index, psbt_input)?;
                }
                None => {}
            }
        }

        Ok(())
    }

    /// Sign every input owned by one of `signers`, in input order, then
    /// finalize and extract the transaction
    pub fn sign(
        self,
        secp: &Secp256k1<All>,
        signers: &[(Account, AccountSigner)],
    ) -> SignerResult<FinalizedTransaction> {
        let BtcTx {
            mut psbt,
            network,
            inputs,
        } = self;

        let owners = signers
            .iter()
            .map(|(account, signer)| Ok((address_script(&account.address, network)?, signer)))
            .collect::<SignerResult<Vec<_>>>()?;

        let prevouts: Vec<TxOut> = inputs
            .iter()
            .map(|input| TxOut {
                value: input.amount,
                script_pubkey: input.script_pubkey.clone(),
            })
            .collect();

        let unsigned_tx = psbt.unsigned_tx.clone();
        let mut cache = SighashCache::new(&unsigned_tx);

        for input in inputs.iter().filter(|input| !input.finalized) {
            let Some((_, signer)) = owners.iter().find(|(script, _)| *script == input.script_pubkey)
            else {
                continue;
            };
            let script_type = input.script_type.ok_or_else(|| {
                SignerError::unsupported_script_type(format!("input {}", input.index))
            })?;

            let finalization = sign_input(
                secp,
                &mut cache,
                &prevouts,
                &psbt.inputs[input.index],
                input,
                script_type,
                signer,
                network,
            )?;
            finalize_input(&mut psbt.inputs[input.index], finalization);

            log_debug!(MODULE, "Signed input", index = input.index, script_type = script_type);
        }

        if let Some(index) = psbt
            .inputs
            .iter()
            .position(|input| input.final_script_sig.is_none() && input.final_script_witness.is_none())
        {
            log_warn!(MODULE, "Input left unsigned", index = index);
            return Err(SignerError::signing(format!("input {} was not signed", index)));
        }

        let tx = psbt.extract_tx_unchecked_fee_rate();
        Ok(FinalizedTransaction {
            tx_id: tx.compute_txid().to_string(),
            tx_hex: serialize_hex(&tx),
        })
    }
}

/// Final fields for one input
struct Finalization {
    script_sig: Option<ScriptBuf>,
    witness: Option<Witness>,
}

#[allow(clippy::too_many_arguments)]
fn sign_input(
    secp: &Secp256k1<All>,
    cache: &mut SighashCache<&Transaction>,
    prevouts: &[TxOut],
    psbt_input: &psbt::Input,
    input: &ClassifiedInput,
    script_type: ScriptType,
    signer: &AccountSigner,
    network: BtcNetwork,
) -> SignerResult<Finalization> {
    let index = input.index;

    match (script_type, signer) {
        (ScriptType::Taproot, AccountSigner::Tweaked(tweaked)) => {
            let output_key = TweakedPublicKey::dangerous_assume_tweaked(tweaked.output_key());
            if ScriptBuf::new_p2tr_tweaked(output_key) != input.script_pubkey {
                return Err(SignerError::signing(format!(
                    "input {}: tweaked key does not match the output",
                    index
                )));
            }

            let sighash_type = taproot_sighash(index, psbt_input)?;
            let digest = cache
                .taproot_key_spend_signature_hash(index, &Prevouts::All(prevouts), sighash_type)
                .map_err(|e| SignerError::signing(format!("input {}: {}", index, e)))?
                .to_byte_array();

            let signature = match signer.sign(secp, digest, script_type.signature_scheme())? {
                Signature::Schnorr(signature) => signature,
                other => {
                    return Err(SignerError::signing(format!(
                        "input {}: unexpected {:?} signature",
                        index,
                        other.scheme()
                    )))
                }
            };
            secp.verify_schnorr(&signature, &Message::from_digest(digest), &tweaked.output_key())
                .map_err(|e| SignerError::signing(format!("input {}: {}", index, e)))?;

            let signature = bitcoin::taproot::Signature {
                signature,
                sighash_type,
            };
            Ok(Finalization {
                script_sig: None,
                witness: Some(Witness::p2tr_key_spend(&signature)),
            })
        }

        (ScriptType::Legacy | ScriptType::P2shSegwit | ScriptType::NativeSegwit, AccountSigner::Plain(plain)) => {
            let public_key = plain.public_key();
            if script_type.address_for(secp, &public_key, network).script_pubkey() != input.script_pubkey {
                return Err(SignerError::signing(format!(
                    "input {}: account key does not match the output",
                    index
                )));
            }

            let sighash_type = ecdsa_sighash(index, psbt_input)?;

            let wpkh_script = ScriptBuf::new_p2wpkh(&CompressedPublicKey(public_key).wpubkey_hash());
            let digest = match script_type {
                ScriptType::Legacy => cache
                    .legacy_signature_hash(index, &input.script_pubkey, sighash_type.to_u32())
                    .map_err(|e| SignerError::signing(format!("input {}: {}", index, e)))?
                    .to_byte_array(),
                _ => cache
                    .p2wpkh_signature_hash(index, &wpkh_script, input.amount, sighash_type)
                    .map_err(|e| SignerError::signing(format!("input {}: {}", index, e)))?
                    .to_byte_array(),
            };

            let signature = match signer.sign(secp, digest, script_type.signature_scheme())? {
                Signature::Ecdsa(signature) => signature,
                other => {
                    return Err(SignerError::signing(format!(
                        "input {}: unexpected {:?} signature",
                        index,
                        other.scheme()
                    )))
                }
            };
            secp.verify_ecdsa(&Message::from_digest(digest), &signature, &public_key)
                .map_err(|e| SignerError::signing(format!("input {}: {}", index, e)))?;

            let signature = bitcoin::ecdsa::Signature {
                signature,
                sighash_type,
            };

            match script_type {
                ScriptType::Legacy => {
                    let sig_push = push_bytes(signature.to_vec())?;
                    let script_sig = Builder::new()
                        .push_slice(sig_push)
                        .push_key(&bitcoin::PublicKey::new(public_key))
                        .into_script();
                    Ok(Finalization {
                        script_sig: Some(script_sig),
                        witness: None,
                    })
                }
                ScriptType::P2shSegwit => {
                    let redeem_push = push_bytes(wpkh_script.to_bytes())?;
                    Ok(Finalization {
                        script_sig: Some(Builder::new().push_slice(redeem_push).into_script()),
                        witness: Some(Witness::p2wpkh(&signature, &public_key)),
                    })
                }
                _ => Ok(Finalization {
                    script_sig: None,
                    witness: Some(Witness::p2wpkh(&signature, &public_key)),
                }),
            }
        }

        (script_type, signer) => Err(SignerError::signing(format!(
            "input {}: {:?} signer cannot sign a {} input",
            index,
            signer.scheme(),
            script_type
        ))),
    }
}

/// SIGHASH_ALL only. NONE, SINGLE and ANYONECANPAY leave outputs or other
/// inputs uncommitted, and legacy SINGLE past the last output signs a
/// constant digest.
fn ecdsa_sighash(index: usize, input: &psbt::Input) -> SignerResult<EcdsaSighashType> {
    let Some(requested) = input.sighash_type else {
        return Ok(EcdsaSighashType::All);
    };
    match requested.ecdsa_hash_ty() {
        Ok(EcdsaSighashType::All) => Ok(EcdsaSighashType::All),
        _ => Err(uncommitted_sighash(index, requested)),
    }
}

/// SIGHASH_DEFAULT or SIGHASH_ALL only
fn taproot_sighash(index: usize, input: &psbt::Input) -> SignerResult<TapSighashType> {
    let Some(requested) = input.sighash_type else {
        return Ok(TapSighashType::Default);
    };
    match requested.taproot_hash_ty() {
        Ok(ty @ (TapSighashType::Default | TapSighashType::All)) => Ok(ty),
        _ => Err(uncommitted_sighash(index, requested)),
    }
}

fn uncommitted_sighash(index: usize, requested: psbt::PsbtSighashType) -> SignerError {
    log_warn!(MODULE, "Refused sighash type", index = index, sighash = requested.to_u32());
    SignerError::signing(format!(
        "input {}: sighash type 0x{:02x} does not commit to the whole transaction",
        index,
        requested.to_u32()
    ))
}

/// Write the final fields and clear everything else BIP-174 says a
/// finalizer removes
fn finalize_input(input: &mut psbt::Input, finalization: Finalization) {
    input.final_script_sig = finalization.script_sig;
    input.final_script_witness = finalization.witness;

    input.partial_sigs.clear();
    input.sighash_type = None;
    input.redeem_script = None;
    input.witness_script = None;
    input.bip32_derivation.clear();
    input.tap_key_sig = None;
    input.tap_script_sigs.clear();
    input.tap_scripts.clear();
    input.tap_key_origins.clear();
    input.tap_internal_key = None;
    input.tap_merkle_root = None;
}

fn push_bytes(bytes: Vec<u8>) -> SignerResult<PushBytesBuf> {
    PushBytesBuf::try_from(bytes).map_err(|e| SignerError::signing(e.to_string()))
}

fn decode_container(serialized: &str) -> Result<Vec<u8>, PsbtError> {
    let trimmed = serialized.trim();
    if trimmed.is_empty() {
        return Err(PsbtError::Encoding("empty input".to_string()));
    }

    if trimmed.len() % 2 == 0 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return hex::decode(trimmed).map_err(|e| PsbtError::Encoding(e.to_string()));
    }

    BASE64
        .decode(trimmed)
        .map_err(|e| PsbtError::Encoding(e.to_string()))
}

fn classify_input(
    index: usize,
    input: &psbt::Input,
    txin: &TxIn,
    network: BtcNetwork,
) -> SignerResult<ClassifiedInput> {
    let prevout = previous_output(index, input, txin)?;
    if prevout.value > Amount::MAX_MONEY {
        return Err(PsbtError::InputAmountOutOfRange(index).into());
    }
    let finalized = input.final_script_sig.is_some() || input.final_script_witness.is_some();

    let script_type = match classify_script(&prevout.script_pubkey) {
        Ok(script_type) => {
            if !finalized {
                check_spend_path(index, script_type, input)?;
            }
            Some(script_type)
        }
        // Someone else already signed it; its type does not matter here
        Err(_) if finalized => None,
        Err(e) => {
            log_debug!(MODULE, "Unsupported input", index = index);
            return Err(e);
        }
    };

    let address = Address::from_script(&prevout.script_pubkey, network.to_bitcoin())
        .ok()
        .map(|address| address.to_string());

    Ok(ClassifiedInput {
        index,
        outpoint: txin.previous_output,
        script_type,
        amount: prevout.value,
        script_pubkey: prevout.script_pubkey,
        address,
        finalized,
    })
}

/// The spent output, preferring the full previous transaction since its
/// txid is checked against the outpoint
fn previous_output(index: usize, input: &psbt::Input, txin: &TxIn) -> Result<TxOut, PsbtError> {
    let from_prev_tx = match &input.non_witness_utxo {
        Some(prev_tx) => {
            if prev_tx.compute_txid() != txin.previous_output.txid {
                return Err(PsbtError::UtxoMismatch(index));
            }
            let output = prev_tx
                .output
                .get(txin.previous_output.vout as usize)
                .ok_or(PsbtError::UtxoMismatch(index))?;
            Some(output.clone())
        }
        None => None,
    };

    match (from_prev_tx, &input.witness_utxo) {
        (Some(prevout), Some(utxo)) if prevout != *utxo => Err(PsbtError::ConflictingUtxo(index)),
        (Some(prevout), _) => Ok(prevout),
        (None, Some(utxo)) => Ok(utxo.clone()),
        (None, None) => Err(PsbtError::MissingUtxo(index)),
    }
}

/// Only single-key spends are signed: Taproot key path, P2SH-P2WPKH.
/// Legacy sighashes do not commit to the amount, so the amount must come
/// from the txid-checked previous transaction.
fn check_spend_path(index: usize, script_type: ScriptType, input: &psbt::Input) -> SignerResult<()> {
    match script_type {
        ScriptType::Legacy if input.non_witness_utxo.is_none() => {
            Err(PsbtError::MissingPreviousTransaction(index).into())
        }
        ScriptType::Taproot if input.tap_merkle_root.is_some() || !input.tap_scripts.is_empty() => {
            Err(SignerError::unsupported_script_type(format!(
                "input {}: taproot script path",
                index
            )))
        }
        ScriptType::P2shSegwit => match &input.redeem_script {
            Some(redeem) if !redeem.is_p2wpkh() => Err(SignerError::unsupported_script_type(
                format!("input {}: redeem script is not P2WPKH", index),
            )),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

fn address_script(address: &str, network: BtcNetwork) -> SignerResult<ScriptBuf> {
    let address = Address::from_str(address.trim())
        .map_err(|e| SignerError::validation(format!("invalid address: {}", e)))?
        .require_network(network.to_bitcoin())
        .map_err(|e| SignerError::validation(format!("address not valid on {}: {}", network, e)))?;
    Ok(address.script_pubkey())
}
