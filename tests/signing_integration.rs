use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::deserialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, OutPoint, Psbt, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid};
use psbt_signer::rpc::{
    sign_psbt_tracked, RequestLifecycle, RequestState, SigningServices,
};
use psbt_signer::tx::{BtcTx, ScriptType};
use psbt_signer::wallet::{derive_account, InMemoryAccounts, NetworkStore};
use psbt_signer::{
    Account, Authorizer, BtcNetwork, ConfirmationPrompt, ErrorCode, RootSecret, SignPsbtParams,
};
use std::str::FromStr;

const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const NETWORK: BtcNetwork = BtcNetwork::Testnet;

/// Records every prompt and answers with a fixed decision
struct RecordingAuthorizer {
    approve: bool,
    prompts: Mutex<Vec<ConfirmationPrompt>>,
}

impl RecordingAuthorizer {
    fn new(approve: bool) -> Self {
        Self {
            approve,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl Authorizer for RecordingAuthorizer {
    fn confirm(&self, _origin: &str, prompt: &ConfirmationPrompt) -> bool {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.approve
    }
}

struct Fixture {
    secp: Secp256k1<bitcoin::secp256k1::All>,
    root: RootSecret,
    network: NetworkStore,
    accounts: InMemoryAccounts,
    segwit: Account,
    taproot: Account,
}

impl Fixture {
    fn new() -> Self {
        let secp = Secp256k1::new();
        let root = RootSecret::from_mnemonic(TEST_MNEMONIC, "").unwrap();
        let segwit = derive_account(&secp, &root, NETWORK, ScriptType::NativeSegwit, 0).unwrap();
        let taproot = derive_account(&secp, &root, NETWORK, ScriptType::Taproot, 0).unwrap();
        let accounts = InMemoryAccounts::with_accounts(vec![segwit.clone(), taproot.clone()]);
        Self {
            secp,
            root,
            network: NetworkStore::new(NETWORK),
            accounts,
            segwit,
            taproot,
        }
    }

    fn services<'a>(&'a self, authorizer: &'a dyn Authorizer) -> SigningServices<'a> {
        SigningServices {
            secp: &self.secp,
            root: &self.root,
            network: &self.network,
            accounts: &self.accounts,
            authorizer,
            max_inputs: 500,
        }
    }
}

fn script_of(address: &str) -> ScriptBuf {
    Address::from_str(address)
        .unwrap()
        .require_network(NETWORK.to_bitcoin())
        .unwrap()
        .script_pubkey()
}

/// PSBT spending `(script, sats)` prevouts into one change output
fn unsigned_psbt(prevouts: &[(ScriptBuf, u64)], change: &ScriptBuf, fee: u64) -> String {
    let total: u64 = prevouts.iter().map(|(_, v)| v).sum();
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: prevouts
            .iter()
            .enumerate()
            .map(|(i, _)| TxIn {
                previous_output: OutPoint::new(Txid::from_byte_array([0x40 + i as u8; 32]), i as u32),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                ..Default::default()
            })
            .collect(),
        output: vec![TxOut {
            value: Amount::from_sat(total - fee),
            script_pubkey: change.clone(),
        }],
    };
    let mut psbt = Psbt::from_unsigned_tx(tx).unwrap();
    for (input, (script, value)) in psbt.inputs.iter_mut().zip(prevouts) {
        input.witness_utxo = Some(TxOut {
            value: Amount::from_sat(*value),
            script_pubkey: script.clone(),
        });
    }
    BASE64.encode(psbt.serialize())
}

#[test]
fn signs_native_segwit_and_taproot_inputs() {
    let fixture = Fixture::new();
    let authorizer = RecordingAuthorizer::new(true);
    let segwit_script = script_of(&fixture.segwit.address);
    let taproot_script = script_of(&fixture.taproot.address);

    let psbt = unsigned_psbt(
        &[(segwit_script.clone(), 50_000), (taproot_script.clone(), 30_000)],
        &segwit_script,
        1_500,
    );
    let params = SignPsbtParams {
        psbt,
        signer_addresses: vec![fixture.segwit.address.clone(), fixture.taproot.address.clone()],
    };

    let mut lifecycle = RequestLifecycle::new();
    let finalized =
        sign_psbt_tracked(&fixture.services(&authorizer), "integration", &params, &mut lifecycle)
            .unwrap();

    assert_eq!(
        lifecycle.history(),
        &[
            RequestState::Received,
            RequestState::Parsed,
            RequestState::Summarized,
            RequestState::Validated,
            RequestState::Authorized,
            RequestState::Signed,
            RequestState::Finalized,
        ]
    );
    assert_eq!(authorizer.prompt_count(), 1);

    let tx: Transaction = deserialize_hex(&finalized.tx_hex).unwrap();
    assert_eq!(tx.compute_txid().to_string(), finalized.tx_id);
    assert_eq!(tx.input.len(), 2);

    // P2WPKH: signature + compressed pubkey; P2TR key path: one 64-byte signature
    assert_eq!(tx.input[0].witness.len(), 2);
    assert_eq!(tx.input[0].witness.nth(1).map(|k| k.len()), Some(33));
    assert_eq!(tx.input[1].witness.len(), 1);
    assert_eq!(tx.input[1].witness.nth(0).map(|s| s.len()), Some(64));
    assert!(tx.input.iter().all(|i| i.script_sig.is_empty()));
}

#[test]
fn prompt_shows_the_transaction_summary() {
    let fixture = Fixture::new();
    let authorizer = RecordingAuthorizer::new(false);
    let script = script_of(&fixture.segwit.address);
    let params = SignPsbtParams {
        psbt: unsigned_psbt(&[(script.clone(), 20_000)], &script, 700),
        signer_addresses: vec![fixture.segwit.address.clone()],
    };

    let _ = psbt_signer::sign_psbt(&fixture.services(&authorizer), "integration", &params);

    let prompts = authorizer.prompts.lock().unwrap();
    let fields: Vec<&str> = prompts[0].entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(
        fields,
        vec![
            "Network",
            "Inputs",
            "Input #0",
            "Outputs",
            "Output #0",
            "Total Input",
            "Total Output",
            "Fee",
            "Signers",
        ]
    );
}

#[test]
fn declined_request_is_rejected_without_signing() {
    let fixture = Fixture::new();
    let authorizer = RecordingAuthorizer::new(false);
    let script = script_of(&fixture.segwit.address);
    let params = SignPsbtParams {
        psbt: unsigned_psbt(&[(script.clone(), 20_000)], &script, 700),
        signer_addresses: vec![fixture.segwit.address.clone()],
    };

    let mut lifecycle = RequestLifecycle::new();
    let err = sign_psbt_tracked(&fixture.services(&authorizer), "integration", &params, &mut lifecycle)
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::AuthorizationDeclined);
    assert_eq!(lifecycle.state(), RequestState::Rejected);
    assert!(!lifecycle.history().contains(&RequestState::Authorized));
    assert!(!lifecycle.history().contains(&RequestState::Signed));
}

#[test]
fn unknown_signer_address_fails_before_prompt() {
    let fixture = Fixture::new();
    let authorizer = RecordingAuthorizer::new(true);
    let script = script_of(&fixture.segwit.address);

    let root = RootSecret::from_mnemonic(TEST_MNEMONIC, "").unwrap();
    let stranger = derive_account(&fixture.secp, &root, NETWORK, ScriptType::NativeSegwit, 7).unwrap();

    let params = SignPsbtParams {
        psbt: unsigned_psbt(&[(script.clone(), 20_000)], &script, 700),
        signer_addresses: vec![fixture.segwit.address.clone(), stranger.address],
    };

    let mut lifecycle = RequestLifecycle::new();
    let result = sign_psbt_tracked(&fixture.services(&authorizer), "integration", &params, &mut lifecycle);

    let err = result.unwrap_err();
    assert_eq!(err.code, ErrorCode::AccountNotFound);
    assert_eq!(lifecycle.state(), RequestState::Failed(ErrorCode::AccountNotFound));
    assert_eq!(authorizer.prompt_count(), 0);
}

#[test]
fn unsupported_account_type_fails_before_prompt() {
    let fixture = Fixture::new();
    let authorizer = RecordingAuthorizer::new(true);
    let script = script_of(&fixture.segwit.address);

    // BIP45 multisig path: nothing this signer can produce
    let odd = Account::new(
        "tb1qexampleaccount",
        ["m", "45'", "1'", "0'", "0", "0"].iter().map(|s| s.to_string()).collect(),
    );
    fixture.accounts.insert(odd.clone());

    let params = SignPsbtParams {
        psbt: unsigned_psbt(&[(script.clone(), 20_000)], &script, 700),
        signer_addresses: vec![odd.address],
    };
    let err = psbt_signer::sign_psbt(&fixture.services(&authorizer), "integration", &params).unwrap_err();

    assert_eq!(err.code, ErrorCode::UnsupportedScriptType);
    assert_eq!(authorizer.prompt_count(), 0);
}

#[test]
fn input_outside_authorized_set_is_a_validation_error() {
    let fixture = Fixture::new();
    let authorizer = RecordingAuthorizer::new(true);
    let segwit_script = script_of(&fixture.segwit.address);
    let taproot_script = script_of(&fixture.taproot.address);

    let params = SignPsbtParams {
        psbt: unsigned_psbt(
            &[(segwit_script.clone(), 10_000), (taproot_script, 10_000)],
            &segwit_script,
            500,
        ),
        signer_addresses: vec![fixture.segwit.address.clone()],
    };
    let err = psbt_signer::sign_psbt(&fixture.services(&authorizer), "integration", &params).unwrap_err();

    assert_eq!(err.code, ErrorCode::ValidationError);
    assert_eq!(authorizer.prompt_count(), 0);
}

#[test]
fn summary_reports_amounts_and_fee() {
    let fixture = Fixture::new();
    let script = script_of(&fixture.segwit.address);
    let psbt = unsigned_psbt(&[(script.clone(), 40_000), (script.clone(), 2_500)], &script, 1_000);

    let tx = BtcTx::parse(&psbt, NETWORK).unwrap();
    let summary = tx.summarize();

    assert_eq!(summary.input_count(), 2);
    assert_eq!(summary.output_count(), 1);
    assert_eq!(summary.input_amounts(), &[40_000, 2_500]);
    assert_eq!(summary.output_amounts(), &[41_500]);
    assert_eq!(summary.fee(), Some(1_000));
    assert_eq!(summary.get("Network"), Some("testnet"));
}

#[test]
fn oversized_psbt_is_refused() {
    let fixture = Fixture::new();
    let authorizer = RecordingAuthorizer::new(true);
    let script = script_of(&fixture.segwit.address);
    let prevouts: Vec<_> = (0..3).map(|_| (script.clone(), 1_000u64)).collect();

    let params = SignPsbtParams {
        psbt: unsigned_psbt(&prevouts, &script, 300),
        signer_addresses: vec![fixture.segwit.address.clone()],
    };
    let mut services = fixture.services(&authorizer);
    services.max_inputs = 2;

    let err = psbt_signer::sign_psbt(&services, "integration", &params).unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationError);
}

#[test]
fn sighash_none_is_refused_before_prompt() {
    let fixture = Fixture::new();
    let authorizer = RecordingAuthorizer::new(true);
    let script = script_of(&fixture.segwit.address);

    let encoded = unsigned_psbt(&[(script.clone(), 20_000)], &script, 700);
    let mut psbt = Psbt::deserialize(&BASE64.decode(encoded).unwrap()).unwrap();
    psbt.inputs[0].sighash_type = Some(EcdsaSighashType::None.into());

    let params = SignPsbtParams {
        psbt: BASE64.encode(psbt.serialize()),
        signer_addresses: vec![fixture.segwit.address.clone()],
    };
    let mut lifecycle = RequestLifecycle::new();
    let err = sign_psbt_tracked(&fixture.services(&authorizer), "integration", &params, &mut lifecycle)
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::SigningError);
    assert_eq!(authorizer.prompt_count(), 0);
    assert!(!lifecycle.history().contains(&RequestState::Validated));
}
