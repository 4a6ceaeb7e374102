//! Transaction Summary
//!
//! Ordered, human-readable description of a PSBT shown to the
//! authorization step before anything is signed.

use bitcoin::amount::Denomination;
use bitcoin::{Address, Amount, TxOut};
use serde::Serialize;

use crate::types::BtcNetwork;

/// Ordered `field -> value` pairs plus the raw amounts they were built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxSummary {
    entries: Vec<(String, String)>,
    #[serde(skip)]
    input_amounts: Vec<u64>,
    #[serde(skip)]
    output_amounts: Vec<u64>,
}

impl TxSummary {
    /// Build a summary from previous outputs (`None` for an input whose
    /// address cannot be rendered) and the transaction outputs
    pub(crate) fn build(
        network: BtcNetwork,
        inputs: &[(Option<String>, Amount)],
        outputs: &[TxOut],
    ) -> Self {
        let mut entries = Vec::with_capacity(inputs.len() + outputs.len() + 6);
        entries.push(("Network".to_string(), network.to_string()));

        entries.push(("Inputs".to_string(), inputs.len().to_string()));
        for (i, (address, amount)) in inputs.iter().enumerate() {
            let address = address.as_deref().unwrap_or("unknown");
            entries.push((format!("Input #{}", i), format!("{} ({})", address, format_btc(*amount))));
        }

        entries.push(("Outputs".to_string(), outputs.len().to_string()));
        for (i, output) in outputs.iter().enumerate() {
            entries.push((
                format!("Output #{}", i),
                format!("{} ({})", describe_output(output, network), format_btc(output.value)),
            ));
        }

        let input_amounts: Vec<u64> = inputs.iter().map(|(_, amount)| amount.to_sat()).collect();
        let output_amounts: Vec<u64> = outputs.iter().map(|o| o.value.to_sat()).collect();
        let total_in = checked_total(&input_amounts);
        let total_out = checked_total(&output_amounts);

        entries.push(("Total Input".to_string(), format_total(total_in)));
        entries.push(("Total Output".to_string(), format_total(total_out)));

        // Outputs exceeding inputs is left for the network to reject
        let fee = match (total_in, total_out) {
            (Some(total_in), Some(total_out)) => match total_in.checked_sub(total_out) {
                Some(fee) => format_btc(Amount::from_sat(fee)),
                None => "invalid (outputs exceed inputs)".to_string(),
            },
            _ => "invalid (amount overflow)".to_string(),
        };
        entries.push(("Fee".to_string(), fee));

        Self {
            entries,
            input_amounts,
            output_amounts,
        }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn input_count(&self) -> usize {
        self.input_amounts.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_amounts.len()
    }

    /// Input amounts in satoshis, in input order
    pub fn input_amounts(&self) -> &[u64] {
        &self.input_amounts
    }

    /// Output amounts in satoshis, in output order
    pub fn output_amounts(&self) -> &[u64] {
        &self.output_amounts
    }

    /// `None` when outputs exceed inputs or a total does not fit in a `u64`
    pub fn fee(&self) -> Option<u64> {
        let total_in = checked_total(&self.input_amounts)?;
        let total_out = checked_total(&self.output_amounts)?;
        total_in.checked_sub(total_out)
    }
}

fn checked_total(amounts: &[u64]) -> Option<u64> {
    amounts
        .iter()
        .try_fold(0u64, |total, amount| total.checked_add(*amount))
}

fn format_total(total: Option<u64>) -> String {
    match total {
        Some(sats) => format_btc(Amount::from_sat(sats)),
        None => "invalid (amount overflow)".to_string(),
    }
}

fn format_btc(amount: Amount) -> String {
    amount
        .display_in(Denomination::Bitcoin)
        .show_denomination()
        .to_string()
}

fn describe_output(output: &TxOut, network: BtcNetwork) -> String {
    if output.script_pubkey.is_op_return() {
        return "OP_RETURN".to_string();
    }
    match Address::from_script(&output.script_pubkey, network.to_bitcoin()) {
        Ok(address) => address.to_string(),
        Err(_) => format!("script {}", output.script_pubkey.to_hex_string()),
    }
}
