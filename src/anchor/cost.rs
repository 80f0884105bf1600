/// Transaction cost estimation.
///
/// Pure integer arithmetic in the smallest chain unit; no floating point
/// is involved anywhere between configuration and the built transaction.
use serde::{Deserialize, Serialize};

use crate::funding::Amount;

/// Assumes a compressed public key in each P2PKH input.
pub const BYTES_PER_INPUT: u64 = 148;
pub const BYTES_PER_OUTPUT: u64 = 34;
pub const FIXED_EXTRA_BYTES: u64 = 10;
/// The OP_RETURN output always carries a 32-byte hash, so its size is fixed.
pub const OP_RETURN_BYTE_COUNT: u64 = 43;

pub trait CostEstimator: Send + Sync {
    /// Fee for a transaction with the given input and output counts.
    fn estimate(&self, num_inputs: usize, num_outputs: usize) -> Amount;
}

/// Fee parameters for Bitcoin-style chains, in satoshis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitcoinCostConstants {
    pub satoshi_per_byte: u64,
    /// Floor applied to the size-based fee.
    pub recommended_fee: u64,
    /// Dust threshold; the minimum value of a payment output.
    pub min_per_output: u64,
}

impl Default for BitcoinCostConstants {
    fn default() -> Self {
        Self {
            satoshi_per_byte: 250,
            recommended_fee: 60_000,
            min_per_output: 2_750,
        }
    }
}

impl BitcoinCostConstants {
    /// Upper-bound size estimate in bytes, including the OP_RETURN output.
    ///
    /// `inputs * 148 + outputs * 34 + 10 +/- inputs`, taking `+ inputs`.
    pub fn raw_tx_size(num_inputs: usize, num_outputs: usize) -> u64 {
        let inputs = num_inputs as u64;
        let outputs = num_outputs as u64;
        inputs * BYTES_PER_INPUT + outputs * BYTES_PER_OUTPUT + FIXED_EXTRA_BYTES + inputs
            + OP_RETURN_BYTE_COUNT
    }

    /// `max(satoshi_per_byte * size, recommended_fee)`.
    pub fn fee(&self, num_inputs: usize, num_outputs: usize) -> u64 {
        let size_fee = self
            .satoshi_per_byte
            .saturating_mul(Self::raw_tx_size(num_inputs, num_outputs));
        size_fee.max(self.recommended_fee)
    }
}

impl CostEstimator for BitcoinCostConstants {
    fn estimate(&self, num_inputs: usize, num_outputs: usize) -> Amount {
        Amount::from(self.fee(num_inputs, num_outputs))
    }
}

/// Fee parameters for account-model chains, in wei.
///
/// The gas limit is a configured ceiling, not a measurement, so the cost
/// does not depend on input or output counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthereumCostConstants {
    pub gas_price: u128,
    pub gas_limit: u64,
}

impl Default for EthereumCostConstants {
    fn default() -> Self {
        Self {
            gas_price: 20_000_000_000,
            gas_limit: 25_000,
        }
    }
}

impl EthereumCostConstants {
    pub fn max_cost(&self) -> Amount {
        self.gas_price.saturating_mul(Amount::from(self.gas_limit))
    }
}

impl CostEstimator for EthereumCostConstants {
    fn estimate(&self, _num_inputs: usize, _num_outputs: usize) -> Amount {
        self.max_cost()
    }
}
