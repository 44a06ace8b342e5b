use ethers::types::U256;

pub use escalator::{EscalationConfig, FeeEscalator};

mod escalator;

/// EIP-1559 fee caps offered for a single submission attempt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeCaps {
    pub max_fee: U256,
    pub max_priority_fee: U256,
}

impl FeeCaps {
    pub fn new(max_fee: U256, max_priority_fee: U256) -> Self {
        Self {
            max_fee,
            max_priority_fee,
        }
    }

    /// Builds fee caps from gwei denominated values.
    pub fn from_gwei(max_fee_gwei: u64, max_priority_fee_gwei: u64) -> Self {
        Self {
            max_fee: gwei(max_fee_gwei),
            max_priority_fee: gwei(max_priority_fee_gwei),
        }
    }
}

fn gwei(value: u64) -> U256 {
    U256::from(value).saturating_mul(U256::exp10(9))
}
