use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest, U256,
};

use crate::gas_price::FeeCaps;

/// A call ready to be signed and submitted.
///
/// Fee caps and nonce are the only fields replaced between submission attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCall {
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: U256,
    pub fees: FeeCaps,
    pub nonce: U256,
    pub chain_id: u64,
}

impl PendingCall {
    pub fn new(
        to: Address,
        data: Bytes,
        gas_limit: U256,
        fees: FeeCaps,
        nonce: U256,
        chain_id: u64,
    ) -> Self {
        Self {
            to,
            data,
            gas_limit,
            fees,
            nonce,
            chain_id,
        }
    }

    /// The typed EIP-1559 transaction for this call, sent from `from`.
    pub fn to_typed_transaction(&self, from: Address) -> TypedTransaction {
        TypedTransaction::Eip1559(Eip1559TransactionRequest {
            from: Some(from),
            to: Some(self.to.into()),
            gas: Some(self.gas_limit),
            value: None,
            data: Some(self.data.clone()),
            nonce: Some(self.nonce),
            access_list: Default::default(),
            max_fee_per_gas: Some(self.fees.max_fee),
            max_priority_fee_per_gas: Some(self.fees.max_priority_fee),
            chain_id: Some(self.chain_id.into()),
        })
    }
}

/// Multiplies a gas estimate by `numerator / denominator`, rounding down.
pub fn pad_gas_limit(estimate: U256, numerator: u64, denominator: u64) -> U256 {
    estimate
        .saturating_mul(U256::from(numerator))
        .div_mod(U256::from(denominator.max(1)))
        .0
}
