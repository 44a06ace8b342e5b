//! Calldata for the token, faucet and trading router contracts.

use derive_new::new;
use ethers::{
    abi::{parse_abi, AbiError},
    contract::BaseContract,
    types::{Address, Bytes, U256},
};
use once_cell::sync::Lazy;

#[allow(clippy::expect_used)]
static ERC20: Lazy<BaseContract> = Lazy::new(|| {
    parse_abi(&[
        "function balanceOf(address owner) external view returns (uint256)",
        "function decimals() external view returns (uint8)",
        "function allowance(address owner, address spender) external view returns (uint256)",
        "function approve(address spender, uint256 amount) external returns (bool)",
    ])
    .expect("erc20 abi is valid")
    .into()
});

#[allow(clippy::expect_used)]
static FAUCET: Lazy<BaseContract> = Lazy::new(|| {
    parse_abi(&["function claim() external"])
        .expect("faucet abi is valid")
        .into()
});

#[allow(clippy::expect_used)]
static ROUTER: Lazy<BaseContract> = Lazy::new(|| {
    parse_abi(&[
        "function openPosition(uint256 idx, bytes proof, bool isLong, uint256 lev, uint256 size, uint256 sl, uint256 tp) external returns (uint256)",
    ])
    .expect("router abi is valid")
    .into()
});

/// An allowance at or above this is treated as unlimited.
pub fn unlimited_allowance_threshold() -> U256 {
    U256::MAX / 2
}

pub fn balance_of(owner: Address) -> Result<Bytes, AbiError> {
    ERC20.encode("balanceOf", owner)
}

pub fn decimals() -> Result<Bytes, AbiError> {
    ERC20.encode("decimals", ())
}

pub fn allowance(owner: Address, spender: Address) -> Result<Bytes, AbiError> {
    ERC20.encode("allowance", (owner, spender))
}

/// Approves `spender` for the maximum amount.
pub fn approve_unlimited(spender: Address) -> Result<Bytes, AbiError> {
    ERC20.encode("approve", (spender, U256::MAX))
}

pub fn claim() -> Result<Bytes, AbiError> {
    FAUCET.encode("claim", ())
}

pub fn decode_uint(function: &str, output: &Bytes) -> Result<U256, AbiError> {
    ERC20.decode_output(function, output)
}

pub fn decode_decimals(output: &Bytes) -> Result<u8, AbiError> {
    ERC20.decode_output("decimals", output)
}

/// A market order on the trading router: leverage 1, no stop loss or take profit.
#[derive(Clone, Debug, PartialEq, Eq, new)]
pub struct OpenPosition {
    pub pair_index: u64,
    pub proof: Bytes,
    pub is_long: bool,
    /// Collateral in token base units
    pub size: U256,
}

impl OpenPosition {
    const LEVERAGE: u64 = 1;

    pub fn encode(&self) -> Result<Bytes, AbiError> {
        ROUTER.encode(
            "openPosition",
            (
                U256::from(self.pair_index),
                self.proof.clone(),
                self.is_long,
                U256::from(Self::LEVERAGE),
                self.size,
                U256::zero(),
                U256::zero(),
            ),
        )
    }
}
