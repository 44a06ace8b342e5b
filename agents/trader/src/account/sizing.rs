use ethers::types::U256;
use rand::Rng;

/// A token amount together with the token's decimals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// `units` whole tokens in base units.
    pub fn whole(&self, units: u64) -> U256 {
        U256::from(units).saturating_mul(U256::exp10(self.decimals.into()))
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }
}

impl std::fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = U256::exp10(self.decimals.into());
        let (whole, fraction) = self.raw.div_mod(unit);
        if self.decimals == 0 {
            return write!(f, "{whole}");
        }
        let fraction = fraction.to_string();
        let fraction = format!("{fraction:0>width$}", width = usize::from(self.decimals));
        write!(f, "{whole}.{fraction}")
    }
}

/// Trade size for the given balance, in base units.
///
/// * at least 15 tokens: uniform in [10, 15) tokens
/// * at least 5 tokens: uniform in [1, balance) tokens
/// * at least 1 token: the whole balance
/// * otherwise no trade
pub fn trade_size(balance: TokenAmount, rng: &mut impl Rng) -> Option<U256> {
    let raw = balance.raw;
    if raw >= balance.whole(15) {
        Some(uniform(balance.whole(10), balance.whole(15), rng))
    } else if raw >= balance.whole(5) {
        Some(uniform(balance.whole(1), raw, rng))
    } else if raw >= balance.whole(1) {
        Some(raw)
    } else {
        None
    }
}

/// Uniform in `[low, high)`. Both bounds are below 15 whole tokens, which fits
/// in a `u128` for any realistic decimals.
fn uniform(low: U256, high: U256, rng: &mut impl Rng) -> U256 {
    if low >= high {
        return low;
    }
    let span = high - low;
    if span.bits() > 128 {
        return low;
    }
    low + U256::from(rng.gen_range(0..span.as_u128()))
}
