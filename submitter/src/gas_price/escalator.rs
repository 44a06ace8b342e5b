use ethers::types::U256;
use tracing::{debug, info};

use super::FeeCaps;

const ESCALATION_MULTIPLIER_NUMERATOR: u32 = 120;
const ESCALATION_MULTIPLIER_DENOMINATOR: u32 = 100;
const MAX_ESCALATIONS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EscalationConfig {
    pub numerator: u32,
    pub denominator: u32,
    /// Number of bump cycles allowed for one logical call.
    pub max_escalations: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            numerator: ESCALATION_MULTIPLIER_NUMERATOR,
            denominator: ESCALATION_MULTIPLIER_DENOMINATOR,
            max_escalations: MAX_ESCALATIONS,
        }
    }
}

/// Tracks fee caps across the retries of one logical call.
///
/// Starts at the baseline and multiplies both caps by `numerator / denominator`
/// per escalation, at most `max_escalations` times. Caps never decrease.
#[derive(Clone, Debug)]
pub struct FeeEscalator {
    config: EscalationConfig,
    current: FeeCaps,
    escalations: u32,
}

impl FeeEscalator {
    pub fn new(baseline: FeeCaps, config: EscalationConfig) -> Self {
        Self {
            config,
            current: baseline,
            escalations: 0,
        }
    }

    pub fn current(&self) -> FeeCaps {
        self.current
    }

    pub fn escalations(&self) -> u32 {
        self.escalations
    }

    pub fn has_budget(&self) -> bool {
        self.escalations < self.config.max_escalations
    }

    /// Bumps both caps if budget remains. Returns whether the caps changed.
    pub fn escalate(&mut self) -> bool {
        if !self.has_budget() {
            info!(
                escalations = self.escalations,
                caps = ?self.current,
                "Fee escalation budget spent, keeping fee caps constant"
            );
            return false;
        }

        let old = self.current;
        self.current = FeeCaps {
            max_fee: self.apply_multiplier(&old.max_fee),
            max_priority_fee: self.apply_multiplier(&old.max_priority_fee),
        };
        self.escalations = self.escalations.saturating_add(1);

        debug!(
            escalation = self.escalations,
            old_max_fee_per_gas = ?old.max_fee,
            escalated_max_fee_per_gas = ?self.current.max_fee,
            old_max_priority_fee_per_gas = ?old.max_priority_fee,
            escalated_max_priority_fee_per_gas = ?self.current.max_priority_fee,
            "Escalated fee caps"
        );
        true
    }

    fn apply_multiplier(&self, fee: &U256) -> U256 {
        let numerator = U256::from(self.config.numerator);
        let denominator = U256::from(self.config.denominator.max(1));
        let escalated = fee.saturating_mul(numerator).div_mod(denominator).0;
        // a multiplier below one must not lower the fee
        escalated.max(*fee)
    }
}
