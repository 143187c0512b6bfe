use crate::proposals::Proposal;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::Serialize;

/// Caller balance as a share of total supply. Both sides keep full
/// precision; rounding only happens in [`VotingPowerShare::display`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VotingPowerShare {
    #[serde(with = "crate::amount")]
    pub balance: BigUint,
    #[serde(with = "crate::amount")]
    pub supply: BigUint,
}

impl VotingPowerShare {
    pub fn new(balance: BigUint, supply: BigUint) -> Self {
        Self { balance, supply }
    }

    /// True when the share is defined as zero: no balance or no supply.
    pub fn is_zero(&self) -> bool {
        self.balance.is_zero() || self.supply.is_zero()
    }

    /// Percentage of supply held, `0.0` for an empty balance or supply.
    pub fn percent(&self) -> f64 {
        if self.is_zero() {
            return 0.0;
        }
        let scale = BigUint::from(10u32).pow(20);
        let scaled = &self.balance * scale / &self.supply;
        scaled.to_f64().unwrap_or(f64::INFINITY) / 1e18
    }

    /// Percentage with four decimals, rounded half up.
    pub fn display(&self) -> String {
        if self.is_zero() {
            return "0.0000".to_string();
        }
        let scale = BigUint::from(10u32).pow(7);
        let units = (&self.balance * scale / &self.supply + 5u32) / 10u32;
        let whole = &units / 10_000u32;
        let frac = (&units % 10_000u32).to_u32().unwrap_or(0);
        format!("{whole}.{frac:04}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceStats {
    pub voting_power: VotingPowerShare,
    pub total_votes: u64,
    pub proposal_count: usize,
    /// Proposals the chain has not finalized yet.
    pub open_proposals: usize,
}

impl GovernanceStats {
    pub fn votes_per_proposal(&self) -> f64 {
        if self.proposal_count == 0 {
            return 0.0;
        }
        self.total_votes as f64 / self.proposal_count as f64
    }
}

/// Combine chain reads into display statistics. Missing inputs count as zero.
pub fn aggregate(
    proposals: &[Proposal],
    total_supply: Option<&BigUint>,
    caller_balance: Option<&BigUint>,
    total_votes: Option<u64>,
) -> GovernanceStats {
    GovernanceStats {
        voting_power: VotingPowerShare::new(
            caller_balance.cloned().unwrap_or_default(),
            total_supply.cloned().unwrap_or_default(),
        ),
        total_votes: total_votes.unwrap_or(0),
        proposal_count: proposals.len(),
        open_proposals: proposals.iter().filter(|p| !p.status.is_terminal()).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(balance: u64, supply: u64) -> VotingPowerShare {
        VotingPowerShare::new(BigUint::from(balance), BigUint::from(supply))
    }

    #[test]
    fn zero_inputs_give_zero() {
        assert_eq!(share(0, 100).percent(), 0.0);
        assert_eq!(share(100, 0).percent(), 0.0);
        assert_eq!(share(100, 0).display(), "0.0000");
        let stats = aggregate(&[], None, None, None);
        assert_eq!(stats.voting_power.percent(), 0.0);
        assert_eq!(stats.votes_per_proposal(), 0.0);
    }

    #[test]
    fn display_rounds_half_up() {
        assert_eq!(share(1, 3).display(), "33.3333");
        assert_eq!(share(2, 3).display(), "66.6667");
        assert_eq!(share(1, 1).display(), "100.0000");
        assert_eq!(share(1, 200_000).display(), "0.0005");
        assert_eq!(share(1, 2_000_001).display(), "0.0000");
    }

    #[test]
    fn large_supply_keeps_precision() {
        let supply = BigUint::from(u64::MAX) * BigUint::from(4u32);
        let balance = BigUint::from(u64::MAX);
        let share = VotingPowerShare::new(balance, supply);
        assert_eq!(share.percent(), 25.0);
        assert_eq!(share.display(), "25.0000");
    }

    #[test]
    fn aggregate_is_idempotent() {
        let supply = BigUint::from(1_000_000u32);
        let balance = BigUint::from(1_234u32);
        let a = aggregate(&[], Some(&supply), Some(&balance), Some(9));
        let b = aggregate(&[], Some(&supply), Some(&balance), Some(9));
        assert_eq!(a, b);
        assert_eq!(a.voting_power.percent().to_bits(), b.voting_power.percent().to_bits());
        assert_eq!(a.voting_power.display(), "0.1234");
    }
}
