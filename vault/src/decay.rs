//! Decay vault records and deduction math
//!
//! Decay is never applied in the background. `calculate_deductions` is a
//! pure function of the stored checkpoint and the ledger step; only
//! [`realize`] writes it back.

use crate::config::VaultConfig;
use mine_core::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a vault: owner plus per-owner index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VaultKey {
    pub owner: Address,
    pub index: u64,
}

impl VaultKey {
    pub fn new(owner: Address, index: u64) -> Self {
        Self { owner, index }
    }
}

impl fmt::Display for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner.short(), self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayVault {
    /// Never increases after creation
    pub locked_balance: Amount,
    /// Ledger step the deposit was made
    pub deposit_checkpoint: u64,
    /// Ledger step decay was last realized
    pub last_decay_checkpoint: u64,
    /// Set once the owner withdrew
    pub closed: bool,
}

impl DecayVault {
    pub fn open(amount: Amount, now: u64) -> Self {
        Self {
            locked_balance: amount,
            deposit_checkpoint: now,
            last_decay_checkpoint: now,
            closed: false,
        }
    }

    /// First ledger step at which the owner may withdraw
    pub fn unlocks_at(&self, lock_period: u64) -> u64 {
        self.deposit_checkpoint.saturating_add(lock_period)
    }
}

/// Decay accrued since the last checkpoint, capped at the balance.
/// A balance under the floor no longer decays.
pub fn calculate_deductions(vault: &DecayVault, now: u64, config: &VaultConfig) -> Amount {
    if vault.locked_balance < config.minimum_balance {
        return 0;
    }

    let elapsed = now.saturating_sub(vault.last_decay_checkpoint);
    elapsed
        .saturating_mul(config.deduction_rate)
        .min(vault.locked_balance)
}

/// Balance left once pending decay is taken off
pub fn effective_balance(vault: &DecayVault, now: u64, config: &VaultConfig) -> Amount {
    vault.locked_balance - calculate_deductions(vault, now, config)
}

/// Open and holding at least the threshold after pending decay (inclusive)
pub fn is_vault_eligible(vault: &DecayVault, now: u64, config: &VaultConfig) -> bool {
    !vault.closed && effective_balance(vault, now, config) >= config.eligibility_threshold
}

/// Apply pending decay to the record and move its checkpoint to `now`.
/// Returns the amount removed.
pub fn realize(vault: &mut DecayVault, now: u64, config: &VaultConfig) -> Amount {
    let deduction = calculate_deductions(vault, now, config);
    vault.locked_balance -= deduction;
    vault.last_decay_checkpoint = vault.last_decay_checkpoint.max(now);
    deduction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MINIMUM_BALANCE;

    fn config() -> VaultConfig {
        VaultConfig::default()
    }

    #[test]
    fn test_deductions_example() {
        let vault = DecayVault::open(10_000_000_000, 0);

        assert_eq!(calculate_deductions(&vault, 50_000, &config()), 5_000_000_000);
        assert_eq!(effective_balance(&vault, 50_000, &config()), 5_000_000_000);
        assert!(is_vault_eligible(&vault, 50_000, &config()));
        assert!(!is_vault_eligible(&vault, 50_001, &config()));
    }

    #[test]
    fn test_calculation_does_not_mutate() {
        let vault = DecayVault::open(10_000_000_000, 100);
        let before = vault;

        calculate_deductions(&vault, 10_000, &config());
        is_vault_eligible(&vault, 10_000, &config());
        assert_eq!(vault, before);
    }

    #[test]
    fn test_deduction_capped_at_balance() {
        let config = VaultConfig {
            minimum_balance: 0,
            ..config()
        };
        let vault = DecayVault::open(1_000, 0);
        assert_eq!(calculate_deductions(&vault, u64::MAX, &config), 1_000);
        assert_eq!(effective_balance(&vault, u64::MAX, &config), 0);
    }

    #[test]
    fn test_below_floor_is_frozen() {
        let vault = DecayVault::open(DEFAULT_MINIMUM_BALANCE - 1, 0);
        assert_eq!(calculate_deductions(&vault, 1_000_000, &config()), 0);
    }

    #[test]
    fn test_realize_moves_checkpoint() {
        let mut vault = DecayVault::open(10_000_000_000, 0);

        let taken = realize(&mut vault, 1_000, &config());
        assert_eq!(taken, 100_000_000);
        assert_eq!(vault.locked_balance, 9_900_000_000);
        assert_eq!(vault.last_decay_checkpoint, 1_000);

        // realizing again at the same step is a no-op
        assert_eq!(realize(&mut vault, 1_000, &config()), 0);
        // a stale step never rewinds the checkpoint
        assert_eq!(realize(&mut vault, 500, &config()), 0);
        assert_eq!(vault.last_decay_checkpoint, 1_000);
    }

    #[test]
    fn test_closed_vault_not_eligible() {
        let mut vault = DecayVault::open(10_000_000_000, 0);
        vault.closed = true;
        assert!(!is_vault_eligible(&vault, 0, &config()));
    }
}
