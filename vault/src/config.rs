//! Vault engine parameters
//!
//! The slow-decay and fast-decay deployments differ only in
//! `deduction_rate` and `settlement`, so both are one engine with two
//! configurations.

use mine_core::{Address, Amount, EngineError, Result};
use serde::{Deserialize, Serialize};

/// Deposit locked by every vault (100 tokens at 8 decimals)
pub const DEFAULT_REQUIRED_DEPOSIT: Amount = 10_000_000_000;

/// Balance removed per clock step while above the floor
pub const DEFAULT_DEDUCTION_RATE: Amount = 100_000;

/// Below this balance decay stops
pub const DEFAULT_MINIMUM_BALANCE: Amount = 1_000_000_000;

/// Effective balance a vault needs to share in windowed fees
pub const DEFAULT_ELIGIBILITY_THRESHOLD: Amount = 5_000_000_000;

/// Clock steps per fee window, also the vault lock period
pub const DEFAULT_WINDOW_SIZE: u64 = 50_400;

/// How realized decay reaches the deduction recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStrategy {
    /// Decay is realized only on a vault's own access path
    /// (`settle_vault`, `withdraw_vault_tokens`).
    #[default]
    Lazy,
    /// Additionally allows the paginated `collect_deductions` sweep.
    Swept,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Token locked in vaults
    pub deposit_token: Address,
    /// Token pooled per window and shared among eligible vaults
    pub fee_token: Address,
    /// Account holding vault deposits and pooled fees
    pub engine_account: Address,
    /// Receives realized decay
    pub deduction_recipient: Address,
    pub required_deposit: Amount,
    pub deduction_rate: Amount,
    pub minimum_balance: Amount,
    pub eligibility_threshold: Amount,
    pub window_size: u64,
    pub settlement: SettlementStrategy,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            deposit_token: Address::ZERO,
            fee_token: Address::ZERO,
            engine_account: Address::ZERO,
            deduction_recipient: Address::ZERO,
            required_deposit: DEFAULT_REQUIRED_DEPOSIT,
            deduction_rate: DEFAULT_DEDUCTION_RATE,
            minimum_balance: DEFAULT_MINIMUM_BALANCE,
            eligibility_threshold: DEFAULT_ELIGIBILITY_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            settlement: SettlementStrategy::Lazy,
        }
    }
}

impl VaultConfig {
    pub fn validate(&self) -> Result<()> {
        let addresses = [
            ("deposit token", &self.deposit_token),
            ("fee token", &self.fee_token),
            ("engine account", &self.engine_account),
            ("deduction recipient", &self.deduction_recipient),
        ];
        for (name, address) in addresses {
            if address.is_zero() {
                return Err(EngineError::invalid(format!("{} is not set", name)));
            }
        }

        if self.window_size == 0 {
            return Err(EngineError::invalid("window size must be positive"));
        }
        if self.required_deposit == 0 {
            return Err(EngineError::invalid("required deposit must be positive"));
        }
        if self.eligibility_threshold > self.required_deposit {
            return Err(EngineError::invalid(format!(
                "eligibility threshold {} exceeds the required deposit {}",
                self.eligibility_threshold, self.required_deposit
            )));
        }

        Ok(())
    }
}
