//! Mine Vault Engine
//!
//! Fixed-deposit vaults whose balance decays linearly with ledger steps,
//! plus a windowed fee pool shared equally among vaults that kept enough
//! balance through each window.
//!
//! Decay is lazy: nothing changes until a vault is settled, withdrawn or
//! swept by the deduction crank.

pub mod config;
pub mod decay;
pub mod engine;
pub mod fee_share;

pub use config::{
    SettlementStrategy, VaultConfig, DEFAULT_DEDUCTION_RATE, DEFAULT_ELIGIBILITY_THRESHOLD,
    DEFAULT_MINIMUM_BALANCE, DEFAULT_REQUIRED_DEPOSIT, DEFAULT_WINDOW_SIZE,
};
pub use decay::{calculate_deductions, effective_balance, is_vault_eligible, DecayVault, VaultKey};
pub use engine::{CrankReport, DecayVaultEngine, VaultRecords};
pub use fee_share::{FeeWindow, TallyProgress};
