//! Decay vault engine
//!
//! Every vault locks the same fixed deposit. Vaults are numbered per owner
//! and also appended to a global registry, which drives both the deduction
//! crank and the window tally. Registry entries are never removed, so a
//! cursor into it stays valid across transactions.

use crate::config::{SettlementStrategy, VaultConfig};
use crate::decay::{self, DecayVault, VaultKey};
use crate::fee_share::FeeWindow;
use mine_core::{Address, Amount, CallContext, EngineError, Event, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of one `collect_deductions` batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrankReport {
    /// Registry entries visited
    pub processed: u64,
    /// Decay realized and paid to the deduction recipient
    pub collected: Amount,
    /// Where the next batch starts
    pub next_cursor: u64,
}

/// Vault and window records in storage order, see
/// [`DecayVaultEngine::split_records`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecords {
    pub vaults: Vec<(VaultKey, DecayVault)>,
    pub vault_counts: Vec<(Address, u64)>,
    pub registry: Vec<VaultKey>,
    pub windows: Vec<FeeWindow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayVaultEngine {
    pub(crate) config: VaultConfig,
    /// owner -> index -> vault
    pub(crate) vaults: BTreeMap<Address, BTreeMap<u64, DecayVault>>,
    /// owner -> number of vaults ever created
    pub(crate) vault_counts: BTreeMap<Address, u64>,
    /// Every vault in creation order
    pub(crate) registry: Vec<VaultKey>,
    pub(crate) crank_cursor: u64,
    pub(crate) windows: BTreeMap<u64, FeeWindow>,
}

impl DecayVaultEngine {
    pub fn deploy(ctx: &mut CallContext<'_>, config: VaultConfig) -> Result<Self> {
        config.validate()?;
        log::info!(
            "🏦 Vault engine deployed by {} (deposit {}, rate {}/step, {:?} settlement)",
            ctx.caller().short(),
            config.required_deposit,
            config.deduction_rate,
            config.settlement
        );

        Ok(Self {
            config,
            vaults: BTreeMap::new(),
            vault_counts: BTreeMap::new(),
            registry: Vec::new(),
            crank_cursor: 0,
            windows: BTreeMap::new(),
        })
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn vault(&self, owner: &Address, vault_id: u64) -> Option<&DecayVault> {
        self.vaults.get(owner).and_then(|vaults| vaults.get(&vault_id))
    }

    pub fn vault_count(&self, owner: &Address) -> u64 {
        self.vault_counts.get(owner).copied().unwrap_or(0)
    }

    /// All vaults of `owner`, by index
    pub fn vaults_of(&self, owner: &Address) -> impl Iterator<Item = (u64, &DecayVault)> {
        self.vaults
            .get(owner)
            .into_iter()
            .flat_map(|vaults| vaults.iter().map(|(index, vault)| (*index, vault)))
    }

    pub fn registry(&self) -> &[VaultKey] {
        &self.registry
    }

    pub fn crank_cursor(&self) -> u64 {
        self.crank_cursor
    }

    /// Pending decay of a vault at `now`, without realizing it
    pub fn calculate_deductions(&self, owner: &Address, vault_id: u64, now: u64) -> Result<Amount> {
        let vault = self.lookup(owner, vault_id)?;
        Ok(decay::calculate_deductions(vault, now, &self.config))
    }

    pub fn is_vault_eligible(&self, owner: &Address, vault_id: u64, now: u64) -> Result<bool> {
        let vault = self.lookup(owner, vault_id)?;
        Ok(decay::is_vault_eligible(vault, now, &self.config))
    }

    /// Sum of balances still locked in open vaults
    pub fn total_locked(&self) -> Amount {
        self.vaults
            .values()
            .flat_map(|vaults| vaults.values())
            .filter(|vault| !vault.closed)
            .fold(0, |acc: Amount, vault| acc.saturating_add(vault.locked_balance))
    }

    // ---------------------------------------------------------------
    // Vault lifecycle
    // ---------------------------------------------------------------

    /// Lock the required deposit from the caller in a new vault and return
    /// its per-owner index.
    pub fn create_vault(&mut self, ctx: &mut CallContext<'_>) -> Result<u64> {
        let owner = *ctx.caller();
        let now = ctx.now();
        let amount = self.config.required_deposit;

        let vault_id = self.vault_count(&owner);
        let next_count = vault_id
            .checked_add(1)
            .ok_or_else(|| EngineError::arithmetic("vault index space exhausted"))?;

        self.vaults
            .entry(owner)
            .or_default()
            .insert(vault_id, DecayVault::open(amount, now));
        self.vault_counts.insert(owner, next_count);
        self.registry.push(VaultKey::new(owner, vault_id));

        ctx.pull_from_caller(&self.config.deposit_token, &self.config.engine_account, amount)?;

        ctx.emit(Event::VaultCreated {
            owner,
            vault_id,
            amount,
        });
        log::info!(
            "🔒 Vault {}#{} locked {} at step {}",
            owner.short(),
            vault_id,
            amount,
            now
        );
        Ok(vault_id)
    }

    /// Realize the pending decay of one vault and pay it to the deduction
    /// recipient. Anyone may call this for any open vault.
    pub fn settle_vault(
        &mut self,
        ctx: &mut CallContext<'_>,
        owner: &Address,
        vault_id: u64,
    ) -> Result<Amount> {
        let now = ctx.now();
        let vault = vault_mut(&mut self.vaults, owner, vault_id)?;
        if vault.closed {
            return Err(EngineError::conflict(format!(
                "vault {}#{} is closed",
                owner.short(),
                vault_id
            )));
        }

        let deduction = decay::realize(vault, now, &self.config);
        self.pay_deductions(ctx, deduction, 1)?;
        Ok(deduction)
    }

    /// Close one of the caller's vaults after its lock period. Pending decay
    /// goes to the deduction recipient, the rest to the owner. Returns the
    /// amount the owner received.
    pub fn withdraw_vault_tokens(&mut self, ctx: &mut CallContext<'_>, vault_id: u64) -> Result<Amount> {
        let owner = *ctx.caller();
        let now = ctx.now();
        let lock_period = self.config.window_size;

        let vault = vault_mut(&mut self.vaults, &owner, vault_id)?;
        if vault.closed {
            return Err(EngineError::conflict(format!(
                "vault {}#{} already withdrawn",
                owner.short(),
                vault_id
            )));
        }
        let unlocks_at = vault.unlocks_at(lock_period);
        if now < unlocks_at {
            return Err(EngineError::conflict(format!(
                "vault {}#{} is locked until step {}",
                owner.short(),
                vault_id,
                unlocks_at
            )));
        }

        let deduction = decay::realize(vault, now, &self.config);
        let amount = vault.locked_balance;
        vault.locked_balance = 0;
        vault.closed = true;

        ctx.pay(
            &self.config.deposit_token,
            &self.config.engine_account,
            &owner,
            amount,
        )?;
        self.pay_deductions(ctx, deduction, 1)?;

        ctx.emit(Event::VaultWithdrawn {
            owner,
            vault_id,
            amount,
        });
        log::info!(
            "🔓 Vault {}#{} withdrawn: {} returned, {} decayed",
            owner.short(),
            vault_id,
            amount,
            deduction
        );
        Ok(amount)
    }

    /// Realize decay on up to `max_vaults` registry entries, continuing
    /// round-robin from where the previous batch stopped, and pay the total
    /// to the deduction recipient in one transfer.
    pub fn collect_deductions(&mut self, ctx: &mut CallContext<'_>, max_vaults: u64) -> Result<CrankReport> {
        if self.config.settlement != SettlementStrategy::Swept {
            return Err(EngineError::conflict(
                "deduction sweeping is disabled for lazy settlement",
            ));
        }
        if max_vaults == 0 {
            return Err(EngineError::invalid("batch size must be positive"));
        }

        let total = self.registry.len() as u64;
        if total == 0 {
            return Ok(CrankReport {
                processed: 0,
                collected: 0,
                next_cursor: 0,
            });
        }

        let now = ctx.now();
        let batch = max_vaults.min(total);
        let mut cursor = self.crank_cursor % total;
        let mut collected: Amount = 0;
        let mut touched = 0u64;

        for _ in 0..batch {
            let key = self.registry[cursor as usize];
            if let Some(vault) = self
                .vaults
                .get_mut(&key.owner)
                .and_then(|vaults| vaults.get_mut(&key.index))
            {
                if !vault.closed {
                    let deduction = decay::realize(vault, now, &self.config);
                    if deduction > 0 {
                        touched += 1;
                        collected = collected
                            .checked_add(deduction)
                            .ok_or_else(|| EngineError::arithmetic("collected deductions overflow"))?;
                    }
                }
            }
            cursor = (cursor + 1) % total;
        }
        self.crank_cursor = cursor;

        self.pay_deductions(ctx, collected, touched)?;
        log::debug!(
            "🧹 Crank visited {} vaults, collected {}, next cursor {}",
            batch,
            collected,
            cursor
        );

        Ok(CrankReport {
            processed: batch,
            collected,
            next_cursor: cursor,
        })
    }

    // ---------------------------------------------------------------
    // Persistence helpers
    // ---------------------------------------------------------------

    /// Split into a record-free header and the keyed records
    pub fn split_records(&self) -> (DecayVaultEngine, VaultRecords) {
        let mut header = self.clone();
        let vaults = std::mem::take(&mut header.vaults)
            .into_iter()
            .flat_map(|(owner, vaults)| {
                vaults
                    .into_iter()
                    .map(move |(index, vault)| (VaultKey::new(owner, index), vault))
            })
            .collect();
        let vault_counts = std::mem::take(&mut header.vault_counts).into_iter().collect();
        let registry = std::mem::take(&mut header.registry);
        let windows = std::mem::take(&mut header.windows).into_values().collect();
        (
            header,
            VaultRecords {
                vaults,
                vault_counts,
                registry,
                windows,
            },
        )
    }

    /// Inverse of [`DecayVaultEngine::split_records`]
    pub fn from_records(mut header: DecayVaultEngine, records: VaultRecords) -> Result<Self> {
        for (key, vault) in records.vaults {
            header
                .vaults
                .entry(key.owner)
                .or_default()
                .insert(key.index, vault);
        }
        header.vault_counts = records.vault_counts.into_iter().collect();
        header.windows = records
            .windows
            .into_iter()
            .map(|window| (window.window_id, window))
            .collect();

        for key in &records.registry {
            if header.vault(&key.owner, key.index).is_none() {
                return Err(EngineError::invalid(format!(
                    "registry names missing vault {}",
                    key
                )));
            }
        }
        header.registry = records.registry;
        Ok(header)
    }

    fn lookup(&self, owner: &Address, vault_id: u64) -> Result<&DecayVault> {
        self.vault(owner, vault_id).ok_or_else(|| {
            EngineError::invalid(format!("unknown vault {}#{}", owner.short(), vault_id))
        })
    }

    fn pay_deductions(&self, ctx: &mut CallContext<'_>, amount: Amount, vaults: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }

        let recipient = self.config.deduction_recipient;
        ctx.pay(
            &self.config.deposit_token,
            &self.config.engine_account,
            &recipient,
            amount,
        )?;
        ctx.emit(Event::DeductionsCollected {
            recipient,
            amount,
            vaults,
        });
        Ok(())
    }
}

/// Mutable lookup over the vault map alone, so callers can still read the
/// engine config while holding the vault.
pub(crate) fn vault_mut<'a>(
    vaults: &'a mut BTreeMap<Address, BTreeMap<u64, DecayVault>>,
    owner: &Address,
    vault_id: u64,
) -> Result<&'a mut DecayVault> {
    vaults
        .get_mut(owner)
        .and_then(|vaults| vaults.get_mut(&vault_id))
        .ok_or_else(|| EngineError::invalid(format!("unknown vault {}#{}", owner.short(), vault_id)))
}
