//! Windowed fee sharing
//!
//! The ledger clock is cut into fixed windows of `window_size` steps. Fees
//! deposited during window `w` are shared equally among vaults that were
//! eligible when `w` closed. The eligible count is fixed by a paginated
//! tally (`finalize_window`) before any claim is paid, so a claim never
//! depends on an unbounded scan and the sum of shares never exceeds the
//! pool.
//!
//! Claims for window `w` open at its close and end one window later.

use crate::decay::{self, VaultKey};
use crate::engine::DecayVaultEngine;
use mine_core::{Address, Amount, CallContext, EngineError, Event, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeWindow {
    pub window_id: u64,
    pub total_pooled: Amount,
    /// Vaults counted by the tally so far
    pub eligible_count: u64,
    /// Next registry position the tally visits
    pub tally_cursor: u64,
    /// Registry length when the tally began. Vaults created later cannot
    /// predate the close.
    pub tally_end: Option<u64>,
    pub finalized: bool,
    pub counted: BTreeSet<VaultKey>,
    /// Accounts that already claimed this window
    pub claimed: BTreeSet<Address>,
    pub total_claimed: Amount,
}

impl FeeWindow {
    pub fn new(window_id: u64) -> Self {
        Self {
            window_id,
            total_pooled: 0,
            eligible_count: 0,
            tally_cursor: 0,
            tally_end: None,
            finalized: false,
            counted: BTreeSet::new(),
            claimed: BTreeSet::new(),
            total_claimed: 0,
        }
    }

    /// Per-vault share, once the tally is final and found someone
    pub fn share(&self) -> Option<Amount> {
        if !self.finalized || self.eligible_count == 0 {
            return None;
        }
        Some(self.total_pooled / self.eligible_count)
    }

    pub fn has_claimed(&self, account: &Address) -> bool {
        self.claimed.contains(account)
    }
}

/// Result of one `finalize_window` batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyProgress {
    pub window_id: u64,
    /// Registry entries visited by this batch
    pub scanned: u64,
    pub eligible_count: u64,
    pub finalized: bool,
}

impl DecayVaultEngine {
    pub fn window_size(&self) -> u64 {
        self.config.window_size
    }

    pub fn window_id_at(&self, now: u64) -> u64 {
        now / self.config.window_size
    }

    /// `(close, claim_deadline)` of window `window_id`
    pub fn window_bounds(&self, window_id: u64) -> Result<(u64, u64)> {
        let size = self.config.window_size;
        let close = window_id
            .checked_add(1)
            .and_then(|next| next.checked_mul(size))
            .ok_or_else(|| EngineError::arithmetic(format!("window {} out of range", window_id)))?;
        let deadline = close
            .checked_add(size)
            .ok_or_else(|| EngineError::arithmetic(format!("window {} out of range", window_id)))?;
        Ok((close, deadline))
    }

    pub fn window(&self, window_id: u64) -> Option<&FeeWindow> {
        self.windows.get(&window_id)
    }

    pub fn windows(&self) -> impl Iterator<Item = &FeeWindow> {
        self.windows.values()
    }

    /// Pool `amount` of the fee token from the caller into the window that
    /// contains the current step. Returns that window's id.
    pub fn deposit_fees(&mut self, ctx: &mut CallContext<'_>, amount: Amount) -> Result<u64> {
        if amount == 0 {
            return Err(EngineError::invalid("fee deposit must be positive"));
        }

        // the current window is still open, so it cannot be finalized yet
        let window_id = self.window_id_at(ctx.now());
        let window = self
            .windows
            .entry(window_id)
            .or_insert_with(|| FeeWindow::new(window_id));
        window.total_pooled = window
            .total_pooled
            .checked_add(amount)
            .ok_or_else(|| EngineError::arithmetic("window pool overflow"))?;

        ctx.pull_from_caller(&self.config.fee_token, &self.config.engine_account, amount)?;

        let depositor = *ctx.caller();
        ctx.emit(Event::WindowFeesDeposited {
            window_id,
            depositor,
            amount,
        });
        log::info!(
            "💰 {} fees pooled into window {} by {}",
            amount,
            window_id,
            depositor.short()
        );
        Ok(window_id)
    }

    /// Count up to `max_vaults` more registry entries toward the eligible
    /// set of a closed window. A vault counts when it was created before the
    /// close and was eligible at the close instant. The window is final once
    /// the tally reaches the end of the registry as it stood at the first
    /// batch.
    pub fn finalize_window(
        &mut self,
        ctx: &mut CallContext<'_>,
        window_id: u64,
        max_vaults: u64,
    ) -> Result<TallyProgress> {
        let (close, _) = self.window_bounds(window_id)?;
        if ctx.now() < close {
            return Err(EngineError::conflict(format!(
                "window {} closes at step {}",
                window_id, close
            )));
        }
        if max_vaults == 0 {
            return Err(EngineError::invalid("batch size must be positive"));
        }

        let window = self
            .windows
            .entry(window_id)
            .or_insert_with(|| FeeWindow::new(window_id));
        if window.finalized {
            return Err(EngineError::conflict(format!(
                "window {} is already finalized",
                window_id
            )));
        }

        let end = *window.tally_end.get_or_insert(self.registry.len() as u64);
        let start = window.tally_cursor;
        let stop = start.saturating_add(max_vaults).min(end);

        // A vault settled after the close has its checkpoint past `close`, so
        // it is judged on its settled balance with no further decay.
        for position in start..stop {
            let key = self.registry[position as usize];
            let counted = self
                .vaults
                .get(&key.owner)
                .and_then(|vaults| vaults.get(&key.index))
                .map(|vault| {
                    vault.deposit_checkpoint < close
                        && decay::is_vault_eligible(vault, close, &self.config)
                })
                .unwrap_or(false);
            if counted {
                window.counted.insert(key);
                window.eligible_count += 1;
            }
        }
        window.tally_cursor = stop;

        if stop == end {
            window.finalized = true;
            ctx.emit(Event::WindowFinalized {
                window_id,
                eligible_vaults: window.eligible_count,
                total_pooled: window.total_pooled,
            });
            log::info!(
                "🧮 Window {} finalized: {} eligible vaults share {}",
                window_id,
                window.eligible_count,
                window.total_pooled
            );
        }

        Ok(TallyProgress {
            window_id,
            scanned: stop - start,
            eligible_count: window.eligible_count,
            finalized: window.finalized,
        })
    }

    /// Pay the caller one equal share of window `window_id`'s pool, proven
    /// through vault `vault_id`. One claim per account per window.
    pub fn claim_fees(&mut self, ctx: &mut CallContext<'_>, window_id: u64, vault_id: u64) -> Result<Amount> {
        let caller = *ctx.caller();
        let now = ctx.now();
        let (close, deadline) = self.window_bounds(window_id)?;
        if now < close {
            return Err(EngineError::conflict(format!(
                "window {} claims open at step {}",
                window_id, close
            )));
        }
        if now > deadline {
            return Err(EngineError::conflict(format!(
                "window {} claims ended at step {}",
                window_id, deadline
            )));
        }

        let window = self
            .windows
            .get(&window_id)
            .filter(|window| window.finalized)
            .ok_or_else(|| {
                EngineError::arithmetic(format!("window {} eligible count is not final", window_id))
            })?;
        if window.eligible_count == 0 {
            return Err(EngineError::arithmetic(format!(
                "window {} has no eligible vaults",
                window_id
            )));
        }
        if window.has_claimed(&caller) {
            return Err(EngineError::conflict(format!(
                "{} already claimed window {}",
                caller.short(),
                window_id
            )));
        }

        let key = VaultKey::new(caller, vault_id);
        let vault = self.vault(&caller, vault_id).ok_or_else(|| {
            EngineError::invalid(format!("unknown vault {}", key))
        })?;
        if !window.counted.contains(&key) {
            return Err(EngineError::unauthorized(format!(
                "vault {} was not eligible when window {} closed",
                key, window_id
            )));
        }
        if !decay::is_vault_eligible(vault, now, &self.config) {
            return Err(EngineError::conflict(format!(
                "vault {} is no longer eligible",
                key
            )));
        }

        let share = window.total_pooled / window.eligible_count;
        if share == 0 {
            return Err(EngineError::conflict(format!(
                "window {} has nothing to share",
                window_id
            )));
        }

        let window = self
            .windows
            .get_mut(&window_id)
            .ok_or_else(|| EngineError::conflict(format!("window {} is missing", window_id)))?;
        window.claimed.insert(caller);
        window.total_claimed = window
            .total_claimed
            .checked_add(share)
            .ok_or_else(|| EngineError::arithmetic("claimed total overflow"))?;

        ctx.pay(&self.config.fee_token, &self.config.engine_account, &caller, share)?;
        ctx.emit(Event::WindowFeesClaimed {
            window_id,
            owner: caller,
            vault_id,
            amount: share,
        });
        log::info!(
            "🎁 {} claimed {} from window {} with vault {}",
            caller.short(),
            share,
            window_id,
            vault_id
        );
        Ok(share)
    }
}
