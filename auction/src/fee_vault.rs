//! Per-auction fee vaults
//!
//! Fees are always tagged to the most recently completed auction. Only that
//! auction's winner can drain its vault, and only once.

use crate::engine::AuctionEngine;
use mine_core::{Amount, CallContext, EngineError, Event, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeVault {
    /// Fees waiting to be claimed. Zero after the claim.
    pub accumulated: Amount,
    pub claimed: bool,
    /// Amount paid out by the claim
    pub claimed_amount: Amount,
}

impl FeeVault {
    /// What the winner could claim right now
    pub fn claimable(&self) -> Amount {
        if self.claimed {
            0
        } else {
            self.accumulated
        }
    }
}

impl AuctionEngine {
    /// Fee vault status for `auction_id`; an untouched vault reads as empty
    pub fn fee_vault(&self, auction_id: u64) -> FeeVault {
        self.fee_vaults.get(&auction_id).copied().unwrap_or_default()
    }

    pub fn fee_vaults(&self) -> impl Iterator<Item = (&u64, &FeeVault)> {
        self.fee_vaults.iter()
    }

    /// Add `amount` of the fee token to the vault of the auction preceding
    /// the current one. Returns that auction's id.
    pub fn deposit_fee(&mut self, ctx: &mut CallContext<'_>, amount: Amount) -> Result<u64> {
        if amount == 0 {
            return Err(EngineError::invalid("fee amount must be positive"));
        }
        if self.current_id < 2 {
            return Err(EngineError::conflict("no auction has completed yet"));
        }

        let auction_id = self.current_id - 1;
        let has_winner = self
            .auctions
            .get(&auction_id)
            .map(|auction| auction.is_won())
            .unwrap_or(false);
        if !has_winner {
            return Err(EngineError::conflict(format!(
                "auction {} has no winner",
                auction_id
            )));
        }

        let vault = self.fee_vaults.entry(auction_id).or_default();
        if vault.claimed {
            return Err(EngineError::conflict(format!(
                "fee vault of auction {} already claimed",
                auction_id
            )));
        }
        vault.accumulated = vault
            .accumulated
            .checked_add(amount)
            .ok_or_else(|| EngineError::arithmetic("fee vault balance overflows"))?;

        ctx.pull_from_caller(&self.config.fee_token, &self.config.engine_account, amount)?;

        let depositor = *ctx.caller();
        ctx.emit(Event::FeeDeposited {
            auction_id,
            depositor,
            amount,
        });
        log::info!(
            "💰 {} deposited {} fees for auction #{}",
            depositor.short(),
            amount,
            auction_id
        );
        Ok(auction_id)
    }

    /// Pay the whole vault of `auction_id` to its winner. One shot.
    pub fn claim_fee(&mut self, ctx: &mut CallContext<'_>, auction_id: u64) -> Result<Amount> {
        let caller = *ctx.caller();
        let auction = self
            .auctions
            .get(&auction_id)
            .ok_or_else(|| EngineError::invalid(format!("unknown auction {}", auction_id)))?;
        if auction.winner != Some(caller) {
            return Err(EngineError::unauthorized(format!(
                "{} did not win auction {}",
                caller, auction_id
            )));
        }

        let vault = self.fee_vaults.get_mut(&auction_id).ok_or_else(|| {
            EngineError::conflict(format!("no fees accumulated for auction {}", auction_id))
        })?;
        if vault.claimed {
            return Err(EngineError::conflict(format!(
                "fee vault of auction {} already claimed",
                auction_id
            )));
        }
        if vault.accumulated == 0 {
            return Err(EngineError::conflict(format!(
                "no fees accumulated for auction {}",
                auction_id
            )));
        }

        let amount = vault.accumulated;
        vault.claimed = true;
        vault.accumulated = 0;
        vault.claimed_amount = amount;

        ctx.pay(
            &self.config.fee_token,
            &self.config.engine_account,
            &caller,
            amount,
        )?;
        ctx.emit(Event::FeeClaimed {
            auction_id,
            winner: caller,
            amount,
        });
        log::info!(
            "💸 Winner {} claimed {} fees of auction #{}",
            caller.short(),
            amount,
            auction_id
        );
        Ok(amount)
    }
}
