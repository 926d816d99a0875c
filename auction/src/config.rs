//! Auction parameters

use mine_core::{Address, Amount, EngineError, Result};
use serde::{Deserialize, Serialize};

/// Token base units per whole token (8 decimal places)
pub const TOKEN_UNIT: Amount = 100_000_000;

/// Clock steps per hour when the ledger clock counts seconds
pub const HOUR: u64 = 3_600;

/// Lifetime of a single auction (42 hours)
pub const DEFAULT_DURATION: u64 = 42 * HOUR;

/// Opening price of every auction (1,000 tokens)
pub const DEFAULT_STARTING_PRICE: Amount = 1_000 * TOKEN_UNIT;

/// Price drop per clock step; reaches just above zero at expiry
pub const DEFAULT_DISCOUNT_RATE: Amount = DEFAULT_STARTING_PRICE / DEFAULT_DURATION;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    /// Token bids are paid in
    pub auction_token: Address,
    /// Token the per-auction fee vaults accumulate
    pub fee_token: Address,
    /// Account holding bid proceeds and fee deposits
    pub engine_account: Address,
    pub starting_price: Amount,
    /// Price reduction per clock step
    pub discount_rate: Amount,
    /// Clock steps from start to expiry
    pub duration: u64,
    /// Initial mining-deposit recipient. Zero means not configured yet.
    pub mining_recipient: Address,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            auction_token: Address::ZERO,
            fee_token: Address::ZERO,
            engine_account: Address::ZERO,
            starting_price: DEFAULT_STARTING_PRICE,
            discount_rate: DEFAULT_DISCOUNT_RATE,
            duration: DEFAULT_DURATION,
            mining_recipient: Address::ZERO,
        }
    }
}

impl AuctionConfig {
    /// Check the parameters describe a curve that never goes negative
    /// before expiry.
    pub fn validate(&self) -> Result<()> {
        if self.auction_token.is_zero() {
            return Err(EngineError::invalid("auction token is not set"));
        }
        if self.fee_token.is_zero() {
            return Err(EngineError::invalid("fee token is not set"));
        }
        if self.engine_account.is_zero() {
            return Err(EngineError::invalid("engine account is not set"));
        }
        if self.duration == 0 {
            return Err(EngineError::invalid("auction duration must be positive"));
        }

        let total_discount = self
            .discount_rate
            .checked_mul(self.duration)
            .ok_or_else(|| EngineError::arithmetic("discount_rate * duration overflows"))?;
        if self.starting_price < total_discount {
            return Err(EngineError::invalid(format!(
                "starting price {} is below the total discount {} over the auction lifetime",
                self.starting_price, total_discount
            )));
        }

        Ok(())
    }
}
