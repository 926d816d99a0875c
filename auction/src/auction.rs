//! Auction records and the descending price curve

use mine_core::{Address, Amount, EngineError, Result};
use serde::{Deserialize, Serialize};

/// Details a winning bidder supplies for the off-chain mining handoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerMetadata {
    pub display_name: String,
    pub network_id: String,
    /// Token the winner intends to mine
    pub mining_token: Address,
    /// Bidder identity on the mining network
    pub mining_bidder: Address,
}

impl WinnerMetadata {
    pub fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(EngineError::invalid("display name cannot be empty"));
        }
        if self.network_id.trim().is_empty() {
            return Err(EngineError::invalid("network id cannot be empty"));
        }
        if self.mining_token.is_zero() {
            return Err(EngineError::invalid("mining token cannot be the zero address"));
        }
        if self.mining_bidder.is_zero() {
            return Err(EngineError::invalid("mining bidder cannot be the zero address"));
        }
        Ok(())
    }
}

/// Lifecycle position of an auction at a given ledger step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    /// Accepting a bid at the current curve price
    Open,
    /// Expired without a bid
    Void,
    /// Winner recorded, proceeds still held by the engine
    Won,
    /// Proceeds handed to the mining recipient
    FundsForwarded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    pub id: u64,
    pub start_time: u64,
    pub expiry_time: u64,
    /// Zero until won
    pub winning_price: Amount,
    pub winner: Option<Address>,
    pub winner_metadata: Option<WinnerMetadata>,
    pub funds_forwarded: bool,
}

impl Auction {
    pub fn open(id: u64, start_time: u64, duration: u64) -> Result<Self> {
        let expiry_time = start_time
            .checked_add(duration)
            .ok_or_else(|| EngineError::arithmetic("auction expiry overflows the clock"))?;

        Ok(Self {
            id,
            start_time,
            expiry_time,
            winning_price: 0,
            winner: None,
            winner_metadata: None,
            funds_forwarded: false,
        })
    }

    pub fn is_won(&self) -> bool {
        self.winner.is_some()
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expiry_time
    }

    pub fn status(&self, now: u64) -> AuctionStatus {
        match (self.winner.is_some(), self.funds_forwarded) {
            (true, true) => AuctionStatus::FundsForwarded,
            (true, false) => AuctionStatus::Won,
            (false, _) if self.is_expired(now) => AuctionStatus::Void,
            (false, _) => AuctionStatus::Open,
        }
    }

    /// Curve price at `now`: `starting_price - discount_rate * elapsed`.
    /// Fails once the auction has expired.
    pub fn price_at(&self, now: u64, starting_price: Amount, discount_rate: Amount) -> Result<Amount> {
        if self.is_expired(now) {
            return Err(EngineError::conflict(format!(
                "auction {} expired at {}",
                self.id, self.expiry_time
            )));
        }

        let elapsed = now.saturating_sub(self.start_time);
        let discount = discount_rate
            .checked_mul(elapsed)
            .ok_or_else(|| EngineError::arithmetic("price discount overflows"))?;

        starting_price
            .checked_sub(discount)
            .ok_or_else(|| EngineError::arithmetic("price discount exceeds starting price"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> WinnerMetadata {
        WinnerMetadata {
            display_name: "pool-operator".to_string(),
            network_id: "mainnet".to_string(),
            mining_token: Address::repeat_byte(0x0a),
            mining_bidder: Address::repeat_byte(0x0b),
        }
    }

    #[test]
    fn test_price_curve_example() {
        // 1000 starting, 1 per hour, 42 hours, clock counting hours
        let auction = Auction::open(1, 0, 42).unwrap();

        assert_eq!(auction.price_at(0, 1_000, 1).unwrap(), 1_000);
        assert_eq!(auction.price_at(10, 1_000, 1).unwrap(), 990);
        assert_eq!(auction.price_at(41, 1_000, 1).unwrap(), 959);
        assert!(auction.price_at(42, 1_000, 1).is_err());
    }

    #[test]
    fn test_price_is_non_increasing() {
        let auction = Auction::open(3, 500, 100).unwrap();
        let mut last = Amount::MAX;
        for now in 500..600 {
            let price = auction.price_at(now, 10_000, 7).unwrap();
            assert!(price <= last);
            last = price;
        }
    }

    #[test]
    fn test_status_transitions() {
        let mut auction = Auction::open(1, 10, 5).unwrap();
        assert_eq!(auction.status(12), AuctionStatus::Open);
        assert_eq!(auction.status(15), AuctionStatus::Void);

        auction.winner = Some(Address::repeat_byte(1));
        assert_eq!(auction.status(15), AuctionStatus::Won);

        auction.funds_forwarded = true;
        assert_eq!(auction.status(15), AuctionStatus::FundsForwarded);
    }

    #[test]
    fn test_expiry_overflow() {
        assert!(Auction::open(1, u64::MAX, 1).is_err());
    }

    #[test]
    fn test_metadata_validation() {
        assert!(metadata().validate().is_ok());

        let mut blank_name = metadata();
        blank_name.display_name = "  ".to_string();
        assert!(blank_name.validate().is_err());

        let mut blank_network = metadata();
        blank_network.network_id = String::new();
        assert!(blank_network.validate().is_err());

        let mut zero_token = metadata();
        zero_token.mining_token = Address::ZERO;
        assert!(zero_token.validate().is_err());

        let mut zero_bidder = metadata();
        zero_bidder.mining_bidder = Address::ZERO;
        assert!(zero_bidder.validate().is_err());
    }
}
