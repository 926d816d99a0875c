//! Mine Auction Engine
//!
//! Recurring descending-price auction for the right to direct mining:
//! - One auction open at a time, price falling linearly until expiry
//! - A winning bid pays the curve price and opens the next auction at once
//! - Proceeds are forwarded once to the mining-deposit recipient
//! - Fees deposited after an auction accrue to its winner (one claim)

pub mod auction;
pub mod config;
pub mod engine;
pub mod fee_vault;

pub use auction::{Auction, AuctionStatus, WinnerMetadata};
pub use config::{
    AuctionConfig, DEFAULT_DISCOUNT_RATE, DEFAULT_DURATION, DEFAULT_STARTING_PRICE, HOUR,
    TOKEN_UNIT,
};
pub use engine::{AuctionEngine, AuctionRecords, BidReceipt};
pub use fee_vault::FeeVault;
