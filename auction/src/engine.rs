//! Sequential Dutch auction engine
//!
//! Exactly one auction is current at any time. A winning bid records the
//! winner, collects the price and opens the next auction inside the same
//! call, so no caller ever observes a gap between auctions.

use crate::auction::{Auction, WinnerMetadata};
use crate::config::AuctionConfig;
use crate::fee_vault::FeeVault;
use mine_core::{Address, Amount, CallContext, EngineError, Event, Ownership, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of a successful bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidReceipt {
    pub auction_id: u64,
    pub price: Amount,
    pub next_auction_id: u64,
}

/// Auction and fee-vault records in storage order, see
/// [`AuctionEngine::split_records`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionRecords {
    pub auctions: Vec<Auction>,
    pub fee_vaults: Vec<(u64, FeeVault)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionEngine {
    pub(crate) config: AuctionConfig,
    pub(crate) ownership: Ownership,
    pub(crate) mining_recipient: Address,
    pub(crate) paused: bool,
    /// Id of the single current auction
    pub(crate) current_id: u64,
    pub(crate) auctions: BTreeMap<u64, Auction>,
    pub(crate) fee_vaults: BTreeMap<u64, FeeVault>,
}

impl AuctionEngine {
    /// Deploy the engine with the caller as owner and open auction 1 at the
    /// current ledger step.
    pub fn deploy(ctx: &mut CallContext<'_>, config: AuctionConfig) -> Result<Self> {
        config.validate()?;
        let ownership = Ownership::new(*ctx.caller())?;
        let first = Auction::open(1, ctx.now(), config.duration)?;

        ctx.emit(Event::AuctionStarted {
            auction_id: first.id,
            start_time: first.start_time,
            expiry_time: first.expiry_time,
        });
        log::info!(
            "🔨 Auction engine deployed by {}, auction #1 open until {}",
            ctx.caller().short(),
            first.expiry_time
        );

        let mut auctions = BTreeMap::new();
        auctions.insert(first.id, first);

        Ok(Self {
            mining_recipient: config.mining_recipient,
            config,
            ownership,
            paused: false,
            current_id: 1,
            auctions,
            fee_vaults: BTreeMap::new(),
        })
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn config(&self) -> &AuctionConfig {
        &self.config
    }

    pub fn owner(&self) -> &Address {
        self.ownership.owner()
    }

    pub fn mining_recipient(&self) -> &Address {
        &self.mining_recipient
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn current_auction_id(&self) -> u64 {
        self.current_id
    }

    pub fn current_auction(&self) -> Result<&Auction> {
        self.auctions.get(&self.current_id).ok_or_else(|| {
            EngineError::conflict(format!("current auction {} is missing", self.current_id))
        })
    }

    pub fn auction(&self, auction_id: u64) -> Option<&Auction> {
        self.auctions.get(&auction_id)
    }

    pub fn auctions(&self) -> impl Iterator<Item = &Auction> {
        self.auctions.values()
    }

    pub fn winner_metadata(&self, auction_id: u64) -> Option<&WinnerMetadata> {
        self.auctions
            .get(&auction_id)
            .and_then(|auction| auction.winner_metadata.as_ref())
    }

    /// Number of auctions that ended with a winner
    pub fn completed_auctions(&self) -> u64 {
        self.auctions.values().filter(|a| a.is_won()).count() as u64
    }

    /// Current price of the open auction
    pub fn get_price(&self, now: u64) -> Result<Amount> {
        self.price_at(self.current_id, now)
    }

    /// Curve price of auction `auction_id` at `now`
    pub fn price_at(&self, auction_id: u64, now: u64) -> Result<Amount> {
        let auction = self
            .auctions
            .get(&auction_id)
            .ok_or_else(|| EngineError::invalid(format!("unknown auction {}", auction_id)))?;
        auction.price_at(now, self.config.starting_price, self.config.discount_rate)
    }

    // ---------------------------------------------------------------
    // Bidding
    // ---------------------------------------------------------------

    /// Buy the current auction at the curve price.
    ///
    /// The winner is written before the price is pulled from the caller; the
    /// next auction is opened before returning.
    pub fn bid(&mut self, ctx: &mut CallContext<'_>, metadata: WinnerMetadata) -> Result<BidReceipt> {
        self.bid_for(ctx, self.current_id, metadata)
    }

    /// Like [`AuctionEngine::bid`], but only for auction `auction_id`. A bid
    /// aimed at an auction that has since been won or replaced is rejected
    /// instead of silently buying its successor.
    pub fn bid_for(
        &mut self,
        ctx: &mut CallContext<'_>,
        auction_id: u64,
        metadata: WinnerMetadata,
    ) -> Result<BidReceipt> {
        if self.paused {
            return Err(EngineError::conflict("bidding is paused"));
        }
        metadata.validate()?;

        if auction_id != self.current_id {
            return match self.auctions.get(&auction_id) {
                Some(auction) if auction.is_won() => Err(EngineError::conflict(format!(
                    "auction {} already won",
                    auction_id
                ))),
                Some(_) => Err(EngineError::conflict(format!(
                    "auction {} expired unsold",
                    auction_id
                ))),
                None => Err(EngineError::invalid(format!("unknown auction {}", auction_id))),
            };
        }

        let now = ctx.now();
        let caller = *ctx.caller();
        let starting_price = self.config.starting_price;
        let discount_rate = self.config.discount_rate;

        let auction = self.auctions.get_mut(&auction_id).ok_or_else(|| {
            EngineError::conflict(format!("current auction {} is missing", auction_id))
        })?;
        if auction.is_won() {
            return Err(EngineError::conflict(format!(
                "auction {} already won",
                auction_id
            )));
        }
        let price = auction.price_at(now, starting_price, discount_rate)?;

        let display_name = metadata.display_name.clone();
        auction.winner = Some(caller);
        auction.winning_price = price;
        auction.winner_metadata = Some(metadata);

        ctx.pull_from_caller(&self.config.auction_token, &self.config.engine_account, price)?;

        ctx.emit(Event::AuctionWon {
            auction_id,
            winner: caller,
            price,
            display_name,
        });
        let next_auction_id = self.open_next(ctx)?;

        log::info!(
            "🏆 Auction #{} won by {} at {}, auction #{} opened",
            auction_id,
            caller.short(),
            price,
            next_auction_id
        );

        Ok(BidReceipt {
            auction_id,
            price,
            next_auction_id,
        })
    }

    /// Replace a current auction that expired without a bid. The void
    /// auction stays on record with no winner.
    pub fn restart_expired_auction(&mut self, ctx: &mut CallContext<'_>) -> Result<u64> {
        let void_auction_id = self.current_id;
        let auction = self.current_auction()?;
        if auction.is_won() {
            return Err(EngineError::conflict(format!(
                "auction {} already won",
                void_auction_id
            )));
        }
        if !auction.is_expired(ctx.now()) {
            return Err(EngineError::conflict(format!(
                "auction {} is still open until {}",
                void_auction_id, auction.expiry_time
            )));
        }

        let auction_id = self.open_next(ctx)?;
        ctx.emit(Event::AuctionRestarted {
            void_auction_id,
            auction_id,
        });
        log::info!(
            "♻️  Auction #{} expired unsold, restarted as #{}",
            void_auction_id,
            auction_id
        );
        Ok(auction_id)
    }

    /// Forward a won auction's proceeds to the mining recipient. Anyone may
    /// trigger it; it succeeds once per auction.
    pub fn send_to_mine(&mut self, ctx: &mut CallContext<'_>, auction_id: u64) -> Result<Amount> {
        let recipient = self.mining_recipient;
        if recipient.is_zero() {
            return Err(EngineError::conflict("mining recipient is not configured"));
        }

        let auction = self
            .auctions
            .get_mut(&auction_id)
            .ok_or_else(|| EngineError::invalid(format!("unknown auction {}", auction_id)))?;
        if !auction.is_won() {
            return Err(EngineError::conflict(format!(
                "auction {} has no winner",
                auction_id
            )));
        }
        if auction.funds_forwarded {
            return Err(EngineError::conflict(format!(
                "auction {} proceeds already forwarded",
                auction_id
            )));
        }

        auction.funds_forwarded = true;
        let amount = auction.winning_price;

        ctx.pay(
            &self.config.auction_token,
            &self.config.engine_account,
            &recipient,
            amount,
        )?;
        ctx.emit(Event::FundsForwarded {
            auction_id,
            recipient,
            amount,
        });
        log::info!(
            "⛏️  Auction #{} proceeds {} sent to {}",
            auction_id,
            amount,
            recipient.short()
        );
        Ok(amount)
    }

    // ---------------------------------------------------------------
    // Administration (owner only)
    // ---------------------------------------------------------------

    pub fn set_mining_recipient(&mut self, ctx: &mut CallContext<'_>, recipient: Address) -> Result<()> {
        self.ownership.ensure_owner(ctx.caller())?;
        if recipient.is_zero() {
            return Err(EngineError::invalid("mining recipient cannot be the zero address"));
        }

        self.mining_recipient = recipient;
        ctx.emit(Event::MiningRecipientUpdated { recipient });
        Ok(())
    }

    pub fn set_paused(&mut self, ctx: &mut CallContext<'_>, paused: bool) -> Result<()> {
        self.ownership.ensure_owner(ctx.caller())?;

        self.paused = paused;
        ctx.emit(Event::PauseChanged { paused });
        log::info!("⏸️  Bidding {}", if paused { "paused" } else { "resumed" });
        Ok(())
    }

    pub fn transfer_ownership(&mut self, ctx: &mut CallContext<'_>, new_owner: Address) -> Result<()> {
        let event = self.ownership.transfer(ctx.caller(), new_owner)?;
        ctx.emit(event);
        Ok(())
    }

    /// Pause bidding and sweep the engine's whole balance of `token` to the
    /// owner. This is a deliberate trapdoor: it can move bid proceeds and
    /// unclaimed fees alike.
    pub fn emergency_withdraw(&mut self, ctx: &mut CallContext<'_>, token: Address) -> Result<Amount> {
        self.ownership.ensure_owner(ctx.caller())?;
        if token.is_zero() {
            return Err(EngineError::invalid("token cannot be the zero address"));
        }

        if !self.paused {
            self.paused = true;
            ctx.emit(Event::PauseChanged { paused: true });
        }

        let owner = *self.ownership.owner();
        let amount = ctx.balance_of(&token, &self.config.engine_account);
        ctx.pay(&token, &self.config.engine_account, &owner, amount)?;
        ctx.emit(Event::EmergencyWithdrawal {
            token,
            recipient: owner,
            amount,
        });
        log::warn!(
            "🚨 Emergency withdrawal of {} {} to owner {}",
            amount,
            token.short(),
            owner.short()
        );
        Ok(amount)
    }

    // ---------------------------------------------------------------
    // Persistence helpers
    // ---------------------------------------------------------------

    /// Split into a record-free header and the keyed records
    pub fn split_records(&self) -> (AuctionEngine, AuctionRecords) {
        let mut header = self.clone();
        let auctions = std::mem::take(&mut header.auctions).into_values().collect();
        let fee_vaults = std::mem::take(&mut header.fee_vaults).into_iter().collect();
        (
            header,
            AuctionRecords {
                auctions,
                fee_vaults,
            },
        )
    }

    /// Inverse of [`AuctionEngine::split_records`]
    pub fn from_records(mut header: AuctionEngine, records: AuctionRecords) -> Result<Self> {
        header.auctions = records
            .auctions
            .into_iter()
            .map(|auction| (auction.id, auction))
            .collect();
        header.fee_vaults = records.fee_vaults.into_iter().collect();

        if !header.auctions.contains_key(&header.current_id) {
            return Err(EngineError::invalid(format!(
                "records are missing current auction {}",
                header.current_id
            )));
        }
        Ok(header)
    }

    fn open_next(&mut self, ctx: &mut CallContext<'_>) -> Result<u64> {
        let next_id = self
            .current_id
            .checked_add(1)
            .ok_or_else(|| EngineError::arithmetic("auction id space exhausted"))?;
        let next = Auction::open(next_id, ctx.now(), self.config.duration)?;

        ctx.emit(Event::AuctionStarted {
            auction_id: next.id,
            start_time: next.start_time,
            expiry_time: next.expiry_time,
        });
        self.auctions.insert(next_id, next);
        self.current_id = next_id;
        Ok(next_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mine_core::{ErrorKind, InMemoryLedger, ValueTransfer};

    const OWNER: Address = Address::repeat_byte(0x01);
    const BIDDER: Address = Address::repeat_byte(0x02);
    const TOKEN: Address = Address::repeat_byte(0x70);
    const FEE_TOKEN: Address = Address::repeat_byte(0x7f);
    const ENGINE: Address = Address::repeat_byte(0xae);

    fn config() -> AuctionConfig {
        AuctionConfig {
            auction_token: TOKEN,
            fee_token: FEE_TOKEN,
            engine_account: ENGINE,
            starting_price: 1_000,
            discount_rate: 1,
            duration: 42,
            mining_recipient: Address::ZERO,
        }
    }

    fn metadata() -> WinnerMetadata {
        WinnerMetadata {
            display_name: "alpha".to_string(),
            network_id: "net-1".to_string(),
            mining_token: Address::repeat_byte(0x0a),
            mining_bidder: Address::repeat_byte(0x0b),
        }
    }

    fn deploy(ledger: &mut InMemoryLedger, events: &mut Vec<Event>) -> AuctionEngine {
        let mut ctx = CallContext::new(OWNER, 0, ledger, events);
        AuctionEngine::deploy(&mut ctx, config()).unwrap()
    }

    #[test]
    fn test_deploy_opens_first_auction() {
        let mut ledger = InMemoryLedger::new();
        let mut events: Vec<Event> = Vec::new();
        let engine = deploy(&mut ledger, &mut events);

        assert_eq!(engine.current_auction_id(), 1);
        assert_eq!(engine.owner(), &OWNER);
        let auction = engine.current_auction().unwrap();
        assert_eq!(auction.expiry_time, 42);
        assert_eq!(
            events,
            vec![Event::AuctionStarted {
                auction_id: 1,
                start_time: 0,
                expiry_time: 42
            }]
        );
    }

    #[test]
    fn test_bid_rolls_over() {
        let mut ledger = InMemoryLedger::new();
        let mut events: Vec<Event> = Vec::new();
        let mut engine = deploy(&mut ledger, &mut events);
        ledger.mint(&TOKEN, &BIDDER, 5_000).unwrap();
        ledger.approve(&TOKEN, &BIDDER, &ENGINE, 5_000);

        let mut ctx = CallContext::new(BIDDER, 10, &mut ledger, &mut events);
        let receipt = engine.bid(&mut ctx, metadata()).unwrap();

        assert_eq!(
            receipt,
            BidReceipt {
                auction_id: 1,
                price: 990,
                next_auction_id: 2
            }
        );
        let won = engine.auction(1).unwrap();
        assert_eq!(won.winner, Some(BIDDER));
        assert_eq!(won.winning_price, 990);

        let next = engine.current_auction().unwrap();
        assert_eq!(next.id, 2);
        assert_eq!(next.start_time, 10);
        assert_eq!(next.winner, None);
        assert_eq!(ledger.balance_of(&TOKEN, &ENGINE), 990);
    }

    #[test]
    fn test_bid_rejected_when_paused() {
        let mut ledger = InMemoryLedger::new();
        let mut events: Vec<Event> = Vec::new();
        let mut engine = deploy(&mut ledger, &mut events);

        let mut ctx = CallContext::new(OWNER, 1, &mut ledger, &mut events);
        engine.set_paused(&mut ctx, true).unwrap();

        let mut ctx = CallContext::new(BIDDER, 2, &mut ledger, &mut events);
        let err = engine.bid(&mut ctx, metadata()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[test]
    fn test_restart_requires_expiry() {
        let mut ledger = InMemoryLedger::new();
        let mut events: Vec<Event> = Vec::new();
        let mut engine = deploy(&mut ledger, &mut events);

        let mut ctx = CallContext::new(BIDDER, 41, &mut ledger, &mut events);
        assert!(engine.restart_expired_auction(&mut ctx).is_err());

        let mut ctx = CallContext::new(BIDDER, 42, &mut ledger, &mut events);
        assert_eq!(engine.restart_expired_auction(&mut ctx).unwrap(), 2);
        assert_eq!(engine.auction(1).unwrap().winner, None);
        assert_eq!(engine.get_price(42).unwrap(), 1_000);
    }

    #[test]
    fn test_admin_requires_owner() {
        let mut ledger = InMemoryLedger::new();
        let mut events: Vec<Event> = Vec::new();
        let mut engine = deploy(&mut ledger, &mut events);

        let mut ctx = CallContext::new(BIDDER, 1, &mut ledger, &mut events);
        let recipient = Address::repeat_byte(0x99);
        assert_eq!(
            engine.set_mining_recipient(&mut ctx, recipient).unwrap_err().kind(),
            ErrorKind::NotAuthorized
        );
        assert_eq!(
            engine.set_paused(&mut ctx, true).unwrap_err().kind(),
            ErrorKind::NotAuthorized
        );
        assert_eq!(
            engine.emergency_withdraw(&mut ctx, TOKEN).unwrap_err().kind(),
            ErrorKind::NotAuthorized
        );
        assert!(!engine.is_paused());
    }

    #[test]
    fn test_split_and_restore_records() {
        let mut ledger = InMemoryLedger::new();
        let mut events: Vec<Event> = Vec::new();
        let engine = deploy(&mut ledger, &mut events);

        let (header, records) = engine.split_records();
        assert_eq!(records.auctions.len(), 1);
        assert!(header.auction(1).is_none());

        let restored = AuctionEngine::from_records(header.clone(), records).unwrap();
        assert_eq!(restored, engine);

        assert!(AuctionEngine::from_records(header, AuctionRecords::default()).is_err());
    }
}
