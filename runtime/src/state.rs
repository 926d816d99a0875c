//! Chain state: both engines plus the ledger they move value through

use crate::config::ChainConfig;
use mine_auction::AuctionEngine;
use mine_core::{CallContext, Event, InMemoryLedger, Result};
use mine_vault::DecayVaultEngine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub auction: AuctionEngine,
    pub vaults: DecayVaultEngine,
    pub ledger: InMemoryLedger,
}

impl ChainState {
    /// Fund the genesis accounts and deploy both engines from the genesis
    /// owner at the start step. Returns the deployment events alongside.
    pub fn genesis(config: &ChainConfig) -> Result<(Self, Vec<Event>)> {
        let mut ledger = InMemoryLedger::new();
        for grant in &config.genesis.balances {
            ledger.mint(&grant.token, &grant.account, grant.amount)?;
        }

        let mut events: Vec<Event> = Vec::new();
        let owner = config.genesis.owner;
        let start = config.genesis.start_step;
        let (auction, vaults) = {
            let mut ctx = CallContext::new(owner, start, &mut ledger, &mut events);
            let auction = AuctionEngine::deploy(&mut ctx, config.auction.clone())?;
            let vaults = DecayVaultEngine::deploy(&mut ctx, config.vault.clone())?;
            (auction, vaults)
        };

        log::info!(
            "🌱 Genesis at step {}: {} balances funded, owner {}",
            start,
            config.genesis.balances.len(),
            owner.short()
        );

        Ok((
            Self {
                auction,
                vaults,
                ledger,
            },
            events,
        ))
    }
}
