//! Transaction runtime
//!
//! Serializes every state-changing operation and gives each one
//! all-or-nothing semantics:
//! - `now` is read from the clock once per transaction, while holding the
//!   state lock
//! - the operation runs against a staged copy of the chain state, which
//!   replaces the live state only when the operation returns `Ok`
//! - events reach the journal only on commit
//!
//! Calls from other threads wait for the lock. A nested call from inside a
//! running transaction on the same thread is rejected with a state conflict
//! instead of deadlocking or observing half-applied effects.

use crate::config::ChainConfig;
use crate::state::ChainState;
use mine_auction::AuctionEngine;
use mine_core::{
    atomically, Address, Amount, CallContext, EngineError, Event, EventLog, InMemoryLedger,
    LedgerClock, RecordedEvent, Result,
};
use mine_vault::DecayVaultEngine;
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::RefCell;

/// Mutable view handed to a transaction body
pub struct Tx<'a> {
    pub auction: &'a mut AuctionEngine,
    pub vaults: &'a mut DecayVaultEngine,
    pub ctx: CallContext<'a>,
}

pub struct Runtime<C: LedgerClock> {
    state: ReentrantMutex<RefCell<ChainState>>,
    journal: Mutex<EventLog>,
    clock: C,
}

impl<C: LedgerClock> Runtime<C> {
    /// Start a fresh chain from `config`
    pub fn genesis(config: &ChainConfig, clock: C) -> Result<Self> {
        let (state, events) = ChainState::genesis(config)?;
        let mut journal = EventLog::new();
        journal.record(config.genesis.start_step, events);
        Ok(Self::from_parts(state, journal, clock))
    }

    /// Resume from previously persisted state
    pub fn from_parts(state: ChainState, journal: EventLog, clock: C) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(state)),
            journal: Mutex::new(journal),
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Run `op` as one transaction sent by `caller`
    pub fn execute<T>(&self, caller: Address, op: impl FnOnce(&mut Tx<'_>) -> Result<T>) -> Result<T> {
        let guard = self.state.lock();
        let mut state = guard
            .try_borrow_mut()
            .map_err(|_| EngineError::conflict("reentrant call rejected"))?;
        // read under the lock so commit order follows the clock
        let now = self.clock.now();

        let mut events: Vec<Event> = Vec::new();
        let out = atomically(&mut *state, |staged| {
            let ChainState {
                auction,
                vaults,
                ledger,
            } = staged;
            let mut tx = Tx {
                auction,
                vaults,
                ctx: CallContext::new(caller, now, ledger, &mut events),
            };
            op(&mut tx)
        });

        match &out {
            Ok(_) => self.journal.lock().record(now, events),
            Err(err) => log::warn!(
                "❌ Transaction from {} at step {} reverted: {}",
                caller.short(),
                now,
                err
            ),
        }
        out
    }

    /// Grant `spender` an allowance over `owner`'s `token`, as `owner`
    pub fn approve(&self, owner: Address, token: Address, spender: Address, amount: Amount) -> Result<()> {
        self.with_ledger(|ledger| {
            ledger.approve(&token, &owner, &spender, amount);
            Ok(())
        })?;
        log::info!(
            "✍️  {} approved {} of {} for {}",
            owner.short(),
            amount,
            token.short(),
            spender.short()
        );
        Ok(())
    }

    /// Issue new `token` to `account`. Only meaningful on development chains.
    pub fn mint(&self, token: Address, account: Address, amount: Amount) -> Result<()> {
        self.with_ledger(|ledger| Ok(ledger.mint(&token, &account, amount)?))?;
        log::info!("🪙 Minted {} of {} to {}", amount, token.short(), account.short());
        Ok(())
    }

    /// Read-only access to the committed state
    pub fn query<T>(&self, op: impl FnOnce(&ChainState) -> T) -> Result<T> {
        let guard = self.state.lock();
        let state = guard
            .try_borrow()
            .map_err(|_| EngineError::conflict("state is locked by a running transaction"))?;
        Ok(op(&state))
    }

    /// Copy of the committed state
    pub fn snapshot(&self) -> Result<ChainState> {
        self.query(ChainState::clone)
    }

    /// Copy of the event journal
    pub fn journal(&self) -> EventLog {
        self.journal.lock().clone()
    }

    /// Last `count` committed events
    pub fn recent_events(&self, count: usize) -> Vec<RecordedEvent> {
        self.journal.lock().tail(count).to_vec()
    }

    fn with_ledger<T>(&self, op: impl FnOnce(&mut InMemoryLedger) -> Result<T>) -> Result<T> {
        let guard = self.state.lock();
        let mut state = guard
            .try_borrow_mut()
            .map_err(|_| EngineError::conflict("reentrant call rejected"))?;
        atomically(&mut state.ledger, op)
    }
}
