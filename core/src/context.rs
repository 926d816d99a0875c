//! Per-transaction call context
//!
//! Everything an engine operation may consult or touch outside its own
//! records is reached through [`CallContext`]: who is calling, the ledger step
//! the transaction executes at, the value-transfer primitive and the event
//! sink. There is no ambient global state.

use crate::error::Result;
use crate::events::{Event, EventSink};
use crate::ledger::ValueTransfer;
use crate::{Address, Amount};

pub struct CallContext<'a> {
    caller: Address,
    now: u64,
    bank: &'a mut dyn ValueTransfer,
    events: &'a mut dyn EventSink,
}

impl<'a> CallContext<'a> {
    pub fn new(
        caller: Address,
        now: u64,
        bank: &'a mut dyn ValueTransfer,
        events: &'a mut dyn EventSink,
    ) -> Self {
        Self {
            caller,
            now,
            bank,
            events,
        }
    }

    pub fn caller(&self) -> &Address {
        &self.caller
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn emit(&mut self, event: Event) {
        self.events.emit(event);
    }

    pub fn balance_of(&self, token: &Address, account: &Address) -> Amount {
        self.bank.balance_of(token, account)
    }

    /// Pull `amount` of `token` from the caller into `engine`'s account,
    /// spending the allowance the caller granted the engine.
    pub fn pull_from_caller(
        &mut self,
        token: &Address,
        engine: &Address,
        amount: Amount,
    ) -> Result<()> {
        let caller = self.caller;
        self.bank
            .transfer_from(token, engine, &caller, engine, amount)?;
        Ok(())
    }

    /// Pay `amount` of `token` out of `engine`'s account
    pub fn pay(
        &mut self,
        token: &Address,
        engine: &Address,
        recipient: &Address,
        amount: Amount,
    ) -> Result<()> {
        self.bank.transfer(token, engine, recipient, amount)?;
        Ok(())
    }
}

/// Run `op` against a staged copy of `state` and commit it only on success.
/// A failed operation leaves `state` exactly as it was.
pub fn atomically<S, T, E>(state: &mut S, op: impl FnOnce(&mut S) -> std::result::Result<T, E>) -> std::result::Result<T, E>
where
    S: Clone,
{
    let mut staged = state.clone();
    let out = op(&mut staged)?;
    *state = staged;
    Ok(out)
}
