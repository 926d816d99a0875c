//! Value transfer
//!
//! The engines move exact-integer token amounts through the [`ValueTransfer`]
//! trait and never touch balances directly. Any failure aborts the enclosing
//! transaction. [`InMemoryLedger`] is the multi-token reference ledger used by
//! the runtime, the simulator and the tests.

use crate::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient {token} balance for {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        token: Address,
        account: Address,
        requested: Amount,
        available: Amount,
    },

    #[error("Insufficient {token} allowance from {owner} to {spender}: requested {requested}, approved {approved}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        requested: Amount,
        approved: Amount,
    },

    #[error("Transfer of {token} rejected: {reason}")]
    Rejected { token: Address, reason: String },

    #[error("{token} balance overflow for {account}")]
    Overflow { token: Address, account: Address },
}

/// Token transfer primitive consumed by the engines
pub trait ValueTransfer {
    /// Move `amount` of `token` from `from` to `to`. `from` is always the
    /// calling engine's own account.
    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Move `amount` of `token` from `owner` to `to`, spending the allowance
    /// `owner` granted to `spender`.
    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;

    fn balance_of(&self, token: &Address, account: &Address) -> Amount;
}

/// Multi-token balance sheet with ERC-20 style allowances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryLedger {
    /// token -> account -> balance
    balances: BTreeMap<Address, BTreeMap<Address, Amount>>,
    /// token -> owner -> spender -> remaining allowance
    allowances: BTreeMap<Address, BTreeMap<Address, BTreeMap<Address, Amount>>>,
    /// Tokens whose transfers currently fail (halted token contracts)
    #[serde(default)]
    halted: BTreeSet<Address>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit freshly issued tokens to `account`
    pub fn mint(
        &mut self,
        token: &Address,
        account: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let balance = self.balance_entry(token, account);
        *balance = balance.checked_add(amount).ok_or(TransferError::Overflow {
            token: *token,
            account: *account,
        })?;
        Ok(())
    }

    /// Set the allowance `owner` grants `spender`, replacing any previous value
    pub fn approve(&mut self, token: &Address, owner: &Address, spender: &Address, amount: Amount) {
        self.allowances
            .entry(*token)
            .or_default()
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
    }

    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(token)
            .and_then(|owners| owners.get(owner))
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Make every transfer of `token` fail until [`InMemoryLedger::resume`]
    pub fn halt(&mut self, token: &Address) {
        self.halted.insert(*token);
    }

    pub fn resume(&mut self, token: &Address) {
        self.halted.remove(token);
    }

    /// Sum of all balances of `token`
    pub fn total_supply(&self, token: &Address) -> Amount {
        self.balances
            .get(token)
            .map(|accounts| {
                accounts
                    .values()
                    .fold(0, |total: Amount, balance| total.saturating_add(*balance))
            })
            .unwrap_or(0)
    }

    fn balance_entry(&mut self, token: &Address, account: &Address) -> &mut Amount {
        self.balances
            .entry(*token)
            .or_default()
            .entry(*account)
            .or_insert(0)
    }

    fn ensure_live(&self, token: &Address) -> Result<(), TransferError> {
        if self.halted.contains(token) {
            return Err(TransferError::Rejected {
                token: *token,
                reason: "token transfers are halted".to_string(),
            });
        }
        Ok(())
    }

    fn move_balance(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let available = self.balance_of(token, from);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                token: *token,
                account: *from,
                requested: amount,
                available,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }

        let receiver = self.balance_of(token, to);
        let credited = receiver.checked_add(amount).ok_or(TransferError::Overflow {
            token: *token,
            account: *to,
        })?;

        *self.balance_entry(token, from) = available - amount;
        *self.balance_entry(token, to) = credited;
        Ok(())
    }
}

impl ValueTransfer for InMemoryLedger {
    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.ensure_live(token)?;
        self.move_balance(token, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.ensure_live(token)?;

        let approved = self.allowance(token, owner, spender);
        if approved < amount {
            return Err(TransferError::InsufficientAllowance {
                token: *token,
                owner: *owner,
                spender: *spender,
                requested: amount,
                approved,
            });
        }

        self.move_balance(token, owner, to, amount)?;
        self.approve(token, owner, spender, approved - amount);
        Ok(())
    }

    fn balance_of(&self, token: &Address, account: &Address) -> Amount {
        self.balances
            .get(token)
            .and_then(|accounts| accounts.get(account))
            .copied()
            .unwrap_or(0)
    }
}
