//! Observability events
//!
//! Engines report what they did through an [`EventSink`]. Events are
//! informational only: nothing in the engines reads them back.

use crate::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AuctionStarted {
        auction_id: u64,
        start_time: u64,
        expiry_time: u64,
    },
    AuctionWon {
        auction_id: u64,
        winner: Address,
        price: Amount,
        display_name: String,
    },
    AuctionRestarted {
        void_auction_id: u64,
        auction_id: u64,
    },
    FundsForwarded {
        auction_id: u64,
        recipient: Address,
        amount: Amount,
    },
    FeeDeposited {
        auction_id: u64,
        depositor: Address,
        amount: Amount,
    },
    FeeClaimed {
        auction_id: u64,
        winner: Address,
        amount: Amount,
    },
    VaultCreated {
        owner: Address,
        vault_id: u64,
        amount: Amount,
    },
    VaultWithdrawn {
        owner: Address,
        vault_id: u64,
        amount: Amount,
    },
    DeductionsCollected {
        recipient: Address,
        amount: Amount,
        vaults: u64,
    },
    WindowFeesDeposited {
        window_id: u64,
        depositor: Address,
        amount: Amount,
    },
    WindowFinalized {
        window_id: u64,
        eligible_vaults: u64,
        total_pooled: Amount,
    },
    WindowFeesClaimed {
        window_id: u64,
        owner: Address,
        vault_id: u64,
        amount: Amount,
    },
    OwnershipTransferred {
        previous: Address,
        owner: Address,
    },
    PauseChanged {
        paused: bool,
    },
    MiningRecipientUpdated {
        recipient: Address,
    },
    EmergencyWithdrawal {
        token: Address,
        recipient: Address,
        amount: Amount,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::AuctionStarted {
                auction_id,
                start_time,
                expiry_time,
            } => write!(
                f,
                "auction #{} started at {} (expires {})",
                auction_id, start_time, expiry_time
            ),
            Event::AuctionWon {
                auction_id,
                winner,
                price,
                display_name,
            } => write!(
                f,
                "auction #{} won by {} ({}) at {}",
                auction_id,
                display_name,
                winner.short(),
                price
            ),
            Event::AuctionRestarted {
                void_auction_id,
                auction_id,
            } => write!(
                f,
                "auction #{} expired unsold, restarted as #{}",
                void_auction_id, auction_id
            ),
            Event::FundsForwarded {
                auction_id,
                recipient,
                amount,
            } => write!(
                f,
                "auction #{} proceeds {} forwarded to {}",
                auction_id,
                amount,
                recipient.short()
            ),
            Event::FeeDeposited {
                auction_id,
                depositor,
                amount,
            } => write!(
                f,
                "{} deposited {} fees for auction #{}",
                depositor.short(),
                amount,
                auction_id
            ),
            Event::FeeClaimed {
                auction_id,
                winner,
                amount,
            } => write!(
                f,
                "{} claimed {} fees of auction #{}",
                winner.short(),
                amount,
                auction_id
            ),
            Event::VaultCreated {
                owner,
                vault_id,
                amount,
            } => write!(f, "vault {}#{} opened with {}", owner.short(), vault_id, amount),
            Event::VaultWithdrawn {
                owner,
                vault_id,
                amount,
            } => write!(
                f,
                "vault {}#{} withdrawn, {} returned",
                owner.short(),
                vault_id,
                amount
            ),
            Event::DeductionsCollected {
                recipient,
                amount,
                vaults,
            } => write!(
                f,
                "{} deductions from {} vault(s) sent to {}",
                amount,
                vaults,
                recipient.short()
            ),
            Event::WindowFeesDeposited {
                window_id,
                depositor,
                amount,
            } => write!(
                f,
                "{} pooled {} fees into window {}",
                depositor.short(),
                amount,
                window_id
            ),
            Event::WindowFinalized {
                window_id,
                eligible_vaults,
                total_pooled,
            } => write!(
                f,
                "window {} finalized: {} pooled across {} eligible vault(s)",
                window_id, total_pooled, eligible_vaults
            ),
            Event::WindowFeesClaimed {
                window_id,
                owner,
                vault_id,
                amount,
            } => write!(
                f,
                "{} claimed {} from window {} with vault #{}",
                owner.short(),
                amount,
                window_id,
                vault_id
            ),
            Event::OwnershipTransferred { previous, owner } => write!(
                f,
                "ownership transferred from {} to {}",
                previous.short(),
                owner.short()
            ),
            Event::PauseChanged { paused } => {
                write!(f, "bidding {}", if *paused { "paused" } else { "resumed" })
            }
            Event::MiningRecipientUpdated { recipient } => {
                write!(f, "mining recipient set to {}", recipient.short())
            }
            Event::EmergencyWithdrawal {
                token,
                recipient,
                amount,
            } => write!(
                f,
                "emergency withdrawal of {} {} to {}",
                amount,
                token.short(),
                recipient.short()
            ),
        }
    }
}

/// Destination for emitted events
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

/// Event with the position and ledger step at which it was committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub sequence: u64,
    pub at: u64,
    pub event: Event,
}

/// Append-only journal of committed events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    entries: Vec<RecordedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a journal from stored entries, which must be in sequence order
    pub fn from_entries(entries: Vec<RecordedEvent>) -> Self {
        Self { entries }
    }

    /// Append a batch of events committed at ledger step `at`
    pub fn record(&mut self, at: u64, events: impl IntoIterator<Item = Event>) {
        for event in events {
            log::info!("📣 {}", event);
            let sequence = self.entries.len() as u64;
            self.entries.push(RecordedEvent {
                sequence,
                at,
                event,
            });
        }
    }

    pub fn entries(&self) -> &[RecordedEvent] {
        &self.entries
    }

    /// Last `count` entries, oldest first
    pub fn tail(&self, count: usize) -> &[RecordedEvent] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
