//! Mine Auction Core Library
//!
//! Primitives shared by the auction and vault engines:
//! - Addresses and exact-integer amounts
//! - The ledger clock the engines read but never advance
//! - The value-transfer interface and an in-memory reference ledger
//! - Error taxonomy, observability events and the owner capability
//! - The per-transaction call context

pub mod access;
pub mod address;
pub mod clock;
pub mod context;
pub mod error;
pub mod events;
pub mod ledger;

/// Token amounts in base units. No fractional values exist anywhere.
pub type Amount = u64;

pub use access::Ownership;
pub use address::{Address, AddressError};
pub use clock::{LedgerClock, ManualClock};
pub use context::{atomically, CallContext};
pub use error::{EngineError, ErrorKind, Result};
pub use events::{Event, EventLog, EventSink, RecordedEvent};
pub use ledger::{InMemoryLedger, TransferError, ValueTransfer};
