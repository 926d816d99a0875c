//! Mine Chain Runtime
//!
//! Wires the auction engine, the vault engine and the in-memory ledger into
//! one chain state with transactional execution, and loads the chain layout
//! from TOML.

pub mod config;
pub mod runtime;
pub mod state;

pub use config::{devnet, ChainConfig, ConfigError, GenesisBalance, GenesisConfig};
pub use runtime::{Runtime, Tx};
pub use state::ChainState;
