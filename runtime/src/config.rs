//! Chain configuration
//!
//! One TOML file describes both engines and the genesis ledger:
//!
//! ```toml
//! [auction]
//! auction_token = "0x1111111111111111111111111111111111111111"
//! starting_price = 100000000000
//!
//! [vault]
//! settlement = "swept"
//!
//! [genesis]
//! owner = "0x0101010101010101010101010101010101010101"
//!
//! [[genesis.balances]]
//! token = "0x1111111111111111111111111111111111111111"
//! account = "0x0101010101010101010101010101010101010101"
//! amount = 100000000000000
//! ```
//!
//! Missing sections fall back to the devnet layout from
//! [`ChainConfig::devnet`].

use mine_auction::AuctionConfig;
use mine_core::{Address, Amount, EngineError};
use mine_vault::{SettlementStrategy, VaultConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<EngineError> for ConfigError {
    fn from(err: EngineError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

pub mod devnet {
    use mine_core::{Address, Amount};

    pub const OWNER: Address = Address::repeat_byte(0x01);
    pub const MINE_TOKEN: Address = Address::repeat_byte(0x11);
    pub const FEE_TOKEN: Address = Address::repeat_byte(0x22);
    pub const AUCTION_ENGINE: Address = Address::repeat_byte(0xae);
    pub const VAULT_ENGINE: Address = Address::repeat_byte(0x7e);
    pub const MINING_RECIPIENT: Address = Address::repeat_byte(0x3e);
    pub const DEDUCTION_RECIPIENT: Address = Address::repeat_byte(0xdd);

    /// Funded accounts besides the owner
    pub const ACCOUNTS: [Address; 3] = [
        Address::repeat_byte(0xa1),
        Address::repeat_byte(0xb2),
        Address::repeat_byte(0xc3),
    ];

    /// One million tokens at 8 decimals
    pub const GRANT: Amount = 100_000_000_000_000;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub token: Address,
    pub account: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Deploys both engines and owns the auction engine
    pub owner: Address,
    /// Ledger step the chain starts at
    pub start_step: u64,
    pub balances: Vec<GenesisBalance>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        let mut balances = Vec::new();
        for account in std::iter::once(devnet::OWNER).chain(devnet::ACCOUNTS) {
            for token in [devnet::MINE_TOKEN, devnet::FEE_TOKEN] {
                balances.push(GenesisBalance {
                    token,
                    account,
                    amount: devnet::GRANT,
                });
            }
        }

        Self {
            owner: devnet::OWNER,
            start_step: 0,
            balances,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub auction: AuctionConfig,
    pub vault: VaultConfig,
    pub genesis: GenesisConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::devnet()
    }
}

impl ChainConfig {
    /// Local development chain: MINE is auctioned for fees and locked in
    /// vaults, fees are paid in a second token.
    pub fn devnet() -> Self {
        Self {
            auction: AuctionConfig {
                auction_token: devnet::MINE_TOKEN,
                fee_token: devnet::FEE_TOKEN,
                engine_account: devnet::AUCTION_ENGINE,
                mining_recipient: devnet::MINING_RECIPIENT,
                ..AuctionConfig::default()
            },
            vault: VaultConfig {
                deposit_token: devnet::MINE_TOKEN,
                fee_token: devnet::FEE_TOKEN,
                engine_account: devnet::VAULT_ENGINE,
                deduction_recipient: devnet::DEDUCTION_RECIPIENT,
                settlement: SettlementStrategy::Swept,
                ..VaultConfig::default()
            },
            genesis: GenesisConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate TOML configuration
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ChainConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auction.validate()?;
        self.vault.validate()?;

        if self.genesis.owner.is_zero() {
            return Err(ConfigError::Invalid("genesis owner is not set".to_string()));
        }
        if self.auction.engine_account == self.vault.engine_account {
            return Err(ConfigError::Invalid(
                "auction and vault engines must use separate accounts".to_string(),
            ));
        }
        for balance in &self.genesis.balances {
            if balance.token.is_zero() || balance.account.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "genesis balance of {} for {} names the zero address",
                    balance.amount, balance.account
                )));
            }
        }

        Ok(())
    }

    /// Genesis grants of `token`, in file order
    pub fn grants_of<'a>(&'a self, token: &'a Address) -> impl Iterator<Item = &'a GenesisBalance> {
        self.genesis
            .balances
            .iter()
            .filter(move |balance| &balance.token == token)
    }
}
