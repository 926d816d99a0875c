//! Mine Storage Layer - sled-backed chain state
//!
//! Every record lives under its own key so a snapshot can be inspected
//! record by record:
//! - `meta:auction`, `meta:vaults` - engine headers without their records
//! - `meta:ledger`, `meta:clock` - balances and the last ledger step
//! - `auction:{id}`, `fee_vault:{id}` - auction records
//! - `vault:{owner}:{index}`, `vault_count:{owner}`, `registry:{seq}`
//! - `window:{id}` - fee windows
//! - `event:{seq}` - committed event journal
//!
//! Values are bincode. A save replaces the whole image in one batch, so a
//! crash never leaves half of a transaction on disk.

use mine_auction::{AuctionEngine, AuctionRecords};
use mine_core::{EventLog, InMemoryLedger, RecordedEvent};
use mine_runtime::ChainState;
use mine_vault::{DecayVaultEngine, VaultKey, VaultRecords};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const META_AUCTION: &str = "meta:auction";
const META_VAULTS: &str = "meta:vaults";
const META_LEDGER: &str = "meta:ledger";
const META_CLOCK: &str = "meta:clock";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("No chain stored in {0}")]
    NotInitialized(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Everything needed to resume a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChain {
    pub clock: u64,
    pub state: ChainState,
    pub events: Vec<RecordedEvent>,
}

impl StoredChain {
    pub fn journal(&self) -> EventLog {
        EventLog::from_entries(self.events.clone())
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    db: sled::Db,
    path: PathBuf,
}

impl StateStore {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }
        let db = sled::open(&path)?;
        Ok(Self { db, path })
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a chain has been saved here
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.db.contains_key(META_AUCTION)?)
    }

    /// Replace the stored image with `state`, `journal` and `clock`
    pub fn save(&self, state: &ChainState, journal: &EventLog, clock: u64) -> Result<()> {
        let mut records: Vec<(String, Vec<u8>)> = Vec::new();

        let (auction, auction_records) = state.auction.split_records();
        let (vaults, vault_records) = state.vaults.split_records();

        records.push((META_AUCTION.to_string(), encode(&auction)?));
        records.push((META_VAULTS.to_string(), encode(&vaults)?));
        records.push((META_LEDGER.to_string(), encode(&state.ledger)?));
        records.push((META_CLOCK.to_string(), encode(&clock)?));

        for auction in &auction_records.auctions {
            records.push((auction_key(auction.id), encode(auction)?));
        }
        for (id, fee_vault) in &auction_records.fee_vaults {
            records.push((fee_vault_key(*id), encode(fee_vault)?));
        }

        for (key, vault) in &vault_records.vaults {
            records.push((
                format!("vault:{}:{:020}", key.owner, key.index),
                encode(vault)?,
            ));
        }
        for (owner, count) in &vault_records.vault_counts {
            records.push((format!("vault_count:{}", owner), encode(count)?));
        }
        for (seq, key) in vault_records.registry.iter().enumerate() {
            records.push((format!("registry:{:020}", seq), encode(key)?));
        }
        for window in &vault_records.windows {
            records.push((format!("window:{:020}", window.window_id), encode(window)?));
        }

        for entry in journal.entries() {
            records.push((format!("event:{:020}", entry.sequence), encode(entry)?));
        }

        let mut batch = sled::Batch::default();
        let fresh: BTreeSet<&str> = records.iter().map(|(key, _)| key.as_str()).collect();
        for existing in self.db.iter().keys() {
            let existing = existing?;
            let stale = std::str::from_utf8(&existing)
                .map(|key| !fresh.contains(key))
                .unwrap_or(true);
            if stale {
                batch.remove(existing);
            }
        }
        for (key, value) in &records {
            batch.insert(key.as_bytes(), value.as_slice());
        }

        self.db.apply_batch(batch)?;
        // Flush to disk so the image survives a restart
        self.db.flush()?;

        log::debug!(
            "💾 Saved {} records at step {} to {}",
            records.len(),
            clock,
            self.path.display()
        );
        Ok(())
    }

    /// Load the stored chain, or `None` if nothing was saved yet
    pub fn load(&self) -> Result<Option<StoredChain>> {
        let Some(auction_header) = self.get::<AuctionEngine>(META_AUCTION)? else {
            return Ok(None);
        };
        let vault_header: DecayVaultEngine = self.require(META_VAULTS)?;
        let ledger: InMemoryLedger = self.require(META_LEDGER)?;
        let clock: u64 = self.require(META_CLOCK)?;

        let auction_records = AuctionRecords {
            auctions: self.scan("auction:")?,
            fee_vaults: self.scan_keyed("fee_vault:", |id| id.parse::<u64>().ok())?,
        };
        let auction = AuctionEngine::from_records(auction_header, auction_records)
            .map_err(|e| corrupt(META_AUCTION, e))?;

        let vault_records = VaultRecords {
            vaults: self.scan_keyed("vault:", parse_vault_key)?,
            vault_counts: self.scan_keyed("vault_count:", |owner| owner.parse().ok())?,
            registry: self.scan("registry:")?,
            windows: self.scan("window:")?,
        };
        let vaults = DecayVaultEngine::from_records(vault_header, vault_records)
            .map_err(|e| corrupt(META_VAULTS, e))?;

        let events: Vec<RecordedEvent> = self.scan("event:")?;
        for (position, entry) in events.iter().enumerate() {
            if entry.sequence != position as u64 {
                return Err(corrupt(
                    &format!("event:{:020}", entry.sequence),
                    format!("expected sequence {}", position),
                ));
            }
        }

        Ok(Some(StoredChain {
            clock,
            state: ChainState {
                auction,
                vaults,
                ledger,
            },
            events,
        }))
    }

    /// Write a pretty-printed JSON dump of the stored chain
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let chain = self
            .load()?
            .ok_or_else(|| StorageError::NotInitialized(self.path.display().to_string()))?;
        let json = serde_json::to_string_pretty(&chain)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(path.as_ref(), &json)?;

        log::info!("📦 Exported chain at step {} to {}", chain.clock, path.as_ref().display());
        Ok(json.len())
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key)? {
            Some(data) => Ok(Some(decode(key, &data)?)),
            None => Ok(None),
        }
    }

    fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get(key)?.ok_or_else(|| corrupt(key, "missing"))
    }

    /// Values under `prefix`, in key order
    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (key, value) = item?;
            out.push(decode(&String::from_utf8_lossy(&key), &value)?);
        }
        Ok(out)
    }

    /// `(parsed key suffix, value)` pairs under `prefix`
    fn scan_keyed<K, T: DeserializeOwned>(
        &self,
        prefix: &str,
        parse: impl Fn(&str) -> Option<K>,
    ) -> Result<Vec<(K, T)>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (key, value) = item?;
            let text = String::from_utf8_lossy(&key).into_owned();
            let id = parse(&text[prefix.len()..]).ok_or_else(|| corrupt(&text, "unreadable key"))?;
            out.push((id, decode(&text, &value)?));
        }
        Ok(out)
    }
}

fn auction_key(id: u64) -> String {
    format!("auction:{:020}", id)
}

fn fee_vault_key(id: u64) -> String {
    format!("fee_vault:{:020}", id)
}

/// `{owner}:{index}`
fn parse_vault_key(suffix: &str) -> Option<VaultKey> {
    let (owner, index) = suffix.split_once(':')?;
    Some(VaultKey::new(owner.parse().ok()?, index.parse().ok()?))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(key: &str, data: &[u8]) -> Result<T> {
    bincode::deserialize(data).map_err(|e| corrupt(key, e))
}

fn corrupt(key: &str, reason: impl ToString) -> StorageError {
    StorageError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
