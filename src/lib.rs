//! # Asset Ledger
//!
//! A keyed record store with an append-only change history for every key.
//!
//! ## Core Concepts
//!
//! - **Records**: dealer profiles or general assets, stored as compact JSON
//! - **Ledger**: a single transaction log; each commit frames every write and
//!   its event together, so a value never changes without a history entry
//! - **History**: every write to a key, oldest first, with tombstones
//! - **Contract**: `createAsset` / `updateAsset` / `queryAsset` /
//!   `getAssetHistory` dispatch over positional string arguments
//!
//! ## Example
//!
//! ```ignore
//! use asset_ledger::{Contract, LedgerConfig, Response};
//!
//! let contract = Contract::open(LedgerConfig::at("./my-ledger"))?;
//!
//! let args: Vec<String> = ["D1", "9990001", "1234", "1000", "ACTIVE", "0", "NA", "first"]
//!     .iter()
//!     .map(|s| s.to_string())
//!     .collect();
//! contract.invoke("createAsset", &args);
//!
//! // [{"TxId":"..", "Value":{"DEALERID":"D1",..}, "Timestamp":"..", "IsDelete":"false"}]
//! let history = contract.invoke("getAssetHistory", &["D1".to_string()]);
//! ```

pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod ledger;
pub mod record;
pub mod service;
pub mod types;

// Re-exports
pub use config::LedgerConfig;
pub use contract::{Contract, Function, Registry, Response, FUNCTION_NAMES};
pub use error::{ErrorKind, LedgerError, Result};
pub use events::{
    DropReason, EventFilter, EventHub, LedgerEvent, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId,
};
pub use ledger::{
    encode_history, CommitReceipt, HistoryEntry, HistoryIter, HistoryLedger, Ledger, LedgerStats,
    RecordStore, TxContext,
};
pub use record::{check_arity, AssetRecord, DealerProfile, RecordSchema, RecordVariant};
pub use service::{
    RecordService, CREATE_ASSET, DELETE_ASSET, EVENT_CREATED, EVENT_DELETED, EVENT_UPDATED,
    GET_ASSET_HISTORY, QUERY_ASSET, UPDATE_ASSET,
};
pub use types::{ContractEvent, Sequence, Timestamp, TimestampFormat, TxId};
