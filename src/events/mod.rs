//! In-process delivery of committed ledger events.
//!
//! Every committed transaction produces a `Commit` notice, and a `Contract`
//! event when the operation emitted one (e.g. `AssetCreated`). Nothing is
//! delivered for transactions that fail. Subscribers have bounded buffers and
//! are dropped when they fall behind.
//!
//! # Example
//!
//! ```ignore
//! let handle = ledger.subscribe(EventFilter::named(vec!["AssetCreated".into()]));
//!
//! while let Ok(event) = handle.recv() {
//!     match event {
//!         LedgerEvent::Contract { name, payload, .. } => println!("{name}: {payload:?}"),
//!         LedgerEvent::Dropped { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::EventHub;
pub use types::{
    DropReason, EventFilter, LedgerEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
