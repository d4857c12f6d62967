//! Event and subscription types.

use crate::types::{Sequence, TxId};
use serde::{Deserialize, Serialize};

/// Unique subscription identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: EventFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: EventFilter::default(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// Contract event names to receive (None = all names).
    pub event_names: Option<Vec<String>>,

    /// Only commits writing one of these keys (None = all keys).
    pub keys: Option<Vec<String>>,

    /// Include events emitted by operations (e.g. `AssetCreated`).
    pub include_contract_events: bool,

    /// Include a notification for every commit.
    pub include_commits: bool,
}

impl EventFilter {
    /// Contract events with the given names.
    pub fn named(names: Vec<String>) -> Self {
        Self {
            event_names: Some(names),
            include_contract_events: true,
            ..Default::default()
        }
    }

    /// Every commit.
    pub fn commits() -> Self {
        Self {
            include_commits: true,
            ..Default::default()
        }
    }

    /// Commits and contract events touching the given keys.
    pub fn keys(keys: Vec<String>) -> Self {
        Self {
            keys: Some(keys),
            include_contract_events: true,
            include_commits: true,
            ..Default::default()
        }
    }

    /// Everything.
    pub fn all() -> Self {
        Self {
            include_contract_events: true,
            include_commits: true,
            ..Default::default()
        }
    }
}

/// Events delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// An operation emitted a named event; delivered after its commit.
    Contract {
        tx_id: TxId,
        sequence: Sequence,
        name: String,
        payload: Vec<u8>,
    },

    /// A transaction committed.
    Commit {
        tx_id: TxId,
        sequence: Sequence,
        function: String,
        keys: Vec<String>,
    },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Handle for receiving events from a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub receiver: crossbeam_channel::Receiver<LedgerEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<LedgerEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<LedgerEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<LedgerEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
