//! Event hub broadcasting committed transactions to subscribers.

use crate::ledger::log::CommittedTx;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use super::types::{
    DropReason, EventFilter, LedgerEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    filter: EventFilter,
    sender: Sender<LedgerEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if the subscriber is full or gone.
    fn try_send(&self, event: LedgerEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn touches_keys(&self, tx: &CommittedTx) -> bool {
        match self.filter.keys {
            Some(ref keys) => tx.writes.iter().any(|w| keys.contains(&w.key)),
            None => true,
        }
    }

    fn matches_contract_event(&self, name: &str, tx: &CommittedTx) -> bool {
        if !self.filter.include_contract_events || !self.touches_keys(tx) {
            return false;
        }

        match self.filter.event_names {
            Some(ref names) => names.iter().any(|n| n == name),
            None => true,
        }
    }

    fn matches_commit(&self, tx: &CommittedTx) -> bool {
        self.filter.include_commits && self.touches_keys(tx)
    }
}

/// Manages subscriptions and broadcasts events.
pub struct EventHub {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription. Only transactions committed after this call
    /// are delivered.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscriptions.write().insert(
            id,
            Subscription {
                filter: config.filter,
                sender,
            },
        );

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            let _ = sub.sender.try_send(LedgerEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Broadcast a committed transaction: its commit notice, then its
    /// contract event if it carried one.
    pub fn publish(&self, tx: &CommittedTx) {
        if self.subscription_count() == 0 {
            return;
        }

        let commit = LedgerEvent::Commit {
            tx_id: tx.tx_id,
            sequence: tx.sequence,
            function: tx.function.clone(),
            keys: tx.writes.iter().map(|w| w.key.clone()).collect(),
        };
        self.broadcast(|sub| sub.matches_commit(tx), commit);

        if let Some(ref event) = tx.event {
            let contract = LedgerEvent::Contract {
                tx_id: tx.tx_id,
                sequence: tx.sequence,
                name: event.name.clone(),
                payload: event.payload.clone(),
            };
            self.broadcast(|sub| sub.matches_contract_event(&event.name, tx), contract);
        }
    }

    /// Send to every matching subscriber; drop those that cannot keep up.
    fn broadcast<F>(&self, filter: F, event: LedgerEvent)
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if filter(sub) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    warn!(subscription = id.0, "dropping slow event subscriber");
                    // Might fail if the buffer is still full.
                    let _ = sub.sender.try_send(LedgerEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::log::KvWrite;
    use crate::types::{ContractEvent, Sequence, Timestamp, TxId};
    use std::time::Duration;

    fn make_tx(key: &str, event: Option<&str>) -> CommittedTx {
        let timestamp = Timestamp::new(1_700_000_000, 0);
        CommittedTx {
            tx_id: TxId::derive(Sequence(1), timestamp, "createAsset"),
            sequence: Sequence(1),
            timestamp,
            function: "createAsset".into(),
            writes: vec![KvWrite::put(key, b"{}".to_vec())],
            event: event.map(|name| ContractEvent {
                name: name.into(),
                payload: key.as_bytes().to_vec(),
            }),
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let hub = EventHub::new();

        let handle = hub.subscribe(SubscriptionConfig::default());
        assert_eq!(hub.subscription_count(), 1);

        hub.unsubscribe(handle.id);
        assert_eq!(hub.subscription_count(), 0);
        assert!(matches!(
            handle.try_recv(),
            Ok(LedgerEvent::Dropped {
                reason: DropReason::Unsubscribed
            })
        ));
    }

    #[test]
    fn test_named_filter() {
        let hub = EventHub::new();
        let handle = hub.subscribe(SubscriptionConfig {
            filter: EventFilter::named(vec!["AssetCreated".into()]),
            ..Default::default()
        });

        hub.publish(&make_tx("D1", Some("AssetUpdated")));
        hub.publish(&make_tx("D2", Some("AssetCreated")));

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        match event {
            LedgerEvent::Contract { name, payload, .. } => {
                assert_eq!(name, "AssetCreated");
                assert_eq!(payload, b"D2");
            }
            other => panic!("Expected contract event, got {:?}", other),
        }
        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_key_filter() {
        let hub = EventHub::new();
        let handle = hub.subscribe(SubscriptionConfig {
            filter: EventFilter::keys(vec!["D1".into()]),
            ..Default::default()
        });

        hub.publish(&make_tx("D2", None));
        hub.publish(&make_tx("D1", None));

        match handle.try_recv().unwrap() {
            LedgerEvent::Commit { keys, .. } => assert_eq!(keys, vec!["D1".to_string()]),
            other => panic!("Expected commit, got {:?}", other),
        }
        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let hub = EventHub::new();
        let _handle = hub.subscribe(SubscriptionConfig {
            buffer_size: 2,
            filter: EventFilter::commits(),
        });

        for _ in 0..10 {
            hub.publish(&make_tx("D1", None));
        }

        assert_eq!(hub.subscription_count(), 0);
    }
}
