//! Property tests for record encoding and history ordering.

use asset_ledger::{
    AssetRecord, DealerProfile, Ledger, LedgerConfig, RecordSchema, RecordService,
};
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

fn field() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[0-9]{1,12}",
        "\\PC{0,24}",
    ]
}

fn dealer_profile() -> impl Strategy<Value = DealerProfile> {
    (
        "[A-Za-z0-9_-]{1,16}",
        prop::collection::vec(field(), 7),
    )
        .prop_map(|(id, rest)| DealerProfile {
            dealer_id: id,
            msisdn: rest[0].clone(),
            mpin: rest[1].clone(),
            balance: rest[2].clone(),
            status: rest[3].clone(),
            trans_amount: rest[4].clone(),
            trans_type: rest[5].clone(),
            remarks: rest[6].clone(),
        })
}

proptest! {
    #[test]
    fn dealer_profile_bytes_roundtrip(profile in dealer_profile()) {
        let decoded = DealerProfile::from_bytes(&profile.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(&decoded, &profile);
        prop_assert_eq!(DealerProfile::from_args(&profile.to_args()).unwrap(), profile);
    }

    #[test]
    fn asset_args_roundtrip(id in "[A-Za-z0-9]{1,16}", name in "\\PC{0,24}", value in any::<i64>()) {
        let asset = AssetRecord { id, name, value };
        let rebuilt = AssetRecord::from_args(&asset.to_args()).unwrap();
        prop_assert_eq!(&rebuilt, &asset);
        prop_assert_eq!(AssetRecord::from_bytes(&asset.to_bytes().unwrap()).unwrap(), asset);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn history_follows_call_order(balances in prop::collection::vec("[0-9]{1,6}", 1..12)) {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::create(LedgerConfig::at(dir.path().join("ledger"))).unwrap();
        let service: RecordService<DealerProfile> = RecordService::new(Arc::new(ledger));

        for (i, balance) in balances.iter().enumerate() {
            let args: Vec<String> = ["P1", "9990001", "1234", balance.as_str(), "ACTIVE", "0", "NA", "x"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            if i == 0 {
                service.create(&args).unwrap();
            } else {
                service.update(&args).unwrap();
            }
        }

        let entries = service.history_entries("P1").unwrap();
        prop_assert_eq!(entries.len(), balances.len());
        for (entry, balance) in entries.iter().zip(&balances) {
            let record = DealerProfile::from_bytes(entry.value.as_ref().unwrap()).unwrap();
            prop_assert_eq!(&record.balance, balance);
        }
        for pair in entries.windows(2) {
            prop_assert!(pair[0].sequence < pair[1].sequence);
        }
    }
}
