//! Record schemas.
//!
//! Two record shapes share the same operations: the general [`AssetRecord`]
//! and the eight-field [`DealerProfile`]. Which one a deployment serves is
//! chosen by [`RecordVariant`] in the ledger configuration.

use crate::error::{LedgerError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record shape served by a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordVariant {
    Asset,
    #[default]
    DealerProfile,
}

impl RecordVariant {
    /// Positional argument count of create/update for this shape.
    pub fn arity(self) -> usize {
        match self {
            RecordVariant::Asset => AssetRecord::ARITY,
            RecordVariant::DealerProfile => DealerProfile::ARITY,
        }
    }
}

/// A record shape storable in the ledger.
///
/// The serialized form is compact JSON with fields in declaration order; it is
/// used both for storage and for responses.
pub trait RecordSchema:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Exact number of positional arguments for create/update.
    const ARITY: usize;

    /// Which variant this type implements.
    const VARIANT: RecordVariant;

    /// Build a record from positional string arguments.
    fn from_args(args: &[String]) -> Result<Self>;

    /// Stringify back into positional arguments.
    fn to_args(&self) -> Vec<String>;

    /// The record key.
    fn id(&self) -> &str;

    /// Check invariants that hold for every stored record.
    fn validate(&self) -> Result<()> {
        if self.id().is_empty() {
            return Err(LedgerError::InvalidArgument(
                "Record id must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| LedgerError::Deserialization(e.to_string()))
    }
}

/// Fail unless exactly `expected` arguments were supplied.
pub fn check_arity(args: &[String], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(LedgerError::arity(expected));
    }
    Ok(())
}

/// General asset: a name and a typed integer value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub name: String,
    pub value: i64,
}

impl RecordSchema for AssetRecord {
    const ARITY: usize = 3;
    const VARIANT: RecordVariant = RecordVariant::Asset;

    fn from_args(args: &[String]) -> Result<Self> {
        check_arity(args, Self::ARITY)?;

        let value = args[2].parse::<i64>().map_err(|_| {
            LedgerError::InvalidArgument(format!("Invalid value: {} is not an integer", args[2]))
        })?;

        let record = Self {
            id: args[0].clone(),
            name: args[1].clone(),
            value,
        };
        record.validate()?;
        Ok(record)
    }

    fn to_args(&self) -> Vec<String> {
        vec![self.id.clone(), self.name.clone(), self.value.to_string()]
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Dealer profile. Every field, including the amounts, is an opaque string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerProfile {
    #[serde(rename = "DEALERID")]
    pub dealer_id: String,
    #[serde(rename = "MSISDN")]
    pub msisdn: String,
    #[serde(rename = "MPIN")]
    pub mpin: String,
    #[serde(rename = "BALANCE")]
    pub balance: String,
    #[serde(rename = "STATUS")]
    pub status: String,
    #[serde(rename = "TRANSAMOUNT")]
    pub trans_amount: String,
    #[serde(rename = "TRANSTYPE")]
    pub trans_type: String,
    #[serde(rename = "REMARKS")]
    pub remarks: String,
}

impl RecordSchema for DealerProfile {
    const ARITY: usize = 8;
    const VARIANT: RecordVariant = RecordVariant::DealerProfile;

    fn from_args(args: &[String]) -> Result<Self> {
        check_arity(args, Self::ARITY)?;

        let record = Self {
            dealer_id: args[0].clone(),
            msisdn: args[1].clone(),
            mpin: args[2].clone(),
            balance: args[3].clone(),
            status: args[4].clone(),
            trans_amount: args[5].clone(),
            trans_type: args[6].clone(),
            remarks: args[7].clone(),
        };
        record.validate()?;
        Ok(record)
    }

    fn to_args(&self) -> Vec<String> {
        vec![
            self.dealer_id.clone(),
            self.msisdn.clone(),
            self.mpin.clone(),
            self.balance.clone(),
            self.status.clone(),
            self.trans_amount.clone(),
            self.trans_type.clone(),
            self.remarks.clone(),
        ]
    }

    fn id(&self) -> &str {
        &self.dealer_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dealer_profile_field_order() {
        let profile = DealerProfile::from_args(&args(&[
            "D1", "9990001", "1234", "1000", "ACTIVE", "0", "NA", "first",
        ]))
        .unwrap();

        let json = String::from_utf8(profile.to_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"DEALERID":"D1","MSISDN":"9990001","MPIN":"1234","BALANCE":"1000","STATUS":"ACTIVE","TRANSAMOUNT":"0","TRANSTYPE":"NA","REMARKS":"first"}"#
        );
    }

    #[test]
    fn test_dealer_profile_keeps_leading_zeros() {
        let profile = DealerProfile::from_args(&args(&[
            "D2", "0999", "0000", "000100.50", "ACTIVE", "007", "CR", "",
        ]))
        .unwrap();
        let decoded = DealerProfile::from_bytes(&profile.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.balance, "000100.50");
        assert_eq!(decoded.trans_amount, "007");
        assert_eq!(decoded.to_args(), profile.to_args());
    }

    #[test]
    fn test_dealer_profile_arity() {
        let err = DealerProfile::from_args(&args(&["D1", "999"])).unwrap_err();
        assert_eq!(err.to_string(), "Incorrect number of arguments. Expecting 8");
    }

    #[test]
    fn test_empty_id_rejected() {
        let err = DealerProfile::from_args(&args(&["", "", "", "", "", "", "", ""])).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn test_asset_parses_value() {
        let asset = AssetRecord::from_args(&args(&["A1", "widget", "42"])).unwrap();
        assert_eq!(asset.value, 42);
        assert_eq!(asset.to_args(), args(&["A1", "widget", "42"]));
        assert_eq!(
            String::from_utf8(asset.to_bytes().unwrap()).unwrap(),
            r#"{"id":"A1","name":"widget","value":42}"#
        );
    }

    #[test]
    fn test_asset_rejects_non_integer_value() {
        let err = AssetRecord::from_args(&args(&["A1", "widget", "lots"])).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn test_asset_rejects_padded_value() {
        let err = AssetRecord::from_args(&args(&["A1", "widget", " 42 "])).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn test_variant_arity() {
        assert_eq!(RecordVariant::Asset.arity(), 3);
        assert_eq!(RecordVariant::DealerProfile.arity(), 8);
        assert_eq!(DealerProfile::VARIANT, RecordVariant::DealerProfile);
    }
}
