//! Invocation dispatch.
//!
//! A [`Contract`] maps a function name and positional string arguments onto
//! the record service and turns every outcome into a [`Response`]. Errors
//! never escape `invoke`.
//!
//! # Example
//!
//! ```ignore
//! let contract = Contract::open(LedgerConfig::at("./ledger"))?;
//!
//! let args: Vec<String> = ["D1", "9990001", "1234", "1000", "ACTIVE", "0", "NA", "first"]
//!     .iter()
//!     .map(|s| s.to_string())
//!     .collect();
//! contract.invoke("createAsset", &args);
//!
//! match contract.invoke("queryAsset", &["D1".to_string()]) {
//!     Response::Success(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
//!     Response::Error { message, .. } => eprintln!("{message}"),
//! }
//! ```

mod registry;

pub use registry::{Function, Registry, FUNCTION_NAMES};

use crate::config::LedgerConfig;
use crate::error::{ErrorKind, LedgerError, Result};
use crate::ledger::Ledger;
use crate::record::{AssetRecord, DealerProfile, RecordSchema, RecordVariant};
use crate::service::RecordService;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of an invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Success(Vec<u8>),
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Response::Success(bytes) => Some(bytes),
            Response::Error { .. } => None,
        }
    }

    /// Status code a transport would answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Response::Success(_) => 200,
            Response::Error { kind, .. } => kind.http_status(),
        }
    }
}

impl From<Result<Vec<u8>>> for Response {
    fn from(result: Result<Vec<u8>>) -> Self {
        match result {
            Ok(bytes) => Response::Success(bytes),
            Err(e) => Response::Error {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

/// Named entry point over one record service.
pub struct Contract {
    ledger: Arc<Ledger>,
    variant: RecordVariant,
    registry: Registry,
}

impl Contract {
    /// Contract serving `R` through `service`.
    pub fn new<R: RecordSchema>(service: RecordService<R>) -> Result<Self> {
        let ledger = Arc::clone(service.ledger());
        Self::with_registry(ledger, R::VARIANT, Registry::for_service(service))
    }

    /// Contract over a caller-built registry. The registry must serve exactly
    /// the recognized function names.
    pub fn with_registry(
        ledger: Arc<Ledger>,
        variant: RecordVariant,
        registry: Registry,
    ) -> Result<Self> {
        registry.validate()?;
        Ok(Self {
            ledger,
            variant,
            registry,
        })
    }

    /// Open the ledger at `config.path` and serve the configured variant.
    pub fn open(config: LedgerConfig) -> Result<Self> {
        let variant = config.variant;
        let ledger = Arc::new(Ledger::open_or_create(config)?);

        info!(variant = ?variant, "contract ready");

        match variant {
            RecordVariant::Asset => Self::new(RecordService::<AssetRecord>::new(ledger)),
            RecordVariant::DealerProfile => Self::new(RecordService::<DealerProfile>::new(ledger)),
        }
    }

    /// Run `function` with `args`.
    pub fn invoke(&self, function: &str, args: &[String]) -> Response {
        self.dispatch(function, args).into()
    }

    fn dispatch(&self, function: &str, args: &[String]) -> Result<Vec<u8>> {
        let handler = self
            .registry
            .get(function)
            .ok_or_else(|| LedgerError::UnknownFunction(function.to_string()))?;

        if args.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "Invalid number of arguments".into(),
            ));
        }
        if args.len() != handler.arity() {
            return Err(LedgerError::arity(handler.arity()));
        }

        debug!(function, args = args.len(), "dispatching");
        handler.call(args)
    }

    pub fn variant(&self) -> RecordVariant {
        self.variant
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }
}
