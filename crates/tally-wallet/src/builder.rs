//! Outgoing transfer validation and payload construction.
//!
//! Provides a two-step flow for sending:
//! 1. Validate the requested amount
//! 2. Build the payload: one output plus fee options, where caller options
//!    override the configured defaults key by key
//!
//! Coin selection, signing and broadcast belong to the wallet service; the
//! payload only describes what to send and how fees may be charged.

use serde_json::{Map, Value};
use tally_core::constants::{
    DEFAULT_MAX_FEE, DEFAULT_RATE, DEFAULT_SUBTRACT_FEE, OPT_MAX_FEE, OPT_RATE, OPT_SUBTRACT_FEE,
};
use tally_core::error::WalletError;

/// Payload key holding the outputs. Reserved: caller options cannot replace it.
pub const OUTPUTS_KEY: &str = "outputs";

/// Fee settings applied when the caller does not specify them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferDefaults {
    /// Maximum fee in satoshis.
    pub max_fee: u64,
    /// Fee rate in satoshis per kilobyte.
    pub rate: u64,
    /// Whether the fee is taken out of the sent amount.
    pub subtract_fee: bool,
}

impl Default for TransferDefaults {
    fn default() -> Self {
        Self {
            max_fee: DEFAULT_MAX_FEE,
            rate: DEFAULT_RATE,
            subtract_fee: DEFAULT_SUBTRACT_FEE,
        }
    }
}

impl TransferDefaults {
    fn to_options(self) -> TransferOptions {
        TransferOptions::new()
            .max_fee(self.max_fee)
            .rate(self.rate)
            .subtract_fee(self.subtract_fee)
    }
}

/// Caller-supplied transfer options.
///
/// An open map: the recognised keys (`maxFee`, `rate`, `subtractFee`) have
/// typed setters, any other key set through [`set`](Self::set) is passed to
/// the wallet service untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferOptions(Map<String, Value>);

impl TransferOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_fee(self, satoshi: u64) -> Self {
        self.set(OPT_MAX_FEE, satoshi)
    }

    pub fn rate(self, satoshi_per_kb: u64) -> Self {
        self.set(OPT_RATE, satoshi_per_kb)
    }

    pub fn subtract_fee(self, subtract: bool) -> Self {
        self.set(OPT_SUBTRACT_FEE, subtract)
    }

    /// Set an arbitrary option.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merged_with(mut self, other: &TransferOptions) -> Self {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for TransferOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A single transfer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub address: String,
    /// Amount in satoshis.
    pub value: u64,
}

/// Request body for the wallet service's send endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub outputs: Vec<Output>,
    /// Defaults merged with caller options.
    pub options: TransferOptions,
}

/// A transfer recovered from a [`Payload`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub destination: String,
    pub amount: u64,
    pub options: TransferOptions,
}

impl Payload {
    /// JSON body: the options with `outputs` alongside.
    pub fn to_json(&self) -> Value {
        let mut body = self.options.as_map().clone();
        let outputs = self
            .outputs
            .iter()
            .map(|o| serde_json::json!({ "address": o.address, "value": o.value }))
            .collect();
        body.insert(OUTPUTS_KEY.to_string(), Value::Array(outputs));
        Value::Object(body)
    }

    /// Parse a single-output payload back into the transfer it describes.
    pub fn parse(body: &Value) -> Result<TransferRequest, WalletError> {
        let mut map = body
            .as_object()
            .cloned()
            .ok_or_else(|| WalletError::Serialization("payload is not an object".into()))?;
        let outputs = map
            .remove(OUTPUTS_KEY)
            .ok_or_else(|| WalletError::Serialization("payload has no outputs".into()))?;
        let [output] = outputs.as_array().map(Vec::as_slice).unwrap_or_default() else {
            return Err(WalletError::Serialization(
                "payload must have exactly one output".into(),
            ));
        };
        let destination = output
            .get("address")
            .and_then(Value::as_str)
            .ok_or_else(|| WalletError::Serialization("output has no address".into()))?
            .to_string();
        let amount = output
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| WalletError::Serialization("output has no integer value".into()))?;
        Ok(TransferRequest {
            destination,
            amount,
            options: map.into(),
        })
    }
}

/// Validates transfers and builds send payloads.
///
/// # Example
/// ```ignore
/// let builder = TransactionBuilder::new(TransferDefaults::default());
/// let amount = builder.validate(dest, 1_500)?;
/// let payload = builder.build_payload(dest, amount, &TransferOptions::new().rate(200));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    defaults: TransferDefaults,
}

impl TransactionBuilder {
    pub fn new(defaults: TransferDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> TransferDefaults {
        self.defaults
    }

    /// Check that `amount` is a positive number of satoshis.
    ///
    /// The destination is not inspected; address syntax is the wallet
    /// service's concern.
    pub fn validate(&self, _destination: &str, amount: i64) -> Result<u64, WalletError> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(format!(
                "amount must be a positive number of satoshis, got {amount}"
            )));
        }
        Ok(amount as u64)
    }

    /// Build the payload for sending `amount` to `destination`.
    pub fn build_payload(
        &self,
        destination: &str,
        amount: u64,
        options: &TransferOptions,
    ) -> Payload {
        Payload {
            outputs: vec![Output {
                address: destination.to_string(),
                value: amount,
            }],
            options: self.defaults.to_options().merged_with(options),
        }
    }
}
