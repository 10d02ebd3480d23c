use serde::Deserialize;
use serde_json::{json, Value};

use super::ChainError;

/// A transaction reported by the chain subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEvent {
    /// Transaction hash
    pub hash: String,
    /// Recipient address, if any (contract creations have none)
    pub to: Option<String>,
    /// Transferred value in wei
    pub value_wei: u128,
    /// Whether the transaction was dropped by a reorg
    pub removed: bool,
}

impl TxEvent {
    /// Checks whether the recipient is `address`, ignoring hex case
    pub fn is_to(&self, address: &str) -> bool {
        self.to
            .as_deref()
            .is_some_and(|to| to.eq_ignore_ascii_case(address))
    }
}

/// A decoded frame from the subscription socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainMessage {
    /// Reply to `eth_subscribe` carrying the subscription id
    Subscribed(String),
    /// Mined transaction notification
    Transaction(TxEvent),
    /// Anything else (errors, unrelated replies)
    Other,
}

impl ChainMessage {
    /// The transaction carried by this message, if any
    pub fn into_transaction(self) -> Option<TxEvent> {
        match self {
            Self::Transaction(event) => Some(event),
            Self::Subscribed(_) | Self::Other => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    hash: String,
    #[serde(default)]
    to: Option<String>,
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    removed: bool,
    transaction: RawTransaction,
}

/// Builds the `eth_subscribe` request for mined transactions to `merchant`
pub fn subscribe_request(merchant: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_subscribe",
        "params": [
            "alchemy_minedTransactions",
            {
                "addresses": [{ "to": merchant }],
                "includeRemoved": true,
                "hashesOnly": false
            }
        ]
    })
    .to_string()
}

/// Decodes one text frame
///
/// # Errors
/// Returns [`ChainError::Malformed`] for invalid JSON or a notification whose
/// transaction fields are missing, and [`ChainError::BadValue`] for a value
/// that is not a hex quantity
pub fn parse_message(text: &str) -> Result<ChainMessage, ChainError> {
    let doc: Value =
        serde_json::from_str(text).map_err(|e| ChainError::Malformed(e.to_string()))?;

    if doc.get("id").is_some() {
        if let Some(result) = doc.get("result") {
            let id = result
                .as_str()
                .map_or_else(|| result.to_string(), ToOwned::to_owned);
            return Ok(ChainMessage::Subscribed(id));
        }
    }

    let Some(result) = doc.get("params").and_then(|p| p.get("result")) else {
        return Ok(ChainMessage::Other);
    };
    if result.get("transaction").is_none() {
        return Ok(ChainMessage::Other);
    }

    let raw: RawResult = serde_json::from_value(result.clone())
        .map_err(|e| ChainError::Malformed(e.to_string()))?;

    Ok(ChainMessage::Transaction(TxEvent {
        value_wei: parse_quantity(&raw.transaction.value)?,
        hash: raw.transaction.hash,
        to: raw.transaction.to,
        removed: raw.removed,
    }))
}

/// Parses a JSON-RPC hex quantity (`0x...`) into wei
///
/// # Errors
/// Returns [`ChainError::BadValue`] if the string is not hex or overflows u128
pub fn parse_quantity(value: &str) -> Result<u128, ChainError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    if digits.is_empty() {
        return Ok(0);
    }

    u128::from_str_radix(digits, 16).map_err(|_| ChainError::BadValue(value.to_owned()))
}
