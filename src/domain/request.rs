//! Transfer check request
//!
//! The immutable inbound description of a proposed transfer. Fields arrive
//! as text and are validated by the fingerprinter before any provider is
//! contacted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ValidationError;

/// Ledger family the transfer settles on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockchainType {
    Permissioned,
    Public,
}

impl BlockchainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockchainType::Permissioned => "permissioned",
            BlockchainType::Public => "public",
        }
    }
}

impl std::fmt::Display for BlockchainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BlockchainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permissioned" => Ok(BlockchainType::Permissioned),
            "public" => Ok(BlockchainType::Public),
            other => Err(format!("unknown blockchain type: {}", other)),
        }
    }
}

/// Request to evaluate a proposed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCheckRequest {
    /// Sender address
    #[serde(default)]
    pub from_address: String,
    /// Receiver address
    #[serde(default)]
    pub to_address: String,
    /// Amount as decimal text (never a float)
    #[serde(default)]
    pub amount: String,
    /// Asset / token identifier
    #[serde(default)]
    pub token_id: String,
    pub blockchain_type: BlockchainType,
    /// Caller identity, recorded for audit but not part of the fingerprint
    #[serde(default)]
    pub requester_id: String,
}

impl TransferCheckRequest {
    pub fn new(
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        amount: impl Into<String>,
        token_id: impl Into<String>,
    ) -> Self {
        Self {
            from_address: from_address.into(),
            to_address: to_address.into(),
            amount: amount.into(),
            token_id: token_id.into(),
            blockchain_type: BlockchainType::Public,
            requester_id: String::new(),
        }
    }

    pub fn with_blockchain_type(mut self, blockchain_type: BlockchainType) -> Self {
        self.blockchain_type = blockchain_type;
        self
    }

    pub fn with_requester(mut self, requester_id: impl Into<String>) -> Self {
        self.requester_id = requester_id.into();
        self
    }

    /// Decode a JSON request body. A body that does not decode is reported
    /// against the first field that cannot be read.
    pub fn from_json(body: Value) -> Result<Self, ValidationError> {
        let field = undecodable_field(&body);
        serde_json::from_value(body).map_err(|e| ValidationError::new(field, e.to_string()))
    }
}

/// First field, in declaration order, that would fail to deserialize
fn undecodable_field(body: &Value) -> &'static str {
    let Some(object) = body.as_object() else {
        return "body";
    };

    let text = |field: &str| matches!(object.get(field), Some(v) if !v.is_string());

    for field in ["from_address", "to_address", "amount", "token_id"] {
        if text(field) {
            return field;
        }
    }

    let chain_type_ok = object
        .get("blockchain_type")
        .is_some_and(|v| BlockchainType::deserialize(v).is_ok());
    if !chain_type_ok {
        return "blockchain_type";
    }

    if text("requester_id") {
        return "requester_id";
    }

    "body"
}
