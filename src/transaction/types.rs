/// Record, status, and parameter types for the transaction state store
use serde_json::{Map, Value};

use crate::history::HistoryEntry;

/// Identifier of a transaction record, unique across all networks
pub type TxId = u64;

/// Identity of the network a record was created against
pub type NetworkId = String;

/// Lifecycle stage tag of a transaction record.
///
/// The default set runs `unapproved` through `dropped`; deployments may
/// extend it with custom tags at construction time. `rejected` and `failed`
/// are always available regardless of the configured set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Status(String);

impl Status {
    pub const UNAPPROVED: &'static str = "unapproved";
    pub const APPROVED: &'static str = "approved";
    pub const SIGNED: &'static str = "signed";
    pub const SUBMITTED: &'static str = "submitted";
    pub const CONFIRMED: &'static str = "confirmed";
    pub const DROPPED: &'static str = "dropped";
    pub const REJECTED: &'static str = "rejected";
    pub const FAILED: &'static str = "failed";

    pub fn new(tag: impl Into<String>) -> Self {
        Status(tag.into())
    }

    pub fn unapproved() -> Self {
        Status::new(Self::UNAPPROVED)
    }

    pub fn approved() -> Self {
        Status::new(Self::APPROVED)
    }

    pub fn signed() -> Self {
        Status::new(Self::SIGNED)
    }

    pub fn submitted() -> Self {
        Status::new(Self::SUBMITTED)
    }

    pub fn confirmed() -> Self {
        Status::new(Self::CONFIRMED)
    }

    pub fn dropped() -> Self {
        Status::new(Self::DROPPED)
    }

    pub fn rejected() -> Self {
        Status::new(Self::REJECTED)
    }

    pub fn failed() -> Self {
        Status::new(Self::FAILED)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A final status ends the record's lifecycle and makes it eligible for
    /// eviction once the history limit is hit.
    pub fn is_final(&self) -> bool {
        crate::transaction::validation::FINAL_STATES.contains(self.as_str())
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution parameters of a transaction.
///
/// Every named field is an optional `0x`-prefixed hex string. Keys the
/// caller supplies beyond the named set land in `extra` and flow through
/// validation, snapshots, diffs, and filters like any named field.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TxParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Recipient address. `Some(None)` is an explicit JSON `null`, which
    /// marks contract creation just like the bare `"0x"` placeholder;
    /// `None` means the key was absent entirely.
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub to: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(default, rename = "gasPrice", skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, rename = "chainId", skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wraps the deserialized value in `Some`, so a field that was present as
/// an explicit JSON `null` stays distinguishable from an absent key
fn some_if_present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

impl TxParams {
    pub fn new() -> Self {
        TxParams::default()
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(Some(to.into()));
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_gas(mut self, gas: impl Into<String>) -> Self {
        self.gas = Some(gas.into());
        self
    }

    pub fn with_gas_price(mut self, gas_price: impl Into<String>) -> Self {
        self.gas_price = Some(gas_price.into());
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Shallow merge: fields set on `other` overwrite, unset fields survive
    pub fn merge(&mut self, other: TxParams) {
        if other.from.is_some() {
            self.from = other.from;
        }
        if other.to.is_some() {
            self.to = other.to;
        }
        if other.value.is_some() {
            self.value = other.value;
        }
        if other.data.is_some() {
            self.data = other.data;
        }
        if other.gas.is_some() {
            self.gas = other.gas;
        }
        if other.gas_price.is_some() {
            self.gas_price = other.gas_price;
        }
        if other.nonce.is_some() {
            self.nonce = other.nonce;
        }
        if other.chain_id.is_some() {
            self.chain_id = other.chain_id;
        }
        for (key, value) in other.extra {
            self.extra.insert(key, value);
        }
    }
}

/// Failure details attached to a record when it transitions to `failed`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrInfo {
    pub fn new(message: impl Into<String>) -> Self {
        ErrInfo {
            message: message.into(),
            rpc: None,
            stack: None,
        }
    }

    /// Placeholder used when a failure is reported without details
    pub fn internal_failure() -> Self {
        ErrInfo::new("Internal transaction failure")
    }

    /// Capture an error's message and its source chain
    pub fn from_error(err: &dyn std::error::Error) -> Self {
        let mut chain = Vec::new();
        let mut current = err.source();
        while let Some(cause) = current {
            chain.push(cause.to_string());
            current = cause.source();
        }
        ErrInfo {
            message: err.to_string(),
            rpc: None,
            stack: if chain.is_empty() {
                None
            } else {
                Some(chain.join("\n"))
            },
        }
    }

    pub fn with_rpc(mut self, rpc: Value) -> Self {
        self.rpc = Some(rpc);
        self
    }
}

/// One tracked transaction: identity, lifecycle status, parameters, and the
/// diff-based audit history of every mutation it went through.
///
/// The record is open-world: keys beyond the named fields (a broadcast hash,
/// an originating dapp, a raw signed payload) are kept in `extra` and are
/// snapshotted, diffed, and filterable like the named fields.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TxRecord {
    pub id: TxId,
    #[serde(rename = "networkId")]
    pub network_id: NetworkId,
    pub status: Status,
    #[serde(default, rename = "txParams", skip_serializing_if = "Option::is_none")]
    pub tx_params: Option<TxParams>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<ErrInfo>,
    #[serde(default, rename = "loadingDefaults")]
    pub loading_defaults: bool,
    pub time: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TxRecord {
    pub fn new(id: TxId, network_id: impl Into<NetworkId>) -> Self {
        TxRecord {
            id,
            network_id: network_id.into(),
            status: Status::unapproved(),
            tx_params: None,
            history: Vec::new(),
            err: None,
            loading_defaults: true,
            time: chrono::Utc::now().timestamp_millis(),
            extra: Map::new(),
        }
    }

    pub fn with_params(mut self, params: TxParams) -> Self {
        self.tx_params = Some(params);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    pub fn with_loading_defaults(mut self, loading: bool) -> Self {
        self.loading_defaults = loading;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Address the transaction originates from, when params carry one
    pub fn from_address(&self) -> Option<&str> {
        self.tx_params.as_ref().and_then(|p| p.from.as_deref())
    }
}
