//! Wire protocol between the background process and UI surfaces
//!
//! Every message is a JSON object `{"type": <tag>, "data": <payload>}`.
//! One-shot calls use [`Request`]/[`Response`]; long-lived connections
//! carry [`PortMessage`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use fl_core::types::{EventKind, FilterMetadata, Notification, TabFilteringInfo, TabId};

use crate::error::BusError;

/// Identifier of a registered event listener. Never reused by a background
/// instance, so an id that outlived a restart can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(pub u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a long-lived connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub u64);

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== Long-lived connection =====

/// Message carried over a long-lived connection, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PortMessage {
    /// UI -> background: subscribe to some notification kinds.
    CreateEventListener { events: Vec<EventKind> },
    /// Background -> UI: the subscription was registered.
    #[serde(rename_all = "camelCase")]
    EventListenerCreated { listener_id: ListenerId },
    /// UI -> background: drop a subscription.
    #[serde(rename_all = "camelCase")]
    RemoveListener { listener_id: ListenerId },
    /// Background -> UI: a notification for one subscription.
    #[serde(rename_all = "camelCase")]
    NotifyListeners {
        listener_id: ListenerId,
        notification: Notification,
    },
    /// Background -> UI: every listener id was invalidated, subscribe again.
    UpdateListeners,
}

const PORT_MESSAGE_TYPES: &[&str] = &[
    "CreateEventListener",
    "EventListenerCreated",
    "RemoveListener",
    "NotifyListeners",
    "UpdateListeners",
];

impl PortMessage {
    pub fn from_json(raw: &str) -> Result<Self, BusError> {
        decode(raw, PORT_MESSAGE_TYPES)
    }

    pub fn to_json(&self) -> Result<String, BusError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ===== One-shot calls =====

/// One-shot call from a UI surface to the background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    GetFilteringInfoByTabId { tab_id: TabId },
    SynchronizeOpenTabs,
    #[serde(rename_all = "camelCase")]
    ClearEventsByTabId {
        tab_id: TabId,
        ignore_preserve_log: bool,
    },
    SetPreserveLogState { state: bool },
    #[serde(rename_all = "camelCase")]
    AddUserRule { rule_text: String },
    #[serde(rename_all = "camelCase")]
    RemoveUserRule { rule_text: String },
    AddAllowlistDomainForUrl { url: String },
    #[serde(rename_all = "camelCase")]
    RemoveAllowlistDomain { tab_id: TabId },
    GetFilteringLogData,
    OpenFilteringLogPage,
    CloseFilteringLogPage,
}

const REQUEST_TYPES: &[&str] = &[
    "GetFilteringInfoByTabId",
    "SynchronizeOpenTabs",
    "ClearEventsByTabId",
    "SetPreserveLogState",
    "AddUserRule",
    "RemoveUserRule",
    "AddAllowlistDomainForUrl",
    "RemoveAllowlistDomain",
    "GetFilteringLogData",
    "OpenFilteringLogPage",
    "CloseFilteringLogPage",
];

impl Request {
    pub fn from_json(raw: &str) -> Result<Self, BusError> {
        decode(raw, REQUEST_TYPES)
    }

    pub fn to_json(&self) -> Result<String, BusError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Data the log page needs once on mount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringLogData {
    pub filters_metadata: Vec<FilterMetadata>,
    pub preserve_log_enabled: bool,
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Response {
    Ack,
    FilteringInfo(Option<TabFilteringInfo>),
    Tabs(Vec<TabFilteringInfo>),
    LogData(FilteringLogData),
}

/// Decode a tagged message. A tag outside `known` is reported as
/// [`BusError::UnknownMessage`] rather than as a parse failure.
fn decode<T: DeserializeOwned>(raw: &str, known: &[&str]) -> Result<T, BusError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let tag = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    if !known.contains(&tag) {
        return Err(BusError::UnknownMessage(tag.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}
