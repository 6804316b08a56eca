//! Core type definitions for the filtering log
//!
//! These types are the wire shape of the log: the background process builds
//! them, the bus carries them as JSON and every UI surface reads them.

use serde::{Deserialize, Serialize};

// =============================================================================
// Well-known identifiers
// =============================================================================

/// Filter id of the user's own rules.
pub const USER_FILTER_ID: i64 = 0;
/// Filter id of the generated stealth mode rules.
pub const STEALTH_MODE_FILTER_ID: i64 = -1;
/// Filter id of the generated allowlist rules.
pub const ALLOWLIST_FILTER_ID: i64 = 100;

/// Tab identifier as issued by the browser platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

/// Pseudo-tab collecting requests that do not belong to any page.
pub const BACKGROUND_TAB_ID: TabId = TabId(-1);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TabId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(TabId)
            .map_err(|_| ParseError::InvalidTabId(s.to_string()))
    }
}

/// Error type for decoding log data.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid tab id: {0}")]
    InvalidTabId(String),
    #[error("Malformed filtering event: {0}")]
    Malformed(#[from] serde_json::Error),
}

// =============================================================================
// Request Types
// =============================================================================

/// Resource kind of a logged request.
///
/// `Cookie` and `CspReport` are synthetic: they never come from the network
/// layer directly but are used to group cookie and CSP report events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "document")]
    Document,
    #[serde(rename = "subdocument")]
    Subdocument,
    #[serde(rename = "script")]
    Script,
    #[serde(rename = "stylesheet")]
    Stylesheet,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "xmlhttprequest")]
    XmlHttpRequest,
    #[serde(rename = "media")]
    Media,
    #[serde(rename = "font")]
    Font,
    #[serde(rename = "websocket")]
    Websocket,
    #[serde(rename = "webrtc")]
    WebRtc,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "csp")]
    Csp,
    #[serde(rename = "csp_report")]
    CspReport,
    #[serde(rename = "permissions_policy")]
    PermissionsPolicy,
    #[serde(rename = "cookie")]
    Cookie,
    #[serde(rename = "other")]
    Other,
}

impl RequestType {
    /// Human readable label used by the log table.
    pub fn label(self) -> &'static str {
        match self {
            Self::Document | Self::Subdocument => "HTML",
            Self::Stylesheet => "CSS",
            Self::Script => "JavaScript",
            Self::XmlHttpRequest => "XHR",
            Self::Image => "Image",
            Self::Object | Self::Media => "Media",
            Self::Font => "Font",
            Self::Websocket => "WebSocket",
            Self::WebRtc => "WebRTC",
            Self::Csp => "CSP",
            Self::CspReport => "CSP report",
            Self::PermissionsPolicy => "Permissions Policy",
            Self::Cookie => "Cookie",
            Self::Ping => "Ping",
            Self::Other => "Other",
        }
    }

    /// Whether the wizard can open a preview of the resource.
    pub fn is_previewable(self) -> bool {
        matches!(
            self,
            Self::Image | Self::Document | Self::Subdocument | Self::Script | Self::Stylesheet
        )
    }
}

// =============================================================================
// Stealth Actions
// =============================================================================

bitflags::bitflags! {
    /// Stealth mode actions applied to a request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StealthActions: u32 {
        const HIDE_REFERRER = 1 << 0;
        const HIDE_SEARCH_QUERY = 1 << 1;
        const BLOCK_CHROME_CLIENT_DATA = 1 << 2;
        const SEND_DO_NOT_TRACK = 1 << 3;
        const FIRST_PARTY_COOKIES = 1 << 4;
        const THIRD_PARTY_COOKIES = 1 << 5;
    }
}

// =============================================================================
// Rule Data
// =============================================================================

/// A rule that took part in a filtering decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleData {
    pub filter_id: i64,
    pub rule_index: Option<i64>,
    /// Rule text as it was applied by the engine (after conversion).
    pub applied_rule_text: Option<String>,
    /// Rule text reported by engines that do not tell the applied text apart.
    pub rule_text: Option<String>,
    /// Rule text as written in the filter list, when conversion changed it.
    pub original_rule_text: Option<String>,
    pub is_important: bool,
    pub document_level_rule: bool,
    pub is_stealth_mode_rule: bool,
    pub allowlist_rule: bool,
    pub allowlist_stealth_rule: bool,
    pub csp_rule: bool,
    pub permissions_rule: bool,
    pub cookie_rule: bool,
    pub content_rule: bool,
    pub css_rule: bool,
    pub script_rule: bool,
    /// Value of the advanced modifier ($cookie=, $removeparam=, $csp=...).
    pub modifier_value: Option<String>,
}

impl RuleData {
    /// Applied rule text, falling back to the plain `ruleText`.
    #[inline]
    pub fn rule_text(&self) -> Option<&str> {
        self.applied_rule_text
            .as_deref()
            .or(self.rule_text.as_deref())
    }
}

// =============================================================================
// Declarative Rules
// =============================================================================

/// Source rule of a precompiled declarative rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceRule {
    pub source_rule: String,
    pub filter_id: i64,
}

/// Decision reported as a precompiled declarative rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeclarativeRuleInfo {
    pub source_rules: Vec<SourceRule>,
    /// JSON text of the declarative rule, `{"action": {"type": ...}, ...}`.
    pub declarative_rule_json: String,
}

/// Action kind of a declarative rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarativeAction {
    Block,
    Redirect,
    Allow,
    UpgradeScheme,
    ModifyHeaders,
    AllowAllRequests,
    Unknown,
}

/// Unrecognized action types parse as `Unknown`.
impl std::str::FromStr for DeclarativeAction {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "block" => Self::Block,
            "redirect" => Self::Redirect,
            "allow" => Self::Allow,
            "upgradeScheme" => Self::UpgradeScheme,
            "modifyHeaders" => Self::ModifyHeaders,
            "allowAllRequests" => Self::AllowAllRequests,
            _ => Self::Unknown,
        })
    }
}

impl DeclarativeRuleInfo {
    /// Decode the action kind from the rule JSON.
    pub fn action(&self) -> DeclarativeAction {
        let value: serde_json::Value = match serde_json::from_str(&self.declarative_rule_json) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("[fl.core] cannot decode declarative rule json: {}", e);
                return DeclarativeAction::Unknown;
            }
        };

        value
            .get("action")
            .and_then(|action| action.get("type"))
            .and_then(|kind| kind.as_str())
            .and_then(|kind| kind.parse().ok())
            .unwrap_or(DeclarativeAction::Unknown)
    }
}

// =============================================================================
// Filtering Event
// =============================================================================

/// One observed request or page side effect together with its decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilteringEvent {
    pub event_id: String,
    pub tab_id: Option<TabId>,
    pub request_url: Option<String>,
    pub request_domain: Option<String>,
    pub frame_url: Option<String>,
    pub frame_domain: Option<String>,
    pub request_type: Option<RequestType>,
    pub timestamp: Option<u64>,
    pub request_third_party: bool,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub request_rule: Option<RuleData>,
    pub replace_rules: Option<Vec<RuleData>>,
    pub stealth_allowlist_rules: Option<Vec<RuleData>>,
    pub declarative_rule_info: Option<DeclarativeRuleInfo>,
    pub remove_param: bool,
    pub remove_header: bool,
    pub header_name: Option<String>,
    /// Element hidden by a cosmetic rule.
    pub element: Option<String>,
    /// Set for script and scriptlet events.
    pub script: bool,
    pub cookie_name: Option<String>,
    pub cookie_value: Option<String>,
    pub is_modifying_cookie_rule: bool,
    pub csp_report_blocked: bool,
    pub stealth_actions: Option<u32>,

    // Derived display cache, filled in by a UI projection.
    pub filter_name: Option<String>,
    pub applied_rule_text: Option<String>,
    pub original_rule_text: Option<String>,
}

impl FilteringEvent {
    /// Decode a single event from JSON.
    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a JSON array of events.
    pub fn list_from_json(text: &str) -> Result<Vec<Self>, ParseError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Stealth actions bitmask.
    pub fn stealth_actions(&self) -> StealthActions {
        StealthActions::from_bits_retain(self.stealth_actions.unwrap_or(0))
    }

    /// True for events produced by stealth mode.
    pub fn is_stealth_event(&self) -> bool {
        !self.stealth_actions().is_empty()
            || self.stealth_allowlist_rules.is_some()
            || self
                .request_rule
                .as_ref()
                .is_some_and(|rule| rule.is_stealth_mode_rule)
    }

    /// Cookie text as shown in the detail view: `name = value` or `name`.
    pub fn cookie_data(&self) -> Option<String> {
        let cookie_rule = self.request_rule.as_ref().is_some_and(|rule| rule.cookie_rule);
        let name = self.cookie_name.as_deref()?;
        if !cookie_rule || name.is_empty() {
            return None;
        }

        match self.cookie_value.as_deref() {
            Some(value) if !value.is_empty() => Some(format!("{} = {}", name, value)),
            _ => Some(name.to_string()),
        }
    }

    /// Type label shown in the log table.
    pub fn request_event_type_label(&self) -> &'static str {
        let cookie_rule = self.request_rule.as_ref().is_some_and(|rule| rule.cookie_rule);

        let request_type = if cookie_rule || self.is_modifying_cookie_rule {
            Some(RequestType::Cookie)
        } else if self.csp_report_blocked {
            Some(RequestType::CspReport)
        } else if self.remove_header {
            return "REMOVEHEADER";
        } else if self.remove_param {
            return "REMOVEPARAM";
        } else {
            self.request_type
        };

        request_type.map(RequestType::label).unwrap_or("")
    }

    /// Apply a late update to this event.
    pub fn merge(&mut self, update: EventUpdate) {
        if let Some(status_code) = update.status_code {
            self.status_code = Some(status_code);
        }
        if let Some(method) = update.method {
            self.method = Some(method);
        }
        if let Some(rule) = update.request_rule {
            self.request_rule = Some(rule);
        }
        if let Some(rules) = update.replace_rules {
            self.replace_rules = Some(rules);
        }
        if let Some(rules) = update.stealth_allowlist_rules {
            self.stealth_allowlist_rules = Some(rules);
        }
        if let Some(info) = update.declarative_rule_info {
            self.declarative_rule_info = Some(info);
        }
        if let Some(actions) = update.stealth_actions {
            self.stealth_actions = Some(actions);
        }
    }
}

/// Partial event data delivered after the event was first recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventUpdate {
    pub status_code: Option<u16>,
    pub method: Option<String>,
    pub request_rule: Option<RuleData>,
    pub replace_rules: Option<Vec<RuleData>>,
    pub stealth_allowlist_rules: Option<Vec<RuleData>>,
    pub declarative_rule_info: Option<DeclarativeRuleInfo>,
    pub stealth_actions: Option<u32>,
}

// =============================================================================
// Tabs
// =============================================================================

/// Tab as seen by the filtering log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub tab_id: TabId,
    pub title: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub is_extension_tab: bool,
}

/// Tab together with its recorded events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabFilteringInfo {
    #[serde(flatten)]
    pub info: TabInfo,
    #[serde(default)]
    pub filtering_events: Vec<FilteringEvent>,
}

/// Tab as reported by the browser platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserTab {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub url: Option<String>,
}

impl BrowserTab {
    pub fn new(id: i64, title: &str, url: &str) -> Self {
        Self {
            id: Some(id),
            title: Some(title.to_string()),
            url: Some(url.to_string()),
        }
    }
}

/// Filter list metadata used to resolve filter names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterMetadata {
    pub filter_id: i64,
    pub name: String,
}

/// Find the name of a filter list by id.
pub fn filter_name(filter_id: i64, metadata: &[FilterMetadata]) -> Option<String> {
    metadata
        .iter()
        .find(|meta| meta.filter_id == filter_id)
        .map(|meta| meta.name.clone())
}

// =============================================================================
// Notifications
// =============================================================================

/// Kind of a push notification. The wire names are shared with UI scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "log.tab.added")]
    TabAdded,
    #[serde(rename = "log.tab.close")]
    TabClose,
    #[serde(rename = "log.tab.update")]
    TabUpdate,
    #[serde(rename = "log.tab.reset")]
    TabReset,
    #[serde(rename = "log.event.added")]
    LogEventAdded,
}

/// Push notification emitted by the background log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum Notification {
    #[serde(rename = "log.tab.added")]
    TabAdded(TabInfo),
    #[serde(rename = "log.tab.close")]
    TabClose(TabInfo),
    #[serde(rename = "log.tab.update")]
    TabUpdate(TabInfo),
    #[serde(rename = "log.tab.reset")]
    TabReset(TabInfo),
    #[serde(rename = "log.event.added")]
    LogEventAdded {
        tab: TabInfo,
        event: Box<FilteringEvent>,
    },
}

impl Notification {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TabAdded(_) => EventKind::TabAdded,
            Self::TabClose(_) => EventKind::TabClose,
            Self::TabUpdate(_) => EventKind::TabUpdate,
            Self::TabReset(_) => EventKind::TabReset,
            Self::LogEventAdded { .. } => EventKind::LogEventAdded,
        }
    }
}
