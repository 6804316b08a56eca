//! Filtering Log Core Library
//!
//! This crate holds everything about filtering events that does not need a
//! runtime: the event data model, the status classifier, the filter predicate
//! pipeline and the two sides of the event log (the authoritative background
//! log and the read-only projection kept by a UI surface).
//!
//! # Modules
//!
//! - `types`: Filtering events, rule data, tabs and notifications
//! - `strings`: Small text helpers shared by every other module
//! - `url`: Scheme/host helpers for the rule synthesizer
//! - `status`: Event status classification
//! - `filter`: Search and tag filtering of events
//! - `store`: Background-owned per-tab event log
//! - `view`: UI-side projection of the log
//! - `config`: Log configuration

pub mod config;
pub mod filter;
pub mod status;
pub mod store;
pub mod strings;
pub mod types;
pub mod url;
pub mod view;

// Re-export commonly used types
pub use config::{ConfigError, LogConfig};
pub use filter::{EventTypeTag, LogFilter, MiscTag, SourceTag, TagGroup};
pub use status::{classify, StatusMode};
pub use store::FilteringLog;
pub use types::{
    BrowserTab, EventKind, EventUpdate, FilterMetadata, FilteringEvent, Notification, ParseError,
    RequestType, RuleData, TabFilteringInfo, TabId, TabInfo, ALLOWLIST_FILTER_ID,
    BACKGROUND_TAB_ID, USER_FILTER_ID,
};
pub use view::{LogView, SelectorTab, ViewEffect};
