//! Filtering Log Message Bus
//!
//! Connects UI surfaces to the background process that owns the filtering
//! log. One-shot requests go through [`Transport::send_message`]; push
//! notifications travel over long-lived connections and are delivered to
//! [`EventListener`]s, which re-register on their own when the background
//! restarts or drops the connection.
//!
//! # Modules
//!
//! - `protocol`: Tagged wire messages
//! - `transport`: Connection seam and the UI end of a connection
//! - `background`: Background task owning the log and the listeners
//! - `registry`: Listener bookkeeping of the background
//! - `rule_store`: Rule persistence seam
//! - `listener`: Reconnecting UI-side subscription
//! - `messenger`: Typed request helpers
//! - `page`: Filtering log page composition

pub mod background;
pub mod error;
pub mod listener;
pub mod messenger;
pub mod page;
pub mod protocol;
pub mod registry;
pub mod rule_store;
pub mod transport;

pub use background::{spawn, BackgroundHandle, StaticTabs, TabsApi};
pub use error::BusError;
pub use listener::EventListener;
pub use messenger::Messenger;
pub use page::{FilteringLogPage, LOG_PAGE_EVENTS};
pub use protocol::{FilteringLogData, ListenerId, PortId, PortMessage, Request, Response};
pub use registry::ListenerRegistry;
pub use rule_store::{MemoryRuleStore, RuleStore};
pub use transport::{Port, Transport};
