//! Background process
//!
//! A single task owns the filtering log, the listener registry and the
//! connection table. Everything else talks to it through a
//! [`BackgroundHandle`], so no state is shared behind locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use fl_core::config::LogConfig;
use fl_core::store::FilteringLog;
use fl_core::types::{BrowserTab, EventUpdate, FilteringEvent, Notification, TabId};
use fl_core::url::extract_host;

use crate::error::BusError;
use crate::protocol::{FilteringLogData, PortId, PortMessage, Request, Response};
use crate::registry::ListenerRegistry;
use crate::rule_store::RuleStore;
use crate::transport::{Port, Transport};

/// Source of the tabs currently open in the browser.
#[async_trait]
pub trait TabsApi: Send + Sync {
    async fn open_tabs(&self) -> Vec<BrowserTab>;
}

/// Fixed tab list, replaceable at runtime.
#[derive(Debug, Default)]
pub struct StaticTabs {
    tabs: Mutex<Vec<BrowserTab>>,
}

impl StaticTabs {
    pub fn new(tabs: Vec<BrowserTab>) -> Self {
        Self {
            tabs: Mutex::new(tabs),
        }
    }

    pub fn set(&self, tabs: Vec<BrowserTab>) {
        if let Ok(mut current) = self.tabs.lock() {
            *current = tabs;
        }
    }
}

#[async_trait]
impl TabsApi for StaticTabs {
    async fn open_tabs(&self) -> Vec<BrowserTab> {
        self.tabs.lock().map(|tabs| tabs.clone()).unwrap_or_default()
    }
}

enum Command {
    Connect {
        reply: oneshot::Sender<Port>,
    },
    Port {
        port_id: PortId,
        message: PortMessage,
    },
    PortClosed {
        port_id: PortId,
    },
    Request {
        request: Request,
        reply: oneshot::Sender<Result<Response, BusError>>,
    },
    RecordEvent {
        tab_id: TabId,
        event: Box<FilteringEvent>,
    },
    UpdateEvent {
        tab_id: TabId,
        event_id: String,
        update: Box<EventUpdate>,
    },
    TabCreated(BrowserTab),
    TabUpdated(BrowserTab),
    TabRemoved(TabId),
    TabNavigated(TabId),
    ListenerCount {
        reply: oneshot::Sender<usize>,
    },
    Restart,
    DropConnections,
    Shutdown,
}

/// Cloneable handle to the background task.
#[derive(Clone)]
pub struct BackgroundHandle {
    commands: mpsc::UnboundedSender<Command>,
}

/// Start the background task on the current tokio runtime.
pub fn spawn(
    config: &LogConfig,
    store: Arc<dyn RuleStore>,
    tabs: Arc<dyn TabsApi>,
) -> BackgroundHandle {
    let (commands, receiver) = mpsc::unbounded_channel();
    let background = Background {
        log: FilteringLog::new(config),
        registry: ListenerRegistry::new(),
        ports: HashMap::new(),
        next_port: 0,
        store,
        tabs,
        commands: commands.downgrade(),
    };
    tokio::spawn(background.run(receiver));
    BackgroundHandle { commands }
}

impl BackgroundHandle {
    fn command(&self, command: Command) -> Result<(), BusError> {
        self.commands
            .send(command)
            .map_err(|_| BusError::ChannelClosed)
    }

    // ===== Platform hooks =====

    pub fn record_event(&self, tab_id: TabId, event: FilteringEvent) -> Result<(), BusError> {
        self.command(Command::RecordEvent {
            tab_id,
            event: Box::new(event),
        })
    }

    pub fn update_event(
        &self,
        tab_id: TabId,
        event_id: &str,
        update: EventUpdate,
    ) -> Result<(), BusError> {
        self.command(Command::UpdateEvent {
            tab_id,
            event_id: event_id.to_string(),
            update: Box::new(update),
        })
    }

    pub fn tab_created(&self, tab: BrowserTab) -> Result<(), BusError> {
        self.command(Command::TabCreated(tab))
    }

    pub fn tab_updated(&self, tab: BrowserTab) -> Result<(), BusError> {
        self.command(Command::TabUpdated(tab))
    }

    pub fn tab_removed(&self, tab_id: TabId) -> Result<(), BusError> {
        self.command(Command::TabRemoved(tab_id))
    }

    /// Main frame navigation of a tab.
    pub fn tab_navigated(&self, tab_id: TabId) -> Result<(), BusError> {
        self.command(Command::TabNavigated(tab_id))
    }

    // ===== Lifecycle =====

    /// Behave as a freshly restarted background: every listener id is
    /// forgotten and each open connection is asked to subscribe again.
    pub fn restart(&self) -> Result<(), BusError> {
        self.command(Command::Restart)
    }

    /// Close every open connection from the background side.
    pub fn drop_connections(&self) -> Result<(), BusError> {
        self.command(Command::DropConnections)
    }

    pub fn shutdown(&self) -> Result<(), BusError> {
        self.command(Command::Shutdown)
    }

    pub async fn listener_count(&self) -> Result<usize, BusError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::ListenerCount { reply })?;
        response.await.map_err(|_| BusError::ChannelClosed)
    }

    /// Handle a raw JSON request. Unknown message types are dropped with a
    /// warning and yield `Ok(None)`.
    pub async fn send_raw(&self, raw: &str) -> Result<Option<Response>, BusError> {
        match Request::from_json(raw) {
            Ok(request) => self.send_message(request).await.map(Some),
            Err(BusError::UnknownMessage(tag)) => {
                log::warn!("[fl.bus] dropping message of unknown type {:?}", tag);
                Ok(None)
            }
            Err(e) => {
                log::warn!("[fl.bus] dropping malformed message: {}", e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Transport for BackgroundHandle {
    async fn connect(&self) -> Result<Port, BusError> {
        let (reply, port) = oneshot::channel();
        self.command(Command::Connect { reply })?;
        port.await.map_err(|_| BusError::ChannelClosed)
    }

    async fn send_message(&self, request: Request) -> Result<Response, BusError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Request { request, reply })?;
        response.await.map_err(|_| BusError::ChannelClosed)?
    }
}

// ====================================================================
// Background task
// ====================================================================

struct Background {
    log: FilteringLog,
    registry: ListenerRegistry,
    ports: HashMap<PortId, mpsc::UnboundedSender<PortMessage>>,
    next_port: u64,
    store: Arc<dyn RuleStore>,
    tabs: Arc<dyn TabsApi>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl Background {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Shutdown => break,
                command => self.handle(command).await,
            }
        }
        log::debug!("[fl.bus] background stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => self.connect(reply),
            Command::Port { port_id, message } => self.on_port_message(port_id, message),
            Command::PortClosed { port_id } => self.close_port(port_id),
            Command::Request { request, reply } => {
                let response = self.on_request(request).await;
                if reply.send(response).is_err() {
                    log::debug!("[fl.bus] requester went away before the response");
                }
            }
            Command::RecordEvent { tab_id, event } => {
                let notification = self.log.record_event(tab_id, *event);
                self.notify_all(notification);
            }
            Command::UpdateEvent {
                tab_id,
                event_id,
                update,
            } => {
                let notification = self.log.update_event(tab_id, &event_id, *update);
                self.notify_all(notification);
            }
            Command::TabCreated(tab) => {
                let notification = self.log.create_tab(&tab, false);
                self.notify_all(notification);
            }
            Command::TabUpdated(tab) => {
                let notification = self.log.update_tab(&tab);
                self.notify_all(notification);
            }
            Command::TabRemoved(tab_id) => {
                let notification = self.log.remove_tab(tab_id);
                self.notify_all(notification);
            }
            Command::TabNavigated(tab_id) => {
                let notification = self.log.reset_tab(tab_id);
                self.notify_all(notification);
            }
            Command::ListenerCount { reply } => {
                let _ = reply.send(self.registry.len());
            }
            Command::Restart => {
                log::info!("[fl.bus] restart: dropping {} listeners", self.registry.len());
                self.registry.clear();
                let ports: Vec<PortId> = self.ports.keys().copied().collect();
                for port_id in ports {
                    self.post(port_id, PortMessage::UpdateListeners);
                }
            }
            Command::DropConnections => {
                let ports: Vec<PortId> = self.ports.keys().copied().collect();
                for port_id in ports {
                    self.close_port(port_id);
                }
            }
            Command::Shutdown => {}
        }
    }

    // ===== Connections =====

    fn connect(&mut self, reply: oneshot::Sender<Port>) {
        let Some(commands) = self.commands.upgrade() else {
            return;
        };

        self.next_port += 1;
        let port_id = PortId(self.next_port);
        let (to_ui, from_background) = mpsc::unbounded_channel();
        let (to_background, mut from_ui) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(message) = from_ui.recv().await {
                if commands.send(Command::Port { port_id, message }).is_err() {
                    return;
                }
            }
            let _ = commands.send(Command::PortClosed { port_id });
        });

        self.ports.insert(port_id, to_ui);
        log::debug!("[fl.bus] port {} connected", port_id);
        let _ = reply.send(Port::new(port_id, to_background, from_background));
    }

    fn close_port(&mut self, port_id: PortId) {
        if self.ports.remove(&port_id).is_some() {
            let removed = self.registry.remove_port(port_id);
            log::debug!("[fl.bus] port {} closed, {} listeners removed", port_id, removed);
        }
    }

    fn post(&mut self, port_id: PortId, message: PortMessage) {
        let delivered = match self.ports.get(&port_id) {
            Some(sender) => sender.send(message).is_ok(),
            None => {
                log::debug!("[fl.bus] message for closed port {}", port_id);
                return;
            }
        };
        if !delivered {
            self.close_port(port_id);
        }
    }

    fn on_port_message(&mut self, port_id: PortId, message: PortMessage) {
        if !self.ports.contains_key(&port_id) {
            log::debug!("[fl.bus] message on closed port {}", port_id);
            return;
        }
        match message {
            PortMessage::CreateEventListener { events } => {
                let listener_id = self.registry.add(port_id, &events);
                log::debug!(
                    "[fl.bus] listener {} on port {} for {:?}",
                    listener_id,
                    port_id,
                    events
                );
                self.post(port_id, PortMessage::EventListenerCreated { listener_id });
            }
            PortMessage::RemoveListener { listener_id } => {
                if !self.registry.remove(listener_id) {
                    log::warn!("[fl.bus] remove of unknown listener {}", listener_id);
                }
            }
            other => {
                log::warn!("[fl.bus] unexpected message on port {}: {:?}", port_id, other);
            }
        }
    }

    fn notify_all(&mut self, notification: Option<Notification>) {
        let Some(notification) = notification else {
            return;
        };
        for (listener_id, port_id) in self.registry.targets(notification.kind()) {
            self.post(
                port_id,
                PortMessage::NotifyListeners {
                    listener_id,
                    notification: notification.clone(),
                },
            );
        }
    }

    // ===== Requests =====

    async fn on_request(&mut self, request: Request) -> Result<Response, BusError> {
        match request {
            Request::GetFilteringInfoByTabId { tab_id } => Ok(Response::FilteringInfo(
                self.log.filtering_info(tab_id).cloned(),
            )),
            Request::SynchronizeOpenTabs => {
                let open_tabs = self.tabs.open_tabs().await;
                for notification in self.log.synchronize_open_tabs(&open_tabs) {
                    self.notify_all(Some(notification));
                }
                Ok(Response::Tabs(self.log.tabs()))
            }
            Request::ClearEventsByTabId {
                tab_id,
                ignore_preserve_log,
            } => {
                let notification = self.log.clear_events(tab_id, ignore_preserve_log);
                self.notify_all(notification);
                Ok(Response::Ack)
            }
            Request::SetPreserveLogState { state } => {
                self.log.set_preserve_log(state);
                Ok(Response::Ack)
            }
            Request::AddUserRule { rule_text } => {
                self.store.add_user_rule(&rule_text).await?;
                Ok(Response::Ack)
            }
            Request::RemoveUserRule { rule_text } => {
                self.store.remove_user_rule(&rule_text).await?;
                Ok(Response::Ack)
            }
            Request::AddAllowlistDomainForUrl { url } => {
                match extract_host(&url) {
                    Some(host) => self.store.add_allowlist_domain(host).await?,
                    None => log::warn!("[fl.bus] no host to allowlist in {:?}", url),
                }
                Ok(Response::Ack)
            }
            Request::RemoveAllowlistDomain { tab_id } => {
                let domain = self
                    .log
                    .filtering_info(tab_id)
                    .and_then(|info| info.info.domain.clone());
                match domain {
                    Some(domain) => self.store.remove_allowlist_domain(&domain).await?,
                    None => log::warn!("[fl.bus] no domain known for tab {}", tab_id),
                }
                Ok(Response::Ack)
            }
            Request::GetFilteringLogData => Ok(Response::LogData(FilteringLogData {
                filters_metadata: self.store.filters_metadata().await,
                preserve_log_enabled: self.log.preserve_log(),
            })),
            Request::OpenFilteringLogPage => {
                self.log.on_open_page();
                Ok(Response::Ack)
            }
            Request::CloseFilteringLogPage => {
                self.log.on_close_page();
                Ok(Response::Ack)
            }
        }
    }
}
