//! UI-side event listener
//!
//! A listener owns one long-lived connection and survives both kinds of
//! background disruption: an `UpdateListeners` broadcast (re-register on the
//! same connection) and a dropped connection (reconnect, then re-register).
//! Notifications addressed to a listener id other than the current one are
//! dropped, so a re-registration never delivers a notification twice.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

use fl_core::types::{EventKind, Notification};

use crate::error::BusError;
use crate::protocol::{ListenerId, PortMessage};
use crate::transport::{Port, Transport};

enum Control {
    Unsubscribe { done: oneshot::Sender<()> },
}

/// Subscription to background notifications.
///
/// Dropping the listener closes it as well, without waiting.
pub struct EventListener {
    control: mpsc::UnboundedSender<Control>,
    listener_id: Arc<AtomicU64>,
    closed: AtomicBool,
}

impl EventListener {
    /// Connect, register for `events` and start delivering matching
    /// notifications to `callback`. Failed attempts are retried until the
    /// background accepts the registration.
    pub async fn subscribe<F>(
        transport: Arc<dyn Transport>,
        events: Vec<EventKind>,
        callback: F,
    ) -> Self
    where
        F: FnMut(Notification) + Send + 'static,
    {
        let (port, listener_id) = establish(transport.as_ref(), &events).await;
        log::debug!("[fl.bus] subscribed as listener {}", listener_id);

        let shared_id = Arc::new(AtomicU64::new(listener_id.0));
        let (control, control_rx) = mpsc::unbounded_channel();
        let task = ListenerTask {
            transport,
            events,
            callback,
            port,
            current: Some(listener_id),
            pending: false,
            shared_id: shared_id.clone(),
        };
        tokio::spawn(task.run(control_rx));

        Self {
            control,
            listener_id: shared_id,
            closed: AtomicBool::new(false),
        }
    }

    /// Current listener id, `None` while re-registering or once closed.
    pub fn listener_id(&self) -> Option<ListenerId> {
        match self.listener_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(ListenerId(id)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Remove the listener and close its connection. Calling it again is a
    /// no-op.
    pub async fn unsubscribe(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let (done, finished) = oneshot::channel();
        if self.control.send(Control::Unsubscribe { done }).is_ok() {
            let _ = finished.await;
        }
    }
}

/// Connect and register, retrying immediately after every failure.
async fn establish(transport: &dyn Transport, events: &[EventKind]) -> (Port, ListenerId) {
    loop {
        match transport.connect().await {
            Ok(mut port) => match register(&mut port, events).await {
                Ok(listener_id) => return (port, listener_id),
                Err(e) => log::debug!("[fl.bus] registration on port {} failed: {}", port.id(), e),
            },
            Err(e) => log::debug!("[fl.bus] connect failed: {}", e),
        }
        tokio::task::yield_now().await;
    }
}

/// Send a registration and wait for its listener id.
async fn register(port: &mut Port, events: &[EventKind]) -> Result<ListenerId, BusError> {
    port.send(PortMessage::CreateEventListener {
        events: events.to_vec(),
    })?;
    loop {
        match port.recv().await {
            Some(PortMessage::EventListenerCreated { listener_id }) => return Ok(listener_id),
            // The registration in flight is handled after the restart.
            Some(PortMessage::UpdateListeners) => {}
            Some(other) => log::debug!("[fl.bus] ignoring {:?} before registration", other),
            None => return Err(BusError::Disconnected),
        }
    }
}

struct ListenerTask<F> {
    transport: Arc<dyn Transport>,
    events: Vec<EventKind>,
    callback: F,
    port: Port,
    current: Option<ListenerId>,
    /// A `CreateEventListener` was sent and its reply has not arrived yet.
    pending: bool,
    shared_id: Arc<AtomicU64>,
}

impl<F> ListenerTask<F>
where
    F: FnMut(Notification) + Send + 'static,
{
    async fn run(mut self, mut control: mpsc::UnboundedReceiver<Control>) {
        loop {
            tokio::select! {
                command = control.recv() => {
                    self.close();
                    if let Some(Control::Unsubscribe { done }) = command {
                        let _ = done.send(());
                    }
                    return;
                }
                message = self.port.recv() => match message {
                    Some(message) => self.on_message(message),
                    None => {
                        if !self.reconnect(&mut control).await {
                            return;
                        }
                    }
                }
            }
        }
    }

    fn set_current(&mut self, listener_id: Option<ListenerId>) {
        self.current = listener_id;
        self.shared_id
            .store(listener_id.map_or(0, |id| id.0), Ordering::SeqCst);
    }

    fn request_registration(&mut self) {
        self.pending = true;
        let message = PortMessage::CreateEventListener {
            events: self.events.clone(),
        };
        if let Err(e) = self.port.send(message) {
            log::debug!("[fl.bus] registration not sent: {}", e);
        }
    }

    fn on_message(&mut self, message: PortMessage) {
        match message {
            PortMessage::NotifyListeners {
                listener_id,
                notification,
            } => {
                if self.current != Some(listener_id) {
                    log::debug!("[fl.bus] dropping notification for stale listener {}", listener_id);
                    return;
                }
                if !self.events.contains(&notification.kind()) {
                    log::warn!(
                        "[fl.bus] dropping unrequested notification {:?}",
                        notification.kind()
                    );
                    return;
                }
                (self.callback)(notification);
            }
            PortMessage::EventListenerCreated { listener_id } => {
                self.pending = false;
                self.set_current(Some(listener_id));
            }
            PortMessage::UpdateListeners => {
                // A registration still in flight lands after the restart and
                // stays valid.
                if self.pending {
                    return;
                }
                self.set_current(None);
                self.request_registration();
            }
            other => log::warn!("[fl.bus] unexpected message {:?}", other),
        }
    }

    fn close(&mut self) {
        if let Some(listener_id) = self.current {
            if let Err(e) = self.port.send(PortMessage::RemoveListener { listener_id }) {
                log::debug!("[fl.bus] remove of listener {} not sent: {}", listener_id, e);
            }
        }
        self.set_current(None);
    }

    /// Reconnect after the background dropped the connection. Returns false
    /// when the listener was closed meanwhile.
    async fn reconnect(&mut self, control: &mut mpsc::UnboundedReceiver<Control>) -> bool {
        log::info!("[fl.bus] connection {} dropped, reconnecting", self.port.id());
        self.set_current(None);
        self.pending = false;

        loop {
            match control.try_recv() {
                Ok(Control::Unsubscribe { done }) => {
                    let _ = done.send(());
                    return false;
                }
                Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => {}
            }

            match self.transport.connect().await {
                Ok(port) => {
                    log::debug!("[fl.bus] reconnected on port {}", port.id());
                    self.port = port;
                    self.request_registration();
                    return true;
                }
                Err(e) => {
                    log::debug!("[fl.bus] reconnect failed: {}", e);
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fl_core::config::LogConfig;
    use fl_core::types::{BrowserTab, TabId, TabInfo};

    use crate::background::{self, BackgroundHandle, StaticTabs};
    use crate::protocol::{PortId, Request, Response};
    use crate::rule_store::MemoryRuleStore;

    fn start() -> BackgroundHandle {
        background::spawn(
            &LogConfig::default(),
            Arc::new(MemoryRuleStore::default()),
            Arc::new(StaticTabs::default()),
        )
    }

    fn collector() -> (
        impl FnMut(Notification) + Send + 'static,
        mpsc::UnboundedReceiver<Notification>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |notification| {
                let _ = tx.send(notification);
            },
            rx,
        )
    }

    fn added_tab(notification: Notification) -> TabId {
        match notification {
            Notification::TabAdded(info) => info.tab_id,
            other => panic!("unexpected notification {:?}", other),
        }
    }

    async fn wait_for_new_id(listener: &EventListener, old: Option<ListenerId>) {
        for _ in 0..1000 {
            if listener.listener_id().is_some_and(|id| Some(id) != old) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("listener was not registered again");
    }

    #[tokio::test]
    async fn test_delivers_subscribed_kinds() {
        let background = start();
        let (callback, mut received) = collector();
        let listener = EventListener::subscribe(
            Arc::new(background.clone()),
            vec![EventKind::TabAdded, EventKind::LogEventAdded],
            callback,
        )
        .await;
        assert!(listener.listener_id().is_some());

        background.send_message(Request::OpenFilteringLogPage).await.unwrap();
        background.tab_created(BrowserTab::new(1, "Example", "https://example.org/")).unwrap();
        background
            .record_event(
                TabId(1),
                fl_core::types::FilteringEvent {
                    event_id: "1".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(added_tab(received.recv().await.unwrap()), TabId(1));
        assert!(matches!(
            received.recv().await,
            Some(Notification::LogEventAdded { .. })
        ));
    }

    #[tokio::test]
    async fn test_resubscribes_after_restart_without_duplicates() {
        let background = start();
        let (callback, mut received) = collector();
        let listener = EventListener::subscribe(
            Arc::new(background.clone()),
            vec![EventKind::TabAdded],
            callback,
        )
        .await;
        let first = listener.listener_id();

        background.restart().unwrap();
        wait_for_new_id(&listener, first).await;
        assert_eq!(background.listener_count().await.unwrap(), 1);

        background.tab_created(BrowserTab::new(2, "Two", "https://two.org/")).unwrap();
        background.tab_created(BrowserTab::new(3, "Three", "https://three.org/")).unwrap();
        assert_eq!(added_tab(received.recv().await.unwrap()), TabId(2));
        assert_eq!(added_tab(received.recv().await.unwrap()), TabId(3));
    }

    #[tokio::test]
    async fn test_reconnects_after_connection_drop() {
        let background = start();
        let (callback, mut received) = collector();
        let listener = EventListener::subscribe(
            Arc::new(background.clone()),
            vec![EventKind::TabAdded],
            callback,
        )
        .await;
        let first = listener.listener_id();

        background.drop_connections().unwrap();
        wait_for_new_id(&listener, first).await;

        background.tab_created(BrowserTab::new(4, "Four", "https://four.org/")).unwrap();
        assert_eq!(added_tab(received.recv().await.unwrap()), TabId(4));
    }

    /// Refuses the first connection, then connects to the background.
    struct RefusesFirst {
        background: BackgroundHandle,
        refused: AtomicBool,
    }

    #[async_trait]
    impl Transport for RefusesFirst {
        async fn connect(&self) -> Result<Port, BusError> {
            if !self.refused.swap(true, Ordering::SeqCst) {
                return Err(BusError::ChannelClosed);
            }
            self.background.connect().await
        }

        async fn send_message(&self, request: Request) -> Result<Response, BusError> {
            self.background.send_message(request).await
        }
    }

    #[tokio::test]
    async fn test_subscribe_retries_failed_connect() {
        let background = start();
        let transport = Arc::new(RefusesFirst {
            background: background.clone(),
            refused: AtomicBool::new(false),
        });
        let (callback, mut received) = collector();
        let listener =
            EventListener::subscribe(transport.clone(), vec![EventKind::TabAdded], callback).await;

        assert!(transport.refused.load(Ordering::SeqCst));
        assert!(listener.listener_id().is_some());
        assert_eq!(background.listener_count().await.unwrap(), 1);

        background.tab_created(BrowserTab::new(6, "Six", "https://six.org/")).unwrap();
        assert_eq!(added_tab(received.recv().await.unwrap()), TabId(6));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let background = start();
        let (callback, mut received) = collector();
        let listener = EventListener::subscribe(
            Arc::new(background.clone()),
            vec![EventKind::TabAdded],
            callback,
        )
        .await;

        listener.unsubscribe().await;
        listener.unsubscribe().await;
        assert!(listener.is_closed());
        assert_eq!(listener.listener_id(), None);

        let mut remaining = 1;
        for _ in 0..100 {
            remaining = background.listener_count().await.unwrap();
            if remaining == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(remaining, 0);

        background.tab_created(BrowserTab::new(5, "Five", "https://five.org/")).unwrap();
        background.listener_count().await.unwrap();
        assert!(received.try_recv().is_err());
    }

    // ===== Scripted connection =====

    /// Transport handing out a single scripted connection.
    struct Scripted {
        port: Mutex<Option<Port>>,
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn connect(&self) -> Result<Port, BusError> {
            self.port
                .lock()
                .unwrap()
                .take()
                .ok_or(BusError::ChannelClosed)
        }

        async fn send_message(&self, _request: Request) -> Result<Response, BusError> {
            Ok(Response::Ack)
        }
    }

    fn scripted() -> (
        Arc<Scripted>,
        mpsc::UnboundedSender<PortMessage>,
        mpsc::UnboundedReceiver<PortMessage>,
    ) {
        let (to_ui, from_background) = mpsc::unbounded_channel();
        let (to_background, from_ui) = mpsc::unbounded_channel();
        let transport = Arc::new(Scripted {
            port: Mutex::new(Some(Port::new(PortId(1), to_background, from_background))),
        });
        (transport, to_ui, from_ui)
    }

    fn tab(id: i64) -> TabInfo {
        TabInfo {
            tab_id: TabId(id),
            title: String::new(),
            domain: None,
            is_extension_tab: false,
        }
    }

    fn notify(listener_id: u64, notification: Notification) -> PortMessage {
        PortMessage::NotifyListeners {
            listener_id: ListenerId(listener_id),
            notification,
        }
    }

    #[tokio::test]
    async fn test_stale_and_unrequested_notifications_dropped() {
        let (transport, to_ui, mut from_ui) = scripted();
        to_ui
            .send(PortMessage::EventListenerCreated {
                listener_id: ListenerId(7),
            })
            .unwrap();

        let (callback, mut received) = collector();
        let listener =
            EventListener::subscribe(transport, vec![EventKind::TabAdded], callback).await;
        assert_eq!(listener.listener_id(), Some(ListenerId(7)));
        assert!(matches!(
            from_ui.recv().await,
            Some(PortMessage::CreateEventListener { .. })
        ));

        to_ui.send(notify(3, Notification::TabAdded(tab(1)))).unwrap();
        to_ui.send(notify(7, Notification::TabReset(tab(1)))).unwrap();
        to_ui.send(notify(7, Notification::TabAdded(tab(2)))).unwrap();

        assert_eq!(added_tab(received.recv().await.unwrap()), TabId(2));
    }

    #[tokio::test]
    async fn test_update_listeners_registers_once() {
        let (transport, to_ui, mut from_ui) = scripted();
        to_ui
            .send(PortMessage::EventListenerCreated {
                listener_id: ListenerId(7),
            })
            .unwrap();

        let (callback, mut received) = collector();
        let listener =
            EventListener::subscribe(transport, vec![EventKind::TabAdded], callback).await;
        from_ui.recv().await;

        to_ui.send(PortMessage::UpdateListeners).unwrap();
        to_ui.send(PortMessage::UpdateListeners).unwrap();
        assert!(matches!(
            from_ui.recv().await,
            Some(PortMessage::CreateEventListener { .. })
        ));

        to_ui
            .send(PortMessage::EventListenerCreated {
                listener_id: ListenerId(8),
            })
            .unwrap();
        to_ui.send(notify(7, Notification::TabAdded(tab(1)))).unwrap();
        to_ui.send(notify(8, Notification::TabAdded(tab(5)))).unwrap();

        assert_eq!(added_tab(received.recv().await.unwrap()), TabId(5));
        assert_eq!(listener.listener_id(), Some(ListenerId(8)));

        // The second UpdateListeners arrived while registering.
        assert!(from_ui.try_recv().is_err());
    }
}
