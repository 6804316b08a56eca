//! Filtering log page
//!
//! Glue between the read-only log view, the rule wizard and the background:
//! loads initial data on mount, keeps the view current from push
//! notifications and routes wizard submissions through the messenger.

use std::sync::Arc;

use tokio::sync::mpsc;

use fl_core::config::LogConfig;
use fl_core::types::{EventKind, Notification, TabId, BACKGROUND_TAB_ID};
use fl_core::view::{LogView, ViewEffect};
use fl_rules::{AddedRuleState, Wizard, WizardError};

use crate::error::BusError;
use crate::listener::EventListener;
use crate::messenger::Messenger;
use crate::transport::Transport;

/// Notification kinds a log page subscribes to.
pub const LOG_PAGE_EVENTS: &[EventKind] = &[
    EventKind::TabAdded,
    EventKind::TabUpdate,
    EventKind::TabClose,
    EventKind::TabReset,
    EventKind::LogEventAdded,
];

pub struct FilteringLogPage {
    messenger: Messenger,
    view: LogView,
    wizard: Wizard,
    listener: EventListener,
    notifications: mpsc::UnboundedReceiver<Notification>,
}

impl FilteringLogPage {
    /// Open a log page: register it with the background, load filter
    /// metadata and tabs, subscribe to notifications and select `tab_id`
    /// (the background tab when absent).
    pub async fn mount(
        transport: Arc<dyn Transport>,
        config: &LogConfig,
        tab_id: Option<TabId>,
    ) -> Result<Self, BusError> {
        let messenger = Messenger::new(transport);
        messenger.open_filtering_log_page().await?;

        let mut view = LogView::new(config);
        let data = messenger.get_filtering_log_data().await?;
        view.set_filters_metadata(data.filters_metadata);
        view.set_preserve_log_enabled(data.preserve_log_enabled);
        view.set_tabs(messenger.synchronize_open_tabs().await?);

        let (tx, notifications) = mpsc::unbounded_channel();
        let listener = messenger
            .create_event_listener(LOG_PAGE_EVENTS.to_vec(), move |notification| {
                let _ = tx.send(notification);
            })
            .await;

        let mut page = Self {
            messenger,
            view,
            wizard: Wizard::new(),
            listener,
            notifications,
        };
        page.select_tab(tab_id.unwrap_or(BACKGROUND_TAB_ID)).await?;
        log::debug!("[fl.page] mounted on tab {:?}", page.view.selected_tab_id());
        Ok(page)
    }

    /// Unsubscribe and tell the background the page is gone.
    pub async fn unmount(self) -> Result<(), BusError> {
        self.listener.unsubscribe().await;
        self.messenger.close_filtering_log_page().await
    }

    pub fn view(&self) -> &LogView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut LogView {
        &mut self.view
    }

    pub fn wizard(&self) -> &Wizard {
        &self.wizard
    }

    pub fn wizard_mut(&mut self) -> &mut Wizard {
        &mut self.wizard
    }

    // ===== Tabs =====

    pub async fn select_tab(&mut self, tab_id: TabId) -> Result<(), BusError> {
        self.view.select_tab(tab_id);
        self.load_tab(tab_id).await
    }

    async fn load_tab(&mut self, tab_id: TabId) -> Result<(), BusError> {
        let info = self.messenger.get_filtering_info_by_tab_id(tab_id).await?;
        if self.view.selected_tab_id() == Some(tab_id) {
            self.view
                .set_events(info.map(|info| info.filtering_events).unwrap_or_default());
        }
        Ok(())
    }

    /// Re-read the events of the selected tab.
    pub async fn refresh(&mut self) -> Result<(), BusError> {
        match self.view.selected_tab_id() {
            Some(tab_id) => self.load_tab(tab_id).await,
            None => Ok(()),
        }
    }

    // ===== Notifications =====

    /// Apply every notification received so far. Returns how many were
    /// applied.
    pub async fn apply_notifications(&mut self) -> Result<usize, BusError> {
        let mut applied = 0;
        while let Ok(notification) = self.notifications.try_recv() {
            self.apply(notification).await?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Wait for the next notification and apply it. Returns false once the
    /// listener is gone.
    pub async fn next_notification(&mut self) -> Result<bool, BusError> {
        match self.notifications.recv().await {
            Some(notification) => {
                self.apply(notification).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn apply(&mut self, notification: Notification) -> Result<(), BusError> {
        for effect in self.view.apply(&notification) {
            self.run_effect(effect).await?;
        }
        Ok(())
    }

    async fn run_effect(&mut self, effect: ViewEffect) -> Result<(), BusError> {
        match effect {
            ViewEffect::CloseWizard => self.wizard.close(),
            ViewEffect::OpenWizard => {
                if let Some(event) = self.view.selected_event().cloned() {
                    self.wizard.open(event);
                }
            }
            ViewEffect::LoadTab(tab_id) => self.load_tab(tab_id).await?,
        }
        Ok(())
    }

    // ===== Controls =====

    /// Row click in the event table.
    pub async fn handle_select_event(&mut self, event_id: &str) -> Result<(), BusError> {
        let effect = self
            .view
            .handle_select_event(event_id, self.wizard.is_open());
        self.run_effect(effect).await
    }

    pub fn close_wizard(&mut self) {
        self.wizard.close();
        self.view.remove_selected_event();
    }

    /// Clear the selected tab, even with preserve-log enabled.
    pub async fn clear_events(&mut self) -> Result<(), BusError> {
        let Some(tab_id) = self.view.selected_tab_id() else {
            log::warn!("[fl.page] no tab selected to clear");
            return Ok(());
        };
        self.messenger.clear_events_by_tab_id(tab_id, true).await?;
        self.view.set_events(Vec::new());
        self.close_wizard();
        Ok(())
    }

    pub async fn set_preserve_log(&mut self, enabled: bool) -> Result<(), BusError> {
        self.messenger.set_preserve_log_state(enabled).await?;
        self.view.set_preserve_log_enabled(enabled);
        Ok(())
    }

    // ===== Wizard submissions =====

    pub async fn add_rule(&mut self) -> Result<AddedRuleState, WizardError> {
        self.wizard.add_rule(&self.messenger).await
    }

    pub async fn remove_from_user_filter(&mut self) -> Result<(), WizardError> {
        self.wizard.remove_from_user_filter(&self.messenger).await?;
        self.view.remove_selected_event();
        Ok(())
    }

    pub async fn remove_added_rule(&mut self) -> Result<(), WizardError> {
        self.wizard.remove_added_rule(&self.messenger).await?;
        self.view.remove_selected_event();
        Ok(())
    }

    pub async fn remove_from_allowlist(&mut self) -> Result<(), WizardError> {
        let tab_id = self.view.selected_tab_id();
        self.wizard
            .remove_from_allowlist(&self.messenger, tab_id)
            .await?;
        self.view.remove_selected_event();
        Ok(())
    }
}
