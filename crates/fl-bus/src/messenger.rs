//! Typed request helpers for UI surfaces

use std::sync::Arc;

use async_trait::async_trait;

use fl_core::types::{EventKind, Notification, TabFilteringInfo, TabId};
use fl_rules::{RuleSink, WizardError};

use crate::error::BusError;
use crate::listener::EventListener;
use crate::protocol::{FilteringLogData, Request, Response};
use crate::transport::Transport;

/// UI-side client of the background.
#[derive(Clone)]
pub struct Messenger {
    transport: Arc<dyn Transport>,
}

impl Messenger {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn ack(&self, request: Request) -> Result<(), BusError> {
        match self.transport.send_message(request).await? {
            Response::Ack => Ok(()),
            _ => Err(BusError::UnexpectedResponse),
        }
    }

    pub async fn get_filtering_info_by_tab_id(
        &self,
        tab_id: TabId,
    ) -> Result<Option<TabFilteringInfo>, BusError> {
        match self
            .transport
            .send_message(Request::GetFilteringInfoByTabId { tab_id })
            .await?
        {
            Response::FilteringInfo(info) => Ok(info),
            _ => Err(BusError::UnexpectedResponse),
        }
    }

    pub async fn synchronize_open_tabs(&self) -> Result<Vec<TabFilteringInfo>, BusError> {
        match self.transport.send_message(Request::SynchronizeOpenTabs).await? {
            Response::Tabs(tabs) => Ok(tabs),
            _ => Err(BusError::UnexpectedResponse),
        }
    }

    pub async fn get_filtering_log_data(&self) -> Result<FilteringLogData, BusError> {
        match self.transport.send_message(Request::GetFilteringLogData).await? {
            Response::LogData(data) => Ok(data),
            _ => Err(BusError::UnexpectedResponse),
        }
    }

    pub async fn clear_events_by_tab_id(
        &self,
        tab_id: TabId,
        ignore_preserve_log: bool,
    ) -> Result<(), BusError> {
        self.ack(Request::ClearEventsByTabId {
            tab_id,
            ignore_preserve_log,
        })
        .await
    }

    pub async fn set_preserve_log_state(&self, state: bool) -> Result<(), BusError> {
        self.ack(Request::SetPreserveLogState { state }).await
    }

    pub async fn add_user_rule(&self, rule_text: &str) -> Result<(), BusError> {
        self.ack(Request::AddUserRule {
            rule_text: rule_text.to_string(),
        })
        .await
    }

    pub async fn remove_user_rule(&self, rule_text: &str) -> Result<(), BusError> {
        self.ack(Request::RemoveUserRule {
            rule_text: rule_text.to_string(),
        })
        .await
    }

    pub async fn add_allowlist_domain_for_url(&self, url: &str) -> Result<(), BusError> {
        self.ack(Request::AddAllowlistDomainForUrl {
            url: url.to_string(),
        })
        .await
    }

    pub async fn remove_allowlist_domain(&self, tab_id: TabId) -> Result<(), BusError> {
        self.ack(Request::RemoveAllowlistDomain { tab_id }).await
    }

    pub async fn open_filtering_log_page(&self) -> Result<(), BusError> {
        self.ack(Request::OpenFilteringLogPage).await
    }

    pub async fn close_filtering_log_page(&self) -> Result<(), BusError> {
        self.ack(Request::CloseFilteringLogPage).await
    }

    pub async fn create_event_listener<F>(&self, events: Vec<EventKind>, callback: F) -> EventListener
    where
        F: FnMut(Notification) + Send + 'static,
    {
        EventListener::subscribe(self.transport.clone(), events, callback).await
    }
}

fn submit_error(e: BusError) -> WizardError {
    WizardError::Submit(e.to_string())
}

#[async_trait]
impl RuleSink for Messenger {
    async fn add_user_rule(&self, rule_text: &str) -> Result<(), WizardError> {
        Messenger::add_user_rule(self, rule_text)
            .await
            .map_err(submit_error)
    }

    async fn remove_user_rule(&self, rule_text: &str) -> Result<(), WizardError> {
        Messenger::remove_user_rule(self, rule_text)
            .await
            .map_err(submit_error)
    }

    async fn remove_allowlist_domain(&self, tab_id: TabId) -> Result<(), WizardError> {
        Messenger::remove_allowlist_domain(self, tab_id)
            .await
            .map_err(submit_error)
    }
}
