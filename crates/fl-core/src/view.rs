//! UI-side projection of the filtering log
//!
//! A log page never mutates the background log directly. It keeps a
//! read-only copy of the tab map and of the selected tab's events, refreshed
//! by push notifications, and applies the filter pipeline for display.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::LogConfig;
use crate::filter::LogFilter;
use crate::strings::truncate;
use crate::types::{
    filter_name, FilterMetadata, FilteringEvent, Notification, RuleData, TabFilteringInfo, TabId,
    TabInfo,
};

/// Side effect the owner of the view has to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEffect {
    /// Close the rule wizard and drop its state.
    CloseWizard,
    /// Open the rule wizard for the selected event.
    OpenWizard,
    /// Fetch the events of a newly selected tab.
    LoadTab(TabId),
}

/// Entry of the tab selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorTab {
    pub tab_id: TabId,
    pub title: String,
    pub domain: Option<String>,
}

/// Fill in the display cache of an event: filter name and lifted rule texts.
pub fn format_event(mut event: FilteringEvent, metadata: &[FilterMetadata]) -> FilteringEvent {
    if let Some(rule) = &event.request_rule {
        event.filter_name = filter_name(rule.filter_id, metadata);
        if rule.original_rule_text.is_some() {
            event.original_rule_text = rule.original_rule_text.clone();
        }
        if let Some(text) = rule.rule_text() {
            event.applied_rule_text = Some(text.to_string());
        }
    }

    if event.filter_name.is_none() {
        event.filter_name = rule_filter_name(&event, metadata);
    }
    event
}

/// Filter name of the rule that produced an event.
///
/// Replace and stealth rules are grouped per filter in the detail view, so a
/// name is only resolved when a single such rule applied.
pub fn rule_filter_name(event: &FilteringEvent, metadata: &[FilterMetadata]) -> Option<String> {
    if let Some(info) = &event.declarative_rule_info {
        return info
            .source_rules
            .first()
            .and_then(|rule| filter_name(rule.filter_id, metadata));
    }
    if let Some(rule) = &event.request_rule {
        return filter_name(rule.filter_id, metadata);
    }

    single_rule(&event.replace_rules)
        .or_else(|| single_rule(&event.stealth_allowlist_rules))
        .and_then(|rule| filter_name(rule.filter_id, metadata))
}

fn single_rule(rules: &Option<Vec<RuleData>>) -> Option<&RuleData> {
    match rules.as_deref() {
        Some([rule]) => Some(rule),
        _ => None,
    }
}

/// Read-only log state of one UI surface.
#[derive(Debug, Clone)]
pub struct LogView {
    tabs: BTreeMap<TabId, TabInfo>,
    selected_tab_id: Option<TabId>,
    events: Vec<FilteringEvent>,
    filter: LogFilter,
    selected_event_id: Option<String>,
    filters_metadata: Vec<FilterMetadata>,
    preserve_log_enabled: bool,
    select_is_open: bool,
    prev_tabs: Vec<SelectorTab>,
    max_title_len: usize,
}

impl Default for LogView {
    fn default() -> Self {
        Self::new(&LogConfig::default())
    }
}

impl LogView {
    pub fn new(config: &LogConfig) -> Self {
        Self {
            tabs: BTreeMap::new(),
            selected_tab_id: None,
            events: Vec::new(),
            filter: config.initial_filter(),
            selected_event_id: None,
            filters_metadata: Vec::new(),
            preserve_log_enabled: config.preserve_log,
            select_is_open: false,
            prev_tabs: Vec::new(),
            max_title_len: config.max_tab_title_len,
        }
    }

    // ===== Background data =====

    pub fn set_filters_metadata(&mut self, metadata: Vec<FilterMetadata>) {
        self.filters_metadata = metadata;
        let events = std::mem::take(&mut self.events);
        self.events = events
            .into_iter()
            .map(|event| format_event(event, &self.filters_metadata))
            .collect();
    }

    pub fn filters_metadata(&self) -> &[FilterMetadata] {
        &self.filters_metadata
    }

    pub fn set_preserve_log_enabled(&mut self, enabled: bool) {
        self.preserve_log_enabled = enabled;
    }

    pub fn preserve_log_enabled(&self) -> bool {
        self.preserve_log_enabled
    }

    /// Merge the result of an open-tab synchronization into the tab map.
    pub fn set_tabs(&mut self, tabs: Vec<TabFilteringInfo>) {
        for tab in tabs {
            self.tabs.insert(tab.info.tab_id, tab.info);
        }
    }

    /// Replace the events of the selected tab.
    pub fn set_events(&mut self, events: Vec<FilteringEvent>) {
        self.events = events
            .into_iter()
            .map(|event| format_event(event, &self.filters_metadata))
            .collect();
    }

    /// Append or refresh one event of the selected tab.
    pub fn record_event(&mut self, tab_id: TabId, event: FilteringEvent) {
        if self.selected_tab_id != Some(tab_id) {
            return;
        }
        let event = format_event(event, &self.filters_metadata);
        match self.events.iter_mut().find(|known| known.event_id == event.event_id) {
            Some(known) => *known = event,
            None => self.events.push(event),
        }
    }

    /// Apply a push notification from the background log.
    pub fn apply(&mut self, notification: &Notification) -> Vec<ViewEffect> {
        match notification {
            Notification::TabAdded(info) | Notification::TabUpdate(info) => {
                self.tabs.insert(info.tab_id, info.clone());
                Vec::new()
            }
            Notification::TabClose(info) => self.on_tab_close(info.tab_id),
            Notification::TabReset(info) => {
                if self.selected_tab_id != Some(info.tab_id) {
                    return Vec::new();
                }
                self.events.clear();
                self.selected_event_id = None;
                vec![ViewEffect::CloseWizard]
            }
            Notification::LogEventAdded { tab, event } => {
                self.tabs.entry(tab.tab_id).or_insert_with(|| tab.clone());
                self.record_event(tab.tab_id, event.as_ref().clone());
                Vec::new()
            }
        }
    }

    fn on_tab_close(&mut self, tab_id: TabId) -> Vec<ViewEffect> {
        self.tabs.remove(&tab_id);
        if self.selected_tab_id != Some(tab_id) {
            return Vec::new();
        }

        self.selected_event_id = None;
        let mut effects = vec![ViewEffect::CloseWizard];
        match self.tabs.keys().next().copied() {
            Some(first) => {
                self.select_tab(first);
                effects.push(ViewEffect::LoadTab(first));
            }
            None => {
                self.selected_tab_id = None;
                self.events.clear();
            }
        }
        effects
    }

    // ===== Tabs =====

    /// Switch to another tab; its events have to be loaded with `set_events`.
    pub fn select_tab(&mut self, tab_id: TabId) {
        if self.selected_tab_id != Some(tab_id) {
            self.events.clear();
            self.selected_event_id = None;
        }
        self.selected_tab_id = Some(tab_id);
    }

    pub fn selected_tab_id(&self) -> Option<TabId> {
        self.selected_tab_id
    }

    pub fn tab(&self, tab_id: TabId) -> Option<&TabInfo> {
        self.tabs.get(&tab_id)
    }

    /// While the selector is open its entries stay frozen.
    pub fn set_select_open(&mut self, open: bool) {
        self.select_is_open = open;
    }

    /// Entries of the tab selector: regular tabs with truncated titles.
    pub fn tabs_for_selector(&mut self) -> Vec<SelectorTab> {
        if self.select_is_open && !self.prev_tabs.is_empty() {
            return self.prev_tabs.clone();
        }

        let tabs: Vec<SelectorTab> = self
            .tabs
            .values()
            .filter(|tab| !tab.is_extension_tab)
            .map(|tab| SelectorTab {
                tab_id: tab.tab_id,
                title: truncate(&tab.title, self.max_title_len),
                domain: tab.domain.clone(),
            })
            .collect();
        self.prev_tabs = tabs.clone();
        tabs
    }

    // ===== Filtering =====

    pub fn filter(&self) -> &LogFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut LogFilter {
        &mut self.filter
    }

    pub fn set_filter(&mut self, filter: LogFilter) {
        self.filter = filter;
    }

    pub fn set_search(&mut self, search: &str) {
        self.filter.search = search.to_string();
    }

    pub fn reset_all_filters(&mut self) {
        self.filter.reset_tags();
    }

    /// Every event of the selected tab.
    pub fn events(&self) -> &[FilteringEvent] {
        &self.events
    }

    /// Events of the selected tab passing the filter.
    pub fn visible_events(&self) -> Vec<&FilteringEvent> {
        self.events
            .iter()
            .filter(|event| self.filter.matches(event))
            .collect()
    }

    // ===== Selection =====

    pub fn set_selected_event_by_id(&mut self, event_id: &str) -> Option<&FilteringEvent> {
        self.selected_event_id = self
            .events
            .iter()
            .any(|event| event.event_id == event_id)
            .then(|| event_id.to_string());
        self.selected_event()
    }

    pub fn selected_event(&self) -> Option<&FilteringEvent> {
        let id = self.selected_event_id.as_deref()?;
        self.events.iter().find(|event| event.event_id == id)
    }

    pub fn remove_selected_event(&mut self) {
        self.selected_event_id = None;
    }

    /// Row click: selecting the event shown in an open wizard closes it,
    /// any other selection opens the wizard for the clicked event.
    pub fn handle_select_event(&mut self, event_id: &str, wizard_open: bool) -> ViewEffect {
        if wizard_open && self.selected_event_id.as_deref() == Some(event_id) {
            self.selected_event_id = None;
            return ViewEffect::CloseWizard;
        }

        self.set_selected_event_by_id(event_id);
        ViewEffect::OpenWizard
    }
}
