//! Background-owned filtering log
//!
//! The background process is the only writer of this log. Every mutation
//! returns the notification it produced so the caller can push it to the
//! subscribed listeners; the log itself knows nothing about the bus.

use std::collections::BTreeMap;

use crate::config::LogConfig;
use crate::types::{
    BrowserTab, EventUpdate, FilteringEvent, Notification, TabFilteringInfo, TabId, TabInfo,
    BACKGROUND_TAB_ID,
};
use crate::url::{extract_host, is_extension_url};

/// Title of the pseudo-tab collecting background requests.
pub const BACKGROUND_TAB_TITLE: &str = "Background";

/// Per-tab event log.
#[derive(Debug, Clone)]
pub struct FilteringLog {
    tabs: BTreeMap<TabId, TabFilteringInfo>,
    preserve_log: bool,
    open_pages: usize,
    max_events_per_tab: Option<usize>,
}

impl Default for FilteringLog {
    fn default() -> Self {
        Self::new(&LogConfig::default())
    }
}

impl FilteringLog {
    pub fn new(config: &LogConfig) -> Self {
        let mut tabs = BTreeMap::new();
        tabs.insert(
            BACKGROUND_TAB_ID,
            TabFilteringInfo {
                info: TabInfo {
                    tab_id: BACKGROUND_TAB_ID,
                    title: BACKGROUND_TAB_TITLE.to_string(),
                    domain: None,
                    is_extension_tab: false,
                },
                filtering_events: Vec::new(),
            },
        );

        Self {
            tabs,
            preserve_log: config.preserve_log,
            open_pages: 0,
            max_events_per_tab: config.max_events_per_tab,
        }
    }

    // ===== Log pages =====

    /// True while at least one log page is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open_pages > 0
    }

    pub fn on_open_page(&mut self) {
        self.open_pages += 1;
        log::debug!("[fl.log] log page opened, {} open", self.open_pages);
    }

    /// Closing the last page drops every recorded event.
    pub fn on_close_page(&mut self) {
        self.open_pages = self.open_pages.saturating_sub(1);
        if self.open_pages == 0 {
            for tab in self.tabs.values_mut() {
                tab.filtering_events.clear();
            }
            log::debug!("[fl.log] last log page closed, events cleared");
        }
    }

    #[inline]
    pub fn preserve_log(&self) -> bool {
        self.preserve_log
    }

    pub fn set_preserve_log(&mut self, enabled: bool) {
        self.preserve_log = enabled;
    }

    // ===== Tabs =====

    /// Start tracking a tab. The background tab and synthetic tabs are ignored.
    pub fn create_tab(&mut self, tab: &BrowserTab, synthetic: bool) -> Option<Notification> {
        let (tab_id, title, url) = tab_parts(tab)?;
        if tab_id == BACKGROUND_TAB_ID || synthetic {
            return None;
        }

        let info = tab_info(tab_id, title, url);
        self.tabs.insert(
            tab_id,
            TabFilteringInfo {
                info: info.clone(),
                filtering_events: Vec::new(),
            },
        );
        Some(Notification::TabAdded(info))
    }

    /// Refresh title and origin of a tab, creating it when unknown.
    pub fn update_tab(&mut self, tab: &BrowserTab) -> Option<Notification> {
        let (tab_id, title, url) = tab_parts(tab)?;
        if tab_id == BACKGROUND_TAB_ID {
            return None;
        }

        let Some(entry) = self.tabs.get_mut(&tab_id) else {
            return self.create_tab(tab, false);
        };

        entry.info = tab_info(tab_id, title, url);
        Some(Notification::TabUpdate(entry.info.clone()))
    }

    pub fn remove_tab(&mut self, tab_id: TabId) -> Option<Notification> {
        if tab_id == BACKGROUND_TAB_ID {
            return None;
        }
        self.tabs
            .remove(&tab_id)
            .map(|entry| Notification::TabClose(entry.info))
    }

    /// Reconcile the tracked tabs with the tabs currently open in the browser.
    pub fn synchronize_open_tabs(&mut self, open_tabs: &[BrowserTab]) -> Vec<Notification> {
        let mut stale: Vec<TabId> = self.tabs.keys().copied().collect();
        let mut notifications = Vec::new();

        for tab in open_tabs {
            let Some(id) = tab.id else { continue };
            let tab_id = TabId(id);

            let notification = if self.tabs.contains_key(&tab_id) {
                self.update_tab(tab)
            } else {
                self.create_tab(tab, false)
            };
            notifications.extend(notification);
            stale.retain(|&known| known != tab_id);
        }

        for tab_id in stale {
            notifications.extend(self.remove_tab(tab_id));
        }

        notifications
    }

    /// Tab navigation: drop the events of a tab unless the log is preserved.
    pub fn reset_tab(&mut self, tab_id: TabId) -> Option<Notification> {
        self.clear_events(tab_id, false)
    }

    /// Clear the events of a tab. With `ignore_preserve_log` the events are
    /// dropped even while preserve-log is enabled.
    pub fn clear_events(&mut self, tab_id: TabId, ignore_preserve_log: bool) -> Option<Notification> {
        let preserve = !ignore_preserve_log && self.preserve_log;
        if preserve {
            return None;
        }

        let Some(entry) = self.tabs.get_mut(&tab_id) else {
            log::warn!("[fl.log] clear events of unknown tab {}", tab_id);
            return None;
        };
        entry.filtering_events.clear();
        Some(Notification::TabReset(entry.info.clone()))
    }

    // ===== Events =====

    /// Append an event to the log of a tab.
    ///
    /// Nothing is recorded while no log page is open or when the tab is not
    /// tracked. Cookie events already present for the tab are skipped.
    pub fn record_event(&mut self, tab_id: TabId, mut event: FilteringEvent) -> Option<Notification> {
        if !self.is_open() {
            return None;
        }
        let Some(entry) = self.tabs.get_mut(&tab_id) else {
            log::debug!("[fl.log] event {} for untracked tab {}", event.event_id, tab_id);
            return None;
        };

        if event.cookie_name.is_some()
            && entry
                .filtering_events
                .iter()
                .any(|known| is_same_cookie(known, &event))
        {
            return None;
        }

        event.tab_id = Some(tab_id);
        entry.filtering_events.push(event.clone());

        if let Some(max) = self.max_events_per_tab {
            // The first event is the main frame request and is always kept.
            while entry.filtering_events.len() > max.max(1) {
                entry.filtering_events.remove(1);
            }
        }

        Some(Notification::LogEventAdded {
            tab: entry.info.clone(),
            event: Box::new(event),
        })
    }

    /// Merge late data into a recorded event.
    pub fn update_event(
        &mut self,
        tab_id: TabId,
        event_id: &str,
        update: EventUpdate,
    ) -> Option<Notification> {
        if !self.is_open() {
            return None;
        }
        let entry = self.tabs.get_mut(&tab_id)?;
        let event = entry
            .filtering_events
            .iter_mut()
            .find(|event| event.event_id == event_id)?;

        event.merge(update);
        Some(Notification::LogEventAdded {
            tab: entry.info.clone(),
            event: Box::new(event.clone()),
        })
    }

    pub fn events_for_tab(&self, tab_id: TabId) -> &[FilteringEvent] {
        self.tabs
            .get(&tab_id)
            .map(|entry| entry.filtering_events.as_slice())
            .unwrap_or(&[])
    }

    pub fn filtering_info(&self, tab_id: TabId) -> Option<&TabFilteringInfo> {
        self.tabs.get(&tab_id)
    }

    /// Every tracked tab with its events.
    pub fn tabs(&self) -> Vec<TabFilteringInfo> {
        self.tabs.values().cloned().collect()
    }
}

fn tab_parts(tab: &BrowserTab) -> Option<(TabId, &str, &str)> {
    match (tab.id, tab.title.as_deref(), tab.url.as_deref()) {
        (Some(id), Some(title), Some(url)) if !title.is_empty() && !url.is_empty() => {
            Some((TabId(id), title, url))
        }
        _ => None,
    }
}

fn tab_info(tab_id: TabId, title: &str, url: &str) -> TabInfo {
    TabInfo {
        tab_id,
        title: title.to_string(),
        domain: extract_host(url).map(str::to_string),
        is_extension_tab: is_extension_url(url),
    }
}

fn is_same_cookie(a: &FilteringEvent, b: &FilteringEvent) -> bool {
    a.frame_domain == b.frame_domain && a.cookie_name == b.cookie_name && a.cookie_value == b.cookie_value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;

    fn event(id: &str) -> FilteringEvent {
        FilteringEvent {
            event_id: id.to_string(),
            request_url: Some(format!("https://example.org/{}", id)),
            ..Default::default()
        }
    }

    fn open_log() -> FilteringLog {
        let mut log = FilteringLog::default();
        log.on_open_page();
        log.create_tab(&BrowserTab::new(1, "Example", "https://www.example.org/"), false);
        log
    }

    #[test]
    fn test_background_tab_always_present() {
        let mut log = FilteringLog::default();
        assert!(log.filtering_info(BACKGROUND_TAB_ID).is_some());
        assert!(log.remove_tab(BACKGROUND_TAB_ID).is_none());
        assert!(log
            .update_tab(&BrowserTab::new(-1, "Renamed", "https://example.org"))
            .is_none());
        assert_eq!(log.filtering_info(BACKGROUND_TAB_ID).unwrap().info.title, "Background");
    }

    #[test]
    fn test_create_tab() {
        let mut log = FilteringLog::default();
        let added = log
            .create_tab(&BrowserTab::new(5, "Page", "https://news.example.org/a"), false)
            .unwrap();
        assert_eq!(added.kind(), EventKind::TabAdded);
        let info = &log.filtering_info(TabId(5)).unwrap().info;
        assert_eq!(info.domain.as_deref(), Some("news.example.org"));

        assert!(log
            .create_tab(&BrowserTab::new(6, "New tab", "https://example.org"), true)
            .is_none());
        assert!(log.create_tab(&BrowserTab { id: Some(7), ..Default::default() }, false).is_none());
    }

    #[test]
    fn test_update_unknown_tab_creates_it() {
        let mut log = FilteringLog::default();
        let notification = log
            .update_tab(&BrowserTab::new(3, "Ext", "chrome-extension://abc/page.html"))
            .unwrap();
        assert_eq!(notification.kind(), EventKind::TabAdded);
        assert!(log.filtering_info(TabId(3)).unwrap().info.is_extension_tab);

        let notification = log
            .update_tab(&BrowserTab::new(3, "Site", "https://example.org"))
            .unwrap();
        assert_eq!(notification.kind(), EventKind::TabUpdate);
        assert!(!log.filtering_info(TabId(3)).unwrap().info.is_extension_tab);
    }

    #[test]
    fn test_events_recorded_only_while_open() {
        let mut log = FilteringLog::default();
        log.create_tab(&BrowserTab::new(1, "Example", "https://example.org"), false);
        assert!(log.record_event(TabId(1), event("a")).is_none());

        log.on_open_page();
        let notification = log.record_event(TabId(1), event("b")).unwrap();
        assert_eq!(notification.kind(), EventKind::LogEventAdded);
        assert_eq!(log.events_for_tab(TabId(1)).len(), 1);
        assert_eq!(log.events_for_tab(TabId(1))[0].tab_id, Some(TabId(1)));

        assert!(log.record_event(TabId(42), event("c")).is_none());
    }

    #[test]
    fn test_last_page_close_clears_events() {
        let mut log = open_log();
        log.on_open_page();
        log.record_event(TabId(1), event("a"));

        log.on_close_page();
        assert_eq!(log.events_for_tab(TabId(1)).len(), 1);

        log.on_close_page();
        assert!(!log.is_open());
        assert!(log.events_for_tab(TabId(1)).is_empty());

        log.on_close_page();
        assert!(!log.is_open());
    }

    #[test]
    fn test_reset_respects_preserve_log() {
        let mut log = open_log();
        log.record_event(TabId(1), event("a"));

        log.set_preserve_log(true);
        assert!(log.reset_tab(TabId(1)).is_none());
        assert_eq!(log.events_for_tab(TabId(1)).len(), 1);

        let reset = log.clear_events(TabId(1), true).unwrap();
        assert_eq!(reset.kind(), EventKind::TabReset);
        assert!(log.events_for_tab(TabId(1)).is_empty());

        log.set_preserve_log(false);
        log.record_event(TabId(1), event("b"));
        assert!(log.reset_tab(TabId(1)).is_some());
        assert!(log.events_for_tab(TabId(1)).is_empty());
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut log = open_log();
        for i in 0..1500 {
            log.record_event(TabId(1), event(&i.to_string()));
        }
        assert_eq!(log.events_for_tab(TabId(1)).len(), 1500);
    }

    #[test]
    fn test_cap_keeps_first_event() {
        let config = LogConfig {
            max_events_per_tab: Some(3),
            ..Default::default()
        };
        let mut log = FilteringLog::new(&config);
        log.on_open_page();
        log.create_tab(&BrowserTab::new(1, "Example", "https://example.org"), false);
        for id in ["main", "a", "b", "c", "d"] {
            log.record_event(TabId(1), event(id));
        }

        let ids: Vec<_> = log
            .events_for_tab(TabId(1))
            .iter()
            .map(|e| e.event_id.as_str())
            .collect();
        assert_eq!(ids, vec!["main", "c", "d"]);
    }

    #[test]
    fn test_cookie_dedup() {
        let mut log = open_log();
        let cookie = FilteringEvent {
            frame_domain: Some("example.org".to_string()),
            cookie_name: Some("_ga".to_string()),
            cookie_value: Some("1".to_string()),
            ..event("cookie-1")
        };
        assert!(log.record_event(TabId(1), cookie.clone()).is_some());
        assert!(log
            .record_event(TabId(1), FilteringEvent { event_id: "cookie-2".to_string(), ..cookie.clone() })
            .is_none());

        let other_value = FilteringEvent {
            event_id: "cookie-3".to_string(),
            cookie_value: Some("2".to_string()),
            ..cookie
        };
        assert!(log.record_event(TabId(1), other_value).is_some());
        assert_eq!(log.events_for_tab(TabId(1)).len(), 2);
    }

    #[test]
    fn test_update_event() {
        let mut log = open_log();
        log.record_event(TabId(1), event("a"));

        let update = EventUpdate {
            status_code: Some(204),
            ..Default::default()
        };
        let notification = log.update_event(TabId(1), "a", update.clone()).unwrap();
        match notification {
            Notification::LogEventAdded { event, .. } => assert_eq!(event.status_code, Some(204)),
            other => panic!("unexpected notification {:?}", other),
        }
        assert!(log.update_event(TabId(1), "missing", update).is_none());
    }

    #[test]
    fn test_synchronize_open_tabs() {
        let mut log = FilteringLog::default();
        log.create_tab(&BrowserTab::new(1, "Old", "https://old.example.org"), false);
        log.create_tab(&BrowserTab::new(2, "Kept", "https://kept.example.org"), false);

        let notifications = log.synchronize_open_tabs(&[
            BrowserTab::new(2, "Kept again", "https://kept.example.org"),
            BrowserTab::new(3, "New", "https://new.example.org"),
        ]);

        let kinds: Vec<_> = notifications.iter().map(Notification::kind).collect();
        assert_eq!(kinds, vec![EventKind::TabUpdate, EventKind::TabAdded, EventKind::TabClose]);

        let ids: Vec<_> = log.tabs().iter().map(|tab| tab.info.tab_id).collect();
        assert_eq!(ids, vec![BACKGROUND_TAB_ID, TabId(2), TabId(3)]);
    }
}
