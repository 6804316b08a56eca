//! Replay of recorded events through the message bus

use std::sync::Arc;

use fl_bus::{spawn, FilteringLogPage, MemoryRuleStore, StaticTabs};
use fl_core::{classify, BrowserTab, FilteringEvent, LogConfig, TabId, BACKGROUND_TAB_ID};

use crate::{read_events, status_label};

pub struct ReplayOptions {
    pub input: String,
    pub config: Option<String>,
    pub search: Option<String>,
    pub tab: Option<i64>,
}

pub fn run_replay(opts: ReplayOptions) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(run_replay_async(opts))
}

/// One browser tab per tab id seen in the input, using the first URL seen.
fn open_tabs(events: &[FilteringEvent]) -> Vec<BrowserTab> {
    let mut tabs: Vec<BrowserTab> = Vec::new();
    for event in events {
        let Some(tab_id) = event.tab_id.filter(|&id| id != BACKGROUND_TAB_ID) else {
            continue;
        };
        if tabs.iter().any(|tab| tab.id == Some(tab_id.0)) {
            continue;
        }
        let url = event
            .frame_url
            .as_deref()
            .or(event.request_url.as_deref())
            .unwrap_or_default();
        tabs.push(BrowserTab::new(tab_id.0, &format!("Tab {}", tab_id), url));
    }
    tabs
}

async fn run_replay_async(opts: ReplayOptions) -> Result<(), String> {
    let events = read_events(&opts.input)?;

    let mut config = match &opts.config {
        Some(path) => LogConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {}", path, e))?,
        None => LogConfig::default(),
    };
    if let Some(search) = opts.search {
        config.search = search;
    }

    let tabs = open_tabs(&events);
    let selected = opts
        .tab
        .map(TabId)
        .or_else(|| tabs.first().and_then(|tab| tab.id).map(TabId))
        .unwrap_or(BACKGROUND_TAB_ID);

    let background = spawn(
        &config,
        Arc::new(MemoryRuleStore::default()),
        Arc::new(StaticTabs::new(tabs)),
    );
    let mut page = FilteringLogPage::mount(Arc::new(background.clone()), &config, Some(selected))
        .await
        .map_err(|e| format!("Failed to open the log page: {}", e))?;

    let total = events.len();
    for event in events {
        let tab_id = event.tab_id.unwrap_or(BACKGROUND_TAB_ID);
        background
            .record_event(tab_id, event)
            .map_err(|e| format!("Failed to record event: {}", e))?;
    }

    page.refresh()
        .await
        .map_err(|e| format!("Failed to load events: {}", e))?;
    let pushed = page
        .apply_notifications()
        .await
        .map_err(|e| format!("Failed to apply notifications: {}", e))?;
    log::debug!("replayed {} events, {} notifications applied", total, pushed);

    let view = page.view();
    let visible = view.visible_events();
    let title = view
        .tab(selected)
        .map(|tab| tab.title.as_str())
        .unwrap_or("unknown");
    println!(
        "Tab {} ({}): {} events, {} visible",
        selected,
        title,
        view.events().len(),
        visible.len()
    );
    for event in visible {
        println!(
            "  {:<10} {:<16} {:<12} {}",
            event.event_id,
            status_label(classify(event)),
            event.request_event_type_label(),
            event
                .request_url
                .as_deref()
                .or(event.element.as_deref())
                .unwrap_or("-")
        );
    }

    page.unmount()
        .await
        .map_err(|e| format!("Failed to close the log page: {}", e))?;
    background
        .shutdown()
        .map_err(|e| format!("Failed to stop the background: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_tabs_from_events() {
        let events = vec![
            FilteringEvent {
                event_id: "1".to_string(),
                tab_id: Some(TabId(3)),
                frame_url: Some("https://example.org/".to_string()),
                ..Default::default()
            },
            FilteringEvent {
                event_id: "2".to_string(),
                tab_id: Some(TabId(3)),
                frame_url: Some("https://other.org/".to_string()),
                ..Default::default()
            },
            FilteringEvent {
                event_id: "3".to_string(),
                tab_id: Some(BACKGROUND_TAB_ID),
                ..Default::default()
            },
        ];

        let tabs = open_tabs(&events);
        assert_eq!(tabs, vec![BrowserTab::new(3, "Tab 3", "https://example.org/")]);
    }
}
