//! WebAssembly bindings for the filtering log
//!
//! Events, options and filters cross the boundary as JSON strings in the
//! same camelCase shape the background sends over the bus.

use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

use fl_core::{
    classify,
    config::LogConfig,
    types::{FilterMetadata, FilteringEvent},
    url::extract_host,
    view::format_event,
};
use fl_rules::{
    candidate_patterns, get_rule_text, primary_actions, split_to_patterns, RuleCreationOptions,
    WizardState,
};

static FILTERS_METADATA: OnceLock<Vec<FilterMetadata>> = OnceLock::new();

fn parse<T: DeserializeOwned>(json: &str, what: &str) -> Result<T, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid {}: {}", what, e))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Failed to serialize: {}", e))
}

fn js_error(message: String) -> JsValue {
    web_sys::console::warn_1(&JsValue::from_str(&message));
    JsValue::from_str(&message)
}

fn string_array(items: &[String]) -> js_sys::Array {
    items.iter().map(|item| JsValue::from_str(item)).collect()
}

// ===== Setup =====

#[wasm_bindgen]
pub fn init(filters_metadata_json: &str) -> Result<(), JsValue> {
    if FILTERS_METADATA.get().is_some() {
        return Err(JsValue::from_str("Already initialized. Reload the page to reinitialize."));
    }
    let metadata: Vec<FilterMetadata> =
        parse(filters_metadata_json, "filters metadata").map_err(js_error)?;
    FILTERS_METADATA
        .set(metadata)
        .map_err(|_| JsValue::from_str("Failed to set filters metadata"))
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    FILTERS_METADATA.get().is_some()
}

// ===== Events =====

fn format_event_json(event_json: &str, metadata: &[FilterMetadata]) -> Result<String, String> {
    let event: FilteringEvent = parse(event_json, "event")?;
    to_json(&format_event(event, metadata))
}

/// Resolve the filter name and rule texts of an event.
#[wasm_bindgen]
pub fn format_event_js(event_json: &str) -> Result<String, JsValue> {
    let metadata = FILTERS_METADATA.get().map(Vec::as_slice).unwrap_or(&[]);
    format_event_json(event_json, metadata).map_err(js_error)
}

fn classify_json(event_json: &str) -> Result<String, String> {
    let event: FilteringEvent = parse(event_json, "event")?;
    to_json(&classify(&event))
}

/// Status of an event as a JSON string, e.g. `"blocked"`.
#[wasm_bindgen]
pub fn classify_event(event_json: &str) -> Result<String, JsValue> {
    classify_json(event_json).map_err(js_error)
}

fn visible_ids(events_json: &str, config_json: &str) -> Result<Vec<String>, String> {
    let events: Vec<FilteringEvent> = parse(events_json, "events")?;
    let config: LogConfig = parse(config_json, "log config")?;
    let filter = config.initial_filter();
    Ok(events
        .into_iter()
        .filter(|event| filter.matches(event))
        .map(|event| event.event_id)
        .collect())
}

/// Ids of the events passing the search and tag filters of a log config.
#[wasm_bindgen]
pub fn visible_event_ids(events_json: &str, config_json: &str) -> Result<js_sys::Array, JsValue> {
    let ids = visible_ids(events_json, config_json).map_err(js_error)?;
    Ok(string_array(&ids))
}

// ===== Rules =====

#[wasm_bindgen]
pub fn split_to_patterns_js(url: &str, domain: &str, is_allowlist: bool) -> js_sys::Array {
    string_array(&split_to_patterns(url, domain, is_allowlist))
}

fn patterns_json(event_json: &str, state: &str) -> Result<Vec<String>, String> {
    let event: FilteringEvent = parse(event_json, "event")?;
    let state: WizardState =
        serde_json::from_value(serde_json::Value::String(state.to_string()))
            .map_err(|e| format!("Invalid wizard state: {}", e))?;
    Ok(candidate_patterns(&event, state))
}

/// Candidate patterns for `state` (`proposing_block` or `proposing_unblock`).
#[wasm_bindgen]
pub fn candidate_patterns_js(event_json: &str, state: &str) -> Result<js_sys::Array, JsValue> {
    let patterns = patterns_json(event_json, state).map_err(js_error)?;
    Ok(string_array(&patterns))
}

fn actions_json(event_json: &str) -> Result<String, String> {
    let event: FilteringEvent = parse(event_json, "event")?;
    to_json(&primary_actions(&event, None))
}

#[wasm_bindgen]
pub fn primary_actions_js(event_json: &str) -> Result<String, JsValue> {
    actions_json(event_json).map_err(js_error)
}

fn rule_text_json(
    event_json: &str,
    pattern: &str,
    options_json: Option<String>,
) -> Result<String, String> {
    let event: FilteringEvent = parse(event_json, "event")?;
    let options = match options_json {
        Some(json) => parse(&json, "rule options")?,
        None => RuleCreationOptions::for_event(&event),
    };
    Ok(get_rule_text(Some(&event), pattern, &options))
}

/// Final rule text for a pattern. Without options the defaults for the
/// event are used.
#[wasm_bindgen]
pub fn rule_text(
    event_json: &str,
    pattern: &str,
    options_json: Option<String>,
) -> Result<String, JsValue> {
    rule_text_json(event_json, pattern, options_json).map_err(js_error)
}

#[wasm_bindgen]
pub fn extract_host_js(url: &str) -> Option<String> {
    extract_host(url).map(str::to_string)
}
