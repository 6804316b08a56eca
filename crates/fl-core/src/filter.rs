//! Search and tag filtering of logged events
//!
//! An event is shown when it passes every stage: free text search, request
//! type tags, miscellaneous status tags and party tags. A tag group with all
//! of its tags enabled does not filter anything.

use serde::{Deserialize, Serialize};

use crate::status::{classify, StatusMode};
use crate::strings::contains_ignore_case;
use crate::types::{FilteringEvent, RequestType, USER_FILTER_ID};

/// Stealth events also match this phrase when searched for.
const STEALTH_SEARCH_PHRASE: &str = "stealth mode";

// =============================================================================
// Tags
// =============================================================================

/// Request type tag shown in the log toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTypeTag {
    Html,
    Css,
    JavaScript,
    Xhr,
    Image,
    Media,
    Other,
}

impl EventTypeTag {
    pub const ALL: [EventTypeTag; 7] = [
        Self::Html,
        Self::Css,
        Self::JavaScript,
        Self::Xhr,
        Self::Image,
        Self::Media,
        Self::Other,
    ];

    /// Request types grouped under this tag.
    pub fn types(self) -> &'static [RequestType] {
        match self {
            Self::Html => &[RequestType::Document, RequestType::Subdocument],
            Self::Css => &[RequestType::Stylesheet],
            Self::JavaScript => &[RequestType::Script],
            Self::Xhr => &[RequestType::XmlHttpRequest],
            Self::Image => &[RequestType::Image],
            Self::Media => &[RequestType::Object, RequestType::Media],
            Self::Other => &[
                RequestType::Other,
                RequestType::Font,
                RequestType::Websocket,
                RequestType::Csp,
                RequestType::PermissionsPolicy,
                RequestType::Cookie,
                RequestType::Ping,
                RequestType::WebRtc,
                RequestType::CspReport,
            ],
        }
    }

    /// Tag a request type belongs to.
    pub fn for_type(request_type: RequestType) -> EventTypeTag {
        Self::ALL
            .into_iter()
            .find(|tag| tag.types().contains(&request_type))
            .unwrap_or(Self::Other)
    }
}

/// Miscellaneous status tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiscTag {
    Regular,
    Allowlisted,
    Blocked,
    Modified,
    UserFilter,
}

impl MiscTag {
    pub const ALL: [MiscTag; 5] = [
        Self::Regular,
        Self::Allowlisted,
        Self::Blocked,
        Self::Modified,
        Self::UserFilter,
    ];
}

/// First-party / third-party tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    FirstParty,
    ThirdParty,
}

impl SourceTag {
    pub const ALL: [SourceTag; 2] = [Self::FirstParty, Self::ThirdParty];
}

/// Ordered group of toggleable tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagGroup<T> {
    tags: Vec<(T, bool)>,
}

impl<T: Copy + PartialEq> TagGroup<T> {
    /// Group with every tag enabled.
    pub fn all_enabled(tags: &[T]) -> Self {
        Self {
            tags: tags.iter().map(|&tag| (tag, true)).collect(),
        }
    }

    pub fn set_enabled(&mut self, tag: T, enabled: bool) {
        if let Some(entry) = self.tags.iter_mut().find(|(t, _)| *t == tag) {
            entry.1 = enabled;
        }
    }

    /// Enable only `tag`, disabling the rest of the group.
    pub fn select_only(&mut self, tag: T) {
        for entry in &mut self.tags {
            entry.1 = entry.0 == tag;
        }
    }

    pub fn enable_all(&mut self) {
        for entry in &mut self.tags {
            entry.1 = true;
        }
    }

    pub fn is_enabled(&self, tag: T) -> bool {
        self.tags.iter().any(|&(t, enabled)| t == tag && enabled)
    }

    /// A fully enabled group passes every event.
    pub fn is_vacuous(&self) -> bool {
        self.tags.iter().all(|&(_, enabled)| enabled)
    }

    /// True when the group is vacuous or one of `matching` tags is enabled.
    pub fn passes(&self, matching: &[T]) -> bool {
        self.is_vacuous() || matching.iter().any(|&tag| self.is_enabled(tag))
    }

    pub fn iter(&self) -> impl Iterator<Item = (T, bool)> + '_ {
        self.tags.iter().copied()
    }
}

// =============================================================================
// Event predicates
// =============================================================================

/// Effective request type used for tag filtering.
pub fn effective_request_type(event: &FilteringEvent) -> Option<RequestType> {
    if event.is_modifying_cookie_rule {
        return Some(RequestType::Cookie);
    }
    if event.csp_report_blocked {
        return Some(RequestType::CspReport);
    }
    event.request_type
}

/// True when the event comes from the user's own rules.
pub fn is_user_filter(event: &FilteringEvent) -> bool {
    if event
        .request_rule
        .as_ref()
        .is_some_and(|rule| rule.filter_id == USER_FILTER_ID)
    {
        return true;
    }

    // A declarative rule is assumed to come from a single filter, the first
    // source rule identifies it.
    event
        .declarative_rule_info
        .as_ref()
        .and_then(|info| info.source_rules.first())
        .is_some_and(|rule| rule.filter_id == USER_FILTER_ID)
}

/// Free text search over the searchable fields of an event.
pub fn matches_search(event: &FilteringEvent, search: &str) -> bool {
    let search = search.trim();
    if search.is_empty() {
        return true;
    }

    let fields = [
        event.request_url.as_deref(),
        event.element.as_deref(),
        event.cookie_name.as_deref(),
        event.cookie_value.as_deref(),
        event.applied_rule_text.as_deref(),
        event.filter_name.as_deref(),
    ];

    if fields
        .iter()
        .flatten()
        .any(|field| contains_ignore_case(field, search))
    {
        return true;
    }

    event.is_stealth_event() && contains_ignore_case(STEALTH_SEARCH_PHRASE, search)
}

/// Miscellaneous tags an event carries.
pub fn misc_tags(event: &FilteringEvent) -> Vec<MiscTag> {
    let status = classify(event);

    let mut tags = Vec::with_capacity(2);
    tags.push(match status {
        StatusMode::Allowed | StatusMode::AllowedStealth => MiscTag::Allowlisted,
        StatusMode::Blocked => MiscTag::Blocked,
        StatusMode::Modified => MiscTag::Modified,
        StatusMode::Regular => MiscTag::Regular,
    });
    if is_user_filter(event) {
        tags.push(MiscTag::UserFilter);
    }
    tags
}

// =============================================================================
// Log Filter
// =============================================================================

/// Complete filter state of a log view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub search: String,
    pub event_types: TagGroup<EventTypeTag>,
    pub misc: TagGroup<MiscTag>,
    pub sources: TagGroup<SourceTag>,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            search: String::new(),
            event_types: TagGroup::all_enabled(&EventTypeTag::ALL),
            misc: TagGroup::all_enabled(&MiscTag::ALL),
            sources: TagGroup::all_enabled(&SourceTag::ALL),
        }
    }
}

impl LogFilter {
    /// Re-enable every tag; the search text is kept.
    pub fn reset_tags(&mut self) {
        self.event_types.enable_all();
        self.misc.enable_all();
        self.sources.enable_all();
    }

    /// Check whether an event passes every filter stage.
    pub fn matches(&self, event: &FilteringEvent) -> bool {
        if !matches_search(event, &self.search) {
            return false;
        }

        if !self.event_types.is_vacuous() {
            let passes = effective_request_type(event)
                .map(|request_type| self.event_types.passes(&[EventTypeTag::for_type(request_type)]))
                .unwrap_or(false);
            if !passes {
                return false;
            }
        }

        if !self.misc.passes(&misc_tags(event)) {
            return false;
        }

        let source = if event.request_third_party {
            SourceTag::ThirdParty
        } else {
            SourceTag::FirstParty
        };
        self.sources.passes(&[source])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeclarativeRuleInfo, RuleData, SourceRule};

    fn blocked_script() -> FilteringEvent {
        FilteringEvent {
            event_id: "1".to_string(),
            request_url: Some("https://ads.example.org/banner.js".to_string()),
            request_type: Some(RequestType::Script),
            request_third_party: true,
            request_rule: Some(RuleData {
                filter_id: 2,
                applied_rule_text: Some("||ads.example.org^".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_search_fields() {
        let mut event = blocked_script();
        assert!(matches_search(&event, "BANNER"));
        assert!(!matches_search(&event, "cookie"));

        event.cookie_name = Some("tracking_cookie".to_string());
        assert!(matches_search(&event, "cookie"));
    }

    #[test]
    fn test_search_stealth_phrase() {
        let mut event = blocked_script();
        assert!(!matches_search(&event, "stealth"));

        event.stealth_actions = Some(1);
        assert!(matches_search(&event, "stealth"));
        assert!(matches_search(&event, "Stealth Mode"));
    }

    #[test]
    fn test_effective_request_type() {
        let mut event = blocked_script();
        event.csp_report_blocked = true;
        assert_eq!(effective_request_type(&event), Some(RequestType::CspReport));

        event.is_modifying_cookie_rule = true;
        assert_eq!(effective_request_type(&event), Some(RequestType::Cookie));
    }

    #[test]
    fn test_type_group() {
        let mut filter = LogFilter::default();
        filter.event_types.select_only(EventTypeTag::Css);
        assert!(!filter.matches(&blocked_script()));

        filter.event_types.set_enabled(EventTypeTag::JavaScript, true);
        assert!(filter.matches(&blocked_script()));

        let mut cookie = blocked_script();
        cookie.is_modifying_cookie_rule = true;
        assert!(!filter.matches(&cookie));
        filter.event_types.set_enabled(EventTypeTag::Other, true);
        assert!(filter.matches(&cookie));
    }

    #[test]
    fn test_misc_group_vacuous_pass() {
        let filter = LogFilter::default();
        assert!(filter.misc.is_vacuous());
        assert!(filter.matches(&blocked_script()));
        assert!(filter.matches(&FilteringEvent::default()));
    }

    #[test]
    fn test_misc_group() {
        let mut filter = LogFilter::default();
        filter.misc.select_only(MiscTag::Allowlisted);
        assert!(!filter.matches(&blocked_script()));

        filter.misc.set_enabled(MiscTag::Blocked, true);
        assert!(filter.matches(&blocked_script()));
    }

    #[test]
    fn test_user_filter_tag() {
        let mut filter = LogFilter::default();
        filter.misc.select_only(MiscTag::UserFilter);

        let mut event = blocked_script();
        assert!(!filter.matches(&event));

        event.request_rule.as_mut().unwrap().filter_id = USER_FILTER_ID;
        assert!(filter.matches(&event));

        let declarative = FilteringEvent {
            declarative_rule_info: Some(DeclarativeRuleInfo {
                source_rules: vec![
                    SourceRule { source_rule: "||a.org^".to_string(), filter_id: 0 },
                    SourceRule { source_rule: "||a.org^".to_string(), filter_id: 3 },
                ],
                declarative_rule_json: r#"{"action":{"type":"block"}}"#.to_string(),
            }),
            ..Default::default()
        };
        assert!(filter.matches(&declarative));
    }

    #[test]
    fn test_source_group() {
        let mut filter = LogFilter::default();
        filter.sources.select_only(SourceTag::FirstParty);
        assert!(!filter.matches(&blocked_script()));

        filter.reset_tags();
        assert!(filter.matches(&blocked_script()));
    }
}
