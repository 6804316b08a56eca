//! Exception and blocking rules derived from an applied rule
//!
//! Cosmetic and script exceptions are built from the text of the rule that
//! fired; cookie and advanced modifier exceptions only need the event.

use fl_core::strings::insert_at;
use fl_core::types::{FilteringEvent, RuleData};
use fl_core::url::cookie_domain;

use crate::patterns::{block_domain_rule, options, unblock_domain_rule};

/// Cosmetic rule markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CosmeticMarker {
    /// `#$?#`
    CssExtCss,
    /// `#?#`
    ElementHidingExtCss,
    /// `#$#`
    Css,
    /// `##`
    ElementHiding,
    /// `$$`
    Html,
    /// `#%#`
    Js,
}

impl CosmeticMarker {
    /// Markers tried for CSS exceptions, more specific markers first.
    pub const CSS_ORDER: [CosmeticMarker; 5] = [
        Self::CssExtCss,
        Self::ElementHidingExtCss,
        Self::Css,
        Self::ElementHiding,
        Self::Html,
    ];

    /// Markers tried for script exceptions. uBO scriptlets use `##+js(...)`.
    pub const SCRIPT_ORDER: [CosmeticMarker; 2] = [Self::Js, Self::ElementHiding];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CssExtCss => "#$?#",
            Self::ElementHidingExtCss => "#?#",
            Self::Css => "#$#",
            Self::ElementHiding => "##",
            Self::Html => "$$",
            Self::Js => "#%#",
        }
    }

    /// Exception form of the marker: `@` after its first character.
    pub fn exception(self) -> String {
        insert_at(self.as_str(), 1, "@")
    }

    /// First marker of `order` found in `rule_text`.
    pub fn detect(rule_text: &str, order: &[CosmeticMarker]) -> Option<CosmeticMarker> {
        order
            .iter()
            .copied()
            .find(|marker| rule_text.contains(marker.as_str()))
    }
}

/// Replace the marker with its exception form and drop the rule's own domains.
fn generate_exception_rule(rule_text: &str, marker: CosmeticMarker) -> String {
    let mask = marker.as_str();
    let rule_part = match rule_text.find(mask) {
        Some(pos) => &rule_text[pos + mask.len()..],
        None => "",
    };
    format!("{}{}", marker.exception(), rule_part)
}

fn create_cosmetic_exception(
    rule: Option<&RuleData>,
    event: &FilteringEvent,
    order: &[CosmeticMarker],
    kind: &str,
) -> String {
    let Some(rule_text) = rule.and_then(RuleData::rule_text) else {
        log::error!(
            "[fl.rules] cannot create {} exception rule for event {}",
            kind,
            event.event_id
        );
        return String::new();
    };

    let Some(marker) = CosmeticMarker::detect(rule_text, order) else {
        log::error!("[fl.rules] cannot create {} exception rule for rule {}", kind, rule_text);
        return String::new();
    };

    let domain = event.frame_domain.as_deref().unwrap_or_default();
    format!("{}{}", domain, generate_exception_rule(rule_text, marker))
}

/// Exception for a cosmetic (element hiding, CSS, HTML filtering) rule.
pub fn create_exception_css_rule(rule: Option<&RuleData>, event: &FilteringEvent) -> String {
    create_cosmetic_exception(rule, event, &CosmeticMarker::CSS_ORDER, "css")
}

/// Exception for a script or scriptlet rule.
pub fn create_exception_script_rule(rule: Option<&RuleData>, event: &FilteringEvent) -> String {
    create_cosmetic_exception(rule, event, &CosmeticMarker::SCRIPT_ORDER, "script")
}

/// Cookie exceptions from the narrowest (cookie name) to the broadest.
pub fn create_exception_cookie_rules(event: &FilteringEvent) -> Vec<String> {
    let domain = cookie_domain(event.frame_domain.as_deref());
    let cookie_name = event.cookie_name.as_deref().filter(|name| !name.is_empty());

    let mut patterns = Vec::with_capacity(3);
    if let Some(name) = cookie_name {
        patterns.push(unblock_domain_rule(domain, &format!("{}={}", options::COOKIE, name)));
    }

    let modifier_value = event
        .request_rule
        .as_ref()
        .and_then(|rule| rule.modifier_value.as_deref())
        .filter(|value| !value.is_empty() && Some(*value) != cookie_name);
    if let Some(value) = modifier_value {
        patterns.push(unblock_domain_rule(domain, &format!("{}={}", options::COOKIE, value)));
    }

    patterns.push(unblock_domain_rule(domain, options::COOKIE));
    patterns
}

/// Blocking cookie rules for a cookie event without request URL.
pub fn create_blocking_cookie_rules(event: &FilteringEvent) -> Vec<String> {
    let domain = cookie_domain(event.frame_domain.as_deref());

    let mut patterns = Vec::with_capacity(2);
    if let Some(name) = event.cookie_name.as_deref().filter(|name| !name.is_empty()) {
        patterns.push(block_domain_rule(domain, &format!("{}={}", options::COOKIE, name)));
    }
    patterns.push(block_domain_rule(domain, options::COOKIE));
    patterns
}

/// Value scoped exception first, generic modifier exception last.
fn create_exception_modifier_rules(event: &FilteringEvent, modifier: &str) -> Vec<String> {
    let domain = event.frame_domain.as_deref().unwrap_or_default();

    let mut patterns = Vec::with_capacity(2);
    let value = event
        .request_rule
        .as_ref()
        .and_then(|rule| rule.modifier_value.as_deref())
        .filter(|value| !value.is_empty());
    if let Some(value) = value {
        patterns.push(unblock_domain_rule(domain, &format!("{}={}", modifier, value)));
    }
    patterns.push(unblock_domain_rule(domain, modifier));
    patterns
}

pub fn create_exception_remove_param_rules(event: &FilteringEvent) -> Vec<String> {
    create_exception_modifier_rules(event, options::REMOVEPARAM)
}

pub fn create_exception_remove_header_rules(event: &FilteringEvent) -> Vec<String> {
    create_exception_modifier_rules(event, options::REMOVEHEADER)
}

pub fn create_exception_csp_rules(event: &FilteringEvent) -> Vec<String> {
    create_exception_modifier_rules(event, options::CSP)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(text: &str) -> RuleData {
        RuleData {
            applied_rule_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn event_on(frame_domain: &str) -> FilteringEvent {
        FilteringEvent {
            event_id: "1".to_string(),
            frame_domain: Some(frame_domain.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_css_exceptions() {
        let event = event_on("example.org");
        let cases = [
            (
                "example.org#$#body { background-color: #333!important; }",
                "example.org#@$#body { background-color: #333!important; }",
            ),
            ("example.org###adblock", "example.org#@##adblock"),
            (
                "example.org#?#.banner:matches-css(width: 360px)",
                "example.org#@?#.banner:matches-css(width: 360px)",
            ),
            (
                "example.org#$?#h3:contains(cookies) { display: none!important; }",
                "example.org#@$?#h3:contains(cookies) { display: none!important; }",
            ),
            (
                "example.org$$script[data-src=\"banner\"]",
                "example.org$@$script[data-src=\"banner\"]",
            ),
        ];

        for (rule_text, expected) in cases {
            assert_eq!(create_exception_css_rule(Some(&rule(rule_text)), &event), expected);
        }
    }

    #[test]
    fn test_css_exception_uses_frame_domain() {
        let event = event_on("news.example.org");
        assert_eq!(
            create_exception_css_rule(Some(&rule("example.org,example.com##.ad")), &event),
            "news.example.org#@#.ad"
        );
    }

    #[test]
    fn test_css_exception_failures() {
        let event = event_on("example.org");
        assert_eq!(create_exception_css_rule(None, &event), "");
        assert_eq!(create_exception_css_rule(Some(&RuleData::default()), &event), "");
        assert_eq!(create_exception_css_rule(Some(&rule("||example.org^")), &event), "");
    }

    #[test]
    fn test_script_exceptions() {
        let event = event_on("example.org");
        assert_eq!(
            create_exception_script_rule(Some(&rule("example.org#%#window.__gaq = undefined;")), &event),
            "example.org#@%#window.__gaq = undefined;"
        );
        assert_eq!(
            create_exception_script_rule(Some(&rule("example.org##+js(nobab)")), &event),
            "example.org#@#+js(nobab)"
        );
        assert_eq!(create_exception_script_rule(Some(&rule("||a.org^$script")), &event), "");
    }

    #[test]
    fn test_cookie_exceptions() {
        let event = FilteringEvent {
            cookie_name: Some("testName".to_string()),
            request_rule: Some(RuleData {
                modifier_value: Some("/test|name/".to_string()),
                ..Default::default()
            }),
            ..event_on("example.org")
        };

        assert_eq!(
            create_exception_cookie_rules(&event),
            vec![
                "@@||example.org^$cookie=testName",
                "@@||example.org^$cookie=/test|name/",
                "@@||example.org^$cookie",
            ]
        );
    }

    #[test]
    fn test_cookie_exceptions_skip_same_modifier() {
        let event = FilteringEvent {
            cookie_name: Some("sid".to_string()),
            request_rule: Some(RuleData {
                modifier_value: Some("sid".to_string()),
                ..Default::default()
            }),
            ..event_on(".example.org")
        };

        assert_eq!(
            create_exception_cookie_rules(&event),
            vec!["@@||example.org^$cookie=sid", "@@||example.org^$cookie"]
        );
    }

    #[test]
    fn test_blocking_cookie_rules() {
        let event = FilteringEvent {
            cookie_name: Some("_ga".to_string()),
            ..event_on(".example.org")
        };
        assert_eq!(
            create_blocking_cookie_rules(&event),
            vec!["||example.org^$cookie=_ga", "||example.org^$cookie"]
        );
    }

    #[test]
    fn test_modifier_exceptions() {
        let mut event = FilteringEvent {
            request_rule: Some(RuleData {
                modifier_value: Some("utm_source".to_string()),
                ..Default::default()
            }),
            ..event_on("example.org")
        };
        assert_eq!(
            create_exception_remove_param_rules(&event),
            vec![
                "@@||example.org^$removeparam=utm_source",
                "@@||example.org^$removeparam",
            ]
        );

        event.request_rule = None;
        assert_eq!(create_exception_remove_header_rules(&event), vec!["@@||example.org^$removeheader"]);
        assert_eq!(create_exception_csp_rules(&event), vec!["@@||example.org^$csp"]);
    }
}
