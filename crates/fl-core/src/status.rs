//! Event status classification
//!
//! Maps a filtering event to exactly one status shown in the log. The order
//! of the checks below is significant and must not be rearranged: later
//! signals only refine the status when no earlier signal decided it.

use serde::{Deserialize, Serialize};

use crate::types::{DeclarativeAction, DeclarativeRuleInfo, FilteringEvent};

/// Marker of the redirect modifier inside a rule text.
const REDIRECT_MARKERS: &[&str] = &["$redirect", ",redirect"];

/// Status category of a filtering event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMode {
    Regular,
    Modified,
    Blocked,
    Allowed,
    AllowedStealth,
}

impl StatusMode {
    /// Allowed and stealth-allowed both count as allowlisted.
    #[inline]
    pub fn is_allowlisted(self) -> bool {
        matches!(self, Self::Allowed | Self::AllowedStealth)
    }
}

/// Classify a filtering event.
pub fn classify(event: &FilteringEvent) -> StatusMode {
    if let Some(info) = &event.declarative_rule_info {
        return classify_declarative(info);
    }

    if event.csp_report_blocked {
        return StatusMode::Blocked;
    }

    let mut mode = StatusMode::Regular;

    if event.replace_rules.is_some() {
        mode = StatusMode::Modified;
    }

    if event.stealth_allowlist_rules.is_some() {
        mode = StatusMode::AllowedStealth;
    }

    if let (Some(rule), None) = (&event.request_rule, &event.replace_rules) {
        mode = if rule.allowlist_rule {
            StatusMode::Allowed
        } else if rule.css_rule || rule.script_rule || event.remove_param || event.remove_header {
            StatusMode::Modified
        } else if rule.cookie_rule {
            if event.is_modifying_cookie_rule {
                StatusMode::Modified
            } else {
                StatusMode::Blocked
            }
        } else if rule.csp_rule || rule.permissions_rule {
            StatusMode::Modified
        } else {
            StatusMode::Blocked
        };
    }

    mode
}

/// Classify a decision reported as a declarative rule.
pub fn classify_declarative(info: &DeclarativeRuleInfo) -> StatusMode {
    match info.action() {
        DeclarativeAction::Block => StatusMode::Blocked,
        DeclarativeAction::Redirect => {
            // $redirect rules are shown as blocked for compatibility with
            // the live engine, which reports them that way.
            if has_redirect_source(info) {
                StatusMode::Blocked
            } else {
                StatusMode::Modified
            }
        }
        DeclarativeAction::ModifyHeaders => StatusMode::Modified,
        DeclarativeAction::AllowAllRequests
        | DeclarativeAction::UpgradeScheme
        | DeclarativeAction::Allow => StatusMode::Allowed,
        DeclarativeAction::Unknown => StatusMode::Regular,
    }
}

fn has_redirect_source(info: &DeclarativeRuleInfo) -> bool {
    info.source_rules.iter().any(|rule| {
        REDIRECT_MARKERS
            .iter()
            .any(|marker| rule.source_rule.contains(marker))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RuleData, SourceRule};

    fn rule() -> RuleData {
        RuleData {
            filter_id: 2,
            applied_rule_text: Some("||example.org^".to_string()),
            ..Default::default()
        }
    }

    fn declarative(action: &str, source: &str) -> FilteringEvent {
        FilteringEvent {
            declarative_rule_info: Some(DeclarativeRuleInfo {
                source_rules: vec![SourceRule {
                    source_rule: source.to_string(),
                    filter_id: 2,
                }],
                declarative_rule_json: format!(r#"{{"action":{{"type":"{}"}}}}"#, action),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_regular_without_rules() {
        assert_eq!(classify(&FilteringEvent::default()), StatusMode::Regular);
    }

    #[test]
    fn test_plain_rule_blocks() {
        let event = FilteringEvent {
            request_rule: Some(rule()),
            ..Default::default()
        };
        assert_eq!(classify(&event), StatusMode::Blocked);
    }

    #[test]
    fn test_allowlist_rule() {
        let event = FilteringEvent {
            request_rule: Some(RuleData {
                allowlist_rule: true,
                css_rule: true,
                ..rule()
            }),
            ..Default::default()
        };
        assert_eq!(classify(&event), StatusMode::Allowed);
    }

    #[test]
    fn test_modifying_flags() {
        let css = FilteringEvent {
            request_rule: Some(RuleData { css_rule: true, ..rule() }),
            ..Default::default()
        };
        assert_eq!(classify(&css), StatusMode::Modified);

        let removeparam = FilteringEvent {
            request_rule: Some(rule()),
            remove_param: true,
            ..Default::default()
        };
        assert_eq!(classify(&removeparam), StatusMode::Modified);

        let csp = FilteringEvent {
            request_rule: Some(RuleData { csp_rule: true, ..rule() }),
            ..Default::default()
        };
        assert_eq!(classify(&csp), StatusMode::Modified);
    }

    #[test]
    fn test_cookie_rules() {
        let mut event = FilteringEvent {
            request_rule: Some(RuleData { cookie_rule: true, ..rule() }),
            ..Default::default()
        };
        assert_eq!(classify(&event), StatusMode::Blocked);

        event.is_modifying_cookie_rule = true;
        assert_eq!(classify(&event), StatusMode::Modified);
    }

    #[test]
    fn test_stealth_allowlist_wins_over_replace() {
        let event = FilteringEvent {
            replace_rules: Some(vec![rule()]),
            stealth_allowlist_rules: Some(vec![rule()]),
            ..Default::default()
        };
        assert_eq!(classify(&event), StatusMode::AllowedStealth);
    }

    #[test]
    fn test_request_rule_ignored_with_replace_rules() {
        let event = FilteringEvent {
            request_rule: Some(RuleData { allowlist_rule: true, ..rule() }),
            replace_rules: Some(vec![rule()]),
            ..Default::default()
        };
        assert_eq!(classify(&event), StatusMode::Modified);
    }

    #[test]
    fn test_request_rule_overrides_stealth_allowlist() {
        let event = FilteringEvent {
            request_rule: Some(rule()),
            stealth_allowlist_rules: Some(vec![rule()]),
            ..Default::default()
        };
        assert_eq!(classify(&event), StatusMode::Blocked);
    }

    #[test]
    fn test_csp_report_blocked_short_circuits() {
        let event = FilteringEvent {
            csp_report_blocked: true,
            request_rule: Some(RuleData { allowlist_rule: true, ..rule() }),
            ..Default::default()
        };
        assert_eq!(classify(&event), StatusMode::Blocked);
    }

    #[test]
    fn test_declarative_takes_precedence() {
        let mut event = declarative("allow", "@@||example.org^");
        event.csp_report_blocked = true;
        event.request_rule = Some(rule());
        assert_eq!(classify(&event), StatusMode::Allowed);
    }

    #[test]
    fn test_declarative_actions() {
        assert_eq!(classify(&declarative("block", "||a.org^")), StatusMode::Blocked);
        assert_eq!(classify(&declarative("modifyHeaders", "||a.org^$removeheader=x")), StatusMode::Modified);
        assert_eq!(classify(&declarative("upgradeScheme", "||a.org^")), StatusMode::Allowed);
        assert_eq!(classify(&declarative("allowAllRequests", "@@||a.org^$document")), StatusMode::Allowed);
        assert_eq!(classify(&declarative("somethingNew", "||a.org^")), StatusMode::Regular);
    }

    #[test]
    fn test_declarative_redirect_forced_blocked() {
        let forced = declarative("redirect", "||a.org/ads.js$script,redirect=noopjs");
        assert_eq!(classify(&forced), StatusMode::Blocked);

        let plain = declarative("redirect", "||a.org^$removeparam=utm_source");
        assert_eq!(classify(&plain), StatusMode::Modified);
    }
}
