//! Rule options and final rule text assembly

use serde::{Deserialize, Serialize};

use fl_core::types::FilteringEvent;

use crate::patterns::{options, COMMA_DELIMITER, OPTIONS_DELIMITER};

/// A toggle offered by the rule form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOption {
    pub checked: bool,
}

/// Which toggle of the rule form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOptionKind {
    /// Checked means "apply on all websites", i.e. no domain restriction.
    Domain,
    ThirdParty,
    Important,
    RemoveParam,
}

/// Toggles of the rule form. `None` means not applicable to the event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleCreationOptions {
    pub domain: Option<RuleOption>,
    pub third_party: Option<RuleOption>,
    pub important: Option<RuleOption>,
    pub remove_param: Option<RuleOption>,
}

impl RuleCreationOptions {
    /// Default toggles for an event.
    ///
    /// `important` starts checked when the applied rule is an allowlist or
    /// important rule that is not document-level.
    pub fn for_event(event: &FilteringEvent) -> Self {
        let rule = event.request_rule.as_ref();
        let cookie_rule = rule.is_some_and(|rule| rule.cookie_rule);
        let important = rule.is_some_and(|rule| {
            (rule.allowlist_rule || rule.is_important) && !rule.document_level_rule
        });

        let domain = (event.frame_domain.is_some() && !cookie_rule).then_some(RuleOption::default());

        let remove_param = match event.request_url.as_deref() {
            Some(url) if !url.contains('?') || cookie_rule => None,
            _ => Some(RuleOption::default()),
        };

        Self {
            domain,
            third_party: Some(RuleOption::default()),
            important: Some(RuleOption { checked: important }),
            remove_param,
        }
    }

    fn slot(&mut self, kind: RuleOptionKind) -> &mut Option<RuleOption> {
        match kind {
            RuleOptionKind::Domain => &mut self.domain,
            RuleOptionKind::ThirdParty => &mut self.third_party,
            RuleOptionKind::Important => &mut self.important,
            RuleOptionKind::RemoveParam => &mut self.remove_param,
        }
    }

    /// Set a toggle. Returns false when the option is not applicable.
    pub fn set(&mut self, kind: RuleOptionKind, checked: bool) -> bool {
        match self.slot(kind) {
            Some(option) => {
                option.checked = checked;
                true
            }
            None => false,
        }
    }

    pub fn is_checked(&self, kind: RuleOptionKind) -> bool {
        let option = match kind {
            RuleOptionKind::Domain => self.domain,
            RuleOptionKind::ThirdParty => self.third_party,
            RuleOptionKind::Important => self.important,
            RuleOptionKind::RemoveParam => self.remove_param,
        };
        option.is_some_and(|option| option.checked)
    }
}

/// Inputs of a network rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleParams<'a> {
    pub url_pattern: &'a str,
    pub url_domain: Option<&'a str>,
    pub third_party: bool,
    pub important: bool,
    pub remove_param: bool,
}

/// Network rule text: the pattern followed by its options.
pub fn create_rule_from_params(params: &RuleParams<'_>) -> String {
    let mut rule_text = params.url_pattern.to_string();

    let mut rule_options: Vec<String> = Vec::new();
    if let Some(domain) = params.url_domain.filter(|domain| !domain.is_empty()) {
        rule_options.push(format!("{}={}", options::DOMAIN, domain));
    }
    if params.important {
        rule_options.push(options::IMPORTANT.to_string());
    }
    if params.third_party {
        rule_options.push(options::THIRD_PARTY.to_string());
    }
    if params.remove_param {
        rule_options.push(options::REMOVEPARAM.to_string());
    }

    if !rule_options.is_empty() {
        // Patterns such as `@@||a.org^$removeparam=x` already carry options.
        let delimiter = if rule_text.contains(OPTIONS_DELIMITER) {
            COMMA_DELIMITER
        } else {
            OPTIONS_DELIMITER
        };
        rule_text.push_str(delimiter);
        rule_text.push_str(&rule_options.join(COMMA_DELIMITER));
    }

    rule_text
}

/// Cosmetic rule text; without `permit_domain` the domain part is cut off.
pub fn create_css_rule_from_params(pattern: &str, permit_domain: bool) -> String {
    if permit_domain {
        return pattern.to_string();
    }
    match pattern.find('#') {
        Some(pos) => pattern[pos..].to_string(),
        None => pattern.to_string(),
    }
}

/// Cookie rule text. Cookie patterns always carry `$cookie`, so the options
/// are appended after a comma.
pub fn create_cookie_rule_from_params(pattern: &str, third_party: bool, important: bool) -> String {
    let mut rule_text = pattern.to_string();
    if important {
        rule_text.push_str(COMMA_DELIMITER);
        rule_text.push_str(options::IMPORTANT);
    }
    if third_party {
        rule_text.push_str(COMMA_DELIMITER);
        rule_text.push_str(options::THIRD_PARTY);
    }
    rule_text
}

/// Final rule text for the selected pattern and toggles.
pub fn get_rule_text(
    event: Option<&FilteringEvent>,
    rule_pattern: &str,
    rule_options: &RuleCreationOptions,
) -> String {
    let Some(event) = event else {
        return String::new();
    };

    let permit_domain = !rule_options.is_checked(RuleOptionKind::Domain);
    let important = rule_options.is_checked(RuleOptionKind::Important);
    let third_party = rule_options.is_checked(RuleOptionKind::ThirdParty);
    let remove_param = rule_options.is_checked(RuleOptionKind::RemoveParam);

    let document_level = event
        .request_rule
        .as_ref()
        .is_some_and(|rule| rule.document_level_rule);

    if event.element.is_some() {
        create_css_rule_from_params(rule_pattern, permit_domain)
    } else if event.cookie_name.as_deref().is_some_and(|name| !name.is_empty()) {
        create_cookie_rule_from_params(rule_pattern, third_party, important)
    } else if event.script || document_level {
        create_rule_from_params(&RuleParams {
            url_pattern: rule_pattern,
            ..Default::default()
        })
    } else {
        let domain = if permit_domain {
            event.frame_domain.as_deref()
        } else {
            None
        };
        create_rule_from_params(&RuleParams {
            url_pattern: rule_pattern,
            url_domain: domain,
            third_party,
            important,
            remove_param,
        })
    }
}
