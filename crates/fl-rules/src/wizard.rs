//! Rule authoring wizard
//!
//! The wizard is a plain state machine. Candidate patterns are recomputed
//! explicitly on every transition that changes the selected event or the
//! state; nothing is observed implicitly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fl_core::status::{classify, StatusMode};
use fl_core::types::{
    FilteringEvent, RequestType, TabId, ALLOWLIST_FILTER_ID, USER_FILTER_ID,
};

use crate::error::WizardError;
use crate::exceptions::{
    create_blocking_cookie_rules, create_exception_cookie_rules, create_exception_csp_rules,
    create_exception_css_rule, create_exception_remove_header_rules,
    create_exception_remove_param_rules, create_exception_script_rule,
};
use crate::params::{get_rule_text, RuleCreationOptions, RuleOptionKind};
use crate::patterns::{create_document_level_block_rule, split_to_patterns};

// =============================================================================
// States
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardState {
    #[default]
    Viewing,
    ProposingBlock,
    ProposingUnblock,
    Previewing,
}

impl WizardState {
    pub fn is_proposing(self) -> bool {
        matches!(self, Self::ProposingBlock | Self::ProposingUnblock)
    }
}

/// Marker left after a rule was added from the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddedRuleState {
    Block,
    Unblock,
}

/// Action offered in the event details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardAction {
    Block,
    Unblock,
    RemoveFromUserFilter,
    RemoveFromAllowlist,
    RemoveAddedBlockRule,
    RemoveAddedUnblockRule,
    Preview,
}

// =============================================================================
// Pure helpers
// =============================================================================

/// Candidate rule patterns for an event, most specific first.
///
/// Synthesis failures yield empty texts, which are dropped here so that an
/// empty list means "nothing to offer".
pub fn candidate_patterns(event: &FilteringEvent, state: WizardState) -> Vec<String> {
    let url_and_domain = event
        .request_url
        .as_deref()
        .zip(event.request_domain.as_deref())
        .filter(|(url, domain)| !url.is_empty() && !domain.is_empty());

    let mut patterns = if state == WizardState::ProposingUnblock {
        unblock_patterns(event, url_and_domain)
    } else {
        block_patterns(event, url_and_domain)
    };
    patterns.retain(|pattern| !pattern.is_empty());
    patterns
}

fn unblock_patterns(event: &FilteringEvent, url_and_domain: Option<(&str, &str)>) -> Vec<String> {
    let rule = event.request_rule.as_ref();

    // Later, more specific event kinds override earlier candidates.
    let mut patterns = match url_and_domain {
        Some((url, domain)) => split_to_patterns(url, domain, true),
        None => Vec::new(),
    };
    if event.element.is_some() {
        patterns = vec![create_exception_css_rule(rule, event)];
    }
    if event.cookie_name.is_some() {
        patterns = create_exception_cookie_rules(event);
    }
    if event.script {
        patterns = vec![create_exception_script_rule(rule, event)];
    }
    if event.remove_param {
        patterns = create_exception_remove_param_rules(event);
    }
    if event.remove_header {
        patterns = create_exception_remove_header_rules(event);
    }
    if event.request_type == Some(RequestType::Csp) {
        patterns = create_exception_csp_rules(event);
    }
    patterns
}

fn block_patterns(event: &FilteringEvent, url_and_domain: Option<(&str, &str)>) -> Vec<String> {
    let mut patterns = match url_and_domain {
        Some((url, domain)) => split_to_patterns(url, domain, false),
        None if event.cookie_name.is_some() => create_blocking_cookie_rules(event),
        None => Vec::new(),
    };

    if let Some(rule) = event.request_rule.as_ref().filter(|rule| rule.document_level_rule) {
        patterns = vec![create_document_level_block_rule(rule)];
    }
    patterns
}

/// Whether the resource of an event can be previewed.
pub fn can_preview(event: &FilteringEvent) -> bool {
    event.request_type.is_some_and(RequestType::is_previewable)
        && event.element.is_none()
        && !event.script
        && event.cookie_name.is_none()
        && classify(event) != StatusMode::Blocked
}

/// Status shown for an event, taking a freshly added rule into account.
pub fn effective_status(event: &FilteringEvent, added: Option<AddedRuleState>) -> StatusMode {
    match added {
        Some(AddedRuleState::Block) => StatusMode::Blocked,
        Some(AddedRuleState::Unblock) => StatusMode::Allowed,
        None => classify(event),
    }
}

/// Actions offered for an event, chosen from the rule that fired.
pub fn primary_actions(event: &FilteringEvent, added: Option<AddedRuleState>) -> Vec<WizardAction> {
    match added {
        Some(AddedRuleState::Block) => return vec![WizardAction::RemoveAddedBlockRule],
        Some(AddedRuleState::Unblock) => return vec![WizardAction::RemoveAddedUnblockRule],
        None => {}
    }

    let mut actions = match &event.request_rule {
        None => vec![WizardAction::Block],
        Some(rule) if rule.filter_id == USER_FILTER_ID => {
            let main = if rule.is_stealth_mode_rule {
                WizardAction::Unblock
            } else {
                WizardAction::RemoveFromUserFilter
            };
            if rule.allowlist_rule {
                vec![WizardAction::Block, main]
            } else {
                vec![main]
            }
        }
        Some(rule) if rule.filter_id == ALLOWLIST_FILTER_ID => vec![WizardAction::RemoveFromAllowlist],
        Some(rule) if rule.allowlist_rule => vec![WizardAction::Block],
        Some(_) => vec![WizardAction::Unblock],
    };

    if can_preview(event) {
        actions.push(WizardAction::Preview);
    }
    actions
}

// =============================================================================
// Rule store seam
// =============================================================================

/// External collaborator persisting rule changes.
#[async_trait]
pub trait RuleSink: Send + Sync {
    async fn add_user_rule(&self, rule_text: &str) -> Result<(), WizardError>;

    async fn remove_user_rule(&self, rule_text: &str) -> Result<(), WizardError>;

    /// Remove the allowlist entry of the site open in a tab.
    async fn remove_allowlist_domain(&self, tab_id: TabId) -> Result<(), WizardError>;
}

// =============================================================================
// Wizard
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Wizard {
    is_open: bool,
    event: Option<FilteringEvent>,
    state: WizardState,
    patterns: Vec<String>,
    rule_pattern: String,
    rule_text: Option<String>,
    options: RuleCreationOptions,
    added_rule_state: Option<AddedRuleState>,
    added_rule: Option<String>,
    submitted: bool,
}

impl Wizard {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Accessors =====

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn state(&self) -> WizardState {
        self.state
    }

    pub fn event(&self) -> Option<&FilteringEvent> {
        self.event.as_ref()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn rule_pattern(&self) -> &str {
        &self.rule_pattern
    }

    pub fn rule_text_override(&self) -> Option<&str> {
        self.rule_text.as_deref()
    }

    pub fn options(&self) -> &RuleCreationOptions {
        &self.options
    }

    pub fn added_rule_state(&self) -> Option<AddedRuleState> {
        self.added_rule_state
    }

    /// Form controls are disabled while a change is in flight.
    pub fn controls_disabled(&self) -> bool {
        self.submitted
    }

    /// The rule to submit: the user's text if edited, otherwise the text
    /// assembled from the selected pattern and toggles.
    pub fn rule(&self) -> String {
        match &self.rule_text {
            Some(text) => text.clone(),
            None => get_rule_text(self.event.as_ref(), &self.rule_pattern, &self.options),
        }
    }

    pub fn status(&self) -> Option<StatusMode> {
        self.event
            .as_ref()
            .map(|event| effective_status(event, self.added_rule_state))
    }

    pub fn actions(&self) -> Vec<WizardAction> {
        self.event
            .as_ref()
            .map(|event| primary_actions(event, self.added_rule_state))
            .unwrap_or_default()
    }

    // ===== Transitions =====

    /// Open the wizard for an event in the viewing state.
    pub fn open(&mut self, event: FilteringEvent) {
        self.options = RuleCreationOptions::for_event(&event);
        self.event = Some(event);
        self.is_open = true;
        self.state = WizardState::Viewing;
        self.added_rule_state = None;
        self.added_rule = None;
        self.submitted = false;
        self.recompute_patterns();
    }

    /// Close the wizard and drop every piece of state.
    pub fn close(&mut self) {
        *self = Self::default();
    }

    pub fn propose_block(&mut self) -> Result<(), WizardError> {
        self.enter_proposing(WizardState::ProposingBlock)
    }

    pub fn propose_unblock(&mut self) -> Result<(), WizardError> {
        self.enter_proposing(WizardState::ProposingUnblock)
    }

    fn enter_proposing(&mut self, state: WizardState) -> Result<(), WizardError> {
        let event = self.event.as_ref().ok_or(WizardError::NoSelectedEvent)?;
        self.options = RuleCreationOptions::for_event(event);
        self.state = state;
        self.recompute_patterns();
        Ok(())
    }

    /// Switch to the preview. Returns false when the resource cannot be
    /// previewed.
    pub fn preview(&mut self) -> bool {
        let allowed = matches!(self.state, WizardState::Viewing) || self.state.is_proposing();
        match &self.event {
            Some(event) if allowed && can_preview(event) => {
                self.state = WizardState::Previewing;
                true
            }
            _ => false,
        }
    }

    /// Back to the event details.
    pub fn view(&mut self) {
        self.state = WizardState::Viewing;
    }

    pub fn set_rule_pattern(&mut self, pattern: &str) {
        self.rule_text = None;
        self.rule_pattern = pattern.to_string();
    }

    pub fn set_rule_text(&mut self, text: &str) {
        self.rule_text = Some(text.to_string());
    }

    /// Toggle a rule option. Any toggle drops the hand-edited text.
    pub fn set_option(&mut self, kind: RuleOptionKind, checked: bool) -> bool {
        self.rule_text = None;
        self.options.set(kind, checked)
    }

    fn recompute_patterns(&mut self) {
        self.patterns = match &self.event {
            Some(event) => candidate_patterns(event, self.state),
            None => Vec::new(),
        };
        if let Some(first) = self.patterns.first().cloned() {
            self.set_rule_pattern(&first);
        }
    }

    // ===== Submission =====

    /// Start adding the current rule. The returned text must be passed to
    /// the rule store and the result to [`Wizard::finish_add_rule`].
    pub fn begin_add_rule(&mut self) -> Result<String, WizardError> {
        if self.submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        if self.event.is_none() {
            return Err(WizardError::NoSelectedEvent);
        }

        let rule = self.rule();
        if rule.trim().is_empty() {
            log::error!("[fl.wizard] rule is empty");
            return Err(WizardError::EmptyRule);
        }

        self.submitted = true;
        Ok(rule)
    }

    pub fn finish_add_rule(
        &mut self,
        rule: String,
        result: Result<(), WizardError>,
    ) -> Result<AddedRuleState, WizardError> {
        self.submitted = false;
        if let Err(e) = result {
            log::error!("[fl.wizard] failed to add rule {}: {}", rule, e);
            return Err(e);
        }

        let added = if self.state == WizardState::ProposingBlock {
            AddedRuleState::Block
        } else {
            AddedRuleState::Unblock
        };
        self.added_rule_state = Some(added);
        self.added_rule = Some(rule);
        self.state = WizardState::Viewing;
        Ok(added)
    }

    /// Add the current rule to the user rules.
    pub async fn add_rule(&mut self, sink: &dyn RuleSink) -> Result<AddedRuleState, WizardError> {
        let rule = self.begin_add_rule()?;
        let result = sink.add_user_rule(&rule).await;
        self.finish_add_rule(rule, result)
    }

    /// Remove the user rule that produced the selected event.
    pub async fn remove_from_user_filter(&mut self, sink: &dyn RuleSink) -> Result<(), WizardError> {
        let rule_text = {
            let rule = self
                .event
                .as_ref()
                .ok_or(WizardError::NoSelectedEvent)?
                .request_rule
                .as_ref()
                .ok_or(WizardError::EmptyRule)?;
            rule.original_rule_text
                .clone()
                .or_else(|| rule.rule_text().map(str::to_string))
        };
        let Some(rule_text) = rule_text else {
            log::error!("[fl.wizard] rule text is not defined");
            return Err(WizardError::EmptyRule);
        };

        self.submit_removal(sink.remove_user_rule(&rule_text)).await
    }

    /// Undo the rule added from this wizard.
    pub async fn remove_added_rule(&mut self, sink: &dyn RuleSink) -> Result<(), WizardError> {
        let rule = self.added_rule.clone().unwrap_or_else(|| self.rule());
        if rule.trim().is_empty() {
            log::error!("[fl.wizard] added rule is empty");
            return Err(WizardError::EmptyRule);
        }

        self.submit_removal(sink.remove_user_rule(&rule)).await
    }

    /// Remove the site of the selected tab from the allowlist.
    pub async fn remove_from_allowlist(
        &mut self,
        sink: &dyn RuleSink,
        tab_id: Option<TabId>,
    ) -> Result<(), WizardError> {
        let Some(tab_id) = tab_id else {
            log::error!("[fl.wizard] selected tab id is not defined");
            return Err(WizardError::NoSelectedTab);
        };

        self.submit_removal(sink.remove_allowlist_domain(tab_id)).await
    }

    async fn submit_removal<F>(&mut self, call: F) -> Result<(), WizardError>
    where
        F: std::future::Future<Output = Result<(), WizardError>>,
    {
        if self.submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        self.submitted = true;

        match call.await {
            Ok(()) => {
                self.close();
                Ok(())
            }
            Err(e) => {
                self.submitted = false;
                log::error!("[fl.wizard] rule removal failed: {}", e);
                Err(e)
            }
        }
    }
}
