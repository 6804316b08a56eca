//! Filtering Log Rule Authoring
//!
//! Turns an observed filtering event into editable rule text: candidate
//! block and exception patterns, rule options, and the wizard that drives the
//! user through picking one and submitting it to the rule store.

pub mod error;
pub mod exceptions;
pub mod params;
pub mod patterns;
pub mod wizard;

pub use error::WizardError;
pub use exceptions::{
    create_blocking_cookie_rules, create_exception_cookie_rules, create_exception_csp_rules,
    create_exception_css_rule, create_exception_remove_header_rules,
    create_exception_remove_param_rules, create_exception_script_rule, CosmeticMarker,
};
pub use params::{
    create_rule_from_params, get_rule_text, RuleCreationOptions, RuleOption, RuleOptionKind,
    RuleParams,
};
pub use patterns::{create_document_level_block_rule, split_to_patterns};
pub use wizard::{
    candidate_patterns, can_preview, primary_actions, AddedRuleState, RuleSink, Wizard,
    WizardAction, WizardState,
};
