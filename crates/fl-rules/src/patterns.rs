//! Candidate rule patterns for a request URL
//!
//! Network rule syntax pieces used here:
//! - `||` anchors a pattern at the start of a host
//! - `^` matches a separator character or the end of the URL
//! - `@@` turns a blocking rule into an exception
//! - `$` starts the comma separated option list

use fl_core::strings::{substring_after, substring_before};
use fl_core::types::RuleData;
use fl_core::url::{get_protocol, is_hierarchic_url, second_level_domain, url_without_scheme};

pub const MASK_START_URL: &str = "||";
pub const MASK_SEPARATOR: &str = "^";
pub const MASK_ALLOWLIST: &str = "@@";
pub const OPTIONS_DELIMITER: &str = "$";
pub const COMMA_DELIMITER: &str = ",";

/// Network rule option names.
pub mod options {
    pub const DOMAIN: &str = "domain";
    pub const IMPORTANT: &str = "important";
    pub const THIRD_PARTY: &str = "third-party";
    pub const REMOVEPARAM: &str = "removeparam";
    pub const REMOVEHEADER: &str = "removeheader";
    pub const CSP: &str = "csp";
    pub const COOKIE: &str = "cookie";
    pub const BADFILTER: &str = "badfilter";
}

/// Path prefix patterns emitted at most.
const PATH_PATTERNS_COUNT: usize = 2;

/// Split a request URL into candidate patterns, most specific first.
///
/// `domain` is the request domain as reported by the engine and must be a
/// suffix of the URL host. With `is_allowlist` every pattern is an exception.
pub fn split_to_patterns(request_url: &str, domain: &str, is_allowlist: bool) -> Vec<String> {
    // Hierarchical URLs (http, ws) get the host anchor; non-hierarchical ones
    // (stun, turn) keep their scheme.
    let mut prefix = if is_hierarchic_url(request_url) {
        MASK_START_URL.to_string()
    } else {
        get_protocol(request_url)
    };
    if is_allowlist {
        prefix.insert_str(0, MASK_ALLOWLIST);
    }

    let domain_path = format!("{}/", domain);
    let mut patterns: Vec<String> = Vec::new();

    let relative = substring_after(request_url, &domain_path);
    let path = substring_before(relative, "?");
    if !path.is_empty() {
        let parts: Vec<&str> = path.split('/').collect();

        let mut pattern = domain_path.clone();
        let dirs = (parts.len() - 1).min(PATH_PATTERNS_COUNT);
        for part in &parts[..dirs] {
            pattern.push_str(part);
            pattern.push('/');
            patterns.push(format!("{}{}", prefix, pattern));
        }

        let file = parts[parts.len() - 1];
        if !file.is_empty() && patterns.len() < PATH_PATTERNS_COUNT {
            pattern.push_str(file);
            patterns.push(format!("{}{}", prefix, pattern));
        }
    }

    patterns.insert(0, format!("{}{}{}", prefix, domain, MASK_SEPARATOR));

    let sld = second_level_domain(domain);
    if sld != domain {
        patterns.insert(0, format!("{}{}{}", prefix, sld, MASK_SEPARATOR));
    }

    // `||example.com/` would only duplicate `||example.com^`.
    let url = url_without_scheme(request_url);
    if url != domain_path {
        let full = format!("{}{}", prefix, url);
        if !patterns.contains(&full) {
            patterns.push(full);
        }
    }

    patterns.reverse();
    patterns
}

/// Disable a document-level allowlist rule with `$badfilter`.
pub fn create_document_level_block_rule(rule: &RuleData) -> String {
    let Some(rule_text) = rule.rule_text() else {
        log::error!("[fl.rules] cannot create badfilter rule, rule text is missing");
        return String::new();
    };

    let delimiter = if rule_text.contains(OPTIONS_DELIMITER) {
        COMMA_DELIMITER
    } else {
        OPTIONS_DELIMITER
    };
    format!("{}{}{}", rule_text, delimiter, options::BADFILTER)
}

/// `||domain^$option`
pub fn block_domain_rule(domain: &str, option: &str) -> String {
    format!(
        "{}{}{}{}{}",
        MASK_START_URL, domain, MASK_SEPARATOR, OPTIONS_DELIMITER, option
    )
}

/// `@@||domain^$option`
pub fn unblock_domain_rule(domain: &str, option: &str) -> String {
    format!("{}{}", MASK_ALLOWLIST, block_domain_rule(domain, option))
}
