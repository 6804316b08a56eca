//! URL helpers for the rule synthesizer and the tab log
//!
//! These functions avoid full URL parsing and work directly on string slices.

// =============================================================================
// Scheme
// =============================================================================

/// Extension page schemes; tabs showing these are hidden from the tab selector.
const EXTENSION_SCHEMES: &[&str] = &[
    "chrome-extension:",
    "moz-extension:",
    "safari-web-extension:",
    "extension:",
];

/// Protocol of a URL including the trailing colon, lowercased (`https:`).
/// Returns an empty string when the URL has no valid scheme.
pub fn get_protocol(url: &str) -> String {
    let colon_pos = match url.find(':') {
        Some(pos) if pos > 0 => pos,
        _ => return String::new(),
    };

    let scheme = &url[..colon_pos];
    let bytes = scheme.as_bytes();
    if !bytes[0].is_ascii_alphabetic() {
        return String::new();
    }
    if !bytes
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.')
    {
        return String::new();
    }

    let mut protocol = scheme.to_ascii_lowercase();
    protocol.push(':');
    protocol
}

/// Hierarchical URLs carry an authority after `//` (http, ws, ftp...).
/// Non-hierarchical ones (stun, turn, data) do not.
#[inline]
pub fn is_hierarchic_url(url: &str) -> bool {
    url.contains("//")
}

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    if bytes.len() > colon_pos + 2
        && bytes[colon_pos + 1] == b'/'
        && bytes[colon_pos + 2] == b'/'
    {
        return Some(colon_pos + 3);
    }

    None
}

/// Remove the scheme and a leading `www.` from a URL.
pub fn url_without_scheme(url: &str) -> &str {
    let protocol = get_protocol(url);

    let mut rest = url;
    if !protocol.is_empty() && url.len() >= protocol.len() {
        let head = &url[..protocol.len()];
        if head.eq_ignore_ascii_case(&protocol) {
            rest = &url[protocol.len()..];
        }
    }
    if is_hierarchic_url(url) {
        rest = rest.strip_prefix("//").unwrap_or(rest);
    }

    rest.strip_prefix("www.").unwrap_or(rest)
}

/// Check if the URL points to an extension page.
pub fn is_extension_url(url: &str) -> bool {
    let protocol = get_protocol(url);
    EXTENSION_SCHEMES.contains(&protocol.as_str())
}

// =============================================================================
// Host
// =============================================================================

/// Get the start and end positions of the hostname in a URL.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    // Skip userinfo
    let mut host_start = scheme_end;
    for (i, &b) in bytes.iter().enumerate().skip(scheme_end) {
        if b == b'@' {
            host_start = i + 1;
            break;
        }
        if b == b'/' {
            break;
        }
    }

    let mut host_end = bytes.len();
    for (i, &b) in bytes.iter().enumerate().skip(host_start) {
        if b == b'/' || b == b'?' || b == b'#' || b == b':' {
            host_end = i;
            break;
        }
    }

    Some((host_start, host_end))
}

/// Host extraction without allocations.
/// Returns a slice into the original URL.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    let host = &url[host_start..host_end];
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Last two labels of a domain (`cdn.example.org` -> `example.org`).
pub fn second_level_domain(domain: &str) -> &str {
    let mut dots = domain.rmatch_indices('.');
    dots.next();
    match dots.next() {
        Some((pos, _)) => &domain[pos + 1..],
        None => domain,
    }
}

/// Domain used by cookie rules: frame domain without a leading dot.
pub fn cookie_domain(frame_domain: Option<&str>) -> &str {
    match frame_domain {
        Some(domain) => domain.strip_prefix('.').unwrap_or(domain),
        None => "",
    }
}
