// src/core/targets.rs

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::errors::EngineError;

static RE_HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?)*$").unwrap()
});
static RE_IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$").unwrap()
});

/// Normalizes user input into a bare, lowercase domain or IPv4 address.
///
/// Accepts `example.com`, `https://Example.com/path`, `10.0.0.1` and the
/// like. Scheme, credentials, port and path are dropped. The host is checked
/// as typed: shorthand such as `127.1` is rejected, never expanded.
pub fn normalize_target(raw: &str) -> Result<String, EngineError> {
    let invalid = |reason: &str| EngineError::InvalidTarget {
        input: raw.to_string(),
        reason: reason.to_string(),
    };

    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return Err(invalid("target cannot be empty"));
    }

    let host = host_part(&lowered);
    if host.is_empty() {
        return Err(invalid("no host in target"));
    }

    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return if RE_IPV4.is_match(host) {
            Ok(host.to_string())
        } else {
            Err(invalid("not a valid IPv4 address"))
        };
    }

    // A numeric top-level label only makes sense as part of an IP address.
    let numeric_tld = host
        .rsplit('.')
        .next()
        .is_some_and(|label| label.chars().all(|c| c.is_ascii_digit()));
    if host.len() <= 253 && !numeric_tld && RE_HOSTNAME.is_match(host) {
        Ok(host.to_string())
    } else {
        Err(invalid("not a valid domain or IPv4 address"))
    }
}

/// The host of a target string: scheme, credentials, port, path, query and
/// fragment removed, along with a trailing root dot.
fn host_part(target: &str) -> &str {
    let rest = target.split_once("://").map_or(target, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    host.strip_suffix('.').unwrap_or(host)
}

/// Drops a leading `http(s)://` and anything after the first `/`.
pub fn strip_scheme_and_path(entry: &str) -> &str {
    let entry = entry.trim();
    let without_scheme = entry
        .strip_prefix("http://")
        .or_else(|| entry.strip_prefix("https://"))
        .unwrap_or(entry);
    without_scheme.split('/').next().unwrap_or_default()
}
