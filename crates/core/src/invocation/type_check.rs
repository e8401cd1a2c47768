//! Per-type value validators for declared script variables.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;
use validator::ValidateEmail;

use crate::model::VariableType;

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?\d+$").expect("integer pattern is valid"));
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?(\d+([.,]\d+)?|[.,]\d+)$").expect("decimal pattern is valid")
});
static BOOLEAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(true|false)$").expect("boolean pattern is valid"));

/// Maximum total length of a DNS name, excluding a trailing dot.
const MAX_DNS_NAME_LEN: usize = 255;

/// Maximum length of a single DNS label.
const MAX_DNS_LABEL_LEN: usize = 63;

/// Whether `value` is acceptable for a variable declared as `variable_type`.
pub fn passes_type_validation(variable_type: VariableType, value: &str) -> bool {
    match variable_type {
        VariableType::String => true,
        VariableType::Integer => INTEGER.is_match(value),
        VariableType::Decimal => DECIMAL.is_match(value),
        VariableType::Boolean => BOOLEAN.is_match(value),
        VariableType::Ip => parse_ip(value).is_some(),
        VariableType::Ipv4 => value.parse::<Ipv4Addr>().is_ok(),
        VariableType::Ipv6 => strip_brackets(value).parse::<Ipv6Addr>().is_ok(),
        VariableType::DnsName => parse_ip(value).is_none() && is_dns_name(value),
        VariableType::Hostname => parse_ip(value).is_some() || is_dns_name(value),
        VariableType::Email => value.validate_email(),
    }
}

fn strip_brackets(value: &str) -> &str {
    value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value)
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    strip_brackets(value).parse().ok()
}

/// Label-by-label DNS host name check (letters, digits, `-` and `_`).
pub fn is_dns_name(value: &str) -> bool {
    let name = value.strip_suffix('.').unwrap_or(value);
    if name.is_empty() || name.len() > MAX_DNS_NAME_LEN {
        return false;
    }

    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_DNS_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
