//! Token grant checks: script allow-list and trusted source addresses.

use std::net::IpAddr;
use std::str::FromStr;

use crate::error::InvocationError;
use crate::model::{AccessDeclaration, Token};

/// A single IP address or CIDR range from a token's `trusted_ips`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRule {
    network: IpAddr,
    prefix: u8,
}

impl IpRule {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for IpRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let network = IpAddr::from_str(addr)
            .map_err(|_| format!("'{s}' is not an IP address or CIDR range"))?
            .to_canonical();
        let max = if network.is_ipv4() { 32 } else { 128 };

        let prefix = match prefix {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("'{s}' has an invalid prefix length"))?,
            None => max,
        };

        Ok(Self { network, prefix })
    }
}

/// Whether `caller_ip` is allowed by the token's `trusted_ips`.
///
/// Entries that fail to parse are logged and ignored.
pub fn is_trusted_ip(trusted_ips: &[String], caller_ip: IpAddr) -> bool {
    trusted_ips.iter().any(|entry| match entry.parse::<IpRule>() {
        Ok(rule) => rule.contains(caller_ip),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring invalid trusted IP entry");
            false
        }
    })
}

/// Check that `token` may invoke `script_name` from `caller_ip`.
///
/// Returns the token's access declaration for the script, if any.
pub fn check_access<'a>(
    token: &'a Token,
    script_name: &str,
    caller_ip: Option<IpAddr>,
) -> Result<Option<&'a AccessDeclaration>, InvocationError> {
    if let Some(trusted) = &token.trusted_ips {
        let allowed = caller_ip.is_some_and(|ip| is_trusted_ip(trusted, ip));
        if !allowed {
            return Err(InvocationError::AccessDenied(
                "Caller address is not trusted for this token".to_string(),
            ));
        }
    }

    match &token.available_scripts {
        None => Ok(None),
        Some(scripts) => scripts.get(script_name).map(Some).ok_or_else(|| {
            InvocationError::AccessDenied(format!(
                "Script '{script_name}' is not available for this token"
            ))
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
