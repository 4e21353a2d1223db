//! Source-address classification and allow-list matching.

use std::net::IpAddr;

use ipnet::IpNet;

/// Where a session originates from, derived from its source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLocation {
    Lan,
    Wan,
}

impl SessionLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionLocation::Lan => "lan",
            SessionLocation::Wan => "wan",
        }
    }
}

/// Classify a source address as LAN or WAN.
///
/// Private (RFC 1918), loopback, and link-local addresses are LAN; everything
/// else, including unparseable addresses, is WAN.
pub fn classify_address(address: &str) -> SessionLocation {
    match address.parse::<IpAddr>() {
        Ok(ip) if is_local(&ip) => SessionLocation::Lan,
        _ => SessionLocation::Wan,
    }
}

fn is_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            if v6.is_loopback() {
                return true;
            }
            // fe80::/10 link-local
            let segments = v6.segments();
            (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Check a source address against an allow-list of IPs and CIDR ranges.
///
/// Each entry is either a bare IP (exact match) or a CIDR network
/// (containment). Malformed entries never match. An empty list matches
/// nothing.
pub fn address_allowed(address: &str, allowed: &[String]) -> bool {
    let Ok(ip) = address.parse::<IpAddr>() else {
        return false;
    };

    allowed.iter().any(|entry| entry_matches(&ip, entry.trim()))
}

fn entry_matches(ip: &IpAddr, entry: &str) -> bool {
    if let Ok(exact) = entry.parse::<IpAddr>() {
        return *ip == exact;
    }
    if let Ok(net) = entry.parse::<IpNet>() {
        return net.contains(ip);
    }
    false
}
