//! Centralized validation functions.
//!
//! This module provides unified validation for:
//! - IP address literals received from the feed
//! - nftables identifiers (set, table and chain names)
//! - nftables element strings before they reach the command line

use anyhow::Result;
use std::net::IpAddr;

/// Maximum length nft accepts for an identifier
const MAX_IDENTIFIER_LEN: usize = 255;

/// Validate an IP address string and return the parsed IpAddr.
///
/// # Examples
/// ```
/// use apiban_nft_client::validation::validate_ip;
/// assert!(validate_ip("192.168.1.1").is_ok());
/// assert!(validate_ip("::1").is_ok());
/// assert!(validate_ip("no new bans").is_err());
/// ```
pub fn validate_ip(ip_str: &str) -> Result<IpAddr> {
    ip_str
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", ip_str))
}

/// Check that a name is usable as an nftables identifier.
///
/// Identifiers must start with a letter or underscore and continue with
/// letters, digits, `_`, `.` or `-`.
///
/// # Examples
/// ```
/// use apiban_nft_client::validation::is_valid_identifier;
/// assert!(is_valid_identifier("apiban"));
/// assert!(is_valid_identifier("apiban_v4"));
/// assert!(!is_valid_identifier(""));
/// assert!(!is_valid_identifier("set; flush ruleset"));
/// ```
pub fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN || !name.is_ascii() {
        return false;
    }

    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    first_ok && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Validate that an element string is safe to pass to `nft add element`.
///
/// IpAddr::to_string() already yields safe output; this is checked again
/// right before the command is built.
pub fn is_safe_nft_element(s: &str) -> bool {
    // Only allow: digits, dots (IPv4), colons (IPv6), slashes (CIDR), a-f (IPv6 hex)
    !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_digit() || c == '.' || c == ':' || c == '/' || ('a'..='f').contains(&c)
        })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every parsed IP literal renders to a safe element
        #[test]
        fn prop_parsed_ipv4_is_safe(a: u8, b: u8, c: u8, d: u8) {
            let ip = validate_ip(&format!("{}.{}.{}.{}", a, b, c, d)).unwrap();
            prop_assert!(is_safe_nft_element(&ip.to_string()));
        }

        #[test]
        fn prop_parsed_ipv6_is_safe(segments: [u16; 8]) {
            let ip = IpAddr::from(std::net::Ipv6Addr::from(segments));
            prop_assert!(is_safe_nft_element(&ip.to_string()));
        }

        /// Arbitrary input never panics the identifier check
        #[test]
        fn prop_identifier_no_panic(s in ".*") {
            let _ = is_valid_identifier(&s);
        }
    }
}
