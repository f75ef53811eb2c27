//! Safety gates applied before a manifest URL is fetched.
//!
//! URLs are canonicalized so that equivalent spellings fetch the same
//! resource, and hosts are resolved and rejected when any answer is a
//! private, loopback, or otherwise reserved address.

use std::net::IpAddr;

use url::Url;

/// Reasons a manifest URL is refused before any request is made.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GuardError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    Invalid(String),

    #[error("blocked address {0} (private/reserved)")]
    BlockedAddress(IpAddr),

    #[error("could not resolve {0}")]
    Unresolvable(String),
}

/// Canonicalize a manifest URL.
///
/// Trims whitespace, assumes `https://` when no scheme is given, lowercases
/// the host and drops the fragment. The query string is kept as written.
pub fn canonicalize(input: &str) -> Result<Url, GuardError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(GuardError::Empty);
    }

    let with_scheme = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut url = Url::parse(&with_scheme).map_err(|e| GuardError::Invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(GuardError::UnsupportedScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| GuardError::Invalid(format!("{with_scheme} has no host")))?;
    url.set_host(Some(&host)).map_err(|e| GuardError::Invalid(e.to_string()))?;
    url.set_fragment(None);

    Ok(url)
}

/// Whether `ip` must never be the target of a manifest fetch.
pub fn is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.octets()[0] == 0
                // carrier-grade NAT, 100.64.0.0/10
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(mapped) => is_blocked(IpAddr::V4(mapped)),
            None => {
                v6.is_loopback()
                    || v6.is_multicast()
                    || v6.is_unspecified()
                    || (v6.segments()[0] & 0xfe00) == 0xfc00
                    || (v6.segments()[0] & 0xffc0) == 0xfe80
            }
        },
    }
}

/// Resolve the host of `url` and refuse it if any address is blocked.
pub async fn check_host(url: &Url) -> Result<(), GuardError> {
    let host = url.host_str().ok_or_else(|| GuardError::Invalid(url.to_string()))?;

    if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        return if is_blocked(ip) { Err(GuardError::BlockedAddress(ip)) } else { Ok(()) };
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| GuardError::Unresolvable(format!("{host}: {e}")))?;

    let mut resolved = false;
    for addr in addrs {
        resolved = true;
        if is_blocked(addr.ip()) {
            return Err(GuardError::BlockedAddress(addr.ip()));
        }
    }

    if resolved { Ok(()) } else { Err(GuardError::Unresolvable(host.to_string())) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_canonicalize_manifest_url() {
        let url = canonicalize("  HTTPS://Example.COM/app/manifest.json?v=2#top ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/app/manifest.json?v=2");
    }

    #[test]
    fn test_canonicalize_assumes_https() {
        let url = canonicalize("example.com/manifest.webmanifest").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/manifest.webmanifest");
    }

    #[test]
    fn test_canonicalize_rejects() {
        assert!(matches!(canonicalize(" "), Err(GuardError::Empty)));
        assert!(matches!(canonicalize("ftp://example.com/m.json"), Err(GuardError::UnsupportedScheme(_))));
        assert!(matches!(canonicalize("https://"), Err(GuardError::Invalid(_))));
    }

    #[test]
    fn test_blocked_ranges() {
        for ip in [
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)),
            IpAddr::V4(Ipv4Addr::new(172, 20, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
            IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254)),
            IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1)),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1)),
            IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
            IpAddr::V6(Ipv4Addr::new(127, 0, 0, 1).to_ipv6_mapped()),
        ] {
            assert!(is_blocked(ip), "{ip} should be blocked");
        }
    }

    #[test]
    fn test_public_addresses_allowed() {
        assert!(!is_blocked(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))));
        assert!(!is_blocked(IpAddr::V4(Ipv4Addr::new(100, 128, 0, 1))));
        assert!(!is_blocked(IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0, 0, 0, 0, 0, 0x1111))));
    }

    #[tokio::test]
    async fn test_check_host_literal_ip() {
        let url = Url::parse("https://127.0.0.1/manifest.json").unwrap();
        assert!(matches!(check_host(&url).await, Err(GuardError::BlockedAddress(_))));

        let url = Url::parse("https://[::1]/manifest.json").unwrap();
        assert!(matches!(check_host(&url).await, Err(GuardError::BlockedAddress(_))));

        let url = Url::parse("https://93.184.216.34/manifest.json").unwrap();
        assert!(check_host(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_check_host_localhost_name() {
        let url = Url::parse("https://localhost/manifest.json").unwrap();
        assert!(check_host(&url).await.is_err());
    }
}
