//! Outbound URL guard.
//!
//! Every URL is checked before any network request: only `http`/`https` are
//! allowed, and the host must not be, or resolve to, a loopback, private,
//! link-local or otherwise internal address. Resolution failures are treated
//! as rejections.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use url::{Host, Url};

use crate::{AcquisitionFailure, DocifyError, Result};

/// Resolves host names to addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// [`HostResolver`] using the system resolver through tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Whether an address is off-limits for outbound fetches.
pub fn is_forbidden_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => is_forbidden_v6(v6),
    }
}

fn is_forbidden_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        // 0.0.0.0/8
        || a == 0
        // CGNAT 100.64.0.0/10
        || (a == 100 && (b & 0xC0) == 64)
}

fn is_forbidden_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_forbidden_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // unique local fc00::/7
        || (first & 0xFE00) == 0xFC00
        // link-local fe80::/10
        || (first & 0xFFC0) == 0xFE80
}

fn is_local_name(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == "localhost" || host.ends_with(".localhost")
}

fn rejected(detail: impl Into<String>) -> DocifyError {
    DocifyError::acquisition(AcquisitionFailure::SsrfRejected, detail)
}

/// Synchronous check of the URL shape alone: scheme, local names and IP
/// literals. Used where no resolver is available, such as redirect policies.
pub fn check_literal(url: &Url) -> Result<()> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(rejected(format!("scheme '{}' is not allowed", url.scheme())));
    }

    match url.host() {
        None => Err(rejected("URL has no host")),
        Some(Host::Domain(domain)) if is_local_name(domain) => {
            Err(rejected(format!("host '{}' is local", domain)))
        }
        Some(Host::Ipv4(ip)) if is_forbidden_v4(ip) => Err(rejected(format!("address {} is internal", ip))),
        Some(Host::Ipv6(ip)) if is_forbidden_v6(ip) => Err(rejected(format!("address {} is internal", ip))),
        Some(_) => Ok(()),
    }
}

/// Check a URL before fetching it.
///
/// # Errors
///
/// `AcquisitionFailed(ssrf_rejected)` when the scheme is not http(s), the host
/// is local, any resolved address is internal, or resolution fails.
pub async fn check_url(url: &Url, resolver: &dyn HostResolver) -> Result<()> {
    check_literal(url)?;

    let Some(Host::Domain(domain)) = url.host() else {
        return Ok(());
    };

    let port = url.port_or_known_default().unwrap_or(80);
    resolve_public(domain, port, resolver).await?;
    Ok(())
}

/// Resolve a host name for an outbound connection.
///
/// The host is refused when it is a local name, resolves to nothing, or any
/// of its addresses is internal. Used both before fetching and by the HTTP
/// client itself, so redirects and re-resolution go through the same check.
pub async fn resolve_public(host: &str, port: u16, resolver: &dyn HostResolver) -> Result<Vec<IpAddr>> {
    if is_local_name(host) {
        return Err(rejected(format!("host '{}' is local", host)));
    }

    let addrs = resolver
        .resolve(host, port)
        .await
        .map_err(|e| rejected(format!("could not resolve '{}': {}", host, e)))?;

    if addrs.is_empty() {
        return Err(rejected(format!("'{}' resolved to no addresses", host)));
    }

    if let Some(ip) = addrs.iter().copied().find(|ip| is_forbidden_ip(*ip)) {
        tracing::warn!(host, %ip, "refusing host that resolves to an internal address");
        return Err(rejected(format!("'{}' resolves to internal address {}", host, ip)));
    }

    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct StaticResolver(Vec<IpAddr>);

    #[async_trait]
    impl HostResolver for StaticResolver {
        async fn resolve(&self, _host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
            Ok(self.0.clone())
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl HostResolver for FailingResolver {
        async fn resolve(&self, _host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such host"))
        }
    }

    fn is_ssrf(result: Result<()>) -> bool {
        matches!(result, Err(DocifyError::AcquisitionFailed { kind: AcquisitionFailure::SsrfRejected, .. }))
    }

    #[rstest]
    #[case("127.0.0.1", true)]
    #[case("10.1.2.3", true)]
    #[case("172.16.0.1", true)]
    #[case("192.168.1.1", true)]
    #[case("169.254.169.254", true)]
    #[case("100.64.0.1", true)]
    #[case("100.127.255.255", true)]
    #[case("0.0.0.0", true)]
    #[case("255.255.255.255", true)]
    #[case("::1", true)]
    #[case("fd00::1", true)]
    #[case("fe80::1", true)]
    #[case("::ffff:127.0.0.1", true)]
    #[case("93.184.216.34", false)]
    #[case("100.128.0.1", false)]
    #[case("2606:2800:220:1::1", false)]
    fn test_is_forbidden_ip(#[case] ip: &str, #[case] forbidden: bool) {
        assert_eq!(is_forbidden_ip(ip.parse().unwrap()), forbidden);
    }

    #[rstest]
    #[case("http://127.0.0.1/admin")]
    #[case("http://localhost:8080/")]
    #[case("http://api.localhost/")]
    #[case("http://[::1]/")]
    #[case("ftp://example.com/file")]
    #[case("file:///etc/passwd")]
    fn test_check_literal_rejects(#[case] url: &str) {
        assert!(is_ssrf(check_literal(&Url::parse(url).unwrap())));
    }

    #[tokio::test]
    async fn test_check_url_rejects_private_resolution() {
        let url = Url::parse("https://intranet.example.com/").unwrap();
        let resolver = StaticResolver(vec!["93.184.216.34".parse().unwrap(), "10.0.0.5".parse().unwrap()]);
        assert!(is_ssrf(check_url(&url, &resolver).await));
    }

    #[tokio::test]
    async fn test_check_url_fails_closed_on_resolution_error() {
        let url = Url::parse("https://unknown.example/").unwrap();
        assert!(is_ssrf(check_url(&url, &FailingResolver).await));
    }

    #[tokio::test]
    async fn test_check_url_accepts_public_host() {
        let url = Url::parse("https://docs.example.com/guide").unwrap();
        let resolver = StaticResolver(vec!["93.184.216.34".parse().unwrap()]);
        assert!(check_url(&url, &resolver).await.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_public_refuses_names_pointing_inward() {
        let loopback = StaticResolver(vec!["127.0.0.1".parse().unwrap()]);
        let refused = resolve_public("localtest.me", 80, &loopback).await.map(|_| ());
        assert!(is_ssrf(refused));

        let public = StaticResolver(vec!["93.184.216.34".parse().unwrap()]);
        let addrs = resolve_public("docs.example.com", 443, &public).await.unwrap();
        assert_eq!(addrs, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);

        assert!(is_ssrf(resolve_public("db.localhost", 80, &public).await.map(|_| ())));
    }

    #[tokio::test]
    async fn test_check_url_public_ip_literal_skips_resolution() {
        let url = Url::parse("http://93.184.216.34/").unwrap();
        assert!(check_url(&url, &FailingResolver).await.is_ok());
    }
}
