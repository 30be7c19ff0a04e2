//! Backend base URL resolution
//!
//! Picks the API base URL from the runtime network context. The rules are
//! ordered and the first match wins:
//!
//! 1. explicit override
//! 2. cloud-hosted frontend without override → hardcoded fallback (warns)
//! 3. tunnel/proxy host → production
//! 4. https on a non-loopback host → production
//! 5. https on loopback → local
//! 6. http on a LAN address → production (phones on a hotspot cannot reach `localhost`)
//! 7. http on loopback → local
//! 8. no network context → build-time default
//! 9. production build → configuration error, otherwise local

use std::fmt;
use std::net::IpAddr;

use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

const CLOUD_HOST_SUFFIXES: &[&str] = &[".vercel.app", ".netlify.app", ".onrender.com", ".pages.dev"];

const TUNNEL_HOST_SUFFIXES: &[&str] = &[
    ".ngrok-free.app",
    ".ngrok.io",
    ".ngrok.app",
    ".trycloudflare.com",
    ".loca.lt",
];

/// Scheme the console was served over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// Parse `http`, `https:`, `HTTPS` and friends.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().trim_end_matches(':').to_ascii_lowercase().as_str() {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Protocol::Https)
    }
}

/// Location the console is running at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub hostname: String,
    pub protocol: Protocol,
}

/// Runtime network context for one resolution
///
/// `location` is `None` when evaluating outside a browser-like host
/// (static rendering, CLI without `--host`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkContext {
    pub location: Option<Location>,
    pub explicit_base_url_override: Option<String>,
}

impl NetworkContext {
    pub fn new(hostname: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            location: Some(Location {
                hostname: hostname.into(),
                protocol,
            }),
            explicit_base_url_override: None,
        }
    }

    /// Context with no location at all
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, url: impl Into<String>) -> Self {
        self.explicit_base_url_override = Some(url.into());
        self
    }
}

/// Resolved API base URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseUrl(String);

impl BaseUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join an absolute API path (`/species/staff`) onto the base.
    pub fn join(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.0.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which rule produced a base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Override,
    CloudFallback,
    Tunnel,
    SecureRemote,
    SecureLoopback,
    Lan,
    Loopback,
    BuildDefault,
    LastResort,
}

/// Resolves the backend base URL from a [`NetworkContext`]
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    production_url: String,
    local_url: String,
    cloud_fallback_url: String,
    build_default_url: Option<String>,
    configured_override: Option<String>,
    production_build: bool,
}

impl EndpointResolver {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            production_url: config.production_url.clone(),
            local_url: config.local_url.clone(),
            cloud_fallback_url: config.cloud_fallback_url.clone(),
            build_default_url: config.build_default_url.clone(),
            configured_override: config.api_url_override.clone(),
            production_build: config.production_build,
        }
    }

    /// Resolve the base URL for `context`.
    ///
    /// Deterministic; the only side effect is a warning on the cloud fallback path.
    pub fn resolve(&self, context: &NetworkContext) -> Result<BaseUrl> {
        let (url, rule) = self.resolve_with_rule(context)?;
        debug!(base_url = %url, rule = ?rule, "Resolved API base URL");
        Ok(url)
    }

    /// Like [`resolve`](Self::resolve) but also reports the rule that matched.
    pub fn resolve_with_rule(&self, context: &NetworkContext) -> Result<(BaseUrl, Resolution)> {
        let explicit = context
            .explicit_base_url_override
            .as_ref()
            .or(self.configured_override.as_ref())
            .filter(|url| !url.trim().is_empty());
        if let Some(url) = explicit {
            return Ok((BaseUrl::new(url.clone()), Resolution::Override));
        }

        let Some(location) = &context.location else {
            return match &self.build_default_url {
                Some(url) => Ok((BaseUrl::new(url.clone()), Resolution::BuildDefault)),
                None => self.last_resort(),
            };
        };

        let host = normalize_host(&location.hostname);

        if has_suffix(&host, CLOUD_HOST_SUFFIXES) {
            warn!(
                hostname = %host,
                fallback = %self.cloud_fallback_url,
                "No API URL configured for cloud-hosted console, using fallback"
            );
            return Ok((BaseUrl::new(self.cloud_fallback_url.clone()), Resolution::CloudFallback));
        }

        if has_suffix(&host, TUNNEL_HOST_SUFFIXES) {
            return Ok((self.production(), Resolution::Tunnel));
        }

        let loopback = is_loopback(&host);
        match location.protocol {
            Protocol::Https if !loopback => Ok((self.production(), Resolution::SecureRemote)),
            Protocol::Https => Ok((self.local(), Resolution::SecureLoopback)),
            Protocol::Http if is_lan(&host) => Ok((self.production(), Resolution::Lan)),
            Protocol::Http if loopback => Ok((self.local(), Resolution::Loopback)),
            Protocol::Http => self.last_resort(),
        }
    }

    fn last_resort(&self) -> Result<(BaseUrl, Resolution)> {
        if self.production_build {
            return Err(SyncError::Configuration(
                "unable to resolve API base URL; set GARDEN_API_URL".to_string(),
            ));
        }
        Ok((self.local(), Resolution::LastResort))
    }

    fn production(&self) -> BaseUrl {
        BaseUrl::new(self.production_url.clone())
    }

    fn local(&self) -> BaseUrl {
        BaseUrl::new(self.local_url.clone())
    }
}

fn normalize_host(hostname: &str) -> String {
    hostname
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn has_suffix(host: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|s| host.ends_with(s))
}

fn is_loopback(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

fn is_lan(host: &str) -> bool {
    if host.ends_with(".local") {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_private() || ip.is_link_local(),
        // fc00::/7 unique local, fe80::/10 link local
        Ok(IpAddr::V6(ip)) => {
            let first = ip.segments()[0];
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> EndpointResolver {
        EndpointResolver::from_config(&SyncConfig::default())
    }

    fn rule(host: &str, protocol: Protocol) -> Resolution {
        resolver()
            .resolve_with_rule(&NetworkContext::new(host, protocol))
            .unwrap()
            .1
    }

    #[test]
    fn test_override_wins_verbatim() {
        let ctx = NetworkContext::new("localhost", Protocol::Http)
            .with_override("https://staging.example.org/api/");
        let url = resolver().resolve(&ctx).unwrap();
        assert_eq!(url.as_str(), "https://staging.example.org/api/");
    }

    #[test]
    fn test_configured_override_applies_without_location() {
        let config = SyncConfig {
            api_url_override: Some("https://configured.example.org".into()),
            ..Default::default()
        };
        let url = EndpointResolver::from_config(&config)
            .resolve(&NetworkContext::detached())
            .unwrap();
        assert_eq!(url.as_str(), "https://configured.example.org");
    }

    #[test]
    fn test_cloud_host_uses_fallback() {
        assert_eq!(rule("garden-admin.vercel.app", Protocol::Https), Resolution::CloudFallback);
    }

    #[test]
    fn test_tunnel_host_uses_production() {
        assert_eq!(rule("abc123.ngrok-free.app", Protocol::Http), Resolution::Tunnel);
        assert_eq!(rule("quiet-fox.trycloudflare.com", Protocol::Https), Resolution::Tunnel);
    }

    #[test]
    fn test_protocol_and_host_rules() {
        assert_eq!(rule("admin.jardinbotanico.org", Protocol::Https), Resolution::SecureRemote);
        assert_eq!(rule("localhost", Protocol::Https), Resolution::SecureLoopback);
        assert_eq!(rule("192.168.1.34", Protocol::Http), Resolution::Lan);
        assert_eq!(rule("10.0.0.8", Protocol::Http), Resolution::Lan);
        assert_eq!(rule("172.20.10.2", Protocol::Http), Resolution::Lan);
        assert_eq!(rule("127.0.0.1", Protocol::Http), Resolution::Loopback);
        assert_eq!(rule("[::1]", Protocol::Http), Resolution::Loopback);
    }

    #[test]
    fn test_ipv6_lan_hosts() {
        assert_eq!(rule("[fd00::1a2b]", Protocol::Http), Resolution::Lan);
        assert_eq!(rule("fc12:3456::7", Protocol::Http), Resolution::Lan);
        assert_eq!(rule("fe80::1", Protocol::Http), Resolution::Lan);
        assert_eq!(rule("[::1]", Protocol::Http), Resolution::Loopback);
        assert_eq!(rule("2001:db8::1", Protocol::Http), Resolution::LastResort);
    }

    #[test]
    fn test_lan_and_loopback_urls() {
        let r = resolver();
        let lan = r.resolve(&NetworkContext::new("192.168.0.12", Protocol::Http)).unwrap();
        assert_eq!(lan.as_str(), "https://api.jardinbotanico.org");

        let local = r.resolve(&NetworkContext::new("localhost", Protocol::Http)).unwrap();
        assert_eq!(local.as_str(), "http://localhost:8000");
    }

    #[test]
    fn test_detached_uses_build_default() {
        let config = SyncConfig {
            build_default_url: Some("https://build.example.org".into()),
            ..Default::default()
        };
        let (url, rule) = EndpointResolver::from_config(&config)
            .resolve_with_rule(&NetworkContext::detached())
            .unwrap();
        assert_eq!(url.as_str(), "https://build.example.org");
        assert_eq!(rule, Resolution::BuildDefault);
    }

    #[test]
    fn test_detached_ignores_location_rules() {
        let (_, rule) = resolver().resolve_with_rule(&NetworkContext::detached()).unwrap();
        assert_eq!(rule, Resolution::LastResort);
    }

    #[test]
    fn test_unresolvable_in_production_is_error() {
        let config = SyncConfig {
            production_build: true,
            ..Default::default()
        };
        let resolver = EndpointResolver::from_config(&config);

        let err = resolver
            .resolve(&NetworkContext::new("example.com", Protocol::Http))
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
        assert!(resolver.resolve(&NetworkContext::detached()).is_err());
    }

    #[test]
    fn test_unresolvable_in_development_is_local() {
        let url = resolver()
            .resolve(&NetworkContext::new("example.com", Protocol::Http))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let r = resolver();
        let ctx = NetworkContext::new("192.168.5.5", Protocol::Http);
        let first = r.resolve(&ctx).unwrap();
        for _ in 0..5 {
            assert_eq!(r.resolve(&ctx).unwrap(), first);
        }
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!(Protocol::parse("https:"), Some(Protocol::Https));
        assert_eq!(Protocol::parse("HTTP"), Some(Protocol::Http));
        assert_eq!(Protocol::parse("ftp"), None);
    }

    #[test]
    fn test_base_url_join() {
        let base = BaseUrl::new("http://localhost:8000/");
        assert_eq!(base.join("/species/staff"), "http://localhost:8000/species/staff");
        assert_eq!(base.join("photos/1"), "http://localhost:8000/photos/1");
    }
}
