//! Endpoint resolution and the pre-flight host probe.
//!
//! A configured base URL becomes a concrete completions endpoint, and the
//! endpoint's host is resolved once before any request is made. A host that
//! does not resolve is almost always a typo in the base URL, so it fails fast
//! instead of burning the retry budget. A successful probe proves nothing
//! about reachability.

use std::future::Future;

use tracing::debug;

use crate::error::{LlmError, Result};

/// Path segment that marks a URL as an already complete endpoint.
pub const COMPLETIONS_SEGMENT: &str = "/chat/completions";

/// Suffix appended to a bare base URL.
pub const COMPLETIONS_SUFFIX: &str = "/v1/chat/completions";

/// A resolved completions endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Full URL the POST goes to.
    pub url: String,
    /// Host part, for diagnostics and the probe.
    pub host: String,
    /// Explicit port, or the scheme default.
    pub port: u16,
}

/// Turn a base URL into a completions endpoint.
///
/// - A URL whose path contains `/chat/completions` is taken verbatim.
/// - Otherwise trailing slashes are stripped from the path and
///   `/v1/chat/completions` is appended; a base that already ends in `/v1`
///   only gets `/chat/completions`.
/// - A query string or fragment stays at the end of the resolved URL.
///
/// # Errors
///
/// Returns [`LlmError::Config`] for an empty base URL, one whose scheme is
/// not `http` or `https`, or one without a host.
pub fn resolve_endpoint(base_url: &str) -> Result<Endpoint> {
    let base_url = base_url.trim();
    if base_url.is_empty() {
        return Err(LlmError::Config("base URL is empty".into()));
    }

    let has_http_scheme = base_url.split_once("://").is_some_and(|(scheme, _)| {
        scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
    });
    if !has_http_scheme {
        return Err(LlmError::Config(format!(
            "base URL '{base_url}' must start with http:// or https://"
        )));
    }

    let (path, tail) = base_url.split_at(base_url.find(['?', '#']).unwrap_or(base_url.len()));
    let url = if path.contains(COMPLETIONS_SEGMENT) {
        base_url.to_string()
    } else {
        let trimmed = path.trim_end_matches('/');
        if trimmed.ends_with("/v1") {
            format!("{trimmed}{COMPLETIONS_SEGMENT}{tail}")
        } else {
            format!("{trimmed}{COMPLETIONS_SUFFIX}{tail}")
        }
    };

    let (host, port) = extract_host(&url);
    if host.is_empty() {
        return Err(LlmError::Config(format!("base URL '{base_url}' has no host")));
    }

    Ok(Endpoint { url, host, port })
}

/// Extract the host and port of a URL.
///
/// The host is the scheme-stripped text up to the next `/` or `:` (IPv6
/// literals keep their brackets stripped). The port is the explicit one if
/// present, else 443 for `https` and 80 otherwise.
#[must_use]
pub fn extract_host(url: &str) -> (String, u16) {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("", url),
    };
    let default_port = if scheme.eq_ignore_ascii_case("https") { 443 } else { 80 };

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

    let (host, port_str) = if let Some(v6) = authority.strip_prefix('[') {
        match v6.split_once(']') {
            Some((host, after)) => (host, after.strip_prefix(':')),
            None => (v6, None),
        }
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let port = port_str
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(default_port);

    (host.to_string(), port)
}

/// Name-resolution check run before the first HTTP attempt.
pub trait HostProbe: Send + Sync {
    /// Resolve `host`; `Err` carries a human-readable reason.
    fn probe(&self, host: &str, port: u16) -> impl Future<Output = std::result::Result<(), String>> + Send;
}

/// [`HostProbe`] backed by the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsProbe;

impl HostProbe for DnsProbe {
    async fn probe(&self, host: &str, port: u16) -> std::result::Result<(), String> {
        let mut addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| e.to_string())?;

        match addrs.next() {
            Some(addr) => {
                debug!(host, %addr, "Provider host resolved");
                Ok(())
            }
            None => Err("no addresses returned".to_string()),
        }
    }
}

/// Run `probe` against the endpoint, mapping failure to
/// [`LlmError::Resolution`].
///
/// # Errors
///
/// Returns [`LlmError::Resolution`] naming the host when it does not resolve.
pub async fn validate_host<P: HostProbe + ?Sized>(probe: &P, endpoint: &Endpoint) -> Result<()> {
    probe
        .probe(&endpoint.host, endpoint.port)
        .await
        .map_err(|reason| LlmError::Resolution {
            url: endpoint.url.clone(),
            host: endpoint.host.clone(),
            reason,
        })
}
