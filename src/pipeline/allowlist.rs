//! Download-origin allowlist.
//!
//! Runs before any network access and again on every redirect hop, so the
//! bridge can never be pointed at an origin the operator did not list.
//! Suffix matching is on a dot boundary: `oaiusercontent.com` admits
//! `files.oaiusercontent.com` but not `evil-oaiusercontent.com`.

use crate::error::BridgeError;
use std::collections::BTreeSet;
use url::Url;

/// Exact hosts and host suffixes permitted as download origins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    hosts: BTreeSet<String>,
    suffixes: BTreeSet<String>,
    allow_http: bool,
}

impl Allowlist {
    pub fn new<H, S>(hosts: H, suffixes: S) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        Self {
            hosts: normalise_all(hosts),
            suffixes: normalise_all(suffixes),
            allow_http: false,
        }
    }

    /// Parse comma-separated lists as they appear in the environment.
    pub fn from_csv(hosts: &str, suffixes: &str) -> Self {
        Self::new(hosts.split(','), suffixes.split(','))
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.hosts = normalise_all(hosts);
        self
    }

    pub fn with_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.suffixes = normalise_all(suffixes);
        self
    }

    /// Accept `http` in addition to `https`. Local testing only.
    pub fn allow_insecure_http(mut self, v: bool) -> Self {
        self.allow_http = v;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.suffixes.is_empty()
    }

    /// Whether `host` (already lowercase, no trailing dot) is permitted.
    pub fn host_allowed(&self, host: &str) -> bool {
        if self.hosts.contains(host) {
            return true;
        }
        self.suffixes.iter().any(|suffix| {
            host == suffix
                || (host.len() > suffix.len()
                    && host.ends_with(suffix.as_str())
                    && host.as_bytes()[host.len() - suffix.len() - 1] == b'.')
        })
    }

    /// Parse and validate a download link.
    ///
    /// Returns the parsed URL so callers never re-parse (and never fetch) a
    /// string that differs from what was checked.
    pub fn validate(&self, raw: &str) -> Result<Url, BridgeError> {
        let url = Url::parse(raw.trim()).map_err(|e| BridgeError::InvalidUrl {
            reason: e.to_string(),
        })?;
        self.check(&url)?;
        Ok(url)
    }

    /// Validate an already-parsed URL.
    pub fn check(&self, url: &Url) -> Result<(), BridgeError> {
        match url.scheme() {
            "https" => {}
            "http" if self.allow_http => {}
            other => {
                return Err(BridgeError::InsecureScheme {
                    scheme: other.to_string(),
                })
            }
        }
        let host = url
            .host_str()
            .map(normalise)
            .filter(|h| !h.is_empty())
            .ok_or(BridgeError::MissingHost)?;
        if self.host_allowed(&host) {
            Ok(())
        } else {
            Err(BridgeError::HostNotAllowed { host })
        }
    }
}

fn normalise(s: &str) -> String {
    s.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn normalise_all<I>(items: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| normalise(s.as_ref().trim().trim_start_matches('.')))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Host of a URL for log lines and error messages; never the full URL.
pub fn display_host(url: &Url) -> String {
    url.host_str().unwrap_or("<no host>").to_ascii_lowercase()
}
