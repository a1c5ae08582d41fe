//! `byfs://` URL parsing.

use crate::config::DEFAULT_PORT;

/// URL scheme, separator included.
pub const SCHEME: &str = "byfs://";

/// A parsed `byfs://host[:port]/path` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    /// Server host.
    pub host: String,
    /// Server port (8080 when absent).
    pub port: u16,
    /// Absolute remote path (`/` when absent).
    pub path: String,
}

impl RemoteUrl {
    /// Parses a `byfs://` URL. Returns `None` for other schemes, a missing
    /// host, or an unparsable port.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = strip_prefix_ignore_case(s.trim(), SCHEME)?;
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        if authority.is_empty() {
            return None;
        }
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => (h, p.parse().ok()?),
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_owned(),
            port,
            path: format!("/{path}"),
        })
    }
}

/// Strips a leading `byfs://`, leaving the remote path. Other strings are
/// returned unchanged.
pub fn strip_scheme(s: &str) -> &str {
    strip_prefix_ignore_case(s, SCHEME).unwrap_or(s)
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url() {
        let u = RemoteUrl::parse("byfs://files.lan:9000/data/report.csv").unwrap();
        assert_eq!(u.host, "files.lan");
        assert_eq!(u.port, 9000);
        assert_eq!(u.path, "/data/report.csv");
    }

    #[test]
    fn defaults_and_case() {
        let u = RemoteUrl::parse("BYFS://host").unwrap();
        assert_eq!((u.host.as_str(), u.port, u.path.as_str()), ("host", 8080, "/"));
    }

    #[test]
    fn rejects_other_inputs() {
        assert_eq!(RemoteUrl::parse("/local/path"), None);
        assert_eq!(RemoteUrl::parse("http://host/x"), None);
        assert_eq!(RemoteUrl::parse("byfs:///x"), None);
        assert_eq!(RemoteUrl::parse("byfs://host:port/x"), None);
        assert_eq!(RemoteUrl::parse("byfs://:9000/x"), None);
    }

    #[test]
    fn strips_scheme() {
        assert_eq!(strip_scheme("byfs://123/file"), "123/file");
        assert_eq!(strip_scheme("/plain"), "/plain");
        assert_eq!(strip_scheme("byf"), "byf");
    }
}
