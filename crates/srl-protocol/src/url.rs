// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session URL parsing.

use std::fmt;
use thiserror::Error;

/// Websocket scheme of a session URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain websocket.
    Ws,
    /// TLS websocket.
    Wss,
}

impl Scheme {
    /// The default port for this scheme.
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        })
    }
}

/// Errors produced while parsing a session URL.
#[derive(Debug, Error)]
pub enum SessionUrlError {
    /// The string is not a URL at all.
    #[error("invalid url: {0}")]
    Invalid(#[from] url::ParseError),
    /// Only `ws` and `wss` sessions exist.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// The URL has no host.
    #[error("missing host")]
    MissingHost,
    /// The URL path names no channel.
    #[error("missing channel")]
    MissingChannel,
}

/// A parsed session URL:
/// `{scheme}://{host}[:{port}]/{channel}[?user={id}]`.
///
/// # Examples
///
/// ```
/// use srl_protocol::{Scheme, SessionUrl};
///
/// let url = SessionUrl::parse("wss://relay.example.com/studio?user=alice").unwrap();
/// assert_eq!(url.scheme(), Scheme::Wss);
/// assert_eq!(url.host(), "relay.example.com");
/// assert_eq!(url.port(), 443);
/// assert_eq!(url.channel(), "studio");
/// assert_eq!(url.user(), Some("alice"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUrl {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    channel: String,
    user: Option<String>,
}

impl SessionUrl {
    /// Parse and validate a session URL string.
    pub fn parse(input: &str) -> Result<Self, SessionUrlError> {
        let parsed = url::Url::parse(input)?;

        let scheme = match parsed.scheme() {
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            other => return Err(SessionUrlError::UnsupportedScheme(other.to_string())),
        };

        let host = parsed
            .host_str()
            .ok_or(SessionUrlError::MissingHost)?
            .to_string();

        let channel = parsed
            .path_segments()
            .and_then(|mut segments| segments.find(|segment| !segment.is_empty()))
            .map(str::to_string)
            .ok_or(SessionUrlError::MissingChannel)?;

        let user = parsed
            .query_pairs()
            .find(|(key, _)| key == "user")
            .map(|(_, value)| value.into_owned());

        Ok(Self {
            scheme,
            host,
            port: parsed.port(),
            channel,
            user,
        })
    }

    /// The websocket scheme.
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns `true` for `wss` sessions.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Wss
    }

    /// The host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The explicit or scheme-default port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// The channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The user identity, when the URL carries one.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// `host:port` for socket address resolution.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }
}

impl fmt::Display for SessionUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "/{}", self.channel)?;
        if let Some(user) = &self.user {
            write!(f, "?user={user}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_url() {
        let url = SessionUrl::parse("ws://localhost:52702/studio?user=alice").unwrap();
        assert_eq!(url.scheme(), Scheme::Ws);
        assert_eq!(url.host(), "localhost");
        assert_eq!(url.port(), 52702);
        assert_eq!(url.channel(), "studio");
        assert_eq!(url.user(), Some("alice"));
        assert_eq!(url.authority(), "localhost:52702");
    }

    #[test]
    fn default_ports_follow_scheme() {
        assert_eq!(SessionUrl::parse("ws://h/c").unwrap().port(), 80);
        assert_eq!(SessionUrl::parse("wss://h/c").unwrap().port(), 443);
    }

    #[test]
    fn user_is_optional() {
        let url = SessionUrl::parse("ws://h/c").unwrap();
        assert_eq!(url.user(), None);
    }

    #[test]
    fn rejects_http_and_missing_channel() {
        assert!(matches!(
            SessionUrl::parse("http://h/c"),
            Err(SessionUrlError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            SessionUrl::parse("ws://h"),
            Err(SessionUrlError::MissingChannel)
        ));
        assert!(matches!(
            SessionUrl::parse("ws://h/"),
            Err(SessionUrlError::MissingChannel)
        ));
    }

    #[test]
    fn display_round_trips() {
        let text = "ws://localhost:52702/studio?user=alice";
        let url = SessionUrl::parse(text).unwrap();
        assert_eq!(url.to_string(), text);
    }
}
