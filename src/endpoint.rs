//! GraphQL endpoint URL type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::{Host, Url};

use crate::error::{Error, InvalidInputError};

/// A validated GraphQL endpoint URL.
///
/// This type ensures the URL is absolute, uses HTTPS (or HTTP for localhost),
/// and is normalized so the transport can POST to it directly.
///
/// # Example
///
/// ```
/// use tokenlink::EndpointUrl;
///
/// let endpoint = EndpointUrl::new("https://blobfishapp.duckdns.org/v1/graphql").unwrap();
/// assert_eq!(endpoint.as_str(), "https://blobfishapp.duckdns.org/v1/graphql");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointUrl(Url);

impl EndpointUrl {
    /// Create a new endpoint URL from a string, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not valid or doesn't meet requirements.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref();
        let url = Url::parse(s).map_err(|e| InvalidInputError::EndpointUrl {
            value: s.to_string(),
            reason: e.to_string(),
        })?;

        Self::validate(&url, s)?;

        // Normalize: remove trailing slash on a bare root path
        let normalized = if url.path() == "/" {
            let mut u = url.clone();
            u.set_path("");
            u
        } else {
            url
        };

        Ok(Self(normalized))
    }

    /// Returns the URL as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str().trim_end_matches('/')
    }

    /// Returns the inner URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    fn validate(url: &Url, original: &str) -> Result<(), Error> {
        // Must be absolute
        if url.cannot_be_a_base() {
            return Err(InvalidInputError::EndpointUrl {
                value: original.to_string(),
                reason: "must be an absolute URL".to_string(),
            }
            .into());
        }

        // Must be HTTPS (or HTTP for loopback). IPv6 hosts come back
        // bracketed from host_str(), so match on the parsed host instead.
        let scheme = url.scheme();
        let is_localhost = match url.host() {
            Some(Host::Domain(host)) => host == "localhost",
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        };

        if scheme != "https" && !(scheme == "http" && is_localhost) {
            return Err(InvalidInputError::EndpointUrl {
                value: original.to_string(),
                reason: "must use HTTPS (HTTP allowed only for localhost)".to_string(),
            }
            .into());
        }

        // Must have a host
        if url.host_str().is_none() {
            return Err(InvalidInputError::EndpointUrl {
                value: original.to_string(),
                reason: "must have a host".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EndpointUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for EndpointUrl {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EndpointUrl {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https() {
        let endpoint = EndpointUrl::new("https://blobfishapp.duckdns.org/v1/graphql").unwrap();
        assert_eq!(endpoint.as_str(), "https://blobfishapp.duckdns.org/v1/graphql");
    }

    #[test]
    fn accepts_http_localhost() {
        assert!(EndpointUrl::new("http://127.0.0.1:4173/v1/graphql").is_ok());
        assert!(EndpointUrl::new("http://localhost:4173/v1/graphql").is_ok());
    }

    #[test]
    fn accepts_http_ipv6_loopback() {
        assert!(EndpointUrl::new("http://[::1]:4173/v1/graphql").is_ok());
    }

    #[test]
    fn rejects_http_ipv6_non_loopback() {
        assert!(EndpointUrl::new("http://[2001:db8::1]:4173/v1/graphql").is_err());
    }

    #[test]
    fn rejects_http_remote() {
        let result = EndpointUrl::new("http://example.com/v1/graphql");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_relative_url() {
        assert!(EndpointUrl::new("/v1/graphql").is_err());
    }

    #[test]
    fn normalizes_trailing_slash() {
        let endpoint = EndpointUrl::new("https://example.com/").unwrap();
        assert_eq!(endpoint.as_str(), "https://example.com");
    }
}
