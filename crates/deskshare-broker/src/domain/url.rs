//! The viewer URL handed back after a successful start.
//!
//! ```text
//! http://<public host>:<web port>/viewer?host=<public host>&port=<public port>
//!     &encrypt=1&autoconnect=1[&view_only=1][&password=<credential>]
//! ```
//!
//! The page at `<web port>` is the browser viewer; it connects back to the
//! relay at `host`/`port` over TLS (`encrypt=1`).  Query values are
//! form-encoded by the `url` crate, so credentials never break the URL.

use std::fmt;

use deskshare_core::EndpointDescriptor;
use thiserror::Error;
use url::Url;

use super::config::ViewerConfig;

/// Error building the viewer base URL from configuration.
#[derive(Debug, Error)]
pub enum ViewerUrlError {
    /// Scheme, host, or port do not form a valid URL.
    #[error("invalid viewer URL {url:?}: {source}")]
    Invalid {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The viewer page is only served over `http` or `https`.
    #[error("unsupported viewer scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),
}

/// A composed, browser-ready viewer URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientUrl(Url);

impl ClientUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Value of a query parameter, if present.
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.0
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// The relay port the viewer connects to.
    pub fn public_port(&self) -> Option<u16> {
        self.query_value("port").and_then(|p| p.parse().ok())
    }

    pub fn is_view_only(&self) -> bool {
        self.query_value("view_only").as_deref() == Some("1")
    }
}

impl fmt::Display for ClientUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Builds [`ClientUrl`]s for one viewer configuration.
///
/// The base URL is validated once at construction, so [`ClientUrlBuilder::build`]
/// cannot fail.
#[derive(Debug, Clone)]
pub struct ClientUrlBuilder {
    base: Url,
    public_host: String,
    embed_credential: bool,
}

impl ClientUrlBuilder {
    /// Validates the viewer settings for `public_host`.
    ///
    /// # Errors
    ///
    /// Returns [`ViewerUrlError`] if the scheme is not `http`/`https` or the
    /// settings do not form a valid URL.
    pub fn new(viewer: &ViewerConfig, public_host: &str) -> Result<Self, ViewerUrlError> {
        if !matches!(viewer.scheme.as_str(), "http" | "https") {
            return Err(ViewerUrlError::UnsupportedScheme(viewer.scheme.clone()));
        }
        let text = format!("{}://{}:{}", viewer.scheme, public_host, viewer.web_port);
        let mut base = Url::parse(&text).map_err(|source| ViewerUrlError::Invalid {
            url: text.clone(),
            source,
        })?;
        base.set_path(&viewer.path);

        Ok(Self {
            base,
            public_host: public_host.to_string(),
            embed_credential: viewer.embed_credential,
        })
    }

    /// Composes the URL for a relay on `public_port` serving `descriptor`.
    pub fn build(&self, public_port: u16, descriptor: &EndpointDescriptor) -> ClientUrl {
        let mut url = self.base.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("host", &self.public_host)
                .append_pair("port", &public_port.to_string())
                .append_pair("encrypt", "1")
                .append_pair("autoconnect", "1");
            if descriptor.access_mode().is_view_only() {
                query.append_pair("view_only", "1");
            }
            if self.embed_credential {
                if let Some(credential) = descriptor.credential() {
                    query.append_pair("password", credential);
                }
            }
        }
        ClientUrl(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskshare_core::AccessMode;

    fn builder(viewer: &ViewerConfig) -> ClientUrlBuilder {
        ClientUrlBuilder::new(viewer, "192.168.1.2").unwrap()
    }

    #[test]
    fn test_build_view_only_without_credential() {
        // Arrange
        let d = EndpointDescriptor::new("10.0.0.5", AccessMode::ViewOnly).unwrap();

        // Act
        let url = builder(&ViewerConfig::default()).build(8085, &d);

        // Assert
        assert_eq!(
            url.as_str(),
            "http://192.168.1.2:3000/viewer?host=192.168.1.2&port=8085&encrypt=1&autoconnect=1&view_only=1"
        );
        assert!(url.is_view_only());
        assert_eq!(url.query_value("password"), None);
    }

    #[test]
    fn test_build_full_control_embeds_credential() {
        let d = EndpointDescriptor::new("10.0.0.5", AccessMode::FullControl)
            .unwrap()
            .with_credential("aB3dE9xQ")
            .unwrap();

        let url = builder(&ViewerConfig::default()).build(8090, &d);

        assert!(!url.is_view_only());
        assert_eq!(url.public_port(), Some(8090));
        assert_eq!(url.query_value("password").as_deref(), Some("aB3dE9xQ"));
        assert_eq!(url.query_value("encrypt").as_deref(), Some("1"));
        assert_eq!(url.query_value("autoconnect").as_deref(), Some("1"));
    }

    #[test]
    fn test_build_omits_credential_when_embedding_disabled() {
        let viewer = ViewerConfig {
            embed_credential: false,
            ..ViewerConfig::default()
        };
        let d = EndpointDescriptor::new("10.0.0.5", AccessMode::FullControl)
            .unwrap()
            .with_credential("secret")
            .unwrap();

        let url = builder(&viewer).build(8085, &d);

        assert_eq!(url.query_value("password"), None);
        assert!(!url.as_str().contains("secret"));
    }

    #[test]
    fn test_build_encodes_special_characters_in_credential() {
        let d = EndpointDescriptor::new("10.0.0.5", AccessMode::FullControl)
            .unwrap()
            .with_credential("a&b=c#d")
            .unwrap();

        let url = builder(&ViewerConfig::default()).build(8085, &d);

        assert_eq!(url.query_value("password").as_deref(), Some("a&b=c#d"));
        assert!(!url.as_str().contains("a&b"));
    }

    #[test]
    fn test_custom_scheme_port_and_path() {
        let viewer = ViewerConfig {
            scheme: "https".to_string(),
            web_port: 8443,
            path: "/novnc/vnc.html".to_string(),
            ..ViewerConfig::default()
        };
        let d = EndpointDescriptor::new("10.0.0.5", AccessMode::FullControl).unwrap();

        let url = ClientUrlBuilder::new(&viewer, "share.example.lan").unwrap().build(8085, &d);

        assert!(url
            .as_str()
            .starts_with("https://share.example.lan:8443/novnc/vnc.html?host=share.example.lan&port=8085"));
    }

    #[test]
    fn test_invalid_public_host_is_rejected() {
        let result = ClientUrlBuilder::new(&ViewerConfig::default(), "bad host");
        assert!(matches!(result, Err(ViewerUrlError::Invalid { .. })));
    }

    #[test]
    fn test_unsupported_scheme_is_rejected() {
        let viewer = ViewerConfig {
            scheme: "ftp".to_string(),
            ..ViewerConfig::default()
        };
        let result = ClientUrlBuilder::new(&viewer, "desk.lan");
        assert!(matches!(result, Err(ViewerUrlError::UnsupportedScheme(_))));
    }
}
