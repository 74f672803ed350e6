//! Per-request settings for [`VcdClient::call`](crate::VcdClient::call).

use crate::Error;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

/// Metadata for an individual request against an absolute resource URI.
///
/// Unset `accept` and `content_type` fall back to the client's versioned
/// `application/*+json` types.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub method: Method,

    /// Absolute resource URI. vCloud resources are addressed by the hrefs the
    /// server hands out, so there is no base-relative path here.
    pub url: Url,

    /// Media type to request; the client appends the version parameter.
    pub accept: Option<String>,

    /// Media type of the body; the client appends the version parameter.
    pub content_type: Option<String>,

    /// Additional headers for this request.
    pub headers: HeaderMap,

    /// Query parameters, appended in order.
    pub query_params: Vec<(String, String)>,
}

impl RequestMetadata {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            accept: None,
            content_type: None,
            headers: HeaderMap::new(),
            query_params: Vec::new(),
        }
    }

    pub fn with_accept(mut self, media_type: impl Into<String>) -> Self {
        self.accept = Some(media_type.into());
        self
    }

    pub fn with_content_type(mut self, media_type: impl Into<String>) -> Self {
        self.content_type = Some(media_type.into());
        self
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// The URL with query parameters applied.
    pub fn full_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_url_keeps_existing_query() {
        let url = Url::parse("https://vcd/api/admin/org/1?foo=bar").unwrap();
        let metadata = RequestMetadata::new(Method::DELETE, url)
            .with_query_param("force", "true")
            .with_query_param("recursive", "false");
        assert_eq!(
            metadata.full_url().as_str(),
            "https://vcd/api/admin/org/1?foo=bar&force=true&recursive=false"
        );
    }

    #[test]
    fn test_invalid_header_rejected() {
        let url = Url::parse("https://vcd/api").unwrap();
        assert!(RequestMetadata::new(Method::GET, url)
            .with_header("bad header", "x")
            .is_err());
    }
}
