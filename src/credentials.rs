//! Login credentials.
//!
//! A [`Credentials`] value produces the header sent on `POST /sessions` (or on every request for
//! sessionless credentials). Credentials are immutable once built and are held behind an `Arc`
//! by the client that owns them.

use crate::transport::TransportRequest;
use crate::{Error, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use jsonwebtoken::{Algorithm, EncodingKey};
use std::fmt;
use std::io::Write;

pub use crate::multisite::{MultisiteCredentials, MultisiteSignatureVersion};

/// Standard `Authorization` header name.
pub const AUTHORIZATION: &str = "Authorization";

/// Source of the authentication header for a vCloud login.
///
/// Implementations must be cheap to call repeatedly: the header value is read on every login and,
/// for sessionless credentials, on every request.
pub trait Credentials: Send + Sync + fmt::Debug {
    /// Name of the header carrying the credential.
    fn header_name(&self) -> &str {
        AUTHORIZATION
    }

    /// Value of the credential header.
    fn header_value(&self) -> String;

    /// Whether the header alone authenticates a request, without a session.
    fn supports_sessionless(&self) -> bool {
        false
    }

    /// Whether the principal logs in to the provider (System) organization.
    fn is_provider(&self) -> bool {
        false
    }

    /// Request-time hook for credentials whose header depends on the request itself.
    fn sign_request(&self, _request: &mut TransportRequest) -> Result<()> {
        Ok(())
    }
}

/// Username, organization and password, sent as HTTP Basic with `user@org`.
#[derive(Clone)]
pub struct BasicCredentials {
    user: String,
    org: String,
    header: String,
}

impl BasicCredentials {
    pub fn new(user: impl Into<String>, org: impl Into<String>, password: impl AsRef<str>) -> Self {
        let user = user.into();
        let org = org.into();
        let encoded = STANDARD.encode(format!("{}@{}:{}", user, org, password.as_ref()));
        Self {
            user,
            org,
            header: format!("Basic {encoded}"),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn org(&self) -> &str {
        &self.org
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("user", &self.user)
            .field("org", &self.org)
            .finish_non_exhaustive()
    }
}

impl PartialEq for BasicCredentials {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
    }
}

impl Credentials for BasicCredentials {
    fn header_value(&self) -> String {
        self.header.clone()
    }
}

/// An OAuth bearer token for an organization.
#[derive(Clone)]
pub struct BearerCredentials {
    org: String,
    header: String,
}

impl BearerCredentials {
    pub fn new(token: impl AsRef<str>, org: impl Into<String>) -> Self {
        let org = org.into();
        Self {
            header: format!("Bearer {};org={}", token.as_ref(), org),
            org,
        }
    }
}

impl fmt::Debug for BearerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerCredentials")
            .field("org", &self.org)
            .finish_non_exhaustive()
    }
}

impl Credentials for BearerCredentials {
    fn header_value(&self) -> String {
        self.header.clone()
    }
}

/// A SAML token presented with the `SIGN` scheme.
///
/// Bearer tokens are sent as-is; holder-of-key tokens are additionally signed with the
/// holder's RSA key.
#[derive(Clone)]
pub struct SignCredentials {
    org: String,
    header: String,
}

impl SignCredentials {
    const SIGNATURE_ALGORITHM: &'static str = "SHA256withRSA";

    /// Credentials for a SAML bearer token.
    pub fn bearer(saml_token_xml: &str, org: impl Into<String>) -> Result<Self> {
        let org = org.into();
        let token = gzip_base64(saml_token_xml)?;
        Ok(Self {
            header: format!("SIGN token=\"{token}\",org=\"{org}\""),
            org,
        })
    }

    /// Credentials for a SAML holder-of-key token, signed with a PEM-encoded RSA private key.
    pub fn holder_of_key(
        saml_token_xml: &str,
        org: impl Into<String>,
        private_key_pem: &[u8],
    ) -> Result<Self> {
        let org = org.into();
        let token = gzip_base64(saml_token_xml)?;
        let key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| Error::Signing(format!("Invalid private key: {e}")))?;
        let signature = rsa_sha256_base64(saml_token_xml.as_bytes(), &key)?;
        Ok(Self {
            header: format!(
                "SIGN token=\"{token}\",org=\"{org}\",signature=\"{signature}\",signature_alg=\"{}\"",
                Self::SIGNATURE_ALGORITHM
            ),
            org,
        })
    }
}

impl fmt::Debug for SignCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignCredentials")
            .field("org", &self.org)
            .finish_non_exhaustive()
    }
}

impl Credentials for SignCredentials {
    fn header_value(&self) -> String {
        self.header.clone()
    }

    fn supports_sessionless(&self) -> bool {
        true
    }
}

/// Marks wrapped credentials as belonging to a provider (System org) principal.
#[derive(Debug, Clone)]
pub struct ProviderCredentials<C> {
    inner: C,
}

impl<C: Credentials> ProviderCredentials<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Credentials> Credentials for ProviderCredentials<C> {
    fn header_name(&self) -> &str {
        self.inner.header_name()
    }

    fn header_value(&self) -> String {
        self.inner.header_value()
    }

    fn supports_sessionless(&self) -> bool {
        self.inner.supports_sessionless()
    }

    fn is_provider(&self) -> bool {
        true
    }

    fn sign_request(&self, request: &mut TransportRequest) -> Result<()> {
        self.inner.sign_request(request)
    }
}

fn gzip_base64(text: &str) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .map_err(|e| Error::Signing(format!("Failed to compress token: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| Error::Signing(format!("Failed to compress token: {e}")))?;
    Ok(STANDARD.encode(compressed))
}

/// Signs `message` with SHA256withRSA and returns standard base64.
pub(crate) fn rsa_sha256_base64(message: &[u8], key: &EncodingKey) -> Result<String> {
    let url_safe = jsonwebtoken::crypto::sign(message, key, Algorithm::RS256)
        .map_err(|e| Error::Signing(e.to_string()))?;
    let raw = URL_SAFE_NO_PAD
        .decode(url_safe)
        .map_err(|e| Error::Signing(e.to_string()))?;
    Ok(STANDARD.encode(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_basic_header() {
        let creds = BasicCredentials::new("admin", "System", "secret");
        assert_eq!(
            creds.header_value(),
            format!("Basic {}", STANDARD.encode("admin@System:secret"))
        );
        assert_eq!(creds.header_name(), "Authorization");
        assert!(!creds.supports_sessionless());
        assert!(!creds.is_provider());
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn test_bearer_header() {
        let creds = BearerCredentials::new("tok", "acme");
        assert_eq!(creds.header_value(), "Bearer tok;org=acme");
        assert!(!creds.supports_sessionless());
    }

    #[test]
    fn test_sign_bearer_header_round_trips_token() {
        let creds = SignCredentials::bearer("<saml/>", "acme").unwrap();
        let header = creds.header_value();
        assert!(creds.supports_sessionless());
        let encoded = header
            .strip_prefix("SIGN token=\"")
            .and_then(|s| s.strip_suffix("\",org=\"acme\""))
            .unwrap();
        let mut xml = String::new();
        GzDecoder::new(STANDARD.decode(encoded).unwrap().as_slice())
            .read_to_string(&mut xml)
            .unwrap();
        assert_eq!(xml, "<saml/>");
    }

    #[test]
    fn test_provider_wrapper() {
        let creds = ProviderCredentials::new(BasicCredentials::new("admin", "System", "pw"));
        assert!(creds.is_provider());
        assert_eq!(
            creds.header_value(),
            BasicCredentials::new("admin", "System", "pw").header_value()
        );
    }

    #[test]
    fn test_invalid_hok_key_is_signing_error() {
        let err = SignCredentials::holder_of_key("<saml/>", "acme", b"not a key").unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }
}
