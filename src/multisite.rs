//! Multisite request signing.
//!
//! A multisite credential has no fixed header: at login it only announces the `Multisite`
//! auth type, and every outgoing request is then signed individually over its method, path,
//! date and content type.

use crate::credentials::{rsa_sha256_base64, Credentials};
use crate::transport::TransportRequest;
use crate::version::ApiVersion;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{AUTHORIZATION, CONTENT_TYPE, DATE};
use http::HeaderValue;
use jsonwebtoken::EncodingKey;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

/// Auth type placed in the `Authorization` header.
pub const AUTH_TYPE: &str = "Multisite";

/// Signature format, chosen by the API version the client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultisiteSignatureVersion {
    /// Digest-based format used up to API 30.0.
    Legacy,
    /// `v:2.0` format.
    V2,
}

impl MultisiteSignatureVersion {
    pub fn for_api_version(version: ApiVersion) -> Self {
        if version.is_at_most(ApiVersion::LEGACY_MULTISITE_MAX) {
            Self::Legacy
        } else {
            Self::V2
        }
    }
}

/// Credentials of a user acting on behalf of a remote site in a multisite association.
pub struct MultisiteCredentials {
    site_id: Uuid,
    org_id: Uuid,
    user_at_org: String,
    key: EncodingKey,
    version: MultisiteSignatureVersion,
}

impl MultisiteCredentials {
    /// Builds multisite credentials from a PEM-encoded RSA private key (PKCS#1 or PKCS#8).
    pub fn new(
        site_id: Uuid,
        org_id: Uuid,
        user: &str,
        org: &str,
        private_key_pem: &[u8],
        api_version: ApiVersion,
    ) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem).map_err(|e| {
            Error::Signing(format!(
                "Supplied key is not a valid PEM encoded private key: {e}"
            ))
        })?;
        Ok(Self {
            site_id,
            org_id,
            user_at_org: format!("{user}@{org}"),
            key,
            version: MultisiteSignatureVersion::for_api_version(api_version),
        })
    }

    /// Builds the complete `Authorization` value for one request.
    pub fn authorization_header(
        &self,
        date: &str,
        method: &str,
        path: &str,
        content_type: &str,
    ) -> Result<String> {
        let signing_string = signing_string(self.version, date, method, path, content_type);
        let signature = rsa_sha256_base64(signing_string.as_bytes(), &self.key)?;
        Ok(format_header(
            self.version,
            self.site_id,
            self.org_id,
            &signature,
            &self.user_at_org,
        ))
    }
}

impl fmt::Debug for MultisiteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultisiteCredentials")
            .field("site_id", &self.site_id)
            .field("org_id", &self.org_id)
            .field("user", &self.user_at_org)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Credentials for MultisiteCredentials {
    fn header_value(&self) -> String {
        AUTH_TYPE.to_string()
    }

    fn supports_sessionless(&self) -> bool {
        true
    }

    fn sign_request(&self, request: &mut TransportRequest) -> Result<()> {
        let date = httpdate::fmt_http_date(SystemTime::now());
        let content_type = request
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let header = self.authorization_header(
            &date,
            request.method.as_str(),
            request.url.path(),
            &content_type,
        )?;

        let invalid = |e: http::header::InvalidHeaderValue| Error::Signing(e.to_string());
        request
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_str(&header).map_err(invalid)?);
        request
            .headers
            .insert(DATE, HeaderValue::from_str(&date).map_err(invalid)?);
        Ok(())
    }
}

fn signing_string(
    version: MultisiteSignatureVersion,
    date: &str,
    method: &str,
    path: &str,
    content_type: &str,
) -> String {
    match version {
        MultisiteSignatureVersion::Legacy => {
            let digest = STANDARD.encode(Sha256::digest(b""));
            format!(
                "(request-target): {method} {path}\ndate: {date}\ndigest: {digest}\ncontent-length: 0"
            )
        }
        MultisiteSignatureVersion::V2 => {
            format!("(request-target): {method} {path}\ndate: {date}\ncontent-type: {content_type}")
        }
    }
}

fn format_header(
    version: MultisiteSignatureVersion,
    site_id: Uuid,
    org_id: Uuid,
    signature: &str,
    user_at_org: &str,
) -> String {
    match version {
        MultisiteSignatureVersion::Legacy => {
            format!("{AUTH_TYPE} {site_id}:{org_id} {signature}; {user_at_org}")
        }
        MultisiteSignatureVersion::V2 => {
            format!("{AUTH_TYPE} v:2.0; {org_id}@{site_id} {signature}; {user_at_org}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATE: &str = "Tue, 03 Jun 2008 11:05:30 GMT";

    #[test]
    fn test_version_selection() {
        assert_eq!(
            MultisiteSignatureVersion::for_api_version(ApiVersion::new(30, 0)),
            MultisiteSignatureVersion::Legacy
        );
        assert_eq!(
            MultisiteSignatureVersion::for_api_version(ApiVersion::new(31, 0)),
            MultisiteSignatureVersion::V2
        );
    }

    #[test]
    fn test_legacy_signing_string_uses_empty_digest() {
        let s = signing_string(
            MultisiteSignatureVersion::Legacy,
            DATE,
            "GET",
            "/api/org",
            "ignored",
        );
        assert_eq!(
            s,
            "(request-target): GET /api/org\n\
             date: Tue, 03 Jun 2008 11:05:30 GMT\n\
             digest: 47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=\n\
             content-length: 0"
        );
    }

    #[test]
    fn test_v2_signing_string() {
        let s = signing_string(
            MultisiteSignatureVersion::V2,
            DATE,
            "POST",
            "/api/sessions",
            "application/*+json",
        );
        assert_eq!(
            s,
            "(request-target): POST /api/sessions\n\
             date: Tue, 03 Jun 2008 11:05:30 GMT\n\
             content-type: application/*+json"
        );
    }

    #[test]
    fn test_header_templates() {
        let site = Uuid::nil();
        let org = Uuid::from_u128(1);
        assert_eq!(
            format_header(MultisiteSignatureVersion::Legacy, site, org, "c2ln", "bob@acme"),
            format!("Multisite {site}:{org} c2ln; bob@acme")
        );
        assert_eq!(
            format_header(MultisiteSignatureVersion::V2, site, org, "c2ln", "bob@acme"),
            format!("Multisite v:2.0; {org}@{site} c2ln; bob@acme")
        );
    }

    #[test]
    fn test_invalid_pem_rejected() {
        let err = MultisiteCredentials::new(
            Uuid::nil(),
            Uuid::nil(),
            "bob",
            "acme",
            b"-----BEGIN NOTHING-----",
            ApiVersion::new(36, 0),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }
}
