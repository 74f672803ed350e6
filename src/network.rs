//! Client for the network (NSX) proxy.
//!
//! The proxy speaks XML and is reached through the session's `nsx` link. Requests reuse the
//! parent session: same security context, so the same auth headers, tenant context and
//! multisite signing. The proxy forwards to NSX managers, so the client gets its own transport
//! with a longer deadline.

use crate::client::VcdClient;
use crate::constants::media_type;
use crate::metadata::RequestMetadata;
use crate::{Response, Result};
use http::Method;
use std::time::Duration;
use url::Url;

/// Lower bound for the network client's request deadline.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(120);

/// Raw XML calls relative to the network proxy root.
///
/// Responses are returned unparsed; the XML is in [`Response::raw_body`].
///
/// # Examples
///
/// ```no_run
/// use vcd_client::VcdClient;
///
/// # async fn example(client: VcdClient) -> Result<(), vcd_client::Error> {
/// let network = client.network()?;
/// let edges = network.get("edges").await?;
/// println!("{}", edges.raw_body);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NetworkClient {
    client: VcdClient,
    root: Url,
}

impl VcdClient {
    /// The network proxy client of this session.
    ///
    /// # Errors
    ///
    /// [`LinkError::Missing`](crate::LinkError::Missing) when the session has no `nsx` link.
    pub fn network(&self) -> Result<NetworkClient> {
        let mut root = self.network_endpoint()?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }

        let mut transport = self.transport_config().clone();
        transport.timeout = transport.timeout.max(NETWORK_TIMEOUT);
        let client = self.derive(self.security_context().clone(), transport, None)?;
        tracing::debug!(root = %root, "Created network client");
        Ok(NetworkClient { client, root })
    }
}

impl NetworkClient {
    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Resolves `path` against the root; absolute hrefs pass through.
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.root.join(path.trim_start_matches('/'))?)
    }

    fn metadata(&self, method: Method, path: &str, content_type: Option<&str>) -> Result<RequestMetadata> {
        let metadata = RequestMetadata::new(method, self.url(path)?)
            .with_accept(media_type::APPLICATION_XML);
        Ok(match content_type {
            Some(content_type) => metadata.with_content_type(content_type),
            None => metadata,
        })
    }

    pub async fn get(&self, path: &str) -> Result<Response<()>> {
        self.client
            .call_bytes(self.metadata(Method::GET, path, None)?, None)
            .await
    }

    pub async fn post(
        &self,
        path: &str,
        content_type: &str,
        body: impl Into<Vec<u8>>,
    ) -> Result<Response<()>> {
        self.client
            .call_bytes(
                self.metadata(Method::POST, path, Some(content_type))?,
                Some(body.into()),
            )
            .await
    }

    pub async fn put(
        &self,
        path: &str,
        content_type: &str,
        body: impl Into<Vec<u8>>,
    ) -> Result<Response<()>> {
        self.client
            .call_bytes(
                self.metadata(Method::PUT, path, Some(content_type))?,
                Some(body.into()),
            )
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Response<()>> {
        self.client
            .call_bytes(self.metadata(Method::DELETE, path, None)?, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::rel;
    use crate::model::{Link, SessionResource};
    use crate::session::{AuthState, SessionInfo};
    use crate::transport::TransportConfig;
    use crate::{Error, SessionError};
    use std::sync::Arc;

    fn client() -> VcdClient {
        VcdClient::builder()
            .endpoint("https://vcd.example.com/api")
            .unwrap()
            .api_version("36.0")
            .unwrap()
            .build()
            .unwrap()
    }

    fn join_session(client: &VcdClient) {
        let resource = SessionResource {
            href: Some("https://vcd.example.com/api/session".into()),
            link: vec![Link::new(
                rel::NSX,
                "https://vcd.example.com/network",
                Some(media_type::APPLICATION_XML),
            )],
            ..SessionResource::default()
        };
        let fallback = Url::parse("https://vcd.example.com/api/session").unwrap();
        client.security_context().replace(AuthState {
            auth_token: Some("tok".into()),
            session: Some(Arc::new(SessionInfo::from_resource(&resource, &fallback).unwrap())),
            ..AuthState::default()
        });
    }

    #[test]
    fn test_requires_session() {
        assert!(matches!(
            client().network(),
            Err(Error::Session(SessionError::NotLoggedIn))
        ));
    }

    #[test]
    fn test_shares_session_with_longer_deadline() {
        let client = client();
        join_session(&client);
        let network = client.network().unwrap();

        assert_eq!(network.root().as_str(), "https://vcd.example.com/network/");
        assert_eq!(
            network.url("/edges/edge-1").unwrap().as_str(),
            "https://vcd.example.com/network/edges/edge-1"
        );
        assert!(Arc::ptr_eq(
            network.client.security_context(),
            client.security_context()
        ));
        assert_eq!(network.client.transport_config().timeout, NETWORK_TIMEOUT);
        assert_eq!(
            client.transport_config().timeout,
            TransportConfig::default().timeout
        );
        assert_eq!(
            network.client.versioned(media_type::APPLICATION_XML),
            media_type::APPLICATION_XML
        );
    }
}
