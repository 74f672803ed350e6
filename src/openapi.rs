//! Client for the `/cloudapi` OpenAPI surface.
//!
//! The OpenAPI client rides on its parent [`VcdClient`]: same transport, same retry and
//! re-authentication behavior, same security context. Only the root and the media types differ.

use crate::client::VcdClient;
use crate::constants::{media_type, path, ACCESS_TOKEN_HEADER};
use crate::credentials::Credentials;
use crate::error::SessionError;
use crate::metadata::RequestMetadata;
use crate::model::Task;
use crate::session::AuthState;
use crate::{Error, Response, Result};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use url::Url;

/// OpenAPI calls relative to the `/cloudapi` root.
///
/// # Examples
///
/// ```no_run
/// use serde_json::Value;
/// use vcd_client::VcdClient;
///
/// # async fn example(client: VcdClient) -> Result<(), vcd_client::Error> {
/// let openapi = client.openapi()?;
/// let orgs = openapi.get::<Value>("1.0.0/orgs").await?;
/// println!("{} (links: {:?})", orgs.data, orgs.links());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OpenApiClient {
    client: VcdClient,
    root: Url,
}

impl VcdClient {
    /// The OpenAPI client of this session.
    pub fn openapi(&self) -> Result<OpenApiClient> {
        let mut root = self.openapi_endpoint()?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        Ok(OpenApiClient {
            client: self.clone(),
            root,
        })
    }
}

impl OpenApiClient {
    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Resolves `path` against the root; absolute hrefs pass through.
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.root.join(path.trim_start_matches('/'))?)
    }

    fn metadata(&self, method: Method, path: &str) -> Result<RequestMetadata> {
        Ok(RequestMetadata::new(method, self.url(path)?)
            .with_accept(media_type::APPLICATION_JSON)
            .with_content_type(media_type::APPLICATION_JSON))
    }

    pub async fn get<Res: DeserializeOwned>(&self, path: &str) -> Result<Response<Res>> {
        self.client
            .call::<(), Res>(self.metadata(Method::GET, path)?, None)
            .await
    }

    pub async fn post<Req, Res>(&self, path: &str, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.client
            .call(self.metadata(Method::POST, path)?, Some(body))
            .await
    }

    /// POST whose answer is either empty or a `202` with a task `Location`.
    pub async fn post_raw<Req: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Response<()>> {
        self.client
            .call_raw(self.metadata(Method::POST, path)?, Some(body))
            .await
    }

    pub async fn put<Req, Res>(&self, path: &str, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.client
            .call(self.metadata(Method::PUT, path)?, Some(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Response<()>> {
        self.client
            .call_raw::<()>(self.metadata(Method::DELETE, path)?, None)
            .await
    }

    /// The task a `202 Accepted` response points at, or `None` for any other response.
    pub async fn task<T>(&self, response: &Response<T>) -> Result<Option<Task>> {
        match response.task_href() {
            Some(href) => Ok(Some(
                self.client
                    .get_typed::<Task>(href, media_type::TASK)
                    .await?
                    .data,
            )),
            None => Ok(None),
        }
    }

    /// Creates a session through the OpenAPI and installs its JWT.
    ///
    /// Provider credentials log in at `1.0.0/sessions/provider`, others at `1.0.0/sessions`.
    pub async fn login(&self, credentials: impl Credentials + 'static) -> Result<()> {
        let credentials: Arc<dyn Credentials> = Arc::new(credentials);
        let path = if credentials.is_provider() {
            path::OPENAPI_PROVIDER_SESSIONS
        } else {
            path::OPENAPI_SESSIONS
        };
        let metadata = self.metadata(Method::POST, path)?;
        tracing::debug!(url = %metadata.url, "Logging in through OpenAPI");

        let security = self.client.security_context();
        let current = security.snapshot();
        let mut request = self.client.build_request(
            Method::POST,
            metadata.url.clone(),
            &AuthState {
                tenant_context: current.tenant_context.clone(),
                ..Default::default()
            },
            Some(&metadata),
            None,
        )?;
        let name = HeaderName::try_from(credentials.header_name())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(credentials.header_value())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        request.headers.insert(name, value);
        credentials.sign_request(&mut request)?;

        let response = self.client.send_once(request, StatusCode::OK).await?;
        let jwt = response
            .header(ACCESS_TOKEN_HEADER)
            .filter(|v| !v.is_empty())
            .ok_or(SessionError::MissingAuthToken)?
            .to_string();

        tracing::info!(provider = credentials.is_provider(), "Logged in through OpenAPI");
        security.update(|state| {
            state.credentials = Some(credentials);
            state.jwt = Some(jwt);
            state.auth_context = None;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_falls_back_to_cloudapi() {
        let client = VcdClient::builder()
            .endpoint("https://vcd.example.com/api")
            .unwrap()
            .build()
            .unwrap();
        let openapi = client.openapi().unwrap();
        assert_eq!(openapi.root().as_str(), "https://vcd.example.com/cloudapi/");
        assert_eq!(
            openapi.url("/1.0.0/orgs").unwrap().as_str(),
            "https://vcd.example.com/cloudapi/1.0.0/orgs"
        );
        assert_eq!(
            openapi.url("https://other/cloudapi/1.0.0/x").unwrap().as_str(),
            "https://other/cloudapi/1.0.0/x"
        );
    }
}
