use std::sync::Arc;

use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::ApiError;
use crate::http_client::{HttpClient, HttpClientError};
use crate::renewal::{RenewalCoordinator, RenewalError};
use crate::store::CredentialStore;
use crate::token::AccessToken;

const REFRESH_PATH: &str = "auth/token/refresh/";

/// The outbound call's method, url, body and headers, retained only long
/// enough to be replayed once after a successful renewal.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    body: Option<Vec<u8>>,
    headers: HeaderMap,
}

impl RequestDescriptor {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn post_json(url: Url, body: Vec<u8>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self {
            method: Method::POST,
            url,
            body: Some(body),
            headers,
        }
    }

    fn build(&self, bearer: Option<&AccessToken>) -> Result<Request<Vec<u8>>, ApiError> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str());
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|err| ApiError::Request(err.to_string()))?;
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder
            .body(self.body.clone().unwrap_or_default())
            .map_err(|err| ApiError::Request(err.to_string()))
    }
}

/// The authenticated request pipeline.
///
/// Every request sent through [`ApiClient::get`] or [`ApiClient::post_json`]
/// is decorated with the stored access token as a bearer credential. A 401
/// on a decorated request triggers a single renewal through the
/// [`RenewalCoordinator`], after which the original request is replayed
/// exactly once. All other statuses pass through to the caller untouched.
pub struct ApiClient<C, S> {
    http: Arc<C>,
    base_url: Url,
    store: Arc<S>,
    renewal: RenewalCoordinator<C, S>,
}

impl<C, S> ApiClient<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    pub fn new(http: Arc<C>, base_url: Url, store: Arc<S>) -> Result<Self, ApiError> {
        let refresh_url = base_url
            .join(REFRESH_PATH)
            .map_err(|err| ApiError::Request(err.to_string()))?;
        let renewal = RenewalCoordinator::new(http.clone(), refresh_url, store.clone());
        Ok(Self {
            http,
            base_url,
            store,
            renewal,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::Request(err.to_string()))
    }

    /// Sends an authenticated GET, renewing the access token once on 401.
    pub fn get(&self, path: &str) -> Result<Response<Vec<u8>>, ApiError> {
        let descriptor = RequestDescriptor::get(self.endpoint(path)?);
        self.execute(descriptor)
    }

    /// Sends an authenticated JSON POST, renewing the access token once on 401.
    pub fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response<Vec<u8>>, ApiError> {
        let body = serde_json::to_vec(body).map_err(|err| ApiError::Request(err.to_string()))?;
        let descriptor = RequestDescriptor::post_json(self.endpoint(path)?, body);
        self.execute(descriptor)
    }

    /// Sends a JSON POST without a bearer credential and without the renewal
    /// protocol. Used for login and registration, where a 401 means the
    /// submitted credentials were wrong, not that the session expired.
    pub fn post_json_anonymous<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response<Vec<u8>>, ApiError> {
        let body = serde_json::to_vec(body).map_err(|err| ApiError::Request(err.to_string()))?;
        let descriptor = RequestDescriptor::post_json(self.endpoint(path)?, body);
        let request = descriptor.build(None)?;
        self.http.send(request).map_err(map_transport_error)
    }

    /// Invalidates the renewal generation. Must be called before the store
    /// is cleared on logout so a racing renewal cannot repopulate it.
    pub fn invalidate_session(&self) -> Result<(), ApiError> {
        self.renewal
            .invalidate()
            .map_err(|_| ApiError::Unauthenticated)
    }

    fn execute(&self, descriptor: RequestDescriptor) -> Result<Response<Vec<u8>>, ApiError> {
        // The epoch is snapshotted before the token so a renewal settling in
        // between is detected as already-settled rather than re-triggered.
        let epoch = self.renewal.epoch().map_err(|_| ApiError::Unauthenticated)?;
        let bearer = self
            .store
            .get()?
            .map(|session| session.tokens().access().clone());

        let request = descriptor.build(bearer.as_ref())?;
        let response = self.http.send(request).map_err(map_transport_error)?;

        if response.status() != StatusCode::UNAUTHORIZED || bearer.is_none() {
            return Ok(response);
        }

        debug!(url = %descriptor.url, "authorization failure, attempting credential renewal");
        let access = match self.renewal.renew(epoch) {
            Ok(access) => access,
            Err(RenewalError::Timeout) => return Err(ApiError::RenewalTimeout),
            Err(err) => {
                debug!(error = %err, "credential renewal failed");
                return Err(ApiError::Unauthenticated);
            }
        };

        // Single replay; a second authorization failure is terminal.
        let replay = descriptor.build(Some(&access))?;
        let response = self.http.send(replay).map_err(map_transport_error)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(url = %descriptor.url, "replayed request rejected, giving up");
            return Err(ApiError::Unauthenticated);
        }
        Ok(response)
    }
}

fn map_transport_error(err: HttpClientError) -> ApiError {
    match err {
        HttpClientError::TransportError(msg) | HttpClientError::Timeout(msg) => {
            ApiError::Network(msg)
        }
        HttpClientError::InvalidResponse(msg) => ApiError::InvalidResponse(msg),
    }
}
