use std::time::Duration;

use http::Response as HttpResponse;
use http::{Request, Response};
use reqwest::blocking::{Client, Response as BlockingResponse};

use crate::http_client::{HttpClient as ApiHttpClient, HttpClientError as ApiHttpClientError};
use crate::parameters::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

/// Blocking reqwest transport used by the request pipeline and the CLI.
///
/// The request timeout bounds every call made through this client, the
/// credential renewal call included, so a renewal can never leave the
/// coordinator stuck waiting on the network.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, HttpBuildError> {
        Self::with_timeouts(DEFAULT_REQUEST_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_timeouts(timeout: Duration, conn_timeout: Duration) -> Result<Self, HttpBuildError> {
        let builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_native_certs(true)
            .timeout(timeout)
            .connect_timeout(conn_timeout);

        let client = builder
            .build()
            .map_err(|err| HttpBuildError::ClientBuilder(err.to_string()))?;

        Ok(Self { client })
    }

    fn send(&self, request: Request<Vec<u8>>) -> Result<HttpResponse<Vec<u8>>, HttpResponseError> {
        let req = self
            .client
            .request(request.method().into(), request.uri().to_string().as_str())
            .headers(request.headers().clone())
            .body(request.body().to_vec());

        let res = req.send().map_err(|err| {
            if err.is_timeout() {
                HttpResponseError::Timeout(err.to_string())
            } else {
                HttpResponseError::TransportError(err.to_string())
            }
        })?;

        try_build_response(res)
    }
}

fn try_build_response(res: BlockingResponse) -> Result<HttpResponse<Vec<u8>>, HttpResponseError> {
    let status = res.status();
    let version = res.version();

    let body: Vec<u8> = res
        .bytes()
        .map_err(|err| HttpResponseError::ReadingResponse(err.to_string()))?
        .into();

    let response = http::Response::builder()
        .status(status)
        .version(version)
        .body(body)
        .map_err(|err| HttpResponseError::BuildingResponse(err.to_string()))?;

    Ok(response)
}

impl ApiHttpClient for HttpClient {
    fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, ApiHttpClientError> {
        let response = self.send(req)?;

        Ok(response)
    }
}

impl From<HttpResponseError> for ApiHttpClientError {
    fn from(err: HttpResponseError) -> Self {
        match err {
            HttpResponseError::TransportError(msg) => ApiHttpClientError::TransportError(msg),
            HttpResponseError::Timeout(msg) => ApiHttpClientError::Timeout(msg),
            HttpResponseError::BuildingResponse(msg) | HttpResponseError::ReadingResponse(msg) => {
                ApiHttpClientError::InvalidResponse(msg)
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HttpBuildError {
    #[error("could not build the http client: {0}")]
    ClientBuilder(String),
}

#[derive(thiserror::Error, Debug)]
enum HttpResponseError {
    #[error("could read response body: {0}")]
    ReadingResponse(String),
    #[error("could build response: {0}")]
    BuildingResponse(String),
    #[error("http transport error: `{0}`")]
    TransportError(String),
    #[error("http request timed out: `{0}`")]
    Timeout(String),
}
