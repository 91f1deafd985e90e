use http::{Request, Response};

#[derive(thiserror::Error, Debug)]
pub enum HttpClientError {
    /// Represents an http transport crate error.
    #[error("HTTP transport error: `{0}`")]
    TransportError(String),
    /// The request exceeded the client's configured timeout.
    #[error("HTTP request timed out: `{0}`")]
    Timeout(String),
    /// Represents an unexpected response.
    #[error("invalid http response: `{0}`")]
    InvalidResponse(String),
}

/// A synchronous trait that defines the internal methods for HTTP clients.
pub trait HttpClient {
    /// A synchronous function sends a request. The method and url are defined inside the Request.
    fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError>;
}

// Accept closures as HttpClient implementations
impl<F> HttpClient for F
where
    F: Fn(Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError>,
{
    fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError> {
        self(req)
    }
}

#[cfg(test)]
pub(crate) mod tests {

    use super::*;

    use mockall::mock;

    // Create a mock for the HttpClient trait using the mock! macro
    mock! {
        pub HttpClient {}

        impl HttpClient for HttpClient {
            fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError>;
        }
    }
}
