//! Helper implementations for sending HTTP requests from the telemetry exporters.
//!
//! The exporters only need to push a request body to a collector and learn
//! whether the transport succeeded. This crate keeps that seam behind the
//! [`HttpClient`] trait so hosts can bring their own client.
use async_trait::async_trait;
use std::fmt::Debug;

#[doc(no_inline)]
pub use bytes::Bytes;
#[doc(no_inline)]
pub use http::{Request, Response};

/// Error returned by an [`HttpClient`] when the request could not be completed.
pub type HttpError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A minimal interface necessary for sending requests over HTTP.
///
/// Users sometime choose HTTP clients that rely on a certain async runtime. This trait allows
/// users to bring their choice of HTTP client.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    /// Send the specified HTTP request with `Bytes` payload.
    ///
    /// Returns the HTTP response including the status code and body. A response
    /// carrying an error status (4xx, 5xx) is still an `Ok`: implementations must
    /// leave status interpretation to the caller.
    ///
    /// Returns an error if it can't connect to the server or the request could not be completed,
    /// e.g. because of a timeout, infinite redirects, or a loss of connection.
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError>;
}

#[cfg(feature = "reqwest")]
mod reqwest {
    use super::{async_trait, Bytes, HttpClient, HttpError, Request, Response};

    #[async_trait]
    impl HttpClient for reqwest::Client {
        async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            #[cfg(feature = "internal-logs")]
            tracing::debug!(name: "ReqwestClient.Send", target: env!("CARGO_PKG_NAME"), uri = %request.uri());
            let request = request.try_into()?;
            let mut response = self.execute(request).await?;
            let headers = std::mem::take(response.headers_mut());
            let mut http_response = Response::builder()
                .status(response.status())
                .body(response.bytes().await?)?;
            *http_response.headers_mut() = headers;

            Ok(http_response)
        }
    }
}

/// Methods to make working with responses from the [`HttpClient`] trait easier.
pub trait ResponseExt: Sized {
    /// Turn a response into an error if the HTTP status does not indicate success (200 - 299).
    fn error_for_status(self) -> Result<Self, HttpError>;
}

impl<T> ResponseExt for Response<T> {
    fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(format!("request failed with status {}", self.status()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_for_status_passes_success() {
        let response = Response::builder().status(204).body(()).unwrap();
        assert!(response.error_for_status().is_ok());
    }

    #[test]
    fn error_for_status_rejects_server_error() {
        let response = Response::builder().status(500).body(()).unwrap();
        let err = response.error_for_status().unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[cfg(feature = "reqwest")]
    #[tokio::test]
    async fn reqwest_client_surfaces_error_status_as_response() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await.unwrap();
            stream
                .write_all(
                    b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 4\r\nconnection: close\r\n\r\nbusy",
                )
                .await
                .unwrap();
        });

        let client = ::reqwest::Client::new();
        let request = Request::post(format!("http://{addr}/v1/traces"))
            .body(Bytes::from_static(b"{}"))
            .unwrap();
        let response = client.send_bytes(request).await.expect("transport succeeds");

        assert_eq!(response.status().as_u16(), 503);
        assert_eq!(response.body().as_ref(), b"busy");
        server.await.unwrap();
    }
}
