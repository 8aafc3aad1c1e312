/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::error::Error as StdError;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE as CONTENT_TYPE_HEADER};
use http::{Method, Uri};
use hyper::client::HttpConnector;
use tracing::trace;

use super::{Transport, TransportFuture, WireRequest, WireResponse, CONTENT_TYPE};
use crate::error::{ConfigurationError, ErrorKind, TransportError};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Signs an outgoing request, typically by adding authorization headers.
///
/// Credential resolution is left to the implementation.
pub trait SignRequest: Debug + Send + Sync {
    /// Signs `request` in place.
    fn sign(&self, request: &mut http::Request<Bytes>) -> Result<(), BoxError>;
}

/// A signer shared by every request sent through one transport.
#[derive(Clone, Debug)]
pub struct SharedSigner(Arc<dyn SignRequest>);

impl SharedSigner {
    /// Wraps `signer`.
    pub fn new(signer: impl SignRequest + 'static) -> Self {
        Self(Arc::new(signer))
    }
}

impl SignRequest for SharedSigner {
    fn sign(&self, request: &mut http::Request<Bytes>) -> Result<(), BoxError> {
        self.0.sign(request)
    }
}

#[derive(Clone, Debug)]
enum Connector {
    Http(hyper::Client<HttpConnector, hyper::Body>),
    #[cfg(feature = "rustls")]
    Https(hyper::Client<hyper_rustls::HttpsConnector<HttpConnector>, hyper::Body>),
}

impl Connector {
    fn request(&self, request: http::Request<hyper::Body>) -> hyper::client::ResponseFuture {
        match self {
            Connector::Http(client) => client.request(request),
            #[cfg(feature = "rustls")]
            Connector::Https(client) => client.request(request),
        }
    }
}

/// A [`Transport`] that POSTs requests to an endpoint with hyper.
///
/// ```no_run
/// use std::time::Duration;
/// use dynowrap::transport::HyperTransport;
///
/// let transport = HyperTransport::builder()
///     .endpoint("http://localhost:8000")
///     .timeout(Duration::from_secs(5))
///     .build()
///     .expect("valid endpoint");
/// ```
#[derive(Clone, Debug)]
pub struct HyperTransport {
    connector: Connector,
    endpoint: Uri,
    signer: Option<SharedSigner>,
    timeout: Option<Duration>,
}

impl HyperTransport {
    /// Starts building a transport.
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let mut http_request = http::Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE_HEADER, HeaderValue::from_static(CONTENT_TYPE))
            .header("x-amz-target", request.operation().target())
            .body(request.body().clone())
            .map_err(|err| {
                TransportError::new(ErrorKind::ClientError, format!("failed to build request: {err}"))
            })?;
        if let Some(signer) = &self.signer {
            signer.sign(&mut http_request).map_err(|err| {
                TransportError::new(ErrorKind::ClientError, format!("failed to sign request: {err}"))
            })?;
        }

        let dispatch = async {
            let response = self
                .connector
                .request(http_request.map(hyper::Body::from))
                .await
                .map_err(|err| TransportError::dispatch(format!("dispatch failure: {err}")))?;
            let status = response.status().as_u16();
            let body = hyper::body::to_bytes(response.into_body())
                .await
                .map_err(|err| {
                    TransportError::dispatch(format!("failed to read response body: {err}"))
                })?;
            trace!(status, len = body.len(), "received response");
            Ok(WireResponse::new(status, body))
        };
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, dispatch)
                .await
                .map_err(|_| TransportError::dispatch(format!("request timed out after {timeout:?}")))?,
            None => dispatch.await,
        }
    }
}

impl Transport for HyperTransport {
    fn call(&self, request: WireRequest) -> TransportFuture {
        let this = self.clone();
        TransportFuture::new(async move { this.send(request).await })
    }
}

/// Builder for [`HyperTransport`].
#[derive(Debug, Default)]
pub struct HyperTransportBuilder {
    endpoint: Option<String>,
    signer: Option<SharedSigner>,
    timeout: Option<Duration>,
}

impl HyperTransportBuilder {
    /// Sets the endpoint every request is sent to.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Signs every request with `signer`.
    pub fn signer(mut self, signer: impl SignRequest + 'static) -> Self {
        self.signer = Some(SharedSigner::new(signer));
        self
    }

    /// Bounds how long one request (including reading the body) may take.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn endpoint_uri(&self) -> Result<Uri, ConfigurationError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| ConfigurationError::new("an endpoint is required"))?;
        endpoint
            .parse::<Uri>()
            .map_err(|err| ConfigurationError::new(format!("invalid endpoint '{endpoint}': {err}")))
    }

    /// Builds a plain HTTP transport.
    pub fn build(self) -> Result<HyperTransport, ConfigurationError> {
        let endpoint = self.endpoint_uri()?;
        Ok(HyperTransport {
            connector: Connector::Http(hyper::Client::builder().build_http()),
            endpoint,
            signer: self.signer,
            timeout: self.timeout,
        })
    }

    /// Builds an HTTPS transport trusting the platform's native roots.
    #[cfg(feature = "rustls")]
    pub fn build_https(self) -> Result<HyperTransport, ConfigurationError> {
        let endpoint = self.endpoint_uri()?;
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        Ok(HyperTransport {
            connector: Connector::Https(hyper::Client::builder().build(https)),
            endpoint,
            signer: self.signer,
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_required_and_validated() {
        let err = HyperTransport::builder().build().unwrap_err();
        assert!(err.message().contains("endpoint is required"));
        let err = HyperTransport::builder()
            .endpoint("http://exa mple.com")
            .build()
            .unwrap_err();
        assert!(err.message().contains("invalid endpoint"));
    }

    #[tokio::test]
    async fn connection_failures_are_transient() {
        // nothing listens on port 9 of the loopback interface
        let transport = HyperTransport::builder()
            .endpoint("http://127.0.0.1:9")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let err = transport
            .call(WireRequest::new(super::super::Operation::GetItem, "{}"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientError);
        assert!(err.is_retryable());
    }
}
