//! Outbound transport — sends signed requests with a bounded wait

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Endpoint;
use crate::credentials::CredentialProvider;
use crate::error::{GatewayError, GatewayResult};
use crate::signing::{RequestDraft, SignedRequest, sign};

/// Status, lower-cased headers and raw body of a downstream reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// A reply with a JSON body and matching content type.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx reply into [`GatewayError::Downstream`], keeping the body.
    pub fn error_for_status(self) -> GatewayResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(GatewayError::Downstream {
            status: self.status,
            content_type: self.content_type().map(str::to_string),
            body: self.body,
        })
    }
}

/// Delivers a signed request and waits at most `timeout` for the full reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: SignedRequest, timeout: Duration) -> GatewayResult<TransportResponse>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("architect-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn execute(
        &self,
        method: reqwest::Method,
        request: SignedRequest,
    ) -> Result<TransportResponse, reqwest::Error> {
        let mut builder = self.client.request(method, request.url());

        // reqwest derives Host from the URL; the signed value is identical.
        for (name, value) in request.headers() {
            if name == "host" {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: SignedRequest, timeout: Duration) -> GatewayResult<TransportResponse> {
        let url = request.url();
        debug!("Sending {} {}", request.method(), url);

        // The method is covered by the signature and is never substituted.
        let method = reqwest::Method::from_bytes(request.method().as_bytes()).map_err(|_| {
            GatewayError::Transport(format!("invalid HTTP method '{}'", request.method()))
        })?;

        match tokio::time::timeout(timeout, self.execute(method, request)).await {
            Err(_) => {
                warn!(url = %url, timeout_ms = timeout.as_millis(), "Downstream call timed out");
                Err(GatewayError::Timeout(timeout))
            }
            Ok(Err(e)) if e.is_timeout() => Err(GatewayError::Timeout(timeout)),
            Ok(Err(e)) => {
                warn!(url = %url, "Downstream call failed: {}", e);
                Err(GatewayError::Transport(e.to_string()))
            }
            Ok(Ok(response)) => {
                debug!(url = %url, status = response.status, bytes = response.body.len(), "Downstream replied");
                Ok(response)
            }
        }
    }
}

/// Resolve an identity, sign `draft` for `endpoint` and send it.
///
/// Non-2xx replies come back as [`GatewayError::Downstream`].
pub async fn send_signed(
    transport: &dyn Transport,
    credentials: &dyn CredentialProvider,
    endpoint: &Endpoint,
    draft: RequestDraft,
    timeout: Duration,
) -> GatewayResult<TransportResponse> {
    let identity = credentials.resolve().await?;
    let signed = sign(draft, &endpoint.service, &endpoint.region, &identity).inspect_err(|e| {
        warn!(access_key_id = %identity.access_key_id(), "Signing failed: {}", e);
    })?;
    transport.send(signed, timeout).await?.error_for_status()
}

#[cfg(any(test, feature = "test-support"))]
pub use recording::RecordingTransport;

#[cfg(any(test, feature = "test-support"))]
mod recording {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Responder = Box<dyn Fn(&SignedRequest) -> GatewayResult<TransportResponse> + Send + Sync>;

    /// In-memory transport that records every request it is handed.
    ///
    /// Tracks how many calls overlap so tests can assert serialization.
    pub struct RecordingTransport {
        responder: Responder,
        delay: Duration,
        requests: Mutex<Vec<SignedRequest>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingTransport {
        pub fn new(
            responder: impl Fn(&SignedRequest) -> GatewayResult<TransportResponse> + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        /// Always reply with `response`.
        pub fn replying(response: TransportResponse) -> Self {
            Self::new(move |_| Ok(response.clone()))
        }

        /// Hold every call for `delay` before replying.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn requests(&self) -> Vec<SignedRequest> {
            self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
        }

        /// Highest number of calls that were ever in progress at once.
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: SignedRequest, timeout: Duration) -> GatewayResult<TransportResponse> {
            self.requests
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(request.clone());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(&self.in_flight);
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::timeout(timeout, tokio::time::sleep(self.delay))
                    .await
                    .map_err(|_| GatewayError::Timeout(timeout))?;
            }
            (self.responder)(&request)
        }
    }
}
