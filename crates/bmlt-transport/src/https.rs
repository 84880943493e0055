//! reqwest-backed [`Gateway`] over HTTPS.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bmlt_protocol::Operation;

use reqwest::Client as HttpClient;
use reqwest::header::{COOKIE, SET_COOKIE};
use tracing::{debug, error, trace, warn};

use crate::config::{GatewayConfig, TlsVersion};
use crate::error::{TransportError, TransportResult};
use crate::gateway::{BoxFuture, Credential, Gateway, GatewayRequest, Payload};
use crate::metrics::{AtomicGatewayMetrics, GatewayMetrics};
use crate::uri::RootUri;

/// Environment variable that must be set before certificate validation can
/// be turned off
const INSECURE_TLS_ENV_VAR: &str = "BMLT_ALLOW_INSECURE_TLS";

/// HTTPS gateway to one Root Server
#[derive(Clone)]
pub struct HttpsGateway {
    root: RootUri,
    config: GatewayConfig,
    http_client: HttpClient,
    metrics: Arc<AtomicGatewayMetrics>,
}

impl fmt::Debug for HttpsGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpsGateway")
            .field("root", &self.root.as_str())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpsGateway {
    /// Validate the root URI and build the HTTP client.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InsecureUri`] / [`TransportError::InvalidUri`]
    ///   from [`RootUri::parse`]
    /// - [`TransportError::ConfigurationError`] if the client cannot be built
    pub fn new(root_uri: &str, config: GatewayConfig) -> TransportResult<Self> {
        let root = RootUri::parse(root_uri, &config.tls)?;
        Self::with_root(root, config)
    }

    /// Build a gateway for an already validated root.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConfigurationError`] if the client cannot be built.
    pub fn with_root(root: RootUri, config: GatewayConfig) -> TransportResult<Self> {
        let http_client = build_client(&config)?;
        debug!(root = %root, "HTTPS gateway ready");
        Ok(Self {
            root,
            config,
            http_client,
            metrics: Arc::new(AtomicGatewayMetrics::new()),
        })
    }

    /// Gateway configuration
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn execute(&self, request: GatewayRequest) -> TransportResult<Payload> {
        let started = Instant::now();
        let result = self.send(&request).await;
        let latency_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

        match &result {
            Ok((_, bytes)) => self.metrics.record_success(*bytes, latency_us),
            Err(err) => {
                self.metrics.record_failure(latency_us);
                warn!(operation = %request.operation, error = %err, "Root Server request failed");
            }
        }
        result.map(|(payload, _)| payload)
    }

    async fn send(&self, request: &GatewayRequest) -> TransportResult<(Payload, usize)> {
        let operation = request.operation;
        let url = self.root.endpoint(operation)?;

        // Parameters may carry a password; only their count is logged
        debug!(
            %operation,
            path = url.path(),
            params = request.params.len(),
            authenticated = request.credential.is_some(),
            "Sending Root Server request"
        );

        let mut builder = self.http_client.get(url).query(request.params.as_slice());
        if let Some(credential) = &request.credential {
            builder = builder.header(COOKIE, credential.expose_secret());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let timeout = request.timeout.unwrap_or(self.config.timeout.request);
        let response = builder
            .send()
            .await
            .map_err(|e| classify(operation, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                operation,
                status: status.as_u16(),
            });
        }

        if let (Some(limit), Some(length)) = (self.config.max_response_size, response.content_length())
        {
            let size = usize::try_from(length).unwrap_or(usize::MAX);
            if size > limit {
                return Err(TransportError::ResponseTooLarge { size, limit });
            }
        }

        let credential = Credential::from_set_cookie(
            response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );

        let body = response
            .text()
            .await
            .map_err(|e| classify(operation, timeout, e))?;
        if let Some(limit) = self.config.max_response_size
            && body.len() > limit
        {
            return Err(TransportError::ResponseTooLarge {
                size: body.len(),
                limit,
            });
        }

        trace!(%operation, bytes = body.len(), "Root Server response received");
        let size = body.len();
        Ok((Payload::decode(&body).with_credential(credential), size))
    }
}

impl Gateway for HttpsGateway {
    fn root_uri(&self) -> &RootUri {
        &self.root
    }

    fn request(&self, request: GatewayRequest) -> BoxFuture<'_, TransportResult<Payload>> {
        Box::pin(self.execute(request))
    }

    fn metrics(&self) -> GatewayMetrics {
        self.metrics.snapshot()
    }
}

fn build_client(config: &GatewayConfig) -> TransportResult<HttpClient> {
    // Explicit rustls; cargo features are additive and another crate may pull native-tls
    let mut client_builder = HttpClient::builder()
        .use_rustls_tls()
        .timeout(config.timeout.request)
        .connect_timeout(config.timeout.connect)
        .user_agent(config.user_agent.clone());

    client_builder = match config.tls.min_version {
        TlsVersion::Tls12 => client_builder.min_tls_version(reqwest::tls::Version::TLS_1_2),
        TlsVersion::Tls13 => client_builder.min_tls_version(reqwest::tls::Version::TLS_1_3),
    };

    if config.tls.is_insecure() {
        if std::env::var(INSECURE_TLS_ENV_VAR).is_err() {
            error!(
                "SECURITY: Certificate validation disabled but {} not set. \
                 Keeping validate_certificates=true. Set {}=1 to allow insecure TLS.",
                INSECURE_TLS_ENV_VAR, INSECURE_TLS_ENV_VAR
            );
        } else {
            warn!(
                "SECURITY WARNING: TLS certificate validation is DISABLED. \
                 Only use this against a local test server."
            );
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }
    }

    client_builder
        .build()
        .map_err(|e| TransportError::ConfigurationError(e.to_string()))
}

fn classify(operation: Operation, timeout: Duration, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::RequestTimeout { operation, timeout };
    }
    if err.is_decode() || err.is_body() {
        return TransportError::MalformedPayload(err.to_string());
    }

    let detail = error_chain(&err);
    let lowered = detail.to_ascii_lowercase();
    if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("handshake") {
        TransportError::Tls(detail)
    } else {
        TransportError::ConnectionFailed(detail)
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}
