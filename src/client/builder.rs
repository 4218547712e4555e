use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Request as ReqwestRequest, Response as ReqwestResponse};
use tower::{Layer, Service};

use crate::error::WechatError;

use super::wechat_client::{
    WechatClient, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS,
};

type MiddlewareFuture =
    Pin<Box<dyn Future<Output = Result<ReqwestResponse, reqwest::Error>> + Send>>;
pub(crate) type MiddlewareExecutor =
    Arc<dyn Fn(ReqwestRequest) -> MiddlewareFuture + Send + Sync>;

/// Builder for [`WechatClient`]
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use wechat_open_sdk::client::WechatClient;
/// use wechat_open_sdk::middleware::LoggingMiddleware;
///
/// let client = WechatClient::builder()
///     .timeout(Duration::from_secs(30))
///     .with_middleware(LoggingMiddleware::new())
///     .build()
///     .unwrap();
/// assert_eq!(client.base_url(), "https://api.weixin.qq.com");
/// ```
#[must_use]
#[derive(Default)]
pub struct WechatClientBuilder<M = ()> {
    base_url: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    identity: Option<reqwest::Identity>,
    middleware: Option<M>,
}

impl<M> std::fmt::Debug for WechatClientBuilder<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatClientBuilder")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("identity", &self.identity.as_ref().map(|_| "[REDACTED]"))
            .field("middleware", &self.middleware.as_ref().map(|_| ".."))
            .finish()
    }
}

impl<M> WechatClientBuilder<M> {
    /// Default: `https://api.weixin.qq.com`
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Total timeout for every call. Default: 60 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Client certificate presented on mutual-TLS endpoints.
    pub fn identity(mut self, identity: reqwest::Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_middleware<M2>(self, middleware: M2) -> WechatClientBuilder<M2>
    where
        M2: Layer<WechatClient> + Clone + Send + Sync + 'static,
    {
        WechatClientBuilder {
            base_url: self.base_url,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            identity: self.identity,
            middleware: Some(middleware),
        }
    }

    /// Build the client
    ///
    /// # Errors
    /// Returns [`WechatError::Config`] for a base URL without an http(s)
    /// scheme, or when the TLS backend rejects the configuration.
    pub fn build(self) -> Result<WechatClient, WechatError>
    where
        M: Layer<WechatClient> + Clone + Send + Sync + 'static,
        M::Service: Service<ReqwestRequest, Response = ReqwestResponse, Error = reqwest::Error>
            + Clone
            + Send
            + Sync
            + 'static,
        <M::Service as Service<ReqwestRequest>>::Future: Send + 'static,
    {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(WechatError::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                base_url
            )));
        }

        reqwest::Url::parse(&base_url).map_err(|e| {
            WechatError::Config(format!("invalid base_url {}: {}", base_url, e))
        })?;

        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let connect_timeout = self
            .connect_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));

        let mut http = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout);

        if let Some(identity) = self.identity {
            http = with_identity(http, identity)?;
        }

        let http = http
            .build()
            .map_err(|e| WechatError::Config(format!("failed to build HTTP client: {}", e)))?;

        let mut client = WechatClient::new(http, base_url.trim_end_matches('/').to_string());

        if let Some(middleware) = self.middleware {
            let service = middleware.layer(client.clone());
            let executor = make_middleware_executor(service);
            client = client.with_middleware_executor(executor);
        }

        Ok(client)
    }
}

#[cfg(feature = "rustls-tls")]
fn with_identity(
    builder: reqwest::ClientBuilder,
    identity: reqwest::Identity,
) -> Result<reqwest::ClientBuilder, WechatError> {
    Ok(builder.use_rustls_tls().identity(identity))
}

#[cfg(all(feature = "native-tls", not(feature = "rustls-tls")))]
fn with_identity(
    builder: reqwest::ClientBuilder,
    identity: reqwest::Identity,
) -> Result<reqwest::ClientBuilder, WechatError> {
    Ok(builder.identity(identity))
}

#[cfg(not(any(feature = "rustls-tls", feature = "native-tls")))]
fn with_identity(
    _builder: reqwest::ClientBuilder,
    _identity: reqwest::Identity,
) -> Result<reqwest::ClientBuilder, WechatError> {
    Err(WechatError::Config(
        "client certificates require the rustls-tls or native-tls feature".to_string(),
    ))
}

/// Load a client identity from a PEM certificate and its PKCS#8 private key.
pub fn identity_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<reqwest::Identity, WechatError> {
    load_identity(cert_pem, key_pem)
        .map_err(|e| WechatError::Config(format!("invalid client certificate: {}", e)))
}

#[cfg(feature = "rustls-tls")]
fn load_identity(cert_pem: &[u8], key_pem: &[u8]) -> Result<reqwest::Identity, reqwest::Error> {
    let mut pem = Vec::with_capacity(cert_pem.len() + key_pem.len() + 1);
    pem.extend_from_slice(key_pem);
    pem.push(b'\n');
    pem.extend_from_slice(cert_pem);
    reqwest::Identity::from_pem(&pem)
}

#[cfg(all(feature = "native-tls", not(feature = "rustls-tls")))]
fn load_identity(cert_pem: &[u8], key_pem: &[u8]) -> Result<reqwest::Identity, reqwest::Error> {
    reqwest::Identity::from_pkcs8_pem(cert_pem, key_pem)
}

fn make_middleware_executor<S>(service: S) -> MiddlewareExecutor
where
    S: Service<ReqwestRequest, Response = ReqwestResponse, Error = reqwest::Error>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    let service = Arc::new(service);

    Arc::new(move |request: ReqwestRequest| {
        let mut service = (*service).clone();
        Box::pin(async move { service.call(request).await })
    })
}
