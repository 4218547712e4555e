use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use log::{log, Level};
use reqwest::{Request, Response, Url};
use tower::{Layer, Service};

const REDACTED: &str = "[REDACTED]";

/// Query parameters that are never written to the log.
const SENSITIVE_PARAMS: &[&str] = &[
    "access_token",
    "component_access_token",
    "authorizer_access_token",
    "authorizer_refresh_token",
    "component_verify_ticket",
    "component_appsecret",
    "pre_auth_code",
    "code",
    "appsecret",
    "secret",
    "session_key",
    "ticket",
];

/// Logs one line per request and one per response at a configurable level.
///
/// Only the method, path, redacted query and body length are logged;
/// bodies themselves are not.
#[derive(Debug, Clone, Copy)]
pub struct LoggingMiddleware {
    level: Level,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self { level: Level::Info }
    }

    /// Emit at `level` instead of `Info`.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for LoggingMiddleware {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            level: self.level,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
    level: Level,
}

fn is_sensitive(name: &str) -> bool {
    SENSITIVE_PARAMS.iter().any(|s| name.eq_ignore_ascii_case(s))
}

/// Path and query of `url` with sensitive parameter values replaced.
pub(crate) fn redacted_target(url: &Url) -> String {
    let mut target = url.path().to_string();
    let mut pairs = url.query_pairs().peekable();
    if pairs.peek().is_none() {
        return target;
    }

    let query: Vec<String> = pairs
        .map(|(name, value)| {
            if is_sensitive(&name) {
                format!("{}={}", name, REDACTED)
            } else {
                format!("{}={}", name, value)
            }
        })
        .collect();
    target.push('?');
    target.push_str(&query.join("&"));
    target
}

impl<S> Service<Request> for LoggingService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: std::fmt::Display + Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let level = self.level;
        let method = req.method().clone();
        let target = redacted_target(req.url());
        let body_len = req
            .body()
            .and_then(|b| b.as_bytes())
            .map(<[u8]>::len)
            .unwrap_or(0);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            log!(level, "[wechat] --> {} {} ({} bytes)", method, target, body_len);

            let start = Instant::now();
            match inner.call(req).await {
                Ok(response) => {
                    let status = response.status();
                    log!(
                        level,
                        "[wechat] <-- {} {} {} {} ({:?})",
                        method,
                        target,
                        status.as_u16(),
                        status.canonical_reason().unwrap_or(""),
                        start.elapsed()
                    );
                    Ok(response)
                }
                Err(e) => {
                    log!(
                        Level::Warn,
                        "[wechat] <-- {} {} failed after {:?}: {}",
                        method,
                        target,
                        start.elapsed(),
                        e
                    );
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::WechatClient;

    #[test]
    fn test_component_tokens_are_redacted() {
        let url = Url::parse(
            "https://api.weixin.qq.com/cgi-bin/component/api_query_auth?component_access_token=AT%2B1&lang=zh_CN",
        )
        .unwrap();
        assert_eq!(
            redacted_target(&url),
            "/cgi-bin/component/api_query_auth?component_access_token=[REDACTED]&lang=zh_CN"
        );
    }

    #[test]
    fn test_oauth_code_and_ticket_are_redacted() {
        let url = Url::parse(
            "https://api.weixin.qq.com/sns/oauth2/component/access_token?appid=wxa&code=C&grant_type=authorization_code&Ticket=T",
        )
        .unwrap();
        let target = redacted_target(&url);
        assert!(target.contains("appid=wxa"));
        assert!(target.contains("code=[REDACTED]"));
        assert!(target.contains("Ticket=[REDACTED]"));
        assert!(!target.contains("=C&"));
    }

    #[test]
    fn test_target_without_query() {
        let url = Url::parse("https://api.mch.weixin.qq.com/pay/unifiedorder").unwrap();
        assert_eq!(redacted_target(&url), "/pay/unifiedorder");
    }

    #[tokio::test]
    async fn test_layer_passes_response_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/ticket/getticket"))
            .and(query_param("access_token", "secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0,
                "ticket": "T",
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WechatClient::builder()
            .base_url(server.uri())
            .with_middleware(LoggingMiddleware::new().level(Level::Debug))
            .build()
            .unwrap();

        let value: serde_json::Value = client
            .get_json(
                "/cgi-bin/ticket/getticket",
                &[("access_token", "secret-token"), ("type", "jsapi")],
            )
            .await
            .unwrap();
        assert_eq!(value["ticket"], "T");
    }
}
