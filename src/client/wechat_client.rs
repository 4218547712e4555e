//! WeChat HTTP Client
//!
//! One transport for every outbound call: JSON endpoints on
//! `api.weixin.qq.com` and XML endpoints on `api.mch.weixin.qq.com`.
//! WeChat reports business failures inside a 200 response, so every body is
//! classified before it is handed back (see [`super::response`]).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower::Service;

use super::builder::{MiddlewareExecutor, WechatClientBuilder};
use super::response::{classify_json, classify_xml, decode_json, XmlResponse};
use crate::error::{HttpError, WechatError};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.weixin.qq.com";
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

type MiddlewareFuture =
    Pin<Box<dyn Future<Output = Result<reqwest::Response, reqwest::Error>> + Send>>;

/// WeChat API Client
///
/// Cheap to clone; clones share the connection pool and middleware.
/// Dropping a returned future cancels the call.
#[derive(Clone)]
pub struct WechatClient {
    http: Client,
    base_url: String,
    call_timeout: Option<Duration>,
    middleware_executor: Option<MiddlewareExecutor>,
}

impl std::fmt::Debug for WechatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatClient")
            .field("base_url", &self.base_url)
            .field("call_timeout", &self.call_timeout)
            .field(
                "middleware_executor",
                &self.middleware_executor.as_ref().map(|_| ".."),
            )
            .finish_non_exhaustive()
    }
}

impl WechatClient {
    pub fn builder() -> WechatClientBuilder {
        WechatClientBuilder::default()
    }

    pub(crate) fn new(http: Client, base_url: String) -> Self {
        Self {
            http,
            base_url,
            call_timeout: None,
            middleware_executor: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A handle whose calls use `timeout` instead of the client-level one.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut client = self.clone();
        client.call_timeout = Some(timeout);
        client
    }

    /// Returns the underlying [`reqwest::Client`] for raw HTTP requests.
    ///
    /// Note: requests made through this client bypass the middleware pipeline
    /// and response classification.
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn with_middleware_executor(mut self, executor: MiddlewareExecutor) -> Self {
        self.middleware_executor = Some(executor);
        self
    }

    pub(crate) async fn send_request(
        &self,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, reqwest::Error> {
        if let Some(executor) = &self.middleware_executor {
            (executor)(request).await
        } else {
            self.http.execute(request).await
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send and reject non-2xx statuses.
    async fn execute(&self, builder: RequestBuilder) -> Result<reqwest::Response, WechatError> {
        let builder = match self.call_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        };
        let request = builder.build()?;
        let method = request.method().clone();
        let path = request.url().path().to_string();

        let response = self.send_request(request).await?;
        let status = response.status();
        debug!("{} {} -> {}", method, path, status.as_u16());

        if !status.is_success() {
            let body = response.text().await?;
            return Err(WechatError::Http(HttpError::Status {
                status: status.as_u16(),
                body,
            }));
        }
        Ok(response)
    }

    async fn execute_text(&self, builder: RequestBuilder) -> Result<String, WechatError> {
        let response = self.execute(builder).await?;
        Ok(response.text().await?)
    }

    async fn execute_bytes(&self, builder: RequestBuilder) -> Result<Vec<u8>, WechatError> {
        let response = self.execute(builder).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, WechatError> {
        let body = self.execute_text(builder).await?;
        let value = classify_json(&body)?;
        decode_json(value)
    }

    /// GET with parameters in the query string.
    ///
    /// # Errors
    /// - `WechatError::Http` for transport failures, non-2xx statuses or
    ///   undecodable bodies
    /// - `WechatError::Api` when the body carries a non-zero `errcode`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, WechatError> {
        let builder = self.http.get(self.url(path)).query(query);
        self.execute_json(builder).await
    }

    /// POST with parameters in the query string and a JSON body.
    pub async fn post_json<T, B>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, WechatError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(body)?;
        let builder = self
            .http
            .post(self.url(path))
            .query(query)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        self.execute_json(builder).await
    }

    /// POST without a payload: parameters travel as a url-encoded form.
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, WechatError> {
        let builder = self.http.post(self.url(path)).form(params);
        self.execute_json(builder).await
    }

    fn xml_request(&self, path: &str, xml: String) -> RequestBuilder {
        self.http
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(xml)
    }

    /// POST an XML document and return the body unclassified.
    pub async fn post_xml_text(&self, path: &str, xml: String) -> Result<String, WechatError> {
        self.execute_text(self.xml_request(path, xml)).await
    }

    /// POST an XML document and return the raw body bytes, for answers that
    /// may be binary (compressed bills).
    pub async fn post_xml_bytes(&self, path: &str, xml: String) -> Result<Vec<u8>, WechatError> {
        self.execute_bytes(self.xml_request(path, xml)).await
    }

    /// POST an XML document and classify the `return_code`/`result_code`
    /// envelope of the answer.
    ///
    /// # Errors
    /// - `WechatError::Http` as for [`get_json`](Self::get_json)
    /// - `WechatError::PayApi` unless the answer is SUCCESS/SUCCESS with no
    ///   `err_code`
    pub async fn post_xml(&self, path: &str, xml: String) -> Result<XmlResponse, WechatError> {
        let body = self.post_xml_text(path, xml).await?;
        classify_xml(&body)
    }
}

impl Service<reqwest::Request> for WechatClient {
    type Response = reqwest::Response;
    type Error = reqwest::Error;
    type Future = MiddlewareFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: reqwest::Request) -> Self::Future {
        let client = self.http.clone();
        Box::pin(async move { client.execute(req).await })
    }
}
