use std::sync::Arc;

use thiserror::Error;

/// Transport-level failure: the request never produced a usable response.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Reqwest(Arc<reqwest::Error>),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response decode error: {0}")]
    Decode(String),
}

/// WeChat SDK error types
#[derive(Debug, Error)]
pub enum WechatError {
    #[error("HTTP error: {0}")]
    Http(HttpError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML serialization error: {0}")]
    Xml(String),

    /// Business rejection signalled through a non-zero `errcode`.
    #[error("WeChat API error (code={code}): {message}")]
    Api {
        code: i64,
        message: String,
        body: String,
    },

    /// Business rejection from a merchant pay endpoint.
    #[error("WeChat Pay error (return_code={return_code}, result_code={result_code}, err_code={err_code}): {message}")]
    PayApi {
        return_code: String,
        result_code: String,
        err_code: String,
        message: String,
        body: String,
    },

    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Access token error: {0}")]
    Token(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid AppId: {0}")]
    InvalidAppId(String),

    #[error("Invalid AppSecret: {0}")]
    InvalidAppSecret(String),

    #[error("Invalid access token: {0}")]
    InvalidAccessToken(String),
}

impl From<reqwest::Error> for WechatError {
    fn from(e: reqwest::Error) -> Self {
        WechatError::Http(HttpError::Reqwest(Arc::new(e)))
    }
}

impl From<quick_xml::DeError> for WechatError {
    fn from(e: quick_xml::DeError) -> Self {
        WechatError::Xml(e.to_string())
    }
}

impl WechatError {
    /// Convert a JSON `errcode`/`errmsg` pair into a result.
    pub(crate) fn check_api(code: i64, message: &str, body: &str) -> Result<(), WechatError> {
        if code != 0 {
            return Err(WechatError::Api {
                code,
                message: message.to_string(),
                body: body.to_string(),
            });
        }
        Ok(())
    }

    /// Whether the failure is a network-level or server-side one the caller may retry.
    ///
    /// The SDK itself never retries; this only classifies.
    pub fn is_transient(&self) -> bool {
        match self {
            WechatError::Http(HttpError::Reqwest(e)) => !e.is_builder(),
            WechatError::Http(HttpError::Status { status, .. }) => *status >= 500,
            _ => false,
        }
    }

    /// Whether WeChat definitively rejected the request.
    pub fn is_business(&self) -> bool {
        matches!(self, WechatError::Api { .. } | WechatError::PayApi { .. })
    }

    /// Raw response body for business errors.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            WechatError::Api { body, .. } | WechatError::PayApi { body, .. } => Some(body),
            WechatError::Http(HttpError::Status { body, .. }) => Some(body),
            _ => None,
        }
    }
}
