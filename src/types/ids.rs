use serde::{Deserialize, Serialize};

use crate::error::WechatError;

/// WeChat AppID (18 characters, `wx` prefix)
///
/// Used for component apps as well as authorizer accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Result<Self, WechatError> {
        let id = id.into();
        if !id.starts_with("wx") {
            return Err(WechatError::InvalidAppId(format!(
                "AppId must start with 'wx', got {}",
                id
            )));
        }
        if id.len() != 18 {
            return Err(WechatError::InvalidAppId(format!(
                "AppId must be 18 characters, got {}",
                id.len()
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AppId {
    type Error = WechatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AppId> for String {
    fn from(id: AppId) -> Self {
        id.0
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// WeChat AppSecret
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppSecret(String);

impl AppSecret {
    pub fn new(secret: impl Into<String>) -> Result<Self, WechatError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(WechatError::InvalidAppSecret(
                "AppSecret must not be empty".to_string(),
            ));
        }
        Ok(Self(secret))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AppSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AppSecret([REDACTED])")
    }
}

impl TryFrom<String> for AppSecret {
    type Error = WechatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AppSecret> for String {
    fn from(secret: AppSecret) -> Self {
        secret.0
    }
}

/// Bearer credential (component, authorizer or plain account access token)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Result<Self, WechatError> {
        let token = token.into();
        if token.is_empty() {
            return Err(WechatError::InvalidAccessToken(
                "AccessToken must not be empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

impl TryFrom<String> for AccessToken {
    type Error = WechatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccessToken> for String {
    fn from(token: AccessToken) -> Self {
        token.0
    }
}
