use std::time::Duration;

use serde::Deserialize;

use super::PayClient;
use crate::client::{identity_from_pem, WechatClient};
use crate::error::WechatError;
use crate::types::AppId;

const DEFAULT_BASE_URL: &str = "https://api.mch.weixin.qq.com";

/// Merchant account settings.
///
/// `cert_pem` and `key_pem` are the merchant API certificate; they are only
/// needed for calls that require mutual TLS, such as refunds.
#[derive(Clone, Deserialize)]
pub struct MchConfig {
    pub appid: AppId,
    pub mch_id: String,
    pub pay_key: String,
    #[serde(default)]
    pub cert_pem: Option<String>,
    #[serde(default)]
    pub key_pem: Option<String>,
}

impl std::fmt::Debug for MchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MchConfig")
            .field("appid", &self.appid)
            .field("mch_id", &self.mch_id)
            .field("pay_key", &"[REDACTED]")
            .field("has_client_identity", &self.cert_pem.is_some())
            .finish()
    }
}

/// Builder for [`PayClient`]
#[must_use]
#[derive(Default)]
pub struct PayClientBuilder {
    appid: Option<AppId>,
    mch_id: Option<String>,
    pay_key: Option<String>,
    cert_pem: Option<String>,
    key_pem: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for PayClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayClientBuilder")
            .field("appid", &self.appid)
            .field("mch_id", &self.mch_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PayClientBuilder {
    pub fn appid(mut self, appid: AppId) -> Self {
        self.appid = Some(appid);
        self
    }

    pub fn mch_id(mut self, mch_id: impl Into<String>) -> Self {
        self.mch_id = Some(mch_id.into());
        self
    }

    /// The 32-character API key set in the merchant console.
    pub fn pay_key(mut self, pay_key: impl Into<String>) -> Self {
        self.pay_key = Some(pay_key.into());
        self
    }

    /// Merchant API certificate and private key, PEM encoded.
    pub fn client_identity(mut self, cert_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        self.cert_pem = Some(cert_pem.into());
        self.key_pem = Some(key_pem.into());
        self
    }

    pub fn config(mut self, config: MchConfig) -> Self {
        self.appid = Some(config.appid);
        self.mch_id = Some(config.mch_id);
        self.pay_key = Some(config.pay_key);
        self.cert_pem = config.cert_pem;
        self.key_pem = config.key_pem;
        self
    }

    /// Defaults to `https://api.mch.weixin.qq.com`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// # Errors
    /// [`WechatError::Config`] when a setting is missing, the identity is
    /// incomplete or cannot be parsed.
    pub fn build(self) -> Result<PayClient, WechatError> {
        let appid = self
            .appid
            .ok_or_else(|| WechatError::Config("appid is required".to_string()))?;
        let mch_id = self
            .mch_id
            .filter(|m| !m.is_empty())
            .ok_or_else(|| WechatError::Config("mch_id is required".to_string()))?;
        let pay_key = self
            .pay_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| WechatError::Config("pay_key is required".to_string()))?;

        let base_url = self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client_builder = || {
            let builder = WechatClient::builder().base_url(base_url.clone());
            match self.timeout {
                Some(timeout) => builder.timeout(timeout),
                None => builder,
            }
        };

        let client = client_builder().build()?;
        let secure_client = match (&self.cert_pem, &self.key_pem) {
            (Some(cert), Some(key)) => {
                let identity = identity_from_pem(cert.as_bytes(), key.as_bytes())?;
                Some(client_builder().identity(identity).build()?)
            }
            (None, None) => None,
            _ => {
                return Err(WechatError::Config(
                    "client identity needs both cert_pem and key_pem".to_string(),
                ))
            }
        };

        Ok(PayClient {
            config: MchConfig {
                appid,
                mch_id,
                pay_key,
                cert_pem: self.cert_pem,
                key_pem: self.key_pem,
            },
            client,
            secure_client,
        })
    }
}
