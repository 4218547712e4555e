use std::sync::Arc;

use serde::Deserialize;

use crate::client::WechatClient;
use crate::credential::{ComponentCredential, CredentialStore};
use crate::crypto::EncodingAesKey;
use crate::error::WechatError;
use crate::types::{AccessToken, AppId, AppSecret};

use super::Component;

/// Component settings as they appear in a configuration file.
///
/// ```toml
/// appid = "wx1234567890abcdef"
/// secret = "..."
/// token = "..."
/// encoding_aes_key = "43 characters"
/// ```
#[derive(Clone, Deserialize)]
pub struct ComponentConfig {
    pub appid: AppId,
    pub secret: AppSecret,
    /// Token used to sign pushes.
    pub token: String,
    pub encoding_aes_key: String,
    /// Last known verify ticket, if persisted.
    #[serde(default)]
    pub verify_ticket: Option<String>,
    #[serde(default)]
    pub access_token: Option<AccessToken>,
    #[serde(default)]
    pub access_token_expires_at: i64,
}

impl std::fmt::Debug for ComponentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentConfig")
            .field("appid", &self.appid)
            .field("access_token_expires_at", &self.access_token_expires_at)
            .finish_non_exhaustive()
    }
}

impl ComponentConfig {
    /// Decode the AES key and build the initial credential.
    pub fn into_credential(self) -> Result<ComponentCredential, WechatError> {
        let aes_key = EncodingAesKey::new(&self.encoding_aes_key)?;
        let mut credential = ComponentCredential::new(self.appid, self.secret, self.token, aes_key);
        credential.verify_ticket = self.verify_ticket.filter(|t| !t.is_empty());
        credential.access_token = self.access_token;
        credential.access_token_expires_at = self.access_token_expires_at;
        Ok(credential)
    }
}

/// Builder for [`Component`]
///
/// Either supply the settings piece by piece, load them with
/// [`config`](Self::config), or inject an existing
/// [`CredentialStore`] shared with other parts of the application.
#[must_use]
#[derive(Default)]
pub struct ComponentBuilder {
    appid: Option<AppId>,
    secret: Option<AppSecret>,
    token: Option<String>,
    encoding_aes_key: Option<String>,
    verify_ticket: Option<String>,
    client: Option<WechatClient>,
    store: Option<Arc<CredentialStore<ComponentCredential>>>,
}

impl std::fmt::Debug for ComponentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentBuilder")
            .field("appid", &self.appid)
            .field("client", &self.client)
            .field("store", &self.store.as_ref().map(|_| ".."))
            .finish_non_exhaustive()
    }
}

impl ComponentBuilder {
    pub fn appid(mut self, appid: AppId) -> Self {
        self.appid = Some(appid);
        self
    }

    pub fn secret(mut self, secret: AppSecret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Token used to sign pushes.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// The 43-character EncodingAESKey from the platform console.
    pub fn encoding_aes_key(mut self, key: impl Into<String>) -> Self {
        self.encoding_aes_key = Some(key.into());
        self
    }

    /// Seed a verify ticket persisted from an earlier run.
    pub fn verify_ticket(mut self, ticket: impl Into<String>) -> Self {
        self.verify_ticket = Some(ticket.into());
        self
    }

    /// HTTP client; defaults to [`WechatClient::builder`] defaults.
    pub fn client(mut self, client: WechatClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Use an existing store instead of building one from settings.
    pub fn store(mut self, store: Arc<CredentialStore<ComponentCredential>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build a component from a loaded [`ComponentConfig`].
    pub fn config(self, config: ComponentConfig) -> Result<Component, WechatError> {
        let credential = config.into_credential()?;
        self.store(Arc::new(CredentialStore::new(credential))).build()
    }

    /// # Errors
    /// Returns [`WechatError::Config`] when a setting is missing or the
    /// EncodingAESKey does not decode to 32 bytes.
    pub fn build(self) -> Result<Component, WechatError> {
        let client = match self.client {
            Some(client) => client,
            None => WechatClient::builder().build()?,
        };

        let store = match self.store {
            Some(store) => store,
            None => {
                let appid = self
                    .appid
                    .ok_or_else(|| WechatError::Config("appid is required".to_string()))?;
                let secret = self
                    .secret
                    .ok_or_else(|| WechatError::Config("secret is required".to_string()))?;
                let token = self
                    .token
                    .ok_or_else(|| WechatError::Config("token is required".to_string()))?;
                let key = self.encoding_aes_key.ok_or_else(|| {
                    WechatError::Config("encoding_aes_key is required".to_string())
                })?;

                let mut credential =
                    ComponentCredential::new(appid, secret, token, EncodingAesKey::new(&key)?);
                credential.verify_ticket = self.verify_ticket;
                Arc::new(CredentialStore::new(credential))
            }
        };

        Ok(Component::from_parts(client, store))
    }
}
