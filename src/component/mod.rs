//! Third-party platform ("component") credential lifecycle
//!
//! A [`Component`] owns the component's credential store and a
//! [`WechatClient`]. It
//!
//! - turns the verify ticket WeChat pushes into a component access token,
//! - authenticates and decrypts authorization pushes,
//! - exchanges authorization codes for authorizer tokens and refreshes them.
//!
//! Nothing refreshes on its own. Operations that need the component access
//! token fail with [`WechatError::Token`] once it has expired; call
//! [`Component::refresh_component_token_if_expired`] first.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wechat_open_sdk::component::{Component, PushInfo};
//!
//! let component = Component::builder()
//!     .appid(AppId::new("wx1234567890abcdef")?)
//!     .secret(AppSecret::new("secret")?)
//!     .token("token")
//!     .encoding_aes_key("43-character key")
//!     .build()?;
//!
//! // In the callback handler
//! let event = component
//!     .handle_push_body(&body, &msg_signature, &timestamp, &nonce)
//!     .await?;
//!
//! component.refresh_component_token_if_expired().await?;
//! let pre_auth = component.pre_auth_code().await?;
//! ```

mod authorizer;
mod builder;
mod event;
mod types;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Serialize;

use crate::client::WechatClient;
use crate::credential::{ComponentCredential, CredentialStore};
use crate::crypto::{
    compute_push_signature, decrypt_message, encrypt_framed_message, extract_xml,
    verify_push_signature,
};
use crate::error::WechatError;
use crate::types::AccessToken;
use crate::utils::unix_now;

pub use builder::{ComponentBuilder, ComponentConfig};
pub use event::{AuthorizationGrant, EncryptedEnvelope, PushEvent, PushInfo};
pub use types::{
    AuthorizationInfo, AuthorizerDetails, AuthorizerInfo, BusinessInfo, ComponentAccessToken,
    FuncInfo, IdInfo, OAuthAccessToken, PreAuthCode,
};

const COMPONENT_TOKEN_PATH: &str = "/cgi-bin/component/api_component_token";
const PRE_AUTH_CODE_PATH: &str = "/cgi-bin/component/api_create_preauthcode";
const LOGIN_PAGE_URL: &str = "https://mp.weixin.qq.com/cgi-bin/componentloginpage";

/// A third-party platform bound to one credential store.
#[derive(Clone)]
pub struct Component {
    client: WechatClient,
    store: Arc<CredentialStore<ComponentCredential>>,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

/// Passive reply in WeChat's encrypted envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedReply {
    pub encrypt: String,
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
}

impl EncryptedReply {
    pub fn to_xml(&self) -> String {
        format!(
            "<xml><Encrypt><![CDATA[{}]]></Encrypt><MsgSignature><![CDATA[{}]]></MsgSignature><TimeStamp>{}</TimeStamp><Nonce><![CDATA[{}]]></Nonce></xml>",
            self.encrypt, self.msg_signature, self.timestamp, self.nonce
        )
    }
}

impl Component {
    pub fn builder() -> ComponentBuilder {
        ComponentBuilder::default()
    }

    pub(crate) fn from_parts(
        client: WechatClient,
        store: Arc<CredentialStore<ComponentCredential>>,
    ) -> Self {
        Self { client, store }
    }

    /// The credential store; share it to observe ticket and token updates.
    pub fn store(&self) -> &Arc<CredentialStore<ComponentCredential>> {
        &self.store
    }

    pub fn client(&self) -> &WechatClient {
        &self.client
    }

    /// A handle whose HTTP calls use `timeout`; the store stays shared.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            client: self.client.with_timeout(timeout),
            store: Arc::clone(&self.store),
        }
    }

    /// Current component access token.
    ///
    /// # Errors
    /// [`WechatError::Token`] when no token was acquired yet or it has expired.
    pub async fn component_access_token(&self) -> Result<AccessToken, WechatError> {
        let now = unix_now();
        self.store
            .read(|c| c.valid_access_token_at(now).cloned())
            .await
            .ok_or_else(|| {
                WechatError::Token("component access token is missing or expired".to_string())
            })
    }

    /// Obtain a new component access token with the stored verify ticket.
    ///
    /// Concurrent calls share one request. The stored expiry becomes
    /// `now + expires_in`.
    ///
    /// # Errors
    /// - [`WechatError::Token`] when no verify ticket has been received
    /// - [`WechatError::Api`] when WeChat rejects the ticket or secret
    pub async fn acquire_component_token(&self) -> Result<ComponentAccessToken, WechatError> {
        self.refresh_component_token(|_| true).await
    }

    /// Acquire a component access token only when the stored one is
    /// missing or expired.
    pub async fn refresh_component_token_if_expired(
        &self,
    ) -> Result<ComponentAccessToken, WechatError> {
        self.refresh_component_token(|c| c.is_expired_at(unix_now()))
            .await
    }

    async fn refresh_component_token(
        &self,
        is_stale: impl FnOnce(&ComponentCredential) -> bool,
    ) -> Result<ComponentAccessToken, WechatError> {
        let credential = self
            .store
            .refresh(
                is_stale,
                |c| self.fetch_component_token(c),
                |c, (token, expires_at)| {
                    c.access_token = Some(token);
                    c.access_token_expires_at = expires_at;
                },
            )
            .await?;

        let token = credential
            .access_token
            .ok_or_else(|| WechatError::Token("component access token missing after refresh".to_string()))?;
        Ok(ComponentAccessToken {
            component_access_token: token.as_str().to_string(),
            expires_in: (credential.access_token_expires_at - unix_now()).max(0),
        })
    }

    async fn fetch_component_token(
        &self,
        credential: ComponentCredential,
    ) -> Result<(AccessToken, i64), WechatError> {
        let ticket = credential
            .verify_ticket
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                WechatError::Token("component_verify_ticket has not been received".to_string())
            })?;

        #[derive(Serialize)]
        struct Request<'a> {
            component_appid: &'a str,
            component_appsecret: &'a str,
            component_verify_ticket: &'a str,
        }

        let request = Request {
            component_appid: credential.appid.as_str(),
            component_appsecret: credential.secret.as_str(),
            component_verify_ticket: &ticket,
        };

        let issued_at = unix_now();
        let response: ComponentAccessToken = self
            .client
            .post_json(COMPONENT_TOKEN_PATH, &[], &request)
            .await?;
        let token = AccessToken::new(response.component_access_token)?;

        info!(
            "component {} acquired access token, expires in {}s",
            credential.appid, response.expires_in
        );
        Ok((token, issued_at + response.expires_in))
    }

    /// Authenticate, decrypt and parse one authorization push.
    ///
    /// `encrypt` is the base64 `Encrypt` value, `signature` the
    /// `msg_signature` query parameter. A verify-ticket push updates the
    /// stored ticket.
    ///
    /// # Errors
    /// - [`WechatError::Signature`] when the signature does not match; the
    ///   payload is not decrypted
    /// - [`WechatError::Decrypt`] for undecodable ciphertext or padding
    /// - [`WechatError::MalformedPayload`] for an empty message or a
    ///   plaintext that is not a push event
    pub async fn handle_push_notification(
        &self,
        encrypt: &str,
        signature: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<PushEvent, WechatError> {
        let (token, key) = self
            .store
            .read(|c| (c.message_token.clone(), c.aes_key.clone()))
            .await;

        if !verify_push_signature(&token, signature, encrypt, timestamp, nonce) {
            warn!("rejected push with invalid signature (timestamp={})", timestamp);
            return Err(WechatError::Signature(
                "push signature mismatch".to_string(),
            ));
        }

        if encrypt.is_empty() {
            return Err(WechatError::MalformedPayload("empty push message".to_string()));
        }

        let decrypted = decrypt_message(encrypt, &key)?;
        let xml = extract_xml(&decrypted)?;
        let event = PushEvent::from_xml(xml)?;

        debug!("push received: {}", event.info_type());
        if let PushInfo::ComponentVerifyTicket { ticket } = &event.info {
            self.store
                .update(|c| c.verify_ticket = Some(ticket.clone()))
                .await;
            info!("component verify ticket updated");
        }

        Ok(event)
    }

    /// [`handle_push_notification`](Self::handle_push_notification) for
    /// the raw POST body of the callback.
    pub async fn handle_push_body(
        &self,
        body: &str,
        signature: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<PushEvent, WechatError> {
        let envelope = EncryptedEnvelope::from_xml(body)?;
        self.handle_push_notification(&envelope.encrypt, signature, timestamp, nonce)
            .await
    }

    /// Encrypt a passive reply for this component.
    pub async fn encrypt_message(&self, plaintext: &str) -> Result<String, WechatError> {
        let (appid, key) = self
            .store
            .read(|c| (c.appid.clone(), c.aes_key.clone()))
            .await;
        Ok(encrypt_framed_message(plaintext, appid.as_str(), &key))
    }

    /// Encrypt a passive reply and sign it the way WeChat expects.
    pub async fn encrypt_reply(
        &self,
        plaintext: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<EncryptedReply, WechatError> {
        let encrypt = self.encrypt_message(plaintext).await?;
        let token = self.store.read(|c| c.message_token.clone()).await;
        let msg_signature = compute_push_signature(&token, &encrypt, timestamp, nonce);
        Ok(EncryptedReply {
            encrypt,
            msg_signature,
            timestamp: timestamp.to_string(),
            nonce: nonce.to_string(),
        })
    }

    /// Request a pre-authorization code for the authorization page.
    pub async fn pre_auth_code(&self) -> Result<PreAuthCode, WechatError> {
        let token = self.component_access_token().await?;
        let appid = self.store.read(|c| c.appid.clone()).await;

        self.client
            .post_json(
                PRE_AUTH_CODE_PATH,
                &[("component_access_token", token.as_str())],
                &serde_json::json!({ "component_appid": appid.as_str() }),
            )
            .await
    }

    /// URL of the page where an account administrator grants access.
    ///
    /// `auth_type`: 1 official accounts, 2 mini-programs, 3 both.
    pub async fn authorization_url(
        &self,
        pre_auth_code: &str,
        redirect_uri: &str,
        auth_type: Option<u8>,
    ) -> String {
        let appid = self.store.read(|c| c.appid.clone()).await;
        let mut url = format!(
            "{}?component_appid={}&pre_auth_code={}&redirect_uri={}",
            LOGIN_PAGE_URL,
            appid,
            utf8_percent_encode(pre_auth_code, NON_ALPHANUMERIC),
            utf8_percent_encode(redirect_uri, NON_ALPHANUMERIC),
        );
        if let Some(auth_type) = auth_type {
            url.push_str(&format!("&auth_type={}", auth_type));
        }
        url
    }
}
