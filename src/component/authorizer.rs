//! Operations performed on behalf of authorized accounts

use log::info;

use super::types::{AuthorizerDetails, AuthorizerTokenResponse, OAuthAccessToken, QueryAuthResponse};
use super::Component;
use crate::credential::{AuthorizerCredential, CredentialStore};
use crate::error::WechatError;
use crate::types::AccessToken;
use crate::utils::unix_now;

const QUERY_AUTH_PATH: &str = "/cgi-bin/component/api_query_auth";
const AUTHORIZER_TOKEN_PATH: &str = "/cgi-bin/component/api_authorizer_token";
const AUTHORIZER_INFO_PATH: &str = "/cgi-bin/component/api_get_authorizer_info";
const OAUTH_TOKEN_PATH: &str = "/sns/oauth2/component/access_token";

impl Component {
    /// Exchange the authorization code from an `authorized` push or the
    /// login-page redirect for the authorizer's tokens.
    ///
    /// # Errors
    /// - [`WechatError::Token`] when the component access token is unusable
    /// - [`WechatError::Api`] when WeChat rejects the code
    pub async fn exchange_authorization_code(
        &self,
        authorization_code: &str,
    ) -> Result<AuthorizerCredential, WechatError> {
        let token = self.component_access_token().await?;
        let component_appid = self.store.read(|c| c.appid.clone()).await;

        let issued_at = unix_now();
        let response: QueryAuthResponse = self
            .client
            .post_json(
                QUERY_AUTH_PATH,
                &[("component_access_token", token.as_str())],
                &serde_json::json!({
                    "component_appid": component_appid.as_str(),
                    "authorization_code": authorization_code,
                }),
            )
            .await?;

        let info = response.authorization_info;
        if info.authorizer_appid.is_empty() {
            return Err(WechatError::MalformedPayload(
                "api_query_auth answer without authorizer_appid".to_string(),
            ));
        }
        info!("authorizer {} linked to component {}", info.authorizer_appid, component_appid);

        Ok(AuthorizerCredential {
            access_token: AccessToken::new(info.authorizer_access_token)?,
            refresh_token: info.authorizer_refresh_token,
            access_token_expires_at: issued_at + info.expires_in,
            authorizer_appid: info.authorizer_appid,
            component_appid,
        })
    }

    /// Refresh an authorizer's access token with its refresh token.
    ///
    /// Concurrent refreshes of the same store share one request. The
    /// refresh token is kept when WeChat does not return a new one.
    ///
    /// # Errors
    /// - [`WechatError::Config`] when the credential belongs to another component
    /// - [`WechatError::Token`] when the component access token is unusable
    /// - [`WechatError::Api`] when WeChat rejects the refresh token
    pub async fn refresh_authorizer_token(
        &self,
        authorizer: &CredentialStore<AuthorizerCredential>,
    ) -> Result<AuthorizerCredential, WechatError> {
        self.refresh_authorizer(authorizer, |_| true).await
    }

    /// Refresh only when the stored authorizer token is expired.
    pub async fn refresh_authorizer_token_if_expired(
        &self,
        authorizer: &CredentialStore<AuthorizerCredential>,
    ) -> Result<AuthorizerCredential, WechatError> {
        self.refresh_authorizer(authorizer, |a| a.is_expired_at(unix_now()))
            .await
    }

    async fn refresh_authorizer(
        &self,
        authorizer: &CredentialStore<AuthorizerCredential>,
        is_stale: impl FnOnce(&AuthorizerCredential) -> bool,
    ) -> Result<AuthorizerCredential, WechatError> {
        authorizer
            .refresh(
                is_stale,
                |current| self.fetch_authorizer_token(current),
                |credential, (token, refresh_token, expires_at)| {
                    credential.access_token = token;
                    if !refresh_token.is_empty() {
                        credential.refresh_token = refresh_token;
                    }
                    credential.access_token_expires_at = expires_at;
                },
            )
            .await
    }

    async fn fetch_authorizer_token(
        &self,
        current: AuthorizerCredential,
    ) -> Result<(AccessToken, String, i64), WechatError> {
        let component_appid = self.store.read(|c| c.appid.clone()).await;
        if current.component_appid != component_appid {
            return Err(WechatError::Config(format!(
                "authorizer {} belongs to component {}, not {}",
                current.authorizer_appid, current.component_appid, component_appid
            )));
        }
        let token = self.component_access_token().await?;

        let issued_at = unix_now();
        let response: AuthorizerTokenResponse = self
            .client
            .post_json(
                AUTHORIZER_TOKEN_PATH,
                &[("component_access_token", token.as_str())],
                &serde_json::json!({
                    "component_appid": component_appid.as_str(),
                    "authorizer_appid": current.authorizer_appid,
                    "authorizer_refresh_token": current.refresh_token,
                }),
            )
            .await?;

        info!(
            "authorizer {} token refreshed, expires in {}s",
            current.authorizer_appid, response.expires_in
        );
        Ok((
            AccessToken::new(response.authorizer_access_token)?,
            response.authorizer_refresh_token,
            issued_at + response.expires_in,
        ))
    }

    /// Profile and granted permissions of an authorized account.
    pub async fn authorizer_info(
        &self,
        authorizer_appid: &str,
    ) -> Result<AuthorizerDetails, WechatError> {
        let token = self.component_access_token().await?;
        let component_appid = self.store.read(|c| c.appid.clone()).await;

        self.client
            .post_json(
                AUTHORIZER_INFO_PATH,
                &[("component_access_token", token.as_str())],
                &serde_json::json!({
                    "component_appid": component_appid.as_str(),
                    "authorizer_appid": authorizer_appid,
                }),
            )
            .await
    }

    /// Exchange a web-authorization `code` obtained for an authorizer's
    /// user.
    pub async fn oauth_access_token(
        &self,
        authorizer_appid: &str,
        code: &str,
    ) -> Result<OAuthAccessToken, WechatError> {
        let token = self.component_access_token().await?;
        let component_appid = self.store.read(|c| c.appid.clone()).await;

        self.client
            .get_json(
                OAUTH_TOKEN_PATH,
                &[
                    ("appid", authorizer_appid),
                    ("code", code),
                    ("grant_type", "authorization_code"),
                    ("component_appid", component_appid.as_str()),
                    ("component_access_token", token.as_str()),
                ],
            )
            .await
    }
}
