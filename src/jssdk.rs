//! JS-SDK ticket and page signature
//!
//! A page using the JS-SDK calls `wx.config` with a signature over the
//! current `jsapi_ticket`, a nonce, a timestamp and the page URL.
//!
//! ```rust,ignore
//! use wechat_open_sdk::jssdk;
//!
//! let ticket = jssdk::jsapi_ticket(&client, &authorizer.access_token).await?;
//! let config = jssdk::JsSdkConfig::new(&appid, &ticket.ticket, "https://example.com/page");
//! ```

use serde::{Deserialize, Serialize};

use crate::client::WechatClient;
use crate::error::WechatError;
use crate::sign::{sign_sha1, SignValue};
use crate::types::AccessToken;
use crate::utils::{random_nonce, unix_now};

const TICKET_PATH: &str = "/cgi-bin/ticket/getticket";

/// `getticket` answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JsapiTicket {
    pub ticket: String,
    pub expires_in: i64,
}

/// Fetch the `jsapi_ticket` of the account owning `access_token`.
///
/// The ticket is valid for `expires_in` seconds and rate limited; callers
/// are expected to cache it.
pub async fn jsapi_ticket(
    client: &WechatClient,
    access_token: &AccessToken,
) -> Result<JsapiTicket, WechatError> {
    ticket(client, access_token, "jsapi").await
}

/// Fetch a ticket of another type, such as `wx_card`.
pub async fn ticket(
    client: &WechatClient,
    access_token: &AccessToken,
    ticket_type: &str,
) -> Result<JsapiTicket, WechatError> {
    client
        .get_json(
            TICKET_PATH,
            &[("access_token", access_token.as_str()), ("type", ticket_type)],
        )
        .await
}

/// Lowercase hex SHA1 over `jsapi_ticket`, `noncestr`, `timestamp` and `url`.
pub fn js_signature(ticket: &str, noncestr: &str, timestamp: i64, url: &str) -> String {
    sign_sha1([
        ("jsapi_ticket", SignValue::from(ticket)),
        ("noncestr", SignValue::from(noncestr)),
        ("timestamp", SignValue::from(timestamp)),
        ("url", SignValue::from(url)),
    ])
}

/// Arguments for `wx.config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsSdkConfig {
    pub app_id: String,
    pub timestamp: i64,
    pub nonce_str: String,
    pub signature: String,
}

impl JsSdkConfig {
    /// Sign `url` with a fresh nonce and the current time.
    ///
    /// Anything after `#` is not part of the signed URL.
    pub fn new(appid: &str, ticket: &str, url: &str) -> Self {
        Self::at(appid, ticket, url, unix_now(), random_nonce(16))
    }

    fn at(appid: &str, ticket: &str, url: &str, timestamp: i64, nonce_str: String) -> Self {
        let url = url.split('#').next().unwrap_or(url);
        Self {
            app_id: appid.to_string(),
            timestamp,
            signature: js_signature(ticket, &nonce_str, timestamp, url),
            nonce_str,
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const TICKET: &str =
        "sM4AOVdWfPE4DxkXGEs8VMCPGGVi4C3VM0P37wVUCFvkVAy_90u5h9nbSlYy3-Sl-HhTdfl2fzFy1AOcHKP7qg";

    #[test]
    fn test_signature_matches_documented_example() {
        assert_eq!(
            js_signature(
                TICKET,
                "Wm3WZYTPz0wzccnW",
                1414587457,
                "http://mp.weixin.qq.com?params=value"
            ),
            "0f9de62fce790f9a083d5c99e95740ceb90c27ed"
        );
    }

    #[test]
    fn test_config_drops_fragment() {
        let config = JsSdkConfig::at(
            "wx1234567890abcdef",
            TICKET,
            "http://mp.weixin.qq.com?params=value#section",
            1414587457,
            "Wm3WZYTPz0wzccnW".to_string(),
        );
        assert_eq!(config.signature, "0f9de62fce790f9a083d5c99e95740ceb90c27ed");

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["appId"], "wx1234567890abcdef");
        assert_eq!(json["nonceStr"], "Wm3WZYTPz0wzccnW");
    }

    #[tokio::test]
    async fn test_jsapi_ticket_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/ticket/getticket"))
            .and(query_param("type", "jsapi"))
            .and(query_param("access_token", "AT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0,
                "errmsg": "ok",
                "ticket": TICKET,
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WechatClient::builder().base_url(server.uri()).build().unwrap();
        let ticket = jsapi_ticket(&client, &AccessToken::new("AT").unwrap())
            .await
            .unwrap();
        assert_eq!(ticket.ticket, TICKET);
        assert_eq!(ticket.expires_in, 7200);
    }
}
