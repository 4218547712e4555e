//! Response payloads of the component endpoints

use serde::{Deserialize, Serialize};

/// `api_component_token` answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ComponentAccessToken {
    pub component_access_token: String,
    pub expires_in: i64,
}

/// `api_create_preauthcode` answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PreAuthCode {
    pub pre_auth_code: String,
    pub expires_in: i64,
}

/// Permission set granted to the component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FuncInfo {
    pub funcscope_category: IdInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdInfo {
    pub id: i64,
}

/// `authorization_info` block shared by `api_query_auth` and
/// `api_get_authorizer_info`. The latter omits the access token.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizationInfo {
    pub authorizer_appid: String,
    pub authorizer_access_token: String,
    pub expires_in: i64,
    pub authorizer_refresh_token: String,
    pub func_info: Vec<FuncInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QueryAuthResponse {
    pub authorization_info: AuthorizationInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BusinessInfo {
    pub open_store: i64,
    pub open_scan: i64,
    pub open_pay: i64,
    pub open_card: i64,
    pub open_shake: i64,
}

/// Public profile of an authorized account.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizerInfo {
    pub nick_name: String,
    pub head_img: String,
    pub service_type_info: IdInfo,
    pub verify_type_info: IdInfo,
    pub user_name: String,
    pub principal_name: String,
    pub business_info: BusinessInfo,
    pub alias: String,
    pub qrcode_url: String,
}

/// `api_get_authorizer_info` answer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthorizerDetails {
    pub authorizer_info: AuthorizerInfo,
    #[serde(default)]
    pub authorization_info: AuthorizationInfo,
}

/// `api_authorizer_token` answer.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AuthorizerTokenResponse {
    pub authorizer_access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub authorizer_refresh_token: String,
}

/// Web authorization token obtained on behalf of an authorizer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OAuthAccessToken {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: String,
    pub openid: String,
    #[serde(default)]
    pub scope: String,
}
