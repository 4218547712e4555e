//! Authorization events pushed to the component callback URL

use serde::Deserialize;

use crate::error::WechatError;

/// Outer document WeChat POSTs to the callback URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(rename = "AppId", default)]
    pub appid: String,
    #[serde(rename = "ToUserName", default)]
    pub to_user_name: String,
    #[serde(rename = "Encrypt")]
    pub encrypt: String,
}

impl EncryptedEnvelope {
    pub fn from_xml(body: &str) -> Result<Self, WechatError> {
        quick_xml::de::from_str(body)
            .map_err(|e| WechatError::MalformedPayload(format!("invalid push envelope: {}", e)))
    }
}

/// Grant carried by `authorized` and `updateauthorized` events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub authorizer_appid: String,
    pub authorization_code: String,
    /// Unix seconds after which the code can no longer be exchanged.
    pub authorization_code_expired_time: i64,
    pub pre_auth_code: String,
}

/// Info-type specific part of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushInfo {
    ComponentVerifyTicket { ticket: String },
    Authorized(AuthorizationGrant),
    UpdateAuthorized(AuthorizationGrant),
    Unauthorized { authorizer_appid: String },
    /// Info type this crate does not model, with the decrypted document.
    Other { info_type: String, xml: String },
}

/// One decrypted authorization event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    /// The component the event was sent to.
    pub appid: String,
    pub create_time: i64,
    pub info: PushInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct RawPushEvent {
    #[serde(rename = "AppId")]
    app_id: String,
    create_time: i64,
    info_type: String,
    component_verify_ticket: String,
    authorizer_appid: String,
    authorization_code: String,
    authorization_code_expired_time: i64,
    pre_auth_code: String,
}

impl PushEvent {
    pub fn info_type(&self) -> &str {
        match &self.info {
            PushInfo::ComponentVerifyTicket { .. } => "component_verify_ticket",
            PushInfo::Authorized(_) => "authorized",
            PushInfo::UpdateAuthorized(_) => "updateauthorized",
            PushInfo::Unauthorized { .. } => "unauthorized",
            PushInfo::Other { info_type, .. } => info_type,
        }
    }

    /// Parse a decrypted `<xml>` document.
    pub fn from_xml(xml: &str) -> Result<Self, WechatError> {
        let mut raw: RawPushEvent = quick_xml::de::from_str(xml)
            .map_err(|e| WechatError::MalformedPayload(format!("invalid push event: {}", e)))?;

        let grant = |raw: RawPushEvent| AuthorizationGrant {
            authorizer_appid: raw.authorizer_appid,
            authorization_code: raw.authorization_code,
            authorization_code_expired_time: raw.authorization_code_expired_time,
            pre_auth_code: raw.pre_auth_code,
        };

        let appid = std::mem::take(&mut raw.app_id);
        let create_time = raw.create_time;
        let info_type = std::mem::take(&mut raw.info_type);
        let info = match info_type.as_str() {
            "component_verify_ticket" => {
                if raw.component_verify_ticket.is_empty() {
                    return Err(WechatError::MalformedPayload(
                        "component_verify_ticket event without ticket".to_string(),
                    ));
                }
                PushInfo::ComponentVerifyTicket {
                    ticket: raw.component_verify_ticket,
                }
            }
            "authorized" => PushInfo::Authorized(grant(raw)),
            "updateauthorized" => PushInfo::UpdateAuthorized(grant(raw)),
            "unauthorized" => PushInfo::Unauthorized {
                authorizer_appid: raw.authorizer_appid,
            },
            "" => {
                return Err(WechatError::MalformedPayload(
                    "push event without InfoType".to_string(),
                ))
            }
            other => PushInfo::Other {
                info_type: other.to_string(),
                xml: xml.to_string(),
            },
        };

        Ok(Self {
            appid,
            create_time,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verify_ticket() {
        let xml = "<xml><AppId>wx1234567890abcdef</AppId><CreateTime>1413192605</CreateTime><InfoType>component_verify_ticket</InfoType><ComponentVerifyTicket>ticket@@@abc</ComponentVerifyTicket></xml>";
        let event = PushEvent::from_xml(xml).unwrap();
        assert_eq!(event.appid, "wx1234567890abcdef");
        assert_eq!(event.create_time, 1413192605);
        assert_eq!(
            event.info,
            PushInfo::ComponentVerifyTicket {
                ticket: "ticket@@@abc".to_string()
            }
        );
        assert_eq!(event.info_type(), "component_verify_ticket");
    }

    #[test]
    fn test_parse_authorized_with_cdata() {
        let xml = "<xml><AppId><![CDATA[wx1234567890abcdef]]></AppId><CreateTime>1413192760</CreateTime><InfoType><![CDATA[authorized]]></InfoType><AuthorizerAppid><![CDATA[wxaaaaaaaaaaaaaaaa]]></AuthorizerAppid><AuthorizationCode><![CDATA[code1]]></AuthorizationCode><AuthorizationCodeExpiredTime>1413196360</AuthorizationCodeExpiredTime><PreAuthCode><![CDATA[pre1]]></PreAuthCode></xml>";
        let event = PushEvent::from_xml(xml).unwrap();
        match event.info {
            PushInfo::Authorized(grant) => {
                assert_eq!(grant.authorizer_appid, "wxaaaaaaaaaaaaaaaa");
                assert_eq!(grant.authorization_code, "code1");
                assert_eq!(grant.authorization_code_expired_time, 1413196360);
                assert_eq!(grant.pre_auth_code, "pre1");
            }
            other => panic!("unexpected info: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unauthorized_and_unknown() {
        let xml = "<xml><AppId>a</AppId><CreateTime>1</CreateTime><InfoType>unauthorized</InfoType><AuthorizerAppid>wxb</AuthorizerAppid></xml>";
        assert_eq!(
            PushEvent::from_xml(xml).unwrap().info,
            PushInfo::Unauthorized {
                authorizer_appid: "wxb".to_string()
            }
        );

        let xml = "<xml><AppId>a</AppId><CreateTime>1</CreateTime><InfoType>notify_third_fasteregister</InfoType></xml>";
        let event = PushEvent::from_xml(xml).unwrap();
        assert_eq!(event.info_type(), "notify_third_fasteregister");
        assert_eq!(
            event.info,
            PushInfo::Other {
                info_type: "notify_third_fasteregister".to_string(),
                xml: xml.to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_missing_info_type_and_ticket() {
        assert!(matches!(
            PushEvent::from_xml("<xml><AppId>a</AppId></xml>"),
            Err(WechatError::MalformedPayload(_))
        ));
        assert!(matches!(
            PushEvent::from_xml("<xml><InfoType>component_verify_ticket</InfoType></xml>"),
            Err(WechatError::MalformedPayload(_))
        ));
        assert!(matches!(
            PushEvent::from_xml("<xml><CreateTime>soon</CreateTime></xml>"),
            Err(WechatError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_envelope_parse() {
        let body = "<xml><AppId><![CDATA[wx1234567890abcdef]]></AppId><Encrypt><![CDATA[abc==]]></Encrypt></xml>";
        let envelope = EncryptedEnvelope::from_xml(body).unwrap();
        assert_eq!(envelope.appid, "wx1234567890abcdef");
        assert_eq!(envelope.encrypt, "abc==");

        assert!(matches!(
            EncryptedEnvelope::from_xml("<xml><AppId>x</AppId></xml>"),
            Err(WechatError::MalformedPayload(_))
        ));
    }
}
