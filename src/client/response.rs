//! Business-error classification
//!
//! WeChat never uses HTTP status codes for application failures. JSON
//! endpoints embed `{errcode, errmsg}`; merchant XML endpoints embed
//! `{return_code, result_code, err_code}`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::{HttpError, WechatError};

const SUCCESS: &str = "SUCCESS";

/// Parse a JSON body and surface a non-zero `errcode` as [`WechatError::Api`].
pub fn classify_json(body: &str) -> Result<serde_json::Value, WechatError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| WechatError::Http(HttpError::Decode(format!("invalid JSON body: {}", e))))?;

    if let Some(errcode) = value.get("errcode").and_then(|v| v.as_i64()) {
        let errmsg = value
            .get("errmsg")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        WechatError::check_api(errcode, errmsg, body)?;
    }
    Ok(value)
}

pub(crate) fn decode_json<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, WechatError> {
    serde_json::from_value(value).map_err(|e| WechatError::Http(HttpError::Decode(e.to_string())))
}

/// A merchant XML answer that passed classification.
#[derive(Debug, Clone)]
pub struct XmlResponse {
    /// Raw body as received.
    pub body: String,
    /// Top-level elements of the document.
    pub fields: HashMap<String, String>,
}

impl XmlResponse {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Deserialize the body into a typed response.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, WechatError> {
        quick_xml::de::from_str(&self.body)
            .map_err(|e| WechatError::Http(HttpError::Decode(format!("invalid XML body: {}", e))))
    }
}

/// Flatten a `<xml><k>v</k>...</xml>` document into its top-level fields.
pub fn parse_xml_fields(body: &str) -> Result<HashMap<String, String>, quick_xml::DeError> {
    quick_xml::de::from_str(body)
}

/// Parse an XML body and reject anything but SUCCESS/SUCCESS with an empty
/// `err_code`.
pub fn classify_xml(body: &str) -> Result<XmlResponse, WechatError> {
    let fields = parse_xml_fields(body)
        .map_err(|e| WechatError::Http(HttpError::Decode(format!("invalid XML body: {}", e))))?;

    let field = |name: &str| fields.get(name).map(String::as_str).unwrap_or("");
    let return_code = field("return_code");
    let result_code = field("result_code");
    let err_code = field("err_code");

    if return_code != SUCCESS || result_code != SUCCESS || !err_code.is_empty() {
        let message = match field("err_code_des") {
            "" => field("return_msg"),
            des => des,
        };
        return Err(WechatError::PayApi {
            return_code: return_code.to_string(),
            result_code: result_code.to_string(),
            err_code: err_code.to_string(),
            message: message.to_string(),
            body: body.to_string(),
        });
    }

    Ok(XmlResponse {
        body: body.to_string(),
        fields,
    })
}
