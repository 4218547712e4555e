//! WeChat HTTP Client module
//!
//! [`WechatClient`] builds, sends and classifies every outbound call.

mod builder;
pub use builder::{identity_from_pem, WechatClientBuilder};

mod response;
pub use response::{classify_json, classify_xml, parse_xml_fields, XmlResponse};

mod wechat_client;
pub use wechat_client::WechatClient;
