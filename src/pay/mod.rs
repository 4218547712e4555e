//! Merchant pay (XML, MD5-signed) client
//!
//! Every request carries `appid`, `mch_id`, a fresh `nonce_str` and an MD5
//! `sign` computed over the same field table the `<xml>` body is rendered
//! from. Answers are classified on `return_code`/`result_code` and their
//! own `sign` is verified before decoding.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wechat_open_sdk::pay::{PayClient, UnifiedOrderRequest};
//!
//! let pay = PayClient::builder()
//!     .appid(AppId::new("wx2421b1c4370ec43b")?)
//!     .mch_id("10000100")
//!     .pay_key("192006250b4c09247ec02edce69f6a2d")
//!     .build()?;
//!
//! let order = pay
//!     .unified_order(&UnifiedOrderRequest {
//!         body: "JSAPI test".into(),
//!         out_trade_no: "1415659990".into(),
//!         total_fee: 1,
//!         spbill_create_ip: "14.23.150.211".into(),
//!         notify_url: "https://example.com/notify".into(),
//!         trade_type: "JSAPI".into(),
//!         openid: "oUpF8uMuAJO_M2pxb1Q9zNjWeS6o".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! let params = pay.jsapi_pay_sign(&order.prepay_id);
//! ```

mod config;
mod model;
mod params;

use log::{debug, warn};
use quick_xml::escape::escape;

use crate::client::{classify_xml, WechatClient, XmlResponse};
use crate::crypto::decrypt_refund_info;
use crate::error::WechatError;
use crate::sign::{check_md5_sign, sign_md5, SignField, SignableFields};

pub use crate::utils::random_nonce;
pub use config::{MchConfig, PayClientBuilder};
pub use model::{
    CloseOrderRequest, DownloadBillRequest, PaymentNotification, QueryOrderRequest,
    QueryOrderResponse, RefundNotification, RefundNotificationEnvelope, RefundQueryRequest,
    RefundQueryResponse, RefundRecord, RefundRequest, RefundResponse, UnifiedOrderRequest,
    UnifiedOrderResponse,
};
pub use params::{AppPayParams, JsapiPayParams};

const UNIFIED_ORDER_PATH: &str = "/pay/unifiedorder";
const ORDER_QUERY_PATH: &str = "/pay/orderquery";
const CLOSE_ORDER_PATH: &str = "/pay/closeorder";
const REFUND_PATH: &str = "/secapi/pay/refund";
const REFUND_QUERY_PATH: &str = "/pay/refundquery";
const DOWNLOAD_BILL_PATH: &str = "/pay/downloadbill";

const NONCE_LEN: usize = 32;
const SIGN_FIELD: &str = "sign";

/// Merchant pay client
#[derive(Debug, Clone)]
pub struct PayClient {
    config: MchConfig,
    client: WechatClient,
    /// Client presenting the merchant certificate.
    secure_client: Option<WechatClient>,
}

/// Render a signed `<xml>` body from a field table.
///
/// Fields left out of the signature are left out of the body as well.
pub fn signed_xml(fields: &[SignField<'_>], key: &str) -> String {
    let sign = sign_md5(fields, key);

    let mut xml = String::from("<xml>");
    for field in fields {
        if field.omit_if_empty && field.value.is_empty() {
            continue;
        }
        let value = field.value.to_sign_string();
        if value.is_empty() {
            continue;
        }
        xml.push_str(&format!("<{0}>{1}</{0}>", field.name, escape(&*value)));
    }
    xml.push_str(&format!("<{0}>{1}</{0}>", SIGN_FIELD, sign));
    xml.push_str("</xml>");
    xml
}

impl PayClient {
    pub fn builder() -> PayClientBuilder {
        PayClientBuilder::default()
    }

    pub fn config(&self) -> &MchConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    fn envelope<'a, R: SignableFields + ?Sized>(
        &'a self,
        request: &'a R,
        nonce: &'a str,
    ) -> Vec<SignField<'a>> {
        let mut fields = vec![
            SignField::required("appid", self.config.appid.as_str()),
            SignField::required("mch_id", &self.config.mch_id),
            SignField::required("nonce_str", nonce),
        ];
        fields.extend(request.sign_fields());
        fields
    }

    fn verify_sign(&self, response: &XmlResponse) -> Result<(), WechatError> {
        let (_, matched) = check_md5_sign(&response.fields, SIGN_FIELD, &self.config.pay_key);
        if !matched {
            warn!("pay response signature mismatch");
            return Err(WechatError::Signature(
                "pay response signature mismatch".to_string(),
            ));
        }
        Ok(())
    }

    async fn call_with<R: SignableFields + ?Sized>(
        &self,
        client: &WechatClient,
        path: &str,
        request: &R,
    ) -> Result<XmlResponse, WechatError> {
        let nonce = random_nonce(NONCE_LEN);
        let xml = signed_xml(&self.envelope(request, &nonce), &self.config.pay_key);

        let response = client.post_xml(path, xml).await?;
        self.verify_sign(&response)?;
        debug!("pay call {} succeeded", path);
        Ok(response)
    }

    /// Sign and send any merchant request, returning the verified answer.
    ///
    /// # Errors
    /// - `WechatError::Http` for transport failures
    /// - `WechatError::PayApi` for FAIL answers
    /// - `WechatError::Signature` when the answer's `sign` does not match
    pub async fn call<R: SignableFields + ?Sized>(
        &self,
        path: &str,
        request: &R,
    ) -> Result<XmlResponse, WechatError> {
        self.call_with(&self.client, path, request).await
    }

    /// [`call`](Self::call) over the client presenting the merchant
    /// certificate.
    ///
    /// # Errors
    /// `WechatError::Config` when no client identity was configured.
    pub async fn call_secure<R: SignableFields + ?Sized>(
        &self,
        path: &str,
        request: &R,
    ) -> Result<XmlResponse, WechatError> {
        let client = self.secure_client.as_ref().ok_or_else(|| {
            WechatError::Config(format!("{} requires a merchant client certificate", path))
        })?;
        self.call_with(client, path, request).await
    }

    pub async fn unified_order(
        &self,
        request: &UnifiedOrderRequest,
    ) -> Result<UnifiedOrderResponse, WechatError> {
        self.call(UNIFIED_ORDER_PATH, request).await?.decode()
    }

    pub async fn query_order(
        &self,
        request: &QueryOrderRequest,
    ) -> Result<QueryOrderResponse, WechatError> {
        if request.transaction_id.is_empty() && request.out_trade_no.is_empty() {
            return Err(WechatError::Config(
                "transaction_id or out_trade_no is required".to_string(),
            ));
        }
        self.call(ORDER_QUERY_PATH, request).await?.decode()
    }

    pub async fn close_order(&self, out_trade_no: &str) -> Result<(), WechatError> {
        let request = CloseOrderRequest {
            out_trade_no: out_trade_no.to_string(),
        };
        self.call(CLOSE_ORDER_PATH, &request).await?;
        Ok(())
    }

    /// Requires a client identity; see [`PayClientBuilder::client_identity`].
    pub async fn refund(&self, request: &RefundRequest) -> Result<RefundResponse, WechatError> {
        if request.transaction_id.is_empty() && request.out_trade_no.is_empty() {
            return Err(WechatError::Config(
                "transaction_id or out_trade_no is required".to_string(),
            ));
        }
        self.call_secure(REFUND_PATH, request).await?.decode()
    }

    pub async fn refund_query(
        &self,
        request: &RefundQueryRequest,
    ) -> Result<RefundQueryResponse, WechatError> {
        let response = self.call(REFUND_QUERY_PATH, request).await?;
        let mut decoded: RefundQueryResponse = response.decode()?;
        decoded.collect_refunds(&response.fields);
        Ok(decoded)
    }

    /// Download a statement as raw bytes.
    ///
    /// A successful answer is the bill itself and carries no signature: CSV
    /// text, or a gzip archive when `tar_type` is `GZIP`. Failures come back
    /// as an XML document.
    pub async fn download_bill(
        &self,
        request: &DownloadBillRequest,
    ) -> Result<Vec<u8>, WechatError> {
        let nonce = random_nonce(NONCE_LEN);
        let xml = signed_xml(&self.envelope(request, &nonce), &self.config.pay_key);

        let body = self.client.post_xml_bytes(DOWNLOAD_BILL_PATH, xml).await?;
        let start = body.iter().position(|b| !b.is_ascii_whitespace());
        if start.is_some_and(|i| body[i..].starts_with(b"<xml>")) {
            let text = std::str::from_utf8(&body).map_err(|e| {
                WechatError::MalformedPayload(format!("bill failure is not UTF-8: {}", e))
            })?;
            classify_xml(text)?;
        }
        Ok(body)
    }

    /// Classify and verify a payment result notification.
    pub fn parse_payment_notification(&self, body: &str) -> Result<PaymentNotification, WechatError> {
        let response = classify_xml(body)?;
        self.verify_sign(&response)?;
        response.decode()
    }

    /// Decrypt the `req_info` element of a refund notification.
    pub fn parse_refund_notification(&self, req_info: &str) -> Result<RefundNotification, WechatError> {
        parse_refund_notification(req_info, &self.config.pay_key)
    }

    /// Parse a whole refund notification body and decrypt its `req_info`.
    pub fn parse_refund_notification_body(
        &self,
        body: &str,
    ) -> Result<RefundNotification, WechatError> {
        let envelope: RefundNotificationEnvelope = quick_xml::de::from_str(body).map_err(|e| {
            WechatError::MalformedPayload(format!("invalid refund notification: {}", e))
        })?;
        if envelope.return_code != "SUCCESS" {
            return Err(WechatError::PayApi {
                return_code: envelope.return_code,
                result_code: String::new(),
                err_code: String::new(),
                message: envelope.return_msg,
                body: body.to_string(),
            });
        }
        if envelope.mch_id != self.config.mch_id {
            return Err(WechatError::Signature(format!(
                "refund notification for merchant {}",
                envelope.mch_id
            )));
        }
        self.parse_refund_notification(&envelope.req_info)
    }
}

/// Decrypt a refund notification's `req_info` with the merchant pay key.
///
/// # Errors
/// - `WechatError::Decrypt` for undecodable ciphertext or bad padding
/// - `WechatError::MalformedPayload` when the plaintext is not the
///   expected XML
pub fn parse_refund_notification(
    req_info: &str,
    pay_key: &str,
) -> Result<RefundNotification, WechatError> {
    let plaintext = decrypt_refund_info(req_info, pay_key)?;
    let xml = std::str::from_utf8(&plaintext)
        .map_err(|e| WechatError::MalformedPayload(format!("refund info is not UTF-8: {}", e)))?;
    quick_xml::de::from_str(xml)
        .map_err(|e| WechatError::MalformedPayload(format!("invalid refund info: {}", e)))
}

/// Answer WeChat expects after a notification was handled.
pub fn notification_reply(success: bool, message: &str) -> String {
    let code = if success { "SUCCESS" } else { "FAIL" };
    format!(
        "<xml><return_code><![CDATA[{}]]></return_code><return_msg><![CDATA[{}]]></return_msg></xml>",
        code, message
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::crypto::encrypt_refund_info;
    use crate::types::AppId;

    const KEY: &str = "192006250b4c09247ec02edce69f6a2d";

    fn client() -> PayClient {
        PayClient::builder()
            .appid(AppId::new("wx2421b1c4370ec43b").unwrap())
            .mch_id("10000100")
            .pay_key(KEY)
            .build()
            .unwrap()
    }

    #[test]
    fn test_signed_xml_matches_signature() {
        let fields = [
            SignField::required("appid", "wx2421b1c4370ec43b"),
            SignField::required("body", "a<b & c"),
            SignField::optional("attach", ""),
            SignField::required("total_fee", 1i64),
        ];
        let xml = signed_xml(&fields, KEY);
        assert!(xml.starts_with("<xml><appid>wx2421b1c4370ec43b</appid>"));
        assert!(xml.contains("<body>a&lt;b &amp; c</body>"));
        assert!(!xml.contains("attach"));

        let parsed: HashMap<String, String> = quick_xml::de::from_str(&xml).unwrap();
        assert_eq!(parsed["body"], "a<b & c");
        let (_, matched) = check_md5_sign(&parsed, "sign", KEY);
        assert!(matched);
    }

    #[test]
    fn test_envelope_prepends_merchant_fields() {
        let client = client();
        let request = CloseOrderRequest {
            out_trade_no: "T1".to_string(),
        };
        let fields = client.envelope(&request, "n");
        let names: Vec<&str> = fields.iter().map(|f| f.name).collect();
        assert_eq!(names, ["appid", "mch_id", "nonce_str", "out_trade_no"]);
    }

    #[test]
    fn test_refund_notification_decrypts() {
        let plain = "<root><out_refund_no><![CDATA[R1]]></out_refund_no><out_trade_no><![CDATA[T1]]></out_trade_no><refund_fee>50</refund_fee><refund_status><![CDATA[SUCCESS]]></refund_status><total_fee>100</total_fee><success_time><![CDATA[2024-01-01 10:00:00]]></success_time></root>";
        let req_info = encrypt_refund_info(plain.as_bytes(), KEY);

        let info = client().parse_refund_notification(&req_info).unwrap();
        assert_eq!(info.out_refund_no, "R1");
        assert_eq!(info.out_trade_no, "T1");
        assert_eq!(info.refund_fee, 50);
        assert_eq!(info.total_fee, 100);
        assert_eq!(info.refund_status, "SUCCESS");

        assert!(matches!(
            parse_refund_notification(&req_info, "another-key"),
            Err(WechatError::Decrypt(_)) | Err(WechatError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_refund_notification_body_checks_merchant() {
        let req_info = encrypt_refund_info(b"<root><refund_id>1</refund_id></root>", KEY);
        let body = format!(
            "<xml><return_code>SUCCESS</return_code><appid>wx2421b1c4370ec43b</appid><mch_id>999</mch_id><nonce_str>n</nonce_str><req_info><![CDATA[{}]]></req_info></xml>",
            req_info
        );
        assert!(matches!(
            client().parse_refund_notification_body(&body),
            Err(WechatError::Signature(_))
        ));

        let body = body.replace("<mch_id>999</mch_id>", "<mch_id>10000100</mch_id>");
        let info = client().parse_refund_notification_body(&body).unwrap();
        assert_eq!(info.refund_id, "1");
    }

    #[test]
    fn test_payment_notification_requires_valid_sign() {
        let fields = [
            SignField::required("return_code", "SUCCESS"),
            SignField::required("result_code", "SUCCESS"),
            SignField::required("appid", "wx2421b1c4370ec43b"),
            SignField::required("mch_id", "10000100"),
            SignField::required("out_trade_no", "T1"),
            SignField::required("total_fee", 1i64),
        ];
        let body = signed_xml(&fields, KEY);
        let notification = client().parse_payment_notification(&body).unwrap();
        assert_eq!(notification.out_trade_no, "T1");
        assert_eq!(notification.total_fee, 1);

        let tampered = body.replace("<total_fee>1</total_fee>", "<total_fee>100</total_fee>");
        assert!(matches!(
            client().parse_payment_notification(&tampered),
            Err(WechatError::Signature(_))
        ));
    }

    #[test]
    fn test_notification_reply() {
        assert_eq!(
            notification_reply(true, "OK"),
            "<xml><return_code><![CDATA[SUCCESS]]></return_code><return_msg><![CDATA[OK]]></return_msg></xml>"
        );
    }

    #[tokio::test]
    async fn test_refund_requires_identity() {
        let request = RefundRequest {
            out_trade_no: "T1".to_string(),
            out_refund_no: "R1".to_string(),
            total_fee: 1,
            refund_fee: 1,
            ..Default::default()
        };
        assert!(matches!(
            client().refund(&request).await,
            Err(WechatError::Config(_))
        ));
    }
}
