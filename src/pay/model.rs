//! Merchant pay request and response payloads
//!
//! Requests only describe their signable fields; [`super::PayClient`] adds
//! `appid`, `mch_id`, `nonce_str` and `sign` and renders the `<xml>` body
//! from the same table. Responses deserialize from the XML answer with
//! every field defaulted, since WeChat omits empty elements.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::sign::{SignField, SignableFields};

// ---- Unified order ----

/// `/pay/unifiedorder` request.
#[derive(Debug, Clone, Default)]
pub struct UnifiedOrderRequest {
    pub device_info: String,
    pub body: String,
    pub detail: String,
    pub attach: String,
    pub out_trade_no: String,
    pub fee_type: String,
    /// Amount in fen.
    pub total_fee: i64,
    pub spbill_create_ip: String,
    pub time_start: String,
    pub time_expire: String,
    pub goods_tag: String,
    pub notify_url: String,
    /// `JSAPI`, `NATIVE`, `APP` or `MWEB`.
    pub trade_type: String,
    pub product_id: String,
    pub limit_pay: String,
    /// Required for `JSAPI`.
    pub openid: String,
    pub scene_info: String,
}

impl SignableFields for UnifiedOrderRequest {
    fn sign_fields(&self) -> Vec<SignField<'_>> {
        vec![
            SignField::optional("device_info", &self.device_info),
            SignField::required("body", &self.body),
            SignField::optional("detail", &self.detail),
            SignField::optional("attach", &self.attach),
            SignField::required("out_trade_no", &self.out_trade_no),
            SignField::optional("fee_type", &self.fee_type),
            SignField::required("total_fee", self.total_fee),
            SignField::required("spbill_create_ip", &self.spbill_create_ip),
            SignField::optional("time_start", &self.time_start),
            SignField::optional("time_expire", &self.time_expire),
            SignField::optional("goods_tag", &self.goods_tag),
            SignField::required("notify_url", &self.notify_url),
            SignField::required("trade_type", &self.trade_type),
            SignField::optional("product_id", &self.product_id),
            SignField::optional("limit_pay", &self.limit_pay),
            SignField::optional("openid", &self.openid),
            SignField::optional("scene_info", &self.scene_info),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UnifiedOrderResponse {
    pub appid: String,
    pub mch_id: String,
    pub device_info: String,
    pub nonce_str: String,
    pub sign: String,
    pub trade_type: String,
    pub prepay_id: String,
    /// QR code link for `NATIVE` orders.
    pub code_url: String,
    /// Redirect link for `MWEB` orders.
    pub mweb_url: String,
}

// ---- Order query / close ----

/// `/pay/orderquery` request; one of the two ids is required.
#[derive(Debug, Clone, Default)]
pub struct QueryOrderRequest {
    pub transaction_id: String,
    pub out_trade_no: String,
}

impl QueryOrderRequest {
    pub fn by_transaction_id(id: impl Into<String>) -> Self {
        Self {
            transaction_id: id.into(),
            ..Default::default()
        }
    }

    pub fn by_out_trade_no(no: impl Into<String>) -> Self {
        Self {
            out_trade_no: no.into(),
            ..Default::default()
        }
    }
}

impl SignableFields for QueryOrderRequest {
    fn sign_fields(&self) -> Vec<SignField<'_>> {
        vec![
            SignField::optional("transaction_id", &self.transaction_id),
            SignField::optional("out_trade_no", &self.out_trade_no),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryOrderResponse {
    pub appid: String,
    pub mch_id: String,
    pub device_info: String,
    pub openid: String,
    pub is_subscribe: String,
    pub trade_type: String,
    /// `SUCCESS`, `REFUND`, `NOTPAY`, `CLOSED`, `REVOKED`, `USERPAYING` or
    /// `PAYERROR`.
    pub trade_state: String,
    pub bank_type: String,
    pub total_fee: i64,
    pub settlement_total_fee: i64,
    pub fee_type: String,
    pub cash_fee: i64,
    pub cash_fee_type: String,
    pub coupon_fee: i64,
    pub coupon_count: i64,
    pub transaction_id: String,
    pub out_trade_no: String,
    pub attach: String,
    pub time_end: String,
    pub trade_state_desc: String,
}

#[derive(Debug, Clone, Default)]
pub struct CloseOrderRequest {
    pub out_trade_no: String,
}

impl SignableFields for CloseOrderRequest {
    fn sign_fields(&self) -> Vec<SignField<'_>> {
        vec![SignField::required("out_trade_no", &self.out_trade_no)]
    }
}

// ---- Refund ----

/// `/secapi/pay/refund` request; one of `transaction_id` and
/// `out_trade_no` is required.
#[derive(Debug, Clone, Default)]
pub struct RefundRequest {
    pub sign_type: String,
    pub transaction_id: String,
    pub out_trade_no: String,
    pub out_refund_no: String,
    pub total_fee: i64,
    pub refund_fee: i64,
    pub refund_fee_type: String,
    pub refund_desc: String,
    pub refund_account: String,
    pub notify_url: String,
}

impl SignableFields for RefundRequest {
    fn sign_fields(&self) -> Vec<SignField<'_>> {
        vec![
            SignField::optional("sign_type", &self.sign_type),
            SignField::optional("transaction_id", &self.transaction_id),
            SignField::optional("out_trade_no", &self.out_trade_no),
            SignField::required("out_refund_no", &self.out_refund_no),
            SignField::required("total_fee", self.total_fee),
            SignField::required("refund_fee", self.refund_fee),
            SignField::optional("refund_fee_type", &self.refund_fee_type),
            SignField::optional("refund_desc", &self.refund_desc),
            SignField::optional("refund_account", &self.refund_account),
            SignField::optional("notify_url", &self.notify_url),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RefundResponse {
    pub appid: String,
    pub mch_id: String,
    pub transaction_id: String,
    pub out_trade_no: String,
    pub out_refund_no: String,
    pub refund_id: String,
    pub refund_channel: String,
    pub refund_fee: i64,
    pub settlement_refund_fee: i64,
    pub total_fee: i64,
    pub settlement_total_fee: i64,
    pub fee_type: String,
    pub cash_fee: i64,
    pub cash_fee_type: String,
    pub cash_refund_fee: i64,
    pub coupon_refund_fee: i64,
    pub coupon_refund_count: i64,
}

/// `/pay/refundquery` request; one of the four ids is required.
#[derive(Debug, Clone, Default)]
pub struct RefundQueryRequest {
    pub sign_type: String,
    pub transaction_id: String,
    pub out_trade_no: String,
    pub out_refund_no: String,
    pub refund_id: String,
    /// Page offset when an order has more than 10 refunds.
    pub offset: i64,
}

impl SignableFields for RefundQueryRequest {
    fn sign_fields(&self) -> Vec<SignField<'_>> {
        vec![
            SignField::optional("sign_type", &self.sign_type),
            SignField::optional("transaction_id", &self.transaction_id),
            SignField::optional("out_trade_no", &self.out_trade_no),
            SignField::optional("out_refund_no", &self.out_refund_no),
            SignField::optional("refund_id", &self.refund_id),
            SignField::optional("offset", self.offset),
        ]
    }
}

/// One refund of a [`RefundQueryResponse`], read from the `_<n>` suffixed
/// elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefundRecord {
    pub out_refund_no: String,
    pub refund_id: String,
    pub refund_channel: String,
    pub refund_fee: i64,
    pub settlement_refund_fee: i64,
    pub refund_status: String,
    pub refund_account: String,
    pub refund_recv_accout: String,
    pub refund_success_time: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RefundQueryResponse {
    pub appid: String,
    pub mch_id: String,
    pub total_refund_count: i64,
    pub transaction_id: String,
    pub out_trade_no: String,
    pub total_fee: i64,
    pub settlement_total_fee: i64,
    pub fee_type: String,
    pub cash_fee: i64,
    pub refund_count: i64,
    #[serde(skip)]
    pub refunds: Vec<RefundRecord>,
}

impl RefundQueryResponse {
    /// Collect the indexed refund records from the flattened answer.
    pub(crate) fn collect_refunds(&mut self, fields: &HashMap<String, String>) {
        let text = |name: &str, n: i64| {
            fields
                .get(&format!("{}_{}", name, n))
                .cloned()
                .unwrap_or_default()
        };
        let number = |name: &str, n: i64| text(name, n).parse::<i64>().unwrap_or(0);

        let present = fields
            .keys()
            .filter(|key| key.starts_with("out_refund_no_"))
            .count() as i64;

        self.refunds = (0..self.refund_count.clamp(0, present))
            .map(|n| RefundRecord {
                out_refund_no: text("out_refund_no", n),
                refund_id: text("refund_id", n),
                refund_channel: text("refund_channel", n),
                refund_fee: number("refund_fee", n),
                settlement_refund_fee: number("settlement_refund_fee", n),
                refund_status: text("refund_status", n),
                refund_account: text("refund_account", n),
                refund_recv_accout: text("refund_recv_accout", n),
                refund_success_time: text("refund_success_time", n),
            })
            .collect();
    }
}

// ---- Bill ----

/// `/pay/downloadbill` request.
#[derive(Debug, Clone, Default)]
pub struct DownloadBillRequest {
    /// `yyyyMMdd`.
    pub bill_date: String,
    /// `ALL`, `SUCCESS`, `REFUND` or `RECHARGE_REFUND`.
    pub bill_type: String,
    /// `GZIP` to receive a compressed file.
    pub tar_type: String,
}

impl SignableFields for DownloadBillRequest {
    fn sign_fields(&self) -> Vec<SignField<'_>> {
        vec![
            SignField::required("bill_date", &self.bill_date),
            SignField::required("bill_type", &self.bill_type),
            SignField::optional("tar_type", &self.tar_type),
        ]
    }
}

// ---- Notifications ----

/// Payment result POSTed to `notify_url`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PaymentNotification {
    pub appid: String,
    pub mch_id: String,
    pub device_info: String,
    pub openid: String,
    pub is_subscribe: String,
    pub trade_type: String,
    pub bank_type: String,
    pub total_fee: i64,
    pub settlement_total_fee: i64,
    pub fee_type: String,
    pub cash_fee: i64,
    pub transaction_id: String,
    pub out_trade_no: String,
    pub attach: String,
    pub time_end: String,
}

/// Outer refund notification; `req_info` is encrypted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RefundNotificationEnvelope {
    pub return_code: String,
    pub return_msg: String,
    pub appid: String,
    pub mch_id: String,
    pub nonce_str: String,
    pub req_info: String,
}

/// Decrypted `req_info` of a refund notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RefundNotification {
    pub transaction_id: String,
    pub out_trade_no: String,
    pub refund_id: String,
    pub out_refund_no: String,
    pub total_fee: i64,
    pub settlement_total_fee: i64,
    pub refund_fee: i64,
    pub settlement_refund_fee: i64,
    /// `SUCCESS`, `CHANGE` or `REFUNDCLOSE`.
    pub refund_status: String,
    pub success_time: String,
    pub refund_recv_accout: String,
    pub refund_account: String,
    pub refund_request_source: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::md5_sign_string;

    #[test]
    fn test_unified_order_omits_empty_optionals() {
        let order = UnifiedOrderRequest {
            body: "test".to_string(),
            out_trade_no: "1217752501201407033233368018".to_string(),
            total_fee: 1,
            spbill_create_ip: "127.0.0.1".to_string(),
            notify_url: "https://example.com/notify".to_string(),
            trade_type: "NATIVE".to_string(),
            ..Default::default()
        };
        assert_eq!(
            md5_sign_string(&order, "k"),
            "body=test&notify_url=https://example.com/notify&out_trade_no=1217752501201407033233368018&spbill_create_ip=127.0.0.1&total_fee=1&trade_type=NATIVE&key=k"
        );
    }

    #[test]
    fn test_refund_query_zero_offset_is_omitted() {
        let query = RefundQueryRequest {
            out_trade_no: "T1".to_string(),
            ..Default::default()
        };
        assert_eq!(md5_sign_string(&query, "k"), "out_trade_no=T1&key=k");
    }

    #[test]
    fn test_collect_refund_records() {
        let body = "<xml><refund_count>2</refund_count><total_fee>100</total_fee><out_refund_no_0>R0</out_refund_no_0><refund_fee_0>30</refund_fee_0><refund_status_0>SUCCESS</refund_status_0><out_refund_no_1>R1</out_refund_no_1><refund_fee_1>70</refund_fee_1><refund_status_1>PROCESSING</refund_status_1></xml>";
        let fields: HashMap<String, String> = quick_xml::de::from_str(body).unwrap();
        let mut response: RefundQueryResponse = quick_xml::de::from_str(body).unwrap();
        response.collect_refunds(&fields);

        assert_eq!(response.total_fee, 100);
        assert_eq!(response.refunds.len(), 2);
        assert_eq!(response.refunds[0].out_refund_no, "R0");
        assert_eq!(response.refunds[1].refund_fee, 70);
        assert_eq!(response.refunds[1].refund_status, "PROCESSING");
    }

    #[test]
    fn test_refund_count_is_capped_by_present_records() {
        let body = "<xml><refund_count>2000000000</refund_count><out_refund_no_0>R0</out_refund_no_0></xml>";
        let fields: HashMap<String, String> = quick_xml::de::from_str(body).unwrap();
        let mut response: RefundQueryResponse = quick_xml::de::from_str(body).unwrap();
        response.collect_refunds(&fields);

        assert_eq!(response.refund_count, 2000000000);
        assert_eq!(response.refunds.len(), 1);
        assert_eq!(response.refunds[0].out_refund_no, "R0");
    }
}
