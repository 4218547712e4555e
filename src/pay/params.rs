//! Client-side payment invocation parameters

use serde::Serialize;

use super::PayClient;
use crate::sign::{sign_md5, SignField, SignableFields};
use crate::utils::{random_nonce, unix_now};

/// Parameters for `WeixinJSBridge.invoke('getBrandWCPayRequest')` and
/// `wx.requestPayment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsapiPayParams {
    #[serde(rename = "appId")]
    pub app_id: String,
    #[serde(rename = "timeStamp")]
    pub time_stamp: String,
    #[serde(rename = "nonceStr")]
    pub nonce_str: String,
    pub package: String,
    #[serde(rename = "signType")]
    pub sign_type: String,
    #[serde(rename = "paySign")]
    pub pay_sign: String,
}

impl SignableFields for JsapiPayParams {
    fn sign_fields(&self) -> Vec<SignField<'_>> {
        vec![
            SignField::required("appId", &self.app_id),
            SignField::required("timeStamp", &self.time_stamp),
            SignField::required("nonceStr", &self.nonce_str),
            SignField::required("package", &self.package),
            SignField::required("signType", &self.sign_type),
        ]
    }
}

/// Parameters for the native App payment SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppPayParams {
    pub appid: String,
    pub partnerid: String,
    pub prepayid: String,
    pub package: String,
    pub noncestr: String,
    pub timestamp: String,
    pub sign: String,
}

impl SignableFields for AppPayParams {
    fn sign_fields(&self) -> Vec<SignField<'_>> {
        vec![
            SignField::required("appid", &self.appid),
            SignField::required("partnerid", &self.partnerid),
            SignField::required("prepayid", &self.prepayid),
            SignField::required("package", &self.package),
            SignField::required("noncestr", &self.noncestr),
            SignField::required("timestamp", &self.timestamp),
        ]
    }
}

impl PayClient {
    /// JSAPI / mini-program payment parameters for a `prepay_id`.
    pub fn jsapi_pay_sign(&self, prepay_id: &str) -> JsapiPayParams {
        self.jsapi_pay_sign_at(prepay_id, unix_now(), &random_nonce(32))
    }

    pub(crate) fn jsapi_pay_sign_at(&self, prepay_id: &str, timestamp: i64, nonce: &str) -> JsapiPayParams {
        let mut params = JsapiPayParams {
            app_id: self.config.appid.as_str().to_string(),
            time_stamp: timestamp.to_string(),
            nonce_str: nonce.to_string(),
            package: format!("prepay_id={}", prepay_id),
            sign_type: "MD5".to_string(),
            pay_sign: String::new(),
        };
        params.pay_sign = sign_md5(&params, &self.config.pay_key);
        params
    }

    /// App payment parameters for a `prepay_id`.
    pub fn app_pay_sign(&self, prepay_id: &str) -> AppPayParams {
        self.app_pay_sign_at(prepay_id, unix_now(), &random_nonce(32))
    }

    pub(crate) fn app_pay_sign_at(&self, prepay_id: &str, timestamp: i64, nonce: &str) -> AppPayParams {
        let mut params = AppPayParams {
            appid: self.config.appid.as_str().to_string(),
            partnerid: self.config.mch_id.clone(),
            prepayid: prepay_id.to_string(),
            package: "Sign=WXPay".to_string(),
            noncestr: nonce.to_string(),
            timestamp: timestamp.to_string(),
            sign: String::new(),
        };
        params.sign = sign_md5(&params, &self.config.pay_key);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::md5_sign_string;
    use crate::types::AppId;

    fn client() -> PayClient {
        PayClient::builder()
            .appid(AppId::new("wx2421b1c4370ec43b").unwrap())
            .mch_id("10000100")
            .pay_key("192006250b4c09247ec02edce69f6a2d")
            .build()
            .unwrap()
    }

    #[test]
    fn test_jsapi_sign_uses_camel_case_names() {
        let params = client().jsapi_pay_sign_at("wx2017", 1414561699, "e61463f8efa94090b1f366cccfbbb444");
        assert_eq!(
            md5_sign_string(&params, "K"),
            "appId=wx2421b1c4370ec43b&nonceStr=e61463f8efa94090b1f366cccfbbb444&package=prepay_id=wx2017&signType=MD5&timeStamp=1414561699&key=K"
        );
        assert_eq!(params.pay_sign.len(), 32);
        assert_eq!(params.pay_sign, params.pay_sign.to_uppercase());

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["paySign"], params.pay_sign);
        assert_eq!(json["package"], "prepay_id=wx2017");
    }

    #[test]
    fn test_app_sign_fields() {
        let params = client().app_pay_sign_at("wx2017", 1414561699, "n1");
        assert_eq!(
            md5_sign_string(&params, "K"),
            "appid=wx2421b1c4370ec43b&noncestr=n1&package=Sign=WXPay&partnerid=10000100&prepayid=wx2017&timestamp=1414561699&key=K"
        );
        assert_eq!(
            params.sign,
            sign_md5(&params, "192006250b4c09247ec02edce69f6a2d")
        );
    }

    #[test]
    fn test_random_nonce_per_call() {
        let client = client();
        assert_ne!(
            client.jsapi_pay_sign("p").nonce_str,
            client.jsapi_pay_sign("p").nonce_str
        );
    }
}
