//! MD5 signature over a request's declared fields (merchant pay style)

use md5::{Digest, Md5};

use super::value::SignValue;
use crate::utils::constant_time_eq;

/// One entry of a signable field table.
#[derive(Debug, Clone)]
pub struct SignField<'a> {
    /// Wire name, exactly as serialized.
    pub name: &'static str,
    pub value: SignValue<'a>,
    /// Leave the field out when it holds its zero value.
    pub omit_if_empty: bool,
}

impl<'a> SignField<'a> {
    pub fn required(name: &'static str, value: impl Into<SignValue<'a>>) -> Self {
        Self {
            name,
            value: value.into(),
            omit_if_empty: false,
        }
    }

    pub fn optional(name: &'static str, value: impl Into<SignValue<'a>>) -> Self {
        Self {
            name,
            value: value.into(),
            omit_if_empty: true,
        }
    }
}

/// Types that can be MD5-signed.
///
/// Implementors list every wire field that takes part in the signature.
/// The signature field itself is normally listed too: it is empty while
/// signing and therefore never part of the signed string.
pub trait SignableFields {
    fn sign_fields(&self) -> Vec<SignField<'_>>;
}

impl SignableFields for [SignField<'_>] {
    fn sign_fields(&self) -> Vec<SignField<'_>> {
        self.to_vec()
    }
}

fn join_with_key<'a, K, I>(pairs: I, key: &str) -> String
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, SignValue<'a>)>,
{
    let mut pairs: Vec<(K, SignValue<'a>)> = pairs.into_iter().collect();
    pairs.sort_by(|a, b| a.0.as_ref().as_bytes().cmp(b.0.as_ref().as_bytes()));

    let mut out = String::new();
    for (name, value) in &pairs {
        let text = value.to_sign_string();
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(name.as_ref());
        out.push('=');
        out.push_str(&text);
    }
    out.push_str("&key=");
    out.push_str(key);
    out
}

fn md5_upper_hex(input: &str) -> String {
    hex::encode_upper(Md5::digest(input.as_bytes()))
}

/// The exact string hashed by [`sign_md5`].
pub fn md5_sign_string<T: SignableFields + ?Sized>(data: &T, key: &str) -> String {
    let fields = data.sign_fields();
    join_with_key(
        fields
            .into_iter()
            .filter(|f| !(f.omit_if_empty && f.value.is_empty()))
            .map(|f| (f.name, f.value)),
        key,
    )
}

/// Uppercase hex MD5 over the sorted fields followed by `&key=<key>`.
pub fn sign_md5<T: SignableFields + ?Sized>(data: &T, key: &str) -> String {
    md5_upper_hex(&md5_sign_string(data, key))
}

/// Recompute the MD5 signature of an already decoded response and compare
/// it with the value stored under `sign_name`.
///
/// The signature field and empty values are excluded from the recomputed
/// string. Returns the recomputed digest and whether it matched.
pub fn check_md5_sign<K, V, I>(data: I, sign_name: &str, key: &str) -> (String, bool)
where
    K: AsRef<str>,
    V: AsRef<str>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut received: Option<String> = None;
    let mut pairs: Vec<(String, SignValue<'static>)> = Vec::new();

    for (k, v) in data {
        if k.as_ref() == sign_name {
            received = Some(v.as_ref().to_string());
            continue;
        }
        pairs.push((k.as_ref().to_string(), SignValue::from(v.as_ref().to_string())));
    }

    let digest = md5_upper_hex(&join_with_key(pairs, key));
    let matched = received
        .as_deref()
        .map(|r| constant_time_eq(r.as_bytes(), digest.as_bytes()))
        .unwrap_or(false);
    (digest, matched)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct Sample {
        appid: String,
        mch_id: String,
        device_info: String,
        body: String,
        nonce_str: String,
        sign: String,
    }

    impl SignableFields for Sample {
        fn sign_fields(&self) -> Vec<SignField<'_>> {
            vec![
                SignField::required("appid", &self.appid),
                SignField::required("mch_id", &self.mch_id),
                SignField::optional("device_info", &self.device_info),
                SignField::required("body", &self.body),
                SignField::required("nonce_str", &self.nonce_str),
                SignField::required("sign", &self.sign),
            ]
        }
    }

    fn sample() -> Sample {
        Sample {
            appid: "wxd930ea5d5a258f4f".into(),
            mch_id: "10000100".into(),
            device_info: "1000".into(),
            body: "test".into(),
            nonce_str: "ibuaiVcKdpRxkhJA".into(),
            sign: String::new(),
        }
    }

    const KEY: &str = "192006250b4c09247ec02edce69f6a2d";

    #[test]
    fn test_sign_md5_fixture() {
        let data = sample();
        assert_eq!(
            md5_sign_string(&data, KEY),
            "appid=wxd930ea5d5a258f4f&body=test&device_info=1000&mch_id=10000100&nonce_str=ibuaiVcKdpRxkhJA&key=192006250b4c09247ec02edce69f6a2d"
        );
        assert_eq!(sign_md5(&data, KEY), "9A0A8659F005D6984697E2CA0A9CF3B7");
    }

    #[test]
    fn test_omit_if_empty_field_is_skipped() {
        let mut data = sample();
        data.device_info = String::new();
        assert!(!md5_sign_string(&data, KEY).contains("device_info"));
    }

    #[test]
    fn test_required_zero_values_still_signed() {
        struct Flags {
            total_fee: i64,
            coupon: i64,
            profit_sharing: bool,
        }
        impl SignableFields for Flags {
            fn sign_fields(&self) -> Vec<SignField<'_>> {
                vec![
                    SignField::required("total_fee", self.total_fee),
                    SignField::optional("coupon", self.coupon),
                    SignField::required("profit_sharing", self.profit_sharing),
                ]
            }
        }
        let s = md5_sign_string(
            &Flags {
                total_fee: 0,
                coupon: 0,
                profit_sharing: false,
            },
            "k",
        );
        assert_eq!(s, "profit_sharing=false&total_fee=0&key=k");
    }

    #[test]
    fn test_all_empty_still_appends_key() {
        struct Empty;
        impl SignableFields for Empty {
            fn sign_fields(&self) -> Vec<SignField<'_>> {
                vec![SignField::required("a", "")]
            }
        }
        assert_eq!(md5_sign_string(&Empty, "k"), "&key=k");
    }

    #[test]
    fn test_check_md5_sign_deterministic_over_hash_map() {
        let mut map = HashMap::new();
        map.insert("appid".to_string(), "wxd930ea5d5a258f4f".to_string());
        map.insert("mch_id".to_string(), "10000100".to_string());
        map.insert("device_info".to_string(), "1000".to_string());
        map.insert("body".to_string(), "test".to_string());
        map.insert("nonce_str".to_string(), "ibuaiVcKdpRxkhJA".to_string());
        map.insert(
            "sign".to_string(),
            "9A0A8659F005D6984697E2CA0A9CF3B7".to_string(),
        );

        let (first, ok) = check_md5_sign(&map, "sign", KEY);
        assert!(ok);
        let (second, _) = check_md5_sign(&map, "sign", KEY);
        assert_eq!(first, second);
        assert_eq!(first, sign_md5(&sample(), KEY));
    }

    #[test]
    fn test_check_md5_sign_detects_tampering() {
        let mut map = HashMap::new();
        map.insert("total_fee".to_string(), "1".to_string());
        map.insert("sign".to_string(), "00000000000000000000000000000000".to_string());
        let (_, ok) = check_md5_sign(&map, "sign", KEY);
        assert!(!ok);
    }

    #[test]
    fn test_check_md5_sign_missing_sign_field() {
        let map: Vec<(&str, &str)> = vec![("a", "1")];
        let (digest, ok) = check_md5_sign(map, "sign", KEY);
        assert_eq!(digest.len(), 32);
        assert!(!ok);
    }
}
