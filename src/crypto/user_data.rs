//! AES-128-CBC decryption of mini-program user data
//!
//! The client hands over `encryptedData` and `iv` from `wx.getUserInfo` or
//! `getPhoneNumber`; the key is the `session_key` obtained at login.

use aes::cipher::{BlockDecryptMut, KeyIvInit};
use aes::Aes128;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::block_padding::Pkcs7;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::WechatError;
use crate::types::Watermark;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Decrypted user data with watermark
#[derive(Debug, Clone, Deserialize)]
pub struct DecryptedUserData {
    /// Scenario-specific fields (openId, nickName, phoneNumber, ...)
    #[serde(flatten)]
    pub data: serde_json::Value,
    pub watermark: Watermark,
}

impl DecryptedUserData {
    /// Re-read the payload fields as a concrete type.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, WechatError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| WechatError::MalformedPayload(format!("unexpected user data: {}", e)))
    }
}

/// Phone number returned by the `getPhoneNumber` button.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    pub phone_number: String,
    pub pure_phone_number: String,
    pub country_code: String,
}

/// Profile returned by `wx.getUserInfo`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    #[serde(rename = "openId")]
    pub open_id: String,
    pub nick_name: String,
    pub avatar_url: String,
    pub gender: i32,
    pub province: String,
    pub city: String,
    pub country: String,
    pub language: String,
    #[serde(rename = "unionId")]
    pub union_id: String,
}

fn decode_field(name: &str, value: &str, expected_len: Option<usize>) -> Result<Vec<u8>, WechatError> {
    let bytes = BASE64
        .decode(value)
        .map_err(|e| WechatError::Decrypt(format!("invalid {}: {}", name, e)))?;
    if let Some(expected) = expected_len {
        if bytes.len() != expected {
            return Err(WechatError::Decrypt(format!(
                "invalid {} length: expected {}, got {}",
                name,
                expected,
                bytes.len()
            )));
        }
    }
    Ok(bytes)
}

/// Decrypt user data into raw JSON bytes.
pub fn decrypt_user_data_bytes(
    session_key: &str,
    encrypted_data: &str,
    iv: &str,
) -> Result<Vec<u8>, WechatError> {
    let key = decode_field("session_key", session_key, Some(16))?;
    let iv = decode_field("iv", iv, Some(16))?;
    let mut buffer = decode_field("encrypted_data", encrypted_data, None)?;
    if buffer.is_empty() {
        return Err(WechatError::Decrypt("encrypted_data is empty".to_string()));
    }

    let decryptor = Aes128CbcDec::new(key.as_slice().into(), iv.as_slice().into());
    let plaintext = decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .map_err(|e| WechatError::Decrypt(format!("block decrypt failed: {:?}", e)))?;
    Ok(plaintext.to_vec())
}

/// Decrypt user data and parse it together with its watermark.
pub fn decrypt_user_data(
    session_key: &str,
    encrypted_data: &str,
    iv: &str,
) -> Result<DecryptedUserData, WechatError> {
    let plaintext = decrypt_user_data_bytes(session_key, encrypted_data, iv)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| WechatError::MalformedPayload(format!("invalid user data JSON: {}", e)))
}

/// Decrypt a `getPhoneNumber` payload.
pub fn decrypt_phone_number(
    session_key: &str,
    encrypted_data: &str,
    iv: &str,
) -> Result<(PhoneNumber, Watermark), WechatError> {
    let data = decrypt_user_data(session_key, encrypted_data, iv)?;
    Ok((data.parse()?, data.watermark))
}

/// Decrypt a `wx.getUserInfo` payload.
pub fn decrypt_user_info(
    session_key: &str,
    encrypted_data: &str,
    iv: &str,
) -> Result<(UserInfo, Watermark), WechatError> {
    let data = decrypt_user_data(session_key, encrypted_data, iv)?;
    Ok((data.parse()?, data.watermark))
}

/// Check that the data was encrypted for the expected mini-program.
pub fn verify_watermark(data: &DecryptedUserData, expected_appid: &str) -> Result<(), WechatError> {
    if data.watermark.appid != expected_appid {
        return Err(WechatError::Signature(format!(
            "watermark appid mismatch: expected {}, got {}",
            expected_appid, data.watermark.appid
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    fn encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &str) -> String {
        let encryptor = cbc::Encryptor::<Aes128>::new(key.into(), iv.into());
        let len = plaintext.len();
        let mut buf = plaintext.as_bytes().to_vec();
        buf.resize(len + 16, 0);
        let ciphertext = encryptor.encrypt_padded_mut::<Pkcs7>(&mut buf, len).unwrap();
        BASE64.encode(ciphertext)
    }

    const KEY: &[u8; 16] = b"sessionkey123456";
    const IV: &[u8; 16] = b"initialvec123456";

    #[test]
    fn test_decrypt_phone_number() {
        let plaintext = r#"{"phoneNumber":"+8613800138000","purePhoneNumber":"13800138000","countryCode":"86","watermark":{"timestamp":1612137600,"appid":"wx1234567890abcdef"}}"#;
        let encrypted = encrypt(KEY, IV, plaintext);

        let (phone, watermark) =
            decrypt_phone_number(&BASE64.encode(KEY), &encrypted, &BASE64.encode(IV)).unwrap();
        assert_eq!(phone.pure_phone_number, "13800138000");
        assert_eq!(phone.country_code, "86");
        assert_eq!(watermark.timestamp, 1612137600);
    }

    #[test]
    fn test_decrypt_user_info_with_missing_fields() {
        let plaintext = r#"{"openId":"o123","nickName":"用户昵称","gender":1,"watermark":{"timestamp":1,"appid":"wxabc"}}"#;
        let encrypted = encrypt(KEY, IV, plaintext);

        let (user, _) =
            decrypt_user_info(&BASE64.encode(KEY), &encrypted, &BASE64.encode(IV)).unwrap();
        assert_eq!(user.open_id, "o123");
        assert_eq!(user.nick_name, "用户昵称");
        assert_eq!(user.gender, 1);
        assert!(user.union_id.is_empty());
    }

    #[test]
    fn test_invalid_inputs_are_decrypt_errors() {
        let key = BASE64.encode(KEY);
        let iv = BASE64.encode(IV);
        for (k, d, i) in [
            ("not-valid-base64!!!", "AAAA", iv.as_str()),
            (key.as_str(), "not-valid!!!", iv.as_str()),
            (key.as_str(), "", iv.as_str()),
            (key.as_str(), "AAAA", "MTIz"),
            ("MTIz", "AAAA", iv.as_str()),
        ] {
            assert!(
                matches!(decrypt_user_data(k, d, i), Err(WechatError::Decrypt(_))),
                "{} / {} / {}",
                k,
                d,
                i
            );
        }
    }

    #[test]
    fn test_non_json_plaintext_is_malformed() {
        let encrypted = encrypt(KEY, IV, "not json");
        assert!(matches!(
            decrypt_user_data(&BASE64.encode(KEY), &encrypted, &BASE64.encode(IV)),
            Err(WechatError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_verify_watermark() {
        let data = DecryptedUserData {
            data: serde_json::json!({"openid": "test"}),
            watermark: Watermark {
                timestamp: 1234567890,
                appid: "wx1234567890".to_string(),
            },
        };
        assert!(verify_watermark(&data, "wx1234567890").is_ok());
        assert!(matches!(
            verify_watermark(&data, "wx9999999999"),
            Err(WechatError::Signature(_))
        ));
    }
}
