//! AES-256-ECB for merchant refund notifications
//!
//! The key is not the merchant pay key itself but the 32 ASCII bytes of its
//! lowercase hex MD5 digest.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyInit};
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use md5::{Digest, Md5};

use super::cipher::{pkcs7_pad, pkcs7_unpad, BLOCK_SIZE};
use crate::error::WechatError;

type Aes256EcbEnc = ecb::Encryptor<Aes256>;
type Aes256EcbDec = ecb::Decryptor<Aes256>;

/// Derive the refund-notification key from a merchant pay key.
pub fn refund_notification_key(pay_key: &str) -> [u8; 32] {
    let hex_digest = hex::encode(Md5::digest(pay_key.as_bytes()));
    let mut key = [0u8; 32];
    key.copy_from_slice(hex_digest.as_bytes());
    key
}

/// Decrypt a base64 `req_info` value.
pub fn decrypt_refund_info(req_info: &str, pay_key: &str) -> Result<Vec<u8>, WechatError> {
    let ciphertext = BASE64
        .decode(req_info.trim())
        .map_err(|e| WechatError::Decrypt(format!("invalid base64 req_info: {}", e)))?;

    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(WechatError::Decrypt(format!(
            "req_info length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_SIZE
        )));
    }

    let key = refund_notification_key(pay_key);
    let decryptor = Aes256EcbDec::new(&key.into());
    let mut buf = ciphertext;
    let plaintext = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| WechatError::Decrypt(format!("block decrypt failed: {:?}", e)))?;

    Ok(pkcs7_unpad(plaintext, BLOCK_SIZE)?.to_vec())
}

/// Produce a `req_info` value the way WeChat Pay does.
pub fn encrypt_refund_info(plaintext: &[u8], pay_key: &str) -> String {
    let key = refund_notification_key(pay_key);
    let mut buf = pkcs7_pad(plaintext, BLOCK_SIZE);
    let len = buf.len();
    let encryptor = Aes256EcbEnc::new(&key.into());
    // Block aligned, NoPadding cannot fail.
    let _ = encryptor.encrypt_padded_mut::<NoPadding>(&mut buf, len);
    BASE64.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refund_key_is_hex_md5() {
        let key = refund_notification_key("paykey");
        assert_eq!(&key[..], b"c387bfee685058b13dd97c15d150a44e");
    }

    #[test]
    fn test_refund_info_round_trip() {
        let xml = b"<root><out_refund_no>R1</out_refund_no></root>";
        let encrypted = encrypt_refund_info(xml, "paykey");
        assert_eq!(decrypt_refund_info(&encrypted, "paykey").unwrap(), xml);
    }

    #[test]
    fn test_wrong_key_fails_or_differs() {
        let xml = b"<root><out_refund_no>R1</out_refund_no></root>";
        let encrypted = encrypt_refund_info(xml, "paykey");
        match decrypt_refund_info(&encrypted, "other") {
            Ok(plain) => assert_ne!(plain, xml),
            Err(e) => assert!(matches!(e, WechatError::Decrypt(_))),
        }
    }

    #[test]
    fn test_unaligned_req_info_rejected() {
        let encoded = BASE64.encode([0u8; 10]);
        assert!(matches!(
            decrypt_refund_info(&encoded, "paykey"),
            Err(WechatError::Decrypt(_))
        ));
    }
}
