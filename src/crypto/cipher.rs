//! AES-256-CBC for the component message channel
//!
//! WeChat derives the IV from the key itself instead of sending one. That is
//! an external protocol requirement and lives in
//! [`derive_component_message_iv`] so it is never mistaken for a general
//! purpose cipher helper.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use rand::RngCore;

use crate::error::WechatError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const BLOCK_SIZE: usize = 16;

/// WeChat's own encoder pads messages to 32-byte multiples, so inbound pad
/// lengths go up to 32 even though we pad to the AES block size.
pub const MESSAGE_PAD_LIMIT: usize = 32;

const RANDOM_PREFIX_LEN: usize = 16;
const LENGTH_FIELD_LEN: usize = 4;

/// EncodingAESKeys are 43 characters; the last one may carry non-zero
/// trailing bits.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// 32-byte AES key decoded from a 43-character EncodingAESKey.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodingAesKey([u8; 32]);

impl EncodingAesKey {
    pub fn new(encoded: &str) -> Result<Self, WechatError> {
        let encoded = encoded.trim();
        if encoded.len() != 43 {
            return Err(WechatError::Config(format!(
                "EncodingAESKey must be 43 characters, got {}",
                encoded.len()
            )));
        }

        let decoded = KEY_ENGINE
            .decode(format!("{encoded}="))
            .map_err(|e| WechatError::Config(format!("Invalid EncodingAESKey: {}", e)))?;

        let key: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            WechatError::Config(format!(
                "EncodingAESKey must decode to 32 bytes, got {}",
                decoded.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for EncodingAesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncodingAesKey([REDACTED])")
    }
}

/// IV used by the component message protocol: the first block of the key.
pub fn derive_component_message_iv(key: &EncodingAesKey) -> [u8; BLOCK_SIZE] {
    let mut iv = [0u8; BLOCK_SIZE];
    iv.copy_from_slice(&key.as_bytes()[..BLOCK_SIZE]);
    iv
}

/// Append PKCS#7 padding up to the next multiple of `block_size`.
///
/// A full block is appended when the input is already aligned.
pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad = block_size - data.len() % block_size;
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.resize(data.len() + pad, pad as u8);
    out
}

/// Strip PKCS#7 padding after checking it.
///
/// The pad length must be in `1..=max_pad`, must not exceed the data, and
/// every pad byte must equal it.
pub fn pkcs7_unpad(data: &[u8], max_pad: usize) -> Result<&[u8], WechatError> {
    let last = *data
        .last()
        .ok_or_else(|| WechatError::Decrypt("empty plaintext".to_string()))?;
    let pad = usize::from(last);

    if pad == 0 || pad > max_pad || pad > data.len() {
        return Err(WechatError::Decrypt(format!("invalid padding length {}", pad)));
    }

    let (body, padding) = data.split_at(data.len() - pad);
    if padding.iter().any(|&b| b != last) {
        return Err(WechatError::Decrypt("inconsistent padding bytes".to_string()));
    }
    Ok(body)
}

/// Encrypt with AES-256-CBC, IV taken from the key, PKCS#7 to 16 bytes.
pub fn aes_cbc_encrypt(plaintext: &[u8], key: &EncodingAesKey) -> Vec<u8> {
    let iv = derive_component_message_iv(key);
    let mut buf = pkcs7_pad(plaintext, BLOCK_SIZE);
    let len = buf.len();
    let encryptor = Aes256CbcEnc::new(key.as_bytes().into(), &iv.into());
    // The buffer is block aligned, so NoPadding cannot fail.
    let _ = encryptor.encrypt_padded_mut::<NoPadding>(&mut buf, len);
    buf
}

/// Decrypt AES-256-CBC produced by [`aes_cbc_encrypt`] or by WeChat.
pub fn aes_cbc_decrypt(ciphertext: &[u8], key: &EncodingAesKey) -> Result<Vec<u8>, WechatError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(WechatError::Decrypt(format!(
            "ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_SIZE
        )));
    }

    let iv = derive_component_message_iv(key);
    let decryptor = Aes256CbcDec::new(key.as_bytes().into(), &iv.into());
    let mut buf = ciphertext.to_vec();
    let plaintext = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| WechatError::Decrypt(format!("block decrypt failed: {:?}", e)))?;

    Ok(pkcs7_unpad(plaintext, MESSAGE_PAD_LIMIT)?.to_vec())
}

/// Base64-decode then decrypt an inbound payload.
pub fn decrypt_message(encrypted: &str, key: &EncodingAesKey) -> Result<Vec<u8>, WechatError> {
    let ciphertext = BASE64
        .decode(encrypted.trim())
        .map_err(|e| WechatError::Decrypt(format!("invalid base64 payload: {}", e)))?;
    aes_cbc_decrypt(&ciphertext, key)
}

/// Encrypt raw bytes and base64-encode the result.
pub fn encrypt_message(plaintext: &[u8], key: &EncodingAesKey) -> String {
    BASE64.encode(aes_cbc_encrypt(plaintext, key))
}

/// Encrypt a reply in WeChat's framed layout:
/// `random(16) | big-endian length(4) | message | appid`.
pub fn encrypt_framed_message(message: &str, appid: &str, key: &EncodingAesKey) -> String {
    let mut random = [0u8; RANDOM_PREFIX_LEN];
    rand::thread_rng().fill_bytes(&mut random);

    let msg = message.as_bytes();
    let mut plain =
        Vec::with_capacity(RANDOM_PREFIX_LEN + LENGTH_FIELD_LEN + msg.len() + appid.len());
    plain.extend_from_slice(&random);
    plain.extend_from_slice(&(msg.len() as u32).to_be_bytes());
    plain.extend_from_slice(msg);
    plain.extend_from_slice(appid.as_bytes());

    encrypt_message(&plain, key)
}

/// Bound the XML document inside a decrypted payload.
///
/// When the payload carries WeChat's length-prefixed framing the search is
/// limited to the declared message so random prefix bytes cannot be taken
/// for markup. Otherwise the first `<` and the last `>` of the whole payload
/// delimit the document.
pub fn extract_xml(decrypted: &[u8]) -> Result<&str, WechatError> {
    let region = framed_message(decrypted).unwrap_or(decrypted);

    let start = region
        .iter()
        .position(|&b| b == b'<')
        .ok_or_else(|| WechatError::MalformedPayload("no XML start tag".to_string()))?;
    let end = region
        .iter()
        .rposition(|&b| b == b'>')
        .filter(|&e| e > start)
        .ok_or_else(|| WechatError::MalformedPayload("no XML end tag".to_string()))?;

    std::str::from_utf8(&region[start..=end])
        .map_err(|e| WechatError::MalformedPayload(format!("XML is not UTF-8: {}", e)))
}

fn framed_message(decrypted: &[u8]) -> Option<&[u8]> {
    let header = RANDOM_PREFIX_LEN + LENGTH_FIELD_LEN;
    let len_bytes: [u8; 4] = decrypted.get(RANDOM_PREFIX_LEN..header)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let msg = decrypted.get(header..header.checked_add(len)?)?;
    (msg.first() == Some(&b'<')).then_some(msg)
}
