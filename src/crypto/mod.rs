//! Message authentication and encryption
//!
//! - [`cipher`]: AES-256-CBC for the component push channel and passive
//!   replies, with validated PKCS#7 handling.
//! - [`ecb`]: AES-256-ECB for merchant refund notifications.
//! - [`signature`]: the sorted SHA1 signature on every push.
//! - [`user_data`]: AES-128-CBC mini-program user data.
//!
//! ## Security
//!
//! Always verify a push signature before decrypting its payload. Session
//! keys and EncodingAESKeys must never reach client-side code.

pub mod cipher;
pub mod ecb;
pub mod signature;
pub mod user_data;

pub use crate::types::Watermark;
pub use cipher::{
    aes_cbc_decrypt, aes_cbc_encrypt, decrypt_message, derive_component_message_iv,
    encrypt_framed_message, encrypt_message, extract_xml, EncodingAesKey,
};
pub use ecb::{decrypt_refund_info, encrypt_refund_info, refund_notification_key};
pub use signature::{compute_push_signature, verify_push_signature};
pub use user_data::{
    decrypt_phone_number, decrypt_user_data, decrypt_user_info, verify_watermark,
    DecryptedUserData, PhoneNumber, UserInfo,
};
