//! WeChat Open Platform SDK for Rust
//!
//! Server-side building blocks for a WeChat third-party platform
//! ("component"): the credential lifecycle of the component and the
//! accounts that authorized it, the encrypted callback channel, and the
//! signing schemes used by the JS-SDK and merchant pay APIs.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wechat_open_sdk::component::{Component, PushInfo};
//! use wechat_open_sdk::types::{AppId, AppSecret};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let component = Component::builder()
//!         .appid(AppId::new("wx1234567890abcdef")?)
//!         .secret(AppSecret::new("your_secret")?)
//!         .token("push_token")
//!         .encoding_aes_key("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG")
//!         .build()?;
//!
//!     // Callback handler: verify, decrypt and record the verify ticket
//!     let event = component
//!         .handle_push_body(&body, &msg_signature, &timestamp, &nonce)
//!         .await?;
//!
//!     if let PushInfo::Authorized(grant) = event.info {
//!         component.refresh_component_token_if_expired().await?;
//!         let authorizer = component
//!             .exchange_authorization_code(&grant.authorization_code)
//!             .await?;
//!         println!("authorized by {}", authorizer.authorizer_appid);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`component`] - Component token, push handling, authorizer tokens
//! - [`credential`] - Shared credential state with single-flight refresh
//! - [`crypto`] - Callback message cipher, push signatures, user data
//! - [`sign`] - SHA1 and MD5 request signatures
//! - [`client`] - HTTP transport with business-error classification
//! - [`pay`] - Merchant pay XML API
//! - [`jssdk`] - JS-SDK ticket and page signature
//! - [`middleware`] - Tower layers for the transport
//! - [`error`] - Error types
//! - [`types`] - Validated identifiers
//!
//! ## Error Handling
//!
//! Everything returns [`WechatError`]:
//!
//! ```rust,ignore
//! use wechat_open_sdk::WechatError;
//!
//! match result {
//!     Ok(response) => { /* handle success */ }
//!     Err(WechatError::Api { code, message, .. }) => {
//!         eprintln!("API error: {} - {}", code, message);
//!     }
//!     Err(e) if e.is_transient() => { /* retry later */ }
//!     Err(e) => {
//!         eprintln!("Other error: {}", e);
//!     }
//! }
//! ```

pub mod client;
pub mod component;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod jssdk;
pub mod middleware;
pub mod pay;
pub mod sign;
pub mod types;
mod utils;

pub use client::{WechatClient, WechatClientBuilder};
pub use component::Component;
pub use credential::{AuthorizerCredential, ComponentCredential, CredentialStore};
pub use error::WechatError;
pub use pay::PayClient;
