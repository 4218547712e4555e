//! Middleware for the HTTP transport
//!
//! [`WechatClientBuilder::with_middleware`](crate::client::WechatClientBuilder::with_middleware)
//! accepts any tower [`Layer`] over [`WechatClient`](crate::client::WechatClient).
//! Layers see every outbound `reqwest::Request` before it is sent.
//!
//! There is no retry layer; retry policy belongs to the caller.
//!
//! ## Usage
//!
//! ```ignore
//! use wechat_open_sdk::client::WechatClient;
//! use wechat_open_sdk::middleware::LoggingMiddleware;
//!
//! let client = WechatClient::builder()
//!     .with_middleware(LoggingMiddleware::new().level(log::Level::Debug))
//!     .build()?;
//! ```

// Re-export tower types for convenience
pub use tower::{Layer, Service, ServiceBuilder};

mod logging;

pub use logging::{LoggingMiddleware, LoggingService};
