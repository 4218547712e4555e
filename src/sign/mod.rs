//! Canonical request signing
//!
//! Two independent algorithms share the same canonical form (non-empty
//! values, keys in ascending byte order, `key=value` joined with `&`):
//!
//! - [`sign_sha1`]: lowercase hex SHA1, used for JS-SDK ticket signatures.
//! - [`sign_md5`]: uppercase hex MD5 with `&key=<secret>` appended, used for
//!   every merchant pay request and response.
//!
//! Structured requests describe their signable fields through
//! [`SignableFields`], a static table of wire names instead of runtime
//! reflection.

mod field_sign;
mod url_sign;
mod value;

pub use field_sign::{check_md5_sign, md5_sign_string, sign_md5, SignField, SignableFields};
pub use url_sign::{sign_sha1, sign_sha1_json, url_sign_string};
pub use value::SignValue;
