//! SHA1 signature over sorted `key=value` pairs (JS-SDK style)

use sha1::{Digest, Sha1};

use super::value::SignValue;

/// Build the string that gets hashed: non-empty values, keys ascending,
/// `key=value` joined with `&`.
pub fn url_sign_string<'a, K, I>(params: I) -> String
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, SignValue<'a>)>,
{
    let mut pairs: Vec<(K, SignValue<'a>)> = params.into_iter().collect();
    pairs.sort_by(|a, b| a.0.as_ref().as_bytes().cmp(b.0.as_ref().as_bytes()));

    let mut out = String::new();
    for (key, value) in &pairs {
        let text = value.to_sign_string();
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(key.as_ref());
        out.push('=');
        out.push_str(&text);
    }
    out
}

/// Lowercase hex SHA1 of [`url_sign_string`].
pub fn sign_sha1<'a, K, I>(params: I) -> String
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, SignValue<'a>)>,
{
    hex::encode(Sha1::digest(url_sign_string(params).as_bytes()))
}

/// [`sign_sha1`] over a JSON object built at runtime.
///
/// Entries whose value is not a string, bool, integer or byte string are
/// left out of the signed string.
pub fn sign_sha1_json(params: &serde_json::Map<String, serde_json::Value>) -> String {
    sign_sha1(
        params
            .iter()
            .filter_map(|(k, v)| SignValue::from_json(v).map(|v| (k.as_str(), v))),
    )
}
