use std::borrow::Cow;

/// Scalar that can take part in a signature.
///
/// WeChat signs the textual form of each value; only strings, booleans,
/// integers and byte strings have one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignValue<'a> {
    Str(Cow<'a, str>),
    Bool(bool),
    Int(i64),
    Bytes(Cow<'a, [u8]>),
}

impl SignValue<'_> {
    /// Text used in the signed string.
    pub fn to_sign_string(&self) -> Cow<'_, str> {
        match self {
            SignValue::Str(s) => Cow::Borrowed(s.as_ref()),
            SignValue::Bool(b) => Cow::Owned(b.to_string()),
            SignValue::Int(i) => Cow::Owned(i.to_string()),
            SignValue::Bytes(b) => String::from_utf8_lossy(b),
        }
    }

    /// Zero value of the underlying type (`""`, `false`, `0`, no bytes).
    pub fn is_empty(&self) -> bool {
        match self {
            SignValue::Str(s) => s.is_empty(),
            SignValue::Bool(b) => !b,
            SignValue::Int(i) => *i == 0,
            SignValue::Bytes(b) => b.is_empty(),
        }
    }

    /// Map a dynamically typed JSON value.
    ///
    /// Returns `None` for null, floats, arrays and objects: those never
    /// participate in a signature and are skipped silently.
    pub fn from_json(value: &serde_json::Value) -> Option<SignValue<'_>> {
        match value {
            serde_json::Value::String(s) => Some(SignValue::Str(Cow::Borrowed(s))),
            serde_json::Value::Bool(b) => Some(SignValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(SignValue::Int),
            _ => None,
        }
    }
}

impl<'a> From<&'a str> for SignValue<'a> {
    fn from(value: &'a str) -> Self {
        SignValue::Str(Cow::Borrowed(value))
    }
}

impl<'a> From<&'a String> for SignValue<'a> {
    fn from(value: &'a String) -> Self {
        SignValue::Str(Cow::Borrowed(value.as_str()))
    }
}

impl From<String> for SignValue<'static> {
    fn from(value: String) -> Self {
        SignValue::Str(Cow::Owned(value))
    }
}

impl From<bool> for SignValue<'static> {
    fn from(value: bool) -> Self {
        SignValue::Bool(value)
    }
}

impl From<i32> for SignValue<'static> {
    fn from(value: i32) -> Self {
        SignValue::Int(i64::from(value))
    }
}

impl From<u32> for SignValue<'static> {
    fn from(value: u32) -> Self {
        SignValue::Int(i64::from(value))
    }
}

impl From<i64> for SignValue<'static> {
    fn from(value: i64) -> Self {
        SignValue::Int(value)
    }
}

impl<'a> From<&'a [u8]> for SignValue<'a> {
    fn from(value: &'a [u8]) -> Self {
        SignValue::Bytes(Cow::Borrowed(value))
    }
}

impl From<Vec<u8>> for SignValue<'static> {
    fn from(value: Vec<u8>) -> Self {
        SignValue::Bytes(Cow::Owned(value))
    }
}
