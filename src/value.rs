use std::fmt;

use bytes::Bytes;

/// Value produced by an extractor for one log field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Bytes(Bytes),
    Str(String),
    Int(i64),
    Null,
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            TagValue::Str(s) => f.write_str(s),
            TagValue::Int(n) => write!(f, "{n}"),
            TagValue::Null => Ok(()),
        }
    }
}

impl log::kv::ToValue for TagValue {
    fn to_value(&self) -> log::kv::Value<'_> {
        match self {
            TagValue::Bytes(_) => log::kv::Value::from_display(self),
            TagValue::Str(s) => log::kv::Value::from(s.as_str()),
            TagValue::Int(n) => log::kv::Value::from(*n),
            TagValue::Null => log::kv::Value::null(),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Str(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Str(value)
    }
}

impl From<Bytes> for TagValue {
    fn from(value: Bytes) -> Self {
        TagValue::Bytes(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<u16> for TagValue {
    fn from(value: u16) -> Self {
        TagValue::Int(i64::from(value))
    }
}

impl From<u32> for TagValue {
    fn from(value: u32) -> Self {
        TagValue::Int(i64::from(value))
    }
}

impl From<usize> for TagValue {
    fn from(value: usize) -> Self {
        TagValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl<T: Into<TagValue>> From<Option<T>> for TagValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(TagValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::kv::ToValue;

    #[test]
    fn test_display() {
        assert_eq!(TagValue::from("GET").to_string(), "GET");
        assert_eq!(TagValue::from(200u16).to_string(), "200");
        assert_eq!(
            TagValue::Bytes(Bytes::from_static(b"number=2")).to_string(),
            "number=2"
        );
        assert_eq!(
            TagValue::Bytes(Bytes::from_static(b"\xffok")).to_string(),
            "\u{fffd}ok"
        );
        assert_eq!(TagValue::Null.to_string(), "");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(TagValue::from(None::<String>), TagValue::Null);
        assert_eq!(
            TagValue::from(Some("val")),
            TagValue::Str("val".to_string())
        );
    }

    #[test]
    fn test_kv_value() {
        let value = TagValue::from(404u16);
        assert_eq!(value.to_value().to_i64(), Some(404));

        let value = TagValue::from("val");
        assert_eq!(value.to_value().to_borrowed_str(), Some("val"));

        let value = TagValue::Bytes(Bytes::from_static(b"raw"));
        assert_eq!(value.to_value().to_string(), "raw");
    }
}
