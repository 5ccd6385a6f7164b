use serde::{Serialize, Serializer};

/// A decoded or caller-supplied field value.
///
/// `char[N]` fields are carried as [`Value::Text`] when their content is
/// UTF-8 without interior NULs, and as [`Value::Bytes`] otherwise. Every
/// other array is a [`Value::Array`] of scalars.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    /// Raw `char` content that is not clean text, trailing NULs removed.
    /// Serialized as lossy text.
    #[serde(serialize_with = "lossy_text")]
    Bytes(Vec<u8>),
    Array(Vec<Value>),
}

fn lossy_text<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

impl Value {
    /// Integer view of a scalar integer value.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Value::U8(v) => v.into(),
            Value::I8(v) => v.into(),
            Value::U16(v) => v.into(),
            Value::I16(v) => v.into(),
            Value::U32(v) => v.into(),
            Value::I32(v) => v.into(),
            Value::U64(v) => v.into(),
            Value::I64(v) => v.into(),
            _ => return None,
        })
    }

    /// Unsigned view, if the value is a non-negative integer that fits.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i128().and_then(|v| u64::try_from(v).ok())
    }

    /// Signed view, if the value is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    /// Floating point view of any numeric scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(v.into()),
            Value::F64(v) => Some(v),
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Raw content of a `char` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Text(text) => Some(text.as_bytes()),
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => Text,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Copy, const N: usize> From<[T; N]> for Value {
    fn from(items: [T; N]) -> Self {
        Value::Array(items.iter().map(|v| (*v).into()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_views() {
        assert_eq!(Value::I8(-3).as_i64(), Some(-3));
        assert_eq!(Value::I8(-3).as_u64(), None);
        assert_eq!(Value::U64(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(Value::U16(7).as_f64(), Some(7.0));
        assert_eq!(Value::Text("x".into()).as_f64(), None);
    }

    #[test]
    fn serializes_without_tags() {
        let value = Value::from(vec![1u8, 2, 3]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[1,2,3]");
        assert_eq!(
            serde_json::to_string(&Value::from("GPS")).unwrap(),
            "\"GPS\""
        );
    }

    #[test]
    fn raw_char_content_serializes_as_text() {
        let value = Value::Bytes(vec![b'o', b'k', 0xFF]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"ok\u{FFFD}\"");
        assert_eq!(value.as_bytes(), Some(&[b'o', b'k', 0xFF][..]));
        assert_eq!(value.as_str(), None);
    }

    #[test]
    fn array_conversion() {
        let value = Value::from([0.5f32, 1.5]);
        assert_eq!(
            value.as_array(),
            Some(&[Value::F32(0.5), Value::F32(1.5)][..])
        );
    }
}
