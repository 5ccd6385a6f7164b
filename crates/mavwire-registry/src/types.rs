use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut};

use crate::value::Value;

/// Wire type of a single field element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Char,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl FieldType {
    /// Size of one element on the wire.
    pub const fn size(self) -> usize {
        match self {
            FieldType::Char | FieldType::U8 | FieldType::I8 => 1,
            FieldType::U16 | FieldType::I16 => 2,
            FieldType::U32 | FieldType::I32 | FieldType::F32 => 4,
            FieldType::U64 | FieldType::I64 | FieldType::F64 => 8,
        }
    }

    /// The C type name used in message definitions and in the `crc_extra`
    /// derivation.
    pub const fn c_name(self) -> &'static str {
        match self {
            FieldType::Char => "char",
            FieldType::U8 => "uint8_t",
            FieldType::I8 => "int8_t",
            FieldType::U16 => "uint16_t",
            FieldType::I16 => "int16_t",
            FieldType::U32 => "uint32_t",
            FieldType::I32 => "int32_t",
            FieldType::U64 => "uint64_t",
            FieldType::I64 => "int64_t",
            FieldType::F32 => "float",
            FieldType::F64 => "double",
        }
    }

    /// True for the floating point types.
    pub const fn is_float(self) -> bool {
        matches!(self, FieldType::F32 | FieldType::F64)
    }

    /// Zero value of this type.
    pub fn zero(self) -> Value {
        match self {
            FieldType::Char => Value::Text(String::new()),
            FieldType::U8 => Value::U8(0),
            FieldType::I8 => Value::I8(0),
            FieldType::U16 => Value::U16(0),
            FieldType::I16 => Value::I16(0),
            FieldType::U32 => Value::U32(0),
            FieldType::I32 => Value::I32(0),
            FieldType::U64 => Value::U64(0),
            FieldType::I64 => Value::I64(0),
            FieldType::F32 => Value::F32(0.0),
            FieldType::F64 => Value::F64(0.0),
        }
    }

    /// Convert `value` to this numeric type if it fits without loss of range.
    ///
    /// Integers convert between widths when in range and into either float
    /// type; floats convert between `f32` and `f64`.
    pub fn coerce_scalar(self, value: &Value) -> Option<Value> {
        if self.is_float() {
            let v = value.as_f64()?;
            return Some(match self {
                FieldType::F32 => Value::F32(v as f32),
                _ => Value::F64(v),
            });
        }

        let v = value.as_i128()?;
        let out = match self {
            FieldType::Char | FieldType::U8 => Value::U8(u8::try_from(v).ok()?),
            FieldType::I8 => Value::I8(i8::try_from(v).ok()?),
            FieldType::U16 => Value::U16(u16::try_from(v).ok()?),
            FieldType::I16 => Value::I16(i16::try_from(v).ok()?),
            FieldType::U32 => Value::U32(u32::try_from(v).ok()?),
            FieldType::I32 => Value::I32(i32::try_from(v).ok()?),
            FieldType::U64 => Value::U64(u64::try_from(v).ok()?),
            FieldType::I64 => Value::I64(i64::try_from(v).ok()?),
            FieldType::F32 | FieldType::F64 => return None,
        };
        Some(out)
    }

    /// Write one element. Values of the wrong shape are written as zero.
    pub(crate) fn put(self, value: &Value, dst: &mut impl BufMut) {
        match self {
            FieldType::Char => {
                let byte = match value {
                    Value::Text(_) | Value::Bytes(_) => {
                        value.as_bytes().and_then(|b| b.first().copied()).unwrap_or(0)
                    }
                    other => other.as_i128().and_then(|v| u8::try_from(v).ok()).unwrap_or(0),
                };
                dst.put_u8(byte);
            }
            FieldType::U8 => dst.put_u8(int_or_zero(value)),
            FieldType::I8 => dst.put_i8(int_or_zero(value)),
            FieldType::U16 => dst.put_u16_le(int_or_zero(value)),
            FieldType::I16 => dst.put_i16_le(int_or_zero(value)),
            FieldType::U32 => dst.put_u32_le(int_or_zero(value)),
            FieldType::I32 => dst.put_i32_le(int_or_zero(value)),
            FieldType::U64 => dst.put_u64_le(int_or_zero(value)),
            FieldType::I64 => dst.put_i64_le(int_or_zero(value)),
            FieldType::F32 => dst.put_f32_le(value.as_f64().unwrap_or(0.0) as f32),
            FieldType::F64 => dst.put_f64_le(value.as_f64().unwrap_or(0.0)),
        }
    }

    /// Read one element. The caller guarantees `src` holds `self.size()` bytes.
    pub(crate) fn get(self, src: &mut impl Buf) -> Value {
        match self {
            FieldType::Char => char_value(&[src.get_u8()]),
            FieldType::U8 => Value::U8(src.get_u8()),
            FieldType::I8 => Value::I8(src.get_i8()),
            FieldType::U16 => Value::U16(src.get_u16_le()),
            FieldType::I16 => Value::I16(src.get_i16_le()),
            FieldType::U32 => Value::U32(src.get_u32_le()),
            FieldType::I32 => Value::I32(src.get_i32_le()),
            FieldType::U64 => Value::U64(src.get_u64_le()),
            FieldType::I64 => Value::I64(src.get_i64_le()),
            FieldType::F32 => Value::F32(src.get_f32_le()),
            FieldType::F64 => Value::F64(src.get_f64_le()),
        }
    }
}

fn int_or_zero<T: TryFrom<i128> + Default>(value: &Value) -> T {
    value
        .as_i128()
        .and_then(|v| T::try_from(v).ok())
        .unwrap_or_default()
}

/// Value of a NUL-padded `char` array.
///
/// Trailing NULs are padding. What remains is [`Value::Text`] when it is
/// UTF-8 with no interior NUL, and [`Value::Bytes`] otherwise, so packing
/// the value again reproduces the same wire bytes.
pub(crate) fn char_value(raw: &[u8]) -> Value {
    let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    let content = &raw[..end];
    if content.contains(&0) {
        return Value::Bytes(content.to_vec());
    }
    match std::str::from_utf8(content) {
        Ok(text) => Value::Text(text.to_string()),
        Err(_) => Value::Bytes(content.to_vec()),
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

/// Error returned when a type name is not a MAVLink wire type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field type '{0}'")]
pub struct UnknownFieldType(pub String);

impl FromStr for FieldType {
    type Err = UnknownFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s {
            "char" => FieldType::Char,
            "uint8_t" | "uint8_t_mavlink_version" => FieldType::U8,
            "int8_t" => FieldType::I8,
            "uint16_t" => FieldType::U16,
            "int16_t" => FieldType::I16,
            "uint32_t" => FieldType::U32,
            "int32_t" => FieldType::I32,
            "uint64_t" => FieldType::U64,
            "int64_t" => FieldType::I64,
            "float" => FieldType::F32,
            "double" => FieldType::F64,
            other => return Err(UnknownFieldType(other.to_string())),
        };
        Ok(ty)
    }
}

/// Split a definition type such as `char[16]` into element type and array
/// length (`0` for scalars).
pub fn parse_type_spec(spec: &str) -> Result<(FieldType, usize), UnknownFieldType> {
    let spec = spec.trim();
    let Some(open) = spec.find('[') else {
        return Ok((spec.parse()?, 0));
    };

    let inner = spec[open + 1..]
        .strip_suffix(']')
        .ok_or_else(|| UnknownFieldType(spec.to_string()))?;
    let len: usize = inner
        .trim()
        .parse()
        .map_err(|_| UnknownFieldType(spec.to_string()))?;
    if len == 0 || len > 255 {
        return Err(UnknownFieldType(spec.to_string()));
    }
    Ok((spec[..open].trim().parse()?, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_and_arrays() {
        assert_eq!(parse_type_spec("uint32_t").unwrap(), (FieldType::U32, 0));
        assert_eq!(parse_type_spec("char[16]").unwrap(), (FieldType::Char, 16));
        assert_eq!(parse_type_spec("uint8_t[8]").unwrap(), (FieldType::U8, 8));
        assert_eq!(
            parse_type_spec("uint8_t_mavlink_version").unwrap(),
            (FieldType::U8, 0)
        );
    }

    #[test]
    fn rejects_bad_specs() {
        assert!(parse_type_spec("uint128_t").is_err());
        assert!(parse_type_spec("char[0]").is_err());
        assert!(parse_type_spec("char[16").is_err());
        assert!(parse_type_spec("float[x]").is_err());
    }

    #[test]
    fn coerce_respects_range() {
        assert_eq!(FieldType::U8.coerce_scalar(&Value::U32(200)), Some(Value::U8(200)));
        assert_eq!(FieldType::U8.coerce_scalar(&Value::U32(300)), None);
        assert_eq!(FieldType::I16.coerce_scalar(&Value::I64(-5)), Some(Value::I16(-5)));
        assert_eq!(FieldType::F32.coerce_scalar(&Value::U8(3)), Some(Value::F32(3.0)));
        assert_eq!(FieldType::U16.coerce_scalar(&Value::F32(1.0)), None);
    }

    #[test]
    fn char_value_strips_padding_only() {
        assert_eq!(char_value(b"ARMING\0\0\0"), Value::from("ARMING"));
        assert_eq!(char_value(b"FULL"), Value::from("FULL"));
        assert_eq!(char_value(b"\0\0"), Value::from(""));
        assert_eq!(char_value(b"ab\0cd\0"), Value::Bytes(b"ab\0cd".to_vec()));
        assert_eq!(char_value(&[0xC3, 0x28, 0, 0]), Value::Bytes(vec![0xC3, 0x28]));
    }
}
