//! Decoded field values.
//!
//! A tagged union standing in for the dynamic dict the original decoder
//! produced: scalar primitives, dense arrays, raw bytes, enum labels, and
//! bitfield decompositions. Event-log consumers walk this polymorphically;
//! column extractors (`btelem-core`'s capture engine) never construct one of
//! these — they pour typed bytes straight into output buffers instead.

/// One decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `U8` scalar.
    U8(u8),
    /// `U16` scalar.
    U16(u16),
    /// `U32` scalar.
    U32(u32),
    /// `U64` scalar.
    U64(u64),
    /// `I8` scalar.
    I8(i8),
    /// `I16` scalar.
    I16(i16),
    /// `I32` scalar.
    I32(i32),
    /// `I64` scalar.
    I64(i64),
    /// `F32` scalar.
    F32(f32),
    /// `F64` scalar.
    F64(f64),
    /// `BOOL` scalar.
    Bool(bool),
    /// Dense fixed-length array (`count > 1` scalar field).
    Array(Vec<FieldValue>),
    /// Raw `BYTES` slice.
    Bytes(Vec<u8>),
    /// `ENUM` value resolved to its label.
    EnumLabel(String),
    /// `ENUM` value with no matching label (or no label table at all).
    EnumRaw(u8),
    /// `BITFIELD` value with a bit table attached: ordered `name -> value`.
    Bitfield(Vec<(String, u64)>),
    /// `BITFIELD` value with no bit table attached: the raw unsigned integer.
    BitfieldRaw(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_equality_is_structural() {
        assert_eq!(FieldValue::U32(7), FieldValue::U32(7));
        assert_ne!(FieldValue::U32(7), FieldValue::U32(8));
        assert_eq!(
            FieldValue::Bitfield(vec![("a".to_string(), 1)]),
            FieldValue::Bitfield(vec![("a".to_string(), 1)])
        );
    }
}
