//! Typed column output for the capture engines' `series`/`table` queries.

use btelem_proto::{BtelemType, FieldDef, FieldValue};

/// A materialized column of decoded field values.
///
/// Plain scalar fields (no array count, no enum-label table, no bitfield
/// table attached) decode into a flat typed vector matching their
/// [`BtelemType`]. Fields carrying extra structure (fixed-length arrays,
/// resolved enum labels, decomposed bitfields) fall back to [`Column::Values`],
/// the same tagged-union representation the decoded-entry view uses.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// `U8` column.
    U8(Vec<u8>),
    /// `U16` column.
    U16(Vec<u16>),
    /// `U32` column.
    U32(Vec<u32>),
    /// `U64` column.
    U64(Vec<u64>),
    /// `I8` column.
    I8(Vec<i8>),
    /// `I16` column.
    I16(Vec<i16>),
    /// `I32` column.
    I32(Vec<i32>),
    /// `I64` column.
    I64(Vec<i64>),
    /// `F32` column.
    F32(Vec<f32>),
    /// `F64` column.
    F64(Vec<f64>),
    /// `BOOL` column.
    Bool(Vec<bool>),
    /// `BYTES` column.
    Bytes(Vec<Vec<u8>>),
    /// `ENUM` column with no label table: raw discriminants.
    EnumRaw(Vec<u8>),
    /// `BITFIELD` column with no bit table: raw unsigned integers.
    BitfieldRaw(Vec<u64>),
    /// Anything with extra structure: arrays, resolved enum labels,
    /// decomposed bitfield maps.
    Values(Vec<FieldValue>),
}

impl Column {
    /// Number of rows in this column.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::U64(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Bytes(v) => v.len(),
            Self::EnumRaw(v) => v.len(),
            Self::BitfieldRaw(v) => v.len(),
            Self::Values(v) => v.len(),
        }
    }

    /// Whether this column has zero rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accumulates a [`Column`] across a two-pass extraction: constructed with
/// the exact row count from the counting pass, filled row-by-row in the
/// second pass. Never reallocates.
pub enum ColumnBuilder {
    /// Accumulating `U8` column.
    U8(Vec<u8>),
    /// Accumulating `U16` column.
    U16(Vec<u16>),
    /// Accumulating `U32` column.
    U32(Vec<u32>),
    /// Accumulating `U64` column.
    U64(Vec<u64>),
    /// Accumulating `I8` column.
    I8(Vec<i8>),
    /// Accumulating `I16` column.
    I16(Vec<i16>),
    /// Accumulating `I32` column.
    I32(Vec<i32>),
    /// Accumulating `I64` column.
    I64(Vec<i64>),
    /// Accumulating `F32` column.
    F32(Vec<f32>),
    /// Accumulating `F64` column.
    F64(Vec<f64>),
    /// Accumulating `BOOL` column.
    Bool(Vec<bool>),
    /// Accumulating `BYTES` column.
    Bytes(Vec<Vec<u8>>),
    /// Accumulating raw-discriminant `ENUM` column.
    EnumRaw(Vec<u8>),
    /// Accumulating raw-integer `BITFIELD` column.
    BitfieldRaw(Vec<u64>),
    /// Accumulating fallback column for arrays, labeled enums, and
    /// decomposed bitfields.
    Values(Vec<FieldValue>),
}

impl ColumnBuilder {
    /// Build a column accumulator sized for `capacity` rows, whose kind is
    /// determined entirely from the field's static schema metadata (so an
    /// empty result still has the correct dtype).
    #[must_use]
    pub fn for_field(field: &FieldDef, capacity: usize) -> Self {
        if field.count > 1 {
            return Self::Values(Vec::with_capacity(capacity));
        }
        match field.ty {
            BtelemType::U8 => Self::U8(Vec::with_capacity(capacity)),
            BtelemType::U16 => Self::U16(Vec::with_capacity(capacity)),
            BtelemType::U32 => Self::U32(Vec::with_capacity(capacity)),
            BtelemType::U64 => Self::U64(Vec::with_capacity(capacity)),
            BtelemType::I8 => Self::I8(Vec::with_capacity(capacity)),
            BtelemType::I16 => Self::I16(Vec::with_capacity(capacity)),
            BtelemType::I32 => Self::I32(Vec::with_capacity(capacity)),
            BtelemType::I64 => Self::I64(Vec::with_capacity(capacity)),
            BtelemType::F32 => Self::F32(Vec::with_capacity(capacity)),
            BtelemType::F64 => Self::F64(Vec::with_capacity(capacity)),
            BtelemType::Bool => Self::Bool(Vec::with_capacity(capacity)),
            BtelemType::Bytes => Self::Bytes(Vec::with_capacity(capacity)),
            BtelemType::Enum if field.enum_labels.is_none() => Self::EnumRaw(Vec::with_capacity(capacity)),
            BtelemType::Bitfield if field.bitfield_bits.is_none() => Self::BitfieldRaw(Vec::with_capacity(capacity)),
            BtelemType::Enum | BtelemType::Bitfield => Self::Values(Vec::with_capacity(capacity)),
        }
    }

    /// Push one decoded value. A value whose runtime variant doesn't match
    /// the builder's static kind (which should not happen, since the field
    /// that produced `value` is the same one `for_field` was built from)
    /// is silently dropped rather than panicking.
    pub fn push(&mut self, value: FieldValue) {
        match (self, value) {
            (Self::U8(v), FieldValue::U8(x)) => v.push(x),
            (Self::U16(v), FieldValue::U16(x)) => v.push(x),
            (Self::U32(v), FieldValue::U32(x)) => v.push(x),
            (Self::U64(v), FieldValue::U64(x)) => v.push(x),
            (Self::I8(v), FieldValue::I8(x)) => v.push(x),
            (Self::I16(v), FieldValue::I16(x)) => v.push(x),
            (Self::I32(v), FieldValue::I32(x)) => v.push(x),
            (Self::I64(v), FieldValue::I64(x)) => v.push(x),
            (Self::F32(v), FieldValue::F32(x)) => v.push(x),
            (Self::F64(v), FieldValue::F64(x)) => v.push(x),
            (Self::Bool(v), FieldValue::Bool(x)) => v.push(x),
            (Self::Bytes(v), FieldValue::Bytes(x)) => v.push(x),
            (Self::EnumRaw(v), FieldValue::EnumRaw(x)) => v.push(x),
            (Self::BitfieldRaw(v), FieldValue::BitfieldRaw(x)) => v.push(x),
            (Self::Values(v), x) => v.push(x),
            _ => {}
        }
    }

    /// Consume the builder, producing the finished column.
    #[must_use]
    pub fn finish(self) -> Column {
        match self {
            Self::U8(v) => Column::U8(v),
            Self::U16(v) => Column::U16(v),
            Self::U32(v) => Column::U32(v),
            Self::U64(v) => Column::U64(v),
            Self::I8(v) => Column::I8(v),
            Self::I16(v) => Column::I16(v),
            Self::I32(v) => Column::I32(v),
            Self::I64(v) => Column::I64(v),
            Self::F32(v) => Column::F32(v),
            Self::F64(v) => Column::F64(v),
            Self::Bool(v) => Column::Bool(v),
            Self::Bytes(v) => Column::Bytes(v),
            Self::EnumRaw(v) => Column::EnumRaw(v),
            Self::BitfieldRaw(v) => Column::BitfieldRaw(v),
            Self::Values(v) => Column::Values(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_builder_yields_correctly_typed_empty_column() {
        let field = FieldDef::new("value", 0, 4, BtelemType::F32, 1);
        let builder = ColumnBuilder::for_field(&field, 0);
        let column = builder.finish();
        assert!(column.is_empty());
        assert!(matches!(column, Column::F32(_)));
    }

    #[test]
    fn array_field_falls_back_to_values() {
        let field = FieldDef::new("samples", 0, 16, BtelemType::F32, 4);
        let mut builder = ColumnBuilder::for_field(&field, 1);
        builder.push(FieldValue::Array(vec![FieldValue::F32(1.0), FieldValue::F32(2.0)]));
        let column = builder.finish();
        assert_eq!(column.len(), 1);
        assert!(matches!(column, Column::Values(_)));
    }
}
