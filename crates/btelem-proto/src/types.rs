//! `BtelemType` discriminant.

/// Wire discriminant for a field's storage type.
///
/// Numeric values are part of the wire format (written as a single byte in
/// each field record) and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BtelemType {
    /// Unsigned 8-bit integer.
    U8 = 0,
    /// Unsigned 16-bit integer.
    U16 = 1,
    /// Unsigned 32-bit integer.
    U32 = 2,
    /// Unsigned 64-bit integer.
    U64 = 3,
    /// Signed 8-bit integer.
    I8 = 4,
    /// Signed 16-bit integer.
    I16 = 5,
    /// Signed 32-bit integer.
    I32 = 6,
    /// Signed 64-bit integer.
    I64 = 7,
    /// IEEE-754 single precision float.
    F32 = 8,
    /// IEEE-754 double precision float.
    F64 = 9,
    /// Boolean, stored as one byte (0 or nonzero).
    Bool = 10,
    /// Raw byte slice, `size` bytes.
    Bytes = 11,
    /// Enumerated label, stored as `u8`, resolved against a label table.
    Enum = 12,
    /// Bit-packed flags, underlying storage chosen by `size` (1/2/4).
    Bitfield = 13,
}

impl BtelemType {
    /// Storage size in bytes of one scalar instance of this type, where that
    /// is fixed by the type alone (`Bytes` and `Bitfield` are sized by the
    /// field's declared `size` instead, so this returns `None` for those).
    #[must_use]
    pub const fn fixed_scalar_size(self) -> Option<u16> {
        match self {
            Self::U8 | Self::I8 | Self::Bool | Self::Enum => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 | Self::I64 | Self::F64 => Some(8),
            Self::Bytes | Self::Bitfield => None,
        }
    }

    /// Decode the wire byte back into a discriminant.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::U8),
            1 => Some(Self::U16),
            2 => Some(Self::U32),
            3 => Some(Self::U64),
            4 => Some(Self::I8),
            5 => Some(Self::I16),
            6 => Some(Self::I32),
            7 => Some(Self::I64),
            8 => Some(Self::F32),
            9 => Some(Self::F64),
            10 => Some(Self::Bool),
            11 => Some(Self::Bytes),
            12 => Some(Self::Enum),
            13 => Some(Self::Bitfield),
            _ => None,
        }
    }

    /// Wire byte for this discriminant.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}
