//! Wire schema: entry/field descriptors and their fixed-stride serialization.
//!
//! The wire format is deliberately fixed-stride and versioned by fixed
//! constants rather than length-prefixed records, so a reader can skip
//! entries it doesn't recognise without needing to understand their
//! contents first. See the module-level wire constants below for the exact
//! byte layout; it must not change without a version bump.

use std::collections::HashMap;

use crate::error::{ProtoError, Result};
use crate::types::BtelemType;
use crate::value::FieldValue;

/// Maximum length, in bytes, of a field or entry name buffer on the wire.
pub const NAME_MAX: usize = 64;
/// Maximum length, in bytes, of an entry description buffer on the wire.
pub const DESC_MAX: usize = 128;
/// Maximum number of fields a single entry may declare.
pub const MAX_FIELDS: usize = 16;
/// Maximum length, in bytes, of one enum label buffer on the wire.
pub const ENUM_LABEL_MAX: usize = 32;
/// Maximum number of labels in one field's enum table.
pub const ENUM_MAX_VALUES: usize = 64;
/// Maximum length, in bytes, of one bitfield bit-name buffer on the wire.
pub const BIT_NAME_MAX: usize = 32;
/// Maximum number of named bits in one field's bitfield table.
pub const BITFIELD_MAX_BITS: usize = 16;

const SCHEMA_FILE_HEADER_SIZE: usize = 3; // endian:u8, entry_count:u16
const FIELD_WIRE_SIZE: usize = NAME_MAX + 2 + 2 + 1 + 1; // 70
const SCHEMA_ENTRY_HEADER_SIZE: usize = 2 + 2 + 2 + NAME_MAX + DESC_MAX; // 198
const SCHEMA_ENTRY_WIRE_SIZE: usize = SCHEMA_ENTRY_HEADER_SIZE + MAX_FIELDS * FIELD_WIRE_SIZE; // 1318
const ENUM_RECORD_SIZE: usize = 2 + 2 + 1 + ENUM_MAX_VALUES * ENUM_LABEL_MAX; // 2053
const BITFIELD_RECORD_SIZE: usize =
    2 + 2 + 1 + BITFIELD_MAX_BITS * BIT_NAME_MAX + BITFIELD_MAX_BITS + BITFIELD_MAX_BITS; // 549

/// Byte order used to decode multi-byte payload fields.
///
/// Applies to payload field decoding only — packet/entry headers and length
/// prefixes are always little-endian regardless of this flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Little-endian payload fields.
    Little,
    /// Big-endian payload fields.
    Big,
}

/// One named bit (or bit run) within a `BITFIELD` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitDef {
    /// Bit name, used as the key in the decoded bitfield map.
    pub name: String,
    /// Index of the lowest bit in the run.
    pub start: u8,
    /// Number of bits in the run.
    pub width: u8,
}

/// Description of one field within an entry's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name, unique within its entry.
    pub name: String,
    /// Byte offset of this field within the entry's payload.
    pub offset: u16,
    /// Storage size in bytes (exact; for `count > 1` this is the total
    /// size of the array, not one element).
    pub size: u16,
    /// Wire type of this field.
    pub ty: BtelemType,
    /// 1 for a scalar, >1 for a fixed-length array.
    pub count: u8,
    /// Label table for `ENUM` fields. `None` means "no labels attached";
    /// decoding falls back to the raw integer.
    pub enum_labels: Option<Vec<String>>,
    /// Named-bit table for `BITFIELD` fields. `None` means "no bit table
    /// attached"; decoding falls back to the raw integer.
    pub bitfield_bits: Option<Vec<BitDef>>,
}

impl FieldDef {
    /// Construct a scalar or array field with no enum/bitfield metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, offset: u16, size: u16, ty: BtelemType, count: u8) -> Self {
        Self { name: name.into(), offset, size, ty, count, enum_labels: None, bitfield_bits: None }
    }

    /// Attach an enum label table to this field.
    #[must_use]
    pub fn with_enum_labels(mut self, labels: Vec<String>) -> Self {
        self.enum_labels = Some(labels);
        self
    }

    /// Attach a bitfield table to this field.
    #[must_use]
    pub fn with_bitfield_bits(mut self, bits: Vec<BitDef>) -> Self {
        self.bitfield_bits = Some(bits);
        self
    }

    /// One-past-the-end byte offset of this field within its entry payload.
    #[must_use]
    pub fn end_offset(&self) -> u32 {
        u32::from(self.offset) + u32::from(self.size)
    }
}

/// Description of one telemetry message type.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEntry {
    /// Unique (nonzero recommended) entry id.
    pub id: u16,
    /// Human-readable name, unique within the schema.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Exact size in bytes of every payload carrying this entry id.
    pub payload_size: u16,
    /// Ordered field list (at most [`MAX_FIELDS`]).
    pub fields: Vec<FieldDef>,
}

impl SchemaEntry {
    /// Construct an entry with no description.
    #[must_use]
    pub fn new(id: u16, name: impl Into<String>, payload_size: u16, fields: Vec<FieldDef>) -> Self {
        Self { id, name: name.into(), description: String::new(), payload_size, fields }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Telemetry schema: the shared description of entry ids, field layouts,
/// and optional enum/bitfield metadata used to decode wire payloads.
///
/// Immutable once constructed. Entry ids and names are both looked up in
/// O(1) via internal indices built at construction time.
#[derive(Debug, Clone)]
pub struct Schema {
    endian: Endian,
    entries: Vec<SchemaEntry>,
    id_index: HashMap<u16, usize>,
    name_index: HashMap<String, usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.endian == other.endian && self.entries == other.entries
    }
}

impl Schema {
    /// Build a schema from an entry list. Ids and names are assumed unique;
    /// a later duplicate silently wins over an earlier one, matching how a
    /// map-backed index would behave.
    #[must_use]
    pub fn new(entries: Vec<SchemaEntry>, endian: Endian) -> Self {
        let mut id_index = HashMap::with_capacity(entries.len());
        let mut name_index = HashMap::with_capacity(entries.len());
        for (i, e) in entries.iter().enumerate() {
            id_index.insert(e.id, i);
            name_index.insert(e.name.clone(), i);
        }
        Self { endian, entries, id_index, name_index }
    }

    /// Byte order applied to payload field decoding.
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// All entries, in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// Look up an entry by id.
    #[must_use]
    pub fn entry_by_id(&self, id: u16) -> Option<&SchemaEntry> {
        self.id_index.get(&id).map(|&i| &self.entries[i])
    }

    /// Look up an entry by name.
    #[must_use]
    pub fn entry_by_name(&self, name: &str) -> Option<&SchemaEntry> {
        self.name_index.get(name).map(|&i| &self.entries[i])
    }

    /// Decode one entry's payload bytes into an ordered `name -> value` list.
    ///
    /// Offsets are bounds-checked against `payload`; a field whose declared
    /// range doesn't fit is silently omitted rather than decoded out of
    /// bounds (the packet/entry framing already guarantees `payload` is
    /// exactly `payload_size` bytes for a well-formed stream — this is a
    /// defensive fallback for a corrupt or mismatched schema).
    #[must_use]
    pub fn decode_fields(&self, entry: &SchemaEntry, payload: &[u8]) -> Vec<(String, FieldValue)> {
        let mut out = Vec::with_capacity(entry.fields.len());
        for field in &entry.fields {
            let end = usize::from(field.offset) + usize::from(field.size);
            if end > payload.len() {
                continue;
            }
            let slice = &payload[usize::from(field.offset)..end];
            out.push((field.name.clone(), decode_field(field, slice, self.endian)));
        }
        out
    }

    // -- wire serialization --------------------------------------------

    /// Parse a schema blob produced by [`Schema::to_bytes`].
    ///
    /// Truncation of the fixed header or an entry record is a hard error.
    /// A missing or truncated enum/bitfield extension section is *not* an
    /// error — EOF there means "no extensions".
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < SCHEMA_FILE_HEADER_SIZE {
            return Err(ProtoError::Truncated {
                what: "schema header",
                expected: SCHEMA_FILE_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let endian = if data[0] == 0 { Endian::Little } else { Endian::Big };
        let entry_count = usize::from(u16::from_le_bytes([data[1], data[2]]));

        let mut pos = SCHEMA_FILE_HEADER_SIZE;
        let mut entries = Vec::with_capacity(entry_count);

        for _ in 0..entry_count {
            if pos + SCHEMA_ENTRY_WIRE_SIZE > data.len() {
                return Err(ProtoError::Truncated {
                    what: "schema entry",
                    expected: pos + SCHEMA_ENTRY_WIRE_SIZE,
                    actual: data.len(),
                });
            }
            let record = &data[pos..pos + SCHEMA_ENTRY_WIRE_SIZE];
            let id = u16::from_le_bytes([record[0], record[1]]);
            let payload_size = u16::from_le_bytes([record[2], record[3]]);
            let field_count = usize::from(u16::from_le_bytes([record[4], record[5]])).min(MAX_FIELDS);
            let name = unpack_str(&record[6..6 + NAME_MAX]);
            let desc = unpack_str(&record[6 + NAME_MAX..6 + NAME_MAX + DESC_MAX]);

            let mut fields = Vec::with_capacity(field_count);
            let fields_base = SCHEMA_ENTRY_HEADER_SIZE;
            for fi in 0..field_count {
                let frec = &record[fields_base + fi * FIELD_WIRE_SIZE..fields_base + (fi + 1) * FIELD_WIRE_SIZE];
                let fname = unpack_str(&frec[0..NAME_MAX]);
                let foffset = u16::from_le_bytes([frec[NAME_MAX], frec[NAME_MAX + 1]]);
                let fsize = u16::from_le_bytes([frec[NAME_MAX + 2], frec[NAME_MAX + 3]]);
                let ftype = BtelemType::from_u8(frec[NAME_MAX + 4]).unwrap_or(BtelemType::U8);
                let fcount = frec[NAME_MAX + 5];
                fields.push(FieldDef::new(fname, foffset, fsize, ftype, fcount));
            }

            entries.push(SchemaEntry { id, name, description: desc, payload_size, fields });
            pos += SCHEMA_ENTRY_WIRE_SIZE;
        }

        let mut schema = Self::new(entries, endian);

        // Optional enum section.
        if pos + 2 <= data.len() {
            let enum_count = usize::from(u16::from_le_bytes([data[pos], data[pos + 1]]));
            pos += 2;
            for _ in 0..enum_count {
                if pos + ENUM_RECORD_SIZE > data.len() {
                    break;
                }
                let rec = &data[pos..pos + ENUM_RECORD_SIZE];
                let entry_id = u16::from_le_bytes([rec[0], rec[1]]);
                let field_index = usize::from(u16::from_le_bytes([rec[2], rec[3]]));
                let label_count = usize::from(rec[4]).min(ENUM_MAX_VALUES);
                let labels_raw = &rec[5..];
                let mut labels = Vec::with_capacity(label_count);
                for li in 0..label_count {
                    let off = li * ENUM_LABEL_MAX;
                    labels.push(unpack_str(&labels_raw[off..off + ENUM_LABEL_MAX]));
                }
                pos += ENUM_RECORD_SIZE;

                if let Some(idx) = schema.id_index.get(&entry_id).copied()
                    && field_index < schema.entries[idx].fields.len()
                {
                    schema.entries[idx].fields[field_index].enum_labels = Some(labels);
                }
            }
        }

        // Optional bitfield section.
        if pos + 2 <= data.len() {
            let bf_count = usize::from(u16::from_le_bytes([data[pos], data[pos + 1]]));
            pos += 2;
            for _ in 0..bf_count {
                if pos + BITFIELD_RECORD_SIZE > data.len() {
                    break;
                }
                let rec = &data[pos..pos + BITFIELD_RECORD_SIZE];
                let entry_id = u16::from_le_bytes([rec[0], rec[1]]);
                let field_index = usize::from(u16::from_le_bytes([rec[2], rec[3]]));
                let bit_count = usize::from(rec[4]).min(BITFIELD_MAX_BITS);
                let names_raw = &rec[5..5 + BITFIELD_MAX_BITS * BIT_NAME_MAX];
                let starts_raw = &rec[5 + BITFIELD_MAX_BITS * BIT_NAME_MAX..5 + BITFIELD_MAX_BITS * BIT_NAME_MAX + BITFIELD_MAX_BITS];
                let widths_raw = &rec[5 + BITFIELD_MAX_BITS * BIT_NAME_MAX + BITFIELD_MAX_BITS..];
                let mut bits = Vec::with_capacity(bit_count);
                for bi in 0..bit_count {
                    let off = bi * BIT_NAME_MAX;
                    let name = unpack_str(&names_raw[off..off + BIT_NAME_MAX]);
                    bits.push(BitDef { name, start: starts_raw[bi], width: widths_raw[bi] });
                }
                pos += BITFIELD_RECORD_SIZE;

                if let Some(idx) = schema.id_index.get(&entry_id).copied()
                    && field_index < schema.entries[idx].fields.len()
                {
                    schema.entries[idx].fields[field_index].bitfield_bits = Some(bits);
                }
            }
        }

        Ok(schema)
    }

    /// Serialise this schema to the fixed-stride wire format. Always emits
    /// both extension section counts, even if zero, for forward
    /// compatibility with readers expecting them.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            SCHEMA_FILE_HEADER_SIZE + self.entries.len() * SCHEMA_ENTRY_WIRE_SIZE,
        );
        buf.push(if self.endian == Endian::Little { 0 } else { 1 });
        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());

        for e in &self.entries {
            let mut rec = vec![0u8; SCHEMA_ENTRY_WIRE_SIZE];
            rec[0..2].copy_from_slice(&e.id.to_le_bytes());
            rec[2..4].copy_from_slice(&e.payload_size.to_le_bytes());
            #[allow(clippy::cast_possible_truncation)]
            rec[4..6].copy_from_slice(&(e.fields.len() as u16).to_le_bytes());
            rec[6..6 + NAME_MAX].copy_from_slice(&pack_str(&e.name, NAME_MAX));
            rec[6 + NAME_MAX..6 + NAME_MAX + DESC_MAX]
                .copy_from_slice(&pack_str(&e.description, DESC_MAX));

            let fields_base = SCHEMA_ENTRY_HEADER_SIZE;
            for (fi, f) in e.fields.iter().take(MAX_FIELDS).enumerate() {
                let frec = &mut rec[fields_base + fi * FIELD_WIRE_SIZE..fields_base + (fi + 1) * FIELD_WIRE_SIZE];
                frec[0..NAME_MAX].copy_from_slice(&pack_str(&f.name, NAME_MAX));
                frec[NAME_MAX..NAME_MAX + 2].copy_from_slice(&f.offset.to_le_bytes());
                frec[NAME_MAX + 2..NAME_MAX + 4].copy_from_slice(&f.size.to_le_bytes());
                frec[NAME_MAX + 4] = f.ty.to_u8();
                frec[NAME_MAX + 5] = f.count;
            }

            buf.extend_from_slice(&rec);
        }

        let mut enum_records: Vec<(u16, u16, &[String])> = Vec::new();
        let mut bitfield_records: Vec<(u16, u16, &[BitDef])> = Vec::new();
        for e in &self.entries {
            for (fi, f) in e.fields.iter().take(MAX_FIELDS).enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let fi = fi as u16;
                if let Some(labels) = &f.enum_labels {
                    enum_records.push((e.id, fi, labels));
                }
                if let Some(bits) = &f.bitfield_bits {
                    bitfield_records.push((e.id, fi, bits));
                }
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&(enum_records.len() as u16).to_le_bytes());
        for (entry_id, field_index, labels) in enum_records {
            let mut rec = vec![0u8; ENUM_RECORD_SIZE];
            rec[0..2].copy_from_slice(&entry_id.to_le_bytes());
            rec[2..4].copy_from_slice(&field_index.to_le_bytes());
            let label_count = labels.len().min(ENUM_MAX_VALUES);
            #[allow(clippy::cast_possible_truncation)]
            {
                rec[4] = label_count as u8;
            }
            for (li, label) in labels.iter().take(ENUM_MAX_VALUES).enumerate() {
                let off = 5 + li * ENUM_LABEL_MAX;
                rec[off..off + ENUM_LABEL_MAX].copy_from_slice(&pack_str(label, ENUM_LABEL_MAX));
            }
            buf.extend_from_slice(&rec);
        }

        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&(bitfield_records.len() as u16).to_le_bytes());
        for (entry_id, field_index, bits) in bitfield_records {
            let mut rec = vec![0u8; BITFIELD_RECORD_SIZE];
            rec[0..2].copy_from_slice(&entry_id.to_le_bytes());
            rec[2..4].copy_from_slice(&field_index.to_le_bytes());
            let bit_count = bits.len().min(BITFIELD_MAX_BITS);
            #[allow(clippy::cast_possible_truncation)]
            {
                rec[4] = bit_count as u8;
            }
            let names_base = 5;
            let starts_base = names_base + BITFIELD_MAX_BITS * BIT_NAME_MAX;
            let widths_base = starts_base + BITFIELD_MAX_BITS;
            for (bi, bit) in bits.iter().take(BITFIELD_MAX_BITS).enumerate() {
                let off = names_base + bi * BIT_NAME_MAX;
                rec[off..off + BIT_NAME_MAX].copy_from_slice(&pack_str(&bit.name, BIT_NAME_MAX));
                rec[starts_base + bi] = bit.start;
                rec[widths_base + bi] = bit.width;
            }
            buf.extend_from_slice(&rec);
        }

        buf
    }
}

fn unpack_str(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn pack_str(s: &str, size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    let bytes = s.as_bytes();
    let take = bytes.len().min(size.saturating_sub(1));
    buf[..take].copy_from_slice(&bytes[..take]);
    buf
}

/// Decode one field's raw bytes per §4.3 of the telemetry wire format.
fn decode_field(field: &FieldDef, slice: &[u8], endian: Endian) -> FieldValue {
    match field.ty {
        BtelemType::Bytes => FieldValue::Bytes(slice.to_vec()),
        BtelemType::Enum => {
            let raw = slice.first().copied().unwrap_or(0);
            match &field.enum_labels {
                Some(labels) if (raw as usize) < labels.len() => {
                    FieldValue::EnumLabel(labels[raw as usize].clone())
                }
                _ => FieldValue::EnumRaw(raw),
            }
        }
        BtelemType::Bitfield => {
            let raw = read_uint(slice, endian);
            match &field.bitfield_bits {
                Some(bits) => {
                    let decomposed = bits
                        .iter()
                        .map(|bd| {
                            let mask = if bd.width >= 64 { u64::MAX } else { (1u64 << bd.width) - 1 };
                            (bd.name.clone(), (raw >> bd.start) & mask)
                        })
                        .collect();
                    FieldValue::Bitfield(decomposed)
                }
                None => FieldValue::BitfieldRaw(raw),
            }
        }
        scalar_ty if field.count > 1 => {
            let elem_size = scalar_ty.fixed_scalar_size().unwrap_or(1) as usize;
            let mut items = Vec::with_capacity(field.count as usize);
            for i in 0..field.count as usize {
                let start = i * elem_size;
                let end = start + elem_size;
                if end > slice.len() {
                    break;
                }
                items.push(decode_scalar(scalar_ty, &slice[start..end], endian));
            }
            FieldValue::Array(items)
        }
        scalar_ty => decode_scalar(scalar_ty, slice, endian),
    }
}

fn decode_scalar(ty: BtelemType, slice: &[u8], endian: Endian) -> FieldValue {
    match ty {
        BtelemType::U8 => FieldValue::U8(slice.first().copied().unwrap_or(0)),
        BtelemType::I8 => FieldValue::I8(slice.first().copied().unwrap_or(0) as i8),
        BtelemType::Bool => FieldValue::Bool(slice.first().copied().unwrap_or(0) != 0),
        BtelemType::U16 => FieldValue::U16(read_u16(slice, endian)),
        BtelemType::I16 => FieldValue::I16(read_u16(slice, endian) as i16),
        BtelemType::U32 => FieldValue::U32(read_u32(slice, endian)),
        BtelemType::I32 => FieldValue::I32(read_u32(slice, endian) as i32),
        BtelemType::F32 => FieldValue::F32(f32::from_bits(read_u32(slice, endian))),
        BtelemType::U64 => FieldValue::U64(read_u64(slice, endian)),
        BtelemType::I64 => FieldValue::I64(read_u64(slice, endian) as i64),
        BtelemType::F64 => FieldValue::F64(f64::from_bits(read_u64(slice, endian))),
        BtelemType::Bytes | BtelemType::Enum | BtelemType::Bitfield => {
            unreachable!("handled by decode_field before reaching decode_scalar")
        }
    }
}

fn read_u16(slice: &[u8], endian: Endian) -> u16 {
    let mut b = [0u8; 2];
    let n = slice.len().min(2);
    b[..n].copy_from_slice(&slice[..n]);
    match endian {
        Endian::Little => u16::from_le_bytes(b),
        Endian::Big => u16::from_be_bytes(b),
    }
}

fn read_u32(slice: &[u8], endian: Endian) -> u32 {
    let mut b = [0u8; 4];
    let n = slice.len().min(4);
    b[..n].copy_from_slice(&slice[..n]);
    match endian {
        Endian::Little => u32::from_le_bytes(b),
        Endian::Big => u32::from_be_bytes(b),
    }
}

fn read_u64(slice: &[u8], endian: Endian) -> u64 {
    let mut b = [0u8; 8];
    let n = slice.len().min(8);
    b[..n].copy_from_slice(&slice[..n]);
    match endian {
        Endian::Little => u64::from_le_bytes(b),
        Endian::Big => u64::from_be_bytes(b),
    }
}

/// Read the unsigned integer backing a `BITFIELD` field, sized 1/2/4 bytes
/// by the field's declared `size`.
fn read_uint(slice: &[u8], endian: Endian) -> u64 {
    match slice.len() {
        1 => u64::from(slice[0]),
        2 => u64::from(read_u16(slice, endian)),
        4 => u64::from(read_u32(slice, endian)),
        _ => read_u64(slice, endian),
    }
}
