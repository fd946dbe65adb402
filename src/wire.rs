//! Byte-level layout shared by the save-walker, rewriter, load-walker and
//! merger (spec §3 "Compiled-code node", §4.1–4.4). Every multi-byte field
//! is written in host byte order (§6): this format is not meant to be
//! portable across machines with a different endianness or pointer width.

use crate::code::{ArgumentsHeader, ConstLiteral, DirectValue};
use crate::error::{Error, RangeError, TypeError};
use crate::flags::StatusFlags;

/// Discriminates a node record's first byte.
pub const NODE_KIND_FUNCTION: u8 = 0;
pub const NODE_KIND_REGEXP: u8 = 1;

/// `size_units(4) + refs(4) + status_flags(2) + pad(2) + argument_end(4) +
/// register_end(4) + const_literal_end(4) + literal_end(4) + opcode_len(4)`.
pub const FUNCTION_HEADER_SIZE: usize = 32;

/// `size_units(4) + refs(4) + status_flags(2) + pad(2)`, then pattern bytes.
pub const REGEXP_HEADER_SIZE: usize = 12;

/// Width of one constant-literal, mapped-argument-name, function-name or
/// tagged-template slot. Wide enough to hold a tag byte plus either a short
/// inline string or a 32-bit pool offset.
pub const CONST_SLOT_SIZE: usize = 8;

/// Width of one sub-function slot: a plain signed byte offset (or the
/// self-reference sentinel `0`), sized generously rather than packed, since
/// this format makes no claim to bit-compatibility with the original.
pub const SUBFUNCTION_SLOT_SIZE: usize = 8;

/// `BYTECODE_NO_COPY_THRESHOLD` (spec §4.4 "copy vs redirect" heuristic):
/// redirect only saves space once the gap between header+literals and the
/// whole node exceeds this many bytes.
pub const NO_COPY_THRESHOLD: usize = 8;

/// `(2^31 - 1) / 2`: the largest offset the save-walker will write (spec
/// §4.1 "platform-dependent max offset", float64-numbers variant).
pub const MAX_SNAPSHOT_OFFSET: usize = ((1u64 << 31) - 1) as usize / 2;

const TAG_UNDEFINED: u8 = 0;
const TAG_NULL: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_FALSE: u8 = 3;
const TAG_SMALL_INT: u8 = 4;
const TAG_DIRECT_STRING: u8 = 5;
/// Written by the save-walker for a slot that still needs the C5 rewrite
/// pass; never valid to observe past that pass or on load.
pub const TAG_POOLED_PENDING: u8 = 6;
/// Written by the rewriter (or read by the loader): bytes `[1..5)` hold a
/// `u32` offset into the literal table.
pub const TAG_POOLED_OFFSET: u8 = 7;
/// Placeholder for a constant-literal slot holding a nested regexp node
/// (spec §3 invariant 5); patched to `TAG_REGEXP_OFFSET` once the child has
/// been serialized, in the same pass that resolves sub-function slots.
pub const TAG_REGEXP_PENDING: u8 = 8;
/// Bytes `[1..5)` hold a `u32` offset of the regexp node relative to the
/// parent function node's own start offset.
pub const TAG_REGEXP_OFFSET: u8 = 9;

/// Encode a constant-literal (or serializable-value) slot that is not yet
/// rewritten: direct values are written in final form, pooled literals as
/// `TAG_POOLED_PENDING` placeholders.
pub fn encode_const_slot(value: &ConstLiteral) -> Result<[u8; CONST_SLOT_SIZE], Error> {
    let mut out = [0u8; CONST_SLOT_SIZE];
    match value {
        ConstLiteral::Direct(DirectValue::Undefined) => out[0] = TAG_UNDEFINED,
        ConstLiteral::Direct(DirectValue::Null) => out[0] = TAG_NULL,
        ConstLiteral::Direct(DirectValue::True) => out[0] = TAG_TRUE,
        ConstLiteral::Direct(DirectValue::False) => out[0] = TAG_FALSE,
        ConstLiteral::Direct(DirectValue::SmallInt(v)) => {
            out[0] = TAG_SMALL_INT;
            out[1..5].copy_from_slice(&v.to_ne_bytes());
        }
        ConstLiteral::Direct(DirectValue::DirectString(s)) => {
            let bytes = s.as_bytes();
            if bytes.len() > DirectValue::MAX_DIRECT_STRING_LEN {
                return Err(RangeError::UnsupportedCompiledCode.into());
            }
            out[0] = TAG_DIRECT_STRING;
            out[1] = bytes.len() as u8;
            out[2..2 + bytes.len()].copy_from_slice(bytes);
        }
        ConstLiteral::Pooled(_) => out[0] = TAG_POOLED_PENDING,
        ConstLiteral::Regexp(_) => out[0] = TAG_REGEXP_PENDING,
    }
    Ok(out)
}

/// Decode a slot that has already been through the C5 rewrite pass (or was
/// never pooled): direct values decode to themselves, `TAG_POOLED_OFFSET`
/// decodes to the literal-table offset it carries, `TAG_REGEXP_OFFSET`
/// decodes to the nested regexp node's offset relative to its parent.
pub enum DecodedSlot {
    Direct(DirectValue),
    PooledAt(u32),
    RegexpAt(u32),
}

pub fn decode_const_slot(bytes: &[u8; CONST_SLOT_SIZE]) -> Result<DecodedSlot, Error> {
    match bytes[0] {
        TAG_UNDEFINED => Ok(DecodedSlot::Direct(DirectValue::Undefined)),
        TAG_NULL => Ok(DecodedSlot::Direct(DirectValue::Null)),
        TAG_TRUE => Ok(DecodedSlot::Direct(DirectValue::True)),
        TAG_FALSE => Ok(DecodedSlot::Direct(DirectValue::False)),
        TAG_SMALL_INT => {
            let v = i32::from_ne_bytes(bytes[1..5].try_into().unwrap());
            Ok(DecodedSlot::Direct(DirectValue::SmallInt(v)))
        }
        TAG_DIRECT_STRING => {
            let len = bytes[1] as usize;
            let s = std::str::from_utf8(&bytes[2..2 + len])
                .map_err(|_| Error::Type(TypeError::InvalidFormat))?;
            Ok(DecodedSlot::Direct(DirectValue::DirectString(s.to_string())))
        }
        TAG_POOLED_OFFSET => {
            let offset = u32::from_ne_bytes(bytes[1..5].try_into().unwrap());
            Ok(DecodedSlot::PooledAt(offset))
        }
        TAG_REGEXP_OFFSET => {
            let offset = u32::from_ne_bytes(bytes[1..5].try_into().unwrap());
            Ok(DecodedSlot::RegexpAt(offset))
        }
        _ => Err(TypeError::InvalidFormat.into()),
    }
}

/// Overwrite a previously-written `TAG_POOLED_PENDING` slot with its
/// resolved literal-table offset (the C5 rewrite step).
pub fn rewrite_pooled_slot(bytes: &mut [u8; CONST_SLOT_SIZE], offset: u32) {
    debug_assert_eq!(bytes[0], TAG_POOLED_PENDING);
    bytes[0] = TAG_POOLED_OFFSET;
    bytes[1..5].copy_from_slice(&offset.to_ne_bytes());
}

/// Overwrite a previously-written `TAG_REGEXP_PENDING` slot with the nested
/// regexp node's offset relative to its parent's start.
pub fn rewrite_regexp_slot(bytes: &mut [u8; CONST_SLOT_SIZE], relative_offset: u32) {
    debug_assert_eq!(bytes[0], TAG_REGEXP_PENDING);
    bytes[0] = TAG_REGEXP_OFFSET;
    bytes[1..5].copy_from_slice(&relative_offset.to_ne_bytes());
}

/// Sub-function slot sentinel: the self-reference marker.
pub const SELF_REFERENCE_SENTINEL: i64 = 0;

pub fn encode_subfunction_slot(relative_offset: Option<i64>) -> [u8; SUBFUNCTION_SLOT_SIZE] {
    relative_offset
        .unwrap_or(SELF_REFERENCE_SENTINEL)
        .to_ne_bytes()
}

pub fn decode_subfunction_slot(bytes: &[u8; SUBFUNCTION_SLOT_SIZE]) -> Option<i64> {
    let v = i64::from_ne_bytes(*bytes);
    if v == SELF_REFERENCE_SENTINEL {
        None
    } else {
        Some(v)
    }
}

/// Fixed function-node header, decoded from wire bytes (spec §3 C1 fields).
pub struct FunctionHeader {
    pub size_units: u32,
    pub refs: u32,
    pub status_flags: StatusFlags,
    pub arguments: ArgumentsHeader,
    pub const_literal_end: u32,
    pub literal_end: u32,
    pub opcode_len: u32,
}

impl FunctionHeader {
    pub fn write_to(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.size_units.to_ne_bytes());
        out[4..8].copy_from_slice(&self.refs.to_ne_bytes());
        out[8..10].copy_from_slice(&self.status_flags.bits().to_ne_bytes());
        out[10..12].copy_from_slice(&[0, 0]);
        out[12..16].copy_from_slice(&self.arguments.argument_end.to_ne_bytes());
        out[16..20].copy_from_slice(&self.arguments.register_end.to_ne_bytes());
        out[20..24].copy_from_slice(&self.const_literal_end.to_ne_bytes());
        out[24..28].copy_from_slice(&self.literal_end.to_ne_bytes());
        out[28..32].copy_from_slice(&self.opcode_len.to_ne_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < FUNCTION_HEADER_SIZE {
            return Err(TypeError::InvalidFormat.into());
        }
        let size_units = u32::from_ne_bytes(buf[0..4].try_into().unwrap());
        let refs = u32::from_ne_bytes(buf[4..8].try_into().unwrap());
        let status_flags = StatusFlags::from_bits_retain(u16::from_ne_bytes(buf[8..10].try_into().unwrap()));
        let argument_end = u32::from_ne_bytes(buf[12..16].try_into().unwrap());
        let register_end = u32::from_ne_bytes(buf[16..20].try_into().unwrap());
        let const_literal_end = u32::from_ne_bytes(buf[20..24].try_into().unwrap());
        let literal_end = u32::from_ne_bytes(buf[24..28].try_into().unwrap());
        let opcode_len = u32::from_ne_bytes(buf[28..32].try_into().unwrap());
        if register_end < argument_end || const_literal_end < register_end || literal_end < const_literal_end {
            return Err(TypeError::InvalidFormat.into());
        }
        Ok(FunctionHeader {
            size_units,
            refs,
            status_flags,
            arguments: ArgumentsHeader {
                argument_end,
                register_end,
            },
            const_literal_end,
            literal_end,
            opcode_len,
        })
    }

    pub fn literal_slot_count(&self) -> usize {
        (self.literal_end - self.arguments.register_end) as usize
    }

    pub fn const_slot_count(&self) -> usize {
        (self.const_literal_end - self.arguments.register_end) as usize
    }

    pub fn subfunction_slot_count(&self) -> usize {
        (self.literal_end - self.const_literal_end) as usize
    }
}

/// True if a function node's flags imply it wants a given optional
/// serializable-value slot (mirrors `FunctionCode::new`'s checks, kept here
/// too since load reconstructs presence from raw flags, not a `FunctionCode`).
pub fn wants_function_name(status_flags: StatusFlags) -> bool {
    status_flags.function_type() != crate::flags::FunctionType::Constructor
}

/// True iff the crate was built with the `source-name` feature — mirrors the
/// original's compile-time `JERRY_SOURCE_NAME` toggle (unlike the other
/// optional tail slots, this one isn't implied by any `StatusFlags` bit).
pub fn wants_source_name() -> bool {
    cfg!(feature = "source-name")
}
