//! Snapshot header layout (spec §3 "Snapshot header").
//!
//! `magic`, `version`, `global_flags`, `lit_table_offset`, `number_of_funcs`
//! followed by a `number_of_funcs`-long array of function offsets. All
//! multi-byte integers are written in host byte order (§6): cross-endian
//! interchange is not supported.

use crate::error::{Error, TypeError};

/// Alignment unit `A` (spec §3). All snapshot sizes and compiled-code
/// record starts are multiples of this.
pub const ALIGNMENT: usize = 8;

/// Round `value` up to the next multiple of `ALIGNMENT`.
pub const fn align_up(value: usize) -> usize {
    (value + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Fixed snapshot magic marker (InnerRef: `JERRY_SNAPSHOT_MAGIC`).
pub const MAGIC: u32 = 0x5952_524A;

/// Current snapshot format version. Bump on any layout change (spec §1
/// Non-goals: never change the layout silently).
pub const VERSION: u32 = 8;

bitflags::bitflags! {
    /// Global configuration/feature flags (word 2 of the header).
    ///
    /// Low 8 bits: dynamic features (observed per-snapshot). High 24 bits:
    /// compile-time features of the engine that produced the snapshot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GlobalFlags: u32 {
        /// The byte code references at least one regexp literal.
        const HAS_REGEX_LITERAL = 1 << 0;
        /// The byte code references at least one class (constructor) literal.
        const HAS_CLASS_LITERAL = 1 << 1;
        /// Snapshot was generated with 4-byte compressed pointers.
        const FOUR_BYTE_CPOINTER = 1 << 8;
    }
}

impl GlobalFlags {
    /// The subset of bits the *current* engine build understands and is
    /// willing to accept, given the `four-byte-cpointer` feature.
    pub fn supported_mask() -> GlobalFlags {
        let mut mask = GlobalFlags::HAS_REGEX_LITERAL | GlobalFlags::HAS_CLASS_LITERAL;
        if cfg!(feature = "four-byte-cpointer") {
            mask |= GlobalFlags::FOUR_BYTE_CPOINTER;
        }
        mask
    }

    /// True if every bit set in `self` is a bit the running engine supports.
    ///
    /// Mirrors `snapshot_check_global_flags`: mask out every feature bit the
    /// engine supports and require the remainder to be zero.
    pub fn is_compatible(self) -> bool {
        (self & !Self::supported_mask()).is_empty()
    }
}

/// Byte offset of a primary function's node, with bit 0 reserved to flag an
/// "eval context" root (vs. "global context").
///
/// Merge preserves this bit verbatim across relocation (spec §9, open
/// question 3): `target_offset()` is adjusted by the relocation delta,
/// `context_bit()` never is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncOffset(pub u32);

impl FuncOffset {
    pub const EVAL_CONTEXT: u32 = 0x1;

    pub fn new(offset: u32, is_eval_context: bool) -> Self {
        debug_assert_eq!(offset & Self::EVAL_CONTEXT, 0, "offset must be alignment-sized");
        FuncOffset(offset | if is_eval_context { Self::EVAL_CONTEXT } else { 0 })
    }

    pub fn is_eval_context(self) -> bool {
        self.0 & Self::EVAL_CONTEXT != 0
    }

    /// The byte offset of the node itself, with the context bit masked out.
    pub fn target_offset(self) -> u32 {
        self.0 & !Self::EVAL_CONTEXT
    }

    /// Relocate by `delta`, leaving the context bit untouched.
    pub fn relocated(self, delta: u32) -> Self {
        FuncOffset(self.target_offset().wrapping_add(delta) | (self.0 & Self::EVAL_CONTEXT))
    }
}

/// Number of header words preceding `func_offsets[1..]`: magic, version,
/// global_flags, lit_table_offset, number_of_funcs, func_offsets[0].
pub const HEADER_STRUCT_WORDS: usize = 6;
pub const HEADER_STRUCT_SIZE: usize = HEADER_STRUCT_WORDS * 4;

/// Total byte size of the header region (fixed words + the `number_of_funcs`
/// function-offset array), padded to `ALIGNMENT`.
pub fn header_region_size(number_of_funcs: u32) -> usize {
    assert!(number_of_funcs >= 1, "a snapshot must have at least one primary function");
    align_up(HEADER_STRUCT_SIZE + (number_of_funcs as usize - 1) * 4)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    pub global_flags: GlobalFlags,
    pub lit_table_offset: u32,
    pub func_offsets: Vec<FuncOffset>,
}

impl SnapshotHeader {
    pub fn number_of_funcs(&self) -> u32 {
        self.func_offsets.len() as u32
    }

    pub fn encoded_size(&self) -> usize {
        header_region_size(self.number_of_funcs())
    }

    /// Write the header into `buf` at offset 0. `buf` must be at least
    /// `self.encoded_size()` long.
    pub fn write_to(&self, buf: &mut [u8]) {
        let mut w = WordWriter::new(buf);
        w.put(self.magic);
        w.put(self.version);
        w.put(self.global_flags.bits());
        w.put(self.lit_table_offset);
        w.put(self.number_of_funcs());
        for fo in &self.func_offsets {
            w.put(fo.0);
        }
    }

    /// Parse a header from the start of `buf`. Validates `magic`/`version`/
    /// `global_flags` against the running engine and that `lit_table_offset`
    /// fits inside `buf`, but does not validate any particular function
    /// index (callers check that separately, spec §4.4).
    pub fn read_from(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_STRUCT_SIZE {
            return Err(TypeError::InvalidFormat.into());
        }
        let mut r = WordReader::new(buf);
        let magic = r.get().ok_or(TypeError::InvalidFormat)?;
        let version = r.get().ok_or(TypeError::InvalidFormat)?;
        let global_flags_raw = r.get().ok_or(TypeError::InvalidFormat)?;
        let lit_table_offset = r.get().ok_or(TypeError::InvalidFormat)?;
        let number_of_funcs = r.get().ok_or(TypeError::InvalidFormat)?;

        if magic != MAGIC || version != VERSION {
            return Err(TypeError::InvalidVersionOrFeatures.into());
        }
        let global_flags = GlobalFlags::from_bits_retain(global_flags_raw);
        if !global_flags.is_compatible() {
            return Err(TypeError::InvalidVersionOrFeatures.into());
        }
        if number_of_funcs == 0 {
            return Err(TypeError::InvalidFormat.into());
        }

        let needed = header_region_size(number_of_funcs);
        if buf.len() < needed || (lit_table_offset as usize) > buf.len() {
            return Err(TypeError::InvalidFormat.into());
        }

        let mut func_offsets = Vec::with_capacity(number_of_funcs as usize);
        for _ in 0..number_of_funcs {
            func_offsets.push(FuncOffset(r.get().ok_or(TypeError::InvalidFormat)?));
        }

        Ok(SnapshotHeader {
            magic,
            version,
            global_flags,
            lit_table_offset,
            func_offsets,
        })
    }
}

/// Tiny native-endian `u32` writer, mirroring the teacher's manual
/// byte-packing helpers (`ida_reader.rs`) but for output.
struct WordWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WordWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, value: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&value.to_ne_bytes());
        self.pos += 4;
    }
}

struct WordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WordReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn get(&mut self) -> Option<u32> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_ne_bytes(bytes.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_alignment() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), ALIGNMENT);
        assert_eq!(align_up(ALIGNMENT), ALIGNMENT);
        assert_eq!(align_up(ALIGNMENT + 1), 2 * ALIGNMENT);
    }

    #[test]
    fn func_offset_preserves_context_bit_across_relocation() {
        let fo = FuncOffset::new(256, true);
        assert!(fo.is_eval_context());
        assert_eq!(fo.target_offset(), 256);
        let relocated = fo.relocated(64);
        assert!(relocated.is_eval_context());
        assert_eq!(relocated.target_offset(), 320);
    }

    #[test]
    fn header_round_trips() {
        let header = SnapshotHeader {
            magic: MAGIC,
            version: VERSION,
            global_flags: GlobalFlags::HAS_REGEX_LITERAL,
            lit_table_offset: 128,
            func_offsets: vec![FuncOffset::new(24, false), FuncOffset::new(96, true)],
        };
        let mut buf = vec![0u8; header.encoded_size()];
        header.write_to(&mut buf);
        let parsed = SnapshotHeader::read_from(&buf).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn rejects_unsupported_feature_bits() {
        let header = SnapshotHeader {
            magic: MAGIC,
            version: VERSION,
            global_flags: GlobalFlags::from_bits_retain(1 << 5),
            lit_table_offset: 64,
            func_offsets: vec![FuncOffset::new(24, false)],
        };
        let mut buf = vec![0u8; header.encoded_size()];
        header.write_to(&mut buf);
        assert_eq!(
            SnapshotHeader::read_from(&buf),
            Err(Error::Type(TypeError::InvalidVersionOrFeatures))
        );
    }
}
