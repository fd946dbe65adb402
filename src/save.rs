//! Save-walker (C3) and static save-walker (C4), spec §4.1–4.2.
//!
//! Both variants share one recursive walk; [`SaveMode`] selects the few
//! points where they diverge (regexp nodes rejected, literal forms
//! restricted, `STATIC_FUNCTION` set, the literal-offset rewrite skipped).

use crate::code::{CodeArena, ConstLiteral, Node, NodeId, SubFunctionSlot};
use crate::error::{Error, RangeError};
use crate::flags::{FunctionType, StatusFlags};
use crate::header::{align_up, header_region_size, FuncOffset, GlobalFlags, SnapshotHeader, ALIGNMENT, MAGIC, VERSION};
use crate::literal::{Literal, LiteralPool};
use crate::wire::{self, FunctionHeader, CONST_SLOT_SIZE, FUNCTION_HEADER_SIZE, MAX_SNAPSHOT_OFFSET, REGEXP_HEADER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Normal,
    Static,
}

#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    pub mode: SaveMode,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions { mode: SaveMode::Normal }
    }
}

#[derive(Default)]
struct WalkState {
    code: Vec<u8>,
    regex_found: bool,
    class_found: bool,
    /// Byte position (within `code`) of every `TAG_POOLED_PENDING` slot and
    /// the literal value it was asked to hold, awaiting the C5 rewrite pass.
    literal_patches: Vec<(usize, Literal)>,
}

/// `generate_snapshot` (spec §6 public entry point): save `root` (and
/// everything reachable from it) into `out`, returning the number of bytes
/// written.
pub fn generate_snapshot(
    arena: &CodeArena,
    root: NodeId,
    options: SaveOptions,
    out: &mut [u8],
) -> Result<usize, Error> {
    let header_size = header_region_size(1);

    match arena.get(root) {
        Node::Function(f) => {
            if f.status_flags.function_type() != FunctionType::Normal {
                return Err(RangeError::UnsupportedCompiledCode.into());
            }
            if f.status_flags.contains(StatusFlags::HAS_TAGGED_LITERALS) {
                return Err(RangeError::TaggedTemplateLiterals.into());
            }
        }
        Node::RegExp(_) if options.mode == SaveMode::Static => {
            return Err(RangeError::RegularExpressionNotSupported.into())
        }
        Node::RegExp(_) => return Err(RangeError::UnsupportedCompiledCode.into()),
    }

    let mut state = WalkState::default();
    let start = walk_node(arena, root, &mut state, header_size, options.mode)?;
    debug_assert_eq!(start, 0);

    let mut global_flags = GlobalFlags::empty();
    if state.regex_found {
        global_flags |= GlobalFlags::HAS_REGEX_LITERAL;
    }
    if state.class_found {
        global_flags |= GlobalFlags::HAS_CLASS_LITERAL;
    }

    let literal_table_bytes = match options.mode {
        SaveMode::Normal => {
            let mut pool = LiteralPool::new();
            for (_, literal) in &state.literal_patches {
                pool.append_value_if_absent(literal.clone());
            }
            let table = pool.emit_for_snapshot()?;
            for (pos, literal) in &state.literal_patches {
                let id = pool
                    .id_of(literal)
                    .expect("every patch literal was just appended to the pool");
                let offset = table.offset_for_id(id);
                let slot: &mut [u8; CONST_SLOT_SIZE] =
                    (&mut state.code[*pos..*pos + CONST_SLOT_SIZE]).try_into().unwrap();
                wire::rewrite_pooled_slot(slot, offset);
            }
            table.bytes
        }
        // Static snapshots are executed in place; C5 is skipped (spec §4.2).
        SaveMode::Static => Vec::new(),
    };

    let lit_table_offset = header_size + state.code.len();
    let total = lit_table_offset + literal_table_bytes.len();

    if total > MAX_SNAPSHOT_OFFSET {
        return Err(RangeError::MaximumSnapshotSizeExceeded.into());
    }
    if total > out.len() {
        return Err(RangeError::OutputBufferTooSmall.into());
    }

    // Assemble off to the side so a buffer-too-small failure (checked
    // above) or any other late error never touches `out`'s first bytes —
    // the header is always the last thing a caller could observe written.
    let mut scratch = vec![0u8; total];
    scratch[header_size..lit_table_offset].copy_from_slice(&state.code);
    scratch[lit_table_offset..total].copy_from_slice(&literal_table_bytes);

    let header = SnapshotHeader {
        magic: MAGIC,
        version: VERSION,
        global_flags,
        lit_table_offset: lit_table_offset as u32,
        func_offsets: vec![FuncOffset::new(header_size as u32, false)],
    };
    header.write_to(&mut scratch[..header_size]);

    out[..total].copy_from_slice(&scratch);
    Ok(total)
}

/// Recursively serialize `node_id` and everything it reaches, appending to
/// `state.code`. Returns the node's `start_offset` (spec §4.1): its
/// position within the code region, i.e. relative to `header_size`.
fn walk_node(
    arena: &CodeArena,
    node_id: NodeId,
    state: &mut WalkState,
    header_size: usize,
    mode: SaveMode,
) -> Result<usize, Error> {
    if header_size + state.code.len() > MAX_SNAPSHOT_OFFSET {
        return Err(RangeError::MaximumSnapshotSizeExceeded.into());
    }
    let start = state.code.len();

    match arena.get(node_id) {
        Node::RegExp(r) => {
            if mode == SaveMode::Static {
                return Err(RangeError::RegularExpressionNotSupported.into());
            }
            let pattern_len = r.pattern.len();
            let padded_len = align_up(REGEXP_HEADER_SIZE + pattern_len);
            let size_units = (padded_len / ALIGNMENT) as u32;

            let mut rec = vec![0u8; padded_len];
            rec[0..4].copy_from_slice(&size_units.to_ne_bytes());
            // `refs` is set to the pattern length *before* the header size
            // is folded into `size_units` above (SUPPLEMENTED FEATURES #1).
            rec[4..8].copy_from_slice(&(pattern_len as u32).to_ne_bytes());
            rec[8..10].copy_from_slice(&r.status_flags.bits().to_ne_bytes());
            rec[REGEXP_HEADER_SIZE..REGEXP_HEADER_SIZE + pattern_len].copy_from_slice(&r.pattern);
            state.code.extend_from_slice(&rec);
            state.regex_found = true;
            Ok(start)
        }
        Node::Function(f) => {
            if f.status_flags.contains(StatusFlags::HAS_TAGGED_LITERALS) {
                return Err(RangeError::TaggedTemplateLiterals.into());
            }
            if mode == SaveMode::Static {
                for literal in &f.literals {
                    check_static_safe(literal)?;
                }
                if let Some(names) = &f.serializable.mapped_argument_names {
                    for name in names {
                        check_static_safe(name)?;
                    }
                }
                if let Some(name) = &f.serializable.function_name {
                    check_static_safe(name)?;
                }
                if let Some(name) = &f.serializable.source_name {
                    check_static_safe(name)?;
                }
            }
            if f.status_flags.function_type() == FunctionType::Constructor {
                state.class_found = true;
            }

            let mut status_flags = f.status_flags & !StatusFlags::HAS_LINE_INFO;
            if mode == SaveMode::Static {
                status_flags |= StatusFlags::STATIC_FUNCTION;
            }

            let header_pos = state.code.len();
            state.code.extend(std::iter::repeat(0u8).take(FUNCTION_HEADER_SIZE));

            let mut regexp_patches = Vec::new();
            for literal in &f.literals {
                let slot_pos = state.code.len();
                let encoded = wire::encode_const_slot(literal)?;
                state.code.extend_from_slice(&encoded);
                match literal {
                    ConstLiteral::Pooled(value) => state.literal_patches.push((slot_pos, value.clone())),
                    ConstLiteral::Regexp(child) => regexp_patches.push((slot_pos, *child)),
                    ConstLiteral::Direct(_) => {}
                }
            }

            let subfunction_start = state.code.len();
            for _ in &f.sub_functions {
                state.code.extend_from_slice(&[0u8; CONST_SLOT_SIZE]);
            }

            state.code.extend_from_slice(&f.opcodes);

            if let Some(names) = &f.serializable.mapped_argument_names {
                for name in names {
                    let slot_pos = state.code.len();
                    let encoded = wire::encode_const_slot(name)?;
                    state.code.extend_from_slice(&encoded);
                    if let ConstLiteral::Pooled(value) = name {
                        state.literal_patches.push((slot_pos, value.clone()));
                    }
                }
            }
            if let Some(name) = &f.serializable.function_name {
                let slot_pos = state.code.len();
                let encoded = wire::encode_const_slot(name)?;
                state.code.extend_from_slice(&encoded);
                if let ConstLiteral::Pooled(value) = name {
                    state.literal_patches.push((slot_pos, value.clone()));
                }
            }
            if let Some(tagged) = &f.serializable.tagged_template {
                let slot_pos = state.code.len();
                let encoded = wire::encode_const_slot(tagged)?;
                state.code.extend_from_slice(&encoded);
                if let ConstLiteral::Pooled(value) = tagged {
                    state.literal_patches.push((slot_pos, value.clone()));
                }
            }
            if let Some(source_name) = &f.serializable.source_name {
                let slot_pos = state.code.len();
                let encoded = wire::encode_const_slot(source_name)?;
                state.code.extend_from_slice(&encoded);
                if let ConstLiteral::Pooled(value) = source_name {
                    state.literal_patches.push((slot_pos, value.clone()));
                }
            }

            let unpadded_len = state.code.len() - start;
            let padded_len = align_up(unpadded_len);
            state.code.extend(std::iter::repeat(0u8).take(padded_len - unpadded_len));

            // Regexp-literal children are serialized before sub-function
            // children; both orderings append after this node's own bytes,
            // so the relative order between the two groups is otherwise
            // unobservable.
            for (slot_pos, child_id) in regexp_patches {
                let child_start = walk_node(arena, child_id, state, header_size, mode)?;
                debug_assert!(child_start > start, "child offset must exceed parent start_offset");
                let rel = (child_start - start) as u32;
                let slot: &mut [u8; CONST_SLOT_SIZE] =
                    (&mut state.code[slot_pos..slot_pos + CONST_SLOT_SIZE]).try_into().unwrap();
                wire::rewrite_regexp_slot(slot, rel);
            }

            for (k, slot) in f.sub_functions.iter().enumerate() {
                let slot_pos = subfunction_start + k * CONST_SLOT_SIZE;
                match slot {
                    SubFunctionSlot::SelfReference => {
                        // Slot already holds the zero sentinel.
                    }
                    SubFunctionSlot::Child(child_id) => {
                        let child_start = walk_node(arena, *child_id, state, header_size, mode)?;
                        debug_assert!(child_start > start, "child offset must exceed parent start_offset");
                        let rel = (child_start - start) as i64;
                        state.code[slot_pos..slot_pos + CONST_SLOT_SIZE]
                            .copy_from_slice(&wire::encode_subfunction_slot(Some(rel)));
                    }
                }
            }

            let size_units = (padded_len / ALIGNMENT) as u32;
            let header_rec = FunctionHeader {
                size_units,
                // C5 sets `refs := 1` for normal saves; static saves skip
                // C5 entirely, so it is set directly here instead.
                refs: if mode == SaveMode::Static { 1 } else { 0 },
                status_flags,
                arguments: f.header,
                const_literal_end: f.const_literal_end(),
                literal_end: f.literal_end(),
                opcode_len: f.opcodes.len() as u32,
            };
            header_rec.write_to(&mut state.code[header_pos..header_pos + FUNCTION_HEADER_SIZE]);

            Ok(start)
        }
    }
}

fn check_static_safe(literal: &ConstLiteral) -> Result<(), Error> {
    if literal.is_static_safe() {
        Ok(())
    } else {
        Err(RangeError::UnsupportedStaticLiteral(literal.describe_for_error()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{ArgumentsHeader, DirectValue, FunctionCode, RegExpCode, SerializableValues};
    use crate::flags::FunctionType;

    fn function_named(name: &str) -> FunctionCode {
        FunctionCode::new(
            StatusFlags::IS_FUNCTION.with_function_type(FunctionType::Normal),
            ArgumentsHeader {
                argument_end: 0,
                register_end: 0,
            },
            vec![],
            vec![],
            vec![0xAA],
            SerializableValues {
                function_name: Some(ConstLiteral::Direct(DirectValue::DirectString(name.to_string()))),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn rejects_tagged_template_literals() {
        let mut arena = CodeArena::new();
        let mut f = function_named("f");
        f.status_flags |= StatusFlags::HAS_TAGGED_LITERALS;
        f.serializable.tagged_template = Some(ConstLiteral::Direct(DirectValue::Undefined));
        let root = arena.push(crate::code::Node::Function(f));

        let mut out = vec![0u8; 256];
        let err = generate_snapshot(&arena, root, SaveOptions::default(), &mut out).unwrap_err();
        assert_eq!(err, Error::Range(RangeError::TaggedTemplateLiterals));
    }

    #[test]
    fn header_is_valid_magic_only_on_success() {
        let mut arena = CodeArena::new();
        let root = arena.push(crate::code::Node::Function(function_named("f")));

        let mut out = vec![0u8; 4];
        let err = generate_snapshot(&arena, root, SaveOptions::default(), &mut out).unwrap_err();
        assert_eq!(err, Error::Range(RangeError::OutputBufferTooSmall));
        assert_ne!(u32::from_ne_bytes(out[0..4].try_into().unwrap()), MAGIC);
    }

    #[test]
    fn static_save_rejects_regexp_root() {
        let mut arena = CodeArena::new();
        let root = arena.push(crate::code::Node::RegExp(RegExpCode::new(b"ab+c".to_vec())));
        let mut out = vec![0u8; 256];
        let err = generate_snapshot(
            &arena,
            root,
            SaveOptions { mode: SaveMode::Static },
            &mut out,
        )
        .unwrap_err();
        assert_eq!(err, Error::Range(RangeError::RegularExpressionNotSupported));
    }

    #[test]
    fn static_save_rejects_pooled_literal() {
        let mut arena = CodeArena::new();
        let mut f = function_named("f");
        f.literals.push(ConstLiteral::Pooled(Literal::InternedString("x".into())));
        let root = arena.push(crate::code::Node::Function(f));

        let mut out = vec![0u8; 256];
        let err = generate_snapshot(
            &arena,
            root,
            SaveOptions { mode: SaveMode::Static },
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Range(RangeError::UnsupportedStaticLiteral(_))));
    }

    #[test]
    fn save_sets_static_flag_and_skips_rewrite() {
        let mut arena = CodeArena::new();
        let root = arena.push(crate::code::Node::Function(function_named("f")));

        let mut out = vec![0u8; 512];
        let used = generate_snapshot(
            &arena,
            root,
            SaveOptions { mode: SaveMode::Static },
            &mut out,
        )
        .unwrap();
        let header = SnapshotHeader::read_from(&out[..used]).unwrap();
        let node_start = header.func_offsets[0].target_offset() as usize;
        let node_header = FunctionHeader::read_from(&out[node_start..used]).unwrap();
        assert!(node_header.status_flags.contains(StatusFlags::STATIC_FUNCTION));
        assert_eq!(node_header.refs, 1);
    }
}
