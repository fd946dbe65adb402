//! Generic linear walk over an already-serialized code region (spec §4.3
//! "Literal-offset rewriter (C5)" and §4.5 pass 2/5): used by the merger to
//! collect literals from each input and relocate them into the merged
//! table, and by the literal extractor to gather strings for dumping.
//!
//! Unlike [`crate::save`]'s walk (which has the host-side [`crate::code`]
//! graph on hand and records patch sites as it goes), this module only ever
//! sees raw bytes — the shape a merge or an extract actually starts from.

use crate::error::{Error, TypeError};
use crate::flags::StatusFlags;
use crate::literal::{Literal, LiteralPool};
use crate::wire::{self, DecodedSlot, CONST_SLOT_SIZE, FUNCTION_HEADER_SIZE};

/// Step through every compiled-code record in `code`, in the order the
/// save-walker appended them, calling `visit` for each function node that
/// is not static (statics and regexps carry no rewritable literal
/// references). `visit` receives the record's byte offset within `code`
/// and its parsed header.
fn for_each_non_static_function<'a>(
    code: &'a [u8],
    mut visit: impl FnMut(usize, &wire::FunctionHeader) -> Result<(), Error>,
) -> Result<(), Error> {
    let mut pos = 0usize;
    while pos < code.len() {
        if pos + 10 > code.len() {
            return Err(TypeError::InvalidFormat.into());
        }
        let size_units = u32::from_ne_bytes(code[pos..pos + 4].try_into().unwrap());
        let status_flags = StatusFlags::from_bits_retain(u16::from_ne_bytes(code[pos + 8..pos + 10].try_into().unwrap()));
        let record_len = (size_units as usize) * crate::header::ALIGNMENT;
        if record_len == 0 || pos + record_len > code.len() {
            return Err(TypeError::InvalidFormat.into());
        }

        if status_flags.contains(StatusFlags::IS_FUNCTION) {
            let header = wire::FunctionHeader::read_from(&code[pos..pos + FUNCTION_HEADER_SIZE])?;
            if !header.status_flags.contains(StatusFlags::STATIC_FUNCTION) {
                visit(pos, &header)?;
            }
        }
        pos += record_len;
    }
    Ok(())
}

/// Every byte range, within one function node's record, that holds a
/// constant-literal or serializable-value slot (spec §3's "literal
/// vector"/"serializable-values area", minus sub-function slots).
fn literal_slot_positions(base: usize, header: &wire::FunctionHeader) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut p = base + FUNCTION_HEADER_SIZE;
    for _ in 0..header.const_slot_count() {
        positions.push(p);
        p += CONST_SLOT_SIZE;
    }
    // Sub-function slots and opcodes carry no literal references; skip to
    // the serializable-values tail.
    p += header.subfunction_slot_count() * CONST_SLOT_SIZE;
    p += header.opcode_len as usize;

    if header.status_flags.contains(StatusFlags::MAPPED_ARGUMENTS_NEEDED) {
        for _ in 0..header.arguments.argument_end {
            positions.push(p);
            p += CONST_SLOT_SIZE;
        }
    }
    if wire::wants_function_name(header.status_flags) {
        positions.push(p);
        p += CONST_SLOT_SIZE;
    }
    if header.status_flags.contains(StatusFlags::HAS_TAGGED_LITERALS) {
        positions.push(p);
        p += CONST_SLOT_SIZE;
    }
    if wire::wants_source_name() {
        positions.push(p);
    }
    positions
}

/// Collect every pooled literal referenced by `code`'s function nodes into
/// `pool`, resolving `TAG_POOLED_OFFSET` slots through `source_table` (the
/// *input* snapshot's own literal table — spec §4.5 pass 2).
pub fn collect_literals(code: &[u8], source_table: &[u8], pool: &mut LiteralPool) -> Result<(), Error> {
    for_each_non_static_function(code, |base, header| {
        for pos in literal_slot_positions(base, header) {
            let slot: &[u8; CONST_SLOT_SIZE] = code[pos..pos + CONST_SLOT_SIZE].try_into().unwrap();
            if let DecodedSlot::PooledAt(offset) = wire::decode_const_slot(slot)? {
                let literal = resolve_literal_at(source_table, offset)?;
                pool.append_value_if_absent(literal);
            }
        }
        Ok(())
    })
}

fn resolve_literal_at(table: &[u8], offset: u32) -> Result<Literal, Error> {
    LiteralPool::resolve_literal_at_offset(table, offset)
}

/// Rewrite every pooled-literal slot in `code` to point at its offset in
/// the merged table, resolving the pre-image value through `source_table`
/// (spec §4.5 pass 5: "sourcing the pre-image literal from the input's
/// table and the target offset from the merged map").
pub fn relocate_literals(
    code: &mut [u8],
    source_table: &[u8],
    merged_pool: &LiteralPool,
    merged_offset_for: impl Fn(u32) -> u32,
) -> Result<(), Error> {
    let mut patches = Vec::new();
    for_each_non_static_function(code, |base, header| {
        for pos in literal_slot_positions(base, header) {
            let slot: &[u8; CONST_SLOT_SIZE] = code[pos..pos + CONST_SLOT_SIZE].try_into().unwrap();
            if let DecodedSlot::PooledAt(offset) = wire::decode_const_slot(slot)? {
                let literal = resolve_literal_at(source_table, offset)?;
                let id = merged_pool
                    .id_of(&literal)
                    .ok_or(Error::Common(crate::error::CommonError::CannotAllocateMemoryForLiterals))?;
                patches.push((pos, merged_offset_for(id)));
            }
        }
        Ok(())
    })?;
    for (pos, new_offset) in patches {
        code[pos..pos + 4].copy_from_slice(&new_offset.to_ne_bytes());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{ArgumentsHeader, CodeArena, ConstLiteral, FunctionCode, Node, SerializableValues};
    use crate::flags::FunctionType;
    use crate::save::{generate_snapshot, SaveOptions};

    fn one_literal_snapshot(value: &str) -> (Vec<u8>, usize) {
        let mut arena = CodeArena::new();
        let f = FunctionCode::new(
            StatusFlags::IS_FUNCTION.with_function_type(FunctionType::Normal),
            ArgumentsHeader {
                argument_end: 0,
                register_end: 0,
            },
            vec![ConstLiteral::Pooled(Literal::InternedString(value.to_string()))],
            vec![],
            vec![0x01],
            SerializableValues {
                function_name: Some(ConstLiteral::Direct(crate::code::DirectValue::DirectString("f".into()))),
                ..Default::default()
            },
        )
        .unwrap();
        let root = arena.push(Node::Function(f));
        let mut out = vec![0u8; 512];
        let used = generate_snapshot(&arena, root, SaveOptions::default(), &mut out).unwrap();
        (out, used)
    }

    #[test]
    fn collects_pooled_literal_from_serialized_code() {
        let (buf, used) = one_literal_snapshot("hello");
        let header = crate::header::SnapshotHeader::read_from(&buf[..used]).unwrap();
        let code_start = header.func_offsets[0].target_offset() as usize;
        let code = &buf[code_start..header.lit_table_offset as usize];
        let table = &buf[header.lit_table_offset as usize..used];

        let mut pool = LiteralPool::new();
        collect_literals(code, table, &mut pool).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get(0), &Literal::InternedString("hello".into()));
    }
}
