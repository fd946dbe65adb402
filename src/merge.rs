//! Merger (C7), spec §4.5: fold several independently-saved snapshots into
//! one, deduplicating literals across them.

use crate::error::{Error, RangeError, TypeError};
use crate::header::{header_region_size, GlobalFlags, SnapshotHeader, ALIGNMENT, MAGIC, VERSION};
use crate::literal::LiteralPool;
use crate::rewrite;

pub struct MergeInput<'a> {
    pub buf: &'a [u8],
}

/// `merge_snapshots` (spec §6 public entry point). Returns the number of
/// bytes written to `out`, or an `(Error, message)` pair mirroring the
/// original's `out_error_p` convention (spec §7 "Merge writes a
/// human-readable string into `out_error_p`").
pub fn merge_snapshots(inputs: &[MergeInput], out: &mut [u8]) -> Result<usize, (Error, String)> {
    if inputs.len() < 2 {
        return Err((
            RangeError::AtLeastTwoSnapshots.into(),
            "at least two snapshots must be passed".to_string(),
        ));
    }

    // Pass 1: validate and size.
    let mut headers = Vec::with_capacity(inputs.len());
    let mut merged_global_flags = GlobalFlags::empty();
    let mut total_code_bytes = 0usize;
    let mut number_of_funcs = 0u32;
    for input in inputs {
        let header = SnapshotHeader::read_from(input.buf).map_err(|e| (e.clone(), describe(&e)))?;
        let code_start = header.func_offsets[0].target_offset() as usize;
        if (header.lit_table_offset as usize) < code_start {
            return Err((TypeError::InvalidFormat.into(), "invalid format".to_string()));
        }
        total_code_bytes += header.lit_table_offset as usize - code_start;
        number_of_funcs += header.number_of_funcs();
        merged_global_flags |= header.global_flags;
        headers.push(header);
    }

    // Pass 2: collect literals.
    let mut pool = LiteralPool::new();
    for (input, header) in inputs.iter().zip(&headers) {
        let code_start = header.func_offsets[0].target_offset() as usize;
        let code = &input.buf[code_start..header.lit_table_offset as usize];
        let table = &input.buf[header.lit_table_offset as usize..];
        rewrite::collect_literals(code, table, &mut pool).map_err(|e| (e.clone(), describe(&e)))?;
    }

    // Pass 3: header layout.
    let functions_size = header_region_size(number_of_funcs) + total_code_bytes;
    if functions_size >= out.len() {
        return Err((
            RangeError::OutputBufferTooSmall.into(),
            "output buffer is too small".to_string(),
        ));
    }

    // Pass 4: emit literals.
    let table = pool.emit_for_snapshot().map_err(|e| (e.clone(), describe(&e)))?;
    let lit_table_offset = functions_size;
    let total = lit_table_offset + table.bytes.len();
    if total > out.len() {
        return Err((
            RangeError::OutputBufferTooSmall.into(),
            "output buffer is too small".to_string(),
        ));
    }

    // Pass 5: copy code and relocate.
    let header_size = header_region_size(number_of_funcs);
    let mut scratch = vec![0u8; total];
    let mut func_offsets = Vec::with_capacity(number_of_funcs as usize);
    let mut dst = header_size;

    for (input, header) in inputs.iter().zip(&headers) {
        let code_start = header.func_offsets[0].target_offset() as usize;
        let input_table = &input.buf[header.lit_table_offset as usize..];
        let mut region = input.buf[code_start..header.lit_table_offset as usize].to_vec();
        rewrite::relocate_literals(&mut region, input_table, &pool, |id| table.offset_for_id(id))
            .map_err(|e| (e.clone(), describe(&e)))?;

        let region_start_in_output = dst;
        scratch[dst..dst + region.len()].copy_from_slice(&region);
        dst += region.len();
        debug_assert_eq!(dst % ALIGNMENT, 0, "each input's code region is pre-aligned to A");

        // Offsets stay well within i32 range (bounded by
        // `MAX_SNAPSHOT_OFFSET`), so this narrowing preserves the delta's
        // sign via ordinary two's-complement wraparound.
        let delta = (region_start_in_output as i64 - code_start as i64) as u32;
        for fo in &header.func_offsets {
            func_offsets.push(fo.relocated(delta));
        }
    }
    debug_assert_eq!(dst, lit_table_offset, "dst_ptr - out_buffer == lit_table_offset");

    scratch[lit_table_offset..total].copy_from_slice(&table.bytes);

    let header = SnapshotHeader {
        magic: MAGIC,
        version: VERSION,
        global_flags: merged_global_flags,
        lit_table_offset: lit_table_offset as u32,
        func_offsets,
    };
    header.write_to(&mut scratch[..header_size]);

    out[..total].copy_from_slice(&scratch);
    Ok(total)
}

fn describe(error: &Error) -> String {
    error.to_string()
}
