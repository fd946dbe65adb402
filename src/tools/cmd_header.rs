use anyhow::{Context, Result};

use ecma_snapshot::SnapshotHeader;

use crate::HeaderRequest;

pub fn cmd_header(req: HeaderRequest) -> Result<()> {
    let buf = std::fs::read(&req.input)
        .with_context(|| format!("reading snapshot {}", req.input.display()))?;

    let header = SnapshotHeader::read_from(&buf)?;
    println!("version: {}", header.version);
    println!("global flags: {:?}", header.global_flags);
    println!("literal table offset: {}", header.lit_table_offset);
    println!("primary functions: {}", header.number_of_funcs());
    for (i, fo) in header.func_offsets.iter().enumerate() {
        println!(
            "  [{i}] offset {} (eval context: {})",
            fo.target_offset(),
            fo.is_eval_context()
        );
    }
    Ok(())
}
