use anyhow::{Context, Result};

use ecma_snapshot::{exec_snapshot, AcceptAllRegexpCompiler, ExecFlags, ExecResult};

use crate::ExecRequest;

pub fn cmd_exec(req: ExecRequest) -> Result<()> {
    let buf = std::fs::read(&req.input)
        .with_context(|| format!("reading snapshot {}", req.input.display()))?;

    let mut flags = ExecFlags::empty();
    if req.allow_static {
        flags |= ExecFlags::ALLOW_STATIC;
    }
    if req.copy_data {
        flags |= ExecFlags::COPY_DATA;
    }

    match exec_snapshot(&buf, req.index, flags, None, false, &AcceptAllRegexpCompiler)? {
        ExecResult::Static(f) => {
            println!("static function, {} opcode bytes, {} literal slots", f.opcodes.len(), f.literals.len());
        }
        ExecResult::Dynamic(outcome) => {
            println!(
                "loaded function node {:?} ({} nodes materialized)",
                outcome.root,
                outcome.arena.len()
            );
        }
    }
    Ok(())
}
