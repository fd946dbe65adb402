use anyhow::{anyhow, Context, Result};

use ecma_snapshot::get_literals_from_snapshot;

use crate::LiteralsRequest;

pub fn cmd_literals(req: LiteralsRequest) -> Result<()> {
    let buf = std::fs::read(&req.input)
        .with_context(|| format!("reading snapshot {}", req.input.display()))?;

    let dump = get_literals_from_snapshot(&buf, req.c_format)
        .ok_or_else(|| anyhow!("not a valid snapshot"))?;

    std::io::Write::write_all(&mut std::io::stdout(), &dump)?;
    Ok(())
}
