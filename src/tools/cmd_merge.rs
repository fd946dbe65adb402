use anyhow::{anyhow, Context, Result};

use ecma_snapshot::{merge_snapshots, MergeInput};

use crate::MergeRequest;

pub fn cmd_merge(req: MergeRequest) -> Result<()> {
    let buffers = req
        .inputs
        .iter()
        .map(|path| std::fs::read(path).with_context(|| format!("reading snapshot {}", path.display())))
        .collect::<Result<Vec<_>>>()?;

    let inputs: Vec<MergeInput> = buffers.iter().map(|buf| MergeInput { buf }).collect();
    let mut out = vec![0u8; req.output_capacity];

    let used = merge_snapshots(&inputs, &mut out).map_err(|(_, msg)| anyhow!(msg))?;
    out.truncate(used);

    std::fs::write(&req.output, &out)
        .with_context(|| format!("writing merged snapshot {}", req.output.display()))?;

    println!("merged {} snapshots into {} bytes", req.inputs.len(), used);
    Ok(())
}
