mod cmd_exec;
use cmd_exec::cmd_exec;
mod cmd_header;
use cmd_header::cmd_header;
mod cmd_literals;
use cmd_literals::cmd_literals;
mod cmd_merge;
use cmd_merge::cmd_merge;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Inspect and manipulate ECMAScript engine snapshots.
#[derive(Clone, Debug, Parser)]
struct Args {
    #[command(subcommand)]
    operation: Operation,
}

#[derive(Clone, Debug, Subcommand)]
enum Operation {
    /// Execute a primary function from a snapshot file.
    Exec(ExecArgs),
    /// Merge two or more snapshot files into one.
    Merge(MergeArgs),
    /// Dump the identifier literals referenced by a snapshot.
    Literals(LiteralsArgs),
    /// Print a snapshot's header fields.
    Header(HeaderArgs),
}

#[derive(Clone, Debug, Parser)]
struct ExecArgs {
    /// snapshot file to load
    input: PathBuf,
    /// index of the primary function to run
    #[arg(short, long, default_value_t = 0)]
    index: u32,
    /// allow and require loading a static snapshot
    #[arg(long)]
    allow_static: bool,
    /// force a full copy instead of redirection
    #[arg(long)]
    copy_data: bool,
}

#[derive(Clone, Debug, Parser)]
struct MergeArgs {
    /// snapshot files to merge, in order
    #[arg(required = true, num_args = 2..)]
    inputs: Vec<PathBuf>,
    /// output snapshot file
    #[arg(short, long)]
    output: PathBuf,
    /// maximum size to allocate for the merged output
    #[arg(long, default_value_t = 1 << 20)]
    output_capacity: usize,
}

#[derive(Clone, Debug, Parser)]
struct LiteralsArgs {
    /// snapshot file to scan
    input: PathBuf,
    /// emit a C source fragment instead of the plain `<len> <chars>` form
    #[arg(long)]
    c_format: bool,
}

#[derive(Clone, Debug, Parser)]
struct HeaderArgs {
    /// snapshot file to inspect
    input: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match &args.operation {
        Operation::Exec(exec_args) => cmd_exec(exec_args.into()),
        Operation::Merge(merge_args) => cmd_merge(merge_args.into()),
        Operation::Literals(literals_args) => cmd_literals(literals_args.into()),
        Operation::Header(header_args) => cmd_header(header_args.into()),
    }
}

pub(crate) struct ExecRequest {
    pub input: PathBuf,
    pub index: u32,
    pub allow_static: bool,
    pub copy_data: bool,
}

impl From<&ExecArgs> for ExecRequest {
    fn from(a: &ExecArgs) -> Self {
        ExecRequest {
            input: a.input.clone(),
            index: a.index,
            allow_static: a.allow_static,
            copy_data: a.copy_data,
        }
    }
}

pub(crate) struct MergeRequest {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub output_capacity: usize,
}

impl From<&MergeArgs> for MergeRequest {
    fn from(a: &MergeArgs) -> Self {
        MergeRequest {
            inputs: a.inputs.clone(),
            output: a.output.clone(),
            output_capacity: a.output_capacity,
        }
    }
}

pub(crate) struct LiteralsRequest {
    pub input: PathBuf,
    pub c_format: bool,
}

impl From<&LiteralsArgs> for LiteralsRequest {
    fn from(a: &LiteralsArgs) -> Self {
        LiteralsRequest {
            input: a.input.clone(),
            c_format: a.c_format,
        }
    }
}

pub(crate) struct HeaderRequest {
    pub input: PathBuf,
}

impl From<&HeaderArgs> for HeaderRequest {
    fn from(a: &HeaderArgs) -> Self {
        HeaderRequest { input: a.input.clone() }
    }
}
