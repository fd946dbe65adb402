//! Snapshot subsystem for a small-footprint ECMAScript engine: save, load
//! and merge position-independent byte-code images (see SPEC_FULL.md).
//!
//! The compiled-code graph ([`code`]) and literal pool ([`literal`]) are
//! the shared data model; [`save`], [`load`], [`merge`] and [`extract`]
//! are the four public operations built on top of it. [`wire`] and
//! [`rewrite`] hold the on-disk byte layout and the passes that walk it;
//! application code should not need to reach into either directly.

pub mod code;
pub mod collab;
pub mod error;
pub mod extract;
pub mod flags;
pub mod header;
pub mod literal;
pub mod load;
pub mod merge;
pub mod rewrite;
pub mod save;
pub mod wire;

#[cfg(test)]
mod test;

pub use code::{ArgumentsHeader, CodeArena, ConstLiteral, DirectValue, FunctionCode, Node, NodeId, RegExpCode, SerializableValues, SubFunctionSlot};
pub use collab::{AcceptAllRegexpCompiler, CompiledRegexp, MagicString, RegexpCompiler, Script};
pub use error::{CommonError, Error, RangeError, Result, TypeError};
pub use extract::get_literals_from_snapshot;
pub use flags::{FunctionType, StatusFlags};
pub use header::{GlobalFlags, SnapshotHeader};
pub use literal::{Literal, LiteralPool};
pub use load::{exec_snapshot, ExecFlags, ExecOutcome, ExecResult, LoadOutcome, LoadStrategy, StaticFunction};
pub use merge::{merge_snapshots, MergeInput};
pub use save::{generate_snapshot, SaveMode, SaveOptions};
