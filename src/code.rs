//! Compiled-code graph (spec §3 "Compiled-code node"): the in-memory arena
//! the save/load/merge/extract passes all walk.
//!
//! The host-side graph never stores raw pointers or byte offsets — those
//! only exist in the *serialized* form a node is converted to/from during a
//! save or load walk. Here, a sub-function reference is just a [`NodeId`]
//! into the owning [`CodeArena`].

use crate::error::{Error, RangeError};
use crate::flags::{FunctionType, StatusFlags};
use crate::literal::Literal;

/// Index into a [`CodeArena`]. Stable for the lifetime of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// A value small enough to live inline in a constant-literal slot without
/// going through the literal pool: an immediate, or a short string (mirrors
/// `ecma_is_value_direct`/`ecma_is_value_direct_string` — real engines pack
/// these directly into a tagged machine word).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DirectValue {
    Undefined,
    Null,
    True,
    False,
    SmallInt(i32),
    /// A short string, inline by value. Capped at 6 bytes so it fits the
    /// fixed-width wire slot alongside its tag (see `wire::CONST_SLOT_SIZE`).
    DirectString(String),
}

impl DirectValue {
    pub const MAX_DIRECT_STRING_LEN: usize = 6;
}

/// A value that may sit in a constant-literal slot: inline, a reference
/// into the literal pool, or a nested regexp node (spec §3 invariant 5: "a
/// regexp node can appear as a constant-literal-vector child of a function
/// node").
#[derive(Debug, Clone, PartialEq)]
pub enum ConstLiteral {
    Direct(DirectValue),
    Pooled(Literal),
    Regexp(NodeId),
}

impl ConstLiteral {
    /// True for exactly the forms the static-snapshot variant (C4) allows:
    /// a direct immediate or a direct string (spec §4.2).
    pub fn is_static_safe(&self) -> bool {
        matches!(self, ConstLiteral::Direct(_))
    }

    /// Render a value unsuitable for a static snapshot the way the original
    /// composes its error message: the literal's string coercion.
    pub fn describe_for_error(&self) -> String {
        match self {
            ConstLiteral::Direct(d) => format!("{d:?}"),
            ConstLiteral::Regexp(_) => "/regexp/".to_string(),
            ConstLiteral::Pooled(Literal::InternedString(s)) => s.clone(),
            ConstLiteral::Pooled(Literal::Number(bits)) => format!("{}", f64::from_bits(*bits)),
            ConstLiteral::Pooled(Literal::BigInt { negative, magnitude }) => {
                format!("{}0x{}", if *negative { "-" } else { "" }, hex(magnitude))
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A reference from one function's literal vector to a nested function: a
/// child node, or the "self" sentinel a recursive/self-referencing function
/// uses (spec §3 edge case "self-reference").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubFunctionSlot {
    SelfReference,
    Child(NodeId),
}

/// `argument_end`/`register_end` pair (spec §3). Kept as two independent
/// counts, matching the original layout, rather than derived from the
/// literal vectors: `register_end` marks where the constant-literal region
/// of the literal vector begins, a boundary with no other representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentsHeader {
    pub argument_end: u32,
    pub register_end: u32,
}

/// One function's compiled code (spec §3). Bytecode payload (`opcodes`) is
/// opaque to this crate: snapshotting only needs to relocate what
/// references other nodes or literals, never to interpret an opcode.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCode {
    pub status_flags: StatusFlags,
    pub header: ArgumentsHeader,
    /// Constant-literal slots (`register_end..const_literal_end`).
    pub literals: Vec<ConstLiteral>,
    /// Sub-function slots (`const_literal_end..literal_end`).
    pub sub_functions: Vec<SubFunctionSlot>,
    pub opcodes: Vec<u8>,
    pub serializable: SerializableValues,
}

/// The "serializable values area" (spec §3): optional trailing values whose
/// presence is implied entirely by flags, never stored as an explicit count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerializableValues {
    /// Present iff `StatusFlags::MAPPED_ARGUMENTS_NEEDED`; one entry per
    /// formal argument (`argument_end` long).
    pub mapped_argument_names: Option<Vec<ConstLiteral>>,
    /// Present for every function type except `Constructor` (mirrors the
    /// original's extra-bytes accounting in `snapshot_load_compiled_code`).
    pub function_name: Option<ConstLiteral>,
    /// Present iff `StatusFlags::HAS_TAGGED_LITERALS`. The save walk (C3)
    /// always rejects this flag (spec §3 Non-goals), so in practice this is
    /// only ever populated by a hand-built in-memory graph, never by load.
    pub tagged_template: Option<ConstLiteral>,
    /// Present iff the crate is built with the `source-name` feature — not
    /// gated by any `StatusFlags` bit, unlike the other three slots, since
    /// the original appends it unconditionally under a compile-time toggle.
    pub source_name: Option<ConstLiteral>,
}

impl FunctionCode {
    /// Build a node, checking the structural invariants spec §3 lists for a
    /// compiled-code node (consistent slot counts, flag/value agreement).
    pub fn new(
        status_flags: StatusFlags,
        header: ArgumentsHeader,
        literals: Vec<ConstLiteral>,
        sub_functions: Vec<SubFunctionSlot>,
        opcodes: Vec<u8>,
        serializable: SerializableValues,
    ) -> Result<Self, Error> {
        if !status_flags.contains(StatusFlags::IS_FUNCTION) {
            return Err(RangeError::UnsupportedCompiledCode.into());
        }
        if header.register_end < header.argument_end {
            return Err(RangeError::UnsupportedCompiledCode.into());
        }
        let wants_mapped_args = status_flags.contains(StatusFlags::MAPPED_ARGUMENTS_NEEDED);
        let has_mapped_args = serializable.mapped_argument_names.is_some();
        if wants_mapped_args != has_mapped_args {
            return Err(RangeError::UnsupportedCompiledCode.into());
        }
        if let Some(names) = &serializable.mapped_argument_names {
            if names.len() as u32 != header.argument_end {
                return Err(RangeError::UnsupportedCompiledCode.into());
            }
        }
        let wants_function_name = status_flags.function_type() != FunctionType::Constructor;
        if wants_function_name != serializable.function_name.is_some() {
            return Err(RangeError::UnsupportedCompiledCode.into());
        }
        let wants_tagged_template = status_flags.contains(StatusFlags::HAS_TAGGED_LITERALS);
        if wants_tagged_template != serializable.tagged_template.is_some() {
            return Err(RangeError::UnsupportedCompiledCode.into());
        }
        if cfg!(feature = "source-name") != serializable.source_name.is_some() {
            return Err(RangeError::UnsupportedCompiledCode.into());
        }

        Ok(FunctionCode {
            status_flags,
            header,
            literals,
            sub_functions,
            opcodes,
            serializable,
        })
    }

    /// `const_literal_end` (spec §3), derived rather than stored: it is
    /// always exactly `register_end + literals.len()`.
    pub fn const_literal_end(&self) -> u32 {
        self.header.register_end + self.literals.len() as u32
    }

    /// `literal_end` (spec §3): `const_literal_end + sub_functions.len()`.
    pub fn literal_end(&self) -> u32 {
        self.const_literal_end() + self.sub_functions.len() as u32
    }
}

/// A regexp node (spec §3): a compiled pattern, never itself a function and
/// never recursed into by save/load/merge beyond copying its bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RegExpCode {
    pub pattern: Vec<u8>,
    pub status_flags: StatusFlags,
}

impl RegExpCode {
    pub fn new(pattern: Vec<u8>) -> Self {
        RegExpCode {
            pattern,
            status_flags: StatusFlags::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Function(FunctionCode),
    RegExp(RegExpCode),
}

impl Node {
    pub fn status_flags(&self) -> StatusFlags {
        match self {
            Node::Function(f) => f.status_flags,
            Node::RegExp(r) => r.status_flags,
        }
    }
}

/// Owns every compiled-code node reachable from a set of primary functions.
/// The safe, allocation-based stand-in for the original's graph of
/// compressed pointers (spec §9 design notes): nodes never move once
/// pushed, so a [`NodeId`] stays valid for the arena's whole lifetime.
#[derive(Debug, Clone, Default)]
pub struct CodeArena {
    nodes: Vec<Node>,
}

impl CodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }
}
