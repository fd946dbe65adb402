//! Scenario-level tests exercising whole save/load/merge/extract pipelines,
//! as opposed to the per-module unit tests living alongside each pass.

use rstest::rstest;

use crate::code::{ArgumentsHeader, CodeArena, ConstLiteral, DirectValue, FunctionCode, Node, RegExpCode, SerializableValues, SubFunctionSlot};
use crate::collab::AcceptAllRegexpCompiler;
use crate::error::{CommonError, Error, RangeError, TypeError};
use crate::flags::{FunctionType, StatusFlags};
use crate::literal::Literal;
use crate::load::{exec_snapshot, ExecFlags, ExecResult};
use crate::merge::{merge_snapshots, MergeInput};
use crate::save::{generate_snapshot, SaveMode, SaveOptions};

fn leaf(name: &str, literals: Vec<ConstLiteral>) -> FunctionCode {
    FunctionCode::new(
        StatusFlags::IS_FUNCTION.with_function_type(FunctionType::Normal),
        ArgumentsHeader {
            argument_end: 0,
            register_end: literals.len() as u32,
        },
        literals,
        vec![],
        vec![0x01, 0x02],
        SerializableValues {
            function_name: Some(ConstLiteral::Direct(DirectValue::DirectString(name.to_string()))),
            ..Default::default()
        },
    )
    .unwrap()
}

/// A second save of a freshly-loaded tree must produce byte-identical
/// output: nothing about the load path should perturb layout decisions the
/// original save already made.
#[test]
fn round_trip_is_byte_identical_after_reload() {
    let mut arena = CodeArena::new();
    let root = arena.push(Node::Function(leaf(
        "main",
        vec![ConstLiteral::Pooled(Literal::InternedString("hello".into()))],
    )));

    let mut first = vec![0u8; 512];
    let first_len = generate_snapshot(&arena, root, SaveOptions::default(), &mut first).unwrap();
    first.truncate(first_len);

    let ExecResult::Dynamic(outcome) =
        exec_snapshot(&first, 0, ExecFlags::empty(), None, false, &AcceptAllRegexpCompiler).unwrap()
    else {
        panic!("expected a dynamic load");
    };

    let mut second = vec![0u8; 512];
    let second_len = generate_snapshot(&outcome.arena, outcome.root, SaveOptions::default(), &mut second).unwrap();
    second.truncate(second_len);

    assert_eq!(first, second);
}

/// A parent with a nested sub-function: the child must be reachable from
/// the loaded parent's sub-function slots, in order.
#[test]
fn sub_function_is_reachable_after_round_trip() {
    let mut arena = CodeArena::new();
    let child = arena.push(Node::Function(leaf("child", vec![])));
    let mut parent = leaf("parent", vec![]);
    parent.sub_functions.push(SubFunctionSlot::Child(child));
    let root = arena.push(Node::Function(parent));

    let mut out = vec![0u8; 512];
    let used = generate_snapshot(&arena, root, SaveOptions::default(), &mut out).unwrap();

    let ExecResult::Dynamic(outcome) =
        exec_snapshot(&out[..used], 0, ExecFlags::empty(), None, false, &AcceptAllRegexpCompiler).unwrap()
    else {
        panic!("expected a dynamic load");
    };
    let Node::Function(loaded_parent) = outcome.arena.get(outcome.root) else {
        panic!("expected a function node");
    };
    let SubFunctionSlot::Child(child_id) = loaded_parent.sub_functions[0] else {
        panic!("expected a child sub-function slot");
    };
    let Node::Function(loaded_child) = outcome.arena.get(child_id) else {
        panic!("expected a function node");
    };
    assert_eq!(loaded_child.serializable.function_name, Some(ConstLiteral::Direct(DirectValue::DirectString("child".into()))));
}

/// A self-recursive function's sub-function slot must resolve back to the
/// same node it was declared on, not a duplicate copy.
#[test]
fn self_reference_round_trips_to_the_same_node() {
    let mut arena = CodeArena::new();
    let mut f = leaf("recur", vec![]);
    f.sub_functions.push(SubFunctionSlot::SelfReference);
    let root = arena.push(Node::Function(f));

    let mut out = vec![0u8; 512];
    let used = generate_snapshot(&arena, root, SaveOptions::default(), &mut out).unwrap();

    let ExecResult::Dynamic(outcome) =
        exec_snapshot(&out[..used], 0, ExecFlags::empty(), None, false, &AcceptAllRegexpCompiler).unwrap()
    else {
        panic!("expected a dynamic load");
    };
    let Node::Function(loaded) = outcome.arena.get(outcome.root) else {
        panic!("expected a function node");
    };
    assert_eq!(loaded.sub_functions[0], SubFunctionSlot::SelfReference);
}

/// A regexp node nested as a constant-literal-vector child must recompile
/// and materialize as its own node, distinct from the owning function.
#[test]
fn regexp_literal_child_is_materialized() {
    let mut arena = CodeArena::new();
    let regexp = arena.push(Node::RegExp(RegExpCode::new(b"a+b*".to_vec())));
    let root = arena.push(Node::Function(leaf("uses_regexp", vec![ConstLiteral::Regexp(regexp)])));

    let mut out = vec![0u8; 512];
    let used = generate_snapshot(&arena, root, SaveOptions::default(), &mut out).unwrap();

    let ExecResult::Dynamic(outcome) =
        exec_snapshot(&out[..used], 0, ExecFlags::empty(), None, false, &AcceptAllRegexpCompiler).unwrap()
    else {
        panic!("expected a dynamic load");
    };
    let Node::Function(loaded) = outcome.arena.get(outcome.root) else {
        panic!("expected a function node");
    };
    let ConstLiteral::Regexp(child_id) = loaded.literals[0] else {
        panic!("expected a regexp literal");
    };
    let Node::RegExp(loaded_regexp) = outcome.arena.get(child_id) else {
        panic!("expected a regexp node");
    };
    assert_eq!(loaded_regexp.pattern, b"a+b*");
}

/// Merging three independently-saved snapshots must expose every primary
/// function at its own index, and reject an index past the combined count.
#[test]
fn merge_exposes_every_input_at_its_own_index_and_rejects_overflow() {
    let mut saved = Vec::new();
    for (name, value) in [("a", 1), ("b", 2), ("c", 3)] {
        let mut arena = CodeArena::new();
        let root = arena.push(Node::Function(leaf(name, vec![ConstLiteral::Direct(DirectValue::SmallInt(value))])));
        let mut out = vec![0u8; 256];
        let used = generate_snapshot(&arena, root, SaveOptions::default(), &mut out).unwrap();
        out.truncate(used);
        saved.push(out);
    }

    let inputs: Vec<MergeInput> = saved.iter().map(|buf| MergeInput { buf }).collect();
    let mut merged = vec![0u8; 4096];
    let used = merge_snapshots(&inputs, &mut merged).unwrap();

    for (index, expected) in [(0, 1), (1, 2), (2, 3)] {
        let ExecResult::Dynamic(outcome) =
            exec_snapshot(&merged[..used], index, ExecFlags::empty(), None, false, &AcceptAllRegexpCompiler).unwrap()
        else {
            panic!("expected a dynamic load");
        };
        let Node::Function(f) = outcome.arena.get(outcome.root) else {
            panic!("expected a function node");
        };
        assert_eq!(f.literals[0], ConstLiteral::Direct(DirectValue::SmallInt(expected)));
    }

    let err = exec_snapshot(&merged[..used], 3, ExecFlags::empty(), None, false, &AcceptAllRegexpCompiler).unwrap_err();
    assert_eq!(err, Error::Type(TypeError::FunctionIndexOutOfRange));
}

/// Saving a static snapshot whose root carries a pooled (non-direct)
/// literal must fail with a message naming the offending value.
#[test]
fn static_save_rejects_pooled_literal_with_a_descriptive_message() {
    let mut arena = CodeArena::new();
    let f = leaf("f", vec![ConstLiteral::Pooled(Literal::InternedString("not-static-safe".into()))]);
    let root = arena.push(Node::Function(f));

    let mut out = vec![0u8; 256];
    let err = generate_snapshot(&arena, root, SaveOptions { mode: SaveMode::Static }, &mut out).unwrap_err();
    let Error::Range(RangeError::UnsupportedStaticLiteral(message)) = err else {
        panic!("expected an unsupported-static-literal error, got {err:?}");
    };
    assert_eq!(message, "not-static-safe");
}

/// A static snapshot can only be executed with `ALLOW_STATIC` set, and even
/// then refuses `COPY_DATA` (spec: static nodes are always used in place).
#[test]
fn static_snapshot_requires_allow_static_and_refuses_copy() {
    let mut arena = CodeArena::new();
    let root = arena.push(Node::Function(leaf("f", vec![])));
    let mut out = vec![0u8; 256];
    let used = generate_snapshot(&arena, root, SaveOptions { mode: SaveMode::Static }, &mut out).unwrap();

    let err = exec_snapshot(&out[..used], 0, ExecFlags::empty(), None, false, &AcceptAllRegexpCompiler).unwrap_err();
    assert_eq!(err, Error::Common(CommonError::StaticSnapshotsNotEnabled));

    let ExecResult::Static(f) =
        exec_snapshot(&out[..used], 0, ExecFlags::ALLOW_STATIC, None, false, &AcceptAllRegexpCompiler).unwrap()
    else {
        panic!("expected a static load");
    };
    assert_eq!(f.opcodes, vec![0x01, 0x02]);
}

/// Only a `Normal` root is a legal snapshot root (C3/C4's shared
/// precondition); every other function type is only ever reachable as a
/// nested sub-function, so that is how each is exercised here.
#[rstest]
#[case(FunctionType::Arrow)]
#[case(FunctionType::AsyncNormal)]
#[case(FunctionType::AsyncArrow)]
#[case(FunctionType::AsyncGenerator)]
#[case(FunctionType::Generator)]
#[case(FunctionType::Accessor)]
fn every_non_constructor_function_type_round_trips_a_function_name(#[case] function_type: FunctionType) {
    let mut arena = CodeArena::new();
    let child = FunctionCode::new(
        StatusFlags::IS_FUNCTION.with_function_type(function_type),
        ArgumentsHeader {
            argument_end: 0,
            register_end: 0,
        },
        vec![],
        vec![],
        vec![0x00],
        SerializableValues {
            function_name: Some(ConstLiteral::Direct(DirectValue::DirectString("f".into()))),
            ..Default::default()
        },
    )
    .unwrap();
    let child_id = arena.push(Node::Function(child));
    let mut parent = leaf("parent", vec![]);
    parent.sub_functions.push(SubFunctionSlot::Child(child_id));
    let root = arena.push(Node::Function(parent));

    let mut out = vec![0u8; 256];
    let used = generate_snapshot(&arena, root, SaveOptions::default(), &mut out).unwrap();
    let ExecResult::Dynamic(outcome) =
        exec_snapshot(&out[..used], 0, ExecFlags::empty(), None, false, &AcceptAllRegexpCompiler).unwrap()
    else {
        panic!("expected a dynamic load");
    };
    let Node::Function(loaded_parent) = outcome.arena.get(outcome.root) else {
        panic!("expected a function node");
    };
    let SubFunctionSlot::Child(loaded_child_id) = loaded_parent.sub_functions[0] else {
        panic!("expected a child sub-function slot");
    };
    let Node::Function(loaded) = outcome.arena.get(loaded_child_id) else {
        panic!("expected a function node");
    };
    assert_eq!(loaded.status_flags.function_type(), function_type);
    assert!(loaded.serializable.function_name.is_some());
}

/// A constructor function carries no `function_name` slot at all, and
/// setting its class flag must be observable on the merged global flags —
/// exercised as a sub-function, since a `Constructor` is never a legal root.
#[test]
fn constructor_sets_class_literal_global_flag() {
    let mut arena = CodeArena::new();
    let child = FunctionCode::new(
        StatusFlags::IS_FUNCTION.with_function_type(FunctionType::Constructor),
        ArgumentsHeader {
            argument_end: 0,
            register_end: 0,
        },
        vec![],
        vec![],
        vec![0x00],
        SerializableValues::default(),
    )
    .unwrap();
    let child_id = arena.push(Node::Function(child));
    let mut parent = leaf("parent", vec![]);
    parent.sub_functions.push(SubFunctionSlot::Child(child_id));
    let root = arena.push(Node::Function(parent));

    let mut out = vec![0u8; 256];
    let used = generate_snapshot(&arena, root, SaveOptions::default(), &mut out).unwrap();
    let header = crate::header::SnapshotHeader::read_from(&out[..used]).unwrap();
    assert!(header.global_flags.contains(crate::header::GlobalFlags::HAS_CLASS_LITERAL));
}
