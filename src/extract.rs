//! Literal extractor (C8), spec §4.6: dump every non-magic string literal
//! referenced by a snapshot, heapsorted short-first/lexicographic, as plain
//! text or a C source fragment.

use crate::error::Error;
use crate::header::SnapshotHeader;
use crate::literal::{Literal, LiteralPool};
use crate::rewrite;

/// `get_literals_from_snapshot` (spec §6). Returns the rendered bytes, or
/// `None` if the buffer is not a valid snapshot — the spec's "silently 0"
/// convention, translated to `Option` since this crate has no fixed output
/// buffer to overflow.
pub fn get_literals_from_snapshot(buf: &[u8], c_format: bool) -> Option<Vec<u8>> {
    let strings = collect_identifier_strings(buf).ok()?;
    let mut sorted = strings;
    heapsort_by_length_then_lex(&mut sorted);
    Some(if c_format {
        render_c_form(&sorted)
    } else {
        render_plain_form(&sorted)
    })
}

fn collect_identifier_strings(buf: &[u8]) -> Result<Vec<String>, Error> {
    let header = SnapshotHeader::read_from(buf)?;
    let code_start = header.func_offsets[0].target_offset() as usize;
    let code = &buf[code_start..header.lit_table_offset as usize];
    let table = &buf[header.lit_table_offset as usize..];

    let mut pool = LiteralPool::new();
    rewrite::collect_literals(code, table, &mut pool)?;

    Ok(pool
        .iter()
        .filter_map(|literal| match literal {
            Literal::InternedString(s) => Some(s.clone()),
            _ => None,
        })
        .collect())
}

/// Heapsort (spec §4.6): key is `(byte-length ascending, lexicographic
/// ascending within equal lengths)`; stability is not required.
fn heapsort_by_length_then_lex(items: &mut [String]) {
    let len = items.len();
    for start in (0..len / 2).rev() {
        down_heap(items, start, len);
    }
    for end in (1..len).rev() {
        items.swap(0, end);
        down_heap(items, 0, end);
    }
}

fn key_less(a: &str, b: &str) -> bool {
    (a.len(), a) < (b.len(), b)
}

fn down_heap(items: &mut [String], mut root: usize, heap_len: usize) {
    loop {
        let mut largest = root;
        for child in [2 * root + 1, 2 * root + 2] {
            if child < heap_len && key_less(&items[largest], &items[child]) {
                largest = child;
            }
        }
        if largest == root {
            break;
        }
        items.swap(root, largest);
        root = largest;
    }
}

fn render_plain_form(strings: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for s in strings {
        out.extend_from_slice(format!("{} ", s.len()).as_bytes());
        out.extend_from_slice(s.as_bytes());
        out.push(b'\n');
    }
    out
}

fn render_c_form(strings: &[String]) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!("jerry_length_t literal_count = {};\n", strings.len()));
    out.push_str("jerry_char_t *literals[");
    out.push_str(&strings.len().to_string());
    out.push_str("] = {\n");
    for s in strings {
        out.push_str("  \"");
        out.push_str(&escape_c_string(s));
        out.push_str("\",\n");
    }
    out.push_str("};\n");
    out.push_str("jerry_length_t literal_sizes[");
    out.push_str(&strings.len().to_string());
    out.push_str("] = {\n");
    for s in strings {
        out.push_str(&format!("  {} /* {} */,\n", s.len(), s));
    }
    out.push_str("};\n");
    out.into_bytes()
}

/// `\x<HEX><HEX>` for any byte `< 32` or `> 127`, `\\`/`\"` for backslash
/// and double-quote, the byte itself otherwise (spec §4.6 "C form").
fn escape_c_string(s: &str) -> String {
    let mut out = String::new();
    for byte in s.as_bytes() {
        match *byte {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b if b < 32 || b > 127 => out.push_str(&format!("\\x{:02X}", b)),
            b => out.push(b as char),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heapsort_orders_short_first_then_lexicographic() {
        let mut items = vec!["bbb".to_string(), "a".to_string(), "zz".to_string(), "aa".to_string()];
        heapsort_by_length_then_lex(&mut items);
        assert_eq!(items, vec!["a", "aa", "zz", "bbb"]);
    }

    #[test]
    fn escapes_non_ascii_and_control_bytes() {
        // UTF-8 for 'β' is 0xCE 0xB2, each byte > 127.
        assert_eq!(escape_c_string("\u{03B2}"), "\\xCE\\xB2");
        assert_eq!(escape_c_string("a\"b\\c"), "a\\\"b\\\\c");
    }

    #[test]
    fn extracts_and_renders_identifier_from_a_real_snapshot() {
        use crate::code::{ArgumentsHeader, CodeArena, ConstLiteral, DirectValue, FunctionCode, Node, SerializableValues};
        use crate::flags::{FunctionType, StatusFlags};
        use crate::literal::Literal;
        use crate::save::{generate_snapshot, SaveOptions};

        let mut arena = CodeArena::new();
        let f = FunctionCode::new(
            StatusFlags::IS_FUNCTION.with_function_type(FunctionType::Normal),
            ArgumentsHeader {
                argument_end: 0,
                register_end: 0,
            },
            vec![ConstLiteral::Pooled(Literal::InternedString("alpha".into()))],
            vec![],
            vec![0x01],
            SerializableValues {
                function_name: Some(ConstLiteral::Direct(DirectValue::DirectString("f".into()))),
                ..Default::default()
            },
        )
        .unwrap();
        let root = arena.push(Node::Function(f));
        let mut out = vec![0u8; 512];
        let used = generate_snapshot(&arena, root, SaveOptions::default(), &mut out).unwrap();

        let dumped = get_literals_from_snapshot(&out[..used], true).unwrap();
        let text = String::from_utf8(dumped).unwrap();
        assert!(text.contains("\"alpha\""));
    }
}
