//! Literal pool (spec §3 "Literal pool (C2)"): the collection of literals a
//! compiled-code graph references, and the two-phase collect/emit pass that
//! turns them into a packed snapshot literal table.

use std::collections::HashMap;

use crate::error::{CommonError, Error};

/// A literal owned by the pool: something that must be deduplicated and
/// emitted into the snapshot's literal table, as opposed to a [`DirectValue`]
/// that lives inline.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    InternedString(String),
    /// IEEE-754 bit pattern, so the value can be hashed/deduplicated exactly.
    Number(u64),
    BigInt { negative: bool, magnitude: Vec<u8> },
}

impl Literal {
    pub fn number(value: f64) -> Self {
        Literal::Number(value.to_bits())
    }

    pub fn number_value(&self) -> Option<f64> {
        match self {
            Literal::Number(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }
}

impl Eq for Literal {}

impl std::hash::Hash for Literal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Literal::InternedString(s) => s.hash(state),
            Literal::Number(bits) => bits.hash(state),
            Literal::BigInt { negative, magnitude } => {
                negative.hash(state);
                magnitude.hash(state);
            }
        }
    }
}

/// Collection of literals referenced by one save or one merge. Scoped to a
/// single operation: the caller drops it on every exit path (spec §3
/// "Ownership").
#[derive(Debug, Default)]
pub struct LiteralPool {
    items: Vec<Literal>,
    index: HashMap<Literal, u32>,
}

impl LiteralPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `literal` unless an equal value is already present; returns
    /// its id either way.
    pub fn append_value_if_absent(&mut self, literal: Literal) -> u32 {
        if let Some(id) = self.index.get(&literal) {
            return *id;
        }
        let id = self.items.len() as u32;
        self.index.insert(literal.clone(), id);
        self.items.push(literal);
        id
    }

    pub fn id_of(&self, literal: &Literal) -> Option<u32> {
        self.index.get(literal).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: u32) -> &Literal {
        &self.items[id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Literal> {
        self.items.iter()
    }

    /// Produce the packed literal table plus an id→offset map ("emit for
    /// snapshot", spec §4.1 step 4). Offsets are relative to the start of
    /// the returned byte buffer (i.e. relative to `lit_table_offset`).
    pub fn emit_for_snapshot(&self) -> Result<EmittedLiteralTable, Error> {
        let mut bytes = Vec::new();
        let mut offsets = Vec::with_capacity(self.items.len());

        for literal in &self.items {
            offsets.push(bytes.len() as u32);
            match literal {
                Literal::InternedString(s) => {
                    bytes.push(TAG_STRING);
                    let raw = s.as_bytes();
                    bytes.extend_from_slice(&(raw.len() as u32).to_ne_bytes());
                    bytes.extend_from_slice(raw);
                }
                Literal::Number(bits) => {
                    bytes.push(TAG_NUMBER);
                    bytes.extend_from_slice(&bits.to_ne_bytes());
                }
                Literal::BigInt { negative, magnitude } => {
                    bytes.push(TAG_BIGINT);
                    bytes.push(u8::from(*negative));
                    bytes.extend_from_slice(&(magnitude.len() as u32).to_ne_bytes());
                    bytes.extend_from_slice(magnitude);
                }
            }
        }

        Ok(EmittedLiteralTable { bytes, offsets })
    }

    /// Inverse lookup (spec C2 `resolve-literal-at-offset`): parse the
    /// literal stored at `offset` inside an already-emitted table.
    pub fn resolve_literal_at_offset(table: &[u8], offset: u32) -> Result<Literal, Error> {
        let offset = offset as usize;
        let tag = *table
            .get(offset)
            .ok_or(CommonError::CannotAllocateMemoryForLiterals)?;
        match tag {
            TAG_STRING => {
                let len_bytes = table
                    .get(offset + 1..offset + 5)
                    .ok_or(CommonError::CannotAllocateMemoryForLiterals)?;
                let len = u32::from_ne_bytes(len_bytes.try_into().unwrap()) as usize;
                let bytes = table
                    .get(offset + 5..offset + 5 + len)
                    .ok_or(CommonError::CannotAllocateMemoryForLiterals)?;
                let s = String::from_utf8(bytes.to_vec())
                    .map_err(|_| Error::Common(CommonError::CannotAllocateMemoryForLiterals))?;
                Ok(Literal::InternedString(s))
            }
            TAG_NUMBER => {
                let bits_bytes = table
                    .get(offset + 1..offset + 9)
                    .ok_or(CommonError::CannotAllocateMemoryForLiterals)?;
                Ok(Literal::Number(u64::from_ne_bytes(bits_bytes.try_into().unwrap())))
            }
            TAG_BIGINT => {
                let negative = *table
                    .get(offset + 1)
                    .ok_or(CommonError::CannotAllocateMemoryForLiterals)?
                    != 0;
                let len_bytes = table
                    .get(offset + 2..offset + 6)
                    .ok_or(CommonError::CannotAllocateMemoryForLiterals)?;
                let len = u32::from_ne_bytes(len_bytes.try_into().unwrap()) as usize;
                let magnitude = table
                    .get(offset + 6..offset + 6 + len)
                    .ok_or(CommonError::CannotAllocateMemoryForLiterals)?
                    .to_vec();
                Ok(Literal::BigInt { negative, magnitude })
            }
            _ => Err(CommonError::CannotAllocateMemoryForLiterals.into()),
        }
    }
}

const TAG_STRING: u8 = 0;
const TAG_NUMBER: u8 = 1;
const TAG_BIGINT: u8 = 2;

/// The packed literal table produced by [`LiteralPool::emit_for_snapshot`].
pub struct EmittedLiteralTable {
    pub bytes: Vec<u8>,
    offsets: Vec<u32>,
}

impl EmittedLiteralTable {
    pub fn offset_for_id(&self, id: u32) -> u32 {
        self.offsets[id as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_on_append() {
        let mut pool = LiteralPool::new();
        let a = pool.append_value_if_absent(Literal::InternedString("hi".into()));
        let b = pool.append_value_if_absent(Literal::InternedString("hi".into()));
        let c = pool.append_value_if_absent(Literal::InternedString("bye".into()));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn emit_and_resolve_round_trips() {
        let mut pool = LiteralPool::new();
        let id_str = pool.append_value_if_absent(Literal::InternedString("alpha".into()));
        let id_num = pool.append_value_if_absent(Literal::number(42.5));
        let id_big = pool.append_value_if_absent(Literal::BigInt {
            negative: true,
            magnitude: vec![1, 2, 3],
        });

        let table = pool.emit_for_snapshot().unwrap();

        let resolved_str =
            LiteralPool::resolve_literal_at_offset(&table.bytes, table.offset_for_id(id_str)).unwrap();
        assert_eq!(resolved_str, Literal::InternedString("alpha".into()));

        let resolved_num =
            LiteralPool::resolve_literal_at_offset(&table.bytes, table.offset_for_id(id_num)).unwrap();
        assert_eq!(resolved_num.number_value(), Some(42.5));

        let resolved_big =
            LiteralPool::resolve_literal_at_offset(&table.bytes, table.offset_for_id(id_big)).unwrap();
        assert_eq!(
            resolved_big,
            Literal::BigInt {
                negative: true,
                magnitude: vec![1, 2, 3]
            }
        );
    }
}
