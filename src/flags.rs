//! Per-node status flags (spec §3, compiled-code node `status_flags`).

use num_enum::{IntoPrimitive, TryFromPrimitive};

bitflags::bitflags! {
    /// Bit-set carried by every compiled-code node. `FUNCTION_TYPE` is not a
    /// single bit but a 3-bit sub-field; it is read/written through
    /// [`StatusFlags::function_type`]/[`StatusFlags::set_function_type`]
    /// rather than as a flag of this set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u16 {
        /// Function node (vs. regexp node).
        const IS_FUNCTION = 1 << 0;
        /// Selects the wide (`u16`-counted) arguments header.
        const UINT16_ARGS = 1 << 1;
        const HAS_TAGGED_LITERALS = 1 << 2;
        const HAS_LINE_INFO = 1 << 3;
        const MAPPED_ARGUMENTS_NEEDED = 1 << 4;
        const LEXICAL_BLOCK_NEEDED = 1 << 5;
        const STATIC_FUNCTION = 1 << 6;
        const DEBUGGER_IGNORE = 1 << 7;
        // Bits 8..11 hold FUNCTION_TYPE; kept out of named flags so the
        // mask below is the only place that needs to agree with it.
    }
}

const FUNCTION_TYPE_SHIFT: u16 = 8;
const FUNCTION_TYPE_MASK: u16 = 0b111 << FUNCTION_TYPE_SHIFT;

impl StatusFlags {
    pub fn function_type(self) -> FunctionType {
        let raw = (self.bits() & FUNCTION_TYPE_MASK) >> FUNCTION_TYPE_SHIFT;
        FunctionType::try_from_primitive(raw as u8).unwrap_or(FunctionType::Normal)
    }

    pub fn with_function_type(self, ty: FunctionType) -> Self {
        let cleared = self.bits() & !FUNCTION_TYPE_MASK;
        let raw: u8 = ty.into();
        Self::from_bits_retain(cleared | ((raw as u16) << FUNCTION_TYPE_SHIFT))
    }
}

/// `FUNCTION_TYPE` sub-field (spec §3): "normal / constructor / …".
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionType {
    Normal = 0,
    Constructor = 1,
    Arrow = 2,
    AsyncNormal = 3,
    AsyncArrow = 4,
    AsyncGenerator = 5,
    Generator = 6,
    Accessor = 7,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_type_round_trips_through_status_flags() {
        let flags = StatusFlags::IS_FUNCTION.with_function_type(FunctionType::Constructor);
        assert_eq!(flags.function_type(), FunctionType::Constructor);
        assert!(flags.contains(StatusFlags::IS_FUNCTION));

        let flags = flags.with_function_type(FunctionType::Arrow) | StatusFlags::DEBUGGER_IGNORE;
        assert_eq!(flags.function_type(), FunctionType::Arrow);
        assert!(flags.contains(StatusFlags::DEBUGGER_IGNORE));
        assert!(flags.contains(StatusFlags::IS_FUNCTION));
    }
}
