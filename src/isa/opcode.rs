//! Opcodes and flag encodings for the TCU instruction set
//!
//! Six opcodes in a 4-bit field, each with a 4-bit flag nibble:
//!
//! | Opcode        | Flags                                    |
//! |---------------|------------------------------------------|
//! | `NOOP`        | -                                        |
//! | `WAIT`        | -                                        |
//! | `MATMUL`      | bit0 ACCUMULATE, bit1 ZEROES             |
//! | `DATA_MOVE`   | flag nibble is the transfer kind         |
//! | `LOAD_WEIGHTS`| bit0 ZEROES                              |
//! | `SIMD`        | bit0 READ, bit1 WRITE, bit2 ACCUMULATE   |

use crate::error::{CompilerError, Result};
use crate::isa::MemoryTag;
use std::fmt;

/// Operation opcode (4 bits on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(pub u8);

impl Opcode {
    /// Pad instruction; costs one cycle
    pub const NOOP: Self = Self(0x0);
    /// Block until the peer thread's cycle counter catches up
    pub const WAIT: Self = Self(0x1);
    /// Systolic matrix multiply from local into the accumulators
    pub const MATMUL: Self = Self(0x2);
    /// Transfer vectors between local and DRAM/accumulator
    pub const DATA_MOVE: Self = Self(0x3);
    /// Stream weight vectors from local into the array
    pub const LOAD_WEIGHTS: Self = Self(0x4);
    /// SIMD ALU operation over accumulator rows
    pub const SIMD: Self = Self(0x5);

    /// Disassembly mnemonic
    pub const fn mnemonic(&self) -> &'static str {
        match self.0 {
            0x0 => "NOOP",
            0x1 => "WAIT",
            0x2 => "MATMUL",
            0x3 => "DATAMOVE",
            0x4 => "LOADWEIGHTS",
            0x5 => "SIMD",
            _ => "?",
        }
    }

    pub const fn is_valid(&self) -> bool {
        self.0 <= Self::SIMD.0
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// `MATMUL` flag bits
pub mod matmul_flags {
    /// Add into the accumulators instead of overwriting
    pub const ACCUMULATE: u8 = 0b0001;
    /// Feed zero vectors instead of reading local
    pub const ZEROES: u8 = 0b0010;
}

/// `LOAD_WEIGHTS` flag bits
pub mod load_weights_flags {
    /// Load zero weights instead of reading local
    pub const ZEROES: u8 = 0b0001;
}

/// `SIMD` flag bits
pub mod simd_flags {
    /// Read the right operand from the accumulator
    pub const READ: u8 = 0b0001;
    /// Write the result to the accumulator
    pub const WRITE: u8 = 0b0010;
    /// Accumulate into the destination row
    pub const ACCUMULATE: u8 = 0b0100;
}

/// `DATA_MOVE` transfer kind, stored directly in the flag nibble.
///
/// The kind fixes the direction, the far memory tag, and whether the
/// transfer accumulates, so the parser can reconstruct the emitted
/// `(to_local, accumulate, tag)` triple losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataMoveKind {
    Dram0ToLocal = 0x0,
    LocalToDram0 = 0x1,
    Dram1ToLocal = 0x2,
    LocalToDram1 = 0x3,
    LocalToAcc = 0x4,
    LocalToAccAccumulate = 0x5,
    AccToLocal = 0x6,
}

impl DataMoveKind {
    /// Derive the kind from sink arguments.
    pub fn from_parts(to_local: bool, accumulate: bool, tag: MemoryTag) -> Result<Self> {
        match (to_local, accumulate, tag) {
            (true, false, MemoryTag::Dram0) => Ok(Self::Dram0ToLocal),
            (false, false, MemoryTag::Dram0) => Ok(Self::LocalToDram0),
            (true, false, MemoryTag::Dram1) => Ok(Self::Dram1ToLocal),
            (false, false, MemoryTag::Dram1) => Ok(Self::LocalToDram1),
            (false, false, MemoryTag::Accumulator) => Ok(Self::LocalToAcc),
            (false, true, MemoryTag::Accumulator) => Ok(Self::LocalToAccAccumulate),
            (true, false, MemoryTag::Accumulator) => Ok(Self::AccToLocal),
            _ => Err(CompilerError::Encoding(format!(
                "illegal data move: to_local={}, accumulate={}, tag={:?}",
                to_local, accumulate, tag
            ))),
        }
    }

    pub fn from_flags(flags: u8) -> Result<Self> {
        match flags {
            0x0 => Ok(Self::Dram0ToLocal),
            0x1 => Ok(Self::LocalToDram0),
            0x2 => Ok(Self::Dram1ToLocal),
            0x3 => Ok(Self::LocalToDram1),
            0x4 => Ok(Self::LocalToAcc),
            0x5 => Ok(Self::LocalToAccAccumulate),
            0x6 => Ok(Self::AccToLocal),
            other => Err(CompilerError::Encoding(format!(
                "unknown data move kind: {:#x}",
                other
            ))),
        }
    }

    pub const fn flags(&self) -> u8 {
        *self as u8
    }

    pub const fn to_local(&self) -> bool {
        matches!(self, Self::Dram0ToLocal | Self::Dram1ToLocal | Self::AccToLocal)
    }

    pub const fn accumulate(&self) -> bool {
        matches!(self, Self::LocalToAccAccumulate)
    }

    /// Memory tag of the far (non-local) operand
    pub const fn tag(&self) -> MemoryTag {
        match self {
            Self::Dram0ToLocal | Self::LocalToDram0 => MemoryTag::Dram0,
            Self::Dram1ToLocal | Self::LocalToDram1 => MemoryTag::Dram1,
            Self::LocalToAcc | Self::LocalToAccAccumulate | Self::AccToLocal => {
                MemoryTag::Accumulator
            }
        }
    }

    pub const fn is_dram(&self) -> bool {
        matches!(
            self,
            Self::Dram0ToLocal | Self::LocalToDram0 | Self::Dram1ToLocal | Self::LocalToDram1
        )
    }

    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::Dram0ToLocal => "D0>L",
            Self::LocalToDram0 => "L>D0",
            Self::Dram1ToLocal => "D1>L",
            Self::LocalToDram1 => "L>D1",
            Self::LocalToAcc => "L>A",
            Self::LocalToAccAccumulate => "L>A+",
            Self::AccToLocal => "A>L",
        }
    }
}

/// SIMD ALU sub-operation (4 bits inside operand 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimdOp(pub u8);

impl SimdOp {
    pub const ZERO: Self = Self(0x0);
    pub const MOVE: Self = Self(0x1);
    pub const NOT: Self = Self(0x2);
    pub const AND: Self = Self(0x3);
    pub const OR: Self = Self(0x4);
    pub const INCREMENT: Self = Self(0x5);
    pub const DECREMENT: Self = Self(0x6);
    pub const ADD: Self = Self(0x7);
    pub const SUBTRACT: Self = Self(0x8);
    pub const MULTIPLY: Self = Self(0x9);
    pub const ABS: Self = Self(0xA);
    pub const GREATER: Self = Self(0xB);
    pub const GREATER_EQUAL: Self = Self(0xC);
    pub const MIN: Self = Self(0xD);
    pub const MAX: Self = Self(0xE);

    pub const fn is_valid(&self) -> bool {
        self.0 <= Self::MAX.0
    }

    pub const fn mnemonic(&self) -> &'static str {
        match self.0 {
            0x0 => "ZERO",
            0x1 => "MOVE",
            0x2 => "NOT",
            0x3 => "AND",
            0x4 => "OR",
            0x5 => "INC",
            0x6 => "DEC",
            0x7 => "ADD",
            0x8 => "SUB",
            0x9 => "MUL",
            0xA => "ABS",
            0xB => "GT",
            0xC => "GE",
            0xD => "MIN",
            0xE => "MAX",
            _ => "?",
        }
    }
}

impl fmt::Display for SimdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_validity() {
        assert!(Opcode::NOOP.is_valid());
        assert!(Opcode::SIMD.is_valid());
        assert!(!Opcode(0x6).is_valid());
        assert_eq!(Opcode::MATMUL.mnemonic(), "MATMUL");
    }

    #[test]
    fn test_data_move_kind_roundtrip() {
        let kinds = [
            DataMoveKind::Dram0ToLocal,
            DataMoveKind::LocalToDram0,
            DataMoveKind::Dram1ToLocal,
            DataMoveKind::LocalToDram1,
            DataMoveKind::LocalToAcc,
            DataMoveKind::LocalToAccAccumulate,
            DataMoveKind::AccToLocal,
        ];
        for kind in kinds {
            let back = DataMoveKind::from_flags(kind.flags()).unwrap();
            assert_eq!(kind, back);
            let again =
                DataMoveKind::from_parts(kind.to_local(), kind.accumulate(), kind.tag()).unwrap();
            assert_eq!(kind, again);
        }
    }

    #[test]
    fn test_data_move_illegal_combinations() {
        // Accumulating reads and DRAM accumulation are not in the ISA.
        assert!(DataMoveKind::from_parts(true, true, MemoryTag::Accumulator).is_err());
        assert!(DataMoveKind::from_parts(false, true, MemoryTag::Dram0).is_err());
        assert!(DataMoveKind::from_parts(true, false, MemoryTag::Local).is_err());
        assert!(DataMoveKind::from_flags(0x7).is_err());
    }

    #[test]
    fn test_simd_op_mnemonics() {
        assert_eq!(SimdOp::MAX.mnemonic(), "MAX");
        assert_eq!(SimdOp::ZERO.mnemonic(), "ZERO");
        assert!(!SimdOp(0xF).is_valid());
    }
}
