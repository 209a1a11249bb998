//! InstructionLayout - derived binary layout of one instruction
//!
//! Field widths are computed once from the architecture descriptor and are
//! authoritative for the generator, the parser and the disassembler.
//!
//! ## Format
//!
//! ```text
//! [OPCODE:4][FLAGS:4][OPERAND0][OPERAND1][OPERAND2]
//!     |        |         |         |         |
//!   opcode   per-op    local /   far addr  size or
//!            flags     acc addr  + stride  SIMD sub-op
//!            nibble    + stride
//! ```
//!
//! Fields are packed LSB-first (see `bits`); the total is rounded up to
//! whole bytes and unused top bits are zero. Strides ride in the top
//! `stride_bits` of their operand field as a log2 exponent.

use crate::arch::Arch;
use crate::error::{CompilerError, Result};
use crate::isa::bits::bits_for;
use crate::isa::MemoryTag;

/// Fixed width of the opcode field
pub const OPCODE_BITS: u32 = 4;
/// Fixed width of the flag nibble
pub const FLAGS_BITS: u32 = 4;
/// Fixed width of the SIMD sub-operation selector
pub const SIMD_OP_BITS: u32 = 4;

/// Derived per-architecture instruction layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionLayout {
    pub stride_bits: u32,
    pub local_bits: u32,
    pub accumulator_bits: u32,
    pub dram0_bits: u32,
    pub dram1_bits: u32,
    pub simd_reg_bits: u32,
    pub operand0_bits: u32,
    pub operand1_bits: u32,
    pub operand2_bits: u32,
    pub instruction_bytes: usize,
}

impl InstructionLayout {
    pub fn from_arch(arch: &Arch) -> Result<Self> {
        for (name, depth) in [
            ("local_depth", arch.local_depth),
            ("accumulator_depth", arch.accumulator_depth),
            ("dram0_depth", arch.dram0_depth),
            ("dram1_depth", arch.dram1_depth),
        ] {
            if depth < 2 || !depth.is_power_of_two() {
                return Err(CompilerError::Configuration(format!(
                    "{} must be a power of two >= 2, got {}",
                    name, depth
                )));
            }
        }
        if arch.stride_bits == 0 || arch.stride_bits > 6 {
            return Err(CompilerError::Configuration(format!(
                "stride_bits must be in 1..=6, got {}",
                arch.stride_bits
            )));
        }
        if arch.simd_registers == 0 {
            return Err(CompilerError::Configuration(
                "simd_registers must be >= 1".to_string(),
            ));
        }
        if arch.array_size < 2 || !arch.array_size.is_power_of_two() {
            return Err(CompilerError::Configuration(format!(
                "array_size must be a power of two >= 2, got {}",
                arch.array_size
            )));
        }

        let local_bits = bits_for(arch.local_depth);
        let accumulator_bits = bits_for(arch.accumulator_depth);
        let dram0_bits = bits_for(arch.dram0_depth);
        let dram1_bits = bits_for(arch.dram1_depth);
        // Selector 0 addresses the I/O bus, 1..=n the SIMD registers.
        let simd_reg_bits = bits_for(arch.simd_registers + 1).max(1);

        // Operand 0 carries local addresses (matmul, data move, load
        // weights) or the SIMD write address; operand 1 carries the far
        // address or the SIMD read address.
        let operand0_bits = local_bits.max(accumulator_bits) + arch.stride_bits;
        let operand1_bits = accumulator_bits.max(dram0_bits).max(dram1_bits) + arch.stride_bits;
        let size_bits = local_bits
            .max(accumulator_bits)
            .max(dram0_bits)
            .max(dram1_bits);
        let operand2_bits = size_bits.max(SIMD_OP_BITS + 3 * simd_reg_bits);

        let total_bits = OPCODE_BITS + FLAGS_BITS + operand0_bits + operand1_bits + operand2_bits;
        let instruction_bytes = ((total_bits + 7) / 8) as usize;

        Ok(Self {
            stride_bits: arch.stride_bits,
            local_bits,
            accumulator_bits,
            dram0_bits,
            dram1_bits,
            simd_reg_bits,
            operand0_bits,
            operand1_bits,
            operand2_bits,
            instruction_bytes,
        })
    }

    /// Address field width for a memory space. `Zero` carries no offset.
    pub fn address_bits(&self, tag: MemoryTag) -> u32 {
        match tag {
            MemoryTag::Local => self.local_bits,
            MemoryTag::Accumulator => self.accumulator_bits,
            MemoryTag::Dram0 => self.dram0_bits,
            MemoryTag::Dram1 => self.dram1_bits,
            MemoryTag::Zero => 0,
        }
    }

    /// Width of the size operand
    pub fn size_bits(&self) -> u32 {
        self.operand2_bits
    }

    /// Address portion of operand 0 (stride exponent sits above it)
    pub fn operand0_addr_bits(&self) -> u32 {
        self.operand0_bits - self.stride_bits
    }

    /// Address portion of operand 1
    pub fn operand1_addr_bits(&self) -> u32 {
        self.operand1_bits - self.stride_bits
    }

    /// Human-readable layout report
    pub fn describe(&self) -> String {
        format!(
            "instruction: {} bytes\n\
             operand0: {} bits ({} addr + {} stride)\n\
             operand1: {} bits ({} addr + {} stride)\n\
             operand2: {} bits\n\
             local: {} bits, accumulator: {} bits, dram0: {} bits, dram1: {} bits\n\
             simd: {} op bits, {} register bits",
            self.instruction_bytes,
            self.operand0_bits,
            self.operand0_addr_bits(),
            self.stride_bits,
            self.operand1_bits,
            self.operand1_addr_bits(),
            self.stride_bits,
            self.operand2_bits,
            self.local_bits,
            self.accumulator_bits,
            self.dram0_bits,
            self.dram1_bits,
            SIMD_OP_BITS,
            self.simd_reg_bits,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_arch_layout() {
        let layout = InstructionLayout::from_arch(&Arch::default()).unwrap();
        assert_eq!(layout.local_bits, 11);
        assert_eq!(layout.accumulator_bits, 9);
        assert_eq!(layout.dram0_bits, 20);
        assert_eq!(layout.dram1_bits, 20);
        assert_eq!(layout.simd_reg_bits, 1);
        assert_eq!(layout.operand0_bits, 14);
        assert_eq!(layout.operand1_bits, 23);
        assert_eq!(layout.operand2_bits, 20);
        // 4 + 4 + 14 + 23 + 20 = 65 bits
        assert_eq!(layout.instruction_bytes, 9);
    }

    #[test]
    fn test_rejects_non_power_of_two_depth() {
        let arch = Arch {
            local_depth: 1000,
            ..Arch::default()
        };
        assert!(matches!(
            InstructionLayout::from_arch(&arch),
            Err(crate::error::CompilerError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_bad_stride_bits() {
        let arch = Arch {
            stride_bits: 0,
            ..Arch::default()
        };
        assert!(InstructionLayout::from_arch(&arch).is_err());

        let arch = Arch {
            stride_bits: 7,
            ..Arch::default()
        };
        assert!(InstructionLayout::from_arch(&arch).is_err());
    }

    #[test]
    fn test_address_bits_per_tag() {
        let layout = InstructionLayout::from_arch(&Arch::default()).unwrap();
        assert_eq!(layout.address_bits(MemoryTag::Local), 11);
        assert_eq!(layout.address_bits(MemoryTag::Accumulator), 9);
        assert_eq!(layout.address_bits(MemoryTag::Zero), 0);
    }

    #[test]
    fn test_describe_mentions_size() {
        let layout = InstructionLayout::from_arch(&Arch::default()).unwrap();
        assert!(layout.describe().contains("9 bytes"));
    }
}
