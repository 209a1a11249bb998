//! Memory addresses - tagged offsets into the accelerator's memory spaces
//!
//! An address is a `(tag, reference, raw)` triple. The tag selects the
//! memory space, `raw` is the vector offset inside it, and `reference` is
//! an opaque symbolic handle used only for tracepoint resolution - it is
//! never serialized into the instruction stream.
//!
//! ## Display prefixes
//!
//! ```text
//! L10      local, offset 10
//! A0       accumulator, offset 0
//! D0:128   DRAM bank 0, offset 128
//! D1:7     DRAM bank 1, offset 7
//! Z        zero pseudo-space (reads return zero vectors)
//! ```

use std::fmt;

/// Memory space selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryTag {
    /// On-chip per-thread scratchpad; raw offsets require per-thread bias
    Local,
    /// Shared accumulator register file; never biased
    Accumulator,
    /// Off-chip DRAM bank 0
    Dram0,
    /// Off-chip DRAM bank 1
    Dram1,
    /// Pseudo-space: reads produce zero vectors, writes are illegal
    Zero,
}

impl MemoryTag {
    /// Display prefix for disassembly
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Local => "L",
            Self::Accumulator => "A",
            Self::Dram0 => "D0:",
            Self::Dram1 => "D1:",
            Self::Zero => "Z",
        }
    }
}

impl fmt::Display for MemoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Opaque symbolic reference attached to an address by the front end.
///
/// Only compared for tracepoint matching; `NONE` means unattributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRef(pub u64);

impl MemoryRef {
    pub const NONE: Self = Self(u64::MAX);

    pub const fn is_none(&self) -> bool {
        self.0 == u64::MAX
    }
}

/// A tagged memory address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAddress {
    pub tag: MemoryTag,
    pub reference: MemoryRef,
    pub raw: u64,
}

impl MemoryAddress {
    pub const fn new(tag: MemoryTag, reference: MemoryRef, raw: u64) -> Self {
        Self {
            tag,
            reference,
            raw,
        }
    }

    /// Unattributed address in `tag` space
    pub const fn bare(tag: MemoryTag, raw: u64) -> Self {
        Self::new(tag, MemoryRef::NONE, raw)
    }

    /// The zero pseudo-address
    pub const ZERO: Self = Self::bare(MemoryTag::Zero, 0);

    /// Same address shifted by `bias` vectors
    pub const fn biased(&self, bias: u64) -> Self {
        Self {
            tag: self.tag,
            reference: self.reference,
            raw: self.raw + bias,
        }
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            MemoryTag::Zero => write!(f, "Z"),
            tag => write!(f, "{}{}", tag.prefix(), self.raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(MemoryAddress::bare(MemoryTag::Local, 10).to_string(), "L10");
        assert_eq!(MemoryAddress::bare(MemoryTag::Accumulator, 0).to_string(), "A0");
        assert_eq!(MemoryAddress::bare(MemoryTag::Dram0, 128).to_string(), "D0:128");
        assert_eq!(MemoryAddress::bare(MemoryTag::Dram1, 7).to_string(), "D1:7");
        assert_eq!(MemoryAddress::ZERO.to_string(), "Z");
    }

    #[test]
    fn test_bias() {
        let addr = MemoryAddress::bare(MemoryTag::Local, 10);
        assert_eq!(addr.biased(1024).raw, 1034);
        assert_eq!(addr.biased(1024).tag, MemoryTag::Local);
    }

    #[test]
    fn test_reference_none() {
        assert!(MemoryRef::NONE.is_none());
        assert!(!MemoryRef(3).is_none());
        assert!(MemoryAddress::bare(MemoryTag::Local, 0).reference.is_none());
    }
}
