//! Arch - Architecture descriptor for the TCU accelerator
//!
//! A read-only record describing the target hardware. It is supplied by the
//! embedding compiler (typically from a JSON file) and stays fixed for the
//! lifetime of a compilation.
//!
//! ## Memory spaces
//!
//! ```text
//! Local        on-chip scratchpad, divided evenly across hardware threads
//! Accumulator  shared register file for matmul/SIMD results
//! DRAM0        off-chip bank 0 (activations)
//! DRAM1        off-chip bank 1 (weights)
//! ```
//!
//! All depths are in vectors (one vector = `array_size` scalars of
//! `data_bits` each) and must be powers of two.

use serde::{Deserialize, Serialize};

/// Architecture descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arch {
    /// Scalar width in bits
    pub data_bits: u32,
    /// Systolic array size (vectors are `array_size` scalars wide)
    pub array_size: u64,
    /// Number of hardware threads (1 or 2)
    pub threads: u32,
    /// Total local memory depth in vectors, shared across threads
    pub local_depth: u64,
    /// Accumulator depth in vectors
    pub accumulator_depth: u64,
    /// DRAM bank 0 depth in vectors
    pub dram0_depth: u64,
    /// DRAM bank 1 depth in vectors
    pub dram1_depth: u64,
    /// Number of SIMD registers
    pub simd_registers: u64,
    /// Width of the stride exponent field in bits
    pub stride_bits: u32,
}

impl Arch {
    /// Local memory depth visible to one hardware thread.
    ///
    /// Thread `tid` owns local addresses
    /// `[tid * thread_local_depth, (tid + 1) * thread_local_depth)`.
    pub fn thread_local_depth(&self) -> u64 {
        self.local_depth / self.threads.max(1) as u64
    }
}

impl Default for Arch {
    fn default() -> Self {
        Self {
            data_bits: 16,
            array_size: 8,
            threads: 1,
            local_depth: 2048,
            accumulator_depth: 512,
            dram0_depth: 1 << 20,
            dram1_depth: 1 << 20,
            simd_registers: 1,
            stride_bits: 3,
        }
    }
}
