//! LirSink - the polymorphic emit interface
//!
//! Everything downstream of the scheduler speaks this trait: the binary
//! generator, the disassembly printer, the cost accumulator, the fan-out
//! broadcast, the tracepoint collector, segment builders and the overlay
//! thread wrapper. Each operation either emits or fails fatally.

use crate::error::Result;
use crate::isa::{MemoryAddress, SimdOp};

/// The six-operation LIR emit interface.
///
/// Strides are literal element strides and must be powers of two; sizes
/// count vectors beyond the first, so `size = 0` touches one vector.
#[allow(clippy::too_many_arguments)]
pub trait LirSink {
    /// Emit a pad instruction.
    fn emit_noop(&mut self) -> Result<()>;

    /// Synchronize on thread `tid`'s cycle counter.
    fn emit_wait(&mut self, tid: u8) -> Result<()>;

    /// Matrix multiply `size + 1` vectors from `local` into `acc`.
    ///
    /// `local.tag` may be `Zero` to feed zero vectors through the array.
    fn emit_matmul(
        &mut self,
        accumulate: bool,
        local_stride: u64,
        local: MemoryAddress,
        acc_stride: u64,
        acc: MemoryAddress,
        size: u64,
    ) -> Result<()>;

    /// SIMD ALU operation.
    ///
    /// `left`, `right` and `dest` select SIMD registers (0 is the I/O
    /// bus). `write_acc` / `read_acc` are active when accumulator-tagged;
    /// pass `MemoryAddress::ZERO` to leave a port idle.
    fn emit_simd(
        &mut self,
        accumulate: bool,
        op: SimdOp,
        left: u8,
        right: u8,
        dest: u8,
        write_acc: MemoryAddress,
        read_acc: MemoryAddress,
    ) -> Result<()>;

    /// Move `size + 1` vectors between local and `addr`'s memory space.
    ///
    /// `addr.tag` drives the transfer type; accumulation is only legal
    /// into the accumulators.
    fn emit_data_move(
        &mut self,
        to_local: bool,
        accumulate: bool,
        local_stride: u64,
        local: MemoryAddress,
        stride: u64,
        addr: MemoryAddress,
        size: u64,
    ) -> Result<()>;

    /// Stream `size + 1` weight vectors from `local` into the array.
    ///
    /// `local.tag` may be `Zero` to load zero weights.
    fn emit_load_weights(&mut self, local_stride: u64, local: MemoryAddress, size: u64)
        -> Result<()>;
}
