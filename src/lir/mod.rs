//! LIR - the low-level instruction stream and its sinks
//!
//! Emission is sink-polymorphic: every consumer of the instruction stream
//! implements [`LirSink`], and producers never know whether they are
//! feeding the binary generator, the disassembler, the cost accumulator,
//! a fan-out, or the overlay's per-thread wrapper.
//!
//! ```text
//! front end ──> Segment ──(bytes)──> LirParser ──> LirBroadcast
//!                                                   ├── LirGen      (program binary)
//!                                                   ├── LirPrinter  (disassembly)
//!                                                   └── LirEstimator (stats)
//! ```

mod broadcast;
mod gen;
mod parser;
mod printer;
mod sink;

pub use broadcast::LirBroadcast;
pub use gen::LirGen;
pub use parser::{CombinedParser, LirParser};
pub use printer::LirPrinter;
pub use sink::LirSink;

#[cfg(test)]
pub(crate) mod testing {
    //! Sinks that record or fail, shared by tests across the crate.

    use crate::error::{CompilerError, Result};
    use crate::isa::{MemoryAddress, SimdOp};
    use crate::lir::LirSink;

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Noop,
        Wait {
            tid: u8,
        },
        MatMul {
            accumulate: bool,
            local_stride: u64,
            local: MemoryAddress,
            acc_stride: u64,
            acc: MemoryAddress,
            size: u64,
        },
        Simd {
            accumulate: bool,
            op: SimdOp,
            left: u8,
            right: u8,
            dest: u8,
            write_acc: MemoryAddress,
            read_acc: MemoryAddress,
        },
        DataMove {
            to_local: bool,
            accumulate: bool,
            local_stride: u64,
            local: MemoryAddress,
            stride: u64,
            addr: MemoryAddress,
            size: u64,
        },
        LoadWeights {
            local_stride: u64,
            local: MemoryAddress,
            size: u64,
        },
    }

    /// Captures every emit as data.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub ops: Vec<RecordedOp>,
    }

    impl LirSink for RecordingSink {
        fn emit_noop(&mut self) -> Result<()> {
            self.ops.push(RecordedOp::Noop);
            Ok(())
        }

        fn emit_wait(&mut self, tid: u8) -> Result<()> {
            self.ops.push(RecordedOp::Wait { tid });
            Ok(())
        }

        fn emit_matmul(
            &mut self,
            accumulate: bool,
            local_stride: u64,
            local: MemoryAddress,
            acc_stride: u64,
            acc: MemoryAddress,
            size: u64,
        ) -> Result<()> {
            self.ops.push(RecordedOp::MatMul {
                accumulate,
                local_stride,
                local,
                acc_stride,
                acc,
                size,
            });
            Ok(())
        }

        fn emit_simd(
            &mut self,
            accumulate: bool,
            op: SimdOp,
            left: u8,
            right: u8,
            dest: u8,
            write_acc: MemoryAddress,
            read_acc: MemoryAddress,
        ) -> Result<()> {
            self.ops.push(RecordedOp::Simd {
                accumulate,
                op,
                left,
                right,
                dest,
                write_acc,
                read_acc,
            });
            Ok(())
        }

        fn emit_data_move(
            &mut self,
            to_local: bool,
            accumulate: bool,
            local_stride: u64,
            local: MemoryAddress,
            stride: u64,
            addr: MemoryAddress,
            size: u64,
        ) -> Result<()> {
            self.ops.push(RecordedOp::DataMove {
                to_local,
                accumulate,
                local_stride,
                local,
                stride,
                addr,
                size,
            });
            Ok(())
        }

        fn emit_load_weights(
            &mut self,
            local_stride: u64,
            local: MemoryAddress,
            size: u64,
        ) -> Result<()> {
            self.ops.push(RecordedOp::LoadWeights {
                local_stride,
                local,
                size,
            });
            Ok(())
        }
    }

    /// Fails every emit, for abort-path tests.
    pub struct FailingSink;

    impl LirSink for FailingSink {
        fn emit_noop(&mut self) -> Result<()> {
            Err(CompilerError::Encoding("failing sink".to_string()))
        }

        fn emit_wait(&mut self, _tid: u8) -> Result<()> {
            Err(CompilerError::Encoding("failing sink".to_string()))
        }

        fn emit_matmul(
            &mut self,
            _accumulate: bool,
            _local_stride: u64,
            _local: MemoryAddress,
            _acc_stride: u64,
            _acc: MemoryAddress,
            _size: u64,
        ) -> Result<()> {
            Err(CompilerError::Encoding("failing sink".to_string()))
        }

        fn emit_simd(
            &mut self,
            _accumulate: bool,
            _op: SimdOp,
            _left: u8,
            _right: u8,
            _dest: u8,
            _write_acc: MemoryAddress,
            _read_acc: MemoryAddress,
        ) -> Result<()> {
            Err(CompilerError::Encoding("failing sink".to_string()))
        }

        fn emit_data_move(
            &mut self,
            _to_local: bool,
            _accumulate: bool,
            _local_stride: u64,
            _local: MemoryAddress,
            _stride: u64,
            _addr: MemoryAddress,
            _size: u64,
        ) -> Result<()> {
            Err(CompilerError::Encoding("failing sink".to_string()))
        }

        fn emit_load_weights(
            &mut self,
            _local_stride: u64,
            _local: MemoryAddress,
            _size: u64,
        ) -> Result<()> {
            Err(CompilerError::Encoding("failing sink".to_string()))
        }
    }
}
