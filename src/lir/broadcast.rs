//! LirBroadcast - fan one emit stream out to several sinks
//!
//! Forwards every call to a fixed, ordered list of downstream sinks. The
//! first error aborts the call; downstream sinks after the failing one do
//! not see the instruction.

use crate::error::Result;
use crate::isa::{MemoryAddress, SimdOp};
use crate::lir::LirSink;

pub struct LirBroadcast<'a> {
    sinks: Vec<&'a mut (dyn LirSink + 'a)>,
}

impl<'a> LirBroadcast<'a> {
    pub fn new(sinks: Vec<&'a mut (dyn LirSink + 'a)>) -> Self {
        Self { sinks }
    }
}

impl LirSink for LirBroadcast<'_> {
    fn emit_noop(&mut self) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.emit_noop()?;
        }
        Ok(())
    }

    fn emit_wait(&mut self, tid: u8) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.emit_wait(tid)?;
        }
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
        for sink in self.sinks.iter_mut() {
            sink.emit_matmul(accumulate, local_stride, local, acc_stride, acc, size)?;
        }
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
        for sink in self.sinks.iter_mut() {
            sink.emit_simd(accumulate, op, left, right, dest, write_acc, read_acc)?;
        }
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
        for sink in self.sinks.iter_mut() {
            sink.emit_data_move(to_local, accumulate, local_stride, local, stride, addr, size)?;
        }
        Ok(())
    }

    fn emit_load_weights(
        &mut self,
        local_stride: u64,
        local: MemoryAddress,
        size: u64,
    ) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.emit_load_weights(local_stride, local, size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::testing::{FailingSink, RecordedOp, RecordingSink};

    #[test]
    fn test_forwards_in_order() {
        let mut a = RecordingSink::default();
        let mut b = RecordingSink::default();
        {
            let mut bc = LirBroadcast::new(vec![&mut a, &mut b]);
            bc.emit_noop().unwrap();
            bc.emit_wait(1).unwrap();
        }
        assert_eq!(a.ops, vec![RecordedOp::Noop, RecordedOp::Wait { tid: 1 }]);
        assert_eq!(a.ops, b.ops);
    }

    #[test]
    fn test_first_error_aborts() {
        let mut fail = FailingSink;
        let mut after = RecordingSink::default();
        let mut bc = LirBroadcast::new(vec![&mut fail, &mut after]);
        assert!(bc.emit_noop().is_err());
        drop(bc);
        assert!(after.ops.is_empty());
    }
}
