//! Overlay thread plumbing - cycle accounting, address bias, balancing
//!
//! "Threads" here are hardware thread identifiers on the accelerator, not
//! host threads. The host emits one deterministic interleaving; these
//! types keep each hardware thread's cycle count honest while doing so.

use crate::error::Result;
use crate::estimate::Estimator;
use crate::isa::{DataMoveKind, MemoryAddress, MemoryTag, Opcode, SimdOp};
use crate::lir::LirSink;

/// Cycle and bias state of one hardware thread within an overlay window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadState {
    pub tid: u8,
    pub cycles: u64,
    /// Added to every Local raw offset this thread emits
    pub local_bias: u64,
}

impl ThreadState {
    pub fn new(tid: u8, thread_local_depth: u64) -> Self {
        Self {
            tid,
            cycles: 0,
            local_bias: thread_local_depth * tid as u64,
        }
    }
}

/// Thin per-thread LIR sink used during window interleaving.
///
/// On every emit it adds the opcode's estimated cycles to the thread's
/// counter, rewrites Local-tagged addresses by the thread's bias, and
/// forwards the call downstream.
pub struct ThreadSink<'a> {
    state: &'a mut ThreadState,
    estimator: &'a Estimator,
    inner: &'a mut (dyn LirSink + 'a),
}

impl<'a> ThreadSink<'a> {
    pub fn new(
        state: &'a mut ThreadState,
        estimator: &'a Estimator,
        inner: &'a mut (dyn LirSink + 'a),
    ) -> Self {
        Self {
            state,
            estimator,
            inner,
        }
    }

    fn charge(&mut self, opcode: Opcode, size: u64, flags: u8) -> Result<()> {
        self.state.cycles += self.estimator.estimate(opcode, size, flags)?.cycles;
        Ok(())
    }

    fn biased(&self, addr: MemoryAddress) -> MemoryAddress {
        match addr.tag {
            MemoryTag::Local => addr.biased(self.state.local_bias),
            _ => addr,
        }
    }
}

impl LirSink for ThreadSink<'_> {
    fn emit_noop(&mut self) -> Result<()> {
        self.charge(Opcode::NOOP, 0, 0)?;
        self.inner.emit_noop()
    }

    fn emit_wait(&mut self, tid: u8) -> Result<()> {
        self.charge(Opcode::WAIT, 0, 0)?;
        self.inner.emit_wait(tid)
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
        self.charge(Opcode::MATMUL, size, 0)?;
        let local = self.biased(local);
        self.inner
            .emit_matmul(accumulate, local_stride, local, acc_stride, acc, size)
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
        self.charge(Opcode::SIMD, 0, 0)?;
        self.inner
            .emit_simd(accumulate, op, left, right, dest, write_acc, read_acc)
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
        let kind = DataMoveKind::from_parts(to_local, accumulate, addr.tag)?;
        self.charge(Opcode::DATA_MOVE, size, kind.flags())?;
        let local = self.biased(local);
        self.inner
            .emit_data_move(to_local, accumulate, local_stride, local, stride, addr, size)
    }

    fn emit_load_weights(
        &mut self,
        local_stride: u64,
        local: MemoryAddress,
        size: u64,
    ) -> Result<()> {
        self.charge(Opcode::LOAD_WEIGHTS, size, 0)?;
        let local = self.biased(local);
        self.inner.emit_load_weights(local_stride, local, size)
    }
}

/// End-of-window cycle balancing.
///
/// Replacing no-op padding with mutual `Wait` insertion only requires a
/// new policy implementation; the scheduler is oblivious.
pub trait BalancePolicy {
    /// Bring every thread in `threads` up to the same cycle count,
    /// emitting whatever padding the policy uses into `out`.
    fn balance(
        &self,
        estimator: &Estimator,
        threads: &mut [ThreadState],
        out: &mut dyn LirSink,
    ) -> Result<()>;
}

/// Default policy: threads behind the target emit single no-ops,
/// round-robin, until all cycle counters agree.
pub struct NoOpPadding;

impl BalancePolicy for NoOpPadding {
    fn balance(
        &self,
        estimator: &Estimator,
        threads: &mut [ThreadState],
        out: &mut dyn LirSink,
    ) -> Result<()> {
        let target = match threads.iter().map(|t| t.cycles).max() {
            Some(max) => max,
            None => return Ok(()),
        };
        loop {
            let mut balanced = true;
            for thread in threads.iter_mut() {
                if thread.cycles < target {
                    balanced = false;
                    thread.cycles += estimator.estimate(Opcode::NOOP, 0, 0)?.cycles;
                    out.emit_noop()?;
                }
            }
            if balanced {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;
    use crate::lir::testing::{RecordedOp, RecordingSink};

    fn estimator() -> Estimator {
        Estimator::new(&Arch::default())
    }

    #[test]
    fn test_thread_sink_biases_local_only() {
        let est = estimator();
        let mut state = ThreadState::new(1, 1024);
        let mut recorded = RecordingSink::default();
        {
            let mut sink = ThreadSink::new(&mut state, &est, &mut recorded);
            sink.emit_matmul(
                false,
                1,
                MemoryAddress::bare(MemoryTag::Local, 10),
                1,
                MemoryAddress::bare(MemoryTag::Accumulator, 5),
                0,
            )
            .unwrap();
            sink.emit_load_weights(1, MemoryAddress::ZERO, 0).unwrap();
        }
        match &recorded.ops[0] {
            RecordedOp::MatMul { local, acc, .. } => {
                assert_eq!(local.raw, 1034);
                assert_eq!(acc.raw, 5);
            }
            other => panic!("unexpected op {:?}", other),
        }
        // Zero pseudo-addresses are never biased.
        match &recorded.ops[1] {
            RecordedOp::LoadWeights { local, .. } => assert_eq!(local.raw, 0),
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_thread_zero_has_no_bias() {
        let est = estimator();
        let mut state = ThreadState::new(0, 1024);
        let mut recorded = RecordingSink::default();
        {
            let mut sink = ThreadSink::new(&mut state, &est, &mut recorded);
            sink.emit_data_move(
                true,
                false,
                1,
                MemoryAddress::bare(MemoryTag::Local, 7),
                1,
                MemoryAddress::bare(MemoryTag::Dram0, 100),
                0,
            )
            .unwrap();
        }
        match &recorded.ops[0] {
            RecordedOp::DataMove { local, addr, .. } => {
                assert_eq!(local.raw, 7);
                assert_eq!(addr.raw, 100);
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_thread_sink_accumulates_cycles() {
        let est = estimator();
        let mut state = ThreadState::new(0, 1024);
        let mut recorded = RecordingSink::default();
        {
            let mut sink = ThreadSink::new(&mut state, &est, &mut recorded);
            sink.emit_noop().unwrap();
            sink.emit_matmul(
                false,
                1,
                MemoryAddress::bare(MemoryTag::Local, 0),
                1,
                MemoryAddress::bare(MemoryTag::Accumulator, 0),
                3,
            )
            .unwrap();
        }
        // 1 + (3 + 1 + 8)
        assert_eq!(state.cycles, 13);
    }

    #[test]
    fn test_noop_padding_balances_to_max() {
        let est = estimator();
        let mut threads = vec![
            ThreadState {
                tid: 0,
                cycles: 5,
                local_bias: 0,
            },
            ThreadState {
                tid: 1,
                cycles: 2,
                local_bias: 1024,
            },
        ];
        let mut recorded = RecordingSink::default();
        NoOpPadding
            .balance(&est, &mut threads, &mut recorded)
            .unwrap();
        assert_eq!(threads[0].cycles, 5);
        assert_eq!(threads[1].cycles, 5);
        assert_eq!(recorded.ops.len(), 3);
        assert!(recorded.ops.iter().all(|op| *op == RecordedOp::Noop));
    }

    #[test]
    fn test_balance_with_no_threads() {
        let est = estimator();
        let mut recorded = RecordingSink::default();
        NoOpPadding.balance(&est, &mut [], &mut recorded).unwrap();
        assert!(recorded.ops.is_empty());
    }
}
