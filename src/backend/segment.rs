//! Segment - build-time accumulator for one (layer, stage, partition, kind)
//!
//! A segment receives LIR calls from the front end and persists them,
//! already serialized, into a private temp-file store. Alongside the
//! bytes it keeps the instruction count (the parser's framing), the
//! tracepoint map, and optionally per-segment cost statistics.
//!
//! Lifecycle: `Backend::mk_segment` -> emit calls -> `finalize_segment`
//! (seals the store, inserts into the backend's sorted map) -> consumed
//! exactly once by `write_segments` -> the temp file is unlinked on drop.

use crate::error::{CompilerError, Result};
use crate::estimate::{Estimator, Stats};
use crate::isa::{DataMoveKind, InstructionLayout, MemoryAddress, Opcode, SimdOp};
use crate::lir::{LirGen, LirParser, LirSink};
use crate::tracepoint::{TracepointCollector, TracepointCondition};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use tempfile::NamedTempFile;

/// Segment kind, in traversal order within a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SegmentKind {
    Init = 0,
    Load = 1,
    Compute = 2,
    Save = 3,
}

impl SegmentKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Load => "load",
            Self::Compute => "compute",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Sort key for segments; lexicographic order is traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentKey {
    pub layer: u32,
    pub stage: u32,
    pub partition: u32,
    pub kind: SegmentKind,
}

impl SegmentKey {
    pub const fn new(layer: u32, stage: u32, partition: u32, kind: SegmentKind) -> Self {
        Self {
            layer,
            stage,
            partition,
            kind,
        }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.layer, self.stage, self.partition, self.kind
        )
    }
}

/// Byte-backed segment accumulator
pub struct Segment {
    key: SegmentKey,
    layout: InstructionLayout,
    gen: Option<LirGen<BufWriter<NamedTempFile>>>,
    store: Option<NamedTempFile>,
    instructions: usize,
    tracepoints: TracepointCollector,
    costs: Option<(Estimator, Stats)>,
}

impl Segment {
    pub(crate) fn new(
        key: SegmentKey,
        layout: InstructionLayout,
        conditions: Vec<TracepointCondition>,
        estimator: Option<Estimator>,
    ) -> Result<Self> {
        let store = NamedTempFile::new()?;
        let gen = LirGen::new(BufWriter::new(store), layout.clone());
        Ok(Self {
            key,
            layout,
            gen: Some(gen),
            store: None,
            instructions: 0,
            tracepoints: TracepointCollector::new(conditions),
            costs: estimator.map(|e| (e, Stats::default())),
        })
    }

    pub fn key(&self) -> SegmentKey {
        self.key
    }

    pub fn instructions_count(&self) -> usize {
        match &self.gen {
            Some(gen) => gen.instructions_count(),
            None => self.instructions,
        }
    }

    /// Tracepoint map keyed by segment-local instruction offset
    pub fn instruction_tracepoints(&self) -> &BTreeMap<u32, Vec<TracepointCondition>> {
        self.tracepoints.tracepoints()
    }

    /// Per-segment cost statistics, when enabled at creation
    pub fn stats(&self) -> Option<&Stats> {
        self.costs.as_ref().map(|(_, stats)| stats)
    }

    /// Flush and seal the store; emits afterwards are fatal.
    pub(crate) fn close(&mut self) -> Result<()> {
        let gen = self.gen.take().ok_or_else(|| {
            CompilerError::InvariantViolation(format!("segment {} already closed", self.key))
        })?;
        self.instructions = gen.instructions_count();
        let store = gen
            .into_writer()
            .into_inner()
            .map_err(|e| CompilerError::Io(e.into_error()))?;
        self.store = Some(store);
        Ok(())
    }

    /// Independent reader over the sealed store.
    pub(crate) fn open_reader(&self) -> Result<LirParser<BufReader<File>>> {
        let store = self.store.as_ref().ok_or_else(|| {
            CompilerError::InvariantViolation(format!("segment {} is not sealed", self.key))
        })?;
        let file = store.reopen()?;
        Ok(LirParser::new(
            BufReader::new(file),
            self.layout.clone(),
            self.instructions,
        ))
    }

    fn open_gen(&mut self) -> Result<&mut LirGen<BufWriter<NamedTempFile>>> {
        let key = self.key;
        self.gen.as_mut().ok_or_else(|| {
            CompilerError::InvariantViolation(format!("emit into sealed segment {}", key))
        })
    }

    fn record_cost(&mut self, opcode: Opcode, size: u64, flags: u8) -> Result<()> {
        if let Some((estimator, stats)) = &mut self.costs {
            let estimate = estimator.estimate(opcode, size, flags)?;
            stats.record(opcode.mnemonic(), &estimate);
        }
        Ok(())
    }
}

impl LirSink for Segment {
    fn emit_noop(&mut self) -> Result<()> {
        self.open_gen()?.emit_noop()?;
        self.tracepoints.emit_noop()?;
        self.record_cost(Opcode::NOOP, 0, 0)
    }

    fn emit_wait(&mut self, tid: u8) -> Result<()> {
        self.open_gen()?.emit_wait(tid)?;
        self.tracepoints.emit_wait(tid)?;
        self.record_cost(Opcode::WAIT, 0, 0)
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
        self.open_gen()?
            .emit_matmul(accumulate, local_stride, local, acc_stride, acc, size)?;
        self.tracepoints
            .emit_matmul(accumulate, local_stride, local, acc_stride, acc, size)?;
        self.record_cost(Opcode::MATMUL, size, 0)
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
        self.open_gen()?
            .emit_simd(accumulate, op, left, right, dest, write_acc, read_acc)?;
        self.tracepoints
            .emit_simd(accumulate, op, left, right, dest, write_acc, read_acc)?;
        self.record_cost(Opcode::SIMD, 0, 0)
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
        self.open_gen()?.emit_data_move(
            to_local,
            accumulate,
            local_stride,
            local,
            stride,
            addr,
            size,
        )?;
        self.tracepoints.emit_data_move(
            to_local,
            accumulate,
            local_stride,
            local,
            stride,
            addr,
            size,
        )?;
        let kind = DataMoveKind::from_parts(to_local, accumulate, addr.tag)?;
        self.record_cost(Opcode::DATA_MOVE, size, kind.flags())
    }

    fn emit_load_weights(
        &mut self,
        local_stride: u64,
        local: MemoryAddress,
        size: u64,
    ) -> Result<()> {
        self.open_gen()?.emit_load_weights(local_stride, local, size)?;
        self.tracepoints.emit_load_weights(local_stride, local, size)?;
        self.record_cost(Opcode::LOAD_WEIGHTS, size, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;
    use crate::isa::{MemoryRef, MemoryTag};
    use crate::lir::testing::{RecordedOp, RecordingSink};

    fn layout() -> InstructionLayout {
        InstructionLayout::from_arch(&Arch::default()).unwrap()
    }

    fn key() -> SegmentKey {
        SegmentKey::new(0, 0, 0, SegmentKind::Compute)
    }

    #[test]
    fn test_key_ordering_is_lexicographic() {
        let a = SegmentKey::new(0, 0, 0, SegmentKind::Init);
        let b = SegmentKey::new(0, 0, 0, SegmentKind::Save);
        let c = SegmentKey::new(0, 0, 1, SegmentKind::Init);
        let d = SegmentKey::new(1, 0, 0, SegmentKind::Init);
        assert!(a < b && b < c && c < d);
        assert_eq!(a.to_string(), "0/0/0/init");
    }

    #[test]
    fn test_store_roundtrip() {
        let mut segment = Segment::new(key(), layout(), Vec::new(), None).unwrap();
        segment.emit_noop().unwrap();
        segment
            .emit_matmul(
                false,
                1,
                MemoryAddress::bare(MemoryTag::Local, 10),
                1,
                MemoryAddress::bare(MemoryTag::Accumulator, 0),
                4,
            )
            .unwrap();
        assert_eq!(segment.instructions_count(), 2);
        segment.close().unwrap();
        assert_eq!(segment.instructions_count(), 2);

        let mut sink = RecordingSink::default();
        let mut parser = segment.open_reader().unwrap();
        while parser.has_next() {
            parser.parse_next(&mut sink).unwrap();
        }
        assert_eq!(sink.ops.len(), 2);
        assert_eq!(sink.ops[0], RecordedOp::Noop);
        assert!(matches!(sink.ops[1], RecordedOp::MatMul { size: 4, .. }));
    }

    #[test]
    fn test_emit_after_close_is_fatal() {
        let mut segment = Segment::new(key(), layout(), Vec::new(), None).unwrap();
        segment.close().unwrap();
        assert!(matches!(
            segment.emit_noop(),
            Err(CompilerError::InvariantViolation(_))
        ));
        assert!(matches!(
            segment.close(),
            Err(CompilerError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_tracepoints_collected_at_build_time() {
        let conditions = vec![TracepointCondition {
            tag: MemoryTag::Accumulator,
            reference: MemoryRef(9),
        }];
        let mut segment = Segment::new(key(), layout(), conditions, None).unwrap();
        segment.emit_noop().unwrap();
        segment
            .emit_matmul(
                false,
                1,
                MemoryAddress::bare(MemoryTag::Local, 0),
                1,
                MemoryAddress::new(MemoryTag::Accumulator, MemoryRef(9), 3),
                0,
            )
            .unwrap();
        segment.close().unwrap();
        assert!(segment.instruction_tracepoints().contains_key(&1));
    }

    #[test]
    fn test_per_segment_stats() {
        let estimator = Estimator::new(&Arch::default());
        let mut segment = Segment::new(key(), layout(), Vec::new(), Some(estimator)).unwrap();
        segment.emit_noop().unwrap();
        segment.emit_noop().unwrap();
        segment.close().unwrap();
        assert_eq!(segment.stats().unwrap().total_cycles(), 2);
    }
}
