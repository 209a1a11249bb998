//! Tracepoints - observability records attached to instruction offsets
//!
//! The front end registers conditions (a memory tag plus a symbolic
//! reference). During segment build, the collector watches the
//! destination address of every emitted instruction and records which
//! conditions it satisfied, keyed by the instruction's offset within the
//! segment. The enclosing compiler's trace context consumes the map; the
//! overlay path never touches it.

use crate::error::Result;
use crate::isa::{MemoryAddress, MemoryRef, MemoryTag, SimdOp};
use crate::lir::LirSink;
use std::collections::BTreeMap;

/// A condition to watch for: writes into `tag` space attributed to
/// `reference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracepointCondition {
    pub tag: MemoryTag,
    pub reference: MemoryRef,
}

impl TracepointCondition {
    fn matches(&self, addr: &MemoryAddress) -> bool {
        !self.reference.is_none() && addr.tag == self.tag && addr.reference == self.reference
    }
}

/// Resolves symbolic references to front-end objects, for formatting only.
pub trait SymbolResolver {
    fn resolve(&self, reference: MemoryRef) -> Option<String>;
}

/// LIR sink that records matched conditions per instruction offset.
///
/// Offsets are segment-local; every emit advances the offset whether or
/// not anything matched.
#[derive(Debug, Default)]
pub struct TracepointCollector {
    conditions: Vec<TracepointCondition>,
    offset: u32,
    map: BTreeMap<u32, Vec<TracepointCondition>>,
}

impl TracepointCollector {
    pub fn new(conditions: Vec<TracepointCondition>) -> Self {
        Self {
            conditions,
            offset: 0,
            map: BTreeMap::new(),
        }
    }

    pub fn tracepoints(&self) -> &BTreeMap<u32, Vec<TracepointCondition>> {
        &self.map
    }

    /// Record then advance; `destination` is `None` for pad/sync ops.
    fn step(&mut self, destination: Option<&MemoryAddress>) {
        if let Some(addr) = destination {
            let matched: Vec<_> = self
                .conditions
                .iter()
                .filter(|c| c.matches(addr))
                .copied()
                .collect();
            if !matched.is_empty() {
                self.map.insert(self.offset, matched);
            }
        }
        self.offset += 1;
    }
}

impl LirSink for TracepointCollector {
    fn emit_noop(&mut self) -> Result<()> {
        self.step(None);
        Ok(())
    }

    fn emit_wait(&mut self, _tid: u8) -> Result<()> {
        self.step(None);
        Ok(())
    }

    fn emit_matmul(
        &mut self,
        _accumulate: bool,
        _local_stride: u64,
        _local: MemoryAddress,
        _acc_stride: u64,
        acc: MemoryAddress,
        _size: u64,
    ) -> Result<()> {
        self.step(Some(&acc));
        Ok(())
    }

    fn emit_simd(
        &mut self,
        _accumulate: bool,
        _op: SimdOp,
        _left: u8,
        _right: u8,
        _dest: u8,
        write_acc: MemoryAddress,
        _read_acc: MemoryAddress,
    ) -> Result<()> {
        self.step(Some(&write_acc));
        Ok(())
    }

    fn emit_data_move(
        &mut self,
        to_local: bool,
        _accumulate: bool,
        _local_stride: u64,
        local: MemoryAddress,
        _stride: u64,
        addr: MemoryAddress,
        _size: u64,
    ) -> Result<()> {
        let destination = if to_local { local } else { addr };
        self.step(Some(&destination));
        Ok(())
    }

    fn emit_load_weights(
        &mut self,
        _local_stride: u64,
        local: MemoryAddress,
        _size: u64,
    ) -> Result<()> {
        self.step(Some(&local));
        Ok(())
    }
}

/// Render a tracepoint map with resolved symbol names.
pub fn format_tracepoints(
    map: &BTreeMap<u32, Vec<TracepointCondition>>,
    resolver: &dyn SymbolResolver,
) -> String {
    let mut out = String::new();
    for (offset, conditions) in map {
        for condition in conditions {
            let name = resolver
                .resolve(condition.reference)
                .unwrap_or_else(|| format!("ref#{}", condition.reference.0));
            out.push_str(&format!("{}: {}{}\n", offset, condition.tag, name));
        }
    }
    out
}
