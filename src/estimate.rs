//! Estimator - per-instruction cycle and energy cost model
//!
//! Pure and reproducible: the cost of an instruction is a function of its
//! opcode, size operand and flags, plus constants taken from the
//! architecture descriptor. The overlay scheduler leans on two properties:
//! costs are deterministic, and `NOOP` costs exactly one cycle (the
//! balancing pad terminates by counting up in unit steps).
//!
//! | Opcode        | Cycles                      | Energy                        |
//! |---------------|-----------------------------|-------------------------------|
//! | NOOP, WAIT    | 1                           | 0                             |
//! | MATMUL        | size + 1 + array_size       | (size+1) * array^2 * MAC      |
//! | SIMD          | 2                           | array * lane                  |
//! | DATA_MOVE     | (size+1) * 2 (DRAM) or *1   | per-vector, DRAM >> on-chip   |
//! | LOAD_WEIGHTS  | size + 1 + array_size       | (size+1) * array * load       |

use crate::arch::Arch;
use crate::error::{CompilerError, Result};
use crate::isa::{DataMoveKind, MemoryAddress, Opcode, SimdOp};
use crate::lir::LirSink;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Energy per multiply-accumulate, in pJ
const MAC_ENERGY: f64 = 0.2;
/// Energy per SIMD lane per operation, in pJ
const SIMD_LANE_ENERGY: f64 = 0.05;
/// Energy per vector moved to or from DRAM, in pJ
const DRAM_VECTOR_ENERGY: f64 = 6.0;
/// Energy per vector moved to or from the accumulators, in pJ
const ACC_VECTOR_ENERGY: f64 = 0.1;
/// Energy per weight vector streamed into the array, in pJ
const WEIGHT_VECTOR_ENERGY: f64 = 0.4;
/// DRAM transfers take this many cycles per vector
const DRAM_CYCLES_PER_VECTOR: u64 = 2;

/// Cost of one instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub cycles: u64,
    pub energy: f64,
}

/// Pure cost model over the architecture constants
#[derive(Debug, Clone)]
pub struct Estimator {
    array_size: u64,
}

impl Estimator {
    pub fn new(arch: &Arch) -> Self {
        Self {
            array_size: arch.array_size,
        }
    }

    /// Cost of `opcode` with the given size operand and flag nibble.
    ///
    /// `size` and `flags` are ignored where the opcode does not use them.
    pub fn estimate(&self, opcode: Opcode, size: u64, flags: u8) -> Result<Estimate> {
        let vectors = size + 1;
        match opcode {
            Opcode::NOOP | Opcode::WAIT => Ok(Estimate {
                cycles: 1,
                energy: 0.0,
            }),
            Opcode::MATMUL => Ok(Estimate {
                cycles: vectors + self.array_size,
                energy: vectors as f64 * (self.array_size * self.array_size) as f64 * MAC_ENERGY,
            }),
            Opcode::SIMD => Ok(Estimate {
                cycles: 2,
                energy: self.array_size as f64 * SIMD_LANE_ENERGY,
            }),
            Opcode::DATA_MOVE => {
                let kind = DataMoveKind::from_flags(flags)?;
                if kind.is_dram() {
                    Ok(Estimate {
                        cycles: vectors * DRAM_CYCLES_PER_VECTOR,
                        energy: vectors as f64 * DRAM_VECTOR_ENERGY,
                    })
                } else {
                    Ok(Estimate {
                        cycles: vectors,
                        energy: vectors as f64 * ACC_VECTOR_ENERGY,
                    })
                }
            }
            Opcode::LOAD_WEIGHTS => Ok(Estimate {
                cycles: vectors + self.array_size,
                energy: vectors as f64 * self.array_size as f64 * WEIGHT_VECTOR_ENERGY,
            }),
            other => Err(CompilerError::Encoding(format!(
                "unknown opcode {:#x}",
                other.0
            ))),
        }
    }
}

/// Per-opcode counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OpCounters {
    pub count: u64,
    pub cycles: u64,
    pub energy: f64,
}

/// Accumulated cycle and energy statistics, keyed by mnemonic
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    ops: BTreeMap<&'static str, OpCounters>,
}

impl Stats {
    pub fn record(&mut self, mnemonic: &'static str, estimate: &Estimate) {
        let entry = self.ops.entry(mnemonic).or_default();
        entry.count += 1;
        entry.cycles += estimate.cycles;
        entry.energy += estimate.energy;
    }

    pub fn per_op(&self) -> &BTreeMap<&'static str, OpCounters> {
        &self.ops
    }

    pub fn instructions_count(&self) -> u64 {
        self.ops.values().map(|c| c.count).sum()
    }

    pub fn total_cycles(&self) -> u64 {
        self.ops.values().map(|c| c.cycles).sum()
    }

    pub fn total_energy(&self) -> f64 {
        self.ops.values().map(|c| c.energy).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<14}{:>10}{:>14}{:>14}",
            "op", "count", "cycles", "energy"
        )?;
        for (mnemonic, c) in &self.ops {
            writeln!(
                f,
                "{:<14}{:>10}{:>14}{:>14.1}",
                mnemonic, c.count, c.cycles, c.energy
            )?;
        }
        writeln!(
            f,
            "{:<14}{:>10}{:>14}{:>14.1}",
            "total",
            self.instructions_count(),
            self.total_cycles(),
            self.total_energy()
        )
    }
}

/// LIR sink that accumulates costs into a [`Stats`]
pub struct LirEstimator<'a> {
    estimator: Estimator,
    stats: &'a mut Stats,
}

impl<'a> LirEstimator<'a> {
    pub fn new(estimator: Estimator, stats: &'a mut Stats) -> Self {
        Self { estimator, stats }
    }

    fn record(&mut self, opcode: Opcode, size: u64, flags: u8) -> Result<()> {
        let estimate = self.estimator.estimate(opcode, size, flags)?;
        self.stats.record(opcode.mnemonic(), &estimate);
        Ok(())
    }
}

impl LirSink for LirEstimator<'_> {
    fn emit_noop(&mut self) -> Result<()> {
        self.record(Opcode::NOOP, 0, 0)
    }

    fn emit_wait(&mut self, _tid: u8) -> Result<()> {
        self.record(Opcode::WAIT, 0, 0)
    }

    fn emit_matmul(
        &mut self,
        _accumulate: bool,
        _local_stride: u64,
        _local: MemoryAddress,
        _acc_stride: u64,
        _acc: MemoryAddress,
        size: u64,
    ) -> Result<()> {
        self.record(Opcode::MATMUL, size, 0)
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
        self.record(Opcode::SIMD, 0, 0)
    }

    fn emit_data_move(
        &mut self,
        to_local: bool,
        accumulate: bool,
        _local_stride: u64,
        _local: MemoryAddress,
        _stride: u64,
        addr: MemoryAddress,
        size: u64,
    ) -> Result<()> {
        let kind = DataMoveKind::from_parts(to_local, accumulate, addr.tag)?;
        self.record(Opcode::DATA_MOVE, size, kind.flags())
    }

    fn emit_load_weights(
        &mut self,
        _local_stride: u64,
        _local: MemoryAddress,
        size: u64,
    ) -> Result<()> {
        self.record(Opcode::LOAD_WEIGHTS, size, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::MemoryTag;

    fn estimator() -> Estimator {
        Estimator::new(&Arch::default())
    }

    #[test]
    fn test_noop_costs_one_cycle() {
        let e = estimator().estimate(Opcode::NOOP, 0, 0).unwrap();
        assert_eq!(e.cycles, 1);
        assert_eq!(e.energy, 0.0);
    }

    #[test]
    fn test_matmul_scales_with_size() {
        let est = estimator();
        let small = est.estimate(Opcode::MATMUL, 0, 0).unwrap();
        let large = est.estimate(Opcode::MATMUL, 64, 0).unwrap();
        // Default array size is 8, so pipeline fill is 8 cycles.
        assert_eq!(small.cycles, 9);
        assert_eq!(large.cycles, 73);
        assert!(large.energy > small.energy);
    }

    #[test]
    fn test_dram_moves_cost_more_than_accumulator_moves() {
        let est = estimator();
        let dram = est
            .estimate(Opcode::DATA_MOVE, 7, DataMoveKind::Dram0ToLocal.flags())
            .unwrap();
        let acc = est
            .estimate(Opcode::DATA_MOVE, 7, DataMoveKind::LocalToAcc.flags())
            .unwrap();
        assert_eq!(dram.cycles, 16);
        assert_eq!(acc.cycles, 8);
        assert!(dram.energy > acc.energy);
    }

    #[test]
    fn test_estimate_is_reproducible() {
        let est = estimator();
        let a = est.estimate(Opcode::LOAD_WEIGHTS, 31, 0).unwrap();
        let b = est.estimate(Opcode::LOAD_WEIGHTS, 31, 0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_estimator_sink_accumulates() {
        let mut stats = Stats::default();
        {
            let mut sink = LirEstimator::new(estimator(), &mut stats);
            sink.emit_noop().unwrap();
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
        assert_eq!(stats.instructions_count(), 3);
        assert_eq!(stats.per_op()["NOOP"].count, 2);
        assert_eq!(stats.per_op()["MATMUL"].cycles, 12);
        assert_eq!(stats.total_cycles(), 14);
    }

    #[test]
    fn test_stats_table_render() {
        let mut stats = Stats::default();
        stats.record("NOOP", &Estimate { cycles: 1, energy: 0.0 });
        let table = stats.to_string();
        assert!(table.contains("NOOP"));
        assert!(table.contains("total"));
    }
}
