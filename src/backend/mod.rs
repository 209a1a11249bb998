//! Backend - segment overlay scheduler and program emitter
//!
//! The front end fills segments keyed by (layer, stage, partition, kind);
//! `write_segments` walks them in key order, groups them into tiles, and
//! slides an overlay window across the tiles so distinct hardware threads
//! execute load/compute/save in parallel:
//!
//! ```text
//! window (W = 3):   [ tile i ] [ tile i+1 ] [ tile i+2 ]
//! emits               save        compute     init+load
//! thread               t(i)        t(i+1)       t(i+2)
//! ```
//!
//! With one hardware thread the window degenerates to a single tile and
//! emission is the plain init, load, compute, save order.
//!
//! Within a window, the thread with the fewest estimated cycles emits
//! next (stable tie-break by tid), Local addresses are rewritten by the
//! owning thread's bias, and the window ends with every active thread at
//! the same cycle count.

mod overlay;
mod segment;

pub use overlay::{BalancePolicy, NoOpPadding, ThreadSink, ThreadState};
pub use segment::{Segment, SegmentKey, SegmentKind};

use crate::arch::Arch;
use crate::error::{CompilerError, Result};
use crate::estimate::{Estimator, LirEstimator, Stats};
use crate::isa::InstructionLayout;
use crate::lir::{CombinedParser, LirBroadcast, LirGen, LirPrinter, LirSink};
use crate::tracepoint::TracepointCondition;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::rc::Rc;

/// Segments sharing one (layer, stage, partition), plus the hardware
/// thread the tile runs on. Ephemeral; built during `write_segments`.
struct Tile {
    tid: u8,
    init: Option<Rc<Segment>>,
    load: Option<Rc<Segment>>,
    compute: Option<Rc<Segment>>,
    save: Option<Rc<Segment>>,
}

impl Tile {
    fn empty() -> Self {
        Self {
            tid: 0,
            init: None,
            load: None,
            compute: None,
            save: None,
        }
    }
}

/// One hardware thread's logical stream within a window
struct ThreadStream {
    state: ThreadState,
    parser: CombinedParser<BufReader<File>>,
}

/// The backend code generator
pub struct Backend {
    arch: Arch,
    layout: InstructionLayout,
    estimator: Estimator,
    segments: BTreeMap<SegmentKey, Segment>,
    conditions: Vec<TracepointCondition>,
    balance: Box<dyn BalancePolicy>,
}

impl Backend {
    pub fn new(arch: Arch) -> Result<Self> {
        let layout = InstructionLayout::from_arch(&arch)?;
        let estimator = Estimator::new(&arch);
        Ok(Self {
            arch,
            layout,
            estimator,
            segments: BTreeMap::new(),
            conditions: Vec::new(),
            balance: Box::new(NoOpPadding),
        })
    }

    pub fn arch(&self) -> &Arch {
        &self.arch
    }

    pub fn layout(&self) -> &InstructionLayout {
        &self.layout
    }

    /// Replace the end-of-window cycle balancing policy.
    pub fn set_balance_policy(&mut self, policy: Box<dyn BalancePolicy>) {
        self.balance = policy;
    }

    /// Register a tracepoint condition; segments created afterwards
    /// inherit it.
    pub fn add_tracepoint_condition(&mut self, condition: TracepointCondition) {
        self.conditions.push(condition);
    }

    /// Create a segment backed by a fresh temp store.
    pub fn mk_segment(&self, key: SegmentKey) -> Result<Segment> {
        Segment::new(key, self.layout.clone(), self.conditions.clone(), None)
    }

    /// Same, with per-segment cost statistics enabled.
    pub fn mk_segment_with_stats(&self, key: SegmentKey) -> Result<Segment> {
        Segment::new(
            key,
            self.layout.clone(),
            self.conditions.clone(),
            Some(self.estimator.clone()),
        )
    }

    /// Seal a segment and insert it into the sorted map.
    pub fn finalize_segment(&mut self, mut segment: Segment) -> Result<()> {
        segment.close()?;
        let key = segment.key();
        if self.segments.contains_key(&key) {
            return Err(CompilerError::InvariantViolation(format!(
                "duplicate segment {}",
                key
            )));
        }
        log::debug!(
            "finalized segment {} ({} instructions)",
            key,
            segment.instructions_count()
        );
        self.segments.insert(key, segment);
        Ok(())
    }

    /// Emit the final linearized program.
    ///
    /// Consumes every finalized segment exactly once; their temp stores
    /// are released when this returns, on success and failure alike.
    /// Output streams are caller-owned and never closed. Returns the
    /// number of instructions written (segments plus inserted padding).
    pub fn write_segments<W: Write>(
        &mut self,
        mut program_out: W,
        printer_out: Option<&mut dyn Write>,
        stats: Option<&mut Stats>,
    ) -> Result<usize> {
        let window = match self.arch.threads {
            1 => 1usize,
            2 => 3usize,
            other => {
                return Err(CompilerError::Configuration(format!(
                    "unsupported thread count: {}",
                    other
                )))
            }
        };

        let segments = std::mem::take(&mut self.segments);
        let tiles = self.build_tiles(segments, window)?;

        let mut gen = LirGen::new(&mut program_out, self.layout.clone());
        let mut printer = printer_out.map(LirPrinter::new);
        let mut cost = stats.map(|s| LirEstimator::new(self.estimator.clone(), s));

        if !tiles.is_empty() {
            let windows = tiles.len() - (window - 1);
            for i in 0..windows {
                log::trace!("overlay window {}/{}", i + 1, windows);
                self.overlay_window(&tiles[i..i + window], &mut gen, &mut printer, &mut cost)?;
            }
        }

        let emitted = gen.instructions_count();
        log::debug!("emitted {} instructions", emitted);
        Ok(emitted)
    }

    /// Group segments into tiles, apply the init propagation rule, pad
    /// both ends with empty tiles and assign round-robin tids.
    fn build_tiles(
        &self,
        segments: BTreeMap<SegmentKey, Segment>,
        window: usize,
    ) -> Result<Vec<Tile>> {
        let threads = self.arch.threads as usize;
        let entries: Vec<(SegmentKey, Rc<Segment>)> = segments
            .into_iter()
            .map(|(key, segment)| (key, Rc::new(segment)))
            .collect();

        let mut real: Vec<Tile> = Vec::new();
        let mut i = 0;
        while i < entries.len() {
            let layer = entries[i].0.layer;
            let mut j = i;
            while j < entries.len() && entries[j].0.layer == layer {
                j += 1;
            }

            let layer_init: Vec<&Rc<Segment>> = entries[i..j]
                .iter()
                .filter(|(key, _)| key.kind == SegmentKind::Init)
                .map(|(_, segment)| segment)
                .collect();
            if layer_init.len() > 1 {
                return Err(CompilerError::InvariantViolation(format!(
                    "layer {} has {} init segments",
                    layer,
                    layer_init.len()
                )));
            }
            let layer_init = layer_init.first().map(|s| (*s).clone());

            let mut k = i;
            let mut tile_index = 0usize;
            while k < j {
                let (stage, partition) = (entries[k].0.stage, entries[k].0.partition);
                let mut tile = Tile::empty();
                while k < j && entries[k].0.stage == stage && entries[k].0.partition == partition {
                    let (key, segment) = &entries[k];
                    if key.kind == SegmentKind::Init && tile_index != 0 {
                        return Err(CompilerError::InvariantViolation(format!(
                            "init segment {} is not at the start of its layer",
                            key
                        )));
                    }
                    match key.kind {
                        SegmentKind::Init => {}
                        SegmentKind::Load => tile.load = Some(segment.clone()),
                        SegmentKind::Compute => tile.compute = Some(segment.clone()),
                        SegmentKind::Save => tile.save = Some(segment.clone()),
                    }
                    k += 1;
                }
                // Init runs once per active thread at the start of a
                // layer: the first `threads` tiles share the layer's
                // init segment, later tiles skip it.
                if tile_index < threads {
                    tile.init = layer_init.clone();
                }
                real.push(tile);
                tile_index += 1;
            }
            i = j;
        }

        if real.is_empty() {
            return Ok(Vec::new());
        }

        let pad = window - 1;
        let mut tiles = Vec::with_capacity(real.len() + 2 * pad);
        for _ in 0..pad {
            tiles.push(Tile::empty());
        }
        tiles.extend(real);
        for _ in 0..pad {
            tiles.push(Tile::empty());
        }
        // Round-robin with period `threads`, advancing for padding tiles
        // too, so the assignment is a pure function of creation order.
        for (index, tile) in tiles.iter_mut().enumerate() {
            tile.tid = (index % threads) as u8;
        }
        Ok(tiles)
    }

    /// Emit one overlay window.
    fn overlay_window<W: Write>(
        &self,
        window: &[Tile],
        gen: &mut LirGen<&mut W>,
        printer: &mut Option<LirPrinter<&mut dyn Write>>,
        cost: &mut Option<LirEstimator<'_>>,
    ) -> Result<()> {
        // Contributing (tid, segment) pairs, in this order. With W = 3
        // the window pipelines three adjacent tiles; with W = 1 it is
        // plain serial emission.
        let slots: [(u8, Option<&Rc<Segment>>); 4] = if window.len() == 3 {
            [
                (window[0].tid, window[0].save.as_ref()),
                (window[2].tid, window[2].init.as_ref()),
                (window[2].tid, window[2].load.as_ref()),
                (window[1].tid, window[1].compute.as_ref()),
            ]
        } else {
            [
                (window[0].tid, window[0].init.as_ref()),
                (window[0].tid, window[0].load.as_ref()),
                (window[0].tid, window[0].compute.as_ref()),
                (window[0].tid, window[0].save.as_ref()),
            ]
        };
        let pairs: Vec<(u8, &Rc<Segment>)> = slots
            .into_iter()
            .filter_map(|(tid, segment)| segment.map(|s| (tid, s)))
            .collect();

        // One logical parser per active tid, slot streams concatenated
        // in the order listed above.
        let thread_local_depth = self.arch.thread_local_depth();
        let mut streams: Vec<ThreadStream> = Vec::new();
        for tid in 0..self.arch.threads as u8 {
            let mut parser = CombinedParser::new();
            for (pair_tid, segment) in &pairs {
                if *pair_tid == tid {
                    parser.push(
                        Some(format!("TID {}: {}", tid, segment.key())),
                        segment.open_reader()?,
                    );
                }
            }
            if parser.has_next() {
                streams.push(ThreadStream {
                    state: ThreadState::new(tid, thread_local_depth),
                    parser,
                });
            }
        }

        // Least-cycles interleaving, stable tie-break by tid.
        loop {
            let mut pick: Option<usize> = None;
            for (index, stream) in streams.iter().enumerate() {
                if !stream.parser.has_next() {
                    continue;
                }
                pick = match pick {
                    None => Some(index),
                    Some(best) => {
                        let b = &streams[best];
                        if (stream.state.cycles, stream.state.tid)
                            < (b.state.cycles, b.state.tid)
                        {
                            Some(index)
                        } else {
                            Some(best)
                        }
                    }
                };
            }
            let index = match pick {
                Some(index) => index,
                None => break,
            };

            let stream = &mut streams[index];
            if let Some(label) = stream.parser.take_label() {
                if let Some(p) = printer.as_mut() {
                    p.comment(&label)?;
                }
            }

            let state = &mut stream.state;
            let parser = &mut stream.parser;
            let mut sinks: Vec<&mut dyn LirSink> = Vec::with_capacity(3);
            sinks.push(&mut *gen);
            if let Some(p) = printer.as_mut() {
                sinks.push(p);
            }
            if let Some(c) = cost.as_mut() {
                sinks.push(c);
            }
            let mut fanout = LirBroadcast::new(sinks);
            let mut sink = ThreadSink::new(state, &self.estimator, &mut fanout);
            parser.parse_next(&mut sink)?;
        }

        // All active threads leave the window with equal cycle counts.
        let mut states: Vec<ThreadState> = streams.into_iter().map(|s| s.state).collect();
        if states.is_empty() {
            return Ok(());
        }
        let mut sinks: Vec<&mut dyn LirSink> = Vec::with_capacity(3);
        sinks.push(&mut *gen);
        if let Some(p) = printer.as_mut() {
            sinks.push(p);
        }
        if let Some(c) = cost.as_mut() {
            sinks.push(c);
        }
        let mut fanout = LirBroadcast::new(sinks);
        self.balance
            .balance(&self.estimator, &mut states, &mut fanout)
    }
}
