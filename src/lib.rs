//! # Tessel - backend code generator for the TCU tensor accelerator
//!
//! The front-end graph compiler lowers a model into pre-scheduled LIR
//! *segments* keyed by (layer, stage, partition, kind). Tessel overlays
//! those segments across a sliding window of adjacent tiles so the
//! accelerator's hardware threads execute load, compute and save in
//! parallel, and emits the final linearized program as packed binary
//! instructions, with optional disassembly and cycle/energy statistics.
//!
//! ## Pipeline
//!
//! ```text
//! front end ──> Backend::mk_segment ──> emit LIR ──> finalize_segment
//!                                                        │
//!                                              sorted segment map
//!                                                        │
//!                              Backend::write_segments (overlay windows)
//!                                                        │
//!                        ┌───────────────┬───────────────┴─────────────┐
//!                   program binary   disassembly                 cycle stats
//! ```
//!
//! ## Design notes
//!
//! - Everything downstream of the scheduler implements [`lir::LirSink`];
//!   producers never know what is consuming the stream.
//! - The instruction bit layout is derived once from [`arch::Arch`] and
//!   shared by the generator, parser and disassembler.
//! - Emission is bit-deterministic: two runs over identical segments
//!   produce identical programs.
//!
//! ## Example
//!
//! ```no_run
//! use tessel::{Arch, Backend, SegmentKey, SegmentKind};
//! use tessel::lir::LirSink;
//! use tessel::isa::{MemoryAddress, MemoryTag};
//!
//! # fn main() -> tessel::Result<()> {
//! let mut backend = Backend::new(Arch::default())?;
//! let mut segment = backend.mk_segment(SegmentKey::new(0, 0, 0, SegmentKind::Compute))?;
//! segment.emit_matmul(
//!     false,
//!     1,
//!     MemoryAddress::bare(MemoryTag::Local, 0),
//!     1,
//!     MemoryAddress::bare(MemoryTag::Accumulator, 0),
//!     7,
//! )?;
//! backend.finalize_segment(segment)?;
//!
//! let mut program = Vec::new();
//! backend.write_segments(&mut program, None, None)?;
//! # Ok(())
//! # }
//! ```

pub mod arch;
pub mod backend;
pub mod estimate;
pub mod isa;
pub mod lir;
pub mod tracepoint;

mod error;

pub use arch::Arch;
pub use backend::{
    BalancePolicy, Backend, NoOpPadding, Segment, SegmentKey, SegmentKind, ThreadState,
};
pub use error::{CompilerError, Result};
pub use estimate::{Estimate, Estimator, Stats};
pub use isa::InstructionLayout;
pub use tracepoint::{SymbolResolver, TracepointCondition};
