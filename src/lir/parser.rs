//! LirParser - replays serialized segments into any LIR sink
//!
//! Framing is positional: the instruction count is carried alongside the
//! byte stream, and each `parse_next` consumes exactly one fixed-width
//! instruction. Decoding reverses the generator bit-exactly, except that
//! symbolic references are not on the wire, so parsed addresses carry
//! `MemoryRef::NONE`.

use crate::error::{CompilerError, Result};
use crate::isa::bits::BitReader;
use crate::isa::{
    load_weights_flags, matmul_flags, simd_flags, DataMoveKind, InstructionLayout, MemoryAddress,
    MemoryTag, Opcode, SimdOp, FLAGS_BITS, OPCODE_BITS, SIMD_OP_BITS,
};
use crate::lir::LirSink;
use std::collections::VecDeque;
use std::io::Read;

pub struct LirParser<R: Read> {
    reader: R,
    layout: InstructionLayout,
    remaining: usize,
}

impl<R: Read> LirParser<R> {
    pub fn new(reader: R, layout: InstructionLayout, instructions: usize) -> Self {
        Self {
            reader,
            layout,
            remaining: instructions,
        }
    }

    pub fn has_next(&self) -> bool {
        self.remaining > 0
    }

    /// Consume one instruction and invoke the matching emit on `sink`.
    pub fn parse_next(&mut self, sink: &mut dyn LirSink) -> Result<()> {
        if self.remaining == 0 {
            return Err(CompilerError::InvariantViolation(
                "parse_next on exhausted parser".to_string(),
            ));
        }
        let mut buf = vec![0u8; self.layout.instruction_bytes];
        self.reader.read_exact(&mut buf)?;
        self.remaining -= 1;

        let mut r = BitReader::new(&buf);
        let opcode = Opcode(r.take(OPCODE_BITS) as u8);
        let flags = r.take(FLAGS_BITS) as u8;
        let op0 = r.take(self.layout.operand0_bits);
        let op1 = r.take(self.layout.operand1_bits);
        let op2 = r.take(self.layout.operand2_bits);

        match opcode {
            Opcode::NOOP => sink.emit_noop(),
            Opcode::WAIT => sink.emit_wait(op0 as u8),
            Opcode::MATMUL => {
                let (local_stride, local_raw) = split(op0, self.layout.operand0_addr_bits());
                let local = if flags & matmul_flags::ZEROES != 0 {
                    MemoryAddress::ZERO
                } else {
                    MemoryAddress::bare(MemoryTag::Local, local_raw)
                };
                let (acc_stride, acc_raw) = split(op1, self.layout.operand1_addr_bits());
                sink.emit_matmul(
                    flags & matmul_flags::ACCUMULATE != 0,
                    local_stride,
                    local,
                    acc_stride,
                    MemoryAddress::bare(MemoryTag::Accumulator, acc_raw),
                    op2,
                )
            }
            Opcode::DATA_MOVE => {
                let kind = DataMoveKind::from_flags(flags)?;
                let (local_stride, local_raw) = split(op0, self.layout.operand0_addr_bits());
                let (stride, raw) = split(op1, self.layout.operand1_addr_bits());
                sink.emit_data_move(
                    kind.to_local(),
                    kind.accumulate(),
                    local_stride,
                    MemoryAddress::bare(MemoryTag::Local, local_raw),
                    stride,
                    MemoryAddress::bare(kind.tag(), raw),
                    op2,
                )
            }
            Opcode::LOAD_WEIGHTS => {
                let (local_stride, local_raw) = split(op0, self.layout.operand0_addr_bits());
                let local = if flags & load_weights_flags::ZEROES != 0 {
                    MemoryAddress::ZERO
                } else {
                    MemoryAddress::bare(MemoryTag::Local, local_raw)
                };
                sink.emit_load_weights(local_stride, local, op2)
            }
            Opcode::SIMD => {
                let write_acc = if flags & simd_flags::WRITE != 0 {
                    MemoryAddress::bare(MemoryTag::Accumulator, mask(op0, &self.layout))
                } else {
                    MemoryAddress::ZERO
                };
                let read_acc = if flags & simd_flags::READ != 0 {
                    MemoryAddress::bare(MemoryTag::Accumulator, mask(op1, &self.layout))
                } else {
                    MemoryAddress::ZERO
                };
                let reg_bits = self.layout.simd_reg_bits;
                let reg_mask = (1u64 << reg_bits) - 1;
                let op = SimdOp((op2 & ((1 << SIMD_OP_BITS) - 1)) as u8);
                if !op.is_valid() {
                    return Err(CompilerError::Encoding(format!(
                        "unknown SIMD op {:#x}",
                        op.0
                    )));
                }
                let left = (op2 >> SIMD_OP_BITS) & reg_mask;
                let right = (op2 >> (SIMD_OP_BITS + reg_bits)) & reg_mask;
                let dest = (op2 >> (SIMD_OP_BITS + 2 * reg_bits)) & reg_mask;
                sink.emit_simd(
                    flags & simd_flags::ACCUMULATE != 0,
                    op,
                    left as u8,
                    right as u8,
                    dest as u8,
                    write_acc,
                    read_acc,
                )
            }
            other => Err(CompilerError::Encoding(format!(
                "unknown opcode {:#x}",
                other.0
            ))),
        }
    }
}

/// Split an operand field into `(stride, raw address)`.
fn split(operand: u64, addr_bits: u32) -> (u64, u64) {
    let raw = operand & ((1u64 << addr_bits) - 1);
    let exp = operand >> addr_bits;
    (1u64 << exp, raw)
}

fn mask(operand: u64, layout: &InstructionLayout) -> u64 {
    operand & ((1u64 << layout.accumulator_bits) - 1)
}

/// Concatenates several parsers into one logical stream.
///
/// Streams drain in push order. Each part may carry a label; the label is
/// surfaced once, just before the part's first instruction is drawn, so
/// the backend can write segment-boundary comments into the disassembly.
pub struct CombinedParser<R: Read> {
    parts: VecDeque<Part<R>>,
}

struct Part<R: Read> {
    label: Option<String>,
    parser: LirParser<R>,
}

impl<R: Read> CombinedParser<R> {
    pub fn new() -> Self {
        Self {
            parts: VecDeque::new(),
        }
    }

    pub fn push(&mut self, label: Option<String>, parser: LirParser<R>) {
        self.parts.push_back(Part { label, parser });
    }

    pub fn has_next(&self) -> bool {
        self.parts.iter().any(|p| p.parser.has_next())
    }

    fn skip_drained(&mut self) {
        while matches!(self.parts.front(), Some(p) if !p.parser.has_next()) {
            self.parts.pop_front();
        }
    }

    /// Label of the part about to emit, surfaced at most once.
    pub fn take_label(&mut self) -> Option<String> {
        self.skip_drained();
        self.parts.front_mut()?.label.take()
    }

    pub fn parse_next(&mut self, sink: &mut dyn LirSink) -> Result<()> {
        self.skip_drained();
        let part = self.parts.front_mut().ok_or_else(|| {
            CompilerError::InvariantViolation("parse_next on exhausted parser".to_string())
        })?;
        part.parser.parse_next(sink)
    }
}

impl<R: Read> Default for CombinedParser<R> {
    fn default() -> Self {
        Self::new()
    }
}
