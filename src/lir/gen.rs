//! LirGen - serializes LIR operations to packed binary instructions
//!
//! Every operation becomes exactly `layout.instruction_bytes` bytes with
//! no framing between instructions. Operands are validated against their
//! field widths before anything is written, so an encoding failure leaves
//! the output ending at the last valid instruction.

use crate::error::{CompilerError, Result};
use crate::isa::bits::BitWriter;
use crate::isa::{
    load_weights_flags, matmul_flags, simd_flags, DataMoveKind, InstructionLayout, MemoryAddress,
    MemoryTag, Opcode, SimdOp, FLAGS_BITS, OPCODE_BITS, SIMD_OP_BITS,
};
use crate::lir::LirSink;
use std::io::Write;

/// Binary instruction generator over any byte sink
pub struct LirGen<W: Write> {
    writer: W,
    layout: InstructionLayout,
    instructions: usize,
}

impl<W: Write> LirGen<W> {
    pub fn new(writer: W, layout: InstructionLayout) -> Self {
        Self {
            writer,
            layout,
            instructions: 0,
        }
    }

    /// Instructions emitted so far
    pub fn instructions_count(&self) -> usize {
        self.instructions
    }

    pub fn layout(&self) -> &InstructionLayout {
        &self.layout
    }

    /// Recover the underlying writer (used to seal segment stores)
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn stride_exponent(&self, stride: u64, operand: &str) -> Result<u64> {
        if stride == 0 || !stride.is_power_of_two() {
            return Err(CompilerError::Encoding(format!(
                "{} stride must be a power of two, got {}",
                operand, stride
            )));
        }
        let exp = stride.trailing_zeros() as u64;
        if exp >= 1 << self.layout.stride_bits {
            return Err(CompilerError::Encoding(format!(
                "{} stride {} exceeds {} exponent bits",
                operand, stride, self.layout.stride_bits
            )));
        }
        Ok(exp)
    }

    fn checked_raw(&self, addr: &MemoryAddress, operand: &str) -> Result<u64> {
        let bits = self.layout.address_bits(addr.tag);
        if bits == 0 {
            if addr.raw != 0 {
                return Err(CompilerError::Encoding(format!(
                    "{} zero-space address must have raw 0, got {}",
                    operand, addr.raw
                )));
            }
            return Ok(0);
        }
        if addr.raw >> bits != 0 {
            return Err(CompilerError::Encoding(format!(
                "{} address {} exceeds {} bits for {:?}",
                operand, addr.raw, bits, addr.tag
            )));
        }
        Ok(addr.raw)
    }

    fn checked_size(&self, size: u64) -> Result<u64> {
        let bits = self.layout.size_bits();
        if bits < 64 && size >> bits != 0 {
            return Err(CompilerError::Encoding(format!(
                "size {} exceeds {} bits",
                size, bits
            )));
        }
        Ok(size)
    }

    /// Combine a stride exponent and address into an operand field.
    fn addr_operand(
        &self,
        stride: u64,
        addr: &MemoryAddress,
        addr_bits: u32,
        operand: &str,
    ) -> Result<u64> {
        let exp = self.stride_exponent(stride, operand)?;
        let raw = self.checked_raw(addr, operand)?;
        Ok((exp << addr_bits) | raw)
    }

    fn emit(&mut self, opcode: Opcode, flags: u8, op0: u64, op1: u64, op2: u64) -> Result<()> {
        let mut w = BitWriter::new(self.layout.instruction_bytes);
        w.put(opcode.0 as u64, OPCODE_BITS);
        w.put(flags as u64, FLAGS_BITS);
        w.put(op0, self.layout.operand0_bits);
        w.put(op1, self.layout.operand1_bits);
        w.put(op2, self.layout.operand2_bits);
        self.writer.write_all(&w.into_bytes())?;
        self.instructions += 1;
        Ok(())
    }
}

impl<W: Write> LirSink for LirGen<W> {
    fn emit_noop(&mut self) -> Result<()> {
        self.emit(Opcode::NOOP, 0, 0, 0, 0)
    }

    fn emit_wait(&mut self, tid: u8) -> Result<()> {
        self.emit(Opcode::WAIT, 0, tid as u64, 0, 0)
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
        let mut flags = 0u8;
        if accumulate {
            flags |= matmul_flags::ACCUMULATE;
        }
        match local.tag {
            MemoryTag::Local => {}
            MemoryTag::Zero => flags |= matmul_flags::ZEROES,
            tag => {
                return Err(CompilerError::Encoding(format!(
                    "matmul local operand must be Local or Zero, got {:?}",
                    tag
                )))
            }
        }
        if acc.tag != MemoryTag::Accumulator {
            return Err(CompilerError::Encoding(format!(
                "matmul accumulator operand must be Accumulator, got {:?}",
                acc.tag
            )));
        }
        let op0 = self.addr_operand(
            local_stride,
            &local,
            self.layout.operand0_addr_bits(),
            "matmul local",
        )?;
        let op1 = self.addr_operand(
            acc_stride,
            &acc,
            self.layout.operand1_addr_bits(),
            "matmul accumulator",
        )?;
        let op2 = self.checked_size(size)?;
        self.emit(Opcode::MATMUL, flags, op0, op1, op2)
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
        if !op.is_valid() {
            return Err(CompilerError::Encoding(format!(
                "unknown SIMD op {:#x}",
                op.0
            )));
        }
        let reg_bits = self.layout.simd_reg_bits;
        for (name, reg) in [("left", left), ("right", right), ("dest", dest)] {
            if (reg as u64) >> reg_bits != 0 {
                return Err(CompilerError::Encoding(format!(
                    "SIMD {} selector {} exceeds {} bits",
                    name, reg, reg_bits
                )));
            }
        }

        let mut flags = 0u8;
        if accumulate {
            flags |= simd_flags::ACCUMULATE;
        }
        let op0 = match write_acc.tag {
            MemoryTag::Accumulator => {
                flags |= simd_flags::WRITE;
                self.checked_raw(&write_acc, "SIMD write")?
            }
            MemoryTag::Zero => self.checked_raw(&write_acc, "SIMD write")?,
            tag => {
                return Err(CompilerError::Encoding(format!(
                    "SIMD write operand must be Accumulator or Zero, got {:?}",
                    tag
                )))
            }
        };
        let op1 = match read_acc.tag {
            MemoryTag::Accumulator => {
                flags |= simd_flags::READ;
                self.checked_raw(&read_acc, "SIMD read")?
            }
            MemoryTag::Zero => self.checked_raw(&read_acc, "SIMD read")?,
            tag => {
                return Err(CompilerError::Encoding(format!(
                    "SIMD read operand must be Accumulator or Zero, got {:?}",
                    tag
                )))
            }
        };
        let op2 = op.0 as u64
            | (left as u64) << SIMD_OP_BITS
            | (right as u64) << (SIMD_OP_BITS + reg_bits)
            | (dest as u64) << (SIMD_OP_BITS + 2 * reg_bits);
        self.emit(Opcode::SIMD, flags, op0, op1, op2)
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
        if local.tag != MemoryTag::Local {
            return Err(CompilerError::Encoding(format!(
                "data move local operand must be Local, got {:?}",
                local.tag
            )));
        }
        let kind = DataMoveKind::from_parts(to_local, accumulate, addr.tag)?;
        let op0 = self.addr_operand(
            local_stride,
            &local,
            self.layout.operand0_addr_bits(),
            "data move local",
        )?;
        let op1 = self.addr_operand(stride, &addr, self.layout.operand1_addr_bits(), "data move")?;
        let op2 = self.checked_size(size)?;
        self.emit(Opcode::DATA_MOVE, kind.flags(), op0, op1, op2)
    }

    fn emit_load_weights(
        &mut self,
        local_stride: u64,
        local: MemoryAddress,
        size: u64,
    ) -> Result<()> {
        let mut flags = 0u8;
        match local.tag {
            MemoryTag::Local => {}
            MemoryTag::Zero => flags |= load_weights_flags::ZEROES,
            tag => {
                return Err(CompilerError::Encoding(format!(
                    "load weights operand must be Local or Zero, got {:?}",
                    tag
                )))
            }
        }
        let op0 = self.addr_operand(
            local_stride,
            &local,
            self.layout.operand0_addr_bits(),
            "load weights",
        )?;
        let op2 = self.checked_size(size)?;
        self.emit(Opcode::LOAD_WEIGHTS, flags, op0, 0, op2)
    }
}
