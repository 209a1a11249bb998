//! LirPrinter - human-readable disassembly sink
//!
//! One line per instruction, `\r\n` terminated, never consulted for
//! program bytes. Addresses print with their tag prefix, strides as a
//! `*n` suffix, flags as a letter group after the mnemonic:
//!
//! ```text
//! ; TID 0: 0/0/0/compute
//! MATMUL(A)   L10*1, A0*1, 4
//! DATAMOVE(D0>L) L0*1, D0:128*2, 8
//! SIMD(RW)    MAX 1, 0, 1, A4, A2
//! NOOP
//! ```

use crate::error::Result;
use crate::isa::{DataMoveKind, MemoryAddress, MemoryTag, Opcode, SimdOp};
use crate::lir::LirSink;
use std::io::Write;

pub struct LirPrinter<W: Write> {
    writer: W,
}

impl<W: Write> LirPrinter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a `; ...` comment line (segment headers, diagnostics).
    pub fn comment(&mut self, text: &str) -> Result<()> {
        write!(self.writer, "; {}\r\n", text)?;
        Ok(())
    }

    fn line(&mut self, head: String, operands: String) -> Result<()> {
        if operands.is_empty() {
            write!(self.writer, "{}\r\n", head)?;
        } else {
            write!(self.writer, "{:<12}{}\r\n", head, operands)?;
        }
        Ok(())
    }
}

fn head(opcode: Opcode, letters: &str) -> String {
    if letters.is_empty() {
        opcode.mnemonic().to_string()
    } else {
        format!("{}({})", opcode.mnemonic(), letters)
    }
}

impl<W: Write> LirSink for LirPrinter<W> {
    fn emit_noop(&mut self) -> Result<()> {
        self.line(head(Opcode::NOOP, ""), String::new())
    }

    fn emit_wait(&mut self, tid: u8) -> Result<()> {
        self.line(head(Opcode::WAIT, ""), format!("T{}", tid))
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
        let letters = if accumulate { "A" } else { "" };
        self.line(
            head(Opcode::MATMUL, letters),
            format!(
                "{}*{}, {}*{}, {}",
                local, local_stride, acc, acc_stride, size
            ),
        )
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
        let mut letters = String::new();
        if read_acc.tag == MemoryTag::Accumulator {
            letters.push('R');
        }
        if write_acc.tag == MemoryTag::Accumulator {
            letters.push('W');
        }
        if accumulate {
            letters.push('A');
        }
        self.line(
            head(Opcode::SIMD, &letters),
            format!(
                "{} {}, {}, {}, {}, {}",
                op, left, right, dest, write_acc, read_acc
            ),
        )
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
        self.line(
            head(Opcode::DATA_MOVE, kind.mnemonic()),
            format!("{}*{}, {}*{}, {}", local, local_stride, addr, stride, size),
        )
    }

    fn emit_load_weights(
        &mut self,
        local_stride: u64,
        local: MemoryAddress,
        size: u64,
    ) -> Result<()> {
        self.line(
            head(Opcode::LOAD_WEIGHTS, ""),
            format!("{}*{}, {}", local, local_stride, size),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::MemoryTag;

    fn printed(f: impl FnOnce(&mut LirPrinter<&mut Vec<u8>>)) -> String {
        let mut buf = Vec::new();
        let mut printer = LirPrinter::new(&mut buf);
        f(&mut printer);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_lines_are_crlf_terminated() {
        let out = printed(|p| {
            p.emit_noop().unwrap();
            p.emit_wait(1).unwrap();
        });
        assert_eq!(out, "NOOP\r\nWAIT        T1\r\n");
    }

    #[test]
    fn test_matmul_line() {
        let out = printed(|p| {
            p.emit_matmul(
                true,
                1,
                MemoryAddress::bare(MemoryTag::Local, 10),
                1,
                MemoryAddress::bare(MemoryTag::Accumulator, 0),
                4,
            )
            .unwrap();
        });
        assert_eq!(out, "MATMUL(A)   L10*1, A0*1, 4\r\n");
    }

    #[test]
    fn test_data_move_kind_in_head() {
        let out = printed(|p| {
            p.emit_data_move(
                true,
                false,
                1,
                MemoryAddress::bare(MemoryTag::Local, 0),
                2,
                MemoryAddress::bare(MemoryTag::Dram0, 128),
                8,
            )
            .unwrap();
        });
        assert!(out.starts_with("DATAMOVE(D0>L)"));
        assert!(out.contains("D0:128*2"));
    }

    #[test]
    fn test_comment() {
        let out = printed(|p| p.comment("TID 0: 0/0/0/compute").unwrap());
        assert_eq!(out, "; TID 0: 0/0/0/compute\r\n");
    }
}
