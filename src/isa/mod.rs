//! TCU instruction set architecture
//!
//! Describes what the accelerator executes: six opcodes over four memory
//! spaces, packed into fixed-width bitfield instructions whose field
//! widths derive from the architecture descriptor.
//!
//! ```text
//! [OPCODE:4][FLAGS:4][OPERAND0][OPERAND1][OPERAND2]
//! ```
//!
//! The layer is pure data and encoding rules; emission lives in `lir`.

pub(crate) mod bits;

mod address;
mod layout;
mod opcode;

pub use address::{MemoryAddress, MemoryRef, MemoryTag};
pub use layout::{InstructionLayout, FLAGS_BITS, OPCODE_BITS, SIMD_OP_BITS};
pub use opcode::{load_weights_flags, matmul_flags, simd_flags, DataMoveKind, Opcode, SimdOp};
