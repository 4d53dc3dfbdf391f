//! Lima: a fixed-width 32-bit demo ISA, big-endian instruction stream.
//!
//! The decoder, assembler and printer are generated at build time from
//! `lima.td`.

use core::fmt;

mod generated {
    use crate::{reg, reg_bits, Reg};

    include!(concat!(env!("OUT_DIR"), "/generated.rs"));
}

pub use self::generated::{
    assemble_instruction, disassemble_instruction, Instruction, INSN_WIDTH,
};

/// A general purpose register operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Reg(pub u16);

impl fmt::Display for Reg {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "r{}", self.0)
    }
}

pub(crate) fn reg(bits: u64) -> Reg {
    Reg(bits as u16)
}

pub(crate) fn reg_bits(reg: Reg) -> u64 {
    reg.0 as u64
}
