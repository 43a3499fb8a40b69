//! Runtime support code emitted into every image.
//!
//! The generated program has no libc. Everything it needs beyond inline
//! primitives is emitted here: the entry sequence that points `rbx` at the
//! data stack, the `exit` syscall sequence, and the routine behind `.`.

use log::debug;

use crate::core::code_buffer::CodeOffset;
use crate::core::error::CompileResult;

use super::encoder::{AluOp, JumpCondition, Mem, X64Encoder};
use super::registers::{AsmReg, DSP};

pub const SYS_WRITE: u32 = 1;
pub const SYS_EXIT: u32 = 60;

/// Size of the scratch buffer `.` formats into. A signed 64-bit value needs
/// at most 19 digits, a sign and the trailing space.
const NUMBER_BUFFER: i32 = 32;

/// Offsets of the shared routines in the code buffer.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeRoutines {
    pub print_number: CodeOffset,
}

impl RuntimeRoutines {
    /// Emit every shared routine at the current position.
    pub fn emit(enc: &mut X64Encoder) -> CompileResult<Self> {
        let print_number = emit_print_number(enc)?;
        debug!("runtime: print_number at {print_number}");
        Ok(Self { print_number })
    }
}

/// `mov rbx, stack_top`
pub fn emit_entry(enc: &mut X64Encoder, stack_top: u64) {
    enc.mov_reg_imm(DSP, stack_top as i64);
}

/// exit(status)
pub fn emit_exit(enc: &mut X64Encoder, status: u32) {
    enc.mov32_reg_imm(AsmReg::RAX, SYS_EXIT);
    enc.mov32_reg_imm(AsmReg::RDI, status);
    enc.syscall();
}

/// Pops the top cell from the spilled data stack and writes it as signed
/// decimal followed by one space.
///
/// Digits are produced least significant first into a buffer carved out of
/// the hardware stack, walking `rsi` downwards, so the finished text starts
/// at `rsi`. The magnitude is divided unsigned, which keeps `i64::MIN`
/// correct after `neg`.
fn emit_print_number(enc: &mut X64Encoder) -> CompileResult<CodeOffset> {
    let start = enc.offset();
    let buffer_end = Mem::offset(AsmReg::RSP, NUMBER_BUFFER);

    // rax = value, r8 = copy for the sign
    enc.mov_reg_mem(AsmReg::RAX, Mem::base(DSP));
    enc.add_reg_imm(DSP, 8);
    enc.mov_reg_reg(AsmReg::R8, AsmReg::RAX);

    enc.sub_reg_imm(AsmReg::RSP, NUMBER_BUFFER);
    enc.lea(AsmReg::RSI, buffer_end);
    store_char(enc, b' ');

    enc.test_reg_reg(AsmReg::RAX, AsmReg::RAX);
    let non_negative = enc.jcc_placeholder(JumpCondition::NotSign);
    enc.neg_reg(AsmReg::RAX);
    enc.patch_rel32(non_negative, enc.offset())?;

    enc.mov32_reg_imm(AsmReg::RCX, 10);
    let digit_loop = enc.offset();
    enc.mov32_reg_imm(AsmReg::RDX, 0);
    enc.div_reg(AsmReg::RCX);
    enc.add_reg_imm(AsmReg::RDX, i32::from(b'0'));
    enc.dec_reg(AsmReg::RSI);
    enc.mov8_mem_reg(Mem::base(AsmReg::RSI), AsmReg::RDX);
    enc.test_reg_reg(AsmReg::RAX, AsmReg::RAX);
    enc.jcc_to(JumpCondition::NotEqual, digit_loop)?;

    enc.test_reg_reg(AsmReg::R8, AsmReg::R8);
    let unsigned = enc.jcc_placeholder(JumpCondition::NotSign);
    store_char(enc, b'-');
    enc.patch_rel32(unsigned, enc.offset())?;

    // write(1, rsi, end - rsi)
    enc.lea(AsmReg::RDX, buffer_end);
    enc.alu_reg_reg(AluOp::Sub, AsmReg::RDX, AsmReg::RSI);
    enc.mov32_reg_imm(AsmReg::RAX, SYS_WRITE);
    enc.mov32_reg_imm(AsmReg::RDI, 1);
    enc.syscall();

    enc.add_reg_imm(AsmReg::RSP, NUMBER_BUFFER);
    enc.ret();
    Ok(start)
}

/// `dec rsi; mov byte [rsi], cl`
fn store_char(enc: &mut X64Encoder, ch: u8) {
    enc.dec_reg(AsmReg::RSI);
    enc.mov32_reg_imm(AsmReg::RCX, u32::from(ch));
    enc.mov8_mem_reg(Mem::base(AsmReg::RSI), AsmReg::RCX);
}
