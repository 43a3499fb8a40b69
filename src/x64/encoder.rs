// This module is the machine code generator of fifthc. X64Encoder writes x86-64
// instructions byte by byte into a CodeBuffer: it assembles REX prefixes, opcode
// bytes, ModR/M and SIB bytes, displacements and immediates itself, without an
// external assembler. It covers exactly the instruction forms the primitive
// encoders and runtime routines need: register and memory moves (64-bit and byte
// sized), integer arithmetic and bitwise operations, shifts by CL, signed and
// unsigned division, comparisons with SETcc materialization and CMOVcc selection,
// stack push/pop, and rel32 control transfers. Control transfers come in two flavours: a placeholder
// form that returns the patch site of its 4-byte displacement (for forward jumps
// resolved later through the fixup stack) and a form taking an already known
// target (for backward branches and calls to defined words).

//! x86-64 instruction encoding.
//!
//! ```text
//! [REX] [Opcode] [ModR/M] [SIB] [Disp] [Imm]
//! ```

use crate::core::code_buffer::{CodeBuffer, CodeOffset};
use crate::core::error::CompileResult;

use super::registers::AsmReg;

/// Condition codes for Jcc and SETcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpCondition {
    Overflow,
    Equal,
    NotEqual,
    Less,
    Greater,
    Sign,
    NotSign,
}

impl JumpCondition {
    /// Low nibble shared by `0F 40+cc`, `0F 80+cc` and `0F 90+cc`.
    pub const fn cc(self) -> u8 {
        match self {
            JumpCondition::Overflow => 0x0,
            JumpCondition::Equal => 0x4,
            JumpCondition::NotEqual => 0x5,
            JumpCondition::Sign => 0x8,
            JumpCondition::NotSign => 0x9,
            JumpCondition::Less => 0xC,
            JumpCondition::Greater => 0xF,
        }
    }
}

/// Memory operand `[base + disp]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mem {
    pub base: AsmReg,
    pub disp: i32,
}

impl Mem {
    pub const fn base(base: AsmReg) -> Self {
        Self { base, disp: 0 }
    }

    pub const fn offset(base: AsmReg, disp: i32) -> Self {
        Self { base, disp }
    }
}

/// Group-1 ALU operations sharing the `op r/m64, r64` and `81/83 /ext` forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Or,
    And,
    Sub,
    Xor,
    Cmp,
}

impl AluOp {
    const fn ext(self) -> u8 {
        match self {
            AluOp::Add => 0,
            AluOp::Or => 1,
            AluOp::And => 4,
            AluOp::Sub => 5,
            AluOp::Xor => 6,
            AluOp::Cmp => 7,
        }
    }

    /// `op r/m64, r64` opcode.
    const fn rm_reg_opcode(self) -> u8 {
        (self.ext() << 3) | 0x01
    }

    /// `op r64, r/m64` opcode.
    const fn reg_rm_opcode(self) -> u8 {
        (self.ext() << 3) | 0x03
    }
}

/// Shifts by `cl` (`D3 /ext`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Shl,
    Shr,
}

impl ShiftOp {
    const fn ext(self) -> u8 {
        match self {
            ShiftOp::Shl => 4,
            ShiftOp::Shr => 5,
        }
    }
}

/// x86-64 instruction encoder writing into a [`CodeBuffer`].
#[derive(Debug, Default)]
pub struct X64Encoder {
    buf: CodeBuffer,
}

impl X64Encoder {
    pub fn new() -> Self {
        Self {
            buf: CodeBuffer::new(),
        }
    }

    pub fn offset(&self) -> CodeOffset {
        self.buf.offset()
    }

    pub fn code(&self) -> &[u8] {
        self.buf.code()
    }

    pub fn into_code(self) -> Vec<u8> {
        self.buf.into_code()
    }

    /// Resolve a placeholder returned by one of the `*_placeholder` methods.
    pub fn patch_rel32(&mut self, site: CodeOffset, target: CodeOffset) -> CompileResult<()> {
        self.buf.patch_rel32(site, target)
    }

    // ==== PREFIX / MODRM HELPERS ====

    /// Emit a REX prefix when any of W, R, B is needed or `force` is set.
    fn rex(&mut self, w: bool, reg: AsmReg, rm: AsmReg, force: bool) {
        let byte = 0x40
            | ((w as u8) << 3)
            | ((reg.is_extended() as u8) << 2)
            | (rm.is_extended() as u8);
        if byte != 0x40 || force {
            self.buf.emit_u8(byte);
        }
    }

    fn modrm_reg(&mut self, reg_field: u8, rm: AsmReg) {
        self.buf
            .emit_u8(0xC0 | ((reg_field & 7) << 3) | rm.low_bits());
    }

    fn modrm_mem(&mut self, reg_field: u8, mem: Mem) {
        let base = mem.base.low_bits();
        let reg = (reg_field & 7) << 3;

        // rbp/r13 cannot use mod=00 (that slot means rip-relative).
        let (mode, disp8) = if mem.disp == 0 && base != 5 {
            (0b00, None)
        } else if let Ok(d) = i8::try_from(mem.disp) {
            (0b01, Some(d))
        } else {
            (0b10, None)
        };

        self.buf.emit_u8((mode << 6) | reg | base);
        // rsp/r12 as base require a SIB byte with no index.
        if base == 4 {
            self.buf.emit_u8(0x24);
        }
        match (mode, disp8) {
            (0b01, Some(d)) => self.buf.emit_u8(d as u8),
            (0b10, _) => self.buf.emit_i32(mem.disp),
            _ => {}
        }
    }

    // ==== DATA MOVEMENT ====

    /// MOV r64, r64
    pub fn mov_reg_reg(&mut self, dst: AsmReg, src: AsmReg) {
        self.rex(true, src, dst, false);
        self.buf.emit_u8(0x89);
        self.modrm_reg(src.id, dst);
    }

    /// MOV r64, imm. Uses the sign-extended imm32 form when it fits,
    /// `movabs` otherwise.
    pub fn mov_reg_imm(&mut self, dst: AsmReg, imm: i64) {
        if let Ok(imm32) = i32::try_from(imm) {
            self.rex(true, AsmReg::RAX, dst, false);
            self.buf.emit_u8(0xC7);
            self.modrm_reg(0, dst);
            self.buf.emit_i32(imm32);
        } else {
            self.rex(true, AsmReg::RAX, dst, false);
            self.buf.emit_u8(0xB8 + dst.low_bits());
            self.buf.emit_u64(imm as u64);
        }
    }

    /// MOV r32, imm32 (zero-extends into the full register).
    pub fn mov32_reg_imm(&mut self, dst: AsmReg, imm: u32) {
        self.rex(false, AsmReg::RAX, dst, false);
        self.buf.emit_u8(0xB8 + dst.low_bits());
        self.buf.emit_u32(imm);
    }

    /// MOV r64, [mem]
    pub fn mov_reg_mem(&mut self, dst: AsmReg, mem: Mem) {
        self.rex(true, dst, mem.base, false);
        self.buf.emit_u8(0x8B);
        self.modrm_mem(dst.id, mem);
    }

    /// MOV [mem], r64
    pub fn mov_mem_reg(&mut self, mem: Mem, src: AsmReg) {
        self.rex(true, src, mem.base, false);
        self.buf.emit_u8(0x89);
        self.modrm_mem(src.id, mem);
    }

    /// MOV qword [mem], imm32 (sign-extended)
    pub fn mov_mem_imm(&mut self, mem: Mem, imm: i32) {
        self.rex(true, AsmReg::RAX, mem.base, false);
        self.buf.emit_u8(0xC7);
        self.modrm_mem(0, mem);
        self.buf.emit_i32(imm);
    }

    /// MOV byte [mem], r8
    pub fn mov8_mem_reg(&mut self, mem: Mem, src: AsmReg) {
        self.rex(false, src, mem.base, src.byte_needs_rex());
        self.buf.emit_u8(0x88);
        self.modrm_mem(src.id, mem);
    }

    /// MOVZX r32, byte [mem]
    pub fn movzx_reg_mem8(&mut self, dst: AsmReg, mem: Mem) {
        self.rex(false, dst, mem.base, false);
        self.buf.emit_bytes(&[0x0F, 0xB6]);
        self.modrm_mem(dst.id, mem);
    }

    /// MOVZX r32, r8
    pub fn movzx_reg_reg8(&mut self, dst: AsmReg, src: AsmReg) {
        self.rex(false, dst, src, src.byte_needs_rex());
        self.buf.emit_bytes(&[0x0F, 0xB6]);
        self.modrm_reg(dst.id, src);
    }

    /// LEA r64, [mem]
    pub fn lea(&mut self, dst: AsmReg, mem: Mem) {
        self.rex(true, dst, mem.base, false);
        self.buf.emit_u8(0x8D);
        self.modrm_mem(dst.id, mem);
    }

    pub fn push_reg(&mut self, reg: AsmReg) {
        self.rex(false, AsmReg::RAX, reg, false);
        self.buf.emit_u8(0x50 + reg.low_bits());
    }

    pub fn pop_reg(&mut self, reg: AsmReg) {
        self.rex(false, AsmReg::RAX, reg, false);
        self.buf.emit_u8(0x58 + reg.low_bits());
    }

    // ==== ARITHMETIC ====

    /// `op dst, src` for the group-1 ALU operations.
    pub fn alu_reg_reg(&mut self, op: AluOp, dst: AsmReg, src: AsmReg) {
        self.rex(true, src, dst, false);
        self.buf.emit_u8(op.rm_reg_opcode());
        self.modrm_reg(src.id, dst);
    }

    /// `op dst, imm`, choosing the imm8 form when the value fits.
    pub fn alu_reg_imm(&mut self, op: AluOp, dst: AsmReg, imm: i32) {
        self.rex(true, AsmReg::RAX, dst, false);
        if let Ok(imm8) = i8::try_from(imm) {
            self.buf.emit_u8(0x83);
            self.modrm_reg(op.ext(), dst);
            self.buf.emit_u8(imm8 as u8);
        } else {
            self.buf.emit_u8(0x81);
            self.modrm_reg(op.ext(), dst);
            self.buf.emit_i32(imm);
        }
    }

    /// `op [mem], src`
    pub fn alu_mem_reg(&mut self, op: AluOp, mem: Mem, src: AsmReg) {
        self.rex(true, src, mem.base, false);
        self.buf.emit_u8(op.rm_reg_opcode());
        self.modrm_mem(src.id, mem);
    }

    /// `op dst, [mem]`
    pub fn alu_reg_mem(&mut self, op: AluOp, dst: AsmReg, mem: Mem) {
        self.rex(true, dst, mem.base, false);
        self.buf.emit_u8(op.reg_rm_opcode());
        self.modrm_mem(dst.id, mem);
    }

    pub fn add_reg_imm(&mut self, dst: AsmReg, imm: i32) {
        self.alu_reg_imm(AluOp::Add, dst, imm);
    }

    pub fn sub_reg_imm(&mut self, dst: AsmReg, imm: i32) {
        self.alu_reg_imm(AluOp::Sub, dst, imm);
    }

    /// INC qword [mem]
    pub fn inc_mem(&mut self, mem: Mem) {
        self.rex(true, AsmReg::RAX, mem.base, false);
        self.buf.emit_u8(0xFF);
        self.modrm_mem(0, mem);
    }

    /// DEC r64
    pub fn dec_reg(&mut self, reg: AsmReg) {
        self.rex(true, AsmReg::RAX, reg, false);
        self.buf.emit_u8(0xFF);
        self.modrm_reg(1, reg);
    }

    /// IMUL r64, r64
    pub fn imul_reg_reg(&mut self, dst: AsmReg, src: AsmReg) {
        self.rex(true, dst, src, false);
        self.buf.emit_bytes(&[0x0F, 0xAF]);
        self.modrm_reg(dst.id, src);
    }

    /// CQO: sign-extend rax into rdx:rax.
    pub fn cqo(&mut self) {
        self.buf.emit_bytes(&[0x48, 0x99]);
    }

    /// IDIV r64: signed rdx:rax / reg, quotient in rax, remainder in rdx.
    pub fn idiv_reg(&mut self, divisor: AsmReg) {
        self.unary_f7(7, divisor);
    }

    /// DIV r64: unsigned rdx:rax / reg.
    pub fn div_reg(&mut self, divisor: AsmReg) {
        self.unary_f7(6, divisor);
    }

    pub fn neg_reg(&mut self, reg: AsmReg) {
        self.unary_f7(3, reg);
    }

    pub fn not_reg(&mut self, reg: AsmReg) {
        self.unary_f7(2, reg);
    }

    fn unary_f7(&mut self, ext: u8, reg: AsmReg) {
        self.rex(true, AsmReg::RAX, reg, false);
        self.buf.emit_u8(0xF7);
        self.modrm_reg(ext, reg);
    }

    /// `shl/shr/sar reg, cl`
    pub fn shift_reg_cl(&mut self, op: ShiftOp, reg: AsmReg) {
        self.rex(true, AsmReg::RAX, reg, false);
        self.buf.emit_u8(0xD3);
        self.modrm_reg(op.ext(), reg);
    }

    /// TEST r64, r64
    pub fn test_reg_reg(&mut self, left: AsmReg, right: AsmReg) {
        self.rex(true, right, left, false);
        self.buf.emit_u8(0x85);
        self.modrm_reg(right.id, left);
    }

    /// SETcc r8
    pub fn setcc(&mut self, cond: JumpCondition, dst: AsmReg) {
        self.rex(false, AsmReg::RAX, dst, dst.byte_needs_rex());
        self.buf.emit_bytes(&[0x0F, 0x90 | cond.cc()]);
        self.modrm_reg(0, dst);
    }

    /// CMOVcc r64, r64
    pub fn cmov_reg_reg(&mut self, cond: JumpCondition, dst: AsmReg, src: AsmReg) {
        self.rex(true, dst, src, false);
        self.buf.emit_bytes(&[0x0F, 0x40 | cond.cc()]);
        self.modrm_reg(dst.id, src);
    }

    // ==== CONTROL FLOW ====

    /// JMP rel32 with a zero displacement; returns the patch site.
    pub fn jmp_placeholder(&mut self) -> CodeOffset {
        self.buf.emit_u8(0xE9);
        self.rel32_placeholder()
    }

    /// Jcc rel32 with a zero displacement; returns the patch site.
    pub fn jcc_placeholder(&mut self, cond: JumpCondition) -> CodeOffset {
        self.buf.emit_bytes(&[0x0F, 0x80 | cond.cc()]);
        self.rel32_placeholder()
    }

    /// CALL rel32 with a zero displacement; returns the patch site.
    pub fn call_placeholder(&mut self) -> CodeOffset {
        self.buf.emit_u8(0xE8);
        self.rel32_placeholder()
    }

    pub fn jmp_to(&mut self, target: CodeOffset) -> CompileResult<()> {
        let site = self.jmp_placeholder();
        self.patch_rel32(site, target)
    }

    pub fn jcc_to(&mut self, cond: JumpCondition, target: CodeOffset) -> CompileResult<()> {
        let site = self.jcc_placeholder(cond);
        self.patch_rel32(site, target)
    }

    pub fn call_to(&mut self, target: CodeOffset) -> CompileResult<()> {
        let site = self.call_placeholder();
        self.patch_rel32(site, target)
    }

    fn rel32_placeholder(&mut self) -> CodeOffset {
        let site = self.buf.offset();
        self.buf.emit_i32(0);
        site
    }

    pub fn ret(&mut self) {
        self.buf.emit_u8(0xC3);
    }

    pub fn syscall(&mut self) {
        self.buf.emit_bytes(&[0x0F, 0x05]);
    }
}
