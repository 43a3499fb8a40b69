//! x86-64 general purpose registers and their roles in generated code.

use std::fmt;

/// A 64-bit general purpose register, identified by its hardware number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsmReg {
    pub id: u8,
}

impl AsmReg {
    pub const RAX: AsmReg = AsmReg::new(0);
    pub const RCX: AsmReg = AsmReg::new(1);
    pub const RDX: AsmReg = AsmReg::new(2);
    pub const RBX: AsmReg = AsmReg::new(3);
    pub const RSP: AsmReg = AsmReg::new(4);
    pub const RBP: AsmReg = AsmReg::new(5);
    pub const RSI: AsmReg = AsmReg::new(6);
    pub const RDI: AsmReg = AsmReg::new(7);
    pub const R8: AsmReg = AsmReg::new(8);
    pub const R9: AsmReg = AsmReg::new(9);
    pub const R10: AsmReg = AsmReg::new(10);
    pub const R11: AsmReg = AsmReg::new(11);
    pub const R12: AsmReg = AsmReg::new(12);
    pub const R13: AsmReg = AsmReg::new(13);
    pub const R14: AsmReg = AsmReg::new(14);
    pub const R15: AsmReg = AsmReg::new(15);

    pub const fn new(id: u8) -> Self {
        Self { id }
    }

    /// Low three bits, as placed in ModR/M, SIB or the opcode byte.
    #[inline]
    pub const fn low_bits(self) -> u8 {
        self.id & 0x07
    }

    /// Whether REX.R/X/B is needed to reach this register.
    #[inline]
    pub const fn is_extended(self) -> bool {
        self.id >= 8
    }

    /// 8-bit views of spl/bpl/sil/dil exist only with a REX prefix.
    #[inline]
    pub const fn byte_needs_rex(self) -> bool {
        self.id >= 4
    }

    pub const fn name(self) -> &'static str {
        const NAMES: [&str; 16] = [
            "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15",
        ];
        NAMES[(self.id & 0x0f) as usize]
    }
}

impl fmt::Display for AsmReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cached top-of-stack cell.
pub const TOS: AsmReg = AsmReg::RAX;
/// Data stack pointer; survives syscalls and is never used for anything else.
pub const DSP: AsmReg = AsmReg::RBX;
/// Scratch registers. `rdx` is also clobbered by `cqo`/`idiv`.
pub const SCRATCH: AsmReg = AsmReg::RCX;
pub const SCRATCH2: AsmReg = AsmReg::RDX;
