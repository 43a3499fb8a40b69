// The fixed primitive table of the Fifth word language and its x86-64 encoders.
// Each primitive is compiled inline: the encoder reads the register cache state,
// emits the instructions that are correct for that state, and records the state
// its code leaves behind. The register roles are fixed (rax = cached top cell,
// rbx = data stack pointer, rcx/rdx = scratch), values stay in rax whenever the
// next operation can consume them directly, and anything that reaches a write
// syscall spills first. Output primitives use small syscall sequences or call
// the shared number printing routine emitted at the start of the code. The
// return stack words move cells between rax and the hardware stack at rsp, the
// same stack that holds return addresses and do-loop parameters.

//! Primitive words and their inline encoders.

use std::fmt;
use std::sync::OnceLock;

use hashbrown::HashMap;

use crate::core::error::CompileResult;

use super::cache::{push_rax, CacheState, RegisterCache};
use super::encoder::{AluOp, JumpCondition, Mem, ShiftOp, X64Encoder};
use super::registers::{AsmReg, DSP, SCRATCH, SCRATCH2, TOS};
use super::runtime::{emit_exit, RuntimeRoutines, SYS_WRITE};

/// Built-in words compiled inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    // Stack shuffles
    Dup,
    Drop,
    Swap,
    Over,
    Nip,
    Rot,
    MinusRot,
    Tuck,
    TwoDup,
    QuestionDup,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    OnePlus,
    OneMinus,
    Abs,
    Max,
    Min,
    // Bitwise
    And,
    Or,
    Xor,
    Invert,
    LShift,
    RShift,
    // Comparison
    Equal,
    NotEqual,
    Less,
    Greater,
    ZeroEqual,
    ZeroLess,
    ZeroGreater,
    // Memory
    Fetch,
    Store,
    CFetch,
    CStore,
    PlusStore,
    // Return stack
    ToR,
    FromR,
    RFetch,
    // Output
    Emit,
    Cr,
    Dot,
    // Process
    Bye,
}

const PRIMITIVE_NAMES: &[(&str, Primitive)] = &[
    ("dup", Primitive::Dup),
    ("drop", Primitive::Drop),
    ("swap", Primitive::Swap),
    ("over", Primitive::Over),
    ("nip", Primitive::Nip),
    ("rot", Primitive::Rot),
    ("-rot", Primitive::MinusRot),
    ("tuck", Primitive::Tuck),
    ("2dup", Primitive::TwoDup),
    ("?dup", Primitive::QuestionDup),
    ("+", Primitive::Add),
    ("-", Primitive::Sub),
    ("*", Primitive::Mul),
    ("/", Primitive::Div),
    ("mod", Primitive::Mod),
    ("negate", Primitive::Negate),
    ("1+", Primitive::OnePlus),
    ("1-", Primitive::OneMinus),
    ("abs", Primitive::Abs),
    ("max", Primitive::Max),
    ("min", Primitive::Min),
    ("and", Primitive::And),
    ("or", Primitive::Or),
    ("xor", Primitive::Xor),
    ("invert", Primitive::Invert),
    ("lshift", Primitive::LShift),
    ("rshift", Primitive::RShift),
    ("=", Primitive::Equal),
    ("<>", Primitive::NotEqual),
    ("<", Primitive::Less),
    (">", Primitive::Greater),
    ("0=", Primitive::ZeroEqual),
    ("0<", Primitive::ZeroLess),
    ("0>", Primitive::ZeroGreater),
    ("@", Primitive::Fetch),
    ("!", Primitive::Store),
    ("c@", Primitive::CFetch),
    ("c!", Primitive::CStore),
    ("+!", Primitive::PlusStore),
    (">r", Primitive::ToR),
    ("r>", Primitive::FromR),
    ("r@", Primitive::RFetch),
    ("emit", Primitive::Emit),
    ("cr", Primitive::Cr),
    (".", Primitive::Dot),
    ("bye", Primitive::Bye),
];

fn table() -> &'static HashMap<&'static str, Primitive> {
    static TABLE: OnceLock<HashMap<&'static str, Primitive>> = OnceLock::new();
    TABLE.get_or_init(|| PRIMITIVE_NAMES.iter().copied().collect())
}

impl Primitive {
    /// Look up a primitive by name, ignoring ASCII case.
    pub fn lookup(word: &str) -> Option<Primitive> {
        if let Some(prim) = table().get(word) {
            return Some(*prim);
        }
        if word.bytes().any(|b| b.is_ascii_uppercase()) {
            return table().get(word.to_ascii_lowercase().as_str()).copied();
        }
        None
    }

    pub fn name(self) -> &'static str {
        PRIMITIVE_NAMES
            .iter()
            .find(|(_, prim)| *prim == self)
            .map(|(name, _)| *name)
            .unwrap_or("?")
    }

    pub fn all() -> impl Iterator<Item = Primitive> {
        PRIMITIVE_NAMES.iter().map(|(_, prim)| *prim)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compile one primitive inline.
pub fn encode_primitive(
    prim: Primitive,
    enc: &mut X64Encoder,
    cache: &mut RegisterCache,
    runtime: &RuntimeRoutines,
) -> CompileResult<()> {
    use Primitive::*;

    match prim {
        Dup => {
            cache.fill(enc);
            push_rax(enc);
            cache.set(CacheState::Cached);
        }
        Drop => {
            if !cache.is_cached() {
                enc.add_reg_imm(DSP, 8);
            }
            cache.set(CacheState::Spilled);
        }
        Swap => {
            cache.fill(enc);
            enc.mov_reg_mem(SCRATCH, Mem::base(DSP));
            enc.mov_mem_reg(Mem::base(DSP), TOS);
            enc.mov_reg_reg(TOS, SCRATCH);
        }
        Over => {
            cache.fill(enc);
            enc.mov_reg_mem(SCRATCH, Mem::base(DSP));
            push_rax(enc);
            enc.mov_reg_reg(TOS, SCRATCH);
        }
        Nip => {
            cache.fill(enc);
            enc.add_reg_imm(DSP, 8);
        }
        Rot => {
            // ( a b c -- b c a ): rax = c, [rbx] = b, [rbx+8] = a
            cache.fill(enc);
            enc.mov_reg_mem(SCRATCH, Mem::offset(DSP, 8));
            enc.mov_reg_mem(SCRATCH2, Mem::base(DSP));
            enc.mov_mem_reg(Mem::offset(DSP, 8), SCRATCH2);
            enc.mov_mem_reg(Mem::base(DSP), TOS);
            enc.mov_reg_reg(TOS, SCRATCH);
        }
        MinusRot => {
            // ( a b c -- c a b ): rax = c, [rbx] = b, [rbx+8] = a
            cache.fill(enc);
            enc.mov_reg_mem(SCRATCH, Mem::base(DSP));
            enc.mov_reg_mem(SCRATCH2, Mem::offset(DSP, 8));
            enc.mov_mem_reg(Mem::offset(DSP, 8), TOS);
            enc.mov_mem_reg(Mem::base(DSP), SCRATCH2);
            enc.mov_reg_reg(TOS, SCRATCH);
        }
        Tuck => {
            // ( a b -- b a b )
            cache.fill(enc);
            enc.mov_reg_mem(SCRATCH, Mem::base(DSP));
            enc.mov_mem_reg(Mem::base(DSP), TOS);
            push_cell(enc, SCRATCH);
        }
        TwoDup => {
            cache.fill(enc);
            enc.mov_reg_mem(SCRATCH, Mem::base(DSP));
            push_rax(enc);
            push_cell(enc, SCRATCH);
        }
        QuestionDup => {
            cache.fill(enc);
            enc.test_reg_reg(TOS, TOS);
            let skip = enc.jcc_placeholder(JumpCondition::Equal);
            push_rax(enc);
            let after = enc.offset();
            enc.patch_rel32(skip, after)?;
        }

        Add => binary_alu(enc, cache, AluOp::Add),
        Sub => binary_alu(enc, cache, AluOp::Sub),
        And => binary_alu(enc, cache, AluOp::And),
        Or => binary_alu(enc, cache, AluOp::Or),
        Xor => binary_alu(enc, cache, AluOp::Xor),
        Mul => {
            pop_operands(enc, cache);
            enc.imul_reg_reg(TOS, SCRATCH);
        }
        Div | Mod => {
            pop_operands(enc, cache);
            enc.cqo();
            enc.idiv_reg(SCRATCH);
            if prim == Mod {
                enc.mov_reg_reg(TOS, SCRATCH2);
            }
        }
        LShift | RShift => {
            pop_operands(enc, cache);
            let op = if prim == LShift { ShiftOp::Shl } else { ShiftOp::Shr };
            enc.shift_reg_cl(op, TOS);
        }
        Negate => {
            cache.fill(enc);
            enc.neg_reg(TOS);
        }
        Invert => {
            cache.fill(enc);
            enc.not_reg(TOS);
        }
        OnePlus => {
            cache.fill(enc);
            enc.add_reg_imm(TOS, 1);
        }
        OneMinus => {
            cache.fill(enc);
            enc.sub_reg_imm(TOS, 1);
        }
        Abs => {
            cache.fill(enc);
            enc.mov_reg_reg(SCRATCH, TOS);
            enc.neg_reg(SCRATCH);
            enc.cmov_reg_reg(JumpCondition::NotSign, TOS, SCRATCH);
        }
        Max | Min => {
            pop_operands(enc, cache);
            enc.alu_reg_reg(AluOp::Cmp, TOS, SCRATCH);
            let take_right = if prim == Max {
                JumpCondition::Less
            } else {
                JumpCondition::Greater
            };
            enc.cmov_reg_reg(take_right, TOS, SCRATCH);
        }

        Equal => compare(enc, cache, JumpCondition::Equal),
        NotEqual => compare(enc, cache, JumpCondition::NotEqual),
        Less => compare(enc, cache, JumpCondition::Less),
        Greater => compare(enc, cache, JumpCondition::Greater),
        ZeroEqual | ZeroLess | ZeroGreater => {
            cache.fill(enc);
            enc.test_reg_reg(TOS, TOS);
            let cond = match prim {
                ZeroEqual => JumpCondition::Equal,
                ZeroLess => JumpCondition::Sign,
                _ => JumpCondition::Greater,
            };
            materialize_flag(enc, cond);
        }

        Fetch => {
            cache.fill(enc);
            enc.mov_reg_mem(TOS, Mem::base(TOS));
        }
        CFetch => {
            cache.fill(enc);
            enc.movzx_reg_mem8(TOS, Mem::base(TOS));
        }
        Store | CStore | PlusStore => {
            // ( x addr -- ): rax = addr, [rbx] = x
            cache.fill(enc);
            enc.mov_reg_mem(SCRATCH, Mem::base(DSP));
            match prim {
                Store => enc.mov_mem_reg(Mem::base(TOS), SCRATCH),
                CStore => enc.mov8_mem_reg(Mem::base(TOS), SCRATCH),
                _ => enc.alu_mem_reg(AluOp::Add, Mem::base(TOS), SCRATCH),
            }
            enc.add_reg_imm(DSP, 8);
            cache.set(CacheState::Spilled);
        }

        ToR => {
            cache.fill(enc);
            enc.push_reg(TOS);
            cache.set(CacheState::Spilled);
        }
        FromR => {
            cache.make_room(enc);
            enc.pop_reg(TOS);
            cache.set(CacheState::Cached);
        }
        RFetch => {
            cache.make_room(enc);
            enc.mov_reg_mem(TOS, Mem::base(AsmReg::RSP));
            cache.set(CacheState::Cached);
        }

        Emit => {
            cache.spill(enc);
            write_top_cell(enc);
            enc.add_reg_imm(DSP, 8);
        }
        Cr => {
            cache.spill(enc);
            enc.sub_reg_imm(DSP, 8);
            enc.mov_mem_imm(Mem::base(DSP), i32::from(b'\n'));
            write_top_cell(enc);
            enc.add_reg_imm(DSP, 8);
        }
        Dot => {
            cache.spill(enc);
            enc.call_to(runtime.print_number)?;
        }

        Bye => {
            cache.spill(enc);
            emit_exit(enc, 0);
        }
    }

    Ok(())
}

/// Leave the right operand in `rcx` and the left operand in `rax`, popping
/// both from the logical stack.
fn pop_operands(enc: &mut X64Encoder, cache: &mut RegisterCache) {
    cache.fill(enc);
    enc.mov_reg_reg(SCRATCH, TOS);
    enc.mov_reg_mem(TOS, Mem::base(DSP));
    enc.add_reg_imm(DSP, 8);
    cache.set(CacheState::Cached);
}

/// Push a scratch register below the cached top cell.
fn push_cell(enc: &mut X64Encoder, reg: AsmReg) {
    enc.sub_reg_imm(DSP, 8);
    enc.mov_mem_reg(Mem::base(DSP), reg);
}

fn binary_alu(enc: &mut X64Encoder, cache: &mut RegisterCache, op: AluOp) {
    pop_operands(enc, cache);
    enc.alu_reg_reg(op, TOS, SCRATCH);
}

/// Signed comparison producing -1 for true and 0 for false.
fn compare(enc: &mut X64Encoder, cache: &mut RegisterCache, cond: JumpCondition) {
    pop_operands(enc, cache);
    enc.alu_reg_reg(AluOp::Cmp, TOS, SCRATCH);
    materialize_flag(enc, cond);
}

/// `setcc al; movzx eax, al; neg rax`
fn materialize_flag(enc: &mut X64Encoder, cond: JumpCondition) {
    enc.setcc(cond, TOS);
    enc.movzx_reg_reg8(TOS, TOS);
    enc.neg_reg(TOS);
}

/// write(1, rbx, 1): prints the low byte of the spilled top cell.
fn write_top_cell(enc: &mut X64Encoder) {
    enc.mov32_reg_imm(AsmReg::RAX, SYS_WRITE);
    enc.mov32_reg_imm(AsmReg::RDI, 1);
    enc.mov_reg_reg(AsmReg::RSI, DSP);
    enc.mov32_reg_imm(AsmReg::RDX, 1);
    enc.syscall();
}
