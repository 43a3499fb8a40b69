//! x86-64 specific components.
//!
//! - [`encoder`] - Raw instruction encoding into the code buffer
//! - [`registers`] - Register numbers and their fixed roles
//! - [`cache`] - Top-of-stack register cache state
//! - [`primitives`] - Inline encoders for the built-in words
//! - [`runtime`] - Entry, exit and number printing routines
//! - [`disasm`] - NASM syntax listing via iced-x86

pub mod cache;
pub mod disasm;
pub mod encoder;
pub mod primitives;
pub mod registers;
pub mod runtime;

pub use cache::{CacheState, RegisterCache};
pub use disasm::disassemble;
pub use encoder::{AluOp, JumpCondition, Mem, ShiftOp, X64Encoder};
pub use primitives::{encode_primitive, Primitive};
pub use registers::AsmReg;
pub use runtime::RuntimeRoutines;
