//! fifthc - a native x86-64 backend for the Fifth word language.
//!
//! Compiles a flat source file of a small Forth dialect straight into a static
//! ELF64 Linux executable. Machine code is encoded byte by byte and the image
//! is laid out in-process; no assembler or linker is involved.
//!
//! # Primary Usage
//!
//! ```no_run
//! use fifthc::{compile, CompileOptions};
//!
//! let program = compile(": square dup * ; 7 square .", &CompileOptions::default())?;
//! program.write_to_file("square")?;
//! # Ok::<(), fifthc::CompileError>(())
//! ```
//!
//! # Architecture
//!
//! - [`frontend`] - Tokenizer and token classification
//! - [`core`] - Code buffer, session, dictionary, control stack, errors
//! - [`x64`] - Instruction encoding, register cache, primitives, runtime
//! - [`compiler`] - Single-pass driver
//! - [`image`] - ELF64 executable layout

pub mod compiler;
pub mod config;
pub mod core;
pub mod frontend;
pub mod image;
pub mod x64;

pub use compiler::{compile, compile_file, CompiledProgram, Compiler};
pub use config::CompileOptions;
pub use core::{CompilationSession, CompileError, CompileResult, SessionStats, Warning};
pub use frontend::SourcePos;
