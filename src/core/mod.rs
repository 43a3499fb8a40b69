// This module is the hub of fifthc's target-independent infrastructure: the
// append-only code buffer that every emitted byte passes through, the error types
// shared by all stages, the arena-backed compilation session with its statistics,
// and the two per-session tables the driver consults while compiling, namely the
// word dictionary and the control-flow fixup stack.

//! Core compiler infrastructure.
//!
//! ## Session Management (`session`)
//! - Arena allocation using `bumpalo`, interned word names
//! - Compilation statistics
//!
//! ## Code Buffer (`code_buffer`)
//! - Growable byte emitter, opaque offsets, rel32 patching
//!
//! ## Dictionary (`dictionary`)
//! - Append-only word table with newest-first lookup and smudging
//! - Forward reference bookkeeping
//!
//! ## Control Stack (`control`)
//! - LIFO frames for `if`/`else`/`then`, `begin` loops and `do` loops

pub mod code_buffer;
pub mod control;
pub mod dictionary;
pub mod error;
pub mod session;

pub use code_buffer::{CodeBuffer, CodeOffset};
pub use control::{ControlStack, Frame, FrameKind};
pub use dictionary::{Dictionary, Entry, EntryId, EntryKind, ForwardRefs, PendingCall};
pub use error::{CompileError, CompileResult, Warning};
pub use session::{CompilationSession, SessionStats};
