// This module is the single-pass driver of fifthc. Compiler walks the token stream once,
// classifies each token and dispatches it: definition markers and `variable` update the
// dictionary, control words push and pop frames on the fixup stack and emit branches,
// literals and variable references load an immediate into the cached top-of-stack
// register, primitives are encoded inline, and calls to colon definitions become direct
// rel32 calls. Every piece of emitted code goes through one X64Encoder and consults one
// RegisterCache, so the cache state is a pure function of the tokens compiled so far.
// The first top-level token emits the entry sequence; definitions that appear after the
// main program has started are jumped over. At the end of input the driver appends the
// exit sequence, checks that nothing is left open and hands the code to the image
// builder. With forward references enabled a prescan records every definition header
// first, and calls to words defined later are patched once their definition is reached.
// The hardware stack at rsp doubles as the return stack: it holds return addresses,
// two cells per open do loop, and cells moved there with `>r`. The compiler counts the
// loop and `>r` cells of the open definition so `exit` can drop them before `ret`.

//! Fifth source to x86-64 compiler driver.

use std::fs;
use std::path::Path;

use bumpalo::Bump;

use crate::config::CompileOptions;
use crate::core::code_buffer::CodeOffset;
use crate::core::control::{ControlStack, FrameKind};
use crate::core::dictionary::{Dictionary, EntryId, EntryKind, ForwardRefs, PendingCall};
use crate::core::error::{CompileError, CompileResult, Warning};
use crate::core::session::{CompilationSession, SessionStats};
use crate::frontend::{classify, Lexer, NumberLiteral, SourcePos, Token, TokenClass};
use crate::image::{self, ImageLayout, HEADER_SIZE};
use crate::x64::cache::{CacheState, RegisterCache};
use crate::x64::disasm::disassemble;
use crate::x64::encoder::{AluOp, JumpCondition, Mem, X64Encoder};
use crate::x64::primitives::{encode_primitive, Primitive};
use crate::x64::registers::{AsmReg, DSP, SCRATCH, SCRATCH2, TOS};
use crate::x64::runtime::{self, RuntimeRoutines};

/// Output of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    /// Complete ELF executable.
    pub image: Vec<u8>,
    /// Generated code alone, as placed after the headers.
    pub code: Vec<u8>,
    /// Offset of the entry sequence within `code`.
    pub entry_offset: CodeOffset,
    pub layout: ImageLayout,
    /// Named code offsets: runtime routines, the entry point and every
    /// colon definition.
    pub labels: Vec<(CodeOffset, String)>,
    /// Diagnostics collected in best-effort mode.
    pub warnings: Vec<Warning>,
    pub stats: SessionStats,
}

impl CompiledProgram {
    pub fn entry_address(&self) -> u64 {
        self.layout.code_address(self.entry_offset)
    }

    /// Write the image and mark it executable.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> CompileResult<()> {
        image::write_executable(path.as_ref(), &self.image)
    }

    /// NASM syntax listing of the generated code at its load address.
    pub fn disassembly(&self) -> String {
        let labels: Vec<(CodeOffset, &str)> = self
            .labels
            .iter()
            .map(|(offset, name)| (*offset, name.as_str()))
            .collect();
        disassemble(
            &self.code,
            self.layout.code_address(CodeOffset::new(0)),
            &labels,
        )
    }
}

/// Compile Fifth source text into an executable image.
pub fn compile(source: &str, options: &CompileOptions) -> CompileResult<CompiledProgram> {
    let tokens = Lexer::new(source).tokenize()?;

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut compiler = Compiler::new(&session, options)?;
    compiler.compile_tokens(&tokens)?;
    compiler.finish()
}

/// Read `input`, compile it and write the executable to `output`.
pub fn compile_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &CompileOptions,
) -> CompileResult<CompiledProgram> {
    let input = input.as_ref();
    let source = fs::read_to_string(input).map_err(|source| CompileError::Io {
        path: input.to_path_buf(),
        source,
    })?;

    log::info!("🔧 Compiling {}", input.display());
    let program = compile(&source, options)?;
    program.write_to_file(output.as_ref())?;
    log::info!(
        "wrote {} ({} bytes, entry {:#x})",
        output.as_ref().display(),
        program.image.len(),
        program.entry_address()
    );
    Ok(program)
}

/// The colon definition currently being compiled.
#[derive(Debug, Clone, Copy)]
struct OpenDefinition<'arena> {
    name: &'arena str,
    id: EntryId,
    offset: CodeOffset,
    pos: SourcePos,
    /// Jump taking the main program around this definition.
    skip_site: Option<CodeOffset>,
}

/// Single-pass compiler state for one session.
pub struct Compiler<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    options: CompileOptions,
    enc: X64Encoder,
    cache: RegisterCache,
    control: ControlStack<'arena>,
    dictionary: Dictionary<'arena>,
    forward: ForwardRefs<'arena>,
    runtime: RuntimeRoutines,
    /// Start of the main program, once its first token was compiled.
    entry: Option<CodeOffset>,
    current: Option<OpenDefinition<'arena>>,
    /// Cells pushed by `>r` and not yet popped, in token order.
    return_cells: usize,
    /// Loop frames already dropped by `unloop` ahead of an `exit`.
    unlooped: usize,
    variables: usize,
    warnings: Vec<Warning>,
}

impl<'s, 'arena> Compiler<'s, 'arena> {
    pub fn new(session: &'s CompilationSession<'arena>, options: &CompileOptions) -> CompileResult<Self> {
        options.validate()?;
        let arena = session.arena();
        let mut enc = X64Encoder::new();
        let runtime = RuntimeRoutines::emit(&mut enc)?;

        Ok(Self {
            session,
            options: options.clone(),
            enc,
            cache: RegisterCache::new(),
            control: ControlStack::new(arena),
            dictionary: Dictionary::new(arena),
            forward: ForwardRefs::new(arena),
            runtime,
            entry: None,
            current: None,
            return_cells: 0,
            unlooped: 0,
            variables: 0,
            warnings: Vec::new(),
        })
    }

    pub fn compile_tokens(&mut self, tokens: &[Token<'_>]) -> CompileResult<()> {
        if self.options.forward_refs {
            self.prescan(tokens);
        }

        let mut index = 0;
        while index < tokens.len() {
            let token = tokens[index];
            log::trace!("{}: `{}` ({})", token.pos, token.text, self.cache.state());
            self.session.record_token();

            match classify(token.text) {
                TokenClass::Colon => {
                    let name = Self::name_after(tokens, index, ":")?;
                    self.begin_definition(name, token.pos)?;
                    index += 1;
                }
                TokenClass::Variable => {
                    let name = Self::name_after(tokens, index, "variable")?;
                    self.define_variable(name, token.pos);
                    index += 1;
                }
                TokenClass::Semicolon => self.end_definition(token.pos)?,
                TokenClass::If => self.compile_if(token.pos)?,
                TokenClass::Else => self.compile_else(token.pos)?,
                TokenClass::Then => self.compile_then(token.pos)?,
                TokenClass::Begin => self.compile_begin(token.pos),
                TokenClass::Until => self.compile_until(token.pos)?,
                TokenClass::Again => self.compile_again(token.pos)?,
                TokenClass::While => self.compile_while(token.pos)?,
                TokenClass::Repeat => self.compile_repeat(token.pos)?,
                TokenClass::Do => self.compile_do(token.pos),
                TokenClass::Loop => self.compile_loop(token.pos)?,
                TokenClass::PlusLoop => self.compile_plus_loop(token.pos)?,
                TokenClass::LoopIndex => self.compile_loop_index("i", 0, token.pos)?,
                TokenClass::OuterLoopIndex => self.compile_loop_index("j", 1, token.pos)?,
                TokenClass::Unloop => self.compile_unloop(token.pos)?,
                TokenClass::Exit => self.compile_exit(token)?,
                TokenClass::Recurse => self.compile_recurse(token)?,
                TokenClass::Number(NumberLiteral::Value(value)) => {
                    self.begin_code();
                    self.compile_literal(value);
                    self.session.record_literal();
                }
                TokenClass::Number(NumberLiteral::OutOfRange) => {
                    return Err(CompileError::LiteralOutOfRange {
                        text: token.text.to_string(),
                        pos: token.pos,
                    });
                }
                TokenClass::Word => self.compile_word(token, index)?,
            }

            index += 1;
        }

        Ok(())
    }

    /// Close the program and build the image.
    pub fn finish(mut self) -> CompileResult<CompiledProgram> {
        if let Some(def) = self.current {
            return Err(CompileError::UnterminatedDefinition {
                name: def.name.to_string(),
                pos: def.pos,
            });
        }
        self.control.ensure_closed()?;
        if let Some(call) = self.forward.first_pending() {
            return Err(CompileError::UnresolvedForwardCall {
                name: call.name.to_string(),
                pos: call.pos,
            });
        }

        self.begin_code();
        self.cache.spill(&mut self.enc);
        runtime::emit_exit(&mut self.enc, 0);

        let entry_offset = self.entry.unwrap_or_default();
        let mut labels = vec![
            (self.runtime.print_number, "print_number".to_string()),
            (entry_offset, "_start".to_string()),
        ];
        labels.extend(
            self.dictionary
                .code_labels()
                .into_iter()
                .map(|(offset, name)| (offset, name.to_string())),
        );

        let code = self.enc.into_code();
        let limit = self.options.code_limit(HEADER_SIZE) as usize;
        if code.len() > limit {
            return Err(CompileError::CodeTooLarge {
                size: code.len(),
                limit,
            });
        }

        self.session
            .record_finished(self.cache.spills(), self.cache.fills(), code.len());

        let layout = ImageLayout::new(&self.options, self.variables)?;
        let image = image::build_image(&code, entry_offset, &layout)?;

        Ok(CompiledProgram {
            image,
            code,
            entry_offset,
            layout,
            labels,
            warnings: self.warnings,
            stats: self.session.stats(),
        })
    }

    // ==== DEFINITIONS ====

    fn name_after<'t>(
        tokens: &[Token<'t>],
        index: usize,
        word: &'static str,
    ) -> CompileResult<Token<'t>> {
        tokens
            .get(index + 1)
            .copied()
            .ok_or(CompileError::MissingName {
                word,
                pos: tokens[index].pos,
            })
    }

    /// Record the position of every `: NAME` header. Names consumed by
    /// `:` and `variable` are skipped exactly as the main pass does.
    fn prescan(&mut self, tokens: &[Token<'_>]) {
        let mut index = 0;
        while index < tokens.len() {
            match classify(tokens[index].text) {
                TokenClass::Colon => {
                    if let Some(name) = tokens.get(index + 1) {
                        self.forward.add_header(name.text, index);
                    }
                    index += 1;
                }
                TokenClass::Variable => index += 1,
                _ => {}
            }
            index += 1;
        }
    }

    fn begin_definition(&mut self, name: Token<'_>, pos: SourcePos) -> CompileResult<()> {
        if self.current.is_some() || !self.control.is_empty() {
            return Err(CompileError::NestedDefinition { pos });
        }

        // Keep the main program flowing around the body.
        let skip_site = if self.entry.is_some() {
            self.cache.spill(&mut self.enc);
            Some(self.enc.jmp_placeholder())
        } else {
            None
        };
        self.cache.set(CacheState::Spilled);

        if let Some(prev) = self.dictionary.find(name.text) {
            log::warn!(
                "{}: redefinition of `{}` (previous definition at {})",
                name.pos,
                name.text,
                prev.defined_at
            );
        } else if Primitive::lookup(name.text).is_some() {
            log::warn!(
                "{}: `{}` is a built-in word and stays shadowed by it",
                name.pos,
                name.text
            );
        }

        let interned = self.session.intern_str(name.text);
        let offset = self.enc.offset();
        let id = self
            .dictionary
            .define(interned, EntryKind::Colon { offset }, name.pos, true);

        for site in self.forward.take_pending(name.text) {
            self.enc.patch_rel32(site, offset)?;
            self.session.record_fixup_patched();
            log::debug!("forward call at {site} -> `{interned}` at {offset}");
        }

        log::debug!("defining `{interned}` at {offset}");
        self.return_cells = 0;
        self.unlooped = 0;
        self.current = Some(OpenDefinition {
            name: interned,
            id,
            offset,
            pos,
            skip_site,
        });
        Ok(())
    }

    fn end_definition(&mut self, pos: SourcePos) -> CompileResult<()> {
        let Some(def) = self.current else {
            return Err(CompileError::OutsideDefinition {
                word: ";".to_string(),
                pos,
            });
        };
        self.control.ensure_closed()?;
        if self.return_cells > 0 {
            log::warn!(
                "{}: `{}` ends with {} cell(s) left on the return stack",
                pos,
                def.name,
                self.return_cells
            );
        }
        self.return_cells = 0;
        self.unlooped = 0;

        self.cache.spill(&mut self.enc);
        self.enc.ret();

        if let Some(site) = def.skip_site {
            let resume = self.enc.offset();
            self.enc.patch_rel32(site, resume)?;
            self.session.record_fixup_patched();
        }

        self.dictionary.reveal(def.id);
        self.current = None;
        self.session.record_word_defined();
        log::debug!(
            "`{}` done: {} bytes",
            def.name,
            self.enc.offset().get() - def.offset.get()
        );
        Ok(())
    }

    fn define_variable(&mut self, name: Token<'_>, pos: SourcePos) {
        let address = self.options.stack_top() + 8 * self.variables as u64;
        self.variables += 1;

        let interned = self.session.intern_str(name.text);
        if self.dictionary.find(name.text).is_some() {
            log::warn!("{}: redefinition of `{}`", name.pos, name.text);
        }
        self.dictionary
            .define(interned, EntryKind::Variable { address }, pos, false);
        self.session.record_variable_defined();
        log::debug!("variable `{interned}` at {address:#x}");
    }

    /// Emit the entry sequence before the first top-level code.
    fn begin_code(&mut self) {
        if self.current.is_some() || self.entry.is_some() {
            return;
        }
        let entry = self.enc.offset();
        runtime::emit_entry(&mut self.enc, self.options.stack_top());
        self.cache.set(CacheState::Spilled);
        self.entry = Some(entry);
        log::debug!("entry at {entry}");
    }

    // ==== WORDS ====

    fn compile_word(&mut self, token: Token<'_>, index: usize) -> CompileResult<()> {
        if let Some(prim) = Primitive::lookup(token.text) {
            self.begin_code();
            encode_primitive(prim, &mut self.enc, &mut self.cache, &self.runtime)?;
            match prim {
                Primitive::ToR => self.return_cells += 1,
                Primitive::FromR => self.return_cells = self.return_cells.saturating_sub(1),
                _ => {}
            }
            self.session.record_primitive(prim.name());
            return Ok(());
        }

        if let Some(entry) = self.dictionary.find(token.text) {
            let kind = entry.kind;
            self.begin_code();
            match kind {
                EntryKind::Colon { offset } => {
                    self.cache.spill(&mut self.enc);
                    self.enc.call_to(offset)?;
                    self.session.record_call();
                }
                EntryKind::Variable { address } => self.compile_literal(address as i64),
            }
            return Ok(());
        }

        if self.options.forward_refs && self.forward.defined_after(token.text, index) {
            self.begin_code();
            self.cache.spill(&mut self.enc);
            let site = self.enc.call_placeholder();
            self.forward.add_pending(PendingCall {
                name: self.session.intern_str(token.text),
                site,
                pos: token.pos,
            });
            self.session.record_call();
            return Ok(());
        }

        if self.options.best_effort {
            let warning = Warning {
                pos: token.pos,
                message: format!("unresolved word `{}` skipped", token.text),
            };
            log::warn!("{warning}");
            self.warnings.push(warning);
            self.session.record_unresolved();
            return Ok(());
        }

        Err(CompileError::UnresolvedToken {
            word: token.text.to_string(),
            pos: token.pos,
        })
    }

    /// Push an immediate as the new cached top cell.
    fn compile_literal(&mut self, value: i64) {
        self.cache.make_room(&mut self.enc);
        self.enc.mov_reg_imm(TOS, value);
        self.cache.set(CacheState::Cached);
    }

    fn compile_exit(&mut self, token: Token<'_>) -> CompileResult<()> {
        if self.current.is_none() {
            return Err(CompileError::OutsideDefinition {
                word: token.text.to_string(),
                pos: token.pos,
            });
        }
        self.cache.spill(&mut self.enc);
        let loops = self.control.open_loops().saturating_sub(self.unlooped);
        let cells = 2 * loops + self.return_cells;
        if cells > 0 {
            self.enc.add_reg_imm(AsmReg::RSP, 8 * cells as i32);
        }
        self.unlooped = 0;
        self.enc.ret();
        Ok(())
    }

    fn compile_recurse(&mut self, token: Token<'_>) -> CompileResult<()> {
        let Some(def) = self.current else {
            return Err(CompileError::OutsideDefinition {
                word: token.text.to_string(),
                pos: token.pos,
            });
        };
        self.cache.spill(&mut self.enc);
        self.enc.call_to(def.offset)?;
        self.session.record_call();
        Ok(())
    }

    // ==== CONTROL FLOW ====

    /// Pop the flag into `rax` and test it. The rest of the stack is left
    /// in memory.
    fn test_flag(&mut self) {
        self.cache.fill(&mut self.enc);
        self.enc.test_reg_reg(TOS, TOS);
        self.cache.set(CacheState::Spilled);
    }

    fn patch_here(&mut self, site: CodeOffset) -> CompileResult<()> {
        let target = self.enc.offset();
        self.enc.patch_rel32(site, target)?;
        self.session.record_fixup_patched();
        log::debug!("patched {site} -> {target}");
        Ok(())
    }

    /// Verify the state flowing into a merge point matches the branch.
    fn check_merge(&self, expected: CacheState, pos: SourcePos) -> CompileResult<()> {
        let found = self.cache.state();
        if found != expected {
            return Err(CompileError::CacheMismatch {
                pos,
                expected,
                found,
            });
        }
        Ok(())
    }

    fn compile_if(&mut self, pos: SourcePos) -> CompileResult<()> {
        self.begin_code();
        self.test_flag();
        let site = self.enc.jcc_placeholder(JumpCondition::Equal);
        self.control
            .push(FrameKind::If { site }, pos, self.cache.state());
        Ok(())
    }

    fn compile_else(&mut self, pos: SourcePos) -> CompileResult<()> {
        let (site, frame) = self.control.pop_for("else", pos, |k| match k {
            FrameKind::If { site } => Some(site),
            _ => None,
        })?;

        self.cache.spill(&mut self.enc);
        let state = self.cache.state();
        let skip = self.enc.jmp_placeholder();
        self.patch_here(site)?;

        // The false branch starts from the state at the `if`.
        self.cache.set(frame.state);
        self.control.push(FrameKind::Else { site: skip }, pos, state);
        Ok(())
    }

    fn compile_then(&mut self, pos: SourcePos) -> CompileResult<()> {
        let (site, frame) = self.control.pop_for("then", pos, |k| match k {
            FrameKind::If { site } | FrameKind::Else { site } => Some(site),
            _ => None,
        })?;

        self.cache.spill(&mut self.enc);
        self.check_merge(frame.state, pos)?;
        self.patch_here(site)
    }

    fn compile_begin(&mut self, pos: SourcePos) {
        self.begin_code();
        self.cache.spill(&mut self.enc);
        let target = self.enc.offset();
        self.control
            .push(FrameKind::Begin { target }, pos, self.cache.state());
    }

    fn pop_begin(&mut self, word: &str, pos: SourcePos) -> CompileResult<(CodeOffset, CacheState)> {
        let (target, frame) = self.control.pop_for(word, pos, |k| match k {
            FrameKind::Begin { target } => Some(target),
            _ => None,
        })?;
        Ok((target, frame.state))
    }

    fn compile_until(&mut self, pos: SourcePos) -> CompileResult<()> {
        let (target, state) = self.pop_begin("until", pos)?;
        self.test_flag();
        self.check_merge(state, pos)?;
        self.enc.jcc_to(JumpCondition::Equal, target)
    }

    fn compile_again(&mut self, pos: SourcePos) -> CompileResult<()> {
        let (target, state) = self.pop_begin("again", pos)?;
        self.cache.spill(&mut self.enc);
        self.check_merge(state, pos)?;
        self.enc.jmp_to(target)
    }

    fn compile_while(&mut self, pos: SourcePos) -> CompileResult<()> {
        let (target, state) = self.pop_begin("while", pos)?;
        self.test_flag();
        let site = self.enc.jcc_placeholder(JumpCondition::Equal);
        // The frame keeps the loop head state for `repeat` to verify.
        self.control
            .push(FrameKind::While { target, site }, pos, state);
        Ok(())
    }

    fn compile_repeat(&mut self, pos: SourcePos) -> CompileResult<()> {
        let ((target, site), frame) = self.control.pop_for("repeat", pos, |k| match k {
            FrameKind::While { target, site } => Some((target, site)),
            _ => None,
        })?;

        self.cache.spill(&mut self.enc);
        self.check_merge(frame.state, pos)?;
        self.enc.jmp_to(target)?;
        self.patch_here(site)
    }

    /// `( limit start -- )`: moves both onto the hardware stack, index on top.
    fn compile_do(&mut self, pos: SourcePos) {
        self.begin_code();
        self.cache.fill(&mut self.enc);
        self.enc.mov_reg_mem(SCRATCH, Mem::base(DSP));
        self.enc.add_reg_imm(DSP, 8);
        self.enc.push_reg(SCRATCH);
        self.enc.push_reg(TOS);
        self.cache.set(CacheState::Spilled);

        let body = self.enc.offset();
        self.control
            .push(FrameKind::Do { body }, pos, self.cache.state());
    }

    fn pop_do(&mut self, word: &str, pos: SourcePos) -> CompileResult<(CodeOffset, CacheState)> {
        let (body, frame) = self.control.pop_for(word, pos, |k| match k {
            FrameKind::Do { body } => Some(body),
            _ => None,
        })?;
        Ok((body, frame.state))
    }

    fn compile_loop(&mut self, pos: SourcePos) -> CompileResult<()> {
        let (body, state) = self.pop_do("loop", pos)?;
        self.cache.spill(&mut self.enc);
        self.check_merge(state, pos)?;

        let index = Mem::base(AsmReg::RSP);
        let limit = Mem::offset(AsmReg::RSP, 8);
        self.enc.inc_mem(index);
        self.enc.mov_reg_mem(TOS, index);
        self.enc.alu_reg_mem(AluOp::Cmp, TOS, limit);
        self.enc.jcc_to(JumpCondition::Less, body)?;
        self.enc.alu_reg_imm(AluOp::Add, AsmReg::RSP, 16);
        Ok(())
    }

    /// `( n -- )`: adds `n` to the index and leaves once the index crosses
    /// the boundary between `limit - 1` and `limit` in either direction, or
    /// lands exactly on `limit`.
    fn compile_plus_loop(&mut self, pos: SourcePos) -> CompileResult<()> {
        let (body, state) = self.pop_do("+loop", pos)?;
        self.cache.fill(&mut self.enc);
        self.cache.set(CacheState::Spilled);
        self.check_merge(state, pos)?;

        let index = Mem::base(AsmReg::RSP);
        let limit = Mem::offset(AsmReg::RSP, 8);
        // (index - limit) biased by i64::MIN overflows exactly at the boundary.
        self.enc.mov_reg_mem(SCRATCH, index);
        self.enc.alu_reg_mem(AluOp::Sub, SCRATCH, limit);
        self.enc.mov_reg_imm(SCRATCH2, i64::MIN);
        self.enc.alu_reg_reg(AluOp::Add, SCRATCH, SCRATCH2);
        self.enc.alu_mem_reg(AluOp::Add, index, TOS);
        self.enc.alu_reg_reg(AluOp::Add, SCRATCH, TOS);
        let crossed = self.enc.jcc_placeholder(JumpCondition::Overflow);
        self.enc.alu_reg_reg(AluOp::Cmp, SCRATCH, SCRATCH2);
        self.enc.jcc_to(JumpCondition::NotEqual, body)?;
        self.patch_here(crossed)?;
        self.enc.alu_reg_imm(AluOp::Add, AsmReg::RSP, 16);
        Ok(())
    }

    /// Push the index of the loop `depth` levels out from the innermost.
    fn compile_loop_index(
        &mut self,
        word: &'static str,
        depth: usize,
        pos: SourcePos,
    ) -> CompileResult<()> {
        let needed = depth + 1;
        if self.control.open_loops() < needed {
            return Err(CompileError::LoopWordOutsideLoop { word, needed, pos });
        }
        self.cache.make_room(&mut self.enc);
        self.enc
            .mov_reg_mem(TOS, Mem::offset(AsmReg::RSP, 16 * depth as i32));
        self.cache.set(CacheState::Cached);
        Ok(())
    }

    /// Drop the innermost loop parameters ahead of an `exit`.
    fn compile_unloop(&mut self, pos: SourcePos) -> CompileResult<()> {
        let needed = self.unlooped + 1;
        if self.control.open_loops() < needed {
            return Err(CompileError::LoopWordOutsideLoop {
                word: "unloop",
                needed,
                pos,
            });
        }
        self.enc.alu_reg_imm(AluOp::Add, AsmReg::RSP, 16);
        self.unlooped += 1;
        Ok(())
    }
}
