//! Text listing of generated code, used by `--disasm` and in tests.

use std::fmt::Write as _;

use hashbrown::HashMap;
use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, NasmFormatter};

use crate::core::code_buffer::CodeOffset;

/// Render `code` (loaded at `base_ip`) as NASM syntax, one instruction per
/// line, with a `name:` line in front of every labelled offset.
pub fn disassemble(code: &[u8], base_ip: u64, labels: &[(CodeOffset, &str)]) -> String {
    let mut by_offset: HashMap<usize, Vec<&str>> = HashMap::new();
    for &(offset, name) in labels {
        by_offset.entry(offset.get()).or_default().push(name);
    }

    let mut formatter = NasmFormatter::new();
    formatter.options_mut().set_first_operand_char_index(8);
    formatter.options_mut().set_hex_prefix("0x");
    formatter.options_mut().set_hex_suffix("");

    let mut decoder = Decoder::with_ip(64, code, base_ip, DecoderOptions::NONE);
    let mut instr = Instruction::default();
    let mut text = String::new();
    let mut out = String::new();

    while decoder.can_decode() {
        decoder.decode_out(&mut instr);
        let offset = (instr.ip() - base_ip) as usize;

        if let Some(names) = by_offset.get(&offset) {
            for name in names {
                let _ = writeln!(out, "{name}:");
            }
        }

        text.clear();
        formatter.format(&instr, &mut text);

        let bytes = &code[offset..offset + instr.len()];
        let mut hex = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            let _ = write!(hex, "{byte:02x}");
        }
        let _ = writeln!(out, "  {:08x}  {hex:<24} {text}", instr.ip());
    }

    out
}
