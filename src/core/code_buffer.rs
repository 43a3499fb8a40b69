//! Append-only machine code buffer.
//!
//! Every byte of generated code enters the image through [`CodeBuffer`]. The
//! write cursor doubles as the compile-time program counter: callers save it
//! as a [`CodeOffset`] to compute call and jump displacements, and come back
//! later to patch 4-byte placeholders once a forward target is known.

use std::fmt;

use super::error::{CompileError, CompileResult};

/// Position inside the code buffer.
///
/// Offsets are plain indices, so they stay valid when the buffer grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CodeOffset(usize);

impl CodeOffset {
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for CodeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Growable little-endian byte emitter.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Current write position.
    #[inline]
    pub fn offset(&self) -> CodeOffset {
        CodeOffset(self.code.len())
    }

    #[inline]
    pub fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    #[inline]
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    #[inline]
    pub fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn emit_i32(&mut self, value: i32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn emit_u64(&mut self, value: u64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Overwrite an already written 4-byte span.
    pub fn patch_i32(&mut self, site: CodeOffset, value: i32) -> CompileResult<()> {
        let end = site.0.checked_add(4).ok_or(CompileError::Patch { site })?;
        let span = self
            .code
            .get_mut(site.0..end)
            .ok_or(CompileError::Patch { site })?;
        span.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Resolve a rel32 placeholder at `site` so that it lands on `target`.
    ///
    /// The displacement is relative to the end of the 4-byte field, which is
    /// where the CPU's instruction pointer sits for every rel32 form we emit.
    pub fn patch_rel32(&mut self, site: CodeOffset, target: CodeOffset) -> CompileResult<()> {
        let disp = rel32(site, target).ok_or(CompileError::Patch { site })?;
        self.patch_i32(site, disp)
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn into_code(self) -> Vec<u8> {
        self.code
    }
}

/// Displacement from the end of a 4-byte field at `site` to `target`.
pub fn rel32(site: CodeOffset, target: CodeOffset) -> Option<i32> {
    let next = site.0 as i64 + 4;
    i32::try_from(target.0 as i64 - next).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_at(buf: &CodeBuffer, site: CodeOffset) -> i32 {
        let bytes: [u8; 4] = buf.code()[site.get()..site.get() + 4].try_into().unwrap();
        i32::from_le_bytes(bytes)
    }

    #[test]
    fn test_little_endian_emission() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0x90);
        buf.emit_u32(0xdead_beef);
        buf.emit_u64(0x0102_0304_0506_0708);
        assert_eq!(
            buf.code(),
            &[
                0x90, 0xef, 0xbe, 0xad, 0xde, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01
            ]
        );
        assert_eq!(buf.offset(), CodeOffset::new(13));
    }

    #[test]
    fn test_forward_patch() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0xe9);
        let site = buf.offset();
        buf.emit_i32(0);
        buf.emit_bytes(&[0x90; 6]);
        let target = buf.offset();
        buf.patch_rel32(site, target).unwrap();
        assert_eq!(field_at(&buf, site), 6);
    }

    #[test]
    fn test_backward_displacement() {
        let site = CodeOffset::new(20);
        let target = CodeOffset::new(4);
        assert_eq!(rel32(site, target), Some(-20));
    }

    #[test]
    fn test_patch_out_of_range_is_an_error() {
        let mut buf = CodeBuffer::new();
        buf.emit_bytes(&[0, 0]);
        let err = buf.patch_i32(CodeOffset::new(0), 5).unwrap_err();
        assert!(matches!(err, CompileError::Patch { .. }));
    }

    #[test]
    fn test_growth_keeps_offsets_valid() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0xe8);
        let site = buf.offset();
        buf.emit_i32(0);
        for _ in 0..10_000 {
            buf.emit_u8(0x90);
        }
        let end = buf.offset();
        buf.patch_rel32(site, end).unwrap();
        assert_eq!(field_at(&buf, site), 10_000);
    }
}
