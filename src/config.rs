//! Compilation options.

use crate::core::error::{CompileError, CompileResult};

/// Virtual address of the R+X segment.
pub const DEFAULT_CODE_BASE: u64 = 0x40_0000;
/// Virtual address of the R+W segment.
pub const DEFAULT_DATA_BASE: u64 = 0x60_0000;
/// Bytes reserved for the data stack.
pub const DEFAULT_STACK_SIZE: u64 = 64 * 1024;

const PAGE_SIZE: u64 = 0x1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub code_base: u64,
    pub data_base: u64,
    pub stack_size: u64,
    /// Report unresolved words as warnings instead of failing.
    pub best_effort: bool,
    /// Prescan the source so words may be called before their definition.
    pub forward_refs: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            code_base: DEFAULT_CODE_BASE,
            data_base: DEFAULT_DATA_BASE,
            stack_size: DEFAULT_STACK_SIZE,
            best_effort: false,
            forward_refs: false,
        }
    }
}

impl CompileOptions {
    pub fn best_effort(mut self, enabled: bool) -> Self {
        self.best_effort = enabled;
        self
    }

    pub fn forward_refs(mut self, enabled: bool) -> Self {
        self.forward_refs = enabled;
        self
    }

    pub fn stack_size(mut self, bytes: u64) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Initial value of the data stack pointer.
    pub fn stack_top(&self) -> u64 {
        self.data_base.saturating_add(self.stack_size)
    }

    /// Most code bytes that fit between the headers and the data segment.
    pub fn code_limit(&self, header_size: u64) -> u64 {
        self.data_base
            .saturating_sub(self.code_base)
            .saturating_sub(header_size)
    }

    pub fn validate(&self) -> CompileResult<()> {
        let invalid = |reason: String| Err(CompileError::InvalidOptions { reason });

        if self.code_base % PAGE_SIZE != 0 {
            return invalid(format!("code base {:#x} is not page aligned", self.code_base));
        }
        if self.data_base % PAGE_SIZE != 0 {
            return invalid(format!("data base {:#x} is not page aligned", self.data_base));
        }
        if self.data_base <= self.code_base {
            return invalid(format!(
                "data base {:#x} must lie above code base {:#x}",
                self.data_base, self.code_base
            ));
        }
        if self.stack_size == 0 || self.stack_size % 8 != 0 {
            return invalid(format!(
                "stack size {} must be a non-zero multiple of 8",
                self.stack_size
            ));
        }
        let Some(stack_top) = self.data_base.checked_add(self.stack_size) else {
            return invalid(format!(
                "stack of {} bytes at {:#x} overflows the address space",
                self.stack_size, self.data_base
            ));
        };
        // Entry loads the stack top as a sign-extended imm32.
        if stack_top > i32::MAX as u64 {
            return invalid(format!(
                "data segment ends at {stack_top:#x}, above the 2 GiB limit"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = CompileOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.stack_top(), 0x61_0000);
        assert!(!options.best_effort);
        assert!(!options.forward_refs);
    }

    #[test]
    fn test_rejects_bad_layouts() {
        let misaligned = CompileOptions {
            code_base: 0x40_0010,
            ..Default::default()
        };
        assert!(matches!(
            misaligned.validate(),
            Err(CompileError::InvalidOptions { .. })
        ));

        let overlapping = CompileOptions {
            data_base: 0x40_0000,
            ..Default::default()
        };
        assert!(overlapping.validate().is_err());

        assert!(CompileOptions::default().stack_size(12).validate().is_err());
        assert!(CompileOptions::default().stack_size(0).validate().is_err());
    }

    #[test]
    fn test_oversized_stack_is_rejected_without_overflow() {
        assert!(matches!(
            CompileOptions::default().stack_size(u64::MAX - 7).validate(),
            Err(CompileError::InvalidOptions { .. })
        ));

        let high = CompileOptions {
            data_base: u64::MAX & !0xfff,
            ..Default::default()
        };
        assert!(matches!(high.validate(), Err(CompileError::InvalidOptions { .. })));
        assert_eq!(high.stack_top(), u64::MAX);
    }

    #[test]
    fn test_code_limit() {
        let options = CompileOptions::default();
        assert_eq!(options.code_limit(176), 0x20_0000 - 176);
    }
}
