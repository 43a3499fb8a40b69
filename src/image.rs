// ELF64 executable generation for fifthc. The generated code is wrapped in a minimal
// static executable: the ELF file header, exactly two PT_LOAD program headers and the
// code bytes, with no section headers, no dynamic table, no interpreter and no
// relocations. The first segment maps the whole file (headers included) read+execute
// at the code base; the second maps no file bytes at all and reserves the data stack
// and the variable cells, zero filled, read+write at the data base. Layout is done
// through object's elf::Writer so offsets, alignment and header encoding come from the
// same place the rest of the ecosystem uses.

//! ELF64 executable image builder.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use log::debug;
use object::elf;
use object::write::elf::{FileHeader, ProgramHeader, Writer};
use object::Endianness;

use crate::config::CompileOptions;
use crate::core::code_buffer::CodeOffset;
use crate::core::error::{CompileError, CompileResult};

/// ELF64 file header size.
pub const FILE_HEADER_SIZE: u64 = 64;
/// ELF64 program header size.
pub const PROGRAM_HEADER_SIZE: u64 = 56;
pub const PROGRAM_HEADER_COUNT: u32 = 2;
/// File offset of the first code byte.
pub const HEADER_SIZE: u64 = FILE_HEADER_SIZE + PROGRAM_HEADER_SIZE * PROGRAM_HEADER_COUNT as u64;

const SEGMENT_ALIGN: u64 = 0x1000;

/// Placement of the two segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    pub code_base: u64,
    pub data_base: u64,
    /// Bytes reserved in the writable segment.
    pub data_size: u64,
}

impl ImageLayout {
    pub fn new(options: &CompileOptions, variables: usize) -> CompileResult<Self> {
        let data_size = (variables as u64)
            .checked_mul(8)
            .and_then(|cells| cells.checked_add(options.stack_size))
            .filter(|size| options.data_base.checked_add(*size).is_some())
            .ok_or_else(|| CompileError::InvalidOptions {
                reason: format!(
                    "{} variables do not fit above a {} byte stack",
                    variables, options.stack_size
                ),
            })?;

        Ok(Self {
            code_base: options.code_base,
            data_base: options.data_base,
            data_size,
        })
    }

    /// Virtual address of a code offset.
    pub fn code_address(&self, offset: CodeOffset) -> u64 {
        self.code_base + HEADER_SIZE + offset.get() as u64
    }
}

/// Build the executable image around `code`.
pub fn build_image(
    code: &[u8],
    entry: CodeOffset,
    layout: &ImageLayout,
) -> CompileResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut writer = Writer::new(Endianness::Little, true, &mut buffer);

    writer.reserve_file_header();
    writer.reserve_program_headers(PROGRAM_HEADER_COUNT);
    let code_offset = writer.reserve(code.len(), 1) as u64;
    debug_assert_eq!(code_offset, HEADER_SIZE);
    let file_size = writer.reserved_len() as u64;

    let e_entry = layout.code_base + code_offset + entry.get() as u64;
    writer.write_file_header(&FileHeader {
        os_abi: elf::ELFOSABI_NONE,
        abi_version: 0,
        e_type: elf::ET_EXEC,
        e_machine: elf::EM_X86_64,
        e_entry,
        e_flags: 0,
    })?;

    writer.write_align_program_headers();
    writer.write_program_header(&ProgramHeader {
        p_type: elf::PT_LOAD,
        p_flags: elf::PF_R | elf::PF_X,
        p_offset: 0,
        p_vaddr: layout.code_base,
        p_paddr: layout.code_base,
        p_filesz: file_size,
        p_memsz: file_size,
        p_align: SEGMENT_ALIGN,
    });
    writer.write_program_header(&ProgramHeader {
        p_type: elf::PT_LOAD,
        p_flags: elf::PF_R | elf::PF_W,
        p_offset: 0,
        p_vaddr: layout.data_base,
        p_paddr: layout.data_base,
        p_filesz: 0,
        p_memsz: layout.data_size,
        p_align: SEGMENT_ALIGN,
    });

    writer.write(code);

    debug!(
        "image: {} bytes, entry {:#x}, data {:#x}+{:#x}",
        buffer.len(),
        e_entry,
        layout.data_base,
        layout.data_size
    );
    Ok(buffer)
}

/// Write `image` to `path` and mark it executable.
pub fn write_executable(path: &Path, image: &[u8]) -> CompileResult<()> {
    let io_err = |source: std::io::Error| CompileError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).map_err(io_err)?;
    file.write_all(image).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata().map_err(io_err)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).map_err(io_err)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::read::elf::{FileHeader as _, ProgramHeader as _};

    #[test]
    fn test_header_layout() {
        assert_eq!(HEADER_SIZE, 176);
        let layout = ImageLayout::new(&CompileOptions::default(), 2).unwrap();
        assert_eq!(layout.data_size, 64 * 1024 + 16);
        assert_eq!(layout.code_address(CodeOffset::new(4)), 0x40_0000 + 180);
    }

    #[test]
    fn test_data_size_overflow_is_rejected() {
        let options = CompileOptions::default();
        assert!(matches!(
            ImageLayout::new(&options, usize::MAX),
            Err(CompileError::InvalidOptions { .. })
        ));

        let near_top = CompileOptions {
            data_base: u64::MAX & !0xfff,
            ..Default::default()
        };
        assert!(ImageLayout::new(&near_top, 0).is_err());
    }

    #[test]
    fn test_image_structure() {
        let layout = ImageLayout::new(&CompileOptions::default(), 0).unwrap();
        let code = [0x90, 0x90, 0xC3];
        let image = build_image(&code, CodeOffset::new(1), &layout).unwrap();

        assert_eq!(image.len(), HEADER_SIZE as usize + code.len());
        assert_eq!(&image[HEADER_SIZE as usize..], &code);

        let header = elf::FileHeader64::<Endianness>::parse(&*image).unwrap();
        let endian = header.endian().unwrap();
        assert!(header.is_class_64());
        assert!(header.is_little_endian());
        assert_eq!(header.e_type(endian), elf::ET_EXEC);
        assert_eq!(header.e_machine(endian), elf::EM_X86_64);
        assert_eq!(header.e_entry(endian), 0x40_0000 + HEADER_SIZE + 1);
        assert_eq!(header.e_phoff(endian), 64);
        assert_eq!(header.e_phentsize(endian), 56);
        assert_eq!(header.e_shnum(endian), 0);

        let segments = header.program_headers(endian, &*image).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].p_flags(endian), elf::PF_R | elf::PF_X);
        assert_eq!(segments[0].p_filesz(endian), image.len() as u64);
        assert_eq!(segments[1].p_flags(endian), elf::PF_R | elf::PF_W);
        assert_eq!(segments[1].p_filesz(endian), 0);
        assert_eq!(segments[1].p_vaddr(endian), 0x60_0000);
        assert_eq!(segments[1].p_memsz(endian), 64 * 1024);
    }

    #[test]
    fn test_write_executable_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog");
        write_executable(&path, b"\x7fELF").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"\x7fELF");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }
}
