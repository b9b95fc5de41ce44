// Content-based file classification
// Sniffs file headers with the object crate and maps them onto the fixed
// allow-list of executable formats.

use object::FileKind;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use idascript_core::port::{BinaryKind, FileClassifier};

/// Header bytes read per file; enough for the DOS stub -> PE header chase
/// and the full PE optional header on any real-world binary
const SNIFF_LEN: usize = 8192;

/// Classifier backed by `object::FileKind` header parsing
pub struct ObjectFileClassifier;

impl ObjectFileClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ObjectFileClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FileClassifier for ObjectFileClassifier {
    fn classify(&self, path: &Path) -> Option<BinaryKind> {
        let mut header = vec![0u8; SNIFF_LEN];
        let mut file = File::open(path).ok()?;
        let read = file.read(&mut header).ok()?;
        let data = &header[..read];

        let kind = match FileKind::parse(data).ok()? {
            FileKind::Pe32 | FileKind::Pe64 => Some(BinaryKind::PeExecutable),
            FileKind::Elf32 | FileKind::Elf64 => elf_kind(data),
            FileKind::MachO32
            | FileKind::MachO64
            | FileKind::MachOFat32
            | FileKind::MachOFat64 => Some(BinaryKind::MachBinary),
            other => {
                debug!(path = %path.display(), kind = ?other, "Object format not in allow-list");
                None
            }
        };

        if let Some(kind) = kind {
            debug!(path = %path.display(), mime = %kind.mime_type(), "Classified binary");
        }
        kind
    }
}

/// Split ELF into executable vs shared object via `e_type`
///
/// ET_DYN covers both shared libraries and PIE executables; the original
/// allow-list accepts both, so no further disambiguation is needed.
/// Relocatable objects and core dumps are rejected.
fn elf_kind(data: &[u8]) -> Option<BinaryKind> {
    const ET_EXEC: u16 = 2;
    const ET_DYN: u16 = 3;

    let bytes: [u8; 2] = data.get(0x10..0x12)?.try_into().ok()?;
    let little_endian = data.get(5) == Some(&1);
    let e_type = if little_endian {
        u16::from_le_bytes(bytes)
    } else {
        u16::from_be_bytes(bytes)
    };

    match e_type {
        ET_EXEC => Some(BinaryKind::ElfExecutable),
        ET_DYN => Some(BinaryKind::ElfSharedObject),
        _ => None,
    }
}
