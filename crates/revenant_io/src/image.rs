//! Memory-mapped, read-only view over a disk image.
//!
//! The mapping is shared by every decoder for the lifetime of the run; all
//! reads copy out of the map, so decoders that patch bytes (fixups) never
//! touch the image.

use memmap2::Mmap;
use revenant_core::{ByteSource, CoreError, Result};
use std::fs::File;
use std::path::Path;

/// Read-only image backed by `mmap`.
///
/// # Safety
///
/// `memmap2::Mmap` is safe as long as the underlying file is not modified
/// while mapped. A forensic image under analysis is never written, so the
/// invariant holds for this tool.
pub struct ImageFile {
    mmap: Mmap,
}

impl ImageFile {
    /// Opens and maps the image read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{fadvise, Advice};
            let _ = fadvise(&file, 0, None, Advice::Sequential);
        }

        let metadata = file.metadata()?;
        if metadata.len() == 0 {
            return Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "cannot map an empty image",
            )));
        }

        // SAFETY: read-only mapping of a file this process never writes.
        let mmap = unsafe { Mmap::map(&file) }.map_err(CoreError::Io)?;

        #[cfg(target_os = "linux")]
        {
            let _ = mmap.advise(memmap2::Advice::Sequential);
        }

        Ok(Self { mmap })
    }

    /// Zero-copy view of `length` bytes at `offset`, bounds-checked.
    pub fn slice(&self, offset: u64, length: usize) -> Result<&[u8]> {
        let size = self.mmap.len() as u64;
        let end = offset
            .checked_add(length as u64)
            .filter(|&end| end <= size)
            .ok_or(CoreError::ReadOutOfRange {
                offset,
                length: length as u64,
                size,
            })?;
        Ok(&self.mmap[offset as usize..end as usize])
    }
}

impl ByteSource for ImageFile {
    fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.slice(offset, length).map(<[u8]>::to_vec)
    }

    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }
}
