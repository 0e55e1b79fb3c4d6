//! Random-access byte source abstraction.
//!
//! All decoders consume a shared, read-only [`ByteSource`] so that the same
//! parsing logic works on a raw disk image, an extracted artifact file, or
//! an in-memory buffer in tests.

use crate::error::{CoreError, Result};

/// A bounds-checked, read-only view over a sequence of bytes.
///
/// Implementations never mutate the underlying data; decoders that need to
/// patch bytes (the fixup engine) work on the returned copies.
pub trait ByteSource {
    /// Reads exactly `length` bytes starting at `offset`.
    ///
    /// Fails with [`CoreError::ReadOutOfRange`] when `offset + length`
    /// exceeds the source size.
    fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>>;

    /// Total size of the source in bytes.
    fn size(&self) -> u64;
}

impl ByteSource for [u8] {
    fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(length as u64)
            .ok_or(CoreError::ReadOutOfRange {
                offset,
                length: length as u64,
                size: self.len() as u64,
            })?;
        if end > self.len() as u64 {
            return Err(CoreError::ReadOutOfRange {
                offset,
                length: length as u64,
                size: self.len() as u64,
            });
        }
        Ok(self[offset as usize..end as usize].to_vec())
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

impl ByteSource for Vec<u8> {
    fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.as_slice().read(offset, length)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_read_in_range() {
        let data = vec![1u8, 2, 3, 4, 5];
        assert_eq!(data.read(1, 3).unwrap(), vec![2, 3, 4]);
        assert_eq!(data.read(0, 5).unwrap(), data);
        assert_eq!(data.size(), 5);
    }

    #[test]
    fn test_slice_read_out_of_range() {
        let data = vec![1u8, 2, 3];
        let err = data.read(2, 2).unwrap_err();
        match err {
            CoreError::ReadOutOfRange {
                offset,
                length,
                size,
            } => {
                assert_eq!((offset, length, size), (2, 2, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_read_at_end_is_ok() {
        let data = vec![1u8, 2, 3];
        assert_eq!(data.read(3, 0).unwrap(), Vec::<u8>::new());
    }
}
