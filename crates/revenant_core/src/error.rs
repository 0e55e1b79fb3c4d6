//! Core error types for the Revenant NTFS parsers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The boot sector does not carry the NTFS OEM identifier
    #[error("not an NTFS filesystem at offset {offset} (OEM ID {found:?})")]
    NotNtfs { offset: u64, found: [u8; 8] },

    /// Requested read extends past the end of the source
    #[error("read of {length} bytes at offset {offset} is out of range (size: {size})")]
    ReadOutOfRange { offset: u64, length: u64, size: u64 },

    /// Update-sequence-array check failed on a multi-sector structure
    #[error("fixup mismatch in sector {sector}: expected {expected:#06x}, found {found:#06x}")]
    FixupMismatch { sector: usize, expected: u16, found: u16 },

    /// Magic bytes of a record or page did not match
    #[error("bad signature: expected {expected:?}, found {found:?}")]
    BadSignature { expected: [u8; 4], found: [u8; 4] },

    /// Runlist field extends past the end of the attribute record
    #[error("runlist truncated at byte {offset}")]
    RunlistOverflow { offset: usize },

    /// Boot-sector values that no NTFS volume can have
    #[error("implausible geometry: {0}")]
    BadGeometry(String),

    /// RCRD page whose client records could not be reassembled
    #[error("log page {index} incomplete: {reason}")]
    LogPageIncomplete { index: usize, reason: &'static str },

    /// USN record header that cannot describe a valid record
    #[error("USN record truncated at stream offset {offset}")]
    UsnRecordTruncated { offset: u64 },

    /// MFT entry number not present in the parsed set
    #[error("MFT entry {inum} not found")]
    InumNotFound { inum: u64 },

    /// MFT entry lacks an attribute the operation requires
    #[error("MFT entry {inum} has no {attribute} attribute")]
    MissingAttribute { inum: u64, attribute: &'static str },
}

pub type Result<T> = std::result::Result<T, CoreError>;
