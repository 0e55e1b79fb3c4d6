//! Decoded attribute bodies.
//!
//! Resident attribute content is decoded eagerly into the tagged variants of
//! [`AttributeBody`](super::AttributeBody); the structures here are the
//! per-type payloads.

use crate::error::{CoreError, Result};

/// A 64-bit MFT file reference: entry number in the low 48 bits, sequence
/// value in the high 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MftReference {
    pub inum: u64,
    pub sequence: u16,
}

impl MftReference {
    pub fn from_raw(raw: u64) -> Self {
        Self {
            inum: raw & 0x0000_FFFF_FFFF_FFFF,
            sequence: (raw >> 48) as u16,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.inum == 0 && self.sequence == 0
    }
}

/// Decodes a UTF-16LE byte slice, replacing invalid units.
pub fn utf16le_string(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn require(data: &[u8], len: usize) -> Result<()> {
    if data.len() < len {
        return Err(CoreError::ReadOutOfRange {
            offset: 0,
            length: len as u64,
            size: data.len() as u64,
        });
    }
    Ok(())
}

fn u16_at(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(data[off..off + 2].try_into().unwrap())
}

fn u32_at(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(data[off..off + 4].try_into().unwrap())
}

fn u64_at(data: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(data[off..off + 8].try_into().unwrap())
}

/// $STANDARD_INFORMATION: timestamps and DOS-style flags for the entry.
#[derive(Debug, Clone, Default)]
pub struct StandardInformation {
    pub created: u64,
    pub modified: u64,
    pub mft_modified: u64,
    pub accessed: u64,
    pub file_flags: u32,
    pub max_versions: u32,
    pub version: u32,
    pub class_id: u32,
    /// NTFS 3.0+ extension; zero on short records.
    pub owner_id: u32,
    pub security_id: u32,
    pub quota_charged: u64,
    pub usn: u64,
}

impl StandardInformation {
    pub fn parse(data: &[u8]) -> Result<Self> {
        require(data, 48)?;
        let mut info = Self {
            created: u64_at(data, 0),
            modified: u64_at(data, 8),
            mft_modified: u64_at(data, 16),
            accessed: u64_at(data, 24),
            file_flags: u32_at(data, 32),
            max_versions: u32_at(data, 36),
            version: u32_at(data, 40),
            class_id: u32_at(data, 44),
            ..Default::default()
        };
        if data.len() >= 72 {
            info.owner_id = u32_at(data, 48);
            info.security_id = u32_at(data, 52);
            info.quota_charged = u64_at(data, 56);
            info.usn = u64_at(data, 64);
        }
        Ok(info)
    }
}

/// Namespace of a $FILE_NAME attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNameNamespace {
    Posix,
    Win32,
    Dos,
    Win32AndDos,
}

impl FileNameNamespace {
    /// Unknown namespace bytes collapse to POSIX, the least constrained.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Win32,
            2 => Self::Dos,
            3 => Self::Win32AndDos,
            _ => Self::Posix,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posix => "POSIX",
            Self::Win32 => "Win32",
            Self::Dos => "DOS",
            Self::Win32AndDos => "Win32&DOS",
        }
    }
}

/// $FILE_NAME: one name of the entry plus duplicated metadata.
#[derive(Debug, Clone)]
pub struct FileName {
    pub parent: MftReference,
    pub created: u64,
    pub modified: u64,
    pub mft_modified: u64,
    pub accessed: u64,
    pub allocated_size: u64,
    pub real_size: u64,
    pub file_flags: u32,
    pub reparse_value: u32,
    pub namespace: FileNameNamespace,
    pub name: String,
}

impl FileName {
    pub fn parse(data: &[u8]) -> Result<Self> {
        require(data, 66)?;
        let name_len = data[64] as usize * 2;
        require(data, 66 + name_len)?;
        Ok(Self {
            parent: MftReference::from_raw(u64_at(data, 0)),
            created: u64_at(data, 8),
            modified: u64_at(data, 16),
            mft_modified: u64_at(data, 24),
            accessed: u64_at(data, 32),
            allocated_size: u64_at(data, 40),
            real_size: u64_at(data, 48),
            file_flags: u32_at(data, 56),
            reparse_value: u32_at(data, 60),
            namespace: FileNameNamespace::from_u8(data[65]),
            name: utf16le_string(&data[66..66 + name_len]),
        })
    }
}

/// $VOLUME_INFORMATION: NTFS version and dirty flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeInformation {
    pub major_version: u8,
    pub minor_version: u8,
    pub flags: u16,
}

impl VolumeInformation {
    pub fn parse(data: &[u8]) -> Result<Self> {
        require(data, 12)?;
        Ok(Self {
            major_version: data[8],
            minor_version: data[9],
            flags: u16_at(data, 10),
        })
    }
}

const INDEX_ENTRY_LAST: u16 = 0x02;

/// One entry of an index node; for directory indexes the content is a
/// $FILE_NAME value keyed to `reference`.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub reference: MftReference,
    pub flags: u16,
    pub file_name: Option<FileName>,
}

/// $INDEX_ROOT: the resident top node of an index. Enough is decoded to walk
/// directory entries, which is how `$Extend/$UsnJrnl` is located.
#[derive(Debug, Clone)]
pub struct IndexRoot {
    pub indexed_attribute_type: u32,
    pub collation_rule: u32,
    pub index_record_size: u32,
    pub clusters_per_index_record: u8,
    pub entries: Vec<IndexEntry>,
}

impl IndexRoot {
    pub fn parse(data: &[u8]) -> Result<Self> {
        require(data, 32)?;
        let indexed_attribute_type = u32_at(data, 0);
        let collation_rule = u32_at(data, 4);
        let index_record_size = u32_at(data, 8);
        let clusters_per_index_record = data[12];

        // Index node header, relative to offset 16.
        let entries_offset = 16 + u32_at(data, 16) as usize;
        let index_length = u32_at(data, 20) as usize;
        let end = (16 + index_length).min(data.len());

        let mut entries = Vec::new();
        let mut cursor = entries_offset;
        while cursor + 16 <= end {
            let reference = MftReference::from_raw(u64_at(data, cursor));
            let entry_length = u16_at(data, cursor + 8) as usize;
            let content_length = u16_at(data, cursor + 10) as usize;
            let flags = u16_at(data, cursor + 12);

            let file_name = if content_length >= 66 && cursor + 16 + content_length <= end {
                FileName::parse(&data[cursor + 16..cursor + 16 + content_length]).ok()
            } else {
                None
            };
            entries.push(IndexEntry {
                reference,
                flags,
                file_name,
            });

            if flags & INDEX_ENTRY_LAST != 0 || entry_length == 0 {
                break;
            }
            cursor += entry_length;
        }

        Ok(Self {
            indexed_attribute_type,
            collation_rule,
            index_record_size,
            clusters_per_index_record,
            entries,
        })
    }

    /// Looks up a directory entry by exact name.
    pub fn find_entry(&self, name: &str) -> Option<&IndexEntry> {
        self.entries
            .iter()
            .find(|e| e.file_name.as_ref().is_some_and(|fname| fname.name == name))
    }
}

/// One entry of an $ATTRIBUTE_LIST, pointing at the record that holds the
/// attribute.
#[derive(Debug, Clone)]
pub struct AttributeListEntry {
    pub attribute_type: u32,
    pub starting_vcn: u64,
    pub reference: MftReference,
    pub attribute_id: u16,
    pub name: String,
}

impl AttributeListEntry {
    /// Returns the entry and its on-disk length.
    fn parse_one(data: &[u8]) -> Result<(Self, usize)> {
        require(data, 26)?;
        let entry_length = u16_at(data, 4) as usize;
        if entry_length < 26 || entry_length > data.len() {
            return Err(CoreError::ReadOutOfRange {
                offset: 4,
                length: entry_length as u64,
                size: data.len() as u64,
            });
        }
        let name_length = data[6] as usize * 2;
        let name_offset = data[7] as usize;
        let name = if name_length > 0 && name_offset + name_length <= entry_length {
            utf16le_string(&data[name_offset..name_offset + name_length])
        } else {
            String::new()
        };
        Ok((
            Self {
                attribute_type: u32_at(data, 0),
                starting_vcn: u64_at(data, 8),
                reference: MftReference::from_raw(u64_at(data, 16)),
                attribute_id: u16_at(data, 24),
                name,
            },
            entry_length,
        ))
    }

    pub fn parse_list(data: &[u8]) -> Vec<AttributeListEntry> {
        let mut entries = Vec::new();
        let mut offset = 0;
        while offset + 26 <= data.len() {
            match Self::parse_one(&data[offset..]) {
                Ok((entry, consumed)) => {
                    entries.push(entry);
                    offset += consumed;
                }
                Err(_) => break,
            }
        }
        entries
    }
}
