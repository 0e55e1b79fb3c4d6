//! $UsnJrnl engine: sequential USN_RECORD_V2 decoding and grouping.
//!
//! The $J stream is sparse at the head; leading zeros (and zero gaps between
//! runs of records) are skipped eight bytes at a time, which is also the
//! alignment every record must have.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::attr::MftReference;
use crate::error::{CoreError, Result};
use crate::time;

/// Fixed header size of a USN_RECORD_V2, before the file name.
pub const USN_V2_HEADER_SIZE: usize = 0x3C;

/// USN reason bits, rendered symbolically in exports.
const REASON_FLAGS: &[(u32, &str)] = &[
    (0x0000_0001, "DATA_OVERWRITE"),
    (0x0000_0002, "DATA_EXTEND"),
    (0x0000_0004, "DATA_TRUNCATION"),
    (0x0000_0010, "NAMED_DATA_OVERWRITE"),
    (0x0000_0020, "NAMED_DATA_EXTEND"),
    (0x0000_0040, "NAMED_DATA_TRUNCATION"),
    (0x0000_0100, "FILE_CREATE"),
    (0x0000_0200, "FILE_DELETE"),
    (0x0000_0400, "EA_CHANGE"),
    (0x0000_0800, "SECURITY_CHANGE"),
    (0x0000_1000, "RENAME_OLD_NAME"),
    (0x0000_2000, "RENAME_NEW_NAME"),
    (0x0000_4000, "INDEXABLE_CHANGE"),
    (0x0000_8000, "BASIC_INFO_CHANGE"),
    (0x0001_0000, "HARD_LINK_CHANGE"),
    (0x0002_0000, "COMPRESSION_CHANGE"),
    (0x0004_0000, "ENCRYPTION_CHANGE"),
    (0x0008_0000, "OBJECT_ID_CHANGE"),
    (0x0010_0000, "REPARSE_POINT_CHANGE"),
    (0x0020_0000, "STREAM_CHANGE"),
    (0x8000_0000, "CLOSE"),
];

/// One decoded USN_RECORD_V2.
#[derive(Debug, Clone)]
pub struct UsnRecord {
    pub usn: u64,
    pub record_length: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub file_reference: MftReference,
    pub parent_reference: MftReference,
    pub timestamp: u64,
    pub reason: u32,
    pub source_info: u32,
    pub security_id: u32,
    pub file_attributes: u32,
    pub file_name: String,
}

impl UsnRecord {
    /// Decodes one record at the start of `data`. The caller has already
    /// validated the length fields against the stream.
    fn parse(data: &[u8]) -> Self {
        let record_length = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let name_length = u16::from_le_bytes(data[56..58].try_into().unwrap()) as usize;
        let name_offset = u16::from_le_bytes(data[58..60].try_into().unwrap()) as usize;
        let file_name = if name_offset + name_length <= data.len() {
            crate::attr::body::utf16le_string(&data[name_offset..name_offset + name_length])
        } else {
            String::new()
        };
        Self {
            usn: u64::from_le_bytes(data[24..32].try_into().unwrap()),
            record_length,
            major_version: u16::from_le_bytes(data[4..6].try_into().unwrap()),
            minor_version: u16::from_le_bytes(data[6..8].try_into().unwrap()),
            file_reference: MftReference::from_raw(u64::from_le_bytes(
                data[8..16].try_into().unwrap(),
            )),
            parent_reference: MftReference::from_raw(u64::from_le_bytes(
                data[16..24].try_into().unwrap(),
            )),
            timestamp: u64::from_le_bytes(data[32..40].try_into().unwrap()),
            reason: u32::from_le_bytes(data[40..44].try_into().unwrap()),
            source_info: u32::from_le_bytes(data[44..48].try_into().unwrap()),
            security_id: u32::from_le_bytes(data[48..52].try_into().unwrap()),
            file_attributes: u32::from_le_bytes(data[52..56].try_into().unwrap()),
            file_name,
        }
    }

    /// Reason bitmask as `|`-joined symbolic names; unnamed bits render
    /// as a hex remainder.
    pub fn reason_string(&self) -> String {
        let mut parts = Vec::new();
        let mut remainder = self.reason;
        for &(bit, name) in REASON_FLAGS {
            if self.reason & bit != 0 {
                parts.push(name.to_string());
                remainder &= !bit;
            }
        }
        if remainder != 0 {
            parts.push(format!("{remainder:#010x}"));
        }
        parts.join("|")
    }

    pub fn timestamp_datetime(&self) -> DateTime<Utc> {
        time::filetime_to_datetime(self.timestamp)
    }
}

/// Checks whether `payload` begins with a plausible USN_RECORD_V2 and, if
/// so, returns its usn field. Used by the $LogFile engine to recognize
/// journal-append redo payloads.
pub(crate) fn embedded_usn(payload: &[u8]) -> Option<u64> {
    if payload.len() < USN_V2_HEADER_SIZE {
        return None;
    }
    let record_length = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
    let major = u16::from_le_bytes(payload[4..6].try_into().unwrap());
    let minor = u16::from_le_bytes(payload[6..8].try_into().unwrap());
    if record_length < USN_V2_HEADER_SIZE || record_length % 8 != 0 || major != 2 || minor != 0 {
        return None;
    }
    Some(u64::from_le_bytes(payload[24..32].try_into().unwrap()))
}

/// The parsed journal.
#[derive(Debug, Default)]
pub struct UsnJrnl {
    /// Records in stream (file) order.
    pub records: Vec<UsnRecord>,
}

impl UsnJrnl {
    /// Decodes records from an extracted $J stream. `limit` caps the number
    /// of records parsed. A header that cannot describe a valid record ends
    /// the parse with a diagnostic; everything before it is kept.
    pub fn parse(data: &[u8], limit: Option<usize>) -> Result<Self> {
        let mut records = Vec::new();
        let mut pos = 0usize;

        while pos + 8 <= data.len() {
            if let Some(cap) = limit {
                if records.len() >= cap {
                    break;
                }
            }
            if data[pos..pos + 8].iter().all(|&b| b == 0) {
                pos += 8;
                continue;
            }
            let record_length = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
            if record_length < USN_V2_HEADER_SIZE
                || record_length % 8 != 0
                || pos + record_length > data.len()
            {
                let err = CoreError::UsnRecordTruncated { offset: pos as u64 };
                log::warn!("stopping $UsnJrnl parse: {err}");
                break;
            }
            let major = u16::from_le_bytes(data[pos + 4..pos + 6].try_into().unwrap());
            if major != 2 {
                log::warn!(
                    "stopping $UsnJrnl parse at offset {pos}: unsupported record version {major}"
                );
                break;
            }
            records.push(UsnRecord::parse(&data[pos..pos + record_length]));
            pos += record_length;
        }

        Ok(Self { records })
    }

    /// Records grouped by MFT entry, then by sequence value, both ascending.
    /// Inner lists preserve stream order.
    pub fn grouped_by_entry(&self) -> BTreeMap<u64, BTreeMap<u16, Vec<&UsnRecord>>> {
        let mut grouped: BTreeMap<u64, BTreeMap<u16, Vec<&UsnRecord>>> = BTreeMap::new();
        for record in &self.records {
            grouped
                .entry(record.file_reference.inum)
                .or_default()
                .entry(record.file_reference.sequence)
                .or_default()
                .push(record);
        }
        grouped
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encodes a USN_RECORD_V2 with the given identity; the timestamp is
    /// 2017-01-01 and the reason is FILE_CREATE|CLOSE.
    pub(crate) fn encode_usn_record(usn: u64, inum: u64, sequence: u16, name: &str) -> Vec<u8> {
        let utf16: Vec<u16> = name.encode_utf16().collect();
        let record_length = (USN_V2_HEADER_SIZE + utf16.len() * 2 + 7) & !7;
        let mut buf = vec![0u8; record_length];
        buf[0..4].copy_from_slice(&(record_length as u32).to_le_bytes());
        buf[4..6].copy_from_slice(&2u16.to_le_bytes());
        let file_ref = inum | ((sequence as u64) << 48);
        buf[8..16].copy_from_slice(&file_ref.to_le_bytes());
        buf[16..24].copy_from_slice(&(5u64 | (5u64 << 48)).to_le_bytes());
        buf[24..32].copy_from_slice(&usn.to_le_bytes());
        let filetime = 116_444_736_000_000_000u64 + 1_483_228_800 * 10_000_000;
        buf[32..40].copy_from_slice(&filetime.to_le_bytes());
        buf[40..44].copy_from_slice(&0x8000_0100u32.to_le_bytes());
        buf[56..58].copy_from_slice(&((utf16.len() * 2) as u16).to_le_bytes());
        buf[58..60].copy_from_slice(&(USN_V2_HEADER_SIZE as u16).to_le_bytes());
        for (i, unit) in utf16.iter().enumerate() {
            buf[60 + i * 2..62 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
        buf
    }

    #[test]
    fn test_parse_after_sparse_head() {
        let mut data = vec![0u8; 4096];
        data.extend(encode_usn_record(0x1000, 42, 3, "a.txt"));
        data.extend(encode_usn_record(0x1040, 42, 3, "a.txt"));
        data.extend(vec![0u8; 64]);

        let jrnl = UsnJrnl::parse(&data, None).unwrap();
        assert_eq!(jrnl.records.len(), 2);
        assert_eq!(jrnl.records[0].usn, 0x1000);
        assert_eq!(jrnl.records[0].file_name, "a.txt");
        assert_eq!(jrnl.records[0].file_reference.inum, 42);
        assert_eq!(jrnl.records[0].file_reference.sequence, 3);
    }

    #[test]
    fn test_all_zero_stream_is_empty_not_error() {
        let data = vec![0u8; 8192];
        let jrnl = UsnJrnl::parse(&data, None).unwrap();
        assert!(jrnl.records.is_empty());
        assert!(jrnl.grouped_by_entry().is_empty());
    }

    #[test]
    fn test_record_lengths_cover_stream() {
        let head = vec![0u8; 256];
        let a = encode_usn_record(1, 7, 1, "x");
        let b = encode_usn_record(2, 7, 1, "yy");
        let mut data = head.clone();
        data.extend(&a);
        data.extend(&b);

        let jrnl = UsnJrnl::parse(&data, None).unwrap();
        let summed: usize = jrnl.records.iter().map(|r| r.record_length as usize).sum();
        assert_eq!(summed, data.len() - head.len());
        assert!(jrnl.records.iter().all(|r| r.record_length % 8 == 0));
    }

    #[test]
    fn test_grouping_by_entry_and_sequence() {
        let mut data = Vec::new();
        data.extend(encode_usn_record(0x10, 42, 3, "old"));
        data.extend(encode_usn_record(0x20, 42, 4, "new"));
        data.extend(encode_usn_record(0x30, 7, 1, "other"));

        let jrnl = UsnJrnl::parse(&data, None).unwrap();
        let grouped = jrnl.grouped_by_entry();
        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec![7, 42]);
        let per_seq = &grouped[&42];
        assert_eq!(per_seq.keys().copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(per_seq[&3].len(), 1);
        assert_eq!(per_seq[&4].len(), 1);
    }

    #[test]
    fn test_limit_caps_records() {
        let mut data = Vec::new();
        for i in 0..5 {
            data.extend(encode_usn_record(i, 1, 1, "f"));
        }
        let jrnl = UsnJrnl::parse(&data, Some(3)).unwrap();
        assert_eq!(jrnl.records.len(), 3);
    }

    #[test]
    fn test_garbage_header_stops_cleanly() {
        let mut data = encode_usn_record(0x10, 1, 1, "ok");
        data.extend(vec![0xFFu8; 64]);
        let jrnl = UsnJrnl::parse(&data, None).unwrap();
        assert_eq!(jrnl.records.len(), 1);
    }

    #[test]
    fn test_reason_string() {
        let data = encode_usn_record(1, 1, 1, "r");
        let jrnl = UsnJrnl::parse(&data, None).unwrap();
        assert_eq!(jrnl.records[0].reason_string(), "FILE_CREATE|CLOSE");
    }

    #[test]
    fn test_timestamp_iso8601() {
        let data = encode_usn_record(1, 1, 1, "t");
        let jrnl = UsnJrnl::parse(&data, None).unwrap();
        assert_eq!(
            crate::time::filetime_to_iso8601(jrnl.records[0].timestamp),
            "2017-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_embedded_usn_sniffing() {
        let payload = encode_usn_record(0x12340, 42, 3, "v.txt");
        assert_eq!(embedded_usn(&payload), Some(0x12340));
        assert_eq!(embedded_usn(b"short"), None);
        let mut bad_version = payload.clone();
        bad_version[4] = 9;
        assert_eq!(embedded_usn(&bad_version), None);
        let mut bad_length = payload;
        bad_length[0] = 0x3D; // not a multiple of 8
        assert_eq!(embedded_usn(&bad_length), None);
    }
}
