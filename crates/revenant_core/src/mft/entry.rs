//! Decoded FILE records.

use std::collections::BTreeMap;

use crate::attr::{
    parse_attributes, Attribute, AttributeType, FileName, FileNameNamespace, MftReference,
};
use crate::error::Result;
use crate::fixup::{apply_fixups, MultiSectorHeader};

pub const FILE_SIGNATURE: [u8; 4] = *b"FILE";

pub const FLAG_IN_USE: u16 = 0x0001;
pub const FLAG_DIRECTORY: u16 = 0x0002;

/// One MFT entry: fixed header plus its multi-valued attribute map.
///
/// Attributes of the same type coexist (multiple $DATA streams, several
/// $FILE_NAME namespaces), so the map holds an ordered list per type.
#[derive(Debug, Clone)]
pub struct MftEntry {
    pub inum: u64,
    pub lsn: u64,
    pub sequence_value: u16,
    pub hard_link_count: u16,
    pub flags: u16,
    pub used_size: u32,
    pub allocated_size: u32,
    /// Zero for base records; the owning base record for extensions.
    pub base_reference: MftReference,
    pub next_attribute_id: u16,
    pub attributes: BTreeMap<AttributeType, Vec<Attribute>>,
}

impl MftEntry {
    /// Decodes a FILE record from raw bytes: verifies the signature, applies
    /// fixups to a local copy, and walks the attributes.
    pub fn parse(inum: u64, record: &[u8], sector_size: usize) -> Result<Self> {
        let header = MultiSectorHeader::parse(record)?;
        header.expect_magic(&FILE_SIGNATURE)?;

        let mut buf = record.to_vec();
        apply_fixups(&mut buf, header.usa_offset, header.usa_count, sector_size)?;

        let lsn = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let sequence_value = u16::from_le_bytes(buf[16..18].try_into().unwrap());
        let hard_link_count = u16::from_le_bytes(buf[18..20].try_into().unwrap());
        let first_attribute_offset = u16::from_le_bytes(buf[20..22].try_into().unwrap());
        let flags = u16::from_le_bytes(buf[22..24].try_into().unwrap());
        let used_size = u32::from_le_bytes(buf[24..28].try_into().unwrap());
        let allocated_size = u32::from_le_bytes(buf[28..32].try_into().unwrap());
        let base_reference = MftReference::from_raw(u64::from_le_bytes(buf[32..40].try_into().unwrap()));
        let next_attribute_id = u16::from_le_bytes(buf[40..42].try_into().unwrap());

        let mut attributes: BTreeMap<AttributeType, Vec<Attribute>> = BTreeMap::new();
        for attribute in parse_attributes(&buf, first_attribute_offset as usize)? {
            attributes
                .entry(attribute.type_code)
                .or_default()
                .push(attribute);
        }

        Ok(Self {
            inum,
            lsn,
            sequence_value,
            hard_link_count,
            flags,
            used_size,
            allocated_size,
            base_reference,
            next_attribute_id,
            attributes,
        })
    }

    pub fn is_in_use(&self) -> bool {
        self.flags & FLAG_IN_USE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// Base records carry a zero base reference; extensions point at their
    /// base.
    pub fn is_base_record(&self) -> bool {
        self.base_reference.is_zero() || self.base_reference.inum == self.inum
    }

    /// All $DATA attributes in record order; index 0 is the default stream.
    pub fn data_attributes(&self) -> &[Attribute] {
        self.attributes
            .get(&AttributeType::Data)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The display name of the entry: Win32 (or Win32&DOS) over POSIX, and a
    /// bare DOS name only when nothing else exists.
    pub fn file_name(&self) -> Option<&FileName> {
        let names = self.attributes.get(&AttributeType::FileName)?;
        let of_namespace = |ns: FileNameNamespace| {
            names.iter().find_map(|a| match &a.body {
                crate::attr::AttributeBody::FileName(f) if f.namespace == ns => Some(f),
                _ => None,
            })
        };
        of_namespace(FileNameNamespace::Win32)
            .or_else(|| of_namespace(FileNameNamespace::Win32AndDos))
            .or_else(|| of_namespace(FileNameNamespace::Posix))
            .or_else(|| of_namespace(FileNameNamespace::Dos))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::attr::tests::{encode_non_resident, encode_resident, with_end_marker};
    use crate::attr::body::tests::encode_file_name;
    use crate::error::CoreError;

    /// Assembles a 1024-byte FILE record with a valid update sequence array
    /// protecting both sectors.
    pub(crate) fn encode_record(
        sequence_value: u16,
        flags: u16,
        base_reference: u64,
        attribute_stream: &[u8],
    ) -> Vec<u8> {
        let mut buf = vec![0u8; 1024];
        buf[0..4].copy_from_slice(b"FILE");
        buf[4..6].copy_from_slice(&48u16.to_le_bytes()); // usa offset
        buf[6..8].copy_from_slice(&3u16.to_le_bytes()); // usn + 2 sectors
        buf[16..18].copy_from_slice(&sequence_value.to_le_bytes());
        buf[18..20].copy_from_slice(&1u16.to_le_bytes());
        buf[20..22].copy_from_slice(&56u16.to_le_bytes()); // first attribute
        buf[22..24].copy_from_slice(&flags.to_le_bytes());
        buf[32..40].copy_from_slice(&base_reference.to_le_bytes());

        let used = 56 + attribute_stream.len();
        assert!(used <= 1022, "attribute stream too large for the record");
        buf[24..28].copy_from_slice(&(used as u32).to_le_bytes());
        buf[28..32].copy_from_slice(&1024u32.to_le_bytes());
        buf[56..used].copy_from_slice(attribute_stream);

        // Update sequence array: sequence number 0x0001, saved tails taken
        // from whatever the attribute stream put there.
        let usn = 0x0001u16;
        buf[48..50].copy_from_slice(&usn.to_le_bytes());
        for sector in 0..2 {
            let tail = (sector + 1) * 512 - 2;
            let entry = 50 + sector * 2;
            buf[entry] = buf[tail];
            buf[entry + 1] = buf[tail + 1];
            buf[tail..tail + 2].copy_from_slice(&usn.to_le_bytes());
        }
        buf
    }

    pub(crate) fn simple_record(sequence_value: u16, flags: u16, name: &str) -> Vec<u8> {
        let si = encode_resident(0x10, "", &vec![0u8; 48]);
        let fname = encode_resident(
            0x30,
            "",
            &encode_file_name(MftReference { inum: 5, sequence: 5 }, 1, name),
        );
        let data = encode_resident(0x80, "", b"contents");
        encode_record(sequence_value, flags, 0, &with_end_marker(&[si, fname, data]))
    }

    #[test]
    fn test_parse_simple_record() {
        let record = simple_record(7, FLAG_IN_USE, "a.txt");
        let entry = MftEntry::parse(12, &record, 512).unwrap();
        assert_eq!(entry.inum, 12);
        assert_eq!(entry.sequence_value, 7);
        assert!(entry.is_in_use());
        assert!(!entry.is_directory());
        assert!(entry.is_base_record());
        assert_eq!(entry.file_name().unwrap().name, "a.txt");
        assert_eq!(entry.data_attributes().len(), 1);
    }

    #[test]
    fn test_flags_byte_zero() {
        let record = simple_record(1, 0x0000, "gone.txt");
        let entry = MftEntry::parse(3, &record, 512).unwrap();
        assert!(!entry.is_in_use());
        assert!(!entry.is_directory());
    }

    #[test]
    fn test_name_prefers_win32_over_dos() {
        let parent = MftReference { inum: 5, sequence: 5 };
        let si = encode_resident(0x10, "", &vec![0u8; 48]);
        let dos = encode_resident(0x30, "", &encode_file_name(parent, 2, "LONGFI~1.TXT"));
        let win32 = encode_resident(0x30, "", &encode_file_name(parent, 1, "long file name.txt"));
        let record = encode_record(1, FLAG_IN_USE, 0, &with_end_marker(&[si, dos, win32]));

        let entry = MftEntry::parse(9, &record, 512).unwrap();
        assert_eq!(entry.file_name().unwrap().name, "long file name.txt");
    }

    #[test]
    fn test_bad_signature_rejected() {
        let mut record = simple_record(1, 0, "x");
        record[0..4].copy_from_slice(b"BAAD");
        match MftEntry::parse(0, &record, 512).unwrap_err() {
            CoreError::BadSignature { expected, found } => {
                assert_eq!(&expected, b"FILE");
                assert_eq!(&found, b"BAAD");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_torn_record_rejected() {
        let mut record = simple_record(1, 0, "x");
        record[510] ^= 0xFF;
        assert!(matches!(
            MftEntry::parse(0, &record, 512).unwrap_err(),
            CoreError::FixupMismatch { .. }
        ));
    }

    #[test]
    fn test_non_resident_data_record() {
        let data = encode_non_resident(0x80, 4096, 4096, &[0x11, 0x01, 0x30, 0x00]);
        let record = encode_record(2, FLAG_IN_USE, 0, &with_end_marker(&[data]));
        let entry = MftEntry::parse(2, &record, 512).unwrap();
        assert_eq!(entry.data_attributes().len(), 1);
        assert_eq!(entry.data_attributes()[0].runs().len(), 1);
    }
}
