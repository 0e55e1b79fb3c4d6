//! MFT attribute decoding.
//!
//! Walks the attribute stream of a FILE record, resolving resident and
//! non-resident forms, and decodes known attribute bodies eagerly into
//! tagged variants. Unknown attribute types are preserved, never rejected.

pub mod body;
pub mod runlist;

pub use body::{
    AttributeListEntry, FileName, FileNameNamespace, IndexEntry, IndexRoot, MftReference,
    StandardInformation, VolumeInformation,
};
pub use runlist::{decode_runlist, total_clusters, Run};

use crate::error::{CoreError, Result};
use body::utf16le_string;

/// End-of-attributes marker in a FILE record.
pub const END_MARKER: u32 = 0xFFFF_FFFF;

/// NTFS attribute type codes. Codes outside the closed set survive as
/// `Unknown` rather than failing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeType {
    StandardInformation,
    AttributeList,
    FileName,
    ObjectId,
    SecurityDescriptor,
    VolumeName,
    VolumeInformation,
    Data,
    IndexRoot,
    IndexAllocation,
    Bitmap,
    ReparsePoint,
    EaInformation,
    Ea,
    LoggedUtilityStream,
    Unknown(u32),
}

impl AttributeType {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x10 => Self::StandardInformation,
            0x20 => Self::AttributeList,
            0x30 => Self::FileName,
            0x40 => Self::ObjectId,
            0x50 => Self::SecurityDescriptor,
            0x60 => Self::VolumeName,
            0x70 => Self::VolumeInformation,
            0x80 => Self::Data,
            0x90 => Self::IndexRoot,
            0xA0 => Self::IndexAllocation,
            0xB0 => Self::Bitmap,
            0xC0 => Self::ReparsePoint,
            0xD0 => Self::EaInformation,
            0xE0 => Self::Ea,
            0x100 => Self::LoggedUtilityStream,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::StandardInformation => 0x10,
            Self::AttributeList => 0x20,
            Self::FileName => 0x30,
            Self::ObjectId => 0x40,
            Self::SecurityDescriptor => 0x50,
            Self::VolumeName => 0x60,
            Self::VolumeInformation => 0x70,
            Self::Data => 0x80,
            Self::IndexRoot => 0x90,
            Self::IndexAllocation => 0xA0,
            Self::Bitmap => 0xB0,
            Self::ReparsePoint => 0xC0,
            Self::EaInformation => 0xD0,
            Self::Ea => 0xE0,
            Self::LoggedUtilityStream => 0x100,
            Self::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StandardInformation => write!(f, "$STANDARD_INFORMATION"),
            Self::AttributeList => write!(f, "$ATTRIBUTE_LIST"),
            Self::FileName => write!(f, "$FILE_NAME"),
            Self::ObjectId => write!(f, "$OBJECT_ID"),
            Self::SecurityDescriptor => write!(f, "$SECURITY_DESCRIPTOR"),
            Self::VolumeName => write!(f, "$VOLUME_NAME"),
            Self::VolumeInformation => write!(f, "$VOLUME_INFORMATION"),
            Self::Data => write!(f, "$DATA"),
            Self::IndexRoot => write!(f, "$INDEX_ROOT"),
            Self::IndexAllocation => write!(f, "$INDEX_ALLOCATION"),
            Self::Bitmap => write!(f, "$BITMAP"),
            Self::ReparsePoint => write!(f, "$REPARSE_POINT"),
            Self::EaInformation => write!(f, "$EA_INFORMATION"),
            Self::Ea => write!(f, "$EA"),
            Self::LoggedUtilityStream => write!(f, "$LOGGED_UTILITY_STREAM"),
            Self::Unknown(code) => write!(f, "$UNKNOWN({code:#x})"),
        }
    }
}

/// Extent description of a non-resident attribute.
#[derive(Debug, Clone)]
pub struct NonResidentExtent {
    pub starting_vcn: u64,
    pub last_vcn: u64,
    pub allocated_size: u64,
    pub real_size: u64,
    pub initialized_size: u64,
    pub runs: Vec<Run>,
}

/// Storage form of an attribute.
#[derive(Debug, Clone)]
pub enum AttributeForm {
    Resident { indexed: bool },
    NonResident(NonResidentExtent),
}

/// Eagerly decoded attribute content.
#[derive(Debug, Clone)]
pub enum AttributeBody {
    StandardInformation(StandardInformation),
    FileName(FileName),
    IndexRoot(IndexRoot),
    AttributeList(Vec<AttributeListEntry>),
    VolumeName(String),
    VolumeInformation(VolumeInformation),
    /// Resident $DATA content.
    Data(Vec<u8>),
    /// Resident content of a type without a dedicated decoder.
    Unknown(Vec<u8>),
    /// Non-resident: the content lives in the runlist, not the record.
    Stream,
}

/// One decoded MFT attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub type_code: AttributeType,
    pub name: String,
    pub attribute_id: u16,
    pub flags: u16,
    pub form: AttributeForm,
    pub body: AttributeBody,
}

impl Attribute {
    /// Runs of a non-resident attribute, empty for resident ones.
    pub fn runs(&self) -> &[Run] {
        match &self.form {
            AttributeForm::NonResident(extent) => &extent.runs,
            AttributeForm::Resident { .. } => &[],
        }
    }
}

fn out_of_range(offset: usize, length: usize, size: usize) -> CoreError {
    CoreError::ReadOutOfRange {
        offset: offset as u64,
        length: length as u64,
        size: size as u64,
    }
}

fn decode_resident_body(type_code: AttributeType, content: &[u8]) -> Result<AttributeBody> {
    Ok(match type_code {
        AttributeType::StandardInformation => {
            AttributeBody::StandardInformation(StandardInformation::parse(content)?)
        }
        AttributeType::FileName => AttributeBody::FileName(FileName::parse(content)?),
        AttributeType::IndexRoot => AttributeBody::IndexRoot(IndexRoot::parse(content)?),
        AttributeType::AttributeList => {
            AttributeBody::AttributeList(AttributeListEntry::parse_list(content))
        }
        AttributeType::VolumeName => AttributeBody::VolumeName(utf16le_string(content)),
        AttributeType::VolumeInformation => {
            AttributeBody::VolumeInformation(VolumeInformation::parse(content)?)
        }
        AttributeType::Data => AttributeBody::Data(content.to_vec()),
        _ => AttributeBody::Unknown(content.to_vec()),
    })
}

/// Decodes one attribute record. Returns the attribute and its total length.
fn parse_attribute(record: &[u8]) -> Result<(Attribute, usize)> {
    if record.len() < 16 {
        return Err(out_of_range(0, 16, record.len()));
    }
    let type_code = AttributeType::from_code(u32::from_le_bytes(record[0..4].try_into().unwrap()));
    let record_length = u32::from_le_bytes(record[4..8].try_into().unwrap()) as usize;
    if record_length < 16 || record_length > record.len() {
        return Err(out_of_range(4, record_length, record.len()));
    }
    let non_resident = record[8] != 0;
    let name_length = record[9] as usize * 2;
    let name_offset = u16::from_le_bytes(record[10..12].try_into().unwrap()) as usize;
    let flags = u16::from_le_bytes(record[12..14].try_into().unwrap());
    let attribute_id = u16::from_le_bytes(record[14..16].try_into().unwrap());

    let name = if name_length > 0 {
        if name_offset + name_length > record_length {
            return Err(out_of_range(name_offset, name_length, record_length));
        }
        utf16le_string(&record[name_offset..name_offset + name_length])
    } else {
        String::new()
    };

    let (form, body) = if non_resident {
        if record_length < 64 {
            return Err(out_of_range(16, 64, record_length));
        }
        let starting_vcn = u64::from_le_bytes(record[16..24].try_into().unwrap());
        let last_vcn = u64::from_le_bytes(record[24..32].try_into().unwrap());
        let runlist_offset = u16::from_le_bytes(record[32..34].try_into().unwrap()) as usize;
        let allocated_size = u64::from_le_bytes(record[40..48].try_into().unwrap());
        let real_size = u64::from_le_bytes(record[48..56].try_into().unwrap());
        let initialized_size = u64::from_le_bytes(record[56..64].try_into().unwrap());
        if runlist_offset > record_length {
            return Err(out_of_range(runlist_offset, 0, record_length));
        }
        let runs = decode_runlist(&record[runlist_offset..record_length])?;
        (
            AttributeForm::NonResident(NonResidentExtent {
                starting_vcn,
                last_vcn,
                allocated_size,
                real_size,
                initialized_size,
                runs,
            }),
            AttributeBody::Stream,
        )
    } else {
        if record_length < 24 {
            return Err(out_of_range(16, 24, record_length));
        }
        let content_length = u32::from_le_bytes(record[16..20].try_into().unwrap()) as usize;
        let content_offset = u16::from_le_bytes(record[20..22].try_into().unwrap()) as usize;
        let indexed = record[22] != 0;
        if content_offset + content_length > record_length {
            return Err(out_of_range(content_offset, content_length, record_length));
        }
        let content = &record[content_offset..content_offset + content_length];
        (
            AttributeForm::Resident { indexed },
            decode_resident_body(type_code, content)?,
        )
    };

    Ok((
        Attribute {
            type_code,
            name,
            attribute_id,
            flags,
            form,
            body,
        },
        record_length,
    ))
}

/// Walks the attribute stream of a record body, starting at `first_offset`,
/// until the end marker.
pub fn parse_attributes(record: &[u8], first_offset: usize) -> Result<Vec<Attribute>> {
    let mut attributes = Vec::new();
    let mut cursor = first_offset;
    loop {
        if cursor + 4 > record.len() {
            return Err(out_of_range(cursor, 4, record.len()));
        }
        let code = u32::from_le_bytes(record[cursor..cursor + 4].try_into().unwrap());
        if code == END_MARKER {
            break;
        }
        let (attribute, length) = parse_attribute(&record[cursor..])?;
        attributes.push(attribute);
        cursor += length;
    }
    Ok(attributes)
}
