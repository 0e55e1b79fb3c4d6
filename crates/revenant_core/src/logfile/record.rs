//! LFS client record decoding.

use super::ops::LogOperation;
use crate::error::{CoreError, Result};

/// Size of the LFS record header preceding the client data.
pub const LFS_HEADER_SIZE: usize = 48;

/// Upper bound on a single record's client data. Real records span at most a
/// handful of pages; anything larger is treated as corruption.
pub const MAX_CLIENT_DATA: u32 = 0x10_0000;

/// Record type field of the LFS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    Update,
    Checkpoint,
    Unknown(u32),
}

impl LogRecordType {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Update,
            2 => Self::Checkpoint,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for LogRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update => write!(f, "Update"),
            Self::Checkpoint => write!(f, "Checkpoint"),
            Self::Unknown(code) => write!(f, "Unknown({code:#x})"),
        }
    }
}

/// One reassembled $LogFile client record: LFS header plus, for update
/// records, the decoded NTFS redo/undo client data.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub lsn: u64,
    /// Previous LSN of the same transaction; zero for the first record.
    pub previous_lsn: u64,
    pub undo_next_lsn: u64,
    pub client_seq_number: u16,
    pub client_index: u16,
    pub record_type: LogRecordType,
    pub transaction_id: u32,
    pub flags: u16,
    pub redo_op: LogOperation,
    pub undo_op: LogOperation,
    pub target_attribute: u16,
    pub record_offset: u16,
    pub attribute_offset: u16,
    pub cluster_block_offset: u16,
    pub target_vcn: u64,
    pub lcns: Vec<u64>,
    pub redo_data: Vec<u8>,
    pub undo_data: Vec<u8>,
}

impl LogRecord {
    /// Peeks the declared client data length from a raw LFS header.
    pub fn peek_client_data_length(header: &[u8]) -> u32 {
        u32::from_le_bytes(header[24..28].try_into().unwrap())
    }

    /// Peeks the LSN; a zero LSN marks the padding tail of a page.
    pub fn peek_lsn(header: &[u8]) -> u64 {
        u64::from_le_bytes(header[0..8].try_into().unwrap())
    }

    /// Decodes a fully reassembled record (header plus client data).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LFS_HEADER_SIZE {
            return Err(CoreError::ReadOutOfRange {
                offset: 0,
                length: LFS_HEADER_SIZE as u64,
                size: bytes.len() as u64,
            });
        }
        let client_data_length = Self::peek_client_data_length(bytes) as usize;
        if bytes.len() < LFS_HEADER_SIZE + client_data_length {
            return Err(CoreError::ReadOutOfRange {
                offset: LFS_HEADER_SIZE as u64,
                length: client_data_length as u64,
                size: bytes.len() as u64,
            });
        }

        let record_type =
            LogRecordType::from_code(u32::from_le_bytes(bytes[32..36].try_into().unwrap()));
        let mut record = Self {
            lsn: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            previous_lsn: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            undo_next_lsn: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            client_seq_number: u16::from_le_bytes(bytes[28..30].try_into().unwrap()),
            client_index: u16::from_le_bytes(bytes[30..32].try_into().unwrap()),
            record_type,
            transaction_id: u32::from_le_bytes(bytes[36..40].try_into().unwrap()),
            flags: u16::from_le_bytes(bytes[40..42].try_into().unwrap()),
            redo_op: LogOperation::Noop,
            undo_op: LogOperation::Noop,
            target_attribute: 0,
            record_offset: 0,
            attribute_offset: 0,
            cluster_block_offset: 0,
            target_vcn: 0,
            lcns: Vec::new(),
            redo_data: Vec::new(),
            undo_data: Vec::new(),
        };

        // Only update records carry the NTFS redo/undo client data layout.
        let client = &bytes[LFS_HEADER_SIZE..LFS_HEADER_SIZE + client_data_length];
        if record_type == LogRecordType::Update && client.len() >= 32 {
            record.redo_op =
                LogOperation::from_code(u16::from_le_bytes(client[0..2].try_into().unwrap()));
            record.undo_op =
                LogOperation::from_code(u16::from_le_bytes(client[2..4].try_into().unwrap()));
            let redo_offset = u16::from_le_bytes(client[4..6].try_into().unwrap()) as usize;
            let redo_length = u16::from_le_bytes(client[6..8].try_into().unwrap()) as usize;
            let undo_offset = u16::from_le_bytes(client[8..10].try_into().unwrap()) as usize;
            let undo_length = u16::from_le_bytes(client[10..12].try_into().unwrap()) as usize;
            record.target_attribute = u16::from_le_bytes(client[12..14].try_into().unwrap());
            let lcn_count = u16::from_le_bytes(client[14..16].try_into().unwrap()) as usize;
            record.record_offset = u16::from_le_bytes(client[16..18].try_into().unwrap());
            record.attribute_offset = u16::from_le_bytes(client[18..20].try_into().unwrap());
            record.cluster_block_offset = u16::from_le_bytes(client[20..22].try_into().unwrap());
            record.target_vcn = u64::from_le_bytes(client[24..32].try_into().unwrap());

            for i in 0..lcn_count {
                let at = 32 + i * 8;
                if at + 8 > client.len() {
                    break;
                }
                record
                    .lcns
                    .push(u64::from_le_bytes(client[at..at + 8].try_into().unwrap()));
            }
            if redo_length > 0 && redo_offset + redo_length <= client.len() {
                record.redo_data = client[redo_offset..redo_offset + redo_length].to_vec();
            }
            if undo_length > 0 && undo_offset + undo_length <= client.len() {
                record.undo_data = client[undo_offset..undo_offset + undo_length].to_vec();
            }
        }

        Ok(record)
    }
}
