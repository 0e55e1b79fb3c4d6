//! NTFS $LogFile redo/undo operation codes.

/// Operation code of a redo or undo action. The set is closed per NTFS
/// convention; anything outside it is carried as `Unknown`, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOperation {
    Noop,
    CompensationLogRecord,
    InitializeFileRecordSegment,
    DeallocateFileRecordSegment,
    WriteEndOfFileRecordSegment,
    CreateAttribute,
    DeleteAttribute,
    UpdateResidentValue,
    UpdateNonresidentValue,
    UpdateMappingPairs,
    DeleteDirtyClusters,
    SetNewAttributeSizes,
    AddIndexEntryRoot,
    DeleteIndexEntryRoot,
    AddIndexEntryAllocation,
    DeleteIndexEntryAllocation,
    WriteEndOfIndexBuffer,
    SetIndexEntryVcnRoot,
    SetIndexEntryVcnAllocation,
    UpdateFileNameRoot,
    UpdateFileNameAllocation,
    SetBitsInNonresidentBitMap,
    ClearBitsInNonresidentBitMap,
    HotFix,
    EndTopLevelAction,
    PrepareTransaction,
    CommitTransaction,
    ForgetTransaction,
    OpenNonresidentAttribute,
    OpenAttributeTableDump,
    AttributeNamesDump,
    DirtyPageTableDump,
    TransactionTableDump,
    UpdateRecordDataRoot,
    UpdateRecordDataAllocation,
    Unknown(u16),
}

impl LogOperation {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x00 => Self::Noop,
            0x01 => Self::CompensationLogRecord,
            0x02 => Self::InitializeFileRecordSegment,
            0x03 => Self::DeallocateFileRecordSegment,
            0x04 => Self::WriteEndOfFileRecordSegment,
            0x05 => Self::CreateAttribute,
            0x06 => Self::DeleteAttribute,
            0x07 => Self::UpdateResidentValue,
            0x08 => Self::UpdateNonresidentValue,
            0x09 => Self::UpdateMappingPairs,
            0x0A => Self::DeleteDirtyClusters,
            0x0B => Self::SetNewAttributeSizes,
            0x0C => Self::AddIndexEntryRoot,
            0x0D => Self::DeleteIndexEntryRoot,
            0x0E => Self::AddIndexEntryAllocation,
            0x0F => Self::DeleteIndexEntryAllocation,
            0x10 => Self::WriteEndOfIndexBuffer,
            0x11 => Self::SetIndexEntryVcnRoot,
            0x12 => Self::SetIndexEntryVcnAllocation,
            0x13 => Self::UpdateFileNameRoot,
            0x14 => Self::UpdateFileNameAllocation,
            0x15 => Self::SetBitsInNonresidentBitMap,
            0x16 => Self::ClearBitsInNonresidentBitMap,
            0x17 => Self::HotFix,
            0x18 => Self::EndTopLevelAction,
            0x19 => Self::PrepareTransaction,
            0x1A => Self::CommitTransaction,
            0x1B => Self::ForgetTransaction,
            0x1C => Self::OpenNonresidentAttribute,
            0x1D => Self::OpenAttributeTableDump,
            0x1E => Self::AttributeNamesDump,
            0x1F => Self::DirtyPageTableDump,
            0x20 => Self::TransactionTableDump,
            0x21 => Self::UpdateRecordDataRoot,
            0x22 => Self::UpdateRecordDataAllocation,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for LogOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown({code:#06x})"),
            known => write!(f, "{known:?}"),
        }
    }
}
