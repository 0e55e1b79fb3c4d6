//! # Revenant Core
//!
//! Parsing, normalization, and cross-artifact correlation for NTFS
//! forensics. Three independent on-disk structures are decoded from
//! untrusted input and joined into a per-file history:
//!
//! - the MFT, the catalog of every file and directory record;
//! - the $LogFile transaction journal of metadata changes;
//! - the $UsnJrnl change log keyed by MFT entry and sequence value.
//!
//! The entry points mirror that split: [`boot`] turns a raw image into a
//! [`boot::Geometry`], [`mft::Mft`] iterates FILE records and extracts
//! $DATA streams, [`logfile::LogFile`] reassembles client records into
//! transactions, [`usnjrnl::UsnJrnl`] decodes the change journal, and
//! [`history::correlate`] joins all three.
//!
//! Decoders never mutate their input; fixup application and record
//! reassembly work on copies. Per-record corruption is recovered locally
//! and reported through `log`; structural corruption surfaces as
//! [`CoreError`].

pub mod attr;
pub mod boot;
pub mod error;
pub mod fixup;
pub mod history;
pub mod logfile;
pub mod mft;
pub mod source;
pub mod time;
pub mod usnjrnl;

pub use attr::{Attribute, AttributeBody, AttributeType, FileName, MftReference, Run};
pub use boot::{BootSector, FilesystemOffset, Geometry, DEFAULT_SECTOR_SIZE};
pub use error::{CoreError, Result};
pub use history::{correlate, Match, MftEntryHistory, SequenceHistory, UNKNOWN_NAME};
pub use logfile::{FaultyPage, LogFile, LogOperation, LogRecord, Transaction, PAGE_SIZE};
pub use mft::{InumSelector, Mft, MftEntry, MftStatistics, DEFAULT_MFT_RECORD_SIZE, LOGFILE_INUM};
pub use source::ByteSource;
pub use usnjrnl::{UsnJrnl, UsnRecord};
