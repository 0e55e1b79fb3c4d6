//! Cross-artifact correlation: $UsnJrnl records joined to their $LogFile
//! transactions, organized per MFT entry and sequence value.
//!
//! The join key is the USN value. A transaction matches a journal record
//! when any of its embedded `(lsn, usn)` tuples carries the record's usn at
//! index 1. The relation is many-to-many and is never deduplicated: every
//! sharing pair is a distinct match.

use std::collections::{BTreeMap, HashMap};

use crate::error::{CoreError, Result};
use crate::logfile::{LogFile, Transaction};
use crate::mft::Mft;
use crate::usnjrnl::{UsnJrnl, UsnRecord};

/// Shown when an entry has no surviving $FILE_NAME attribute.
pub const UNKNOWN_NAME: &str = "~unknown~";

/// One (journal record, transaction) pair sharing a USN value.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub usn_record: &'a UsnRecord,
    pub transaction: &'a Transaction,
}

/// The matches of one past incarnation (sequence value) of an entry.
#[derive(Debug, Clone)]
pub struct SequenceHistory<'a> {
    pub inum: u64,
    pub sequence_value: u16,
    /// Ordered by journal record stream order, then transaction order.
    pub matches: Vec<Match<'a>>,
}

/// The reconstructed history of one MFT entry.
#[derive(Debug, Clone)]
pub struct MftEntryHistory<'a> {
    pub inum: u64,
    pub current_sequence: u16,
    pub is_in_use: bool,
    pub current_file_name: String,
    /// Keyed by sequence value, ascending.
    pub per_sequence: BTreeMap<u16, SequenceHistory<'a>>,
}

impl<'a> MftEntryHistory<'a> {
    /// Sequence histories older than the entry's current incarnation.
    pub fn deleted_sequences(&self) -> Vec<&SequenceHistory<'a>> {
        self.per_sequence
            .values()
            .filter(|h| h.sequence_value < self.current_sequence)
            .collect()
    }

    pub fn has_deleted_history(&self) -> bool {
        !self.deleted_sequences().is_empty()
    }
}

/// Lookup from USN value to the transactions embedding it, in transaction
/// order. Built once; replaces the naive scan over every transaction per
/// journal record with identical results.
struct UsnIndex<'a> {
    by_usn: HashMap<u64, Vec<&'a Transaction>>,
}

impl<'a> UsnIndex<'a> {
    fn build(transactions: &'a [Transaction]) -> Self {
        let mut by_usn: HashMap<u64, Vec<&'a Transaction>> = HashMap::new();
        for transaction in transactions {
            if !transaction.contains_usn {
                continue;
            }
            // One entry per embedded tuple: a transaction carrying the same
            // usn twice matches twice.
            for &(_lsn, usn) in &transaction.usns {
                by_usn.entry(usn).or_default().push(transaction);
            }
        }
        Self { by_usn }
    }

    fn lookup(&self, usn: u64) -> &[&'a Transaction] {
        self.by_usn.get(&usn).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn entry_history<'a>(
    mft: &Mft,
    index: &UsnIndex<'a>,
    inum: u64,
    buckets: &BTreeMap<u16, Vec<&'a UsnRecord>>,
) -> Result<MftEntryHistory<'a>> {
    let entry = mft
        .entries
        .get(&inum)
        .ok_or(CoreError::InumNotFound { inum })?;

    let mut per_sequence = BTreeMap::new();
    for (&sequence_value, records) in buckets {
        let mut matches = Vec::new();
        for usn_record in records {
            for &transaction in index.lookup(usn_record.usn) {
                matches.push(Match {
                    usn_record,
                    transaction,
                });
            }
        }
        per_sequence.insert(
            sequence_value,
            SequenceHistory {
                inum,
                sequence_value,
                matches,
            },
        );
    }

    Ok(MftEntryHistory {
        inum,
        current_sequence: entry.sequence_value,
        is_in_use: entry.is_in_use(),
        current_file_name: entry
            .file_name()
            .map(|f| f.name.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        per_sequence,
    })
}

/// Joins the three artifacts. With `filter` set, only that entry's history
/// is built ([`CoreError::InumNotFound`] if the journal has no records for
/// it); otherwise every inum present in the journal is covered, ascending,
/// skipping entries absent from the parsed MFT with a diagnostic.
pub fn correlate<'a>(
    mft: &Mft,
    usnjrnl: &'a UsnJrnl,
    logfile: &'a LogFile,
    filter: Option<u64>,
) -> Result<Vec<MftEntryHistory<'a>>> {
    let grouped = usnjrnl.grouped_by_entry();
    let index = UsnIndex::build(&logfile.transactions);

    match filter {
        Some(inum) => {
            let buckets = grouped
                .get(&inum)
                .ok_or(CoreError::InumNotFound { inum })?;
            Ok(vec![entry_history(mft, &index, inum, buckets)?])
        }
        None => {
            let mut histories = Vec::with_capacity(grouped.len());
            for (&inum, buckets) in &grouped {
                match entry_history(mft, &index, inum, buckets) {
                    Ok(history) => histories.push(history),
                    Err(err) => log::warn!("skipping history for entry {inum}: {err}"),
                }
            }
            Ok(histories)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::LogOperation;
    use crate::mft::{Mft, DEFAULT_MFT_RECORD_SIZE};
    use crate::usnjrnl::tests::encode_usn_record;

    fn mft_fixture() -> Vec<u8> {
        // Inums 0..42 as filler; inum 42 with sequence value 4.
        let mut records = Vec::new();
        for _ in 0..42 {
            records.push(crate::mft::tests_support::simple_record(1, 0x0001, "filler"));
        }
        records.push(crate::mft::tests_support::simple_record(4, 0x0001, "current.txt"));
        records.concat()
    }

    fn usn_transaction(num: u32, lsn: u64, usn: u64) -> Transaction {
        Transaction {
            transaction_num: num,
            all_opcodes: vec![
                (lsn, LogOperation::UpdateNonresidentValue, LogOperation::Noop),
                (lsn + 8, LogOperation::ForgetTransaction, LogOperation::Noop),
            ],
            contains_usn: true,
            usns: vec![(lsn, usn)],
        }
    }

    fn logfile_with(transactions: Vec<Transaction>) -> LogFile {
        LogFile {
            records: Vec::new(),
            transactions,
            faulty_pages: Vec::new(),
            pages_parsed: 0,
        }
    }

    #[test]
    fn test_single_match_lands_under_entry_and_sequence() {
        let file = mft_fixture();
        let mut mft = Mft::from_extracted(&file, DEFAULT_MFT_RECORD_SIZE);
        mft.parse_all();

        let stream = encode_usn_record(0x12340, 42, 3, "victim.txt");
        let jrnl = UsnJrnl::parse(&stream, None).unwrap();
        let log = logfile_with(vec![usn_transaction(9, 0x500, 0x12340)]);

        let histories = correlate(&mft, &jrnl, &log, None).unwrap();
        assert_eq!(histories.len(), 1);
        let history = &histories[0];
        assert_eq!(history.inum, 42);
        assert_eq!(history.current_sequence, 4);
        assert_eq!(history.current_file_name, "current.txt");

        let seq = &history.per_sequence[&3];
        assert_eq!(seq.matches.len(), 1);
        let m = &seq.matches[0];
        assert_eq!(m.usn_record.usn, 0x12340);
        assert_eq!(m.transaction.transaction_num, 9);
        // every match shares its usn with the transaction's embedded set
        assert!(m.transaction.usns.iter().any(|&(_, u)| u == m.usn_record.usn));
    }

    #[test]
    fn test_many_to_many_matches_not_deduplicated() {
        let file = mft_fixture();
        let mut mft = Mft::from_extracted(&file, DEFAULT_MFT_RECORD_SIZE);
        mft.parse_all();

        let mut stream = encode_usn_record(0x100, 42, 3, "a");
        stream.extend(encode_usn_record(0x100, 42, 3, "b"));
        let jrnl = UsnJrnl::parse(&stream, None).unwrap();
        let log = logfile_with(vec![
            usn_transaction(1, 0x500, 0x100),
            usn_transaction(2, 0x600, 0x100),
        ]);

        let histories = correlate(&mft, &jrnl, &log, None).unwrap();
        let seq = &histories[0].per_sequence[&3];
        // two records x two transactions = four distinct matches
        assert_eq!(seq.matches.len(), 4);
        assert_eq!(seq.matches[0].transaction.transaction_num, 1);
        assert_eq!(seq.matches[1].transaction.transaction_num, 2);
    }

    #[test]
    fn test_deleted_history_filter() {
        let file = mft_fixture();
        let mut mft = Mft::from_extracted(&file, DEFAULT_MFT_RECORD_SIZE);
        mft.parse_all();

        let mut stream = encode_usn_record(0x10, 42, 3, "old");
        stream.extend(encode_usn_record(0x20, 42, 4, "current"));
        let jrnl = UsnJrnl::parse(&stream, None).unwrap();
        let log = logfile_with(vec![]);

        let histories = correlate(&mft, &jrnl, &log, Some(42)).unwrap();
        let history = &histories[0];
        assert!(history.has_deleted_history());
        let deleted = history.deleted_sequences();
        assert_eq!(deleted.len(), 1);
        assert!(deleted.iter().all(|h| h.sequence_value < history.current_sequence));
    }

    #[test]
    fn test_filter_for_absent_inum_errors() {
        let file = mft_fixture();
        let mut mft = Mft::from_extracted(&file, DEFAULT_MFT_RECORD_SIZE);
        mft.parse_all();
        let jrnl = UsnJrnl::parse(&[0u8; 64], None).unwrap();
        let log = logfile_with(vec![]);

        assert!(matches!(
            correlate(&mft, &jrnl, &log, Some(42)).unwrap_err(),
            CoreError::InumNotFound { inum: 42 }
        ));
    }

    #[test]
    fn test_unknown_name_placeholder() {
        // An MFT whose record 0 carries no $FILE_NAME attribute.
        let record = crate::mft::tests_support::record_without_name();
        let mut mft = Mft::from_extracted(&record, DEFAULT_MFT_RECORD_SIZE);
        mft.parse_all();

        let stream = encode_usn_record(0x10, 0, 1, "ghost");
        let jrnl = UsnJrnl::parse(&stream, None).unwrap();
        let log = logfile_with(vec![]);

        let histories = correlate(&mft, &jrnl, &log, None).unwrap();
        assert_eq!(histories[0].current_file_name, UNKNOWN_NAME);
    }
}
