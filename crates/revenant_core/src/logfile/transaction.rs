//! Transaction assembly over decoded client records.

use super::ops::LogOperation;
use super::record::LogRecord;
use crate::usnjrnl::embedded_usn;

/// All client records sharing a transaction id, ordered by LSN ascending.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub transaction_num: u32,
    /// (lsn, redo_op, undo_op) per record, LSN ascending.
    pub all_opcodes: Vec<(u64, LogOperation, LogOperation)>,
    pub contains_usn: bool,
    /// `(lsn, usn)` tuples harvested from journal-append redo payloads.
    ///
    /// The USN value sits at index 1 of each tuple; the correlator's match
    /// predicate compares exactly that position. Do not reorder the tuple.
    pub usns: Vec<(u64, u64)>,
}

impl Transaction {
    /// Builds one transaction from its records. `records` need not arrive
    /// sorted; the result orders opcodes and usns by LSN ascending.
    pub fn assemble(transaction_num: u32, records: &[&LogRecord]) -> Self {
        let mut ordered: Vec<&LogRecord> = records.to_vec();
        ordered.sort_by_key(|r| r.lsn);

        let mut all_opcodes = Vec::with_capacity(ordered.len());
        let mut usns = Vec::new();
        for record in &ordered {
            all_opcodes.push((record.lsn, record.redo_op, record.undo_op));
            // A journal append is logged as a non-resident value update whose
            // payload starts with a USN_RECORD_V2 header.
            if record.redo_op == LogOperation::UpdateNonresidentValue {
                if let Some(usn) = embedded_usn(&record.redo_data) {
                    usns.push((record.lsn, usn));
                }
            }
        }

        Self {
            transaction_num,
            contains_usn: !usns.is_empty(),
            all_opcodes,
            usns,
        }
    }

    /// First (lowest) LSN of the transaction; used to order transactions.
    pub fn first_lsn(&self) -> u64 {
        self.all_opcodes.first().map(|(lsn, _, _)| *lsn).unwrap_or(0)
    }
}
