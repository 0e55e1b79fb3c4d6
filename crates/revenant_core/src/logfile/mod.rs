//! $LogFile engine: RCRD page decoding, client record reassembly across
//! pages, transaction grouping.
//!
//! The record area is a ring: pages reappear in file order that does not
//! match log order once the log has wrapped. Reassembly therefore walks
//! pages in ascending last-LSN order. A record whose declared length runs
//! past its page is completed from the data area of the next page in that
//! order. Pages that fail fixup, carry a bad magic, or strand a
//! continuation are handed back verbatim for the error dump directory and
//! excluded from output.

mod ops;
mod page;
mod record;
mod transaction;

pub use ops::LogOperation;
pub use page::{RecordPage, PAGE_SIZE, RCRD_SIGNATURE};
pub use record::{LogRecord, LogRecordType, LFS_HEADER_SIZE, MAX_CLIENT_DATA};
pub use transaction::Transaction;

use std::collections::BTreeMap;

use crate::error::CoreError;

/// Number of restart-area pages at the head of the stream, before the ring.
pub const RESTART_PAGES: usize = 2;

/// A page excluded from parsing, kept verbatim for the dump directory.
#[derive(Debug, Clone)]
pub struct FaultyPage {
    /// Page index within the record area.
    pub index: usize,
    /// The original (pre-fixup) 4096 bytes.
    pub bytes: Vec<u8>,
}

/// A partially assembled record waiting for its continuation.
struct PendingRecord {
    buf: Vec<u8>,
    needed: usize,
    pages: Vec<usize>,
}

/// The parsed $LogFile.
pub struct LogFile {
    /// Client records in reassembly (LSN-walk) order.
    pub records: Vec<LogRecord>,
    /// Transactions ordered by first LSN; populated by
    /// [`connect_transactions`](Self::connect_transactions).
    pub transactions: Vec<Transaction>,
    pub faulty_pages: Vec<FaultyPage>,
    /// RCRD pages that decoded and reassembled cleanly.
    pub pages_parsed: usize,
}

fn align8(value: usize) -> usize {
    (value + 7) & !7
}

impl LogFile {
    /// Parses the record area of an extracted $LogFile stream. `limit` caps
    /// the number of pages examined. Never fails as a whole: bad pages end
    /// up in `faulty_pages`.
    pub fn parse(data: &[u8], limit: Option<usize>) -> Self {
        Self::parse_with(data, limit, |_| {})
    }

    /// Like [`parse`](Self::parse), reporting each examined page index.
    pub fn parse_with(data: &[u8], limit: Option<usize>, mut on_page: impl FnMut(usize)) -> Self {
        let ring = data.get(RESTART_PAGES * PAGE_SIZE..).unwrap_or(&[]);
        let total_pages = ring.len() / PAGE_SIZE;
        let page_count = limit.map_or(total_pages, |l| l.min(total_pages));

        let mut pages = Vec::new();
        let mut faulty_indices: Vec<usize> = Vec::new();
        for index in 0..page_count {
            let chunk = &ring[index * PAGE_SIZE..(index + 1) * PAGE_SIZE];
            match RecordPage::parse(index, chunk) {
                Ok(page) => pages.push(page),
                Err(err) => {
                    log::warn!("dumping $LogFile page {index}: {err}");
                    faulty_indices.push(index);
                }
            }
            on_page(index);
        }

        // Log order, not file order: the ring may have wrapped.
        pages.sort_by_key(|p| (p.last_lsn, p.index));

        let mut records = Vec::new();
        let mut pending: Option<PendingRecord> = None;
        for page in &pages {
            let valid_end = page.valid_end();
            let mut cursor = page.data_start;
            let records_mark = records.len();
            // Pages whose records were drawn into this page's reassembly;
            // they share its fate if the page turns out faulty.
            let mut contributed: Vec<usize> = Vec::new();
            let mut page_failed = false;

            if let Some(mut partial) = pending.take() {
                let missing = partial.needed - partial.buf.len();
                let available = valid_end.saturating_sub(cursor);
                let take = missing.min(available);
                partial
                    .buf
                    .extend_from_slice(&page.data[cursor..cursor + take]);
                partial.pages.push(page.index);
                if partial.buf.len() < partial.needed {
                    pending = Some(partial);
                    continue;
                }
                cursor = align8(cursor + take);
                match LogRecord::parse(&partial.buf) {
                    Ok(record) => {
                        contributed = partial.pages;
                        contributed.pop(); // the current page is tracked below
                        records.push(record);
                    }
                    Err(err) => {
                        log::warn!("discarding spanning record: {err}");
                        faulty_indices.extend(&partial.pages);
                        page_failed = true;
                    }
                }
            }

            while !page_failed && cursor + LFS_HEADER_SIZE <= valid_end {
                let header = &page.data[cursor..cursor + LFS_HEADER_SIZE];
                if LogRecord::peek_lsn(header) == 0 {
                    break; // padding tail
                }
                let client_len = LogRecord::peek_client_data_length(header);
                if client_len > MAX_CLIENT_DATA {
                    log::warn!(
                        "dumping $LogFile page {}: client data length {client_len:#x} is implausible",
                        page.index
                    );
                    page_failed = true;
                    break;
                }
                let total = LFS_HEADER_SIZE + client_len as usize;
                if cursor + total <= valid_end {
                    match LogRecord::parse(&page.data[cursor..cursor + total]) {
                        Ok(record) => records.push(record),
                        Err(err) => {
                            log::warn!("dumping $LogFile page {}: {err}", page.index);
                            page_failed = true;
                            break;
                        }
                    }
                    cursor = align8(cursor + total);
                } else {
                    pending = Some(PendingRecord {
                        buf: page.data[cursor..valid_end].to_vec(),
                        needed: total,
                        pages: vec![page.index],
                    });
                    break;
                }
            }

            // A faulty page contributes no records at all, and neither do
            // the pages that fed a spanning record into it.
            if page_failed {
                records.truncate(records_mark);
                faulty_indices.push(page.index);
                faulty_indices.extend(contributed);
            }
        }

        if let Some(partial) = pending {
            for &index in &partial.pages {
                let err = CoreError::LogPageIncomplete {
                    index,
                    reason: "client record continuation never completed",
                };
                log::warn!("dumping $LogFile page: {err}");
            }
            faulty_indices.extend(partial.pages);
        }

        faulty_indices.sort_unstable();
        faulty_indices.dedup();
        let faulty_pages = faulty_indices
            .iter()
            .map(|&index| FaultyPage {
                index,
                bytes: ring[index * PAGE_SIZE..(index + 1) * PAGE_SIZE].to_vec(),
            })
            .collect::<Vec<_>>();
        let pages_parsed = page_count - faulty_pages.len();

        Self {
            records,
            transactions: Vec::new(),
            faulty_pages,
            pages_parsed,
        }
    }

    /// Groups the decoded records into transactions, ordered by first LSN.
    pub fn connect_transactions(&mut self) {
        let mut grouped: BTreeMap<u32, Vec<&LogRecord>> = BTreeMap::new();
        for record in &self.records {
            grouped.entry(record.transaction_id).or_default().push(record);
        }
        let mut transactions: Vec<Transaction> = grouped
            .iter()
            .map(|(&id, records)| Transaction::assemble(id, records))
            .collect();
        transactions.sort_by_key(Transaction::first_lsn);
        self.transactions = transactions;
    }
}

#[cfg(test)]
mod tests {
    use super::page::tests::{blank_page, seal_page};
    use super::record::tests::encode_update_record;
    use super::*;
    use crate::usnjrnl::tests::encode_usn_record;

    /// Lays records into a fresh page at `data_start` (0x40), 8-aligned,
    /// then seals the fixup array. Returns the raw page.
    fn page_with_records(last_lsn: u64, records: &[&[u8]]) -> Vec<u8> {
        let mut cursor = 0x40usize;
        let mut buf = blank_page(last_lsn, 0);
        for rec in records {
            buf[cursor..cursor + rec.len()].copy_from_slice(rec);
            cursor = align8(cursor + rec.len());
        }
        buf[24..26].copy_from_slice(&(cursor as u16).to_le_bytes());
        seal_page(&mut buf);
        buf
    }

    /// A stream with two empty restart pages followed by the given pages.
    fn stream(pages: &[Vec<u8>]) -> Vec<u8> {
        let mut out = vec![0u8; RESTART_PAGES * PAGE_SIZE];
        for page in pages {
            out.extend_from_slice(page);
        }
        out
    }

    #[test]
    fn test_single_page_with_two_records() {
        let a = encode_update_record(0x100, 0, 1, 0x02, 0x03, b"aa", b"bb");
        let b = encode_update_record(0x140, 0x100, 1, 0x07, 0x07, b"cc", b"");
        let data = stream(&[page_with_records(0x140, &[&a, &b])]);

        let log = LogFile::parse(&data, None);
        assert_eq!(log.pages_parsed, 1);
        assert!(log.faulty_pages.is_empty());
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[0].lsn, 0x100);
        assert_eq!(log.records[1].lsn, 0x140);
    }

    #[test]
    fn test_record_spanning_two_pages() {
        // A large record: header declares more client data than one page
        // holds, so the prefix sits on page A and the rest on page B.
        let big_payload = vec![0xA5u8; PAGE_SIZE];
        let big = encode_update_record(0x200, 0, 2, 0x07, 0x07, &big_payload, b"");
        let first_part = PAGE_SIZE - 0x40;

        let mut page_a = blank_page(0x200, 0);
        page_a[0x40..PAGE_SIZE].copy_from_slice(&big[..first_part]);
        seal_page(&mut page_a);

        let rest = &big[first_part..];
        let mut page_b = blank_page(0x300, 0);
        page_b[0x40..0x40 + rest.len()].copy_from_slice(rest);
        page_b[24..26].copy_from_slice(&((0x40 + rest.len()) as u16).to_le_bytes());
        seal_page(&mut page_b);

        let data = stream(&[page_a, page_b]);
        let log = LogFile::parse(&data, None);
        assert!(log.faulty_pages.is_empty());
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].lsn, 0x200);
        assert_eq!(log.records[0].redo_data, big_payload);
    }

    #[test]
    fn test_wrapped_pages_reassembled_in_lsn_order() {
        // Same spanning record, but the continuation page appears first in
        // the file: LSN ordering must put it back together.
        let big_payload = vec![0x5Au8; PAGE_SIZE];
        let big = encode_update_record(0x200, 0, 2, 0x07, 0x07, &big_payload, b"");
        let first_part = PAGE_SIZE - 0x40;

        let mut page_a = blank_page(0x200, 0);
        page_a[0x40..PAGE_SIZE].copy_from_slice(&big[..first_part]);
        seal_page(&mut page_a);

        let rest = &big[first_part..];
        let mut page_b = blank_page(0x300, 0);
        page_b[0x40..0x40 + rest.len()].copy_from_slice(rest);
        page_b[24..26].copy_from_slice(&((0x40 + rest.len()) as u16).to_le_bytes());
        seal_page(&mut page_b);

        let data = stream(&[page_b, page_a]);
        let log = LogFile::parse(&data, None);
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].redo_data, big_payload);
    }

    #[test]
    fn test_corrupt_page_is_dumped_not_counted() {
        let a = encode_update_record(0x100, 0, 1, 0x02, 0x03, b"", b"");
        let good = page_with_records(0x100, &[&a]);
        let mut bad = page_with_records(0x180, &[&a]);
        bad[PAGE_SIZE - 2] ^= 0xFF; // torn write in the last sector

        let data = stream(&[good, bad.clone()]);
        let log = LogFile::parse(&data, None);
        assert_eq!(log.pages_parsed, 1);
        assert_eq!(log.faulty_pages.len(), 1);
        assert_eq!(log.faulty_pages[0].index, 1);
        assert_eq!(log.faulty_pages[0].bytes, bad);
        assert_eq!(log.records.len(), 1);
    }

    #[test]
    fn test_unfinished_continuation_dumps_page() {
        let big = encode_update_record(0x200, 0, 2, 0x07, 0x07, &vec![0u8; PAGE_SIZE], b"");
        let mut page_a = blank_page(0x200, 0);
        page_a[0x40..PAGE_SIZE].copy_from_slice(&big[..PAGE_SIZE - 0x40]);
        seal_page(&mut page_a);

        let data = stream(&[page_a]);
        let log = LogFile::parse(&data, None);
        assert!(log.records.is_empty());
        assert_eq!(log.faulty_pages.len(), 1);
        assert_eq!(log.pages_parsed, 0);
    }

    #[test]
    fn test_page_limit_respected() {
        let a = encode_update_record(0x100, 0, 1, 0x02, 0x03, b"", b"");
        let pages: Vec<Vec<u8>> = (0..4)
            .map(|i| page_with_records(0x100 * (i as u64 + 1), &[&a]))
            .collect();
        let data = stream(&pages);
        let log = LogFile::parse(&data, Some(2));
        assert_eq!(log.records.len(), 2);
    }

    #[test]
    fn test_transactions_grouped_and_sorted() {
        let t1a = encode_update_record(0x100, 0, 1, 0x02, 0x03, b"", b"");
        let t2a = encode_update_record(0x140, 0, 2, 0x0C, 0x0D, b"", b"");
        let t1b = encode_update_record(0x180, 0x100, 1, 0x1A, 0x00, b"", b"");
        let data = stream(&[page_with_records(0x180, &[&t1a, &t2a, &t1b])]);

        let mut log = LogFile::parse(&data, None);
        log.connect_transactions();
        assert_eq!(log.transactions.len(), 2);

        let t1 = &log.transactions[0];
        assert_eq!(t1.transaction_num, 1);
        assert_eq!(t1.all_opcodes.len(), 2);
        let lsns: Vec<u64> = t1.all_opcodes.iter().map(|o| o.0).collect();
        assert!(lsns.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(log.transactions[1].transaction_num, 2);
    }

    #[test]
    fn test_usn_bearing_transaction() {
        let payload = encode_usn_record(0x12340, 42, 3, "target.txt");
        let rec = encode_update_record(0x500, 0, 9, 0x08, 0x00, &payload, b"");
        let data = stream(&[page_with_records(0x500, &[&rec])]);

        let mut log = LogFile::parse(&data, None);
        log.connect_transactions();
        let tx = &log.transactions[0];
        assert!(tx.contains_usn);
        assert_eq!(tx.usns, vec![(0x500, 0x12340)]);
    }

    #[test]
    fn test_all_zero_stream_yields_nothing() {
        let data = vec![0u8; 6 * PAGE_SIZE];
        let log = LogFile::parse(&data, None);
        assert!(log.records.is_empty());
        // all-zero pages have no RCRD magic and are dumped
        assert_eq!(log.faulty_pages.len(), 4);
    }
}
