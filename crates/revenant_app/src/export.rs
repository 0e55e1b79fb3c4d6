//! Text, CSV and raw exporters for the parsed artifacts.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use revenant_core::attr::AttributeForm;
use revenant_core::logfile::LogFile;
use revenant_core::mft::{InumSelector, Mft, MftStatistics};
use revenant_core::usnjrnl::UsnJrnl;
use revenant_core::{time, BootSector, FaultyPage, Geometry, MftEntry};

/// Quotes a CSV field when it contains a delimiter, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn print_boot_sector(w: &mut dyn Write, bs: &BootSector, geometry: &Geometry) -> io::Result<()> {
    writeln!(w, "OEM ID                 : {}", String::from_utf8_lossy(&bs.oem_id))?;
    writeln!(w, "Bytes per sector       : {}", bs.bytes_per_sector)?;
    writeln!(w, "Sectors per cluster    : {}", bs.sectors_per_cluster)?;
    writeln!(w, "Bytes per cluster      : {}", geometry.bytes_per_cluster)?;
    writeln!(w, "Media descriptor       : {:#04x}", bs.media_descriptor)?;
    writeln!(w, "Total sectors          : {}", bs.total_sectors)?;
    writeln!(w, "MFT start LCN          : {}", bs.mft_lcn)?;
    writeln!(w, "MFT mirror LCN         : {}", bs.mft_mirror_lcn)?;
    writeln!(w, "MFT record size        : {}", geometry.mft_record_size)?;
    writeln!(w, "Index record size      : {}", geometry.index_record_size)?;
    writeln!(w, "Volume serial          : {:#018x}", bs.volume_serial)?;
    writeln!(w, "Filesystem offset      : {}", geometry.filesystem_offset_bytes)?;
    writeln!(w, "MFT offset             : {}", geometry.mft_start_offset_bytes())?;
    Ok(())
}

fn write_entry_parsed(w: &mut dyn Write, entry: &MftEntry) -> io::Result<()> {
    writeln!(w, "MFT entry {}", entry.inum)?;
    writeln!(w, "  sequence value : {}", entry.sequence_value)?;
    writeln!(w, "  in use         : {}", entry.is_in_use())?;
    writeln!(w, "  directory      : {}", entry.is_directory())?;
    writeln!(w, "  base record    : {}", entry.is_base_record())?;
    if let Some(name) = entry.file_name() {
        writeln!(w, "  file name      : {} (parent {})", name.name, name.parent.inum)?;
        writeln!(w, "  created        : {}", time::filetime_to_iso8601(name.created))?;
        writeln!(w, "  modified       : {}", time::filetime_to_iso8601(name.modified))?;
    }
    for (type_code, attributes) in &entry.attributes {
        for attribute in attributes {
            let form = match &attribute.form {
                AttributeForm::Resident { .. } => "resident".to_string(),
                AttributeForm::NonResident(extent) => {
                    format!("non-resident, {} run(s), {} bytes", extent.runs.len(), extent.real_size)
                }
            };
            if attribute.name.is_empty() {
                writeln!(w, "  attribute      : {type_code} ({form})")?;
            } else {
                writeln!(w, "  attribute      : {type_code} '{}' ({form})", attribute.name)?;
            }
        }
    }
    writeln!(w)
}

pub fn write_mft_parsed(
    w: &mut dyn Write,
    mft: &Mft<'_>,
    selector: &InumSelector,
) -> io::Result<()> {
    for entry in mft.entries.values() {
        if selector.contains(entry.inum) {
            write_entry_parsed(w, entry)?;
        }
    }
    Ok(())
}

pub fn write_mft_csv(w: &mut dyn Write, mft: &Mft<'_>, selector: &InumSelector) -> io::Result<()> {
    writeln!(
        w,
        "inum,sequence,in_use,is_directory,name,parent_inum,allocated_size,real_size,created,modified,mft_modified,accessed"
    )?;
    for entry in mft.entries.values() {
        if !selector.contains(entry.inum) {
            continue;
        }
        match entry.file_name() {
            Some(name) => writeln!(
                w,
                "{},{},{},{},{},{},{},{},{},{},{},{}",
                entry.inum,
                entry.sequence_value,
                entry.is_in_use(),
                entry.is_directory(),
                csv_field(&name.name),
                name.parent.inum,
                name.allocated_size,
                name.real_size,
                time::filetime_to_iso8601(name.created),
                time::filetime_to_iso8601(name.modified),
                time::filetime_to_iso8601(name.mft_modified),
                time::filetime_to_iso8601(name.accessed),
            )?,
            None => writeln!(
                w,
                "{},{},{},{},,,,,,,,",
                entry.inum,
                entry.sequence_value,
                entry.is_in_use(),
                entry.is_directory(),
            )?,
        }
    }
    Ok(())
}

pub fn write_mft_raw(w: &mut dyn Write, mft: &Mft<'_>, selector: &InumSelector) -> io::Result<()> {
    for inum in selector.resolve(mft.record_count()) {
        match mft.read_record_bytes(inum) {
            Ok(bytes) => w.write_all(&bytes)?,
            Err(err) => log::warn!("skipping raw export of record {inum}: {err}"),
        }
    }
    Ok(())
}

pub fn print_statistics(w: &mut dyn Write, stats: &MftStatistics) -> io::Result<()> {
    writeln!(w, "Records parsed       : {}", stats.records_parsed)?;
    writeln!(w, "Records in use       : {}", stats.records_in_use)?;
    writeln!(w, "Directories          : {}", stats.directories)?;
    writeln!(w, "Extension records    : {}", stats.extension_records)?;
    writeln!(w, "Multi-stream entries : {}", stats.multi_stream_entries)?;
    writeln!(w, "Attributes:")?;
    for (name, count) in &stats.attribute_counts {
        writeln!(w, "  {name:<24} {count}")?;
    }
    Ok(())
}

pub fn write_logfile_parsed(w: &mut dyn Write, log: &LogFile) -> io::Result<()> {
    for record in &log.records {
        writeln!(w, "LSN {}", record.lsn)?;
        writeln!(w, "  previous LSN    : {}", record.previous_lsn)?;
        writeln!(w, "  undo next LSN   : {}", record.undo_next_lsn)?;
        writeln!(w, "  record type     : {}", record.record_type)?;
        writeln!(w, "  transaction id  : {}", record.transaction_id)?;
        writeln!(w, "  redo operation  : {}", record.redo_op)?;
        writeln!(w, "  undo operation  : {}", record.undo_op)?;
        writeln!(w, "  target attribute: {}", record.target_attribute)?;
        writeln!(w, "  target VCN      : {}", record.target_vcn)?;
        writeln!(
            w,
            "  redo/undo data  : {} / {} byte(s)",
            record.redo_data.len(),
            record.undo_data.len()
        )?;
        writeln!(w)?;
    }
    Ok(())
}

pub fn write_logfile_csv(w: &mut dyn Write, log: &LogFile) -> io::Result<()> {
    writeln!(
        w,
        "lsn,previous_lsn,transaction_id,record_type,redo_operation,undo_operation,target_vcn,redo_length,undo_length"
    )?;
    for record in &log.records {
        writeln!(
            w,
            "{},{},{},{},{},{},{},{},{}",
            record.lsn,
            record.previous_lsn,
            record.transaction_id,
            record.record_type,
            record.redo_op,
            record.undo_op,
            record.target_vcn,
            record.redo_data.len(),
            record.undo_data.len(),
        )?;
    }
    Ok(())
}

pub fn write_transactions(w: &mut dyn Write, log: &LogFile) -> io::Result<()> {
    for transaction in &log.transactions {
        writeln!(w, "Transaction {}", transaction.transaction_num)?;
        if transaction.contains_usn {
            let usns: Vec<u64> = transaction.usns.iter().map(|&(_, usn)| usn).collect();
            writeln!(w, "  embedded USNs: {usns:?}")?;
        }
        for (lsn, redo_op, undo_op) in &transaction.all_opcodes {
            writeln!(w, "  {lsn:>12}  {:<32} {undo_op}", redo_op.to_string())?;
        }
        writeln!(w)?;
    }
    Ok(())
}

pub fn write_logfile_parsed_lsns(w: &mut dyn Write, log: &LogFile, lsns: &[u64]) -> io::Result<()> {
    for record in &log.records {
        if !lsns.contains(&record.lsn) {
            continue;
        }
        writeln!(w, "LSN {}", record.lsn)?;
        writeln!(w, "  record type     : {}", record.record_type)?;
        writeln!(w, "  transaction id  : {}", record.transaction_id)?;
        writeln!(w, "  redo operation  : {}", record.redo_op)?;
        writeln!(w, "  undo operation  : {}", record.undo_op)?;
        writeln!(w)?;
    }
    Ok(())
}

pub fn write_usnjrnl_csv(w: &mut dyn Write, jrnl: &UsnJrnl) -> io::Result<()> {
    writeln!(w, "usn,inum,sequence,parent_inum,timestamp,reason,file_name")?;
    for record in &jrnl.records {
        writeln!(
            w,
            "{},{},{},{},{},{},{}",
            record.usn,
            record.file_reference.inum,
            record.file_reference.sequence,
            record.parent_reference.inum,
            time::filetime_to_iso8601(record.timestamp),
            record.reason_string(),
            csv_field(&record.file_name),
        )?;
    }
    Ok(())
}

/// Writes every faulty page verbatim into `dir`, named by zero-padded page
/// index. The directory is created on demand.
pub fn dump_error_pages(dir: &Path, pages: &[FaultyPage]) -> io::Result<()> {
    if pages.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    for page in pages {
        fs::write(dir.join(format!("{:08}", page.index)), &page.bytes)?;
    }
    Ok(())
}
