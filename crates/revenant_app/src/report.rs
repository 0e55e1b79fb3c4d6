//! The correlated-history report: current entry state, a summary table of
//! sequence values, and the full match list with each match's USN record
//! and $LogFile transaction.

use std::io::{self, Write};

use revenant_core::{time, Match, MftEntryHistory, SequenceHistory};

const RULE: &str =
    "#######################################################################################################";
const SEQ_RULE: &str =
    "=======================================================================================================";

fn print_current_info(w: &mut dyn Write, history: &MftEntryHistory<'_>) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "{RULE}")?;
    writeln!(
        w,
        "# Current MFT information                                                                 #############"
    )?;
    writeln!(w, "{RULE}")?;
    writeln!(w, "MFT entry number: {}", history.inum)?;
    writeln!(w, "Sequence value  : {}", history.current_sequence)?;
    if history.is_in_use {
        writeln!(w, "Currently in use: true")?;
    } else {
        writeln!(
            w,
            "Currently in use: false -> Historic data in MFT entry, easy to extract"
        )?;
    }
    writeln!(w, "File name       : {}", history.current_file_name)?;
    writeln!(w)
}

fn print_summary(w: &mut dyn Write, history: &MftEntryHistory<'_>) -> io::Result<()> {
    writeln!(w, "SUMMARY:")?;
    writeln!(
        w,
        "╔═════╦═══════════════════════════════════════════════════════════════════════════════════════════════╗"
    )?;
    writeln!(
        w,
        "║ seq ║ USN record list                                                                               ║"
    )?;
    writeln!(
        w,
        "╠═════╬═══════════════════════════════════════════════════════════════════════════════════════════════╣"
    )?;
    for sequence in history.per_sequence.values() {
        let usns: Vec<u64> = sequence.matches.iter().map(|m| m.usn_record.usn).collect();
        writeln!(
            w,
            "║ {:>3} ║ {:<93} ║",
            sequence.sequence_value,
            format!("{usns:?}")
        )?;
    }
    writeln!(
        w,
        "╚═════╩═══════════════════════════════════════════════════════════════════════════════════════════════╝"
    )?;
    writeln!(w)
}

fn print_match(w: &mut dyn Write, m: &Match<'_>) -> io::Result<()> {
    let tab = "    ";
    writeln!(w)?;
    writeln!(w, "{tab}USN      : {}", m.usn_record.usn)?;
    writeln!(w, "{tab}File name: {}", m.usn_record.file_name)?;
    writeln!(
        w,
        "{tab}Timestamp: {}",
        time::filetime_to_iso8601(m.usn_record.timestamp)
    )?;
    writeln!(w, "{tab}Reason   : {}", m.usn_record.reason_string())?;
    writeln!(
        w,
        "{tab}╔══════════════════════════════════════════════════════════════════════════════════╗"
    )?;
    writeln!(
        w,
        "{tab}║ $LogFile transaction number: {:<51} ║",
        m.transaction.transaction_num
    )?;
    writeln!(
        w,
        "{tab}╠═══════════╦══════════════════════════════════╦═══════════════════════════════════╣"
    )?;
    writeln!(
        w,
        "{tab}║  LSN      ║ Redo operation                   ║ Undo operation                    ║"
    )?;
    writeln!(
        w,
        "{tab}╠═══════════╬══════════════════════════════════╬═══════════════════════════════════╣"
    )?;
    for (lsn, redo_op, undo_op) in &m.transaction.all_opcodes {
        writeln!(
            w,
            "{tab}║ {lsn:>9} ║ {:<32} ║ {:<33} ║",
            redo_op.to_string(),
            undo_op.to_string()
        )?;
    }
    writeln!(
        w,
        "{tab}╚═══════════╩══════════════════════════════════╩═══════════════════════════════════╝"
    )
}

fn print_sequence(
    w: &mut dyn Write,
    sequence: &SequenceHistory<'_>,
    deleted_history: bool,
) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "{SEQ_RULE}")?;
    let marker = if deleted_history {
        " --> DELETE HISTORY"
    } else {
        ""
    };
    writeln!(
        w,
        " MFT entry {}; Sequence value {}{marker}",
        sequence.inum, sequence.sequence_value
    )?;
    writeln!(w, "{SEQ_RULE}")?;
    for m in &sequence.matches {
        print_match(w, m)?;
    }
    Ok(())
}

/// Full report for one entry: current state, summary, every sequence.
pub fn print_history(w: &mut dyn Write, history: &MftEntryHistory<'_>) -> io::Result<()> {
    print_current_info(w, history)?;
    print_summary(w, history)?;
    writeln!(w, "FULL HISTORY:")?;
    for sequence in history.per_sequence.values() {
        print_sequence(w, sequence, false)?;
    }
    Ok(())
}

/// Report restricted to sequences older than the current incarnation.
pub fn print_deleted_history(w: &mut dyn Write, history: &MftEntryHistory<'_>) -> io::Result<()> {
    print_current_info(w, history)?;
    if !history.has_deleted_history() {
        writeln!(w, "THIS ENTRY HAS NO DELETED LOG DATA AVAILABLE")?;
        return Ok(());
    }
    print_summary(w, history)?;
    for sequence in history.deleted_sequences() {
        print_sequence(w, sequence, true)?;
    }
    Ok(())
}
