//! Revenant - NTFS forensic history tool
//!
//! Parses the MFT, $LogFile and $UsnJrnl of an NTFS image and correlates
//! them into the per-file history of past incarnations.

mod cli;
mod export;
mod report;

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tempfile::NamedTempFile;

use cli::{
    Cli, Commands, LogfileExportType, MftAction, MftExportType, MftSourceArgs, OffsetArgs,
    ProgressReporter,
};
use revenant_core::logfile::{LogFile, PAGE_SIZE, RESTART_PAGES};
use revenant_core::usnjrnl::UsnJrnl;
use revenant_core::{
    correlate, BootSector, ByteSource, CoreError, Geometry, InumSelector, Mft,
    DEFAULT_MFT_RECORD_SIZE, LOGFILE_INUM,
};
use revenant_io::{ImageFile, OutputTarget};

fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(err) = run(cli.command) {
        eprintln!("revenant: {err:#}");
        process::exit(1);
    }
}

fn open_geometry(image: &ImageFile, offsets: &OffsetArgs) -> Result<(BootSector, Geometry)> {
    let fs_offset = offsets.filesystem_offset();
    let boot = BootSector::read_from(image, fs_offset)
        .with_context(|| format!("reading boot sector at offset {fs_offset}"))?;
    let geometry = boot.geometry(fs_offset)?;
    Ok((boot, geometry))
}

/// Builds the MFT engine from either input form and hands it to `f`; the
/// image mapping lives exactly as long as the engine borrowing it.
fn with_mft<R>(
    source: &MftSourceArgs,
    offsets: &OffsetArgs,
    f: impl FnOnce(&mut Mft<'_>) -> Result<R>,
) -> Result<R> {
    match (&source.image, &source.file) {
        (Some(path), _) => {
            let image = ImageFile::open(path)
                .with_context(|| format!("opening image {}", path.display()))?;
            let (_, geometry) = open_geometry(&image, offsets)?;
            let mut mft = Mft::from_image(&image, &geometry).context("bootstrapping the MFT")?;
            f(&mut mft)
        }
        (None, Some(path)) => {
            let file = ImageFile::open(path)
                .with_context(|| format!("opening extracted $MFT {}", path.display()))?;
            let mut mft = Mft::from_extracted(&file, DEFAULT_MFT_RECORD_SIZE);
            f(&mut mft)
        }
        (None, None) => unreachable!("clap enforces an input source"),
    }
}

fn parse_all_with_progress(mft: &mut Mft<'_>) {
    let progress = ProgressReporter::for_mft(mft.record_count());
    mft.parse_all_with(|_| progress.inc());
    progress.finish("MFT parsed");
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Bootsector { image, offsets } => {
            let image = ImageFile::open(&image)
                .with_context(|| format!("opening image {}", image.display()))?;
            let (boot, geometry) = open_geometry(&image, &offsets)?;
            let mut stdout = io::stdout().lock();
            export::print_boot_sector(&mut stdout, &boot, &geometry)?;
            Ok(())
        }

        Commands::Mft { action } => run_mft(action),

        Commands::Logfile {
            file,
            export_type,
            export_file,
            dump_dir,
            num,
            lsns,
            performance,
        } => run_logfile(
            &file,
            export_type,
            export_file.as_deref(),
            &dump_dir,
            num,
            &lsns,
            performance,
        ),

        Commands::Usnjrnl {
            file,
            export_file,
            number,
        } => {
            let data =
                fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let jrnl = UsnJrnl::parse(&data, number)?;
            OutputTarget::from_option(export_file)
                .write_with(|w| export::write_usnjrnl_csv(w, &jrnl))?;
            Ok(())
        }

        Commands::History {
            image,
            offsets,
            dump_dir,
            inum,
            deleted,
        } => run_history(&image, &offsets, &dump_dir, inum, deleted),
    }
}

fn run_mft(action: MftAction) -> Result<()> {
    match action {
        MftAction::Export {
            source,
            offsets,
            export_type,
            export_file,
            inums,
        } => with_mft(&source, &offsets, |mft| {
            match &inums {
                InumSelector::All => parse_all_with_progress(mft),
                selector => mft.parse_range(selector),
            }
            OutputTarget::from_option(export_file).write_with(|w| match export_type {
                MftExportType::Parsed => export::write_mft_parsed(w, mft, &inums),
                MftExportType::Csv => export::write_mft_csv(w, mft, &inums),
                MftExportType::Raw => export::write_mft_raw(w, mft, &inums),
            })?;
            Ok(())
        }),

        MftAction::Extractdata {
            source,
            offsets,
            inum,
            stream,
            output_file,
        } => with_mft(&source, &offsets, |mft| {
            mft.parse_inum(inum)
                .with_context(|| format!("parsing MFT record {inum}"))?;
            let bytes = mft.extract_data(inum, stream)?;
            OutputTarget::from_option(output_file).write_with(|w| w.write_all(&bytes))?;
            Ok(())
        }),

        MftAction::Statistics { source, offsets } => with_mft(&source, &offsets, |mft| {
            parse_all_with_progress(mft);
            let stats = mft.statistics();
            let mut stdout = io::stdout().lock();
            export::print_statistics(&mut stdout, &stats)?;
            Ok(())
        }),
    }
}

fn run_logfile(
    file: &Path,
    export_type: LogfileExportType,
    export_file: Option<&Path>,
    dump_dir: &Path,
    num: Option<usize>,
    lsns: &[u64],
    performance: bool,
) -> Result<()> {
    if export_type == LogfileExportType::Parsedlsns && lsns.is_empty() {
        eprintln!("revenant: the parsedlsns export requires -q with at least one LSN");
        process::exit(2);
    }

    let data = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let ring_pages = data.len().saturating_sub(RESTART_PAGES * PAGE_SIZE) / PAGE_SIZE;
    let page_count = num.map_or(ring_pages, |n| n.min(ring_pages));

    let parse_started = Instant::now();
    let progress = ProgressReporter::for_logfile(page_count as u64);
    let mut log = LogFile::parse_with(&data, num, |_| progress.inc());
    progress.finish("$LogFile parsed");
    let parse_elapsed = parse_started.elapsed();

    export::dump_error_pages(dump_dir, &log.faulty_pages)
        .with_context(|| format!("dumping error pages to {}", dump_dir.display()))?;

    let connect_started = Instant::now();
    if export_type != LogfileExportType::Parsed {
        log.connect_transactions();
    }
    let connect_elapsed = connect_started.elapsed();

    let target = OutputTarget::from_option(export_file.map(Path::to_path_buf));
    target.write_with(|w| match export_type {
        LogfileExportType::Parsed => export::write_logfile_parsed(w, &log),
        LogfileExportType::Csv => export::write_logfile_csv(w, &log),
        LogfileExportType::Transaction => export::write_transactions(w, &log),
        LogfileExportType::Parsedlsns => export::write_logfile_parsed_lsns(w, &log, lsns),
    })?;

    if performance {
        eprintln!(
            "pages: {} parsed, {} dumped; parse {:.3}s, transactions {:.3}s",
            log.pages_parsed,
            log.faulty_pages.len(),
            parse_elapsed.as_secs_f64(),
            connect_elapsed.as_secs_f64(),
        );
    }
    Ok(())
}

/// Extracts a stream into a temporary file and maps it back; the temporary
/// is deleted when the returned handles drop, after its engine completes.
fn stream_to_temp(bytes: Vec<u8>) -> Result<Option<(NamedTempFile, ImageFile)>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let mut temp = NamedTempFile::new().context("creating a temporary artifact file")?;
    temp.write_all(&bytes)?;
    temp.flush()?;
    drop(bytes);
    let map = ImageFile::open(temp.path())?;
    Ok(Some((temp, map)))
}

fn run_history(
    image: &Path,
    offsets: &OffsetArgs,
    dump_dir: &Path,
    inum: Option<u64>,
    deleted: bool,
) -> Result<()> {
    let image = ImageFile::open(image)
        .with_context(|| format!("opening image {}", image.display()))?;
    let (_, geometry) = open_geometry(&image, offsets)?;
    let mut mft = Mft::from_image(&image, &geometry).context("bootstrapping the MFT")?;
    parse_all_with_progress(&mut mft);

    let jrnl_inum = mft
        .usnjrnl_inum()
        .context("locating $UsnJrnl through the $Extend index")?;

    // $LogFile is stream 0 of entry 2; the journal's change data is its $J
    // stream, falling back to the default stream if the name is absent.
    let log = {
        let bytes = mft
            .extract_data(LOGFILE_INUM, 0)
            .context("extracting $LogFile")?;
        let mut log = match stream_to_temp(bytes)? {
            Some((_temp, map)) => {
                LogFile::parse(map.slice(0, map.size() as usize)?, None)
            }
            None => LogFile::parse(&[], None),
        };
        log.connect_transactions();
        log
    };
    export::dump_error_pages(dump_dir, &log.faulty_pages)
        .with_context(|| format!("dumping error pages to {}", dump_dir.display()))?;

    let jrnl = {
        let stream = mft
            .entries
            .get(&jrnl_inum)
            .and_then(|e| e.data_attributes().iter().position(|a| a.name == "$J"))
            .unwrap_or(0);
        let bytes = mft
            .extract_data(jrnl_inum, stream)
            .with_context(|| format!("extracting $UsnJrnl (entry {jrnl_inum})"))?;
        match stream_to_temp(bytes)? {
            Some((_temp, map)) => UsnJrnl::parse(map.slice(0, map.size() as usize)?, None)?,
            None => UsnJrnl::default(),
        }
    };

    let histories = match correlate(&mft, &jrnl, &log, inum) {
        Ok(histories) => histories,
        Err(CoreError::InumNotFound { inum }) => {
            anyhow::bail!("no records for MFT entry {inum} in $UsnJrnl")
        }
        Err(err) => return Err(err.into()),
    };

    let mut stdout = io::stdout().lock();
    for history in &histories {
        if deleted {
            report::print_deleted_history(&mut stdout, history)?;
        } else {
            report::print_history(&mut stdout, history)?;
        }
    }
    Ok(())
}
