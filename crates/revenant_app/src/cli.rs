use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use revenant_core::{FilesystemOffset, InumSelector, DEFAULT_SECTOR_SIZE};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "revenant")]
#[command(version)]
#[command(about = "Reconstruct per-file history from NTFS artifacts", long_about = None)]
pub struct Cli {
    /// Enable verbose diagnostics
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Filesystem offset options shared by image-reading commands.
#[derive(Args)]
pub struct OffsetArgs {
    /// Offset into the image for the filesystem, in sectors
    #[arg(short = 'o', long = "offset-sectors", conflicts_with = "offset_bytes")]
    pub offset_sectors: Option<u64>,

    /// Offset into the image for the filesystem, in bytes
    #[arg(short = 'O', long = "offset-bytes")]
    pub offset_bytes: Option<u64>,

    /// Sector size used to scale a sector-denominated offset
    #[arg(short = 's', long, default_value_t = DEFAULT_SECTOR_SIZE)]
    pub sector_size: u64,
}

impl OffsetArgs {
    pub fn filesystem_offset(&self) -> u64 {
        FilesystemOffset {
            offset_sectors: self.offset_sectors,
            offset_bytes: self.offset_bytes,
        }
        .resolve(self.sector_size)
    }
}

/// Input selection for MFT commands: a raw image or an extracted $MFT.
#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct MftSourceArgs {
    /// Raw image file
    #[arg(short = 'i', long = "image")]
    pub image: Option<PathBuf>,

    /// Extracted $MFT file
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MftExportType {
    Parsed,
    Csv,
    Raw,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogfileExportType {
    Parsed,
    Csv,
    Transaction,
    Parsedlsns,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode and print the boot sector of an image
    Bootsector {
        /// Raw image file
        image: PathBuf,

        #[command(flatten)]
        offsets: OffsetArgs,
    },

    /// Parse the Master File Table
    Mft {
        #[command(subcommand)]
        action: MftAction,
    },

    /// Parse an extracted $LogFile stream
    Logfile {
        /// Extracted $DATA attribute of the $LogFile entry
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Type of export
        #[arg(short = 't', long = "type", value_enum, default_value_t = LogfileExportType::Parsed)]
        export_type: LogfileExportType,

        /// Destination file; stdout when absent
        #[arg(short = 'e', long = "export")]
        export_file: Option<PathBuf>,

        /// Directory for dumping incomplete pages (full binary RCRD pages)
        #[arg(short = 'd', long = "dump-dir", default_value = "errorpages")]
        dump_dir: PathBuf,

        /// Number of pages to parse; all when absent
        #[arg(short = 'n', long = "num")]
        num: Option<usize>,

        /// LSNs to output, comma separated (parsedlsns export)
        #[arg(short = 'q', long = "lsns", value_delimiter = ',')]
        lsns: Vec<u64>,

        /// Print wall-clock timings of the parse passes
        #[arg(short = 'p', long = "performance")]
        performance: bool,
    },

    /// Parse an extracted $UsnJrnl $J stream
    Usnjrnl {
        /// File containing the extracted $J stream
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Destination file; stdout when absent
        #[arg(short = 'e', long = "export")]
        export_file: Option<PathBuf>,

        /// Number of records to parse; all when absent
        #[arg(short = 'n', long = "number")]
        number: Option<usize>,
    },

    /// Correlate MFT, $LogFile and $UsnJrnl into per-entry histories
    History {
        /// Raw image file
        #[arg(short = 'i', long = "image")]
        image: PathBuf,

        #[command(flatten)]
        offsets: OffsetArgs,

        /// Directory for dumping incomplete $LogFile pages
        #[arg(short = 'd', long = "dump-dir", default_value = "errorpages")]
        dump_dir: PathBuf,

        /// Single MFT entry number to show; all journal entries when absent
        #[arg(short = 'q', long = "inum")]
        inum: Option<u64>,

        /// Only show history older than each entry's current incarnation
        #[arg(long)]
        deleted: bool,
    },
}

#[derive(Subcommand)]
pub enum MftAction {
    /// Export selected entries as text, CSV or raw record bytes
    Export {
        #[command(flatten)]
        source: MftSourceArgs,

        #[command(flatten)]
        offsets: OffsetArgs,

        /// Type of export
        #[arg(short = 't', long = "type", value_enum, default_value_t = MftExportType::Parsed)]
        export_type: MftExportType,

        /// Destination file; stdout when absent
        #[arg(short = 'e', long = "export")]
        export_file: Option<PathBuf>,

        /// Single inum or inclusive range(s): e.g. 0-11,24-34,40 or all
        #[arg(short = 'q', long = "inums", default_value = "all")]
        inums: InumSelector,
    },

    /// Extract the data of a single entry, essentially returning the file
    Extractdata {
        #[command(flatten)]
        source: MftSourceArgs,

        #[command(flatten)]
        offsets: OffsetArgs,

        /// Inum of the entry to extract data of
        #[arg(short = 'q', long = "inum")]
        inum: u64,

        /// (Alternate) data stream ordinal
        #[arg(short = 'a', long = "stream", default_value_t = 0)]
        stream: usize,

        /// Destination file; stdout when absent
        #[arg(short = 'e', long = "export")]
        output_file: Option<PathBuf>,
    },

    /// Show statistics about the parsed MFT
    Statistics {
        #[command(flatten)]
        source: MftSourceArgs,

        #[command(flatten)]
        offsets: OffsetArgs,
    },
}

/// Thin wrapper over an indicatif bar for whole-artifact parse passes.
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(total: u64, message: &str) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap()
                .progress_chars("#>-"),
        );
        bar.set_message(message.to_string());
        Self { bar }
    }

    pub fn for_mft(record_count: u64) -> Self {
        Self::new(record_count, "Parsing MFT records...")
    }

    pub fn for_logfile(page_count: u64) -> Self {
        Self::new(page_count, "Parsing $LogFile pages...")
    }

    pub fn inc(&self) {
        self.bar.inc(1);
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
