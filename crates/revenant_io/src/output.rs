//! Export targets: stdout, or a file written atomically.
//!
//! File outputs go to a temporary in the destination directory and are
//! renamed into place only after the writer succeeds, so an existing export
//! is never left partially overwritten.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Where an exporter sends its bytes.
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    /// Stdout unless a destination path was given.
    pub fn from_option(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Self::File(path),
            None => Self::Stdout,
        }
    }

    /// Runs `write` against the target. For files the content lands in a
    /// temporary sibling first and is renamed over the destination on
    /// success; any error discards the temporary.
    pub fn write_with(
        &self,
        write: impl FnOnce(&mut dyn Write) -> io::Result<()>,
    ) -> io::Result<()> {
        match self {
            Self::Stdout => {
                let stdout = io::stdout();
                let mut writer = BufWriter::new(stdout.lock());
                write(&mut writer)?;
                writer.flush()
            }
            Self::File(path) => {
                let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
                let temp = match dir {
                    Some(dir) => NamedTempFile::new_in(dir)?,
                    None => NamedTempFile::new_in(Path::new("."))?,
                };
                let mut writer = BufWriter::new(temp);
                write(&mut writer)?;
                let temp = writer.into_inner().map_err(|e| e.into_error())?;
                temp.persist(path).map_err(|e| e.error)?;
                Ok(())
            }
        }
    }
}
