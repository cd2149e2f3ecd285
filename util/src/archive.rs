//! CSV archiving functionality
//!
//! Two styles of archive are provided:
//!
//! - [`Archiver`] appends one serialised record per call to a CSV file with a
//!   header row, flushing after every record. Use it for per-cycle traces.
//! - [`write_rows`] writes a complete table of numbers in one go, with no
//!   header row. Use it for buffered data which must be written exactly once.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
pub struct Archiver {
    path: PathBuf,
    writer: Writer<File>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while writing an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot create the archive file {0:?}: {1}")]
    CannotCreate(PathBuf, std::io::Error),

    #[error("Cannot write to the archive file {0:?}: {1}")]
    CannotWrite(PathBuf, csv::Error),

    #[error("Cannot flush the archive file {0:?}: {1}")]
    CannotFlush(PathBuf, std::io::Error)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session, path: P
    ) -> Result<Self, ArchiveError> {
        Self::new(session.arch_path(path))
    }

    /// Create a new archiver writing to the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();

        let file = create_file(&path)?;

        let w = WriterBuilder::new()
            .has_headers(true)
            .from_writer(file);

        Ok(Self {
            path,
            writer: w
        })
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(
        &mut self, record: T
    ) -> Result<(), ArchiveError> {
        self.writer.serialize(record)
            .map_err(|e| ArchiveError::CannotWrite(self.path.clone(), e))?;
        self.writer.flush()
            .map_err(|e| ArchiveError::CannotFlush(self.path.clone(), e))
    }

    /// The path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Write all `rows` to `path` as comma separated values, one row per line and
/// with no header line.
///
/// Any existing file at `path` is truncated. Parent directories are created
/// if needed. Floats are written in their shortest round-trip representation.
pub fn write_rows<P, R>(path: P, rows: &[R]) -> Result<(), ArchiveError>
where
    P: AsRef<Path>,
    R: AsRef<[f64]>
{
    let path = path.as_ref();
    let file = create_file(path)?;

    let mut w = WriterBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_writer(file);

    for row in rows {
        w.serialize(row.as_ref())
            .map_err(|e| ArchiveError::CannotWrite(path.to_path_buf(), e))?;
    }

    w.flush().map_err(|e| ArchiveError::CannotFlush(path.to_path_buf(), e))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Create (or truncate) the file at `path` along with its parent directories.
fn create_file(path: &Path) -> Result<File, ArchiveError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| ArchiveError::CannotCreate(path.to_path_buf(), e))?;
        }
    }

    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| ArchiveError::CannotCreate(path.to_path_buf(), e))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
