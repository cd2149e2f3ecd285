//! Telemetry recording for offline model training
//!
//! The recorder keeps one row of numbers per tick in memory and writes them
//! all to a headerless CSV file exactly once, when it is closed. No I/O takes
//! place while reporting.
//!
//! The recorder is closed either explicitly through [`TelemetryRecorder::close`],
//! which reports write failures to the caller, or when it goes out of scope.
//! In the latter case a write failure can only be logged, so run drivers
//! should always close explicitly.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::path::{Path, PathBuf};
use log::{error, info, warn};

// Internal
use super::{ChannelLayout, ControlSample, SteerCtrlError};
use util::archive;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Buffers telemetry rows and writes them out on close.
#[derive(Debug)]
pub struct TelemetryRecorder {
    /// Output file path
    path: PathBuf,

    /// Layout of every reported sample, fixes the column count.
    layout: ChannelLayout,

    /// Row-major buffer of all reported rows.
    data: Vec<f64>,

    closed: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TelemetryRecorder {
    /// Create a new, empty recorder. Nothing is written until `close`.
    pub fn new<P: AsRef<Path>>(path: P, layout: ChannelLayout) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            layout,
            data: Vec::new(),
            closed: false
        }
    }

    /// Append one row for the sample.
    pub fn report(&mut self, sample: &ControlSample) -> Result<(), SteerCtrlError> {
        if self.closed {
            return Err(SteerCtrlError::RecorderClosedError);
        }

        if sample.layout() != self.layout {
            return Err(SteerCtrlError::ChannelMismatch {
                expected: self.layout,
                found: sample.layout()
            });
        }

        sample.extend_row(&mut self.data);

        Ok(())
    }

    /// Write all rows to the output file and close the recorder.
    ///
    /// Closing an already closed recorder does nothing. If no rows were
    /// reported no file is written. The write is attempted only once, even
    /// if it fails.
    pub fn close(&mut self) -> Result<(), SteerCtrlError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.data.is_empty() {
            info!("No telemetry recorded, {:?} not written", self.path);
            return Ok(());
        }

        let rows: Vec<&[f64]> = self.rows().collect();
        let res = archive::write_rows(&self.path, &rows);

        match res {
            Ok(()) => {
                info!("Wrote {} telemetry rows to {:?}", rows.len(), self.path);
                Ok(())
            },
            Err(e) => Err(SteerCtrlError::TelemetryWriteError {
                path: self.path.clone(),
                source: e
            })
        }
    }

    /// Iterate over the buffered rows in report order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.layout.num_columns())
    }

    /// Number of buffered rows.
    pub fn num_rows(&self) -> usize {
        self.data.len() / self.layout.num_columns()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }
}

impl Drop for TelemetryRecorder {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Telemetry recorder dropped without being closed, flushing now");
            if let Err(e) = self.close() {
                error!("Telemetry lost: {}", e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
