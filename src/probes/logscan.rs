/// Log-marker probe: watches the workload's log file for request markers.
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::PathBuf;

use super::LogMarkerScanner;

/// Scans only the bytes appended since the previous scan, so a marker is
/// reported as activity exactly once. A file shorter than the stored offset
/// means rotation or truncation; the offset restarts at zero.
pub struct FileMarkerScanner {
    path: PathBuf,
    marker: String,
    scanned_to: u64,
}

impl FileMarkerScanner {
    pub fn new(path: impl Into<PathBuf>, marker: &str) -> Self {
        Self {
            path: path.into(),
            marker: marker.to_string(),
            scanned_to: 0,
        }
    }
}

impl LogMarkerScanner for FileMarkerScanner {
    fn scan(&mut self) -> bool {
        let len = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Workload hasn't logged anything yet; not an error.
                tracing::debug!(path = %self.path.display(), "log file absent");
                return false;
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %self.path.display(),
                    "failed to stat log file"
                );
                return false;
            }
        };

        if len < self.scanned_to {
            tracing::debug!(
                path = %self.path.display(),
                "log file shrank, assuming rotation"
            );
            self.scanned_to = 0;
        }
        if len == self.scanned_to {
            return false;
        }

        let mut tail = String::new();
        let read = File::open(&self.path).and_then(|mut f| {
            f.seek(SeekFrom::Start(self.scanned_to))?;
            f.read_to_string(&mut tail)
        });
        if let Err(e) = read {
            tracing::warn!(
                error = %e,
                path = %self.path.display(),
                "failed to read log file"
            );
            return false;
        }

        self.scanned_to = len;
        tail.contains(&self.marker)
    }
}
