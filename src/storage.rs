//! Captured media files.
//!
//! Synchronous and preview-triggered captures are named
//! `photo_<epoch-seconds>.jpg`. Event-driven downloads are named
//! `photo_<epoch-millis>_<counter>.jpg`; the counter is process-wide and only
//! breaks ties between files arriving in the same millisecond.
//!
//! Two synchronous captures in the same second share a name; the later one
//! replaces the earlier file and a warning is logged.

use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static EVENT_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `photo_<epoch-seconds>.jpg`
pub fn capture_file_name(epoch_secs: i64) -> String {
    format!("photo_{}.jpg", epoch_secs)
}

/// `photo_<epoch-millis>_<counter>.jpg`
pub fn event_file_name(epoch_millis: i64, counter: u64) -> String {
    format!("photo_{}_{}.jpg", epoch_millis, counter)
}

/// Writes downloaded files under a fixed storage root.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// Store files under `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a synchronous or preview-triggered capture.
    pub fn capture_path(&self) -> PathBuf {
        self.root.join(capture_file_name(Utc::now().timestamp()))
    }

    /// Unique path for an event-driven download.
    pub fn event_path(&self) -> PathBuf {
        let counter = EVENT_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(event_file_name(Utc::now().timestamp_millis(), counter))
    }

    /// Write `data` to `path`, creating the storage root if needed.
    ///
    /// An existing file at `path` is replaced.
    pub fn save(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        if path.exists() {
            warn!(path = %path.display(), "Overwriting existing capture file");
        }
        fs::write(path, data)?;
        debug!(path = %path.display(), bytes = data.len(), "Saved capture");
        Ok(())
    }
}
