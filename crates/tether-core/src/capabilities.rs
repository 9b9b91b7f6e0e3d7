//! Camera capability catalog entries.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Remote operations a camera model supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CameraOperations: u32 {
        /// Still capture
        const CAPTURE_IMAGE = 1 << 0;
        /// Movie capture
        const CAPTURE_VIDEO = 1 << 1;
        /// Audio capture
        const CAPTURE_AUDIO = 1 << 2;
        /// Live preview frames
        const CAPTURE_PREVIEW = 1 << 3;
        /// Remote configuration
        const CONFIG = 1 << 4;
        /// Capture without download
        const TRIGGER_CAPTURE = 1 << 5;
    }
}

bitflags! {
    /// Per-file operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileOperations: u32 {
        /// Delete a file
        const DELETE = 1 << 1;
        /// Thumbnail download
        const PREVIEW = 1 << 3;
        /// Raw data download
        const RAW = 1 << 4;
        /// Attached audio download
        const AUDIO = 1 << 5;
        /// EXIF download
        const EXIF = 1 << 6;
    }
}

bitflags! {
    /// Folder-level operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FolderOperations: u32 {
        /// Delete every file in a folder
        const DELETE_ALL = 1 << 0;
        /// Upload a file
        const PUT_FILE = 1 << 1;
        /// Create a folder
        const MAKE_DIR = 1 << 2;
        /// Remove a folder
        const REMOVE_DIR = 1 << 3;
    }
}

/// One entry of the driver's capability catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraAbilities {
    /// Model name as listed in the catalog
    pub model: String,
    /// Remote camera operations
    pub operations: CameraOperations,
    /// Per-file operations
    pub file_operations: FileOperations,
    /// Folder operations
    pub folder_operations: FolderOperations,
}

impl CameraAbilities {
    /// Flatten the flag sets into a [`CapabilityReport`].
    pub fn report(&self) -> CapabilityReport {
        CapabilityReport::from(self)
    }
}

/// Flattened, serializable view of [`CameraAbilities`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityReport {
    /// Model name
    pub model: String,
    /// Still capture supported
    pub capture_image: bool,
    /// Movie capture supported
    pub capture_video: bool,
    /// Audio capture supported
    pub capture_audio: bool,
    /// Live preview supported
    pub capture_preview: bool,
    /// Remote configuration supported
    pub config: bool,
    /// Trigger without download supported
    pub trigger_capture: bool,
    /// Files can be deleted
    pub file_delete: bool,
    /// Thumbnails can be fetched
    pub file_preview: bool,
    /// Raw data can be fetched
    pub file_raw: bool,
    /// Attached audio can be fetched
    pub file_audio: bool,
    /// EXIF can be fetched
    pub file_exif: bool,
    /// Folders can be emptied
    pub folder_delete_all: bool,
    /// Files can be uploaded
    pub folder_put_file: bool,
    /// Folders can be created
    pub folder_make_dir: bool,
    /// Folders can be removed
    pub folder_remove_dir: bool,
}

impl From<&CameraAbilities> for CapabilityReport {
    fn from(a: &CameraAbilities) -> Self {
        let op = |f| a.operations.contains(f);
        let file = |f| a.file_operations.contains(f);
        let folder = |f| a.folder_operations.contains(f);
        Self {
            model: a.model.clone(),
            capture_image: op(CameraOperations::CAPTURE_IMAGE),
            capture_video: op(CameraOperations::CAPTURE_VIDEO),
            capture_audio: op(CameraOperations::CAPTURE_AUDIO),
            capture_preview: op(CameraOperations::CAPTURE_PREVIEW),
            config: op(CameraOperations::CONFIG),
            trigger_capture: op(CameraOperations::TRIGGER_CAPTURE),
            file_delete: file(FileOperations::DELETE),
            file_preview: file(FileOperations::PREVIEW),
            file_raw: file(FileOperations::RAW),
            file_audio: file(FileOperations::AUDIO),
            file_exif: file(FileOperations::EXIF),
            folder_delete_all: folder(FolderOperations::DELETE_ALL),
            folder_put_file: folder(FolderOperations::PUT_FILE),
            folder_make_dir: folder(FolderOperations::MAKE_DIR),
            folder_remove_dir: folder(FolderOperations::REMOVE_DIR),
        }
    }
}

impl CapabilityReport {
    /// `key: yes/no` lines for terminal output.
    pub fn render_text(&self) -> String {
        let rows = [
            ("capture_image", self.capture_image),
            ("capture_video", self.capture_video),
            ("capture_audio", self.capture_audio),
            ("capture_preview", self.capture_preview),
            ("config", self.config),
            ("trigger_capture", self.trigger_capture),
            ("file_delete", self.file_delete),
            ("file_preview", self.file_preview),
            ("file_raw", self.file_raw),
            ("file_audio", self.file_audio),
            ("file_exif", self.file_exif),
            ("folder_delete_all", self.folder_delete_all),
            ("folder_put_file", self.folder_put_file),
            ("folder_make_dir", self.folder_make_dir),
            ("folder_remove_dir", self.folder_remove_dir),
        ];
        let mut out = format!("model: {}\n", self.model);
        for (key, on) in rows {
            out.push_str(key);
            out.push_str(if on { ": yes\n" } else { ": no\n" });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_flattens_flags() {
        let abilities = CameraAbilities {
            model: "Canon EOS 80D".into(),
            operations: CameraOperations::CAPTURE_IMAGE
                | CameraOperations::CAPTURE_PREVIEW
                | CameraOperations::CONFIG,
            file_operations: FileOperations::DELETE | FileOperations::PREVIEW,
            folder_operations: FolderOperations::empty(),
        };
        let report = abilities.report();
        assert!(report.capture_image);
        assert!(report.capture_preview);
        assert!(!report.capture_video);
        assert!(report.file_delete);
        assert!(!report.folder_make_dir);

        let text = report.render_text();
        assert!(text.starts_with("model: Canon EOS 80D\n"));
        assert!(text.contains("capture_preview: yes"));
        assert!(text.contains("capture_audio: no"));
    }
}
