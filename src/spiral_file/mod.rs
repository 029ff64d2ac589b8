//! Named-part container format (spec.md §6.1).
//!
//! Grounded in `original_source/modules/io/spiral_file.h`'s directory
//! layout: each archive is a directory holding one `file_info.json`
//! sidecar plus one subdirectory per named part, each with its own
//! `part_info.json` sidecar carrying `part_type` and a semver version.
//! Parts here are plain files rather than mmap-backed regions, matching
//! this crate's in-memory-first approach elsewhere.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::err::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Version {
        Version { major, minor, patch }
    }

    /// semver "can read": a reader built for `max` can open anything with
    /// the same major version and a minor/patch no newer than `max`.
    pub fn can_read(&self, max: Version) -> bool {
        self.major == max.major && (self.minor, self.patch) <= (max.minor, max.patch)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartInfo {
    pub part_type: String,
    pub version: Version,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub uuid: uuid::Uuid,
    pub build_revision: String,
    pub build_timestamp: String,
    pub argv: Vec<String>,
}

/// Writes parts into a fresh archive directory at `path`.
pub struct Writer {
    dir: PathBuf,
}

impl Writer {
    pub fn create(path: impl AsRef<Path>, argv: Vec<String>) -> Result<Writer, AppError> {
        let dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let info = FileInfo {
            uuid: uuid::Uuid::new_v4(),
            build_revision: crate::common::VERSION.to_string(),
            build_timestamp: chrono::Utc::now().to_rfc3339(),
            argv,
        };
        let body = serde_json::to_vec_pretty(&info).map_err(|e| AppError::format(e.to_string()))?;
        fs::write(dir.join("file_info.json"), body)?;
        Ok(Writer { dir })
    }

    /// Creates a named part directory containing `contents` and its
    /// `part_info.json` sidecar.
    pub fn create_path_contents(&self, name: &str, part_type: &str, version: Version, contents: &[u8]) -> Result<(), AppError> {
        let part_dir = self.dir.join(name);
        fs::create_dir_all(&part_dir)?;
        let mut file = fs::File::create(part_dir.join("data"))?;
        file.write_all(contents)?;
        let info = PartInfo { part_type: part_type.to_string(), version };
        let body = serde_json::to_vec_pretty(&info).map_err(|e| AppError::format(e.to_string()))?;
        fs::write(part_dir.join("part_info.json"), body)?;
        Ok(())
    }
}

/// Opens an existing archive directory for reading.
pub struct Reader {
    dir: PathBuf,
}

impl Reader {
    pub fn open(path: impl AsRef<Path>) -> Result<Reader, AppError> {
        let dir = path.as_ref().to_path_buf();
        if !dir.join("file_info.json").is_file() {
            return Err(AppError::format(format!("{} is not a spiral_file archive: missing file_info.json", dir.display())));
        }
        Ok(Reader { dir })
    }

    pub fn file_info(&self) -> Result<FileInfo, AppError> {
        let body = fs::read(self.dir.join("file_info.json"))?;
        serde_json::from_slice(&body).map_err(|e| AppError::format(e.to_string()))
    }

    fn part_info(&self, name: &str) -> Result<PartInfo, AppError> {
        let body = fs::read(self.dir.join(name).join("part_info.json"))
            .map_err(|_| AppError::format(format!("missing part {name:?}")))?;
        serde_json::from_slice(&body).map_err(|e| AppError::format(e.to_string()))
    }

    /// Reads a named part's bytes, enforcing `part_type` and the
    /// "can read" version rule against `max_version`.
    pub fn get_path(&self, name: &str, expected_part_type: &str, max_version: Version) -> Result<Vec<u8>, AppError> {
        let info = self.part_info(name)?;
        if info.part_type != expected_part_type {
            return Err(AppError::format(format!(
                "part {name:?} has type {:?}, expected {expected_part_type:?}",
                info.part_type
            )));
        }
        if !info.version.can_read(max_version) {
            return Err(AppError::format(format!(
                "part {name:?} version {:?} is newer than this build supports ({max_version:?})",
                info.version
            )));
        }
        Ok(fs::read(self.dir.join(name).join("data"))?)
    }

    pub fn has_path(&self, name: &str) -> bool {
        self.dir.join(name).join("part_info.json").is_file()
    }
}
