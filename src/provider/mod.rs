// src/provider/mod.rs

//! The file-provider surface: metadata and directory lookups plus `watch`.
//!
//! Lookups never fail for missing paths; they return the not-found value.
//! `watch` hands out change tokens per the token protocol.

pub mod caching;
pub mod combined;
pub mod physical;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;

use crate::errors::Result;
use crate::token::ChangeToken;

pub use caching::CachingFileProvider;
pub use combined::CombinedFileProvider;
pub use physical::{NullFileProvider, PhysicalFileProvider};

/// Read side and watch side of a hierarchical file namespace.
pub trait FileProvider: Send + Sync {
    /// Metadata for the file at `subpath`. Missing or unreachable paths
    /// yield the not-found value, never an error.
    fn get_file_info(&self, subpath: &str) -> FileInfo;

    /// Entries of the directory at `subpath`, with an existence bit.
    fn get_directory_contents(&self, subpath: &str) -> DirectoryContents;

    /// A change token for the given filter.
    fn watch(&self, filter: &str) -> Arc<dyn ChangeToken>;
}

/// Metadata snapshot of a single file or directory.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub exists: bool,
    pub is_directory: bool,
    pub length: u64,
    pub last_modified: Option<SystemTime>,
    pub name: String,
    pub physical_path: Option<PathBuf>,
}

impl FileInfo {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self {
            exists: false,
            is_directory: false,
            length: 0,
            last_modified: None,
            name: name.into(),
            physical_path: None,
        }
    }

    /// Snapshot a path on disk; unreadable paths become not-found.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match std::fs::metadata(path) {
            Ok(meta) => Self {
                exists: true,
                is_directory: meta.is_dir(),
                length: meta.len(),
                last_modified: meta.modified().ok(),
                name,
                physical_path: Some(path.to_path_buf()),
            },
            Err(_) => Self::not_found(name),
        }
    }

    /// Open the file for reading. Missing files and directories produce an
    /// error; existence checks belong on `exists`.
    pub fn create_read_stream(&self) -> Result<Box<dyn Read + Send>> {
        if !self.exists || self.is_directory {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no readable file named {:?}", self.name),
            )
            .into());
        }
        let path = self.physical_path.as_ref().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{:?} has no physical path", self.name),
            )
        })?;
        let file = File::open(path).with_context(|| format!("opening file {path:?}"))?;
        Ok(Box::new(file))
    }
}

/// Directory listing with an existence bit.
#[derive(Debug, Clone)]
pub struct DirectoryContents {
    pub exists: bool,
    pub entries: Vec<FileInfo>,
}

impl DirectoryContents {
    pub fn not_found() -> Self {
        Self {
            exists: false,
            entries: Vec::new(),
        }
    }
}
