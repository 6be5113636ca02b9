//! 字节读取实现

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::{ByteLoader, LoadFileError, PathKind};

/// 基于文件系统的读取
#[derive(Clone, Copy, Debug, Default)]
pub struct FsByteLoader;

impl ByteLoader for FsByteLoader {
    fn load(&self, path: &Path) -> Result<Vec<u8>, LoadFileError> {
        std::fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LoadFileError::NotFound(path.to_path_buf()),
            _ => LoadFileError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })
    }

    fn probe(&self, path: &Path) -> PathKind {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => PathKind::Directory,
            Ok(_) => PathKind::File,
            Err(_) => PathKind::Missing,
        }
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, LoadFileError> {
        let entries = std::fs::read_dir(dir).map_err(|e| LoadFileError::Read {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// 内存中的文件表
///
/// 目录由文件路径的祖先推导，适合测试和打包资源。
#[derive(Debug, Default)]
pub struct MemoryByteLoader {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryByteLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入文件
    pub fn insert(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), bytes.into());
        }
    }

    /// 移除文件
    pub fn remove(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.write().ok().and_then(|mut files| files.remove(path))
    }

    pub fn with_file(self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    fn directories(files: &BTreeMap<PathBuf, Vec<u8>>) -> BTreeSet<PathBuf> {
        files
            .keys()
            .flat_map(|p| p.ancestors().skip(1).map(Path::to_path_buf))
            .collect()
    }
}

impl ByteLoader for MemoryByteLoader {
    fn load(&self, path: &Path) -> Result<Vec<u8>, LoadFileError> {
        let files = self.files.read().map_err(|e| LoadFileError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| LoadFileError::NotFound(path.to_path_buf()))
    }

    fn probe(&self, path: &Path) -> PathKind {
        let Ok(files) = self.files.read() else {
            return PathKind::Missing;
        };
        if files.contains_key(path) {
            PathKind::File
        } else if Self::directories(&files).contains(path) {
            PathKind::Directory
        } else {
            PathKind::Missing
        }
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, LoadFileError> {
        let files = self.files.read().map_err(|e| LoadFileError::Read {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }
}
