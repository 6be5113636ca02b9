//! 平台协作方接口
//!
//! 字节读取、模型解码、完整性检查、纹理解码都通过这里的 trait 注入，
//! 由 [`crate::RuntimeConfig`] 统一持有，不使用进程级全局状态。

mod consistency;
mod file_loader;

pub use consistency::MocHeaderCheck;
pub use file_loader::{FsByteLoader, MemoryByteLoader};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::Model;
use crate::texture::Texture;

/// 路径探测结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathKind {
    Missing,
    File,
    Directory,
}

/// 字节读取失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadFileError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },
}

/// 解码失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("decode failed: {0}")]
pub struct DecodeError(pub String);

/// 字节读取
///
/// 实现内部可以是异步的，对运行时核心暴露为同步阻塞调用。
pub trait ByteLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<u8>, LoadFileError>;

    fn probe(&self, path: &Path) -> PathKind;

    /// 列出目录下的文件路径
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, LoadFileError>;
}

/// 模型二进制解码
pub trait ModelDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Model, DecodeError>;
}

/// 模型二进制完整性检查
pub trait ModelConsistencyCheck: Send + Sync {
    fn is_consistent(&self, bytes: &[u8]) -> bool;
}

/// 纹理像素解码
pub trait TextureDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Texture, DecodeError>;
}
