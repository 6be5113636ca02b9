//! Cubism Engine - Rust 实现的 Cubism 模型运行时
//!
//! 提供：
//! - model3.json 清单解析与资源加载（全有或全无）
//! - 动作队列（优先级仲裁、淡入淡出、生命周期事件）
//! - 表情混合
//! - 眨眼 / 呼吸 / 拖拽跟随 / 物理 / 姿势约束
//! - 碰撞区域判定与模型完整性检查

pub mod config;
pub mod effect;
pub mod id;
pub mod model;
pub mod motion;
pub mod platform;
pub mod render;
pub mod setting;
pub mod texture;

pub use config::{RuntimeConfig, RuntimeOptions, PreloadPolicy};
pub use id::{DrawableId, IdentifierSet, ParameterId, PartId};
pub use model::{Model, UserModel, HitAreaIndex};
pub use motion::{MotionEvent, MotionHandle, MotionState, priority};
pub use platform::{ByteLoader, FsByteLoader, MemoryByteLoader, ModelConsistencyCheck, ModelDecoder, TextureDecoder};
pub use render::{HeadlessRenderer, Renderer, SurfaceSize};
pub use setting::{ModelSetting, Model3JsonParser, ManifestParser};
pub use texture::{ImageTextureDecoder, Texture};

use std::path::PathBuf;
use thiserror::Error;

/// 错误分类
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// 资源不存在（目录、清单、模型文件等）
    ResourceNotFound,
    /// 资源存在但格式不合法
    FormatInvalid,
    /// 模型二进制结构校验失败
    Inconsistent,
    /// 渲染协作方失败
    Render,
}

/// 加载失败原因
///
/// 任何一种失败都会中止整个加载，已获取的子资源全部释放。
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("model home directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("model home is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("model manifest not found in {0}")]
    ManifestMissing(PathBuf),

    #[error("model manifest is invalid: {0}")]
    ManifestInvalid(String),

    #[error("model file not found: {0}")]
    ModelFileMissing(String),

    #[error("model file is corrupt: {0}")]
    ModelCorrupt(String),

    #[error("no valid texture: {0}")]
    NoValidTexture(String),

    #[error("model consistency check failed: {0}")]
    ConsistencyFailed(String),

    #[error("asset not found: {0}")]
    AssetMissing(String),

    #[error("asset is invalid: {path}: {reason}")]
    AssetInvalid { path: String, reason: String },

    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

impl LoadError {
    /// 归类到错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::DirectoryNotFound(_)
            | LoadError::NotADirectory(_)
            | LoadError::ManifestMissing(_)
            | LoadError::ModelFileMissing(_)
            | LoadError::AssetMissing(_) => ErrorKind::ResourceNotFound,
            LoadError::ManifestInvalid(_)
            | LoadError::ModelCorrupt(_)
            | LoadError::NoValidTexture(_)
            | LoadError::AssetInvalid { .. } => ErrorKind::FormatInvalid,
            LoadError::ConsistencyFailed(_) => ErrorKind::Inconsistent,
            LoadError::Render(_) => ErrorKind::Render,
        }
    }
}

/// 渲染协作方错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("failed to create render surface {width}x{height}: {reason}")]
    SurfaceCreation { width: u32, height: u32, reason: String },

    #[error("failed to upload texture slot {slot}: {reason}")]
    TextureUpload { slot: usize, reason: String },

    #[error("draw failed: {0}")]
    Draw(String),

    #[error("draw called before the first update")]
    NotUpdated,
}

#[derive(Error, Debug)]
pub enum CubismError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("options parse error: {0}")]
    Options(String),
}

impl CubismError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CubismError::Load(e) => Some(e.kind()),
            CubismError::Render(_) => Some(ErrorKind::Render),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CubismError>;
