//! 模型清单（model3.json）
//!
//! [`ModelSetting`] 构造后不可变，仅描述路径、ID 和分组；
//! 实际的加载顺序由 [`crate::UserModel`] 负责。

mod model3_json;

pub use model3_json::Model3JsonParser;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::platform::{ByteLoader, LoadFileError, PathKind};
use crate::LoadError;

/// 清单文件后缀
pub const MANIFEST_SUFFIX: &str = ".model3.json";

/// 清单解析失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ManifestError(pub String);

/// 清单解析
pub trait ManifestParser: Send + Sync {
    fn parse(&self, home_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<ModelSetting, ManifestError>;
}

/// 单个动作条目
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MotionSetting {
    pub file: String,
    pub fade_in_time: Option<f32>,
    pub fade_out_time: Option<f32>,
    pub sound: Option<String>,
}

/// 动作组
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MotionGroup {
    pub name: String,
    pub motions: Vec<MotionSetting>,
}

/// 表情条目
#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionSetting {
    pub name: String,
    pub file: String,
}

/// 碰撞区域条目
#[derive(Clone, Debug, PartialEq)]
pub struct HitAreaSetting {
    pub name: String,
    /// 对应的可绘制对象 ID
    pub id: String,
    /// 顶点子集；None 表示使用全部顶点
    pub vertices: Option<Vec<u32>>,
}

/// 解析后的模型清单
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelSetting {
    pub(crate) home_dir: PathBuf,
    pub(crate) file_name: String,
    pub(crate) model_file: Option<String>,
    pub(crate) textures: Vec<String>,
    pub(crate) physics_file: Option<String>,
    pub(crate) pose_file: Option<String>,
    pub(crate) user_data_file: Option<String>,
    pub(crate) expressions: Vec<ExpressionSetting>,
    pub(crate) motion_groups: Vec<MotionGroup>,
    pub(crate) eye_blink_ids: Vec<String>,
    pub(crate) lip_sync_ids: Vec<String>,
    pub(crate) hit_areas: Vec<HitAreaSetting>,
    pub(crate) layout: BTreeMap<String, f32>,
}

impl ModelSetting {
    /// 模型根目录
    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// 清单文件名
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn model_file(&self) -> Option<&str> {
        self.model_file.as_deref()
    }

    pub fn textures(&self) -> &[String] {
        &self.textures
    }

    pub fn physics_file(&self) -> Option<&str> {
        self.physics_file.as_deref()
    }

    pub fn pose_file(&self) -> Option<&str> {
        self.pose_file.as_deref()
    }

    pub fn user_data_file(&self) -> Option<&str> {
        self.user_data_file.as_deref()
    }

    pub fn expressions(&self) -> &[ExpressionSetting] {
        &self.expressions
    }

    pub fn motion_groups(&self) -> &[MotionGroup] {
        &self.motion_groups
    }

    pub fn motion_group(&self, name: &str) -> Option<&MotionGroup> {
        self.motion_groups.iter().find(|g| g.name == name)
    }

    pub fn eye_blink_ids(&self) -> &[String] {
        &self.eye_blink_ids
    }

    pub fn lip_sync_ids(&self) -> &[String] {
        &self.lip_sync_ids
    }

    pub fn hit_areas(&self) -> &[HitAreaSetting] {
        &self.hit_areas
    }

    pub fn layout(&self) -> &BTreeMap<String, f32> {
        &self.layout
    }

    /// 相对根目录解析资源路径
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        self.home_dir.join(relative)
    }
}

/// 解析模型目录的清单
///
/// `manifest_name` 为 None 时在目录中查找唯一（排序后第一个）`*.model3.json`。
pub fn resolve(
    loader: &dyn ByteLoader,
    parser: &dyn ManifestParser,
    home_dir: &Path,
    manifest_name: Option<&str>,
) -> Result<ModelSetting, LoadError> {
    match loader.probe(home_dir) {
        PathKind::Missing => return Err(LoadError::DirectoryNotFound(home_dir.to_path_buf())),
        PathKind::File => return Err(LoadError::NotADirectory(home_dir.to_path_buf())),
        PathKind::Directory => {}
    }

    let file_name = match manifest_name {
        Some(name) => name.to_string(),
        None => find_manifest(loader, home_dir)?,
    };

    let bytes = loader
        .load(&home_dir.join(&file_name))
        .map_err(|e| match e {
            LoadFileError::NotFound(_) => LoadError::ManifestMissing(home_dir.to_path_buf()),
            LoadFileError::Read { reason, .. } => LoadError::ManifestInvalid(reason),
        })?;

    parser
        .parse(home_dir, &file_name, &bytes)
        .map_err(|e| LoadError::ManifestInvalid(format!("{}: {}", file_name, e)))
}

fn find_manifest(loader: &dyn ByteLoader, home_dir: &Path) -> Result<String, LoadError> {
    let mut candidates: Vec<String> = loader
        .list(home_dir)
        .map_err(|_| LoadError::ManifestMissing(home_dir.to_path_buf()))?
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .filter(|n| n.ends_with(MANIFEST_SUFFIX))
        .collect();
    candidates.sort();

    if candidates.len() > 1 {
        log::warn!(
            "multiple manifests in {}, using {}",
            home_dir.display(),
            candidates[0]
        );
    }
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| LoadError::ManifestMissing(home_dir.to_path_buf()))
}
