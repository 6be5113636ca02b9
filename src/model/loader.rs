//! 模型资源加载
//!
//! 加载顺序：清单 → 模型二进制（可选完整性检查）→ ID 集合 → 纹理 → 动作/表情
//! → 物理/姿势/用户数据 → 碰撞区域。任何一步失败都返回错误，
//! 已获取的子资源随之释放。

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;

use super::{HitAreaIndex, Model, ModelUserData};
use crate::config::{MotionOptions, PreloadPolicy, RuntimeConfig};
use crate::effect::{Physics, Pose};
use crate::id::IdentifierSet;
use crate::motion::{Expression, Motion, MotionLibrary};
use crate::platform::{ByteLoader, LoadFileError, ModelConsistencyCheck, TextureDecoder};
use crate::render::SurfaceSize;
use crate::setting::{self, ModelSetting, MotionSetting};
use crate::texture::Texture;
use crate::LoadError;

/// 加载完成、尚未分配 GPU 资源的模型
pub(crate) struct LoadedAssets {
    pub setting: ModelSetting,
    pub model: Model,
    pub ids: IdentifierSet,
    pub textures: Vec<Arc<Texture>>,
    pub library: MotionLibrary,
    pub physics: Option<Physics>,
    pub pose: Option<Pose>,
    pub user_data: ModelUserData,
    pub hit_areas: HitAreaIndex,
    pub surface_size: SurfaceSize,
}

fn read_asset(loader: &dyn ByteLoader, setting: &ModelSetting, file: &str) -> Result<Vec<u8>, LoadError> {
    loader.load(&setting.resolve_path(file)).map_err(|e| match e {
        LoadFileError::NotFound(path) => LoadError::AssetMissing(path.display().to_string()),
        LoadFileError::Read { path, reason } => LoadError::AssetInvalid {
            path: path.display().to_string(),
            reason,
        },
    })
}

fn invalid(file: &str, reason: impl ToString) -> LoadError {
    LoadError::AssetInvalid {
        path: file.to_string(),
        reason: reason.to_string(),
    }
}

/// 读取并解析一个动作文件
pub(crate) fn load_motion(
    loader: &dyn ByteLoader,
    setting: &ModelSetting,
    motion: &MotionSetting,
    model: &Model,
    options: &MotionOptions,
) -> Result<Motion, LoadError> {
    let bytes = read_asset(loader, setting, &motion.file)?;
    Motion::from_json(&bytes, model, motion, options).map_err(|e| invalid(&motion.file, e))
}

fn load_model(config: &RuntimeConfig, setting: &ModelSetting) -> Result<Model, LoadError> {
    let file = setting
        .model_file()
        .ok_or_else(|| LoadError::ModelFileMissing(setting.file_name().to_string()))?;
    let path = setting.resolve_path(file);
    let bytes = config.byte_loader.load(&path).map_err(|e| match e {
        LoadFileError::NotFound(p) => LoadError::ModelFileMissing(p.display().to_string()),
        LoadFileError::Read { path, reason } => LoadError::ModelCorrupt(format!("{}: {}", path.display(), reason)),
    })?;

    if config.options.verify_consistency && !config.consistency_check.is_consistent(&bytes) {
        return Err(LoadError::ConsistencyFailed(path.display().to_string()));
    }

    config
        .model_decoder
        .decode(&bytes)
        .map_err(|e| LoadError::ModelCorrupt(format!("{}: {}", path.display(), e)))
}

fn decode_texture(
    loader: &dyn ByteLoader,
    decoder: &dyn TextureDecoder,
    setting: &ModelSetting,
    file: &str,
) -> Result<Arc<Texture>, LoadError> {
    let bytes = loader
        .load(&setting.resolve_path(file))
        .map_err(|e| LoadError::NoValidTexture(format!("{}: {}", file, e)))?;
    decoder
        .decode(&bytes)
        .map(Arc::new)
        .map_err(|e| LoadError::NoValidTexture(format!("{}: {}", file, e)))
}

/// 按清单顺序解码纹理，序号即槽位
fn load_textures(config: &RuntimeConfig, setting: &ModelSetting, model: &Model) -> Result<Vec<Arc<Texture>>, LoadError> {
    let files = setting.textures();
    if files.is_empty() {
        return Err(LoadError::NoValidTexture(format!("{} declares no textures", setting.file_name())));
    }
    if model.texture_slot_count() > files.len() {
        return Err(LoadError::NoValidTexture(format!(
            "model uses {} texture slots but {} declared",
            model.texture_slot_count(),
            files.len()
        )));
    }

    let loader = config.byte_loader.as_ref();
    let decoder = config.texture_decoder.as_ref();
    if config.options.parallel_texture_decode {
        files
            .par_iter()
            .map(|file| decode_texture(loader, decoder, setting, file))
            .collect()
    } else {
        files
            .iter()
            .map(|file| decode_texture(loader, decoder, setting, file))
            .collect()
    }
}

fn load_library(config: &RuntimeConfig, setting: &ModelSetting, model: &Model) -> Result<MotionLibrary, LoadError> {
    let mut library = MotionLibrary::new(setting.motion_groups());
    let loader = config.byte_loader.as_ref();

    if config.options.preload == PreloadPolicy::All {
        for group in setting.motion_groups() {
            for (index, motion) in group.motions.iter().enumerate() {
                let clip = load_motion(loader, setting, motion, model, &config.options.motion)?;
                library.insert_motion(&group.name, index, clip);
            }
        }
    }

    for expression in setting.expressions() {
        let bytes = read_asset(loader, setting, &expression.file)?;
        let clip = Expression::from_json(&bytes, model, &config.options.motion)
            .map_err(|e| invalid(&expression.file, e))?;
        library.insert_expression(&expression.name, clip);
    }

    Ok(library)
}

/// 解析清单并加载全部资源
pub(crate) fn load_assets(
    config: &RuntimeConfig,
    home_dir: &Path,
    manifest_name: Option<&str>,
) -> Result<LoadedAssets, LoadError> {
    let setting = setting::resolve(
        config.byte_loader.as_ref(),
        config.manifest_parser.as_ref(),
        home_dir,
        manifest_name,
    )?;

    let model = load_model(config, &setting)?;
    let ids = IdentifierSet::resolve(model.parameter_ids(), setting.eye_blink_ids(), setting.lip_sync_ids());
    log::debug!("resolved identifiers: {:?}", ids);

    let textures = load_textures(config, &setting, &model)?;
    let library = load_library(config, &setting, &model)?;

    let loader = config.byte_loader.as_ref();
    let physics = match setting.physics_file() {
        Some(file) => {
            let bytes = read_asset(loader, &setting, file)?;
            Some(Physics::from_json(&bytes, &model, &config.options.physics).map_err(|e| invalid(file, e))?)
        }
        None => None,
    };
    let pose = match setting.pose_file() {
        Some(file) => {
            let bytes = read_asset(loader, &setting, file)?;
            Some(Pose::from_json(&bytes, &model, config.options.pose.default_fade_in).map_err(|e| invalid(file, e))?)
        }
        None => None,
    };
    let user_data = match setting.user_data_file() {
        Some(file) => {
            let bytes = read_asset(loader, &setting, file)?;
            ModelUserData::from_json(&bytes).map_err(|e| invalid(file, e))?
        }
        None => ModelUserData::default(),
    };

    let hit_areas = HitAreaIndex::build(setting.hit_areas(), &model);

    let surface_size = match config.options.surface_size {
        Some((w, h)) => SurfaceSize::new(w, h),
        None => {
            let pixels = model.canvas().size_in_pixels;
            SurfaceSize::new(pixels.x.round().max(1.0) as u32, pixels.y.round().max(1.0) as u32)
        }
    };

    log::info!(
        "loaded {} from {}: {} parameters, {} textures, {} motion groups ({} preloaded), {} expressions",
        setting.file_name(),
        home_dir.display(),
        model.parameter_count(),
        textures.len(),
        setting.motion_groups().len(),
        library.loaded_motion_count(),
        setting.expressions().len()
    );

    Ok(LoadedAssets {
        setting,
        model,
        ids,
        textures,
        library,
        physics,
        pose,
        user_data,
        hit_areas,
        surface_size,
    })
}

/// 模型二进制是否通过结构检查；读取失败返回 false
pub fn has_consistent_model(loader: &dyn ByteLoader, check: &dyn ModelConsistencyCheck, path: &Path) -> bool {
    match loader.load(path) {
        Ok(bytes) => check.is_consistent(&bytes),
        Err(e) => {
            log::debug!("consistency check skipped: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MemoryByteLoader, MocHeaderCheck};

    #[test]
    fn test_has_consistent_model() {
        let mut bytes = b"MOC3".to_vec();
        bytes.push(3);
        bytes.push(0);
        bytes.resize(64, 0);
        bytes.extend_from_slice(&96u32.to_le_bytes());
        bytes.resize(128, 0);

        let loader = MemoryByteLoader::new()
            .with_file("m/good.moc3", bytes)
            .with_file("m/bad.moc3", b"garbage".to_vec());
        let check = MocHeaderCheck::default();
        assert!(has_consistent_model(&loader, &check, Path::new("m/good.moc3")));
        assert!(!has_consistent_model(&loader, &check, Path::new("m/bad.moc3")));
        assert!(!has_consistent_model(&loader, &check, Path::new("m/none.moc3")));
    }
}
