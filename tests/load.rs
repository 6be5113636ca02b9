//! 加载流程：成功路径与全有或全无的失败路径

mod common;

use std::path::Path;
use std::sync::Arc;

use common::*;
use cubism_engine::{
    ErrorKind, HeadlessRenderer, LoadError, PreloadPolicy, RenderError, RuntimeOptions, UserModel,
};
use pretty_assertions::assert_eq;

fn load_with(loader: cubism_engine::MemoryByteLoader, options: RuntimeOptions) -> (Result<UserModel, LoadError>, HeadlessRenderer) {
    let renderer = HeadlessRenderer::new();
    let result = UserModel::load(config(Arc::new(loader), renderer.clone(), options), HOME);
    (result, renderer)
}

#[test]
fn test_load_update_draw() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (config, renderer) = default_config();
    let mut model = UserModel::load(config, HOME).unwrap();

    assert_eq!(model.setting().file_name(), MANIFEST);
    assert_eq!(model.surface_size().width, 400);
    assert_eq!(model.surface_size().height, 400);
    assert_eq!(renderer.live_surface_count(), 1);
    assert_eq!(renderer.live_texture_count(), 2);

    model.update(0.0);
    model.draw(IDENTITY).unwrap();

    let draws = renderer.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].texture_count, 2);
    assert_eq!(draws[0].opacity, 1.0);
}

#[test]
fn test_draw_before_update_is_rejected() {
    let (config, renderer) = default_config();
    let mut model = UserModel::load(config, HOME).unwrap();
    assert_eq!(model.draw(IDENTITY), Err(RenderError::NotUpdated));
    assert!(renderer.draws().is_empty());

    // 每帧一次 update 对应一次 draw
    model.update(1.0 / 60.0);
    model.draw(IDENTITY).unwrap();
    assert_eq!(model.draw(IDENTITY), Err(RenderError::NotUpdated));
    assert_eq!(renderer.draws().len(), 1);

    model.update(1.0 / 60.0);
    model.draw(IDENTITY).unwrap();
    assert_eq!(renderer.draws().len(), 2);
}

#[test]
fn test_drop_releases_render_resources() {
    let (config, renderer) = default_config();
    let model = UserModel::load(config, HOME).unwrap();
    assert_eq!(renderer.live_surface_count(), 1);
    drop(model);
    assert_eq!(renderer.live_surface_count(), 0);
    assert_eq!(renderer.live_texture_count(), 0);
}

#[test]
fn test_explicit_manifest_name() {
    let loader = model_loader().with_file(path("other.model3.json"), "{}");
    let renderer = HeadlessRenderer::new();
    let model = UserModel::load_with_manifest(
        config(Arc::new(loader), renderer, options()),
        HOME,
        MANIFEST,
    )
    .unwrap();
    assert_eq!(model.setting().file_name(), MANIFEST);
}

#[test]
fn test_missing_directory_and_malformed_manifest_differ() {
    let renderer = HeadlessRenderer::new();
    let err = UserModel::load(
        config(Arc::new(model_loader()), renderer.clone(), options()),
        "models/nobody",
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::DirectoryNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);

    let loader = model_loader().with_file(path(MANIFEST), "{ not json");
    let (result, renderer) = load_with(loader, options());
    let err = result.unwrap_err();
    assert!(matches!(err, LoadError::ManifestInvalid(_)));
    assert_eq!(err.kind(), ErrorKind::FormatInvalid);
    assert_eq!(renderer.created_surface_count(), 0);
}

#[test]
fn test_directory_without_manifest() {
    let loader = cubism_engine::MemoryByteLoader::new().with_file(path("readme.txt"), "hi");
    let (result, _) = load_with(loader, options());
    assert!(matches!(result.unwrap_err(), LoadError::ManifestMissing(_)));
}

#[test]
fn test_missing_model_file() {
    let loader = model_loader();
    loader.remove(Path::new(&path("haru.moc3")));
    let (result, renderer) = load_with(loader, options());
    assert!(matches!(result.unwrap_err(), LoadError::ModelFileMissing(_)));
    assert_eq!(renderer.created_surface_count(), 0);
}

#[test]
fn test_inconsistent_model_file() {
    let mut bytes = moc_bytes(MODEL_JSON);
    bytes[0] = b'X';
    let loader = model_loader().with_file(path("haru.moc3"), bytes);
    let (result, _) = load_with(loader, options());
    let err = result.unwrap_err();
    assert!(matches!(err, LoadError::ConsistencyFailed(_)));
    assert_eq!(err.kind(), ErrorKind::Inconsistent);
}

#[test]
fn test_corrupt_model_without_verification() {
    let loader = model_loader().with_file(path("haru.moc3"), moc_bytes("{\"canvas\": oops"));
    let (result, _) = load_with(
        loader,
        RuntimeOptions {
            verify_consistency: false,
            ..options()
        },
    );
    assert!(matches!(result.unwrap_err(), LoadError::ModelCorrupt(_)));
}

#[test]
fn test_broken_texture_fails_whole_load() {
    let loader = model_loader().with_file(path("haru.1024/texture_01.png"), b"not a png".to_vec());
    let (result, renderer) = load_with(loader, options());
    assert!(matches!(result.unwrap_err(), LoadError::NoValidTexture(_)));
    assert_eq!(renderer.live_surface_count(), 0);
    assert_eq!(renderer.live_texture_count(), 0);
}

#[test]
fn test_missing_motion_fails_eager_load() {
    let loader = model_loader();
    loader.remove(Path::new(&path("motions/force.motion3.json")));
    let (result, renderer) = load_with(loader, options());
    let err = result.unwrap_err();
    assert!(matches!(err, LoadError::AssetMissing(_)));
    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    assert_eq!(renderer.created_surface_count(), 0);
}

#[test]
fn test_missing_motion_with_lazy_preload() {
    let loader = model_loader();
    loader.remove(Path::new(&path("motions/force.motion3.json")));
    let (result, _) = load_with(
        loader,
        RuntimeOptions {
            preload: PreloadPolicy::Lazy,
            ..options()
        },
    );
    let mut model = result.unwrap();
    assert!(!model.start_motion("Force", 0, cubism_engine::priority::FORCE).is_valid());
    // 失败会被记住，不会反复读取
    assert!(!model.start_motion("Force", 0, cubism_engine::priority::FORCE).is_valid());
    assert!(model.start_motion("TapBody", 0, cubism_engine::priority::NORMAL).is_valid());
}

#[test]
fn test_invalid_physics_fails_load() {
    let loader = model_loader().with_file(path("haru.physics3.json"), "[]");
    let (result, _) = load_with(loader, options());
    let err = result.unwrap_err();
    assert!(matches!(err, LoadError::AssetInvalid { .. }));
    assert_eq!(err.kind(), ErrorKind::FormatInvalid);
}

#[test]
fn test_surface_creation_failure() {
    let renderer = HeadlessRenderer::new();
    renderer.fail_next_surface();
    let err = UserModel::load(config(Arc::new(model_loader()), renderer.clone(), options()), HOME).unwrap_err();
    assert!(matches!(err, LoadError::Render(RenderError::SurfaceCreation { .. })));
    assert_eq!(err.kind(), ErrorKind::Render);
    assert_eq!(renderer.live_texture_count(), 0);
}

#[test]
fn test_surface_size_override() {
    let (result, _) = load_with(
        model_loader(),
        RuntimeOptions {
            surface_size: Some((128, 64)),
            ..options()
        },
    );
    let model = result.unwrap();
    assert_eq!(model.surface_size().width, 128);
    assert_eq!(model.surface_size().height, 64);
}

#[test]
fn test_consistency_query() {
    let (config, _) = default_config();
    let model = UserModel::load(config, HOME).unwrap();
    assert!(model.has_consistent_model("haru.moc3"));
    assert!(!model.has_consistent_model("haru.physics3.json"));
    assert!(!model.has_consistent_model("missing.moc3"));
}

#[test]
fn test_load_from_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path().join("haru");
    let source = model_loader();
    for file in [
        MANIFEST,
        "haru.moc3",
        "haru.1024/texture_00.png",
        "haru.1024/texture_01.png",
        "haru.physics3.json",
        "haru.pose3.json",
        "haru.userdata3.json",
        "expressions/f01.exp3.json",
        "expressions/f02.exp3.json",
        "motions/idle.motion3.json",
        "motions/tap.motion3.json",
        "motions/force.motion3.json",
    ] {
        let target = home.join(file);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        let bytes = source.remove(Path::new(&path(file))).unwrap();
        std::fs::write(target, bytes).unwrap();
    }

    let renderer = HeadlessRenderer::new();
    let config = cubism_engine::RuntimeConfig::new(Arc::new(FixtureDecoder), Box::new(renderer.clone()))
        .with_options(options());
    let mut model = UserModel::load(config, &home).unwrap();
    model.update(1.0 / 60.0);
    model.draw(IDENTITY).unwrap();
    assert_eq!(renderer.draws().len(), 1);
}
