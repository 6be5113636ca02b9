//! 集成测试夹具：内存中的模型目录、夹具模型解码器、无 GPU 渲染器
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use cubism_engine::model::{CanvasInfo, Deformer, Drawable, Model, ParameterInfo, PartInfo};
use cubism_engine::platform::{DecodeError, ModelDecoder};
use cubism_engine::{HeadlessRenderer, MemoryByteLoader, RuntimeConfig, RuntimeOptions};
use glam::Vec2;
use serde::Deserialize;

pub const HOME: &str = "models/haru";
pub const MANIFEST: &str = "haru.model3.json";
pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

const BODY_OFFSET: usize = 96;

/// 结构合法的 moc3 头部 + JSON 模型描述
pub fn moc_bytes(body: &str) -> Vec<u8> {
    let mut bytes = b"MOC3".to_vec();
    bytes.push(3);
    bytes.push(0);
    bytes.resize(64, 0);
    bytes.extend_from_slice(&(BODY_OFFSET as u32).to_le_bytes());
    bytes.resize(BODY_OFFSET, 0);
    bytes.extend_from_slice(body.as_bytes());
    bytes
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 120, 80, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

#[derive(Deserialize)]
struct FixtureModel {
    canvas: [f32; 3],
    parameters: Vec<(String, f32, f32, f32)>,
    parts: Vec<String>,
    drawables: Vec<(String, usize, Vec<[f32; 2]>)>,
}

/// 按 ParamAngleX 平移顶点的变形器
struct ShiftDeformer {
    angle_x: Option<usize>,
}

impl Deformer for ShiftDeformer {
    fn deform(&mut self, parameters: &[f32], _part_opacities: &[f32], drawables: &mut [Drawable]) {
        let shift = self.angle_x.and_then(|i| parameters.get(i)).copied().unwrap_or(0.0) * 0.001;
        for drawable in drawables {
            for (v, rest) in drawable.vertices.iter_mut().zip(&drawable.rest_vertices) {
                *v = *rest + Vec2::new(shift, 0.0);
            }
        }
    }
}

/// 解析 moc3 头部之后的 JSON 模型描述
pub struct FixtureDecoder;

impl ModelDecoder for FixtureDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Model, DecodeError> {
        let body = bytes
            .get(BODY_OFFSET..)
            .ok_or_else(|| DecodeError("truncated model".into()))?;
        let json: FixtureModel = serde_json::from_slice(body).map_err(|e| DecodeError(e.to_string()))?;

        let [width, height, ppu] = json.canvas;
        let canvas = CanvasInfo {
            size_in_pixels: Vec2::new(width, height),
            origin_in_pixels: Vec2::new(width / 2.0, height / 2.0),
            pixels_per_unit: ppu,
        };
        let angle_x = json.parameters.iter().position(|p| p.0 == "ParamAngleX");
        let parameters = json
            .parameters
            .into_iter()
            .map(|(id, min, max, default)| ParameterInfo::new(id, min, max, default))
            .collect();
        let parts = json
            .parts
            .into_iter()
            .map(|id| PartInfo { id, opacity: 1.0 })
            .collect();
        let drawables = json
            .drawables
            .into_iter()
            .map(|(id, texture, vertices)| {
                Drawable::new(id, texture, vertices.into_iter().map(Vec2::from).collect())
            })
            .collect();

        Ok(Model::new(canvas, parameters, parts, drawables, Box::new(ShiftDeformer { angle_x })))
    }
}

pub const MODEL_JSON: &str = r#"{
    "canvas": [400.0, 400.0, 200.0],
    "parameters": [
        ["ParamAngleX", -30.0, 30.0, 0.0],
        ["ParamAngleY", -30.0, 30.0, 0.0],
        ["ParamAngleZ", -30.0, 30.0, 0.0],
        ["ParamBodyAngleX", -10.0, 10.0, 0.0],
        ["ParamEyeBallX", -1.0, 1.0, 0.0],
        ["ParamEyeBallY", -1.0, 1.0, 0.0],
        ["ParamBreath", 0.0, 1.0, 0.0],
        ["ParamEyeLOpen", 0.0, 1.0, 1.0],
        ["ParamMouthOpenY", 0.0, 1.0, 0.0],
        ["ParamHairFront", -1.0, 1.0, 0.0],
        ["PartArmA", 0.0, 1.0, 0.0],
        ["PartArmB", 0.0, 1.0, 0.0]
    ],
    "parts": ["PartCore", "PartArmA", "PartArmB"],
    "drawables": [
        ["ArtMeshBody", 0, [[-0.5, -0.8], [0.5, -0.8], [0.5, 0.8], [-0.5, 0.8]]],
        ["ArtMeshHead", 1, [[-0.3, 0.4], [0.3, 0.4], [0.3, 0.9], [-0.3, 0.9]]]
    ]
}"#;

pub const MANIFEST_JSON: &str = r#"{
    "Version": 3,
    "FileReferences": {
        "Moc": "haru.moc3",
        "Textures": ["haru.1024/texture_00.png", "haru.1024/texture_01.png"],
        "Physics": "haru.physics3.json",
        "Pose": "haru.pose3.json",
        "UserData": "haru.userdata3.json",
        "Expressions": [
            {"Name": "f01", "File": "expressions/f01.exp3.json"},
            {"Name": "f02", "File": "expressions/f02.exp3.json"}
        ],
        "Motions": {
            "Idle": [{"File": "motions/idle.motion3.json"}],
            "TapBody": [
                {"File": "motions/tap.motion3.json", "Sound": "sounds/tap.wav"},
                {"File": "motions/tap.motion3.json", "FadeInTime": 0.0}
            ],
            "Force": [{"File": "motions/force.motion3.json"}],
            "Empty": []
        }
    },
    "Groups": [
        {"Target": "Parameter", "Name": "EyeBlink", "Ids": ["ParamEyeLOpen"]},
        {"Target": "Parameter", "Name": "LipSync", "Ids": ["ParamMouthOpenY"]}
    ],
    "HitAreas": [
        {"Id": "ArtMeshBody", "Name": "Body"},
        {"Id": "ArtMeshHead", "Name": "Head"},
        {"Id": "ArtMeshMissing", "Name": "Tail"}
    ]
}"#;

pub const IDLE_MOTION: &str = r#"{
    "Version": 3,
    "Meta": {"Duration": 2.0, "Fps": 30.0, "Loop": true, "AreBeziersRestricted": true,
             "FadeInTime": 0.5, "FadeOutTime": 0.5},
    "Curves": [
        {"Target": "Parameter", "Id": "ParamAngleZ", "Segments": [0, 0, 1, 0.5, 2, 1.5, 2, 2, 0]}
    ]
}"#;

pub const TAP_MOTION: &str = r#"{
    "Version": 3,
    "Meta": {"Duration": 1.0, "Fps": 30.0, "Loop": false, "FadeInTime": 0.2, "FadeOutTime": 0.2},
    "Curves": [
        {"Target": "Parameter", "Id": "ParamAngleX", "Segments": [0, 0, 0, 0.5, 20, 0, 1, 0]},
        {"Target": "Model", "Id": "Opacity", "Segments": [0, 1, 0, 1, 0.8]}
    ],
    "UserData": [{"Time": 0.5, "Value": "tap"}]
}"#;

pub const FORCE_MOTION: &str = r#"{
    "Version": 3,
    "Meta": {"Duration": 1.0, "Fps": 30.0, "Loop": false, "FadeInTime": 0.1, "FadeOutTime": 0.1},
    "Curves": [
        {"Target": "Parameter", "Id": "ParamAngleY", "Segments": [0, 0, 0, 1, 15]}
    ]
}"#;

pub const F01: &str = r#"{"Type": "Live2D Expression", "FadeInTime": 0.0,
    "Parameters": [{"Id": "ParamMouthOpenY", "Value": 0.5, "Blend": "Overwrite"}]}"#;

pub const F02: &str = r#"{"Type": "Live2D Expression", "FadeInTime": 0.0,
    "Parameters": [{"Id": "ParamEyeLOpen", "Value": 0.5, "Blend": "Multiply"}]}"#;

pub const PHYSICS: &str = r#"{
    "Version": 3,
    "Meta": {"PhysicsSettingCount": 1, "Fps": 60.0,
             "EffectiveForces": {"Gravity": {"X": 0, "Y": -1}, "Wind": {"X": 0, "Y": 0}}},
    "PhysicsSettings": [{
        "Id": "PhysicsSetting1",
        "Input": [{"Source": {"Target": "Parameter", "Id": "ParamAngleX"}, "Weight": 100, "Type": "X", "Reflect": false}],
        "Output": [{"Destination": {"Target": "Parameter", "Id": "ParamHairFront"}, "VertexIndex": 1, "Scale": 1.0, "Weight": 100, "Type": "Angle", "Reflect": false}],
        "Vertices": [
            {"Position": {"X": 0, "Y": 0}, "Mobility": 1, "Delay": 1, "Acceleration": 1, "Radius": 0},
            {"Position": {"X": 0, "Y": 10}, "Mobility": 0.95, "Delay": 0.9, "Acceleration": 1.5, "Radius": 10}
        ],
        "Normalization": {"Position": {"Minimum": -10, "Default": 0, "Maximum": 10},
                          "Angle": {"Minimum": -10, "Default": 0, "Maximum": 10}}
    }]
}"#;

pub const POSE: &str = r#"{"Type": "Live2D Pose", "FadeInTime": 0.5,
    "Groups": [[{"Id": "PartArmA", "Link": []}, {"Id": "PartArmB", "Link": []}]]}"#;

pub const USER_DATA: &str = r#"{"Version": 3, "Meta": {"UserDataCount": 1},
    "UserData": [{"Target": "ArtMesh", "Id": "ArtMeshBody", "Value": "body-tag"}]}"#;

pub fn path(file: &str) -> String {
    format!("{}/{}", HOME, file)
}

/// 完整的模型目录
pub fn model_loader() -> MemoryByteLoader {
    MemoryByteLoader::new()
        .with_file(path(MANIFEST), MANIFEST_JSON)
        .with_file(path("haru.moc3"), moc_bytes(MODEL_JSON))
        .with_file(path("haru.1024/texture_00.png"), png_bytes(4, 4))
        .with_file(path("haru.1024/texture_01.png"), png_bytes(2, 2))
        .with_file(path("haru.physics3.json"), PHYSICS)
        .with_file(path("haru.pose3.json"), POSE)
        .with_file(path("haru.userdata3.json"), USER_DATA)
        .with_file(path("expressions/f01.exp3.json"), F01)
        .with_file(path("expressions/f02.exp3.json"), F02)
        .with_file(path("motions/idle.motion3.json"), IDLE_MOTION)
        .with_file(path("motions/tap.motion3.json"), TAP_MOTION)
        .with_file(path("motions/force.motion3.json"), FORCE_MOTION)
}

pub fn options() -> RuntimeOptions {
    RuntimeOptions {
        random_seed: Some(42),
        ..Default::default()
    }
}

pub fn config(loader: Arc<MemoryByteLoader>, renderer: HeadlessRenderer, options: RuntimeOptions) -> RuntimeConfig {
    RuntimeConfig::new(Arc::new(FixtureDecoder), Box::new(renderer))
        .with_byte_loader(loader)
        .with_options(options)
}

/// 默认夹具配置；返回的渲染器与运行时共享状态
pub fn default_config() -> (RuntimeConfig, HeadlessRenderer) {
    let renderer = HeadlessRenderer::new();
    (config(Arc::new(model_loader()), renderer.clone(), options()), renderer)
}
