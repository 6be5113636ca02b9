//! 运行时配置
//!
//! 协作方（字节读取、解码器、渲染器）与可调参数统一放在一个显式的配置对象里，
//! 在构造运行时时传入，不存在进程级的可变全局状态。

use std::sync::mpsc::Sender;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::id::default_ids;
use crate::motion::{priority, MotionEvent};
use crate::platform::{
    ByteLoader, FsByteLoader, MocHeaderCheck, ModelConsistencyCheck, ModelDecoder, TextureDecoder,
};
use crate::render::Renderer;
use crate::setting::{ManifestParser, Model3JsonParser};
use crate::texture::ImageTextureDecoder;
use crate::CubismError;

/// 动作预加载策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PreloadPolicy {
    /// 加载时读取全部动作，任何失败都中止加载
    #[default]
    All,
    /// 首次播放时读取
    Lazy,
}

/// 动作参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionOptions {
    /// 动作文件和清单都未给出时的淡入时间（秒）
    pub default_fade_in: f32,
    /// 动作文件和清单都未给出时的淡出时间（秒）
    pub default_fade_out: f32,
    /// 队列为空时自动播放的动作组
    pub idle_group: Option<String>,
    pub idle_priority: i32,
}

impl Default for MotionOptions {
    fn default() -> Self {
        Self {
            default_fade_in: 1.0,
            default_fade_out: 1.0,
            idle_group: Some("Idle".to_string()),
            idle_priority: priority::IDLE,
        }
    }
}

/// 眨眼时序（秒）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeBlinkOptions {
    pub enabled: bool,
    /// 仅在本帧没有动作被应用时眨眼
    pub only_without_motion: bool,
    /// 平均眨眼间隔
    pub interval: f32,
    pub closing: f32,
    pub closed: f32,
    pub opening: f32,
}

impl Default for EyeBlinkOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            only_without_motion: false,
            interval: 4.0,
            closing: 0.1,
            closed: 0.05,
            opening: 0.15,
        }
    }
}

/// 呼吸参数：value = offset + peak * sin(2π t / cycle)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathParameter {
    pub id: String,
    pub offset: f32,
    pub peak: f32,
    pub cycle: f32,
    pub weight: f32,
}

impl BreathParameter {
    pub fn new(id: &str, offset: f32, peak: f32, cycle: f32, weight: f32) -> Self {
        Self {
            id: id.to_string(),
            offset,
            peak,
            cycle,
            weight,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreathOptions {
    pub enabled: bool,
    pub parameters: Vec<BreathParameter>,
}

impl Default for BreathOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            parameters: vec![
                BreathParameter::new(default_ids::PARAM_ANGLE_X, 0.0, 15.0, 6.5345, 0.5),
                BreathParameter::new(default_ids::PARAM_ANGLE_Y, 0.0, 8.0, 3.5345, 0.5),
                BreathParameter::new(default_ids::PARAM_ANGLE_Z, 0.0, 10.0, 5.5345, 0.5),
                BreathParameter::new(default_ids::PARAM_BODY_ANGLE_X, 0.0, 4.0, 15.5345, 0.5),
                BreathParameter::new(default_ids::PARAM_BREATH, 0.5, 0.5, 3.2345, 1.0),
            ],
        }
    }
}

/// 拖拽跟随
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DragOptions {
    /// 指数平滑的时间常数（秒），越小跟随越快
    pub smoothing_time: f32,
    /// 头部角度上限（度）
    pub max_angle: f32,
    /// 身体角度上限（度）
    pub max_body_angle: f32,
    /// 眼球参数上限
    pub max_eye_ball: f32,
}

impl Default for DragOptions {
    fn default() -> Self {
        Self {
            smoothing_time: 0.15,
            max_angle: 30.0,
            max_body_angle: 10.0,
            max_eye_ball: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncOptions {
    pub weight: f32,
}

impl Default for LipSyncOptions {
    fn default() -> Self {
        Self { weight: 0.8 }
    }
}

/// 物理模拟参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsOptions {
    pub enabled: bool,
    /// physics3.json 未指定 Fps 时的固定步长频率
    pub fps: f32,
    /// 每帧最大子步数
    pub max_substeps: u32,
    pub air_resistance: f32,
    pub movement_threshold: f32,
    /// 外部加速度作为附加风力的缩放
    pub acceleration_scale: f32,
}

impl Default for PhysicsOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            fps: 60.0,
            max_substeps: 8,
            air_resistance: 5.0,
            movement_threshold: 0.001,
            acceleration_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseOptions {
    /// pose3.json 未指定 FadeInTime 时使用
    pub default_fade_in: f32,
}

impl Default for PoseOptions {
    fn default() -> Self {
        Self { default_fade_in: 0.5 }
    }
}

/// 可序列化的运行时参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    pub preload: PreloadPolicy,
    /// 加载时校验模型二进制结构
    pub verify_consistency: bool,
    /// 纹理并行解码
    pub parallel_texture_decode: bool,
    /// 随机数种子；None 时取系统熵
    pub random_seed: Option<u64>,
    /// 覆盖渲染目标尺寸；None 时使用画布像素尺寸
    pub surface_size: Option<(u32, u32)>,
    pub motion: MotionOptions,
    pub eye_blink: EyeBlinkOptions,
    pub breath: BreathOptions,
    pub drag: DragOptions,
    pub lip_sync: LipSyncOptions,
    pub physics: PhysicsOptions,
    pub pose: PoseOptions,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            preload: PreloadPolicy::All,
            verify_consistency: true,
            parallel_texture_decode: true,
            random_seed: None,
            surface_size: None,
            motion: MotionOptions::default(),
            eye_blink: EyeBlinkOptions::default(),
            breath: BreathOptions::default(),
            drag: DragOptions::default(),
            lip_sync: LipSyncOptions::default(),
            physics: PhysicsOptions::default(),
            pose: PoseOptions::default(),
        }
    }
}

impl RuntimeOptions {
    /// 从 JSON 字符串解析，缺省字段取默认值
    pub fn from_json_str(s: &str) -> Result<Self, CubismError> {
        serde_json::from_str(s).map_err(|e| CubismError::Options(e.to_string()))
    }
}

/// 运行时配置：协作方 + 参数
pub struct RuntimeConfig {
    pub byte_loader: Arc<dyn ByteLoader>,
    pub manifest_parser: Arc<dyn ManifestParser>,
    pub model_decoder: Arc<dyn ModelDecoder>,
    pub consistency_check: Arc<dyn ModelConsistencyCheck>,
    pub texture_decoder: Arc<dyn TextureDecoder>,
    pub renderer: Box<dyn Renderer>,
    pub event_sender: Option<Sender<MotionEvent>>,
    pub options: RuntimeOptions,
}

impl RuntimeConfig {
    /// 使用文件系统读取、model3.json 解析、moc3 头部检查、image 纹理解码
    pub fn new(model_decoder: Arc<dyn ModelDecoder>, renderer: Box<dyn Renderer>) -> Self {
        Self {
            byte_loader: Arc::new(FsByteLoader),
            manifest_parser: Arc::new(Model3JsonParser),
            model_decoder,
            consistency_check: Arc::new(MocHeaderCheck::default()),
            texture_decoder: Arc::new(ImageTextureDecoder::default()),
            renderer,
            event_sender: None,
            options: RuntimeOptions::default(),
        }
    }

    pub fn with_byte_loader(mut self, loader: Arc<dyn ByteLoader>) -> Self {
        self.byte_loader = loader;
        self
    }

    pub fn with_manifest_parser(mut self, parser: Arc<dyn ManifestParser>) -> Self {
        self.manifest_parser = parser;
        self
    }

    pub fn with_consistency_check(mut self, check: Arc<dyn ModelConsistencyCheck>) -> Self {
        self.consistency_check = check;
        self
    }

    pub fn with_texture_decoder(mut self, decoder: Arc<dyn TextureDecoder>) -> Self {
        self.texture_decoder = decoder;
        self
    }

    /// 生命周期事件转发到通道，而不是缓存在运行时内
    pub fn with_event_sender(mut self, sender: Sender<MotionEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }
}
