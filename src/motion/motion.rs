//! motion3.json 动作片段

use serde::Deserialize;
use thiserror::Error;

use super::curve::{Curve, CurveTarget};
use crate::config::MotionOptions;
use crate::id::{IdentifierSet, ParameterId, PartId};
use crate::model::Model;
use crate::setting::MotionSetting;

const MODEL_OPACITY: &str = "Opacity";
const MODEL_EYE_BLINK: &str = "EyeBlink";
const MODEL_LIP_SYNC: &str = "LipSync";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MotionError {
    #[error("motion json: {0}")]
    Json(String),

    #[error("motion curve: {0}")]
    Curve(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Motion3Json {
    meta: MetaJson,
    #[serde(default)]
    curves: Vec<CurveJson>,
    #[serde(default)]
    user_data: Vec<UserDataJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetaJson {
    duration: f32,
    #[serde(default)]
    r#loop: bool,
    #[serde(default = "default_restricted")]
    are_beziers_restricted: bool,
    #[serde(default)]
    fade_in_time: Option<f32>,
    #[serde(default)]
    fade_out_time: Option<f32>,
}

fn default_restricted() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CurveJson {
    target: String,
    id: String,
    #[serde(default)]
    fade_in_time: Option<f32>,
    #[serde(default)]
    fade_out_time: Option<f32>,
    segments: Vec<f32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserDataJson {
    time: f32,
    value: String,
}

/// 定时用户数据
#[derive(Clone, Debug, PartialEq)]
pub struct MotionUserDataEvent {
    pub time: f32,
    pub value: String,
}

/// 已绑定到模型句柄的曲线
#[derive(Clone, Debug)]
enum Binding {
    Opacity,
    EyeBlink,
    LipSync,
    Parameter(ParameterId),
    Part(PartId),
}

#[derive(Clone, Debug)]
struct BoundCurve {
    curve: Curve,
    binding: Binding,
}

/// 单帧应用动作时的输入
pub(crate) struct ApplyContext<'a> {
    pub ids: &'a IdentifierSet,
    /// 本地时间（秒），循环动作已取模
    pub time: f32,
    /// 动作级淡入淡出权重
    pub fade_weight: f32,
    /// 用于计算曲线级淡入淡出
    pub since_fade_in: f32,
    pub until_end: Option<f32>,
}

/// 动作片段
#[derive(Clone, Debug)]
pub struct Motion {
    duration: f32,
    looping: bool,
    restricted_bezier: bool,
    fade_in: f32,
    fade_out: f32,
    curves: Vec<BoundCurve>,
    user_data: Vec<MotionUserDataEvent>,
    sound: Option<String>,
}

impl Motion {
    /// 解析 motion3.json 并把曲线 ID 解析为模型句柄
    ///
    /// 淡入淡出优先级：清单 > 动作文件 Meta > `options` 默认值。
    /// 模型中不存在的参数或部件的曲线被跳过。
    pub fn from_json(
        bytes: &[u8],
        model: &Model,
        setting: &MotionSetting,
        options: &MotionOptions,
    ) -> Result<Self, MotionError> {
        let json: Motion3Json =
            serde_json::from_slice(bytes).map_err(|e| MotionError::Json(e.to_string()))?;

        let meta = json.meta;
        let fade_in = setting
            .fade_in_time
            .or(meta.fade_in_time.filter(|t| *t >= 0.0))
            .unwrap_or(options.default_fade_in);
        let fade_out = setting
            .fade_out_time
            .or(meta.fade_out_time.filter(|t| *t >= 0.0))
            .unwrap_or(options.default_fade_out);

        let mut curves = Vec::with_capacity(json.curves.len());
        for c in json.curves {
            let target = match c.target.as_str() {
                "Model" => CurveTarget::Model,
                "Parameter" => CurveTarget::Parameter,
                "PartOpacity" => CurveTarget::PartOpacity,
                other => {
                    log::debug!("skip curve '{}' with unknown target '{}'", c.id, other);
                    continue;
                }
            };
            let binding = match target {
                CurveTarget::Model => match c.id.as_str() {
                    MODEL_OPACITY => Some(Binding::Opacity),
                    MODEL_EYE_BLINK => Some(Binding::EyeBlink),
                    MODEL_LIP_SYNC => Some(Binding::LipSync),
                    _ => None,
                },
                CurveTarget::Parameter => model.parameter_index(&c.id).map(Binding::Parameter),
                CurveTarget::PartOpacity => model.part_index(&c.id).map(Binding::Part),
            };
            let Some(binding) = binding else {
                log::debug!("skip curve '{}': not present in model", c.id);
                continue;
            };
            let curve = Curve::parse(target, c.id, &c.segments, c.fade_in_time, c.fade_out_time)
                .map_err(MotionError::Curve)?;
            curves.push(BoundCurve { curve, binding });
        }

        let mut user_data: Vec<MotionUserDataEvent> = json
            .user_data
            .into_iter()
            .map(|u| MotionUserDataEvent { time: u.time, value: u.value })
            .collect();
        user_data.sort_by(|a, b| a.time.total_cmp(&b.time));

        Ok(Self {
            duration: meta.duration.max(0.0),
            looping: meta.r#loop,
            restricted_bezier: meta.are_beziers_restricted,
            fade_in: fade_in.max(0.0),
            fade_out: fade_out.max(0.0),
            curves,
            user_data,
            sound: setting.sound.clone(),
        })
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn is_loop(&self) -> bool {
        self.looping
    }

    pub fn fade_in(&self) -> f32 {
        self.fade_in
    }

    pub fn fade_out(&self) -> f32 {
        self.fade_out
    }

    pub fn curve_count(&self) -> usize {
        self.curves.len()
    }

    pub fn user_data(&self) -> &[MotionUserDataEvent] {
        &self.user_data
    }

    /// 清单中关联的音频文件
    pub fn sound(&self) -> Option<&str> {
        self.sound.as_deref()
    }

    /// 本地时间落在 (from, to] 内的用户数据；to < from 表示循环回绕
    pub(crate) fn fired_user_data(&self, from: f32, to: f32) -> impl Iterator<Item = &MotionUserDataEvent> {
        self.user_data.iter().filter(move |u| {
            if to >= from {
                u.time > from && u.time <= to
            } else {
                u.time > from || u.time <= to
            }
        })
    }

    /// 按权重把曲线值混合到模型参数上
    ///
    /// 返回 Opacity 曲线的值（如果有）。
    pub(crate) fn apply(&self, model: &mut Model, ctx: &ApplyContext<'_>) -> Option<f32> {
        let mut opacity = None;
        let mut eye_blink = None;
        let mut lip_sync = None;

        for bound in &self.curves {
            match bound.binding {
                Binding::Opacity => opacity = Some(bound.curve.evaluate(ctx.time, self.restricted_bezier)),
                Binding::EyeBlink => eye_blink = Some(bound.curve.evaluate(ctx.time, self.restricted_bezier)),
                Binding::LipSync => lip_sync = Some(bound.curve.evaluate(ctx.time, self.restricted_bezier)),
                _ => {}
            }
        }

        let mut driven: Vec<ParameterId> = Vec::new();
        for bound in &self.curves {
            match bound.binding {
                Binding::Parameter(id) => {
                    let mut value = bound.curve.evaluate(ctx.time, self.restricted_bezier);
                    if let Some(blink) = eye_blink.filter(|_| ctx.ids.eye_blink.contains(&id)) {
                        value *= blink;
                    }
                    if let Some(lip) = lip_sync.filter(|_| ctx.ids.lip_sync.contains(&id)) {
                        value += lip;
                    }
                    let weight = self.curve_weight(&bound.curve, ctx);
                    let source = model.parameter_value(id);
                    model.set_parameter_value(id, source + (value - source) * weight, 1.0);
                    driven.push(id);
                }
                Binding::Part(id) => {
                    let value = bound.curve.evaluate(ctx.time, self.restricted_bezier);
                    model.set_part_opacity(id, value);
                }
                _ => {}
            }
        }

        // 没有独立曲线的眨眼/口型参数仍受模型级曲线驱动
        if let Some(blink) = eye_blink {
            for &id in ctx.ids.eye_blink.iter().filter(|id| !driven.contains(id)) {
                let source = model.parameter_value(id);
                model.set_parameter_value(id, source + (source * blink - source) * ctx.fade_weight, 1.0);
            }
        }
        if let Some(lip) = lip_sync {
            for &id in ctx.ids.lip_sync.iter().filter(|id| !driven.contains(id)) {
                let source = model.parameter_value(id);
                model.set_parameter_value(id, source + lip * ctx.fade_weight, 1.0);
            }
        }

        opacity
    }

    fn curve_weight(&self, curve: &Curve, ctx: &ApplyContext<'_>) -> f32 {
        if curve.fade_in.is_none() && curve.fade_out.is_none() {
            return ctx.fade_weight;
        }
        let fade_in = match curve.fade_in {
            Some(t) if t > 0.0 => super::easing_sine(ctx.since_fade_in / t),
            Some(_) => 1.0,
            None if self.fade_in > 0.0 => super::easing_sine(ctx.since_fade_in / self.fade_in),
            None => 1.0,
        };
        let fade_out_time = curve.fade_out.unwrap_or(self.fade_out);
        let fade_out = match ctx.until_end {
            Some(remaining) if fade_out_time > 0.0 => super::easing_sine(remaining / fade_out_time),
            _ => 1.0,
        };
        fade_in * fade_out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::tests::sample_model;

    pub const WAVE: &str = r#"{
        "Version": 3,
        "Meta": {"Duration": 2.0, "Fps": 30.0, "Loop": false, "AreBeziersRestricted": true,
                 "CurveCount": 3, "FadeInTime": 0.0, "FadeOutTime": 0.0},
        "Curves": [
            {"Target": "Parameter", "Id": "ParamAngleX", "Segments": [0, 0, 0, 1, 30, 0, 2, 30]},
            {"Target": "Parameter", "Id": "ParamUnknown", "Segments": [0, 0, 0, 2, 1]},
            {"Target": "Model", "Id": "Opacity", "Segments": [0, 1, 0, 2, 0.5]}
        ],
        "UserData": [{"Time": 1.0, "Value": "wave"}]
    }"#;

    pub fn wave_motion(model: &Model) -> Motion {
        Motion::from_json(
            WAVE.as_bytes(),
            model,
            &MotionSetting::default(),
            &MotionOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_fade_precedence() {
        let model = sample_model();
        let motion = wave_motion(&model);
        assert_eq!(motion.fade_in(), 0.0);
        assert_eq!(motion.curve_count(), 2);

        let setting = MotionSetting {
            fade_in_time: Some(0.25),
            ..Default::default()
        };
        let overridden =
            Motion::from_json(WAVE.as_bytes(), &model, &setting, &MotionOptions::default()).unwrap();
        assert_eq!(overridden.fade_in(), 0.25);
        assert_eq!(overridden.fade_out(), 0.0);

        let bare = r#"{"Meta": {"Duration": 1.0}, "Curves": []}"#;
        let defaulted =
            Motion::from_json(bare.as_bytes(), &model, &MotionSetting::default(), &MotionOptions::default())
                .unwrap();
        assert_eq!(defaulted.fade_in(), 1.0);
        assert!(!defaulted.is_loop());
    }

    #[test]
    fn test_apply_full_weight() {
        let mut model = sample_model();
        let motion = wave_motion(&model);
        let ids = IdentifierSet::default();
        let ctx = ApplyContext {
            ids: &ids,
            time: 0.5,
            fade_weight: 1.0,
            since_fade_in: 0.5,
            until_end: Some(1.5),
        };
        let opacity = motion.apply(&mut model, &ctx);
        let angle = model.parameter_index("ParamAngleX").unwrap();
        assert!((model.parameter_value(angle) - 15.0).abs() < 1e-4);
        assert!((opacity.unwrap() - 0.875).abs() < 1e-4);
    }

    #[test]
    fn test_fired_user_data_wraps() {
        let model = sample_model();
        let motion = wave_motion(&model);
        assert_eq!(motion.fired_user_data(0.5, 1.0).count(), 1);
        assert_eq!(motion.fired_user_data(1.0, 1.5).count(), 0);
        assert_eq!(motion.fired_user_data(1.5, 0.2).count(), 0);
        assert_eq!(motion.fired_user_data(0.9, 0.2).count(), 1);
    }

    #[test]
    fn test_invalid_json() {
        let model = sample_model();
        let err = Motion::from_json(b"{}", &model, &MotionSetting::default(), &MotionOptions::default())
            .unwrap_err();
        assert!(matches!(err, MotionError::Json(_)));
    }
}
